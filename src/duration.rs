//! Parsing of human-friendly durations such as `500ms` or `1.5s`.

use std::time::Duration;

use thiserror::Error;

/// Errors raised when a duration string cannot be parsed.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DurationParseError {
    /// The input was empty.
    #[error("duration must not be empty")]
    Empty,
    /// The input carried no recognised unit suffix.
    #[error("duration `{0}` is missing a unit (ns, us, ms, s, m, h)")]
    MissingUnit(String),
    /// The magnitude was not a non-negative decimal number.
    #[error("duration `{0}` has an invalid magnitude")]
    InvalidNumber(String),
    /// The value does not fit in a [`Duration`].
    #[error("duration `{0}` is out of range")]
    Overflow(String),
}

const UNITS: [(&str, u64); 6] = [
    ("ns", 1),
    ("us", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60_000_000_000),
    ("h", 3_600_000_000_000),
];

/// Parses a single-unit duration.
///
/// The magnitude may carry a fractional part (`1.5s`); fractions finer than
/// a nanosecond are truncated.
///
/// # Errors
///
/// Returns [`DurationParseError`] when the value is empty, has no unit, has
/// an invalid magnitude, or overflows.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// # use egress_verifier::duration::parse_duration;
/// assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
/// assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(DurationParseError::Empty);
    }

    // Longest suffix first so `ms` is not read as `s`.
    let (number, scale) = UNITS
        .iter()
        .filter_map(|(suffix, scale)| {
            value
                .strip_suffix(suffix)
                .map(|number| (number, *scale, suffix.len()))
        })
        .max_by_key(|(_, _, len)| *len)
        .map(|(number, scale, _)| (number, scale))
        .ok_or_else(|| DurationParseError::MissingUnit(value.to_owned()))?;

    let nanos = scaled_nanos(number, scale, value)?;
    Ok(Duration::from_nanos(nanos))
}

fn scaled_nanos(number: &str, scale: u64, original: &str) -> Result<u64, DurationParseError> {
    let invalid = || DurationParseError::InvalidNumber(original.to_owned());
    let overflow = || DurationParseError::Overflow(original.to_owned());

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|ch| ch.is_ascii_digit())
        || !fraction.chars().all(|ch| ch.is_ascii_digit())
    {
        return Err(invalid());
    }

    let whole_value: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| overflow())?
    };
    let mut nanos = whole_value.checked_mul(scale).ok_or_else(overflow)?;

    let mut place = scale;
    for digit in fraction.chars() {
        place = place.checked_div(10).unwrap_or(0);
        if place == 0 {
            break;
        }
        let digit_value = u64::from(digit.to_digit(10).ok_or_else(invalid)?);
        nanos = nanos
            .checked_add(digit_value * place)
            .ok_or_else(overflow)?;
    }
    Ok(nanos)
}
