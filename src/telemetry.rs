//! Structured logging setup shared by both binaries.
//!
//! Logs go to stderr so stdout stays reserved for the verdict. The filter is
//! read from `RUST_LOG` and defaults to `info`.

use tracing_subscriber::EnvFilter;

/// Default filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Installs the global subscriber. Calling it again is a no-op.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}
