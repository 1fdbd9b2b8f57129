//! TCP reachability probing of a declared endpoint list.
//!
//! Every `(host, port)` pair gets exactly one connection attempt bounded by
//! the configured timeout. Failures never abort the survey: every pair is
//! attempted and reported, in declaration order, even when attempts run
//! concurrently.

use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::endpoints::EndpointConfig;

/// Default per-attempt timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

const DEFAULT_WORKERS: usize = 8;

/// Why a single attempt failed.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProbeError {
    /// The connection (including name resolution) did not complete in time.
    #[error("unable to reach {target} within {timeout_ms} ms")]
    TimedOut {
        /// `host:port` that was probed.
        target: String,
        /// Timeout applied to the attempt.
        timeout_ms: u128,
    },
    /// The connection failed outright: refused, unreachable, or DNS failure.
    #[error("unable to reach {target}: {message}")]
    Connect {
        /// `host:port` that was probed.
        target: String,
        /// Operating system error text.
        message: String,
    },
}

/// Outcome of one attempt against one `(host, port)` pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProbeResult {
    /// Probed host.
    pub host: String,
    /// Probed port.
    pub port: u16,
    /// Whether the TCP handshake completed.
    pub reachable: bool,
    /// Failure detail when unreachable.
    pub error: Option<ProbeError>,
}

impl ProbeResult {
    /// Returns the `host:port` target string.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// All attempts of a survey, in declaration order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProbeReport {
    /// One entry per declared `(host, port)` pair.
    pub results: Vec<ProbeResult>,
}

impl ProbeReport {
    /// `true` exactly when every result is reachable.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.results.iter().all(|result| result.reachable)
    }

    /// Results that failed, in declaration order.
    pub fn unreachable(&self) -> impl Iterator<Item = &ProbeResult> + '_ {
        self.results.iter().filter(|result| !result.reachable)
    }

    /// Number of results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` when nothing was probed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Writes the human-readable verdict.
    ///
    /// # Errors
    ///
    /// Propagates write failures from `out`.
    pub fn write_summary(&self, mut out: impl Write) -> io::Result<()> {
        if self.succeeded() {
            return writeln!(out, "Success!");
        }
        writeln!(out, "Not all endpoints were reachable:")?;
        for result in self.unreachable() {
            match &result.error {
                Some(error) => writeln!(out, "{error}")?,
                None => writeln!(out, "unable to reach {}", result.target())?,
            }
        }
        Ok(())
    }
}

/// Runs connection attempts with bounded concurrency.
#[derive(Clone, Debug)]
pub struct Prober {
    timeout: Duration,
    workers: NonZeroUsize,
}

impl Prober {
    /// Creates a prober with the given per-attempt timeout.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            workers: match NonZeroUsize::new(DEFAULT_WORKERS) {
                Some(workers) => workers,
                None => NonZeroUsize::MIN,
            },
        }
    }

    /// Overrides the number of attempts allowed in flight.
    #[must_use]
    pub const fn with_workers(mut self, workers: NonZeroUsize) -> Self {
        self.workers = workers;
        self
    }

    /// Per-attempt timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Attempts every declared pair once and aggregates the results.
    pub async fn probe(&self, config: &EndpointConfig) -> ProbeReport {
        let results = stream::iter(config.targets())
            .map(|(host, port)| self.probe_one(host, port))
            .buffered(self.workers.get())
            .collect()
            .await;
        ProbeReport { results }
    }

    async fn probe_one(&self, host: &str, port: u16) -> ProbeResult {
        let target = format!("{host}:{port}");
        info!(%target, "validating endpoint");

        let error = match timeout(self.timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => None,
            Ok(Err(err)) => Some(ProbeError::Connect {
                target: target.clone(),
                message: err.to_string(),
            }),
            Err(_elapsed) => Some(ProbeError::TimedOut {
                target: target.clone(),
                timeout_ms: self.timeout.as_millis(),
            }),
        };

        match &error {
            None => info!(%target, "endpoint reachable"),
            Some(reason) => warn!(%target, error = %reason, "endpoint unreachable"),
        }

        ProbeResult {
            host: host.to_owned(),
            port,
            reachable: error.is_none(),
            error,
        }
    }
}

impl Default for Prober {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

/// Probes every pair in `config` with the given per-attempt timeout.
pub async fn probe(config: &EndpointConfig, timeout: Duration) -> ProbeReport {
    Prober::new(timeout).probe(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(host: &str, port: u16, reachable: bool) -> ProbeResult {
        ProbeResult {
            host: host.to_owned(),
            port,
            reachable,
            error: (!reachable).then(|| ProbeError::Connect {
                target: format!("{host}:{port}"),
                message: String::from("connection refused"),
            }),
        }
    }

    #[test]
    fn succeeded_is_the_conjunction_of_results() {
        let cases = [
            (vec![], true),
            (vec![true], true),
            (vec![true, true, true], true),
            (vec![false], false),
            (vec![true, false, true], false),
        ];
        for (flags, expected) in cases {
            let report = ProbeReport {
                results: flags
                    .iter()
                    .zip(1_u16..)
                    .map(|(flag, port)| result("h", port, *flag))
                    .collect(),
            };
            assert_eq!(report.succeeded(), expected, "flags: {flags:?}");
        }
    }

    #[test]
    fn summary_lists_each_unreachable_target() {
        let report = ProbeReport {
            results: vec![
                result("ok.example", 443, true),
                result("bad.example", 80, false),
            ],
        };
        let mut buf = Vec::new();
        report
            .write_summary(&mut buf)
            .unwrap_or_else(|err| panic!("write: {err}"));
        let rendered = String::from_utf8(buf).unwrap_or_else(|err| panic!("utf8: {err}"));
        assert!(rendered.starts_with("Not all endpoints were reachable:"));
        assert!(rendered.contains("bad.example:80"));
        assert!(!rendered.contains("ok.example"));
    }

    #[test]
    fn summary_reports_success() {
        let report = ProbeReport {
            results: vec![result("ok.example", 443, true)],
        };
        let mut buf = Vec::new();
        report
            .write_summary(&mut buf)
            .unwrap_or_else(|err| panic!("write: {err}"));
        assert_eq!(buf, b"Success!\n");
    }
}
