//! Reachability prober that runs on the probe instance.
//!
//! Reads the endpoint list, attempts one TCP connection per `(host, port)`
//! pair, prints the verdict, and exits `0` only when every endpoint was
//! reachable.

use std::io::{self, Write as _};
use std::num::NonZeroUsize;
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;

use egress_verifier::duration::parse_duration;
use egress_verifier::{EndpointConfig, Prober, telemetry};

#[derive(Debug, Parser)]
#[command(
    name = "egress-probe",
    about = "Check TCP reachability of every endpoint in a YAML list"
)]
struct Cli {
    /// Endpoint list to probe.
    #[arg(long, default_value = "config.yaml", value_name = "PATH")]
    config: Utf8PathBuf,
    /// Per-connection timeout, for example `500ms` or `2s`.
    #[arg(long, default_value = "500ms", value_name = "DURATION")]
    timeout: String,
    /// Connection attempts allowed in flight at once.
    #[arg(long, default_value = "8", value_name = "N")]
    workers: NonZeroUsize,
}

#[derive(Debug, Error)]
enum ProbeCliError {
    #[error("invalid --timeout: {0}")]
    Timeout(String),
    #[error("{0}")]
    Config(String),
    #[error("failed to write report: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    telemetry::init();
    let cli = Cli::parse();
    let exit_code = match run(&cli).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            writeln!(io::stderr(), "{err}").ok();
            1
        }
    };
    process::exit(exit_code);
}

async fn run(cli: &Cli) -> Result<bool, ProbeCliError> {
    let timeout =
        parse_duration(&cli.timeout).map_err(|err| ProbeCliError::Timeout(err.to_string()))?;
    let endpoints =
        EndpointConfig::load(&cli.config).map_err(|err| ProbeCliError::Config(err.to_string()))?;

    let report = Prober::new(timeout)
        .with_workers(cli.workers)
        .probe(&endpoints)
        .await;
    report.write_summary(io::stdout())?;
    Ok(report.succeeded())
}
