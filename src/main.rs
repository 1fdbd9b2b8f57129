//! Binary entry point for the egress verifier.

mod cli;

use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use clap::Parser;
use thiserror::Error;

use cli::{Cli, VerifyCommand};
use egress_verifier::{
    EndpointConfig, ScalewayClient, ScalewayConfig, Verifier, VerifierConfig, telemetry,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("failed to write verdict: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    telemetry::init();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Verify(command) => verify(command).await,
    }
}

async fn verify(args: VerifyCommand) -> Result<i32, CliError> {
    let loaded = VerifierConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let verifier_config = apply_overrides(loaded, args);
    verifier_config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let endpoints = EndpointConfig::load(Utf8Path::new(&verifier_config.endpoints_file))
        .map_err(|err| CliError::Config(err.to_string()))?;

    let scaleway_config = ScalewayConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let client =
        ScalewayClient::new(scaleway_config).map_err(|err| CliError::Backend(err.to_string()))?;
    let probe = verifier_config
        .probe_settings(client.zone())
        .map_err(|err| CliError::Config(err.to_string()))?;

    let verifier = Verifier::new(client, probe)
        .with_poll_policy(verifier_config.poll_policy())
        .with_probe_grace_period(verifier_config.probe_grace_period());
    let result = verifier
        .verify(&verifier_config.network_params(), &endpoints)
        .await;

    result.write_summary(io::stdout())?;
    Ok(result.exit_code())
}

fn apply_overrides(mut config: VerifierConfig, args: VerifyCommand) -> VerifierConfig {
    let VerifyCommand {
        subnet_id,
        security_group_id,
        image,
        instance_type,
        probe_image,
        config: endpoints_file,
        timeout,
    } = args;
    let overrides = [
        (&mut config.subnet_id, subnet_id),
        (&mut config.security_group_id, security_group_id),
        (&mut config.image, image),
        (&mut config.instance_type, instance_type),
        (&mut config.probe_image, probe_image),
        (&mut config.endpoints_file, endpoints_file),
        (&mut config.probe_timeout, timeout),
    ];
    for (field, value) in overrides {
        if let Some(new_value) = value {
            *field = new_value;
        }
    }
    config
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
