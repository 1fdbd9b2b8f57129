//! Command-line interface definitions for the `egress-verifier` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `egress-verifier` binary.
#[derive(Debug, Parser)]
#[command(
    name = "egress-verifier",
    about = "Check that a cloud subnet can reach the endpoints a cluster needs",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Launch a probe instance in the subnet, wait for it, and tear it down.
    #[command(
        name = "verify",
        about = "Launch a probe instance in the subnet and report whether it came up"
    )]
    Verify(VerifyCommand),
}

/// Arguments for the `egress-verifier verify` subcommand.
///
/// Every flag overrides the matching value from `egress-verifier.toml` or
/// the `EGRESS_VERIFIER_*` environment variables for this run only.
#[derive(Debug, Default, Parser)]
pub(crate) struct VerifyCommand {
    /// Private network (subnet) to launch the probe instance in.
    #[arg(long, value_name = "ID")]
    pub(crate) subnet_id: Option<String>,
    /// Security group applied to the probe instance.
    #[arg(long, value_name = "ID")]
    pub(crate) security_group_id: Option<String>,
    /// Image label or identifier for the probe instance.
    ///
    /// Labels are resolved to the newest available image for the configured
    /// architecture and zone.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) image: Option<String>,
    /// Instance type (commercial type) for the probe instance.
    #[arg(long, value_name = "TYPE")]
    pub(crate) instance_type: Option<String>,
    /// Container image that ships the `egress-probe` binary.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) probe_image: Option<String>,
    /// Endpoint list to probe (YAML).
    #[arg(long, value_name = "PATH")]
    pub(crate) config: Option<String>,
    /// Per-connection probe timeout, for example `500ms` or `2s`.
    #[arg(long, value_name = "DURATION")]
    pub(crate) timeout: Option<String>,
}
