//! Configuration loading via `ortho-config`.
//!
//! Two layered structs are loaded: [`ScalewayConfig`] carries provider
//! credentials and placement defaults, [`VerifierConfig`] carries the network
//! under test and the probe and polling settings. Values merge defaults,
//! configuration files, and environment variables in that order of
//! precedence; the CLI applies per-run overrides on top.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::duration::parse_duration;
use crate::poll::PollPolicy;
use crate::verify::{NetworkParams, ProbeSettings};

/// Configuration file consulted by both structs.
pub const CONFIG_FILE_NAME: &str = "egress-verifier.toml";

/// Scaleway specific configuration derived from environment variables and
/// configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "SCW")]
pub struct ScalewayConfig {
    /// Access key assigned to the Scaleway application. Not required for API
    /// calls.
    pub access_key: Option<String>,
    /// Secret key used for authentication. This value is required.
    pub secret_key: String,
    /// Organisation identifier used by some Scaleway endpoints.
    pub default_organization_id: Option<String>,
    /// Project identifier used for billing and resource scoping.
    pub default_project_id: String,
    /// Availability zone hosting the subnet under test. Defaults to
    /// `fr-par-1`.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub default_zone: String,
    /// CPU architecture used to select the correct image variant.
    #[ortho_config(default = "x86_64".to_owned())]
    pub default_architecture: String,
}

/// Network under test plus probe and polling settings.
///
/// The network and probe image fields default to empty so CLI flags can
/// supply them; [`VerifierConfig::validate`] rejects them if still empty.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "EGRESS_VERIFIER",
    discovery(
        app_name = "egress-verifier",
        env_var = "EGRESS_VERIFIER_CONFIG_PATH",
        config_file_name = "egress-verifier.toml",
        dotfile_name = ".egress-verifier.toml",
        project_file_name = "egress-verifier.toml"
    )
)]
pub struct VerifierConfig {
    /// Private network (subnet) the probe instance is attached to.
    #[ortho_config(default = String::new())]
    pub subnet_id: String,
    /// Security group applied to the probe instance.
    #[ortho_config(default = String::new())]
    pub security_group_id: String,
    /// Image label or identifier for the probe instance.
    #[ortho_config(default = "Ubuntu 24.04 Noble Numbat".to_owned())]
    pub image: String,
    /// Commercial type for the probe instance. Defaults to `DEV1-S` to
    /// minimise cost.
    #[ortho_config(default = "DEV1-S".to_owned())]
    pub instance_type: String,
    /// Container image that ships the `egress-probe` binary.
    #[ortho_config(default = String::new())]
    pub probe_image: String,
    /// Per-connection timeout used by the probe (for example `500ms`).
    #[ortho_config(default = "500ms".to_owned())]
    pub probe_timeout: String,
    /// Overall budget for waiting on the instance, in seconds.
    #[ortho_config(default = 1500)]
    pub poll_budget_secs: u64,
    /// Starting backoff wait in seconds; the first sleep is twice this.
    #[ortho_config(default = 1)]
    pub poll_initial_wait_secs: u64,
    /// Seconds the instance keeps running after it is first seen running,
    /// so the bootstrap payload can execute.
    #[ortho_config(default = 120)]
    pub probe_grace_secs: u64,
    /// Endpoint list file.
    #[ortho_config(default = "config.yaml".to_owned())]
    pub endpoints_file: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to {CONFIG_FILE_NAME}",
            metadata.description, metadata.env_var, metadata.toml_key
        )));
    }
    Ok(())
}

impl ScalewayConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("egress-verifier")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.secret_key,
            &FieldMetadata::new("Scaleway API secret key", "SCW_SECRET_KEY", "secret_key"),
        )?;
        require_field(
            &self.default_project_id,
            &FieldMetadata::new(
                "Scaleway project ID",
                "SCW_DEFAULT_PROJECT_ID",
                "default_project_id",
            ),
        )?;
        require_field(
            &self.default_zone,
            &FieldMetadata::new("availability zone", "SCW_DEFAULT_ZONE", "default_zone"),
        )?;
        require_field(
            &self.default_architecture,
            &FieldMetadata::new(
                "CPU architecture",
                "SCW_DEFAULT_ARCHITECTURE",
                "default_architecture",
            ),
        )?;
        Ok(())
    }
}

impl VerifierConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("egress-verifier")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields and durations.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty,
    /// or [`ConfigError::InvalidValue`] when the probe timeout cannot be
    /// parsed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.subnet_id,
            &FieldMetadata::new(
                "private network (subnet) ID",
                "EGRESS_VERIFIER_SUBNET_ID",
                "subnet_id",
            ),
        )?;
        require_field(
            &self.security_group_id,
            &FieldMetadata::new(
                "security group ID",
                "EGRESS_VERIFIER_SECURITY_GROUP_ID",
                "security_group_id",
            ),
        )?;
        require_field(
            &self.image,
            &FieldMetadata::new("instance image", "EGRESS_VERIFIER_IMAGE", "image"),
        )?;
        require_field(
            &self.instance_type,
            &FieldMetadata::new(
                "instance type",
                "EGRESS_VERIFIER_INSTANCE_TYPE",
                "instance_type",
            ),
        )?;
        require_field(
            &self.probe_image,
            &FieldMetadata::new(
                "probe container image",
                "EGRESS_VERIFIER_PROBE_IMAGE",
                "probe_image",
            ),
        )?;
        require_field(
            &self.endpoints_file,
            &FieldMetadata::new(
                "endpoint list file",
                "EGRESS_VERIFIER_ENDPOINTS_FILE",
                "endpoints_file",
            ),
        )?;
        self.probe_timeout()?;
        Ok(())
    }

    /// Network placement for the probe instance.
    #[must_use]
    pub fn network_params(&self) -> NetworkParams {
        NetworkParams {
            image: self.image.clone(),
            machine_size: self.instance_type.clone(),
            subnet_id: self.subnet_id.clone(),
            security_group_id: self.security_group_id.clone(),
        }
    }

    /// Parsed per-connection probe timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the value cannot be parsed.
    pub fn probe_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.probe_timeout).map_err(|err| ConfigError::InvalidValue {
            field: String::from("probe_timeout"),
            message: err.to_string(),
        })
    }

    /// Probe settings with the zone exported to the probe's environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the probe timeout cannot be
    /// parsed.
    pub fn probe_settings(&self, zone: &str) -> Result<ProbeSettings, ConfigError> {
        Ok(ProbeSettings {
            image: self.probe_image.clone(),
            timeout: self.probe_timeout()?,
            environment: vec![(String::from("SCW_DEFAULT_ZONE"), zone.to_owned())],
        })
    }

    /// Backoff policy for status polling.
    #[must_use]
    pub const fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.poll_budget_secs),
            Duration::from_secs(self.poll_initial_wait_secs),
        )
    }

    /// Time the instance keeps running after it is first seen running.
    #[must_use]
    pub const fn probe_grace_period(&self) -> Duration {
        Duration::from_secs(self.probe_grace_secs)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds a value that cannot be interpreted.
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        /// Offending field.
        field: String,
        /// Why the value was rejected.
        message: String,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
