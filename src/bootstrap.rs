//! Bootstrap payload assembly.
//!
//! The payload is a shell script the provider runs on first boot. It writes
//! the endpoint list to disk and runs the probe container against it, so the
//! probe observes exactly the network reachability of the target subnet.
//! Progress is mirrored to the serial console between `USERDATA BEGIN` and
//! `USERDATA END` markers.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use shell_escape::unix::escape;
use thiserror::Error;

use crate::endpoints::{ConfigLoadError, EndpointConfig};
use crate::probe::DEFAULT_PROBE_TIMEOUT;

/// Directory on the instance that receives the endpoint list.
pub const REMOTE_CONFIG_DIR: &str = "/etc/egress-probe";

/// Marker echoed before the probe runs.
pub const BEGIN_MARKER: &str = "USERDATA BEGIN";

/// Marker echoed after the probe finishes.
pub const END_MARKER: &str = "USERDATA END";

/// Errors raised while assembling a bootstrap payload.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BootstrapError {
    /// Raised when the probe image reference is empty.
    #[error("probe image must not be empty")]
    MissingProbeImage,
    /// Raised when the endpoint list cannot be serialised.
    #[error("failed to embed endpoint list: {0}")]
    Endpoints(#[from] ConfigLoadError),
}

/// Opaque script handed to the provider at instance creation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootstrapPayload {
    script: String,
}

impl BootstrapPayload {
    /// Wraps a pre-rendered script.
    #[must_use]
    pub fn from_script(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
        }
    }

    /// Returns the raw script text.
    #[must_use]
    pub fn script(&self) -> &str {
        &self.script
    }

    /// Returns the script base64 encoded, for providers that expect encoded
    /// user-data.
    #[must_use]
    pub fn encoded(&self) -> String {
        STANDARD.encode(self.script.as_bytes())
    }
}

/// Inputs needed to render a [`BootstrapPayload`].
#[derive(Clone, Debug)]
pub struct BootstrapBuilder<'a> {
    endpoints: &'a EndpointConfig,
    probe_image: String,
    probe_timeout: Duration,
    environment: Vec<(String, String)>,
}

impl<'a> BootstrapBuilder<'a> {
    /// Starts a builder for the given endpoint list and probe image.
    #[must_use]
    pub fn new(endpoints: &'a EndpointConfig, probe_image: impl Into<String>) -> Self {
        Self {
            endpoints,
            probe_image: probe_image.into(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            environment: Vec::new(),
        }
    }

    /// Sets the per-connection timeout passed to the probe.
    #[must_use]
    pub const fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Exports an environment variable before the probe runs.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }

    /// Renders the script.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] when the probe image is blank or the
    /// endpoint list cannot be serialised.
    pub fn build(self) -> Result<BootstrapPayload, BootstrapError> {
        let image = self.probe_image.trim();
        if image.is_empty() {
            return Err(BootstrapError::MissingProbeImage);
        }

        let config_yaml = self.endpoints.to_yaml()?;
        let config_b64 = STANDARD.encode(config_yaml.as_bytes());
        let config_path = format!("{REMOTE_CONFIG_DIR}/config.yaml");
        let image_arg = quote(image);
        let timeout_arg = render_duration(self.probe_timeout);

        let mut script = String::new();
        script.push_str("#!/bin/bash -xe\n");
        script.push_str(
            "exec > >(tee /var/log/user-data.log|logger -t user-data -s 2>/dev/console) 2>&1\n",
        );
        for (key, value) in &self.environment {
            writeln!(script, "export {key}={}", quote(value)).ok();
        }
        writeln!(script, "echo {}", quote(BEGIN_MARKER)).ok();
        // Failures past this point must still reach the end marker.
        script.push_str("set +e\n");
        writeln!(script, "mkdir -p {REMOTE_CONFIG_DIR}").ok();
        writeln!(script, "echo {config_b64} | base64 -d > {config_path}").ok();
        script.push_str(
            "command -v docker >/dev/null 2>&1 || { apt-get update -y && apt-get install -y docker.io; }\n",
        );
        writeln!(script, "docker pull {image_arg}").ok();
        writeln!(
            script,
            concat!(
                "docker run --rm --network host ",
                "-v {dir}:{dir}:ro {image} --config {path} --timeout {timeout} || true"
            ),
            dir = REMOTE_CONFIG_DIR,
            image = image_arg,
            path = config_path,
            timeout = timeout_arg,
        )
        .ok();
        writeln!(script, "echo {}", quote(END_MARKER)).ok();

        Ok(BootstrapPayload { script })
    }
}

/// Renders a duration in the coarsest unit that loses no precision.
fn render_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos.checked_rem(1_000_000) == Some(0) {
        format!("{}ms", duration.as_millis())
    } else if nanos.checked_rem(1_000) == Some(0) {
        format!("{}us", duration.as_micros())
    } else {
        format!("{nanos}ns")
    }
}

fn quote(value: &str) -> Cow<'_, str> {
    escape(value.into())
}
