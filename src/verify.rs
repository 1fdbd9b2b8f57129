//! Orchestrates one end-to-end verification run.
//!
//! The run builds the bootstrap payload, provisions a probe instance in the
//! target subnet, polls it until it runs, gives the payload time to execute,
//! and tears the instance down. Once an instance exists, teardown is
//! attempted exactly once on every exit path, including a panic in a later
//! stage. A teardown failure is reported beside the verdict and never
//! replaces it.

use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use futures::FutureExt as _;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::backend::{
    BackendError, CloudResourceClient, InstanceHandle, InstanceRequest, ProviderError,
};
use crate::bootstrap::{BootstrapBuilder, BootstrapError};
use crate::endpoints::EndpointConfig;
use crate::poll::{PollOutcome, PollPolicy, StatePoller};
use crate::probe::DEFAULT_PROBE_TIMEOUT;

/// Default time the instance keeps running after it is first seen running.
pub const DEFAULT_PROBE_GRACE_PERIOD: Duration = Duration::from_secs(120);

/// Network placement of the probe instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkParams {
    /// Machine image identifier or label.
    pub image: String,
    /// Machine size or commercial type.
    pub machine_size: String,
    /// Subnet under test.
    pub subnet_id: String,
    /// Security group under test.
    pub security_group_id: String,
}

/// How the probe runs on the instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProbeSettings {
    /// Container image that ships the `egress-probe` binary.
    pub image: String,
    /// Per-connection timeout handed to the probe.
    pub timeout: Duration,
    /// Environment exported before the probe runs.
    pub environment: Vec<(String, String)>,
}

impl ProbeSettings {
    /// Creates settings for the given probe image with the default timeout.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
            environment: Vec::new(),
        }
    }
}

/// Errors that decide a failed verdict.
#[derive(Debug, Error)]
pub enum VerifyError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the bootstrap payload cannot be assembled.
    #[error("failed to build bootstrap payload: {0}")]
    Bootstrap(#[from] BootstrapError),
    /// Raised when the instance request is incomplete.
    #[error("invalid instance request: {0}")]
    Request(#[from] BackendError),
    /// Raised when the provider rejects instance creation.
    #[error("failed to create instance: {0}")]
    Provision(#[source] E),
    /// Raised when the account lacks permission to inspect the instance.
    #[error("missing required permissions for instance {instance_id}: {source}")]
    Authorization {
        /// Provider instance identifier.
        instance_id: String,
        /// Provider error that denied the query.
        #[source]
        source: E,
    },
    /// Raised when the instance never reached the running state.
    #[error(
        "instance {instance_id} did not reach running state within {budget_secs} s \
         ({attempts} status checks)"
    )]
    PollTimeout {
        /// Provider instance identifier.
        instance_id: String,
        /// Status queries issued.
        attempts: u32,
        /// Polling budget in seconds.
        budget_secs: u64,
    },
    /// Raised when a status query fails for any other reason.
    #[error("could not get state of instance {instance_id}: {source}")]
    Query {
        /// Provider instance identifier.
        instance_id: String,
        /// Underlying provider error.
        #[source]
        source: E,
    },
}

/// What happened to the probe instance at the end of the run.
#[derive(Debug)]
pub enum TeardownStatus<E> {
    /// No instance was created.
    NotRequired,
    /// The instance was terminated.
    Terminated,
    /// The provider no longer knew the instance.
    AlreadyGone,
    /// Termination failed; the instance may still exist.
    Failed(E),
}

impl<E> TeardownStatus<E> {
    /// `true` unless termination failed.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Verdict and cleanup status of one run.
#[derive(Debug)]
pub struct VerificationResult<E>
where
    E: std::error::Error + 'static,
{
    /// Identifier of the probe instance, when one was created.
    pub instance_id: Option<String>,
    /// Polling summary, when polling took place.
    pub poll: Option<PollOutcome>,
    /// Pass, or the reason for failure.
    pub verdict: Result<(), VerifyError<E>>,
    /// Cleanup outcome, reported separately from the verdict.
    pub teardown: TeardownStatus<E>,
}

impl<E> VerificationResult<E>
where
    E: std::error::Error + 'static,
{
    /// `true` when the verdict passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.verdict.is_ok()
    }

    /// Process exit status: `0` on pass, `1` on a failed verdict, `2` when the
    /// verdict passed but the instance could not be terminated.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.verdict.is_err() {
            1
        } else if self.teardown.is_clean() {
            0
        } else {
            2
        }
    }

    /// Writes the human-readable verdict and cleanup lines.
    ///
    /// # Errors
    ///
    /// Propagates write failures from `out`.
    pub fn write_summary(&self, mut out: impl Write) -> io::Result<()> {
        let instance = self.instance_id.as_deref().unwrap_or("<none>");
        match &self.verdict {
            Ok(()) => {
                let attempts = self.poll.as_ref().map_or(0, |poll| poll.attempts);
                writeln!(
                    out,
                    "Verification passed: instance {instance} is running in the target subnet \
                     ({attempts} status checks)"
                )?;
            }
            Err(err) => writeln!(out, "Verification failed: {err}")?,
        }
        match &self.teardown {
            TeardownStatus::NotRequired => {}
            TeardownStatus::Terminated => writeln!(out, "Instance {instance} terminated")?,
            TeardownStatus::AlreadyGone => {
                writeln!(out, "Instance {instance} was already gone")?;
            }
            TeardownStatus::Failed(err) => {
                writeln!(out, "Failed to terminate instance {instance}: {err}")?;
            }
        }
        Ok(())
    }
}

/// Runs verification against a cloud client.
#[derive(Debug)]
pub struct Verifier<C> {
    client: C,
    probe: ProbeSettings,
    poller: StatePoller,
    probe_grace_period: Duration,
}

type StageResult<E> = (Option<PollOutcome>, Result<(), VerifyError<E>>);

impl<C> Verifier<C>
where
    C: CloudResourceClient + Sync,
{
    /// Creates a verifier with the default polling policy and grace period.
    #[must_use]
    pub fn new(client: C, probe: ProbeSettings) -> Self {
        Self {
            client,
            probe,
            poller: StatePoller::default(),
            probe_grace_period: DEFAULT_PROBE_GRACE_PERIOD,
        }
    }

    /// Overrides the polling policy.
    #[must_use]
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poller = StatePoller::new(policy);
        self
    }

    /// Overrides how long the instance keeps running once it is up.
    ///
    /// This is primarily used by tests to keep scenarios fast.
    #[must_use]
    pub const fn with_probe_grace_period(mut self, period: Duration) -> Self {
        self.probe_grace_period = period;
        self
    }

    /// Borrows the underlying client.
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Runs one verification.
    ///
    /// Never returns early without attempting teardown of a created
    /// instance. If a stage panics, teardown runs before the panic resumes.
    pub async fn verify(
        &self,
        network: &NetworkParams,
        endpoints: &EndpointConfig,
    ) -> VerificationResult<C::Error> {
        let request = match self.build_request(network, endpoints) {
            Ok(request) => request,
            Err(err) => return Self::without_instance(err),
        };

        info!(
            subnet_id = %request.subnet_id,
            security_group_id = %request.security_group_id,
            machine_size = %request.machine_size,
            endpoints = endpoints.len(),
            "provisioning probe instance"
        );
        let handle = match self.client.create_instance(&request).await {
            Ok(handle) => handle,
            Err(err) => {
                error!(error = %err, "failed to create probe instance");
                return Self::without_instance(VerifyError::Provision(err));
            }
        };
        info!(instance_id = %handle.id, "created probe instance");

        let stages = AssertUnwindSafe(self.run_stages(&handle))
            .catch_unwind()
            .await;
        let teardown = self.teardown(&handle).await;

        let (poll, verdict) = match stages {
            Ok(result) => result,
            Err(panic_payload) => panic::resume_unwind(panic_payload),
        };

        VerificationResult {
            instance_id: Some(handle.id),
            poll,
            verdict,
            teardown,
        }
    }

    fn build_request(
        &self,
        network: &NetworkParams,
        endpoints: &EndpointConfig,
    ) -> Result<InstanceRequest, VerifyError<C::Error>> {
        let bootstrap = self
            .probe
            .environment
            .iter()
            .fold(
                BootstrapBuilder::new(endpoints, self.probe.image.as_str())
                    .probe_timeout(self.probe.timeout),
                |builder, (key, value)| builder.env(key.as_str(), value.as_str()),
            )
            .build()?;

        let request = InstanceRequest::builder()
            .image(network.image.as_str())
            .machine_size(network.machine_size.as_str())
            .subnet_id(network.subnet_id.as_str())
            .security_group_id(network.security_group_id.as_str())
            .bootstrap(bootstrap)
            .build()?;
        Ok(request)
    }

    async fn run_stages(&self, handle: &InstanceHandle) -> StageResult<C::Error> {
        info!(instance_id = %handle.id, "waiting for probe instance to be running");
        match self.poller.poll(&self.client, handle).await {
            Ok(outcome) if outcome.is_running() => {
                if !self.probe_grace_period.is_zero() {
                    info!(
                        instance_id = %handle.id,
                        grace_secs = self.probe_grace_period.as_secs(),
                        "instance running; letting the probe execute"
                    );
                    sleep(self.probe_grace_period).await;
                }
                (Some(outcome), Ok(()))
            }
            Ok(outcome) => {
                let err = VerifyError::PollTimeout {
                    instance_id: handle.id.clone(),
                    attempts: outcome.attempts,
                    budget_secs: self.poller.policy().budget.as_secs(),
                };
                (Some(outcome), Err(err))
            }
            Err(failure) => {
                let instance_id = handle.id.clone();
                let err = if failure.error.is_unauthorized() {
                    VerifyError::Authorization {
                        instance_id,
                        source: failure.error,
                    }
                } else {
                    VerifyError::Query {
                        instance_id,
                        source: failure.error,
                    }
                };
                (Some(failure.outcome), Err(err))
            }
        }
    }

    async fn teardown(&self, handle: &InstanceHandle) -> TeardownStatus<C::Error> {
        match self.client.terminate_instance(handle).await {
            Ok(()) => {
                info!(instance_id = %handle.id, "terminated probe instance");
                TeardownStatus::Terminated
            }
            Err(err) if err.is_not_found() => {
                info!(instance_id = %handle.id, "probe instance already gone");
                TeardownStatus::AlreadyGone
            }
            Err(err) => {
                warn!(instance_id = %handle.id, error = %err, "failed to terminate probe instance");
                TeardownStatus::Failed(err)
            }
        }
    }

    fn without_instance(err: VerifyError<C::Error>) -> VerificationResult<C::Error> {
        VerificationResult {
            instance_id: None,
            poll: None,
            verdict: Err(err),
            teardown: TeardownStatus::NotRequired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedClientError;

    fn result(
        verdict: Result<(), VerifyError<ScriptedClientError>>,
        teardown: TeardownStatus<ScriptedClientError>,
    ) -> VerificationResult<ScriptedClientError> {
        VerificationResult {
            instance_id: Some(String::from("i-1")),
            poll: None,
            verdict,
            teardown,
        }
    }

    #[test]
    fn exit_code_separates_verdict_from_teardown() {
        assert_eq!(result(Ok(()), TeardownStatus::Terminated).exit_code(), 0);
        assert_eq!(result(Ok(()), TeardownStatus::AlreadyGone).exit_code(), 0);
        assert_eq!(
            result(Ok(()), TeardownStatus::Failed(ScriptedClientError::Terminate)).exit_code(),
            2
        );
        let failed = result(
            Err(VerifyError::Provision(ScriptedClientError::Create)),
            TeardownStatus::Failed(ScriptedClientError::Terminate),
        );
        assert_eq!(failed.exit_code(), 1);
    }

    #[test]
    fn summary_reports_teardown_failure_beside_verdict() {
        let outcome = result(
            Err(VerifyError::PollTimeout {
                instance_id: String::from("i-1"),
                attempts: 4,
                budget_secs: 20,
            }),
            TeardownStatus::Failed(ScriptedClientError::Terminate),
        );
        let mut buf = Vec::new();
        outcome
            .write_summary(&mut buf)
            .unwrap_or_else(|err| panic!("write: {err}"));
        let rendered = String::from_utf8(buf).unwrap_or_else(|err| panic!("utf8: {err}"));
        assert!(rendered.contains("Verification failed: instance i-1 did not reach running"));
        assert!(rendered.contains("Failed to terminate instance i-1: terminate failure"));
    }
}
