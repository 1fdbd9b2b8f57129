//! Core library for the egress verifier.
//!
//! The crate checks whether a cloud subnet, under a given security group,
//! can host an instance that reaches the endpoints a managed cluster needs.
//! It exposes a provider-neutral cloud client abstraction, a Scaleway
//! implementation of it, the exponential-backoff state poller, the
//! orchestrator that guarantees teardown (provision → poll → terminate), and
//! the TCP reachability prober that runs on the provisioned instance.

pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod duration;
pub mod endpoints;
pub mod poll;
pub mod probe;
pub mod scaleway;
pub mod telemetry;
pub mod test_support;
pub mod verify;

pub use backend::{
    BackendError, CloudResourceClient, InstanceHandle, InstanceRequest, InstanceRequestBuilder,
    InstanceState, ProviderError,
};
pub use bootstrap::{BootstrapBuilder, BootstrapError, BootstrapPayload};
pub use config::{ConfigError, ScalewayConfig, VerifierConfig};
pub use endpoints::{ConfigLoadError, Endpoint, EndpointConfig, EndpointError};
pub use poll::{PollOutcome, PollPolicy, StatePoller};
pub use probe::{ProbeError, ProbeReport, ProbeResult, Prober};
pub use scaleway::{ScalewayClient, ScalewayClientError};
pub use verify::{
    NetworkParams, ProbeSettings, TeardownStatus, VerificationResult, Verifier, VerifyError,
};
