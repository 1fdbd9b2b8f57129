//! Behavioural tests for the verification run against a scripted cloud.
//!
//! Every scenario checks that a created instance is terminated exactly once,
//! whatever the verdict.

#[path = "common/test_constants.rs"]
mod test_constants;

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use egress_verifier::backend::BackendFuture;
use egress_verifier::test_support::{
    SCRIPTED_INSTANCE_ID, ScriptedClient, ScriptedClientError, ScriptedStatus, ScriptedTeardown,
};
use egress_verifier::{
    CloudResourceClient, EndpointConfig, InstanceHandle, InstanceRequest, InstanceState,
    NetworkParams, PollPolicy, ProbeSettings, TeardownStatus, VerificationResult, Verifier,
    VerifyError,
};
use futures::FutureExt as _;
use rstest::*;
use test_constants::{
    DEFAULT_IMAGE, DEFAULT_INSTANCE_TYPE, PROBE_IMAGE, SECURITY_GROUP_ID, SUBNET_ID,
};
use tokio::time::Instant;

const SHORT_BUDGET: Duration = Duration::from_secs(60);

#[fixture]
fn network() -> NetworkParams {
    NetworkParams {
        image: String::from(DEFAULT_IMAGE),
        machine_size: String::from(DEFAULT_INSTANCE_TYPE),
        subnet_id: String::from(SUBNET_ID),
        security_group_id: String::from(SECURITY_GROUP_ID),
    }
}

#[fixture]
fn endpoints() -> EndpointConfig {
    EndpointConfig::from_yaml_str(
        "endpoints:\n  - host: registry.example.com\n    ports: [443]\n",
    )
    .expect("endpoint fixture should parse")
}

fn verifier<C>(client: C) -> Verifier<C>
where
    C: CloudResourceClient + Sync,
{
    Verifier::new(client, ProbeSettings::new(PROBE_IMAGE))
        .with_poll_policy(PollPolicy::new(SHORT_BUDGET, Duration::from_secs(1)))
        .with_probe_grace_period(Duration::ZERO)
}

async fn run(
    client: &ScriptedClient,
    network: &NetworkParams,
    endpoints: &EndpointConfig,
) -> VerificationResult<ScriptedClientError> {
    verifier(client.clone()).verify(network, endpoints).await
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn running_instance_passes_and_is_terminated(
    network: NetworkParams,
    endpoints: EndpointConfig,
) {
    let client = ScriptedClient::new();
    client.push_status(ScriptedStatus::NoStatusYet);
    client.push_status(ScriptedStatus::State(InstanceState::Pending));
    client.push_status(ScriptedStatus::State(InstanceState::Running));

    let result = run(&client, &network, &endpoints).await;

    assert!(result.passed(), "verdict: {:?}", result.verdict);
    assert_eq!(result.exit_code(), 0);
    assert_eq!(result.instance_id.as_deref(), Some(SCRIPTED_INSTANCE_ID));
    assert_eq!(result.poll.as_ref().map(|poll| poll.attempts), Some(3));
    assert!(matches!(result.teardown, TeardownStatus::Terminated));
    assert_eq!(client.create_calls(), 1);
    assert_eq!(client.terminate_calls(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn request_carries_network_and_bootstrap(network: NetworkParams, endpoints: EndpointConfig) {
    let client = ScriptedClient::new();
    client.push_status(ScriptedStatus::State(InstanceState::Running));

    run(&client, &network, &endpoints).await;

    let requests: Vec<InstanceRequest> = client.requests();
    let [request] = requests.as_slice() else {
        panic!("expected exactly one create request, got {}", requests.len());
    };
    assert_eq!(request.subnet_id, SUBNET_ID);
    assert_eq!(request.security_group_id, SECURITY_GROUP_ID);
    assert_eq!(request.machine_size, DEFAULT_INSTANCE_TYPE);
    assert_eq!(request.count, 1);
    assert!(request.bootstrap.script().contains(PROBE_IMAGE));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn non_running_states_keep_polling(network: NetworkParams, endpoints: EndpointConfig) {
    let client = ScriptedClient::new();
    client.push_status(ScriptedStatus::State(InstanceState::Stopped));
    client.push_status(ScriptedStatus::State(InstanceState::Stopping));
    client.push_status(ScriptedStatus::State(InstanceState::Running));

    let result = run(&client, &network, &endpoints).await;

    assert!(result.passed());
    assert_eq!(client.describe_calls(), 3);
    assert_eq!(client.terminate_calls(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn authorization_denial_fails_without_retry(
    network: NetworkParams,
    endpoints: EndpointConfig,
) {
    let client = ScriptedClient::new();
    client.push_status(ScriptedStatus::Unauthorized);

    let result = run(&client, &network, &endpoints).await;

    assert!(
        matches!(result.verdict, Err(VerifyError::Authorization { .. })),
        "verdict: {:?}",
        result.verdict
    );
    assert_eq!(
        result.poll.as_ref().map(|poll| poll.final_state),
        Some(InstanceState::Unauthorized)
    );
    assert_eq!(result.exit_code(), 1);
    assert_eq!(client.describe_calls(), 1);
    assert_eq!(client.terminate_calls(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn query_failure_fails_the_run(network: NetworkParams, endpoints: EndpointConfig) {
    let client = ScriptedClient::new();
    client.push_status(ScriptedStatus::QueryFailure);

    let result = run(&client, &network, &endpoints).await;

    assert!(matches!(result.verdict, Err(VerifyError::Query { .. })));
    assert_eq!(client.describe_calls(), 1);
    assert_eq!(client.terminate_calls(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn silent_instance_times_out_after_the_budget(
    network: NetworkParams,
    endpoints: EndpointConfig,
) {
    let client = ScriptedClient::new();
    let started = Instant::now();

    let result = run(&client, &network, &endpoints).await;

    assert_eq!(started.elapsed(), SHORT_BUDGET);
    let Err(VerifyError::PollTimeout {
        instance_id,
        budget_secs,
        ..
    }) = &result.verdict
    else {
        panic!("expected timeout, got {:?}", result.verdict);
    };
    assert_eq!(instance_id, SCRIPTED_INSTANCE_ID);
    assert_eq!(*budget_secs, SHORT_BUDGET.as_secs());
    assert!(result.poll.as_ref().is_some_and(|poll| poll.budget_exhausted));
    assert_eq!(client.terminate_calls(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn provision_failure_skips_polling_and_teardown(
    network: NetworkParams,
    endpoints: EndpointConfig,
) {
    let client = ScriptedClient::new();
    client.fail_on_create();

    let result = run(&client, &network, &endpoints).await;

    assert!(matches!(result.verdict, Err(VerifyError::Provision(_))));
    assert!(matches!(result.teardown, TeardownStatus::NotRequired));
    assert!(result.instance_id.is_none());
    assert_eq!(client.describe_calls(), 0);
    assert_eq!(client.terminate_calls(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn invalid_network_never_reaches_the_provider(
    network: NetworkParams,
    endpoints: EndpointConfig,
) {
    let client = ScriptedClient::new();
    let blank_subnet = NetworkParams {
        subnet_id: String::from("   "),
        ..network
    };

    let result = run(&client, &blank_subnet, &endpoints).await;

    assert!(matches!(result.verdict, Err(VerifyError::Request(_))));
    assert_eq!(client.create_calls(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn vanished_instance_counts_as_clean_teardown(
    network: NetworkParams,
    endpoints: EndpointConfig,
) {
    let client = ScriptedClient::new();
    client.push_status(ScriptedStatus::State(InstanceState::Running));
    client.set_teardown(ScriptedTeardown::NotFound);

    let result = run(&client, &network, &endpoints).await;

    assert!(matches!(result.teardown, TeardownStatus::AlreadyGone));
    assert_eq!(result.exit_code(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn teardown_failure_does_not_mask_the_verdict(
    network: NetworkParams,
    endpoints: EndpointConfig,
) {
    let client = ScriptedClient::new();
    client.push_status(ScriptedStatus::State(InstanceState::Running));
    client.set_teardown(ScriptedTeardown::Fail);

    let passed = run(&client, &network, &endpoints).await;
    assert!(passed.passed());
    assert!(matches!(passed.teardown, TeardownStatus::Failed(_)));
    assert_eq!(passed.exit_code(), 2);

    let failing = ScriptedClient::new();
    failing.push_status(ScriptedStatus::QueryFailure);
    failing.set_teardown(ScriptedTeardown::Fail);

    let failed = run(&failing, &network, &endpoints).await;
    assert!(matches!(failed.verdict, Err(VerifyError::Query { .. })));
    assert_eq!(failed.exit_code(), 1);

    let mut summary = Vec::new();
    failed
        .write_summary(&mut summary)
        .expect("summary should render");
    let rendered = String::from_utf8(summary).expect("utf8");
    assert!(rendered.contains("Verification failed"), "{rendered}");
    assert!(rendered.contains("Failed to terminate"), "{rendered}");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn grace_period_keeps_the_instance_alive(network: NetworkParams, endpoints: EndpointConfig) {
    let client = ScriptedClient::new();
    client.push_status(ScriptedStatus::State(InstanceState::Running));
    let grace = Duration::from_secs(30);
    let started = Instant::now();

    let result = verifier(client.clone())
        .with_probe_grace_period(grace)
        .verify(&network, &endpoints)
        .await;

    assert!(result.passed());
    // First scheduled wait is twice the initial wait.
    assert_eq!(started.elapsed(), Duration::from_secs(2) + grace);
    assert_eq!(client.terminate_calls(), 1);
}

fn exploding_status_lookup() -> Result<Option<InstanceState>, ScriptedClientError> {
    panic!("status lookup exploded")
}

/// Delegates to a [`ScriptedClient`] but panics when asked for status.
struct PanickingClient {
    inner: ScriptedClient,
}

impl CloudResourceClient for PanickingClient {
    type Error = ScriptedClientError;

    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error> {
        self.inner.create_instance(request)
    }

    fn describe_instance_status<'a>(
        &'a self,
        _handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, Option<InstanceState>, Self::Error> {
        Box::pin(async { exploding_status_lookup() })
    }

    fn terminate_instance<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, (), Self::Error> {
        self.inner.terminate_instance(handle)
    }
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn panic_after_creation_still_terminates(network: NetworkParams, endpoints: EndpointConfig) {
    let scripted = ScriptedClient::new();
    let verifier = verifier(PanickingClient {
        inner: scripted.clone(),
    });

    let outcome = AssertUnwindSafe(verifier.verify(&network, &endpoints))
        .catch_unwind()
        .await;

    assert!(outcome.is_err(), "the panic should propagate");
    assert_eq!(scripted.create_calls(), 1);
    assert_eq!(scripted.terminate_calls(), 1);
}
