//! Test support utilities shared across unit and integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::backend::{
    BackendFuture, CloudResourceClient, InstanceHandle, InstanceRequest, InstanceState,
    ProviderError,
};

/// Identifier returned by [`ScriptedClient::create_instance`].
pub const SCRIPTED_INSTANCE_ID: &str = "scripted-instance";

/// Scripted response to a status query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScriptedStatus {
    /// The provider does not report the instance yet.
    NoStatusYet,
    /// The provider reports this state.
    State(InstanceState),
    /// The query is denied for lack of permissions.
    Unauthorized,
    /// The query fails for an unexplained reason.
    QueryFailure,
}

/// How teardown should respond.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ScriptedTeardown {
    /// Terminate succeeds.
    #[default]
    Succeed,
    /// The instance is already gone.
    NotFound,
    /// Terminate fails.
    Fail,
}

/// Errors produced by [`ScriptedClient`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedClientError {
    /// Creation was rejected.
    #[error("create failure")]
    Create,
    /// A status query was denied.
    #[error("UnauthorizedOperation: scripted denial")]
    Unauthorized,
    /// A status query failed.
    #[error("status query failure")]
    Query,
    /// The instance no longer exists.
    #[error("instance not found")]
    NotFound,
    /// Teardown failed.
    #[error("terminate failure")]
    Terminate,
}

impl ProviderError for ScriptedClientError {
    fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[derive(Debug, Default)]
struct State {
    fail_on_create: bool,
    statuses: VecDeque<ScriptedStatus>,
    teardown: ScriptedTeardown,
    denied: bool,
    create_calls: u32,
    describe_calls: u32,
    terminate_calls: u32,
    requests: Vec<InstanceRequest>,
}

/// Cloud client double that replays scripted status responses and records
/// every call.
///
/// Once the status queue is drained every further query reports no status
/// yet. A query issued after an authorization denial panics, so tests fail
/// loudly if the poller retries a denial.
#[derive(Clone, Debug, Default)]
pub struct ScriptedClient {
    state: Arc<Mutex<State>>,
}

impl ScriptedClient {
    /// Creates a client whose instance never reports a status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|err| panic!("scripted client lock poisoned: {err}"))
    }

    /// Makes instance creation fail.
    pub fn fail_on_create(&self) {
        self.lock().fail_on_create = true;
    }

    /// Queues a status response.
    pub fn push_status(&self, status: ScriptedStatus) {
        self.lock().statuses.push_back(status);
    }

    /// Sets the teardown behaviour.
    pub fn set_teardown(&self, teardown: ScriptedTeardown) {
        self.lock().teardown = teardown;
    }

    /// Number of create calls.
    #[must_use]
    pub fn create_calls(&self) -> u32 {
        self.lock().create_calls
    }

    /// Number of status queries.
    #[must_use]
    pub fn describe_calls(&self) -> u32 {
        self.lock().describe_calls
    }

    /// Number of terminate calls.
    #[must_use]
    pub fn terminate_calls(&self) -> u32 {
        self.lock().terminate_calls
    }

    /// Requests received by `create_instance`.
    #[must_use]
    pub fn requests(&self) -> Vec<InstanceRequest> {
        self.lock().requests.clone()
    }
}

impl CloudResourceClient for ScriptedClient {
    type Error = ScriptedClientError;

    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.create_calls += 1;
            state.requests.push(request.clone());
            if state.fail_on_create {
                return Err(ScriptedClientError::Create);
            }
            Ok(InstanceHandle {
                id: SCRIPTED_INSTANCE_ID.to_owned(),
            })
        })
    }

    fn describe_instance_status<'a>(
        &'a self,
        _handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, Option<InstanceState>, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            assert!(
                !state.denied,
                "status queried again after an authorization denial"
            );
            state.describe_calls += 1;
            match state
                .statuses
                .pop_front()
                .unwrap_or(ScriptedStatus::NoStatusYet)
            {
                ScriptedStatus::NoStatusYet => Ok(None),
                ScriptedStatus::State(instance_state) => Ok(Some(instance_state)),
                ScriptedStatus::Unauthorized => {
                    state.denied = true;
                    Err(ScriptedClientError::Unauthorized)
                }
                ScriptedStatus::QueryFailure => Err(ScriptedClientError::Query),
            }
        })
    }

    fn terminate_instance<'a>(
        &'a self,
        _handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.terminate_calls += 1;
            match state.teardown {
                ScriptedTeardown::Succeed => Ok(()),
                ScriptedTeardown::NotFound => Err(ScriptedClientError::NotFound),
                ScriptedTeardown::Fail => Err(ScriptedClientError::Terminate),
            }
        })
    }
}
