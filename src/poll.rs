//! Exponential-backoff polling of instance state.
//!
//! The poller keeps a remaining-time budget and a current wait. Each round
//! doubles the wait (capped at what is left of the budget), sleeps, charges
//! the wait to the budget and queries the status once. Polling stops on the
//! first of:
//!
//! - the instance reports `running` (success),
//! - the status query is denied for lack of permissions,
//! - the status query fails for any other reason,
//! - the budget is spent.
//!
//! A query that succeeds but reports no status yet counts as still pending.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::backend::{CloudResourceClient, InstanceHandle, InstanceState, ProviderError};

/// Default overall polling budget.
pub const DEFAULT_POLL_BUDGET: Duration = Duration::from_secs(25 * 60);

/// Default starting wait; the first sleep is twice this value.
pub const DEFAULT_INITIAL_WAIT: Duration = Duration::from_secs(1);

const MIN_WAIT: Duration = Duration::from_millis(1);

/// Timing parameters for [`StatePoller`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Total time the poller may spend sleeping.
    pub budget: Duration,
    /// Wait the schedule starts doubling from.
    pub initial_wait: Duration,
}

impl PollPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(budget: Duration, initial_wait: Duration) -> Self {
        Self {
            budget,
            initial_wait,
        }
    }

    /// Returns the sequence of waits this policy produces.
    #[must_use]
    pub fn schedule(&self) -> BackoffSchedule {
        BackoffSchedule {
            current: self.initial_wait.max(MIN_WAIT),
            remaining: self.budget,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_BUDGET, DEFAULT_INITIAL_WAIT)
    }
}

/// Doubling waits capped by a shrinking budget.
///
/// Waits never decrease except for the final one, which is cut to whatever
/// budget remains; their sum is exactly the budget.
#[derive(Clone, Debug)]
pub struct BackoffSchedule {
    current: Duration,
    remaining: Duration,
}

impl BackoffSchedule {
    /// Budget not yet handed out.
    #[must_use]
    pub const fn remaining(&self) -> Duration {
        self.remaining
    }
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining.is_zero() {
            return None;
        }
        let doubled = self.current.saturating_mul(2);
        let wait = doubled.min(self.remaining);
        self.current = doubled;
        self.remaining = self.remaining.saturating_sub(wait);
        Some(wait)
    }
}

/// Result of a polling run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PollOutcome {
    /// Last state observed, or the terminal classification.
    pub final_state: InstanceState,
    /// Number of status queries issued.
    pub attempts: u32,
    /// Rendered provider error that ended polling, if any.
    pub last_error: Option<String>,
    /// Whether polling stopped because the budget ran out.
    pub budget_exhausted: bool,
}

impl PollOutcome {
    /// `true` when the instance reached the running state.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.final_state == InstanceState::Running
    }
}

/// Waits for an instance to reach the running state.
#[derive(Clone, Debug, Default)]
pub struct StatePoller {
    policy: PollPolicy,
}

/// A poll that ended on a provider error keeps the error value so the
/// caller can surface it with its source chain intact.
#[derive(Debug)]
pub struct PollFailure<E> {
    /// Summary of the polling run.
    pub outcome: PollOutcome,
    /// Error returned by the final status query.
    pub error: E,
}

impl StatePoller {
    /// Creates a poller with the given policy.
    #[must_use]
    pub const fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// Policy in use.
    #[must_use]
    pub const fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Polls until the instance runs, a query fails, or the budget is spent.
    ///
    /// Budget exhaustion is reported as `Ok` with
    /// [`PollOutcome::budget_exhausted`] set, since no provider error
    /// caused it.
    ///
    /// # Errors
    ///
    /// Returns [`PollFailure`] when a status query fails. Its outcome has
    /// `final_state` set to [`InstanceState::Unauthorized`] for an
    /// authorization denial and [`InstanceState::Unknown`] otherwise; in
    /// both cases no further query is issued.
    pub async fn poll<C>(
        &self,
        client: &C,
        handle: &InstanceHandle,
    ) -> Result<PollOutcome, PollFailure<C::Error>>
    where
        C: CloudResourceClient + Sync,
    {
        let mut attempts = 0_u32;
        let mut last_state = InstanceState::Pending;

        for wait in self.policy.schedule() {
            sleep(wait).await;
            attempts = attempts.saturating_add(1);

            match client.describe_instance_status(handle).await {
                Ok(Some(InstanceState::Running)) => {
                    info!(instance_id = %handle.id, attempts, "instance running");
                    return Ok(PollOutcome {
                        final_state: InstanceState::Running,
                        attempts,
                        last_error: None,
                        budget_exhausted: false,
                    });
                }
                Ok(Some(state)) => {
                    debug!(instance_id = %handle.id, %state, ?wait, "instance not running yet");
                    last_state = state;
                }
                Ok(None) => {
                    debug!(instance_id = %handle.id, ?wait, "instance has no status yet");
                }
                Err(error) => {
                    let final_state = if error.is_unauthorized() {
                        InstanceState::Unauthorized
                    } else {
                        InstanceState::Unknown
                    };
                    warn!(
                        instance_id = %handle.id,
                        attempts,
                        %final_state,
                        %error,
                        "could not get instance state"
                    );
                    return Err(PollFailure {
                        outcome: PollOutcome {
                            final_state,
                            attempts,
                            last_error: Some(error.to_string()),
                            budget_exhausted: false,
                        },
                        error,
                    });
                }
            }
        }

        warn!(
            instance_id = %handle.id,
            attempts,
            budget_secs = self.policy.budget.as_secs(),
            "instance did not reach running state within the polling budget"
        );
        Ok(PollOutcome {
            final_state: last_state,
            attempts,
            last_error: None,
            budget_exhausted: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedClient, ScriptedStatus};

    fn handle() -> InstanceHandle {
        InstanceHandle {
            id: String::from("i-123"),
        }
    }

    #[test]
    fn schedule_doubles_and_caps_at_remaining_budget() {
        let policy = PollPolicy::new(Duration::from_secs(20), Duration::from_secs(1));
        let waits: Vec<u64> = policy.schedule().map(|wait| wait.as_secs()).collect();
        assert_eq!(waits, vec![2, 4, 8, 6]);
    }

    #[test]
    fn default_schedule_spends_exactly_the_budget() {
        let policy = PollPolicy::default();
        let waits: Vec<Duration> = policy.schedule().collect();
        let total: Duration = waits.iter().sum();
        assert_eq!(total, DEFAULT_POLL_BUDGET);
        assert_eq!(waits.first(), Some(&Duration::from_secs(2)));
    }

    #[test]
    fn zero_budget_yields_no_waits() {
        let policy = PollPolicy::new(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(policy.schedule().count(), 0);
    }

    #[test]
    fn zero_initial_wait_still_terminates() {
        let policy = PollPolicy::new(Duration::from_millis(100), Duration::ZERO);
        let total: Duration = policy.schedule().sum();
        assert_eq!(total, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn running_state_stops_polling() {
        let client = ScriptedClient::new();
        client.push_status(ScriptedStatus::NoStatusYet);
        client.push_status(ScriptedStatus::State(InstanceState::Pending));
        client.push_status(ScriptedStatus::State(InstanceState::Running));

        let outcome = StatePoller::default()
            .poll(&client, &handle())
            .await
            .unwrap_or_else(|failure| panic!("poll failed: {:?}", failure.outcome));

        assert!(outcome.is_running());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(client.describe_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn authorization_denial_halts_immediately() {
        let client = ScriptedClient::new();
        client.push_status(ScriptedStatus::Unauthorized);

        let failure = StatePoller::default()
            .poll(&client, &handle())
            .await
            .expect_err("denial should fail");

        assert_eq!(failure.outcome.final_state, InstanceState::Unauthorized);
        assert_eq!(failure.outcome.attempts, 1);
        assert!(failure.error.is_unauthorized());
        assert_eq!(client.describe_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn other_query_errors_stop_polling() {
        let client = ScriptedClient::new();
        client.push_status(ScriptedStatus::NoStatusYet);
        client.push_status(ScriptedStatus::QueryFailure);

        let failure = StatePoller::default()
            .poll(&client, &handle())
            .await
            .expect_err("query failure should fail");

        assert_eq!(failure.outcome.final_state, InstanceState::Unknown);
        assert_eq!(failure.outcome.attempts, 2);
        assert!(failure.outcome.last_error.is_some());
        assert_eq!(client.describe_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_status_until_budget_exhausted_times_out() {
        let client = ScriptedClient::new();
        let policy = PollPolicy::new(Duration::from_secs(60), Duration::from_secs(1));
        let expected_attempts = policy.schedule().count();
        let started = tokio::time::Instant::now();

        let outcome = StatePoller::new(policy)
            .poll(&client, &handle())
            .await
            .unwrap_or_else(|failure| panic!("poll failed: {:?}", failure.outcome));

        assert!(outcome.budget_exhausted);
        assert!(!outcome.is_running());
        assert_eq!(outcome.final_state, InstanceState::Pending);
        assert_eq!(usize::try_from(outcome.attempts).ok(), Some(expected_attempts));
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }
}
