//! Teardown helpers for the Scaleway client.
//!
//! A running server is terminated, which also removes its volumes. A
//! stopped server no longer offers that action and is deleted instead.
//! Servers caught mid-transition (`starting`, `stopping`) are re-fetched
//! until one of those actions becomes available, and the server is then
//! watched until the API stops listing it.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::scaleway::types::Zone;

use super::super::{ScalewayClient, ScalewayClientError};
use super::InstanceSnapshot;

/// Teardown step chosen for a server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(in crate::scaleway) enum TeardownAction {
    Terminate,
    Delete,
}

impl TeardownAction {
    pub(in crate::scaleway) fn for_snapshot(snapshot: &InstanceSnapshot) -> Option<Self> {
        if snapshot.allows("terminate") {
            return Some(Self::Terminate);
        }
        matches!(snapshot.state.as_str(), "stopped" | "stopped in place").then_some(Self::Delete)
    }
}

/// Bounds on the waits around a teardown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(in crate::scaleway) struct TeardownWait {
    pub(in crate::scaleway) interval: Duration,
    pub(in crate::scaleway) timeout: Duration,
}

impl TeardownWait {
    pub(in crate::scaleway) const DEFAULT: Self = Self {
        interval: Duration::from_secs(5),
        timeout: Duration::from_secs(300),
    };
}

impl ScalewayClient {
    pub(in crate::scaleway) async fn remove_instance(
        &self,
        zone: &Zone,
        instance_id: &str,
    ) -> Result<(), ScalewayClientError> {
        let wait = TeardownWait::DEFAULT;
        let fetch = || self.fetch_instance(zone, instance_id);

        match settle_for_teardown(fetch, instance_id, wait).await? {
            TeardownAction::Terminate => {
                debug!(instance_id, "terminating server");
                self.api
                    .perform_instance_action_async(zone.as_str(), instance_id, "terminate")
                    .await?;
            }
            TeardownAction::Delete => {
                debug!(instance_id, "deleting stopped server");
                self.api
                    .delete_instance_async(zone.as_str(), instance_id)
                    .await?;
            }
        }

        wait_until_gone(fetch, instance_id, wait).await
    }
}

/// Re-fetches the server until a teardown action applies.
///
/// # Errors
///
/// Returns [`ScalewayClientError::NotFound`] when the server disappears and
/// [`ScalewayClientError::TerminateNotAllowed`] when it is still
/// transitioning at the deadline.
pub(in crate::scaleway) async fn settle_for_teardown<F, Fut>(
    mut fetch: F,
    instance_id: &str,
    wait: TeardownWait,
) -> Result<TeardownAction, ScalewayClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<InstanceSnapshot>, ScalewayClientError>>,
{
    let deadline = Instant::now() + wait.timeout;
    loop {
        let Some(snapshot) = fetch().await? else {
            return Err(ScalewayClientError::NotFound {
                instance_id: instance_id.to_owned(),
            });
        };
        if let Some(action) = TeardownAction::for_snapshot(&snapshot) {
            return Ok(action);
        }
        if Instant::now() >= deadline {
            return Err(ScalewayClientError::TerminateNotAllowed {
                instance_id: instance_id.to_owned(),
                state: snapshot.state.as_str().to_owned(),
            });
        }
        debug!(
            instance_id,
            state = snapshot.state.as_str(),
            "waiting for server to settle before teardown"
        );
        sleep(wait.interval).await;
    }
}

/// Polls until the API no longer lists the server.
///
/// # Errors
///
/// Returns [`ScalewayClientError::ResidualResource`] when the server is still
/// listed at the deadline.
pub(in crate::scaleway) async fn wait_until_gone<F, Fut>(
    mut fetch: F,
    instance_id: &str,
    wait: TeardownWait,
) -> Result<(), ScalewayClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<InstanceSnapshot>, ScalewayClientError>>,
{
    let deadline = Instant::now() + wait.timeout;
    while Instant::now() <= deadline {
        if fetch().await?.is_none() {
            return Ok(());
        }
        sleep(wait.interval).await;
    }

    Err(ScalewayClientError::ResidualResource {
        instance_id: instance_id.to_owned(),
    })
}
