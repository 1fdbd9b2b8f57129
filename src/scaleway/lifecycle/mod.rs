//! Instance lifecycle helpers for the Scaleway client.

use std::sync::LazyLock;
use std::time::Duration;

mod create;
mod image;
mod status;
mod terminate;

pub(in crate::scaleway) use image::ImageQuery;

use crate::scaleway::ScalewayClientError;
use crate::scaleway::types::{Action, ServerState};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct InstanceSnapshot {
    pub(crate) id: String,
    pub(crate) state: ServerState,
    pub(crate) allowed_actions: Vec<Action>,
}

impl InstanceSnapshot {
    pub(crate) fn allows(&self, action: &str) -> bool {
        self.allowed_actions
            .iter()
            .any(|allowed| allowed.as_str() == action)
    }
}

impl From<scaleway_rs::ScalewayInstance> for InstanceSnapshot {
    fn from(server: scaleway_rs::ScalewayInstance) -> Self {
        Self {
            id: server.id,
            state: server.state.into(),
            allowed_actions: server
                .allowed_actions
                .into_iter()
                .map(Action::from)
                .collect(),
        }
    }
}

/// Sends an authenticated request and returns the body of a successful
/// response.
async fn send_checked(
    builder: reqwest::RequestBuilder,
    secret_key: &str,
) -> Result<Vec<u8>, ScalewayClientError> {
    let response = builder.header("X-Auth-Token", secret_key).send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    if status.is_success() {
        return Ok(body.to_vec());
    }
    Err(ScalewayClientError::from_response(status.as_u16(), &body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_checks_allowed_actions() {
        let snapshot = InstanceSnapshot {
            id: String::from("srv"),
            state: ServerState::from("running"),
            allowed_actions: vec![Action::from("poweroff"), Action::from("terminate")],
        };
        assert!(snapshot.allows("terminate"));
        assert!(!snapshot.allows("poweron"));
    }
}
