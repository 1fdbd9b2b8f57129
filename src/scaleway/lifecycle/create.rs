//! Instance creation helpers for the Scaleway client.
//!
//! Scaleway instances must receive cloud-init user-data before first boot.
//! The server is created stopped, receives the bootstrap payload, is attached
//! to the Private Network under test, and only then powered on.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{InstanceHandle, InstanceRequest};
use crate::scaleway::error::ApiErrorBody;
use crate::scaleway::types::Zone;
use crate::scaleway::user_data::{
    CLOUD_INIT_USER_DATA_KEY, private_nics_url, servers_url, user_data_url,
};

use super::super::{ScalewayClient, ScalewayClientError};
use super::{HTTP_CLIENT, InstanceSnapshot, send_checked};

const INSTANCE_TAGS: [&str; 2] = ["egress-verifier", "ephemeral"];

#[derive(Serialize)]
struct CreateServerRequest {
    name: String,
    commercial_type: String,
    image: String,
    project: String,
    routed_ip_enabled: bool,
    dynamic_ip_required: bool,
    security_group: String,
    tags: Vec<String>,
    stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization: Option<String>,
}

#[derive(Deserialize)]
struct CreateServerResponse {
    server: scaleway_rs::ScalewayInstance,
}

/// Minimal view of a create response, used when the full body is unreadable.
#[derive(Deserialize)]
struct CreatedServerId {
    server: ServerId,
}

#[derive(Deserialize)]
struct ServerId {
    id: String,
}

fn created_server_id(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<CreatedServerId>(body)
        .ok()
        .map(|created| created.server.id)
}

#[derive(Serialize)]
struct AttachPrivateNicRequest<'a> {
    private_network_id: &'a str,
}

impl ScalewayClient {
    /// Creates a Scaleway instance in a stopped state.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayClientError`] when the Scaleway API request fails or
    /// the provider rejects the requested instance type.
    pub(in crate::scaleway) async fn create_instance_stopped(
        &self,
        zone: &Zone,
        request: &InstanceRequest,
        image_id: &str,
    ) -> Result<InstanceSnapshot, ScalewayClientError> {
        let payload = CreateServerRequest {
            name: format!("egress-probe-{}", Uuid::new_v4().simple()),
            commercial_type: request.machine_size.clone(),
            image: image_id.to_owned(),
            project: self.config.default_project_id.clone(),
            routed_ip_enabled: true,
            dynamic_ip_required: true,
            security_group: request.security_group_id.clone(),
            tags: INSTANCE_TAGS.iter().map(|tag| (*tag).to_owned()).collect(),
            stopped: true,
            organization: self.config.default_organization_id.clone(),
        };

        let response = HTTP_CLIENT
            .post(servers_url(zone.as_str()))
            .json(&payload)
            .header("X-Auth-Token", &self.config.secret_key)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            let parse_error = match serde_json::from_slice::<CreateServerResponse>(&body) {
                Ok(parsed) => return Ok(parsed.server.into()),
                Err(err) => err,
            };
            self.discard_unreadable(zone, &body).await;
            return Err(ScalewayClientError::Provider {
                message: format!("unreadable create response: {parse_error}"),
            });
        }

        if serde_json::from_slice::<ApiErrorBody>(&body)
            .is_ok_and(|api_err| api_err.names_commercial_type())
        {
            return Err(ScalewayClientError::InstanceTypeUnavailable {
                instance_type: request.machine_size.clone(),
                zone: zone.as_str().to_owned(),
            });
        }
        Err(ScalewayClientError::from_response(status.as_u16(), &body))
    }

    /// Uploads the bootstrap payload, joins the Private Network, and boots
    /// the server.
    pub(in crate::scaleway) async fn prepare_and_boot(
        &self,
        zone: &Zone,
        snapshot: &InstanceSnapshot,
        request: &InstanceRequest,
    ) -> Result<(), ScalewayClientError> {
        self.upload_user_data(zone, &snapshot.id, request.bootstrap.script())
            .await?;
        self.attach_private_nic(zone, &snapshot.id, &request.subnet_id)
            .await?;
        self.power_on_if_needed(zone, snapshot).await
    }

    async fn upload_user_data(
        &self,
        zone: &Zone,
        server_id: &str,
        script: &str,
    ) -> Result<(), ScalewayClientError> {
        let url = user_data_url(zone.as_str(), server_id, CLOUD_INIT_USER_DATA_KEY);
        let builder = HTTP_CLIENT
            .patch(url)
            .header("Content-Type", "text/plain")
            .body(script.to_owned());
        send_checked(builder, &self.config.secret_key).await?;
        debug!(instance_id = server_id, "uploaded bootstrap payload");
        Ok(())
    }

    async fn attach_private_nic(
        &self,
        zone: &Zone,
        server_id: &str,
        private_network_id: &str,
    ) -> Result<(), ScalewayClientError> {
        let builder = HTTP_CLIENT
            .post(private_nics_url(zone.as_str(), server_id))
            .json(&AttachPrivateNicRequest { private_network_id });
        send_checked(builder, &self.config.secret_key).await?;
        debug!(
            instance_id = server_id,
            private_network_id, "attached instance to private network"
        );
        Ok(())
    }

    async fn power_on_if_needed(
        &self,
        zone: &Zone,
        snapshot: &InstanceSnapshot,
    ) -> Result<(), ScalewayClientError> {
        if snapshot.state.as_str() == "running" {
            return Ok(());
        }
        self.api
            .perform_instance_action_async(zone.as_str(), &snapshot.id, "poweron")
            .await?;
        Ok(())
    }

    /// Removes a server whose create response could not be parsed, when its
    /// id can still be recovered from the body.
    async fn discard_unreadable(&self, zone: &Zone, body: &[u8]) {
        let Some(id) = created_server_id(body) else {
            warn!("create response carried no server id; the server may have leaked");
            return;
        };
        self.discard(zone, &InstanceHandle { id }).await;
    }

    /// Removes a server that failed to boot. Errors are logged, not returned,
    /// so the original failure reaches the caller.
    pub(in crate::scaleway) async fn discard(&self, zone: &Zone, handle: &InstanceHandle) {
        if let Err(err) = self.api.delete_instance_async(zone.as_str(), &handle.id).await {
            warn!(
                instance_id = %handle.id,
                error = %ScalewayClientError::from(err),
                "failed to remove partially provisioned instance"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn partial_create_response_still_yields_the_server_id() {
        let body = br#"{"server":{"id":"11111111-2222-3333-4444-555555555555","name":"egress-probe"}}"#;
        assert!(serde_json::from_slice::<CreateServerResponse>(body).is_err());
        assert_eq!(
            created_server_id(body).as_deref(),
            Some("11111111-2222-3333-4444-555555555555")
        );
    }

    #[rstest]
    #[case(b"not json".as_slice())]
    #[case(br#"{"server":{}}"#.as_slice())]
    #[case(br#"{"servers":[]}"#.as_slice())]
    fn unreadable_bodies_yield_no_id(#[case] body: &[u8]) {
        assert_eq!(created_server_id(body), None);
    }
}
