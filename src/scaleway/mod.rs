//! Scaleway implementation of the cloud resource client.
//!
//! The subnet under test is a Scaleway Private Network. The probe server is
//! created stopped in the configured zone with the requested security group,
//! receives the bootstrap payload as cloud-init user-data, joins the Private
//! Network through a private NIC, and is then powered on. If any step after
//! creation fails, the server is removed before the error is returned.

mod error;
mod lifecycle;
mod types;
mod user_data;

use scaleway_rs::ScalewayApi;
use tracing::warn;

use crate::backend::{
    BackendFuture, CloudResourceClient, InstanceHandle, InstanceRequest, InstanceState,
};
use crate::config::ScalewayConfig;
use lifecycle::ImageQuery;
use types::Zone;

pub use error::ScalewayClientError;

/// Client that provisions probe instances through the Scaleway Instances API.
#[derive(Clone)]
pub struct ScalewayClient {
    api: ScalewayApi,
    config: ScalewayConfig,
}

impl ScalewayClient {
    /// Constructs a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayClientError::Config`] when the provided configuration
    /// fails validation.
    pub fn new(config: ScalewayConfig) -> Result<Self, ScalewayClientError> {
        config.validate()?;
        Ok(Self {
            api: ScalewayApi::new(&config.secret_key),
            config,
        })
    }

    /// Zone the client provisions into.
    #[must_use]
    pub fn zone(&self) -> &str {
        &self.config.default_zone
    }

    fn zone_id(&self) -> Zone {
        Zone::from(self.config.default_zone.as_str())
    }
}

impl CloudResourceClient for ScalewayClient {
    type Error = ScalewayClientError;

    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(async move {
            request.validate()?;
            if request.count != 1 {
                return Err(ScalewayClientError::UnsupportedCount {
                    count: request.count,
                });
            }

            let zone = self.zone_id();
            let image_id = self
                .resolve_image_id(ImageQuery {
                    label: &request.image,
                    arch: &self.config.default_architecture,
                    zone: zone.as_str(),
                })
                .await?;

            let snapshot = self
                .create_instance_stopped(&zone, request, &image_id)
                .await?;
            let handle = InstanceHandle {
                id: snapshot.id.clone(),
            };

            if let Err(err) = self.prepare_and_boot(&zone, &snapshot, request).await {
                warn!(instance_id = %handle.id, error = %err, "probe instance failed to boot");
                self.discard(&zone, &handle).await;
                return Err(err);
            }
            Ok(handle)
        })
    }

    fn describe_instance_status<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, Option<InstanceState>, Self::Error> {
        Box::pin(async move {
            let snapshot = self.fetch_instance(&self.zone_id(), &handle.id).await?;
            Ok(snapshot.map(|server| server.state.to_instance_state()))
        })
    }

    fn terminate_instance<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move { self.remove_instance(&self.zone_id(), &handle.id).await })
    }
}
