//! Status lookups for the Scaleway client.

use crate::scaleway::types::Zone;

use super::super::{ScalewayClient, ScalewayClientError};
use super::InstanceSnapshot;

impl ScalewayClient {
    /// Fetches the server, returning `None` when the API does not list it.
    pub(in crate::scaleway) async fn fetch_instance(
        &self,
        zone: &Zone,
        instance_id: &str,
    ) -> Result<Option<InstanceSnapshot>, ScalewayClientError> {
        let mut servers = self
            .api
            .list_instances(zone.as_str())
            .servers(instance_id)
            .per_page(1)
            .run_async()
            .await?;

        Ok(servers.pop().map(InstanceSnapshot::from))
    }
}
