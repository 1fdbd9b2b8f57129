//! Image resolution helpers for the Scaleway client.
//!
//! An image given as a UUID is used as is. Any other value is treated as a
//! label: project-scoped images win over public ones, candidates must match
//! the configured architecture and be available, and the newest one is
//! chosen.

use std::future::Future;

use scaleway_rs::{ScalewayImage, ScalewayListInstanceImagesBuilder};
use uuid::Uuid;

use super::super::{ScalewayClient, ScalewayClientError};

/// Parameters of one image lookup.
#[derive(Clone, Copy, Debug)]
pub(in crate::scaleway) struct ImageQuery<'a> {
    pub(in crate::scaleway) label: &'a str,
    pub(in crate::scaleway) arch: &'a str,
    pub(in crate::scaleway) zone: &'a str,
}

impl ScalewayClient {
    pub(in crate::scaleway) async fn resolve_image_id(
        &self,
        query: ImageQuery<'_>,
    ) -> Result<String, ScalewayClientError> {
        if Uuid::parse_str(query.label).is_ok() {
            return Ok(query.label.to_owned());
        }

        self.resolve_image_id_with(
            query,
            || async move {
                let project = self.config.default_project_id.as_str();
                let mut scoped =
                    ScalewayListInstanceImagesBuilder::new(self.api.clone(), query.zone)
                        .public(true)
                        .project(project)
                        .name(query.label)
                        .arch(query.arch);
                if let Some(org) = &self.config.default_organization_id {
                    scoped = scoped.organization(org);
                }
                scoped.run_async().await.map_err(ScalewayClientError::from)
            },
            || async move {
                ScalewayListInstanceImagesBuilder::new(self.api.clone(), query.zone)
                    .public(true)
                    .name(query.label)
                    .arch(query.arch)
                    .run_async()
                    .await
                    .map_err(ScalewayClientError::from)
            },
        )
        .await
    }

    pub(in crate::scaleway) async fn resolve_image_id_with<FutA, FutB, FetchA, FetchB>(
        &self,
        query: ImageQuery<'_>,
        project_fetch: FetchA,
        public_fetch: FetchB,
    ) -> Result<String, ScalewayClientError>
    where
        FetchA: FnOnce() -> FutA,
        FetchB: FnOnce() -> FutB,
        FutA: Future<Output = Result<Vec<ScalewayImage>, ScalewayClientError>>,
        FutB: Future<Output = Result<Vec<ScalewayImage>, ScalewayClientError>>,
    {
        let project_images = project_fetch().await?;

        let public_images = if project_images.is_empty() {
            public_fetch().await?
        } else {
            Vec::new()
        };

        Self::select_image_from_sources(project_images, public_images, query)
    }

    pub(in crate::scaleway) fn select_image_from_sources(
        project_images: Vec<ScalewayImage>,
        public_images: Vec<ScalewayImage>,
        query: ImageQuery<'_>,
    ) -> Result<String, ScalewayClientError> {
        let primary = if project_images.is_empty() {
            public_images
        } else {
            project_images
        };

        let mut candidates: Vec<ScalewayImage> = primary
            .into_iter()
            .filter(|image| image.arch == query.arch)
            .filter(|image| image.state == "available")
            .collect();

        candidates.sort_by(|lhs, rhs| rhs.creation_date.cmp(&lhs.creation_date));
        candidates
            .into_iter()
            .next()
            .map(|image| image.id)
            .ok_or_else(|| ScalewayClientError::ImageNotFound {
                label: query.label.to_owned(),
                arch: query.arch.to_owned(),
                zone: query.zone.to_owned(),
            })
    }
}
