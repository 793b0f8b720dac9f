use std::sync::Arc;

use common::storage::BlobStore;
use tracing::warn;

use crate::error::LineageError;
use crate::models::AudioArtifact;
use crate::store::MetadataStore;
use crate::utils::filename::strip_version_prefix;

/// Maps a lineage to its current head. Never writes.
#[derive(Clone)]
pub struct LineageResolver {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
}

impl LineageResolver {
    pub fn new(metadata: Arc<dyn MetadataStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { metadata, blobs }
    }

    /// Every version of the lineage, oldest first. `name` may carry a
    /// version prefix.
    pub async fn versions(
        &self,
        project_id: i32,
        name: &str,
    ) -> Result<Vec<AudioArtifact>, LineageError> {
        let logical_name = strip_version_prefix(name);
        Ok(self
            .metadata
            .lineage_versions(project_id, logical_name)
            .await?)
    }

    pub async fn resolve_head(
        &self,
        project_id: i32,
        name: &str,
    ) -> Result<AudioArtifact, LineageError> {
        self.versions(project_id, name)
            .await?
            .into_iter()
            .max_by(AudioArtifact::lineage_order)
            .ok_or_else(|| LineageError::ArtifactNotFound(strip_version_prefix(name).to_string()))
    }

    /// Like [`resolve_head`](Self::resolve_head), but only returns a head whose
    /// blob is present. Resolution is attempted twice.
    pub async fn resolve_live_head(
        &self,
        project_id: i32,
        name: &str,
    ) -> Result<AudioArtifact, LineageError> {
        for attempt in 1..=2 {
            let head = self.resolve_head(project_id, name).await?;
            if self.blobs.exists(&head.blob_key()?).await? {
                return Ok(head);
            }
            warn!(
                project_id,
                stored_name = %head.stored_name,
                attempt,
                "Head blob is missing"
            );
        }
        Err(LineageError::StaleHead(
            strip_version_prefix(name).to_string(),
        ))
    }

    /// Any version of any lineage in the project, by stored name.
    pub async fn find_version(
        &self,
        project_id: i32,
        stored_name: &str,
    ) -> Result<AudioArtifact, LineageError> {
        self.metadata
            .find_by_stored_name(project_id, stored_name)
            .await?
            .ok_or_else(|| LineageError::ArtifactNotFound(stored_name.to_string()))
    }
}
