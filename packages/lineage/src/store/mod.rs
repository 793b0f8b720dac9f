pub mod memory;
pub mod sea;

use async_trait::async_trait;
use sea_orm::DbErr;
use thiserror::Error;

use crate::models::{AudioArtifact, NewArtifact, Project};

pub use memory::InMemoryMetadataStore;
pub use sea::SeaOrmMetadataStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
}

/// Relational records for projects, artifacts and their links.
///
/// Every method is its own transaction. Version listings are returned in
/// lineage order (generation, creation time, id).
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn create_project(&self, name: &str, owner_id: i32) -> Result<Project, StoreError>;

    async fn find_project(&self, project_id: i32) -> Result<Option<Project>, StoreError>;

    /// Projects owned by `owner_id`, oldest first.
    async fn list_projects(&self, owner_id: i32) -> Result<Vec<Project>, StoreError>;

    /// Removes the project, its links and every artifact linked to it.
    async fn delete_project(&self, project_id: i32) -> Result<(), StoreError>;

    /// All versions of one lineage in the project.
    async fn lineage_versions(
        &self,
        project_id: i32,
        logical_name: &str,
    ) -> Result<Vec<AudioArtifact>, StoreError>;

    /// Every artifact linked to the project.
    async fn project_artifacts(&self, project_id: i32) -> Result<Vec<AudioArtifact>, StoreError>;

    async fn find_by_stored_name(
        &self,
        project_id: i32,
        stored_name: &str,
    ) -> Result<Option<AudioArtifact>, StoreError>;

    /// Whether any artifact, linked or not, uses `stored_name`.
    async fn stored_name_exists(&self, stored_name: &str) -> Result<bool, StoreError>;

    /// Inserts the artifact and its project link atomically.
    ///
    /// Fails with [`StoreError::Conflict`] if the stored name is taken.
    async fn insert_linked(
        &self,
        project_id: i32,
        artifact: NewArtifact,
    ) -> Result<AudioArtifact, StoreError>;

    /// Removes the link and then the artifact row, atomically.
    async fn delete_linked(&self, project_id: i32, artifact_id: i32) -> Result<(), StoreError>;

    /// Artifacts with no project link.
    async fn orphaned_artifacts(&self) -> Result<Vec<AudioArtifact>, StoreError>;

    /// Removes an artifact row that has no links.
    async fn delete_unlinked(&self, artifact_id: i32) -> Result<(), StoreError>;
}
