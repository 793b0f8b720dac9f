use std::collections::BTreeMap;
use std::path::PathBuf;

use common::storage::{BlobKey, BoxReader, StorageError};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::{LineageEngine, LineageKey, OpContext};
use crate::error::LineageError;
use crate::history::{ActivityKind, HistoryEntry};
use crate::models::{AudioArtifact, ListScope, NewArtifact, Project, ProjectListing};
use crate::utils::filename::{normalize_upload_name, validate_logical_name};

const MAX_PROJECT_NAME_CHARS: usize = 255;

/// Disagreements between the metadata store and the blob store.
///
/// `missing_blobs` is scoped to one project. The blob store is shared, so
/// `unreferenced_blobs` and `stale_staging` cover every project. Both also
/// show work that is still in flight when the check runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub project_id: i32,
    pub checked: usize,
    /// Artifacts of the project whose blob is gone.
    pub missing_blobs: Vec<AudioArtifact>,
    /// Committed blobs that no artifact row names.
    pub unreferenced_blobs: Vec<String>,
    /// Staging files that were never committed or discarded.
    pub stale_staging: Vec<PathBuf>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_blobs.is_empty()
            && self.unreferenced_blobs.is_empty()
            && self.stale_staging.is_empty()
    }
}

impl LineageEngine {
    #[instrument(skip(self, ctx), fields(user_id = ctx.user_id))]
    pub async fn create_project(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<Project, LineageError> {
        let name = name.trim();
        let length = name.chars().count();
        if length == 0 || length > MAX_PROJECT_NAME_CHARS {
            return Err(LineageError::InvalidParameters(format!(
                "project name must be 1-{MAX_PROJECT_NAME_CHARS} characters"
            )));
        }

        let project = self.metadata.create_project(name, ctx.user_id).await?;
        info!(project_id = project.id, "Created project");
        self.record(HistoryEntry::new(
            ctx.user_id,
            project.id,
            ActivityKind::ProjectCreated,
            format!("Created project {}", project.name),
        ))
        .await;
        Ok(project)
    }

    /// Stores an uploaded file as the original of a new lineage.
    #[instrument(skip(self, ctx, reader), fields(user_id = ctx.user_id))]
    pub async fn ingest_original(
        &self,
        ctx: &OpContext,
        project_id: i32,
        filename: &str,
        reader: BoxReader,
    ) -> Result<AudioArtifact, LineageError> {
        let normalized = normalize_upload_name(filename);
        let logical_name = validate_logical_name(&normalized)?;
        let key = BlobKey::new(logical_name)
            .map_err(|err| LineageError::InvalidParameters(err.to_string()))?;
        let _guard = self
            .locks
            .acquire(LineageKey::new(project_id, logical_name))
            .await;
        self.require_project(project_id).await?;

        if !self
            .metadata
            .lineage_versions(project_id, logical_name)
            .await?
            .is_empty()
        {
            return Err(LineageError::AlreadyExists(format!(
                "'{logical_name}' already exists in this project"
            )));
        }
        if self.metadata.stored_name_exists(logical_name).await? {
            return Err(LineageError::AlreadyExists(format!(
                "a file named '{logical_name}' already exists"
            )));
        }

        let size = match self.blobs.put_stream(&key, reader).await {
            Ok(size) => size,
            Err(StorageError::AlreadyExists(_)) => {
                return Err(LineageError::AlreadyExists(format!(
                    "a file named '{logical_name}' already exists"
                )));
            }
            Err(err) => return Err(err.into()),
        };

        let path = self.blobs.locate(&key);
        let duration_seconds = match self.measure(ctx, &path).await {
            Ok(duration) => duration,
            Err(err) => return Err(self.roll_back_blob(&key, err.into()).await),
        };

        let new = NewArtifact {
            logical_name: logical_name.to_string(),
            stored_name: logical_name.to_string(),
            path: path.to_string_lossy().into_owned(),
            duration_seconds,
            generation: 0,
        };
        let artifact = match self.metadata.insert_linked(project_id, new).await {
            Ok(artifact) => artifact,
            Err(err) => return Err(self.roll_back_blob(&key, err.into()).await),
        };

        info!(
            project_id,
            stored_name = %artifact.stored_name,
            size,
            duration = artifact.duration_seconds,
            "Ingested original"
        );
        self.record(HistoryEntry::new(
            ctx.user_id,
            project_id,
            ActivityKind::Upload,
            format!("Uploaded {logical_name}"),
        ))
        .await;

        Ok(artifact)
    }

    /// Every project `owner_id` owns, each with its current files.
    pub async fn list_projects(&self, owner_id: i32) -> Result<Vec<ProjectListing>, LineageError> {
        let mut listings = Vec::new();
        for project in self.metadata.list_projects(owner_id).await? {
            let files = match self.list_project_heads(project.id).await {
                Ok(files) => files,
                // Deleted since it was listed.
                Err(LineageError::ProjectNotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            listings.push(ProjectListing { project, files });
        }
        Ok(listings)
    }

    /// Head of every lineage in the project, sorted by logical name.
    pub async fn list_project_heads(
        &self,
        project_id: i32,
    ) -> Result<Vec<AudioArtifact>, LineageError> {
        self.require_project(project_id).await?;

        let mut heads: BTreeMap<String, AudioArtifact> = BTreeMap::new();
        for artifact in self.metadata.project_artifacts(project_id).await? {
            match heads.get(&artifact.logical_name) {
                Some(current)
                    if AudioArtifact::lineage_order(current, &artifact).is_ge() => {}
                _ => {
                    heads.insert(artifact.logical_name.clone(), artifact);
                }
            }
        }
        Ok(heads.into_values().collect())
    }

    pub async fn list_versions_or_head(
        &self,
        project_id: i32,
        logical_name: &str,
        scope: ListScope,
    ) -> Result<Vec<AudioArtifact>, LineageError> {
        self.require_project(project_id).await?;
        match scope {
            ListScope::Head => Ok(vec![
                self.resolver.resolve_head(project_id, logical_name).await?,
            ]),
            ListScope::AllVersions => {
                let versions = self.resolver.versions(project_id, logical_name).await?;
                if versions.is_empty() {
                    return Err(LineageError::ArtifactNotFound(logical_name.to_string()));
                }
                Ok(versions)
            }
        }
    }

    pub async fn resolve_head(
        &self,
        project_id: i32,
        logical_name: &str,
    ) -> Result<AudioArtifact, LineageError> {
        self.require_project(project_id).await?;
        self.resolver.resolve_head(project_id, logical_name).await
    }

    pub async fn find_version(
        &self,
        project_id: i32,
        stored_name: &str,
    ) -> Result<AudioArtifact, LineageError> {
        self.require_project(project_id).await?;
        self.resolver.find_version(project_id, stored_name).await
    }

    /// Deletes the project with every version of every lineage in it.
    #[instrument(skip(self, ctx), fields(user_id = ctx.user_id))]
    pub async fn delete_project(
        &self,
        ctx: &OpContext,
        project_id: i32,
    ) -> Result<Vec<AudioArtifact>, LineageError> {
        let (project, removed) = {
            // Waits for running edits and keeps new uploads out until the
            // rows are gone.
            let _guard = self.locks.acquire_project(project_id).await;
            let project = self.require_project(project_id).await?;
            let artifacts = self.metadata.project_artifacts(project_id).await?;

            let mut blob_failure = None;
            let mut removed_blobs = 0usize;
            for artifact in &artifacts {
                let deleted = match artifact.blob_key() {
                    Ok(key) => self.blobs.delete(&key).await,
                    Err(err) => Err(err),
                };
                match deleted {
                    Ok(_) => removed_blobs += 1,
                    Err(err) => {
                        warn!(
                            project_id,
                            stored_name = %artifact.stored_name,
                            error = %err,
                            "Failed to delete blob"
                        );
                        blob_failure = Some(err);
                        break;
                    }
                }
            }

            match blob_failure {
                Some(err) if removed_blobs == 0 => return Err(err.into()),
                Some(err) => {
                    let purge = self.metadata.delete_project(project_id).await;
                    error!(
                        project_id,
                        removed_blobs,
                        purged = purge.is_ok(),
                        "Project deletion stopped midway"
                    );
                    return Err(LineageError::StorageInconsistency(format!(
                        "deleted {removed_blobs} of {} blobs of project {project_id}: {err}",
                        artifacts.len()
                    )));
                }
                None => {}
            }

            if let Err(err) = self.metadata.delete_project(project_id).await {
                if artifacts.is_empty() {
                    return Err(err.into());
                }
                error!(project_id, error = %err, "Blobs deleted but project rows remain");
                return Err(LineageError::StorageInconsistency(format!(
                    "blobs of project {project_id} were deleted but its metadata could not be removed: {err}"
                )));
            }
            (project, artifacts)
        };

        info!(project_id, artifacts = removed.len(), "Deleted project");
        self.record(HistoryEntry::new(
            ctx.user_id,
            project_id,
            ActivityKind::ProjectDeleted,
            format!("Deleted project {}", project.name),
        ))
        .await;

        Ok(removed)
    }

    /// Removes artifacts that no project links to, blob first.
    ///
    /// Artifacts whose cleanup fails are skipped and retried on the next run.
    #[instrument(skip(self))]
    pub async fn collect_orphans(&self) -> Result<Vec<AudioArtifact>, LineageError> {
        let mut removed = Vec::new();
        for orphan in self.metadata.orphaned_artifacts().await? {
            let deleted = match orphan.blob_key() {
                Ok(key) => self.blobs.delete(&key).await,
                Err(err) => Err(err),
            };
            if let Err(err) = deleted {
                warn!(stored_name = %orphan.stored_name, error = %err, "Failed to delete orphan blob");
                continue;
            }
            if let Err(err) = self.metadata.delete_unlinked(orphan.id).await {
                warn!(stored_name = %orphan.stored_name, error = %err, "Failed to delete orphan row");
                continue;
            }
            removed.push(orphan);
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "Collected orphaned artifacts");
        }
        Ok(removed)
    }

    /// Read-only check that every artifact in the project has its blob and
    /// every stored blob has a row.
    pub async fn check_consistency(
        &self,
        project_id: i32,
    ) -> Result<ConsistencyReport, LineageError> {
        self.require_project(project_id).await?;

        let artifacts = self.metadata.project_artifacts(project_id).await?;
        let checked = artifacts.len();
        let mut missing_blobs = Vec::new();
        for artifact in artifacts {
            if !self.blobs.exists(&artifact.blob_key()?).await? {
                missing_blobs.push(artifact);
            }
        }
        if !missing_blobs.is_empty() {
            warn!(project_id, missing = missing_blobs.len(), "Artifacts without blobs");
        }

        let mut unreferenced_blobs = Vec::new();
        for name in self.blobs.list().await? {
            if !self.metadata.stored_name_exists(&name).await? {
                unreferenced_blobs.push(name);
            }
        }
        if !unreferenced_blobs.is_empty() {
            warn!(count = unreferenced_blobs.len(), "Blobs without artifact rows");
        }

        let stale_staging = self.blobs.list_staged().await?;
        if !stale_staging.is_empty() {
            warn!(count = stale_staging.len(), "Leftover staging files");
        }

        Ok(ConsistencyReport {
            project_id,
            checked,
            missing_blobs,
            unreferenced_blobs,
            stale_staging,
        })
    }
}
