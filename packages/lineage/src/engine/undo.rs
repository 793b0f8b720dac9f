use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::{LineageEngine, LineageKey, OpContext};
use crate::error::LineageError;
use crate::history::{ActivityKind, HistoryEntry};
use crate::models::AudioArtifact;
use crate::utils::filename::strip_version_prefix;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UndoOutcome {
    /// The lineage fell back to its previous version.
    Reverted {
        removed: AudioArtifact,
        head: AudioArtifact,
    },
    /// The removed version was the last one in the lineage.
    NoMoreHistory { removed: AudioArtifact },
}

impl UndoOutcome {
    pub fn removed(&self) -> &AudioArtifact {
        match self {
            Self::Reverted { removed, .. } | Self::NoMoreHistory { removed } => removed,
        }
    }

    pub fn head(&self) -> Option<&AudioArtifact> {
        match self {
            Self::Reverted { head, .. } => Some(head),
            Self::NoMoreHistory { .. } => None,
        }
    }
}

impl LineageEngine {
    /// Removes the head of a lineage so that its predecessor becomes the
    /// head again. Originals cannot be undone.
    #[instrument(skip(self, ctx), fields(user_id = ctx.user_id))]
    pub async fn undo(
        &self,
        ctx: &OpContext,
        project_id: i32,
        logical_name: &str,
    ) -> Result<UndoOutcome, LineageError> {
        let logical_name = strip_version_prefix(logical_name);

        let outcome = {
            let _guard = self
                .locks
                .acquire(LineageKey::new(project_id, logical_name))
                .await;
            self.require_project(project_id).await?;

            let head = self.resolver.resolve_head(project_id, logical_name).await?;
            if head.is_original() {
                return Err(LineageError::CannotUndoOriginal(head.stored_name));
            }

            self.remove_version(project_id, &head)
                .await
                .map_err(|err| match err {
                    LineageError::Storage(cause) => LineageError::UndoFailed(cause.to_string()),
                    other => other,
                })?;

            match self.resolver.resolve_head(project_id, logical_name).await {
                Ok(previous) => UndoOutcome::Reverted {
                    removed: head,
                    head: previous,
                },
                Err(LineageError::ArtifactNotFound(_)) => UndoOutcome::NoMoreHistory { removed: head },
                Err(err) => return Err(err),
            }
        };

        info!(
            project_id,
            removed = %outcome.removed().stored_name,
            head = outcome.head().map(|h| h.stored_name.as_str()),
            "Undid edit"
        );
        self.record(HistoryEntry::new(
            ctx.user_id,
            project_id,
            ActivityKind::Undo,
            format!("Undid last edit of {logical_name}"),
        ))
        .await;

        Ok(outcome)
    }

    /// Permanently removes the current head of a lineage, original or not.
    #[instrument(skip(self, ctx), fields(user_id = ctx.user_id))]
    pub async fn delete_artifact(
        &self,
        ctx: &OpContext,
        project_id: i32,
        logical_name: &str,
    ) -> Result<AudioArtifact, LineageError> {
        let logical_name = strip_version_prefix(logical_name);

        let removed = {
            let _guard = self
                .locks
                .acquire(LineageKey::new(project_id, logical_name))
                .await;
            self.require_project(project_id).await?;
            let head = self.resolver.resolve_head(project_id, logical_name).await?;
            self.remove_version(project_id, &head).await?;
            head
        };

        info!(project_id, stored_name = %removed.stored_name, "Deleted file");
        self.record(HistoryEntry::new(
            ctx.user_id,
            project_id,
            ActivityKind::Delete,
            format!("Deleted {}", removed.stored_name),
        ))
        .await;

        Ok(removed)
    }

    /// Blob first, then link and row.
    ///
    /// A blob failure leaves everything in place and surfaces as
    /// `Storage`. A metadata failure after the blob is gone surfaces as
    /// `StorageInconsistency`.
    async fn remove_version(
        &self,
        project_id: i32,
        artifact: &AudioArtifact,
    ) -> Result<(), LineageError> {
        let key = artifact.blob_key()?;
        if !self.blobs.delete(&key).await? {
            warn!(
                project_id,
                stored_name = %artifact.stored_name,
                "Blob was already missing"
            );
        }

        if let Err(err) = self.metadata.delete_linked(project_id, artifact.id).await {
            error!(
                project_id,
                artifact_id = artifact.id,
                stored_name = %artifact.stored_name,
                error = %err,
                "Blob deleted but metadata row remains"
            );
            return Err(LineageError::StorageInconsistency(format!(
                "blob '{}' was deleted but its metadata could not be removed: {err}",
                artifact.stored_name
            )));
        }
        Ok(())
    }
}
