use common::storage::{BlobKey, StagedBlob, StorageError};
use tracing::{debug, info, instrument, warn};

use super::{LineageEngine, LineageKey, OpContext};
use crate::error::LineageError;
use crate::history::{ActivityKind, HistoryEntry};
use crate::models::{AudioArtifact, EditOperation, NewArtifact, VersionStamp};
use crate::transcode::{TranscodeJob, TranscodeOp};
use crate::utils::filename::{merged_lineage_name, strip_version_prefix, validate_logical_name};

/// How many later stamps to try before giving up on a free stored name.
const MAX_NAME_PROBES: u32 = 64;

/// A successor version about to be produced.
struct Successor<'a> {
    project_id: i32,
    logical_name: &'a str,
    generation: i32,
    previous_stamp: Option<VersionStamp>,
    job: TranscodeJob,
}

impl LineageEngine {
    /// Applies a single-input edit to the head of a lineage and returns the
    /// new head.
    #[instrument(skip(self, ctx, op), fields(user_id = ctx.user_id, op = ?op))]
    pub async fn apply_edit(
        &self,
        ctx: &OpContext,
        project_id: i32,
        logical_name: &str,
        op: EditOperation,
    ) -> Result<AudioArtifact, LineageError> {
        op.validate_shape()
            .map_err(LineageError::InvalidParameters)?;
        let logical_name = strip_version_prefix(logical_name);
        let _guard = self
            .locks
            .acquire(LineageKey::new(project_id, logical_name))
            .await;
        self.require_project(project_id).await?;

        let head = self
            .resolver
            .resolve_live_head(project_id, logical_name)
            .await?;
        let transform = op
            .plan(head.duration_seconds)
            .map_err(LineageError::InvalidParameters)?;
        let source = self.blobs.locate(&head.blob_key()?);

        debug!(
            head = %head.stored_name,
            expected_duration = op.expected_duration(head.duration_seconds),
            "Producing successor"
        );

        let artifact = self
            .produce(
                ctx,
                Successor {
                    project_id,
                    logical_name,
                    generation: head.generation + 1,
                    previous_stamp: head.stamp(),
                    job: TranscodeJob::new(transform, vec![source])?,
                },
            )
            .await?;

        info!(
            project_id,
            stored_name = %artifact.stored_name,
            generation = artifact.generation,
            duration = artifact.duration_seconds,
            "Applied edit"
        );
        self.record(HistoryEntry::new(
            ctx.user_id,
            project_id,
            ActivityKind::Edit,
            op.describe(logical_name),
        ))
        .await;

        Ok(artifact)
    }

    /// Mixes the heads of two lineages into the lineage
    /// `<stem_a>_and_<stem_b><ext_a>`.
    #[instrument(skip(self, ctx), fields(user_id = ctx.user_id))]
    pub async fn merge(
        &self,
        ctx: &OpContext,
        project_id: i32,
        file_a: &str,
        file_b: &str,
    ) -> Result<AudioArtifact, LineageError> {
        let name_a = strip_version_prefix(file_a);
        let name_b = strip_version_prefix(file_b);
        let output = merged_lineage_name(name_a, name_b);
        validate_logical_name(&output)?;

        let _guard = self
            .locks
            .acquire_many(vec![
                LineageKey::new(project_id, name_a),
                LineageKey::new(project_id, name_b),
                LineageKey::new(project_id, output.as_str()),
            ])
            .await;
        self.require_project(project_id).await?;

        let head_a = self.resolver.resolve_live_head(project_id, name_a).await?;
        let head_b = self.resolver.resolve_live_head(project_id, name_b).await?;
        let previous = self
            .metadata
            .lineage_versions(project_id, &output)
            .await?
            .into_iter()
            .max_by(AudioArtifact::lineage_order);

        let sources = vec![
            self.blobs.locate(&head_a.blob_key()?),
            self.blobs.locate(&head_b.blob_key()?),
        ];
        let artifact = self
            .produce(
                ctx,
                Successor {
                    project_id,
                    logical_name: &output,
                    generation: previous.as_ref().map_or(0, |p| p.generation + 1),
                    previous_stamp: previous.as_ref().and_then(AudioArtifact::stamp),
                    job: TranscodeJob::new(TranscodeOp::Mix, sources)?,
                },
            )
            .await?;

        info!(
            project_id,
            a = %head_a.stored_name,
            b = %head_b.stored_name,
            stored_name = %artifact.stored_name,
            duration = artifact.duration_seconds,
            "Merged files"
        );
        self.record(HistoryEntry::new(
            ctx.user_id,
            project_id,
            ActivityKind::Merge,
            format!("Merged {name_a} and {name_b} into {output}"),
        ))
        .await;

        Ok(artifact)
    }

    /// First free stored name for the next version of `logical_name`.
    async fn next_stored_name(
        &self,
        logical_name: &str,
        previous: Option<VersionStamp>,
    ) -> Result<(String, BlobKey), LineageError> {
        let mut stamp = VersionStamp::successor(VersionStamp::now(), previous);
        for _ in 0..MAX_NAME_PROBES {
            let stored_name = stamp.stored_name(logical_name);
            let key = BlobKey::new(stored_name.clone())
                .map_err(|err| LineageError::InvalidParameters(err.to_string()))?;
            if !self.metadata.stored_name_exists(&stored_name).await?
                && !self.blobs.exists(&key).await?
            {
                return Ok((stored_name, key));
            }
            stamp = stamp.next_second();
        }
        Err(LineageError::AlreadyExists(format!(
            "no free version name for '{logical_name}'"
        )))
    }

    /// Stage, transcode, probe, commit, insert. Any failure leaves neither a
    /// blob nor a row behind, unless the cleanup itself fails.
    async fn produce(
        &self,
        ctx: &OpContext,
        next: Successor<'_>,
    ) -> Result<AudioArtifact, LineageError> {
        let (stored_name, key) = self
            .next_stored_name(next.logical_name, next.previous_stamp)
            .await?;
        let staged = self.blobs.stage(&key).await?;

        let produced = async {
            self.bounded(ctx, self.transcoder.transcode(&next.job, staged.path()))
                .await?;
            let duration = self.measure(ctx, staged.path()).await?;
            Ok::<f64, LineageError>(duration)
        }
        .await;

        let duration_seconds = match produced {
            Ok(duration) => duration,
            Err(err) => {
                self.discard_staged(staged).await;
                return Err(err);
            }
        };

        if let Err(err) = self.blobs.commit(&staged).await {
            self.discard_staged(staged).await;
            return Err(match err {
                StorageError::AlreadyExists(name) => LineageError::AlreadyExists(name),
                other => other.into(),
            });
        }

        let new = NewArtifact {
            logical_name: next.logical_name.to_string(),
            stored_name,
            path: self.blobs.locate(&key).to_string_lossy().into_owned(),
            duration_seconds,
            generation: next.generation,
        };
        match self.metadata.insert_linked(next.project_id, new).await {
            Ok(artifact) => Ok(artifact),
            Err(err) => Err(self.roll_back_blob(&key, err.into()).await),
        }
    }

    async fn discard_staged(&self, staged: StagedBlob) {
        let path = staged.path().to_path_buf();
        if let Err(err) = self.blobs.discard(staged).await {
            warn!(path = %path.display(), error = %err, "Failed to discard staging file");
        }
    }
}
