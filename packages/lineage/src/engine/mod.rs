//! Version lineage engine.
//!
//! Every mutating operation runs under the critical section of each lineage
//! it touches (see [`locks`]). Blob writes go through a staging file and are
//! moved into place before the metadata transaction, so a committed row
//! always points at a complete blob.

pub mod locks;
pub mod maintenance;
pub mod mutator;
pub mod resolver;
pub mod undo;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::storage::{BlobKey, BlobStore};
use tracing::{error, warn};

use crate::error::LineageError;
use crate::history::{HistoryEntry, HistoryRecorder, TracingHistory};
use crate::models::Project;
use crate::store::MetadataStore;
use crate::transcode::Transcoder;
use crate::transcode::error::TranscodeError;

pub use locks::{LineageGuard, LineageKey, LineageLocks};
pub use maintenance::ConsistencyReport;
pub use resolver::LineageResolver;
pub use undo::UndoOutcome;

const DEFAULT_TRANSCODE_TIMEOUT: Duration = Duration::from_secs(120);

/// Caller identity and per-call settings. The engine trusts these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpContext {
    pub user_id: i32,
    /// Overrides the engine's transcode timeout for this call.
    pub timeout: Option<Duration>,
}

impl OpContext {
    pub fn new(user_id: i32) -> Self {
        Self {
            user_id,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Clone)]
pub struct LineageEngine {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    transcoder: Arc<dyn Transcoder>,
    history: Arc<dyn HistoryRecorder>,
    resolver: LineageResolver,
    locks: LineageLocks,
    transcode_timeout: Duration,
}

impl LineageEngine {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            resolver: LineageResolver::new(metadata.clone(), blobs.clone()),
            metadata,
            blobs,
            transcoder,
            history: Arc::new(TracingHistory),
            locks: LineageLocks::new(),
            transcode_timeout: DEFAULT_TRANSCODE_TIMEOUT,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryRecorder>) -> Self {
        self.history = history;
        self
    }

    pub fn with_transcode_timeout(mut self, timeout: Duration) -> Self {
        self.transcode_timeout = timeout;
        self
    }

    pub fn resolver(&self) -> &LineageResolver {
        &self.resolver
    }

    pub fn locks(&self) -> &LineageLocks {
        &self.locks
    }

    pub(crate) async fn require_project(&self, project_id: i32) -> Result<Project, LineageError> {
        self.metadata
            .find_project(project_id)
            .await?
            .ok_or(LineageError::ProjectNotFound(project_id))
    }

    /// Runs a media engine call under the effective timeout. Dropping the
    /// call on expiry also kills the child process.
    pub(crate) async fn bounded<T>(
        &self,
        ctx: &OpContext,
        call: impl Future<Output = Result<T, TranscodeError>>,
    ) -> Result<T, TranscodeError> {
        let limit = ctx.timeout.unwrap_or(self.transcode_timeout);
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(TranscodeError::TimedOut(limit)),
        }
    }

    /// Probes `path`, rejecting durations that cannot belong to real audio.
    pub(crate) async fn measure(
        &self,
        ctx: &OpContext,
        path: &Path,
    ) -> Result<f64, TranscodeError> {
        let seconds = self
            .bounded(ctx, self.transcoder.probe_duration(path))
            .await?;
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(TranscodeError::Probe(format!(
                "unusable duration {seconds} for {}",
                path.display()
            )));
        }
        Ok(seconds)
    }

    /// Removes a freshly written blob after a later step failed.
    ///
    /// Returns `cause` when the blob is gone, `StorageInconsistency` when it
    /// could not be removed.
    pub(crate) async fn roll_back_blob(&self, key: &BlobKey, cause: LineageError) -> LineageError {
        match self.blobs.delete(key).await {
            Ok(_) => cause,
            Err(err) => {
                error!(
                    stored_name = %key,
                    error = %err,
                    cause = %cause,
                    "Could not remove blob after failed write"
                );
                LineageError::StorageInconsistency(format!(
                    "blob '{key}' has no metadata row and could not be removed: {err} (after: {cause})"
                ))
            }
        }
    }

    /// Hands an entry to the recorder. Failures are logged and swallowed.
    pub(crate) async fn record(&self, entry: HistoryEntry) {
        let kind = entry.kind;
        if let Err(err) = self.history.record(entry).await {
            warn!(kind = kind.as_str(), error = %err, "Failed to record history entry");
        }
    }
}
