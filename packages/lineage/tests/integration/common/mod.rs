use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::storage::filesystem::FilesystemBlobStore;
use common::storage::{BlobKey, BlobStore, BoxReader, StagedBlob, StorageError};
use tempfile::TempDir;
use tokio::sync::Mutex;

use lineage::engine::{LineageEngine, OpContext};
use lineage::history::{HistoryEntry, HistoryRecorder};
use lineage::models::AudioArtifact;
use lineage::store::InMemoryMetadataStore;
use lineage::transcode::error::TranscodeError;
use lineage::transcode::{TranscodeJob, TranscodeOp, Transcoder};

/// Body of a fake audio file of the given length.
pub fn audio(duration: f64) -> Vec<u8> {
    format!("duration={duration}").into_bytes()
}

async fn read_duration(path: &Path) -> Result<f64, String> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("{}: {e}", path.display()))?;
    text.trim()
        .strip_prefix("duration=")
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| format!("{} is not audio: {text:?}", path.display()))
}

/// Stand-in media engine working on `duration=<secs>` text files.
///
/// Output durations follow the transform exactly, so tests can assert on
/// them without real audio.
#[derive(Default)]
pub struct ScriptedTranscoder {
    pub fail_transcode: AtomicBool,
    pub fail_probe: AtomicBool,
    /// Probe reports this instead of the file content when set.
    pub probe_override: Mutex<Option<f64>>,
    /// Writes partial output, then sleeps this long before finishing.
    pub stall: Mutex<Option<Duration>>,
    pub transcode_calls: AtomicUsize,
    pub jobs: Mutex<Vec<TranscodeJob>>,
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    async fn transcode(&self, job: &TranscodeJob, dest: &Path) -> Result<(), TranscodeError> {
        self.transcode_calls.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().await.push(job.clone());

        let stall = *self.stall.lock().await;
        if let Some(stall) = stall {
            tokio::fs::write(dest, b"partial")
                .await
                .map_err(|e| TranscodeError::Execution(e.to_string()))?;
            tokio::time::sleep(stall).await;
        }
        if self.fail_transcode.load(Ordering::SeqCst) {
            tokio::fs::write(dest, b"garbage")
                .await
                .map_err(|e| TranscodeError::Execution(e.to_string()))?;
            return Err(TranscodeError::Execution("scripted failure".into()));
        }

        let mut inputs = Vec::new();
        for source in &job.sources {
            inputs.push(read_duration(source).await.map_err(TranscodeError::Execution)?);
        }
        let duration = match job.op {
            TranscodeOp::Trim { start, end } => end - start,
            TranscodeOp::Extend { start, end } => inputs[0] + (end - start),
            TranscodeOp::Shorten { start, end, .. } => inputs[0] - (end - start),
            TranscodeOp::Mix => inputs[0].max(inputs[1]),
            TranscodeOp::Echo(_) => inputs[0],
        };
        tokio::fs::write(dest, audio(duration))
            .await
            .map_err(|e| TranscodeError::Execution(e.to_string()))
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, TranscodeError> {
        if self.fail_probe.load(Ordering::SeqCst) {
            return Err(TranscodeError::Probe("scripted failure".into()));
        }
        if let Some(duration) = *self.probe_override.lock().await {
            return Ok(duration);
        }
        read_duration(path).await.map_err(TranscodeError::Probe)
    }
}

/// Filesystem blob store whose deletes can be made to fail or drag.
pub struct FlakyBlobStore {
    inner: FilesystemBlobStore,
    pub fail_deletes: AtomicBool,
    /// Fail deletes only after this many have succeeded.
    pub deletes_before_failure: AtomicUsize,
    /// Every delete sleeps this long first when set.
    pub delete_delay: Mutex<Option<Duration>>,
}

impl FlakyBlobStore {
    pub fn fail_deletes_after(&self, successes: usize) {
        self.deletes_before_failure.store(successes, Ordering::SeqCst);
        self.fail_deletes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn put_stream(&self, key: &BlobKey, reader: BoxReader) -> Result<u64, StorageError> {
        self.inner.put_stream(key, reader).await
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError> {
        let delay = *self.delete_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_deletes.load(Ordering::SeqCst) {
            let remaining = self.deletes_before_failure.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "scripted delete failure",
                )));
            }
            self.deletes_before_failure
                .store(remaining - 1, Ordering::SeqCst);
        }
        self.inner.delete(key).await
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        self.inner.list().await
    }

    async fn list_staged(&self) -> Result<Vec<PathBuf>, StorageError> {
        self.inner.list_staged().await
    }

    fn locate(&self, key: &BlobKey) -> PathBuf {
        self.inner.locate(key)
    }

    async fn stage(&self, key: &BlobKey) -> Result<StagedBlob, StorageError> {
        self.inner.stage(key).await
    }

    async fn commit(&self, staged: &StagedBlob) -> Result<u64, StorageError> {
        self.inner.commit(staged).await
    }

    async fn discard(&self, staged: StagedBlob) -> Result<(), StorageError> {
        self.inner.discard(staged).await
    }
}

/// Keeps every history entry; can be made to fail.
#[derive(Default)]
pub struct RecordingHistory {
    pub entries: Mutex<Vec<HistoryEntry>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl HistoryRecorder for RecordingHistory {
    async fn record(&self, entry: HistoryEntry) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("history sink offline");
        }
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

/// An engine over in-memory metadata and a temporary blob directory, with
/// one project already created.
pub struct TestEngine {
    pub engine: LineageEngine,
    pub metadata: Arc<InMemoryMetadataStore>,
    pub blobs: Arc<FlakyBlobStore>,
    pub transcoder: Arc<ScriptedTranscoder>,
    pub history: Arc<RecordingHistory>,
    pub ctx: OpContext,
    pub project_id: i32,
    dir: TempDir,
}

impl TestEngine {
    pub async fn spawn() -> Self {
        let dir = TempDir::new().unwrap();
        let inner = FilesystemBlobStore::new(dir.path().join("audio"), 1024 * 1024)
            .await
            .unwrap();
        let blobs = Arc::new(FlakyBlobStore {
            inner,
            fail_deletes: AtomicBool::new(false),
            deletes_before_failure: AtomicUsize::new(0),
            delete_delay: Mutex::new(None),
        });
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let transcoder = Arc::new(ScriptedTranscoder::default());
        let history = Arc::new(RecordingHistory::default());

        let engine = LineageEngine::new(metadata.clone(), blobs.clone(), transcoder.clone())
            .with_history(history.clone())
            .with_transcode_timeout(Duration::from_secs(5));

        let ctx = OpContext::new(7);
        let project = engine.create_project(&ctx, "Demo").await.unwrap();

        Self {
            engine,
            metadata,
            blobs,
            transcoder,
            history,
            ctx,
            project_id: project.id,
            dir,
        }
    }

    pub async fn upload(&self, filename: &str, duration: f64) -> AudioArtifact {
        self.upload_to(self.project_id, filename, duration).await
    }

    pub async fn upload_to(&self, project_id: i32, filename: &str, duration: f64) -> AudioArtifact {
        let reader: BoxReader = Box::new(Cursor::new(audio(duration)));
        self.engine
            .ingest_original(&self.ctx, project_id, filename, reader)
            .await
            .expect("upload failed")
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.dir.path().join("audio")
    }

    pub fn blob_exists(&self, stored_name: &str) -> bool {
        self.blob_dir().join(stored_name).exists()
    }

    /// Names of committed blobs, sorted.
    pub fn blob_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.blob_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Whether the staging area holds no leftovers.
    pub fn staging_is_empty(&self) -> bool {
        std::fs::read_dir(self.blob_dir().join(".tmp"))
            .unwrap()
            .next()
            .is_none()
    }

    pub async fn history_kinds(&self) -> Vec<&'static str> {
        self.history
            .entries
            .lock()
            .await
            .iter()
            .map(|e| e.kind.as_str())
            .collect()
    }
}
