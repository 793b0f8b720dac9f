pub mod error;
pub mod ffmpeg;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::edit::EchoParams;
use error::TranscodeError;

/// A transform understood by the media engine. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TranscodeOp {
    /// Keep `[start, end)`.
    Trim { start: f64, end: f64 },
    /// Append a copy of `[start, end)` to the whole input.
    Extend { start: f64, end: f64 },
    /// Drop `[start, end)`.
    Shorten {
        start: f64,
        end: f64,
        source_duration: f64,
    },
    /// Mix two inputs for the length of the longer one.
    Mix,
    Echo(EchoParams),
}

impl TranscodeOp {
    pub fn input_count(&self) -> usize {
        match self {
            Self::Mix => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub op: TranscodeOp,
    pub sources: Vec<PathBuf>,
}

impl TranscodeJob {
    pub fn new(op: TranscodeOp, sources: Vec<PathBuf>) -> Result<Self, TranscodeError> {
        if sources.len() != op.input_count() {
            return Err(TranscodeError::InvalidJob(format!(
                "expected {} input(s), got {}",
                op.input_count(),
                sources.len()
            )));
        }
        Ok(Self { op, sources })
    }
}

/// External media engine. Knows nothing about projects or lineages.
///
/// `transcode` either leaves a complete file at `dest` or fails; callers own
/// cleanup of whatever is at `dest` after a failure.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, job: &TranscodeJob, dest: &Path) -> Result<(), TranscodeError>;

    /// Duration of the audio at `path` in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64, TranscodeError>;
}
