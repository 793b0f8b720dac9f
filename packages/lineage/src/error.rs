use common::storage::StorageError;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;
use crate::transcode::error::TranscodeError;

/// Whether a failed operation may have changed persistent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Nothing was written; the call can be retried as is.
    NoMutation,
    /// Some state changed; inspect before retrying.
    PartialMutation,
}

#[derive(Error, Debug)]
pub enum LineageError {
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("project not found: {0}")]
    ProjectNotFound(i32),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("transcode failed: {0}")]
    TranscodeFailure(#[from] TranscodeError),

    /// The head's blob vanished twice in a row during resolution.
    #[error("head of lineage '{0}' has no blob")]
    StaleHead(String),

    #[error("'{0}' is an original and cannot be undone")]
    CannotUndoOriginal(String),

    #[error("undo failed, nothing changed: {0}")]
    UndoFailed(String),

    #[error("blob store and metadata disagree: {0}")]
    StorageInconsistency(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] StoreError),
}

impl LineageError {
    /// Stable machine-readable identifier.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
            Self::ProjectNotFound(_) => "PROJECT_NOT_FOUND",
            Self::InvalidParameters(_) => "INVALID_PARAMETERS",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::TranscodeFailure(_) => "TRANSCODE_FAILURE",
            Self::StaleHead(_) => "STALE_HEAD",
            Self::CannotUndoOriginal(_) => "CANNOT_UNDO_ORIGINAL",
            Self::UndoFailed(_) => "UNDO_FAILED",
            Self::StorageInconsistency(_) => "STORAGE_INCONSISTENCY",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Metadata(_) => "METADATA_ERROR",
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            Self::UndoFailed(_) | Self::StorageInconsistency(_) => Outcome::PartialMutation,
            _ => Outcome::NoMutation,
        }
    }
}

impl From<crate::utils::filename::FilenameError> for LineageError {
    fn from(err: crate::utils::filename::FilenameError) -> Self {
        LineageError::InvalidParameters(err.message().to_string())
    }
}
