use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use common::storage::{BlobKey, StorageError};
use serde::{Deserialize, Serialize};

use crate::models::version::VersionStamp;
use crate::utils::filename::has_version_prefix;

/// One physical version of audio content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub id: i32,
    /// Lineage identity: the stored name without its version prefix.
    pub logical_name: String,
    /// Name of the blob, `<stamp>_<logical_name>` for edits.
    pub stored_name: String,
    pub path: String,
    pub duration_seconds: f64,
    /// Position in the lineage; 0 for the first artifact.
    pub generation: i32,
    pub created_at: DateTime<Utc>,
}

impl AudioArtifact {
    /// Whether this is an unedited upload.
    pub fn is_original(&self) -> bool {
        !has_version_prefix(&self.stored_name)
    }

    pub fn stamp(&self) -> Option<VersionStamp> {
        VersionStamp::of_stored_name(&self.stored_name)
    }

    pub fn blob_key(&self) -> Result<BlobKey, StorageError> {
        BlobKey::new(self.stored_name.clone())
    }

    /// Total order of versions within a lineage: generation, then creation
    /// time, then insertion order.
    pub fn lineage_order(a: &Self, b: &Self) -> Ordering {
        a.generation
            .cmp(&b.generation)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    }
}

/// Fields of an artifact about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArtifact {
    pub logical_name: String,
    pub stored_name: String,
    pub path: String,
    pub duration_seconds: f64,
    pub generation: i32,
}

/// A named collection of lineages owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i32,
    pub name: String,
    pub owner_id: i32,
    pub created_at: DateTime<Utc>,
}

/// A project together with the head of each of its lineages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectListing {
    #[serde(flatten)]
    pub project: Project,
    pub files: Vec<AudioArtifact>,
}

/// Which part of a lineage a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListScope {
    Head,
    AllVersions,
}
