use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::error::StorageError;
use super::key::BlobKey;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// A reserved staging file that an external producer writes into before the
/// blob is committed under its final key.
#[derive(Debug)]
pub struct StagedBlob {
    key: BlobKey,
    path: PathBuf,
}

impl StagedBlob {
    pub fn new(key: BlobKey, path: PathBuf) -> Self {
        Self { key, path }
    }

    pub fn key(&self) -> &BlobKey {
        &self.key
    }

    /// Where the producer should write. Keeps the key's extension so tools
    /// that infer the container format from the file name still work.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Name-addressed blob storage.
///
/// Blobs are never overwritten: writing to a key that is already present
/// fails with [`StorageError::AlreadyExists`].
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `key` and return the stored size.
    async fn put(&self, key: &BlobKey, data: &[u8]) -> Result<u64, StorageError> {
        let reader: BoxReader = Box::new(Cursor::new(data.to_vec()));
        self.put_stream(key, reader).await
    }

    /// Store data from an async reader under `key` and return the stored size.
    async fn put_stream(&self, key: &BlobKey, reader: BoxReader) -> Result<u64, StorageError>;

    /// Check whether a blob exists.
    async fn exists(&self, key: &BlobKey) -> Result<bool, StorageError>;

    /// Delete a blob.
    ///
    /// Returns `true` if the blob was deleted, `false` if it did not exist.
    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError>;

    /// Names of every committed blob, sorted.
    async fn list(&self) -> Result<Vec<String>, StorageError>;

    /// Staging files that were never committed or discarded.
    async fn list_staged(&self) -> Result<Vec<PathBuf>, StorageError>;

    /// Filesystem location of the blob stored under `key`.
    fn locate(&self, key: &BlobKey) -> PathBuf;

    /// Reserve a staging file for `key`.
    async fn stage(&self, key: &BlobKey) -> Result<StagedBlob, StorageError>;

    /// Move a fully written staging file into place and return its size.
    ///
    /// On failure the staging file is left for the caller to [`discard`](Self::discard).
    async fn commit(&self, staged: &StagedBlob) -> Result<u64, StorageError>;

    /// Remove a staging file, tolerating one that was never created.
    async fn discard(&self, staged: StagedBlob) -> Result<(), StorageError>;
}
