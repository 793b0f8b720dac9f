use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::error::StorageError;
use super::key::BlobKey;
use super::traits::{BlobStore, BoxReader, StagedBlob};

/// Filesystem-backed blob store with a flat layout.
///
/// Blobs live at `{base_path}/{key}`; in-flight writes go to
/// `{base_path}/.tmp/{uuid}{ext}` and are hard-linked into place, which
/// refuses to clobber an existing blob.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    /// Create a new filesystem blob store.
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Compute the filesystem path for a given key.
    fn blob_path(&self, key: &BlobKey) -> PathBuf {
        self.base_path.join(key.as_str())
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self, key: &BlobKey) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(format!("{}{}", uuid::Uuid::new_v4(), key.extension()))
    }

    /// Link a finished temp file to its final name, then drop the temp name.
    async fn link_into_place(&self, temp_path: &Path, key: &BlobKey) -> Result<(), StorageError> {
        let blob_path = self.blob_path(key);
        match fs::hard_link(temp_path, &blob_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = fs::remove_file(temp_path).await {
            tracing::warn!(key = %key, error = %e, "Failed to remove staging file after commit");
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put_stream(&self, key: &BlobKey, mut reader: BoxReader) -> Result<u64, StorageError> {
        if fs::try_exists(self.blob_path(key)).await? {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }

        let temp_path = self.temp_path(key);
        let mut total_bytes: u64 = 0;

        let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer
        let mut temp_file = fs::File::create(&temp_path).await?;

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    drop(temp_file);
                    let _ = fs::remove_file(&temp_path).await;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }

            total_bytes += n as u64;
            if total_bytes > self.max_size {
                drop(temp_file);
                let _ = fs::remove_file(&temp_path).await;
                return Err(StorageError::SizeLimitExceeded {
                    actual: total_bytes,
                    limit: self.max_size,
                });
            }

            if let Err(e) = temp_file.write_all(&buf[..n]).await {
                drop(temp_file);
                let _ = fs::remove_file(&temp_path).await;
                return Err(e.into());
            }
        }

        temp_file.flush().await?;
        drop(temp_file);

        if let Err(e) = self.link_into_place(&temp_path, key).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        Ok(total_bytes)
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool, StorageError> {
        let blob_path = self.blob_path(key);
        Ok(fs::try_exists(&blob_path).await?)
    }

    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError> {
        let blob_path = self.blob_path(key);
        match fs::remove_file(&blob_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => {
                    tracing::warn!(name = ?raw, "Skipping blob with a non-UTF-8 name");
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn list_staged(&self) -> Result<Vec<PathBuf>, StorageError> {
        let mut paths = Vec::new();
        let mut entries = fs::read_dir(self.base_path.join(".tmp")).await?;
        while let Some(entry) = entries.next_entry().await? {
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    fn locate(&self, key: &BlobKey) -> PathBuf {
        self.blob_path(key)
    }

    async fn stage(&self, key: &BlobKey) -> Result<StagedBlob, StorageError> {
        if fs::try_exists(self.blob_path(key)).await? {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        Ok(StagedBlob::new(key.clone(), self.temp_path(key)))
    }

    async fn commit(&self, staged: &StagedBlob) -> Result<u64, StorageError> {
        let size = match fs::metadata(staged.path()).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(staged.key().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if size > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: size,
                limit: self.max_size,
            });
        }

        self.link_into_place(staged.path(), staged.key()).await?;
        Ok(size)
    }

    async fn discard(&self, staged: StagedBlob) -> Result<(), StorageError> {
        match fs::remove_file(staged.path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
