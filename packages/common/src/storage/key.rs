use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::StorageError;

/// Longest file name accepted by common filesystems.
const MAX_KEY_LEN: usize = 255;

/// A validated blob key: the flat file name a blob is stored under.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobKey(String);

impl BlobKey {
    /// Validate a stored file name and wrap it as a key.
    pub fn new(name: impl Into<String>) -> Result<Self, StorageError> {
        let name = name.into();

        if name.is_empty() {
            return Err(StorageError::InvalidKey("key cannot be empty".into()));
        }
        if name.len() > MAX_KEY_LEN {
            return Err(StorageError::InvalidKey(format!(
                "expected at most {MAX_KEY_LEN} bytes, got {}",
                name.len()
            )));
        }
        if name.chars().any(|c| c.is_control()) {
            return Err(StorageError::InvalidKey(
                "control characters are not allowed".into(),
            ));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(StorageError::InvalidKey(
                "path separators are not allowed".into(),
            ));
        }
        if name.starts_with('.') {
            return Err(StorageError::InvalidKey(format!(
                "hidden names are not allowed: {name}"
            )));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extension of the key including the leading dot, or `""` when absent.
    pub fn extension(&self) -> &str {
        match self.0.rfind('.') {
            Some(pos) if pos > 0 => &self.0[pos..],
            _ => "",
        }
    }
}

impl fmt::Debug for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobKey({})", self.0)
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for BlobKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BlobKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}
