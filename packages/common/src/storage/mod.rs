mod error;
mod key;
mod traits;

pub mod filesystem;

pub use error::StorageError;
pub use key::BlobKey;
pub use traits::{BlobStore, BoxReader, StagedBlob};
