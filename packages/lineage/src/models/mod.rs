pub mod artifact;
pub mod edit;
pub mod version;

pub use artifact::{AudioArtifact, ListScope, NewArtifact, Project, ProjectListing};
pub use edit::{EchoParams, EditOperation, EffectKind};
pub use version::VersionStamp;
