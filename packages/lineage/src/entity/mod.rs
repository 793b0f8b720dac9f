pub mod audio_artifact;
pub mod project;
pub mod project_artifact;
