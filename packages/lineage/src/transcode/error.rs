use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("failed to launch media engine: {0}")]
    Launch(String),

    #[error("media engine error: {0}")]
    Execution(String),

    #[error("media engine timed out after {0:?}")]
    TimedOut(Duration),

    #[error("could not measure duration: {0}")]
    Probe(String),

    #[error("invalid transcode job: {0}")]
    InvalidJob(String),
}
