pub mod config;
pub mod database;
pub mod engine;
pub mod entity;
pub mod error;
pub mod history;
pub mod models;
pub mod seed;
pub mod state;
pub mod store;
pub mod transcode;
pub mod utils;

pub use engine::{LineageEngine, OpContext, UndoOutcome};
pub use error::{LineageError, Outcome};
