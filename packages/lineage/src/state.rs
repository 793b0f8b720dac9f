use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use common::storage::filesystem::FilesystemBlobStore;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::database::init_db;
use crate::engine::LineageEngine;
use crate::seed::ensure_indexes;
use crate::store::SeaOrmMetadataStore;
use crate::transcode::ffmpeg::FfmpegTranscoder;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DatabaseConnection,
    pub engine: LineageEngine,
}

impl AppState {
    /// Connects to the database, prepares the blob directory and wires the
    /// production engine.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let db = init_db(&config.database)
            .await
            .context("Failed to connect to database")?;
        ensure_indexes(&db)
            .await
            .context("Failed to create indexes")?;

        let blobs = FilesystemBlobStore::new(
            PathBuf::from(&config.storage.base_path),
            config.storage.max_blob_size,
        )
        .await
        .with_context(|| format!("Failed to open blob store at {}", config.storage.base_path))?;

        let engine = LineageEngine::new(
            Arc::new(SeaOrmMetadataStore::new(db.clone())),
            Arc::new(blobs),
            Arc::new(FfmpegTranscoder::from_config(&config.transcode)),
        )
        .with_transcode_timeout(config.transcode.timeout());

        Ok(Self { config, db, engine })
    }
}
