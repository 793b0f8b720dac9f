use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    /// Default: 20.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Default: 1.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Log every statement through sqlx. Default: false.
    #[serde(default)]
    pub sqlx_logging: bool,
}

fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    1
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            sqlx_logging: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding every audio blob. Default: "./data/audio".
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Largest accepted upload in bytes. Default: 200 MiB.
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
}

fn default_base_path() -> String {
    "./data/audio".into()
}
fn default_max_blob_size() -> u64 {
    200 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            max_blob_size: default_max_blob_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscodeConfig {
    /// Default: "ffmpeg".
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: String,
    /// Default: "ffprobe".
    #[serde(default = "default_ffprobe_bin")]
    pub ffprobe_bin: String,
    /// Upper bound on one media engine call. Default: 120.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ffmpeg_bin() -> String {
    "ffmpeg".into()
}
fn default_ffprobe_bin() -> String {
    "ffprobe".into()
}
fn default_timeout_secs() -> u64 {
    120
}

impl TranscodeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: default_ffmpeg_bin(),
            ffprobe_bin: default_ffprobe_bin(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("LINEAGE_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("database.url", "postgres://localhost/lineage")?
            .set_default("storage.base_path", default_base_path())?
            .set_default("transcode.timeout_secs", default_timeout_secs() as i64)?
            // Load from config/config.toml
            .add_source(File::with_name(&config_path).required(false))
            // Override from environment (e.g., LINEAGE__DATABASE__URL)
            .add_source(Environment::with_prefix("LINEAGE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
