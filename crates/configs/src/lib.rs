//! # configs
//!
//! Layered application configuration: built-in defaults, then an optional
//! `lost_found.toml`, then `LF__`-prefixed environment variables
//! (e.g. `LF__STORE__BACKEND=sqlite`). A `.env` file is read first if present.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "lost_found.toml";
pub const DEFAULT_COLLECTION: &str = "LostFoundReports";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration value {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: String,
    /// Name of the shared report collection.
    pub collection: String,
    pub submit_timeout_ms: u64,
    /// How often the sqlite backend looks for writes from other kiosks.
    pub poll_interval_ms: u64,
}

impl StoreConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    pub enabled: bool,
    pub root_path: PathBuf,
    pub url_prefix: String,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set.
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub media: MediaConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Loads `.env`, [`DEFAULT_CONFIG_FILE`] (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = with_defaults()?
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("LF")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::finish(settings)
    }

    /// Defaults overlaid with an inline TOML document.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let settings = with_defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::finish(settings)
    }

    fn finish(settings: Config) -> Result<Self, ConfigError> {
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.collection.trim().is_empty() {
            return Err(ConfigError::Invalid("store.collection", "cannot be empty".into()));
        }
        if self.store.submit_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "store.submit_timeout_ms",
                "must be greater than zero".into(),
            ));
        }
        if self.store.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "store.poll_interval_ms",
                "must be greater than zero".into(),
            ));
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.database_url.is_empty() {
            return Err(ConfigError::Invalid(
                "store.database_url",
                "required for the sqlite backend".into(),
            ));
        }
        if self.media.enabled && self.media.max_bytes == 0 {
            return Err(ConfigError::Invalid(
                "media.max_bytes",
                "must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn with_defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Ok(Config::builder()
        .set_default("store.backend", "memory")?
        .set_default("store.database_url", "sqlite://lost_found.db")?
        .set_default("store.collection", DEFAULT_COLLECTION)?
        .set_default("store.submit_timeout_ms", 10_000)?
        .set_default("store.poll_interval_ms", 1_000)?
        .set_default("media.enabled", false)?
        .set_default("media.root_path", "./data/uploads")?
        .set_default("media.url_prefix", "/static/uploads")?
        .set_default("media.max_bytes", 10 * 1024 * 1024)?
        .set_default("log.filter", "info")?
        .set_default("log.json", false)?)
}
