use crate::common::constants::{
    DEFAULT_STORE_COLLECTION, DEFAULT_STORE_DB, DEFAULT_STORE_URI, DEFAULT_TIMEOUT_SECS,
    OPENFDA_BASE_URL,
};
use crate::common::error::{EtlError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub endpoint: String,
    pub credential: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub store_uri: String,
    pub store_db: String,
    pub store_collection: String,
}

/// Where raw batches are copied before normalization, if anywhere
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub raw_dir: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: OPENFDA_BASE_URL.to_string(),
            credential: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_uri: DEFAULT_STORE_URI.to_string(),
            store_db: DEFAULT_STORE_DB.to_string(),
            store_collection: DEFAULT_STORE_COLLECTION.to_string(),
        }
    }
}

impl Config {
    /// Load `config.toml` (or the file named by `ETL_CONFIG`), then apply
    /// environment overrides. A missing file means defaults.
    pub fn load() -> Result<Self> {
        let config_path = env::var("ETL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(Path::new(&config_path))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let config_content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_value(&["OPENFDA_BASE_URL"]) {
            self.source.endpoint = v;
        }
        if let Some(v) = env_value(&["OPENFDA_API_KEY"]) {
            self.source.credential = Some(v);
        }
        if let Some(v) = env_value(&["ETL_STORE_URI", "MONGO_URI"]) {
            self.store.store_uri = v;
        }
        if let Some(v) = env_value(&["ETL_STORE_DB", "DATABASE_NAME"]) {
            self.store.store_db = v;
        }
        if let Some(v) = env_value(&["ETL_STORE_COLLECTION"]) {
            self.store.store_collection = v;
        }
        if let Some(v) = env_value(&["ETL_RAW_DIR"]) {
            self.archive.raw_dir = Some(PathBuf::from(v));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.endpoint.trim().is_empty() {
            return Err(EtlError::Config("source.endpoint must not be empty".into()));
        }
        if self.source.timeout_seconds == 0 {
            return Err(EtlError::Config("source.timeout_seconds must be positive".into()));
        }
        if self.store.store_uri.trim().is_empty() {
            return Err(EtlError::Config("store.store_uri must not be empty".into()));
        }
        if !is_identifier(&self.store.store_db) {
            return Err(EtlError::Config(format!(
                "store.store_db '{}' is not a valid database name",
                self.store.store_db
            )));
        }
        if !is_identifier(&self.store.store_collection) {
            return Err(EtlError::Config(format!(
                "store.store_collection '{}' is not a valid collection name",
                self.store.store_collection
            )));
        }
        Ok(())
    }
}

/// First non-empty variable among `names`
fn env_value(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// `[A-Za-z_][A-Za-z0-9_]*`, safe to splice into SQL as a table name
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
