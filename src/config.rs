use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::{EngineKind, StoreConfig};
use crate::storage::selector::DEFAULT_BUSY_TIMEOUT_MS;

/// Environment variable overriding the database file location
pub const DATABASE_PATH_ENV: &str = "PREDICTIONS_DB_PATH";

pub const DEFAULT_PORT: u16 = 3000;

/// Upload limit for JSON bodies carrying base64 images
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoralConfig {
    pub database: Option<String>,
    pub images_dir: Option<String>,
    pub port: Option<u16>,
    /// Engines in preference order; `[]` forces the in-memory store
    pub engines: Option<Vec<EngineKind>>,
    pub busy_timeout_ms: Option<u64>,
    pub model: Option<String>,
    pub max_upload_bytes: Option<usize>,
}

impl CoralConfig {
    /// Database path: explicit flag, then environment, then config, then default
    pub fn database_path(&self, flag: Option<&Path>, env_value: Option<String>, base: &Path) -> PathBuf {
        if let Some(path) = flag {
            return path.to_path_buf();
        }
        if let Some(path) = env_value.filter(|v| !v.trim().is_empty()) {
            return PathBuf::from(path);
        }
        match &self.database {
            Some(path) => base.join(path),
            None => default_database_path_in(base),
        }
    }

    pub fn store_config(&self, database: PathBuf) -> StoreConfig {
        let mut store = StoreConfig::new(database);
        if let Some(engines) = &self.engines {
            store.engines = engines.clone();
        }
        store.busy_timeout = Duration::from_millis(self.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS));
        store
    }

    pub fn images_dir_in(&self, base: &Path) -> PathBuf {
        match &self.images_dir {
            Some(dir) => base.join(dir),
            None => default_images_dir_in(base),
        }
    }

    pub fn model_path_in(&self, base: &Path) -> Option<PathBuf> {
        self.model.as_ref().map(|m| base.join(m))
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("coralwatch.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join("data").join("coral-predictions.db")
}

pub fn default_images_dir_in(base: &Path) -> PathBuf {
    base.join("public").join("coral-images")
}

/// Value of [`DATABASE_PATH_ENV`], if set
pub fn database_path_from_env() -> Option<String> {
    std::env::var(DATABASE_PATH_ENV).ok()
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<CoralConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: CoralConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &CoralConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> std::io::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
