//! Backend selection
//!
//! Engines are tried in configured order; the first one that opens wins.
//! When none does, the store runs on the in-memory table. Selection happens
//! once per [`Store`] and every caller shares the resulting handle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::{Backend, BackendMode, MemoryBackend, SqliteBackend};
use crate::{Error, Result};

/// Default busy timeout (ms)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Embedded SQL engines, in the order they are normally preferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// SQLite with write-ahead logging
    SqliteWal,
    /// SQLite with the rollback journal, for filesystems without WAL support
    SqliteRollback,
}

impl EngineKind {
    /// Value of the `journal_mode` pragma for this engine
    pub fn journal_mode(&self) -> &'static str {
        match self {
            EngineKind::SqliteWal => "wal",
            EngineKind::SqliteRollback => "delete",
        }
    }

    pub fn mode(&self) -> BackendMode {
        match self {
            EngineKind::SqliteWal => BackendMode::SqliteWal,
            EngineKind::SqliteRollback => BackendMode::SqliteRollback,
        }
    }

    pub fn default_order() -> Vec<EngineKind> {
        vec![EngineKind::SqliteWal, EngineKind::SqliteRollback]
    }
}

/// Where and how to open the store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Engines to try; empty selects the in-memory table directly
    pub engines: Vec<EngineKind>,
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            engines: EngineKind::default_order(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }

    /// A config that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            engines: Vec::new(),
            ..Self::new(PathBuf::new())
        }
    }

    pub fn with_engines(mut self, engines: Vec<EngineKind>) -> Self {
        self.engines = engines;
        self
    }
}

/// Pick a backend for `config`. Never fails: open errors are logged and the
/// next candidate is tried, ending at the in-memory table.
pub fn select_backend(config: &StoreConfig) -> Arc<dyn Backend> {
    if !config.engines.is_empty() {
        // The directory may be read-only or provisioned elsewhere; opening
        // the file decides.
        if let Err(e) = crate::config::ensure_db_dir(&config.path) {
            tracing::warn!("Could not create database directory for {}: {}", config.path.display(), e);
        }
    }

    for engine in &config.engines {
        match SqliteBackend::open(&config.path, *engine, config.busy_timeout) {
            Ok(backend) => {
                tracing::info!("{} opened DB path: {}", engine.mode(), config.path.display());
                return Arc::new(backend);
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to open {} DB at {}: {}",
                    engine.mode(),
                    config.path.display(),
                    e
                );
            }
        }
    }

    tracing::warn!("SQLite not available; using in-memory DB fallback (no file storage)");
    Arc::new(MemoryBackend::new())
}

/// Observable state of the selected backend
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub backend: BackendMode,
    pub persistent: bool,
    /// Database file, when the backend has one
    pub path: Option<PathBuf>,
}

/// Owner of the process-wide backend handle.
///
/// Built by the composition root and shared through `Arc`. The first
/// [`Store::acquire`] runs selection; concurrent callers wait for it and
/// receive the same handle.
pub struct Store {
    config: StoreConfig,
    backend: OnceCell<Arc<dyn Backend>>,
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            backend: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Select the backend on first call, then return the shared handle
    pub async fn acquire(&self) -> Arc<dyn Backend> {
        self.backend
            .get_or_init(|| async {
                let config = self.config.clone();
                match tokio::task::spawn_blocking(move || select_backend(&config)).await {
                    Ok(backend) => backend,
                    Err(e) => {
                        tracing::error!("Backend selection task failed: {}", e);
                        let fallback: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
                        fallback
                    }
                }
            })
            .await
            .clone()
    }

    /// The selected backend, or [`Error::StoreUnavailable`] before
    /// [`Store::acquire`] has completed
    pub fn get(&self) -> Result<Arc<dyn Backend>> {
        self.backend
            .get()
            .cloned()
            .ok_or_else(|| Error::StoreUnavailable("backend has not been selected".to_string()))
    }

    pub fn status(&self) -> Option<StoreStatus> {
        let backend = self.backend.get()?;
        let mode = backend.mode();
        Some(StoreStatus {
            backend: mode,
            persistent: mode.is_persistent(),
            path: mode.is_persistent().then(|| self.config.path.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked_path(dir: &tempfile::TempDir) -> PathBuf {
        let blocker = dir.path().join("read-only");
        std::fs::write(&blocker, b"not a directory").unwrap();
        blocker.join("predictions.db")
    }

    #[test]
    fn test_prefers_wal_engine() {
        let dir = tempfile::tempdir().unwrap();
        let backend = select_backend(&StoreConfig::new(dir.path().join("data").join("p.db")));
        assert_eq!(backend.mode(), BackendMode::SqliteWal);
        assert!(dir.path().join("data").exists());
    }

    #[test]
    fn test_secondary_engine_when_listed_alone() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("p.db")).with_engines(vec![EngineKind::SqliteRollback]);
        assert_eq!(select_backend(&config).mode(), BackendMode::SqliteRollback);
    }

    #[test]
    fn test_falls_back_to_memory_on_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let backend = select_backend(&StoreConfig::new(blocked_path(&dir)));
        assert_eq!(backend.mode(), BackendMode::Memory);
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_database_falls_back_to_memory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let path = data.join("p.db");
        drop(select_backend(&StoreConfig::new(path.clone()).with_engines(vec![EngineKind::SqliteRollback])));
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o444)).unwrap();
        std::fs::set_permissions(&data, std::fs::Permissions::from_mode(0o555)).unwrap();

        // Permission bits do not bind a privileged user
        let writable = std::fs::OpenOptions::new().write(true).open(&path).is_ok();
        let mode = select_backend(&StoreConfig::new(path.clone())).mode();

        std::fs::set_permissions(&data, std::fs::Permissions::from_mode(0o755)).unwrap();
        if !writable {
            assert_eq!(mode, BackendMode::Memory);
        }
    }

    #[test]
    fn test_empty_engine_list_is_memory() {
        assert_eq!(select_backend(&StoreConfig::in_memory()).mode(), BackendMode::Memory);
    }

    #[tokio::test]
    async fn test_get_before_acquire_is_unavailable() {
        let store = Store::new(StoreConfig::in_memory());
        assert!(matches!(store.get(), Err(Error::StoreUnavailable(_))));
        assert!(store.status().is_none());

        store.acquire().await;
        assert!(store.get().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_shares_one_handle() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::new(StoreConfig::new(dir.path().join("p.db"))));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move { store.acquire().await }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }
        for handle in &handles {
            assert!(std::ptr::addr_eq(Arc::as_ptr(handle), Arc::as_ptr(&handles[0])));
        }
    }

    #[tokio::test]
    async fn test_status_reports_degraded_mode() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(StoreConfig::new(blocked_path(&dir)));
        store.acquire().await;

        let status = store.status().unwrap();
        assert_eq!(status.backend, BackendMode::Memory);
        assert!(!status.persistent);
        assert!(status.path.is_none());
    }
}
