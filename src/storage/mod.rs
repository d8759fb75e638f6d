//! Storage Layer - prediction persistence
//!
//! System of record is SQLite with one table:
//! - predictions(id, image_name, image_url, predicted_class, confidence,
//!   probability_bleached, probability_healthy, created_at)
//!
//! When no SQLite engine can be opened the store degrades to an in-memory
//! table with the same contract. Callers never branch on the active mode.

pub mod schema;
pub mod sqlite;
pub mod memory;
pub mod selector;
pub mod repository;

use crate::prediction::{CoralClass, Prediction, PredictionDraft};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use memory::MemoryBackend;
pub use repository::PredictionRepository;
pub use selector::{select_backend, EngineKind, Store, StoreConfig, StoreStatus};
pub use sqlite::SqliteBackend;

/// Canonical result of a write, whatever the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    /// Id of the inserted row (0 for deletes)
    pub last_insert_id: i64,
    /// Number of rows inserted or removed
    pub rows_affected: usize,
}

/// Which backend is serving requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendMode {
    /// SQLite file with write-ahead logging
    SqliteWal,
    /// SQLite file with the rollback journal
    SqliteRollback,
    /// Process-local list, lost on restart
    Memory,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::SqliteWal => "sqlite-wal",
            BackendMode::SqliteRollback => "sqlite-rollback",
            BackendMode::Memory => "memory",
        }
    }

    pub fn is_persistent(&self) -> bool {
        !matches!(self, BackendMode::Memory)
    }
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Row operations every backend implements.
///
/// Listings are ordered newest first: `created_at` descending, then
/// insertion order descending. All methods are blocking; the repository
/// moves them off the async runtime.
pub trait Backend: Send + Sync {
    fn mode(&self) -> BackendMode;

    /// Make sure the table exists. Called before every repository operation.
    fn ensure_schema(&self) -> Result<()>;

    fn insert(&self, draft: &PredictionDraft, created_at: DateTime<Utc>) -> Result<WriteOutcome>;

    fn list_all(&self) -> Result<Vec<Prediction>>;

    /// First `limit` rows of [`Backend::list_all`]
    fn list_recent(&self, limit: usize) -> Result<Vec<Prediction>>;

    fn count(&self) -> Result<usize>;

    fn list_by_class(&self, class: CoralClass) -> Result<Vec<Prediction>>;

    fn get_by_id(&self, id: i64) -> Result<Option<Prediction>>;

    fn delete_by_id(&self, id: i64) -> Result<WriteOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::{ClassificationOutcome, PredictedClass};
    use std::path::PathBuf;
    use std::sync::Arc;

    struct Fixture {
        name: &'static str,
        repo: PredictionRepository,
        expected_mode: BackendMode,
        _dir: tempfile::TempDir,
    }

    type ConfigFor = fn(&tempfile::TempDir) -> StoreConfig;

    async fn fixtures() -> Vec<Fixture> {
        let mut out = Vec::new();
        let cases: [(&'static str, BackendMode, ConfigFor); 4] = [
            ("memory", BackendMode::Memory, |_| StoreConfig::in_memory()),
            ("sqlite-wal", BackendMode::SqliteWal, |dir| {
                StoreConfig::new(dir.path().join("wal.db")).with_engines(vec![EngineKind::SqliteWal])
            }),
            ("sqlite-rollback", BackendMode::SqliteRollback, |dir| {
                StoreConfig::new(dir.path().join("rollback.db"))
                    .with_engines(vec![EngineKind::SqliteRollback])
            }),
            ("forced-fallback", BackendMode::Memory, |dir| {
                let blocker: PathBuf = dir.path().join("blocker");
                std::fs::write(&blocker, b"file").unwrap();
                StoreConfig::new(blocker.join("p.db"))
            }),
        ];

        for (name, expected_mode, build) in cases {
            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(Store::new(build(&dir)));
            store.acquire().await;
            out.push(Fixture {
                name,
                repo: PredictionRepository::new(store),
                expected_mode,
                _dir: dir,
            });
        }
        out
    }

    fn healthy(name: &str) -> PredictionDraft {
        PredictionDraft::new(name, ClassificationOutcome::from_percentages(12.5, 87.5))
            .with_image_url(Some(format!("/coral-images/{}", name)))
    }

    fn bleached(name: &str) -> PredictionDraft {
        PredictionDraft::new(name, ClassificationOutcome::from_percentages(91.0, 9.0))
    }

    #[tokio::test]
    async fn test_selected_mode_per_fixture() {
        for f in fixtures().await {
            let status = f.repo.store().status().unwrap();
            assert_eq!(status.backend, f.expected_mode, "{}", f.name);
        }
    }

    #[tokio::test]
    async fn test_ids_increase_and_count_matches() {
        for f in fixtures().await {
            let mut last = 0;
            for name in ["a.jpg", "b.jpg", "c.jpg"] {
                let outcome = f.repo.insert(PredictionDraft::pending(name)).await.unwrap();
                assert_eq!(outcome.rows_affected, 1, "{}", f.name);
                assert!(outcome.last_insert_id > last, "{}", f.name);
                last = outcome.last_insert_id;
            }
            assert_eq!(f.repo.count().await.unwrap(), 3, "{}", f.name);
            assert_eq!(f.repo.list_all().await.unwrap().len(), 3, "{}", f.name);
        }
    }

    #[tokio::test]
    async fn test_list_recent_is_newest_first() {
        for f in fixtures().await {
            for name in ["a.jpg", "b.jpg", "c.jpg"] {
                f.repo.insert(PredictionDraft::pending(name)).await.unwrap();
            }

            let recent = f.repo.list_recent(2).await.unwrap();
            let names: Vec<_> = recent.iter().map(|p| p.image_name.as_str()).collect();
            assert_eq!(names, ["c.jpg", "b.jpg"], "{}", f.name);

            let all = f.repo.list_all().await.unwrap();
            assert_eq!(&all[..2], &recent[..], "{}", f.name);
            assert!(
                all.windows(2).all(|w| w[0].created_at >= w[1].created_at),
                "{}",
                f.name
            );

            assert_eq!(f.repo.list_recent(10).await.unwrap().len(), 3, "{}", f.name);
        }
    }

    #[tokio::test]
    async fn test_empty_store_lists_nothing() {
        for f in fixtures().await {
            assert!(f.repo.list_all().await.unwrap().is_empty(), "{}", f.name);
            assert!(f.repo.list_recent(5).await.unwrap().is_empty(), "{}", f.name);
            assert_eq!(f.repo.count().await.unwrap(), 0, "{}", f.name);
            assert_eq!(f.repo.get_by_id(1).await.unwrap(), None, "{}", f.name);
        }
    }

    #[tokio::test]
    async fn test_get_by_id_returns_inserted_fields() {
        for f in fixtures().await {
            let draft = healthy("reef.png");
            let id = f.repo.insert(draft.clone()).await.unwrap().last_insert_id;

            let row = f.repo.get_by_id(id).await.unwrap().unwrap();
            assert_eq!(row.id, id, "{}", f.name);
            assert_eq!(row.draft(), draft, "{}", f.name);
        }
    }

    #[tokio::test]
    async fn test_pending_defaults() {
        for f in fixtures().await {
            let id = f
                .repo
                .insert(PredictionDraft::pending("unclassified.jpg"))
                .await
                .unwrap()
                .last_insert_id;

            let row = f.repo.get_by_id(id).await.unwrap().unwrap();
            assert_eq!(row.predicted_class, PredictedClass::Pending, "{}", f.name);
            assert_eq!(row.confidence, 0.0, "{}", f.name);
            assert_eq!(row.probability_bleached, 0.0, "{}", f.name);
            assert_eq!(row.probability_healthy, 0.0, "{}", f.name);
            assert_eq!(row.image_url, None, "{}", f.name);
        }
    }

    #[tokio::test]
    async fn test_list_by_class_is_exact() {
        for f in fixtures().await {
            f.repo.insert(healthy("h1.jpg")).await.unwrap();
            f.repo.insert(bleached("b1.jpg")).await.unwrap();
            f.repo.insert(PredictionDraft::pending("p1.jpg")).await.unwrap();
            f.repo.insert(healthy("h2.jpg")).await.unwrap();

            let rows = f.repo.list_by_class(CoralClass::Healthy).await.unwrap();
            let names: Vec<_> = rows.iter().map(|p| p.image_name.as_str()).collect();
            assert_eq!(names, ["h2.jpg", "h1.jpg"], "{}", f.name);

            let rows = f.repo.list_by_class(CoralClass::Bleached).await.unwrap();
            assert_eq!(rows.len(), 1, "{}", f.name);
            assert_eq!(rows[0].predicted_class, PredictedClass::Bleached, "{}", f.name);

            let stats = f.repo.stats().await.unwrap();
            assert_eq!((stats.total, stats.healthy, stats.bleached), (4, 2, 1), "{}", f.name);
        }
    }

    #[tokio::test]
    async fn test_delete_by_id() {
        for f in fixtures().await {
            let keep = f.repo.insert(healthy("keep.jpg")).await.unwrap().last_insert_id;
            let gone = f.repo.insert(bleached("gone.jpg")).await.unwrap().last_insert_id;

            assert_eq!(f.repo.delete_by_id(gone).await.unwrap().rows_affected, 1, "{}", f.name);
            assert_eq!(f.repo.delete_by_id(gone).await.unwrap().rows_affected, 0, "{}", f.name);
            assert_eq!(f.repo.delete_by_id(9999).await.unwrap().rows_affected, 0, "{}", f.name);

            assert_eq!(f.repo.get_by_id(gone).await.unwrap(), None, "{}", f.name);
            assert!(f.repo.get_by_id(keep).await.unwrap().is_some(), "{}", f.name);
            assert_eq!(f.repo.count().await.unwrap(), 1, "{}", f.name);

            let next = f.repo.insert(healthy("next.jpg")).await.unwrap().last_insert_id;
            assert!(next > gone, "{}", f.name);
        }
    }

    #[tokio::test]
    async fn test_schema_check_is_repeatable() {
        for f in fixtures().await {
            let backend = f.repo.store().get().unwrap();
            backend.ensure_schema().unwrap();
            backend.ensure_schema().unwrap();
            f.repo.insert(healthy("after.jpg")).await.unwrap();
            backend.ensure_schema().unwrap();
            assert_eq!(f.repo.count().await.unwrap(), 1, "{}", f.name);
        }
    }
}
