//! Prediction repository - the async CRUD contract used by handlers and the CLI

use std::sync::Arc;

use chrono::{SubsecRound, Utc};

use super::{Backend, Store, WriteOutcome};
use crate::prediction::{CoralClass, Prediction, PredictionDraft, PredictionStats};
use crate::{Error, Result};

/// Typed access to persisted predictions.
///
/// Every operation ensures the schema and then runs on the blocking pool,
/// so callers may await it from request handlers. Cheap to clone.
#[derive(Clone)]
pub struct PredictionRepository {
    store: Arc<Store>,
}

impl PredictionRepository {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Backend) -> Result<T> + Send + 'static,
    {
        let backend = self.store.get()?;
        tokio::task::spawn_blocking(move || {
            backend.ensure_schema()?;
            op(backend.as_ref())
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))?
    }

    /// Insert a draft; the row gets the next id and `created_at = now`
    pub async fn insert(&self, draft: PredictionDraft) -> Result<WriteOutcome> {
        // Microseconds is what the SQLite column keeps.
        let created_at = Utc::now().trunc_subsecs(6);
        self.run(move |backend| backend.insert(&draft, created_at)).await
    }

    /// Every prediction, newest first
    pub async fn list_all(&self) -> Result<Vec<Prediction>> {
        self.run(|backend| backend.list_all()).await
    }

    /// The `limit` newest predictions; `limit` must already be validated
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<Prediction>> {
        self.run(move |backend| backend.list_recent(limit)).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.run(|backend| backend.count()).await
    }

    /// Exact-match filter; `Pending` rows never match
    pub async fn list_by_class(&self, class: CoralClass) -> Result<Vec<Prediction>> {
        self.run(move |backend| backend.list_by_class(class)).await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Prediction>> {
        self.run(move |backend| backend.get_by_id(id)).await
    }

    /// `rows_affected` is 1 when a row was removed, 0 when none matched
    pub async fn delete_by_id(&self, id: i64) -> Result<WriteOutcome> {
        let outcome = self.run(move |backend| backend.delete_by_id(id)).await?;
        if outcome.rows_affected > 0 {
            tracing::info!("Deleted prediction {}", id);
        }
        Ok(outcome)
    }

    /// Totals for the statistics endpoint
    pub async fn stats(&self) -> Result<PredictionStats> {
        let total = self.count().await?;
        let healthy = self.list_by_class(CoralClass::Healthy).await?.len();
        let bleached = self.list_by_class(CoralClass::Bleached).await?.len();
        Ok(PredictionStats {
            total,
            healthy,
            bleached,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreConfig;

    #[tokio::test]
    async fn test_operations_fail_before_acquire() {
        let repo = PredictionRepository::new(Arc::new(Store::new(StoreConfig::in_memory())));

        assert!(matches!(repo.count().await, Err(Error::StoreUnavailable(_))));
        assert!(matches!(
            repo.insert(PredictionDraft::pending("a.jpg")).await,
            Err(Error::StoreUnavailable(_))
        ));
        assert!(matches!(repo.delete_by_id(1).await, Err(Error::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_schema_failure_surfaces_from_every_operation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.db");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute("CREATE VIEW predictions AS SELECT 1 AS id", []).unwrap();
        }

        let store = Arc::new(Store::new(StoreConfig::new(path)));
        store.acquire().await;
        let repo = PredictionRepository::new(store);

        assert!(matches!(repo.count().await, Err(Error::Schema(_))));
        assert!(matches!(repo.list_all().await, Err(Error::Schema(_))));
        assert!(matches!(
            repo.insert(PredictionDraft::pending("a.jpg")).await,
            Err(Error::Schema(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_counts_pending_separately() {
        let store = Arc::new(Store::new(StoreConfig::in_memory()));
        store.acquire().await;
        let repo = PredictionRepository::new(store);

        repo.insert(PredictionDraft::new(
            "h.jpg",
            crate::prediction::ClassificationOutcome::from_percentages(5.0, 95.0),
        ))
        .await
        .unwrap();
        repo.insert(PredictionDraft::pending("p.jpg")).await.unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.healthy, 1);
        assert_eq!(stats.bleached, 0);
        assert_eq!(stats.pending(), 1);
    }
}
