//! In-memory fallback store
//!
//! Used when no SQLite engine can be opened. Rows live in a list kept in
//! listing order (newest first) and vanish when the process exits.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{Backend, BackendMode, WriteOutcome};
use crate::prediction::{CoralClass, Prediction, PredictionDraft};
use crate::{Error, Result};

struct Table {
    rows: Vec<Prediction>,
    next_id: i64,
}

/// Process-local prediction table
pub struct MemoryBackend {
    table: Mutex<Table>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                rows: Vec::new(),
                next_id: 1,
            }),
        }
    }

    fn table(&self) -> Result<MutexGuard<'_, Table>> {
        self.table
            .lock()
            .map_err(|_| Error::StoreUnavailable("in-memory table lock poisoned".to_string()))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Memory
    }

    fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    fn insert(&self, draft: &PredictionDraft, created_at: DateTime<Utc>) -> Result<WriteOutcome> {
        let mut table = self.table()?;
        let id = table.next_id;
        table.next_id += 1;

        // Ahead of every row that is not newer, so equal timestamps list the
        // latest insert first.
        let position = table
            .rows
            .iter()
            .position(|row| row.created_at <= created_at)
            .unwrap_or(table.rows.len());
        table
            .rows
            .insert(position, draft.clone().into_prediction(id, created_at));

        tracing::debug!("Prediction saved to in-memory DB: {}", id);
        Ok(WriteOutcome {
            last_insert_id: id,
            rows_affected: 1,
        })
    }

    fn list_all(&self) -> Result<Vec<Prediction>> {
        Ok(self.table()?.rows.clone())
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<Prediction>> {
        Ok(self.table()?.rows.iter().take(limit).cloned().collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.table()?.rows.len())
    }

    fn list_by_class(&self, class: CoralClass) -> Result<Vec<Prediction>> {
        Ok(self
            .table()?
            .rows
            .iter()
            .filter(|row| row.predicted_class.coral_class() == Some(class))
            .cloned()
            .collect())
    }

    fn get_by_id(&self, id: i64) -> Result<Option<Prediction>> {
        Ok(self.table()?.rows.iter().find(|row| row.id == id).cloned())
    }

    fn delete_by_id(&self, id: i64) -> Result<WriteOutcome> {
        let mut table = self.table()?;
        let before = table.rows.len();
        table.rows.retain(|row| row.id != id);
        Ok(WriteOutcome {
            last_insert_id: 0,
            rows_affected: before - table.rows.len(),
        })
    }
}
