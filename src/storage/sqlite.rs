//! SQLite storage implementation

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, DatabaseName, OpenFlags, OptionalExtension, Params};

use super::schema::{self, PREDICTION_COLUMNS};
use super::selector::EngineKind;
use super::{Backend, BackendMode, WriteOutcome};
use crate::prediction::{CoralClass, PredictedClass, Prediction, PredictionDraft};
use crate::{Error, Result};

/// Storage format of `created_at`; lexical order equals time order
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// SQLite-backed prediction store
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    mode: BackendMode,
}

impl SqliteBackend {
    /// Open a database file (creates if doesn't exist) with the given engine.
    ///
    /// Fails if the file cannot be opened for writing or the engine's journal
    /// mode is not honoured by the filesystem.
    pub fn open(path: &Path, engine: EngineKind, busy_timeout: Duration) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        // SQLite quietly opens read-only when the file or directory is not writable
        if conn.is_readonly(DatabaseName::Main)? {
            return Err(Error::BackendInit(format!("{} is read-only", path.display())));
        }
        conn.busy_timeout(busy_timeout)?;

        let wanted = engine.journal_mode();
        let actual: String =
            conn.pragma_update_and_check(None, "journal_mode", wanted, |row| row.get(0))?;
        if !actual.eq_ignore_ascii_case(wanted) {
            return Err(Error::BackendInit(format!(
                "journal_mode {} not supported at {} (got {})",
                wanted,
                path.display(),
                actual
            )));
        }

        Ok(Self {
            conn: Mutex::new(conn),
            mode: engine.mode(),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::StoreUnavailable("sqlite connection lock poisoned".to_string()))
    }

    /// Run a write statement and normalize its outcome
    fn exec<P: Params>(&self, sql: &str, params: P) -> Result<WriteOutcome> {
        let conn = self.conn()?;
        let rows_affected = conn.execute(sql, params)?;
        Ok(WriteOutcome {
            last_insert_id: conn.last_insert_rowid(),
            rows_affected,
        })
    }

    fn query_all<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Prediction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, row_to_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn query_one<P: Params>(&self, sql: &str, params: P) -> Result<Option<Prediction>> {
        let conn = self.conn()?;
        conn.query_row(sql, params, row_to_prediction)
            .optional()
            .map_err(Into::into)
    }
}

impl Backend for SqliteBackend {
    fn mode(&self) -> BackendMode {
        self.mode
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        schema::ensure_schema(&conn)
    }

    fn insert(&self, draft: &PredictionDraft, created_at: DateTime<Utc>) -> Result<WriteOutcome> {
        let outcome = self.exec(
            r#"
            INSERT INTO predictions (
                image_name, image_url, predicted_class, confidence,
                probability_bleached, probability_healthy, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                draft.image_name,
                draft.image_url,
                draft.predicted_class.as_str(),
                draft.confidence,
                draft.probability_bleached,
                draft.probability_healthy,
                format_timestamp(&created_at),
            ],
        )?;
        tracing::debug!("Prediction saved to SQLite DB: {}", outcome.last_insert_id);
        Ok(outcome)
    }

    fn list_all(&self) -> Result<Vec<Prediction>> {
        self.query_all(
            &format!("SELECT {} FROM predictions ORDER BY created_at DESC, id DESC", PREDICTION_COLUMNS),
            [],
        )
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<Prediction>> {
        self.query_all(
            &format!(
                "SELECT {} FROM predictions ORDER BY created_at DESC, id DESC LIMIT ?1",
                PREDICTION_COLUMNS
            ),
            [limit as i64],
        )
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn list_by_class(&self, class: CoralClass) -> Result<Vec<Prediction>> {
        self.query_all(
            &format!(
                "SELECT {} FROM predictions WHERE predicted_class = ?1 ORDER BY created_at DESC, id DESC",
                PREDICTION_COLUMNS
            ),
            [class.as_str()],
        )
    }

    fn get_by_id(&self, id: i64) -> Result<Option<Prediction>> {
        self.query_one(
            &format!("SELECT {} FROM predictions WHERE id = ?1", PREDICTION_COLUMNS),
            [id],
        )
    }

    fn delete_by_id(&self, id: i64) -> Result<WriteOutcome> {
        let outcome = self.exec("DELETE FROM predictions WHERE id = ?1", [id])?;
        Ok(WriteOutcome {
            last_insert_id: 0,
            ..outcome
        })
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp; accepts rows written by `CURRENT_TIMESTAMP`
pub fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|naive| naive.and_utc())
}

/// Helper to convert a row to a Prediction
fn row_to_prediction(row: &rusqlite::Row) -> rusqlite::Result<Prediction> {
    let class_str: String = row.get(3)?;
    let created_str: String = row.get(7)?;

    // Older databases accepted any class string
    let predicted_class = class_str.parse::<PredictedClass>().unwrap_or_else(|_| {
        tracing::warn!("Unknown predicted_class {:?}, reading it as Pending", class_str);
        PredictedClass::Pending
    });

    let created_at = parse_timestamp(&created_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Prediction {
        id: row.get(0)?,
        image_name: row.get(1)?,
        image_url: row.get(2)?,
        predicted_class,
        confidence: row.get(4)?,
        probability_bleached: row.get(5)?,
        probability_healthy: row.get(6)?,
        created_at,
    })
}
