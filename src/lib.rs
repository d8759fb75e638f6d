//! # Coralwatch - Coral Reef Bleaching Prediction Store
//!
//! Stores "Healthy" / "Bleached" classifications of coral-reef images and
//! serves their history.
//!
//! Coralwatch provides:
//! - A backend selector that opens an embedded SQLite store and falls back to
//!   an in-memory table when no engine is usable
//! - A self-healing schema manager for the `predictions` table
//! - An async prediction repository with one contract for every backend
//! - An inference boundary (image preprocessing + output interpretation)
//! - An HTTP API for the dashboard: list, create, statistics and health

pub mod prediction;
pub mod storage;
pub mod inference;
pub mod server;
pub mod ui;
pub mod output;
pub mod config;

// Re-exports for convenient access
pub use prediction::{
    ClassificationOutcome, CoralClass, PredictedClass, Prediction, PredictionDraft,
    PredictionStats,
};
pub use storage::{Backend, BackendMode, PredictionRepository, Store, StoreConfig, WriteOutcome};
pub use inference::{Classifier, InferenceError};

/// Result type alias for Coralwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Coralwatch operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Backend initialization failed: {0}")]
    BackendInit(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
