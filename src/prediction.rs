//! Prediction types
//!
//! A prediction is the sole persisted entity: one classified (or pending)
//! coral image. Classes:
//! - `Healthy`: the reef shows no bleaching
//! - `Bleached`: the reef is bleached
//! - `Pending`: placeholder written before (or instead of) a classification

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Label produced by the classifier.
///
/// The discriminant order is the model's output order: index 0 is
/// `Bleached`, index 1 is `Healthy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoralClass {
    Bleached,
    Healthy,
}

impl CoralClass {
    /// Classes in model output order
    pub const OUTPUT_ORDER: [CoralClass; 2] = [CoralClass::Bleached, CoralClass::Healthy];

    pub fn as_str(&self) -> &'static str {
        match self {
            CoralClass::Bleached => "Bleached",
            CoralClass::Healthy => "Healthy",
        }
    }
}

impl FromStr for CoralClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "healthy" => Ok(CoralClass::Healthy),
            "bleached" => Ok(CoralClass::Bleached),
            _ => Err(Error::Parse(format!("Unknown coral class: {}", s))),
        }
    }
}

impl std::fmt::Display for CoralClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stored class of a prediction, including the `Pending` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PredictedClass {
    Healthy,
    Bleached,
    #[default]
    Pending,
}

impl PredictedClass {
    /// Get the string representation stored in the `predicted_class` column
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictedClass::Healthy => "Healthy",
            PredictedClass::Bleached => "Bleached",
            PredictedClass::Pending => "Pending",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PredictedClass::Pending)
    }

    /// The classifier label, if this is a real verdict
    pub fn coral_class(&self) -> Option<CoralClass> {
        match self {
            PredictedClass::Healthy => Some(CoralClass::Healthy),
            PredictedClass::Bleached => Some(CoralClass::Bleached),
            PredictedClass::Pending => None,
        }
    }
}

impl From<CoralClass> for PredictedClass {
    fn from(class: CoralClass) -> Self {
        match class {
            CoralClass::Healthy => PredictedClass::Healthy,
            CoralClass::Bleached => PredictedClass::Bleached,
        }
    }
}

impl FromStr for PredictedClass {
    type Err = Error;

    /// Stored values are matched exactly; anything else is rejected so a
    /// foreign row can never masquerade as a verdict.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Healthy" => Ok(PredictedClass::Healthy),
            "Bleached" => Ok(PredictedClass::Bleached),
            "Pending" => Ok(PredictedClass::Pending),
            _ => Err(Error::Parse(format!("Unknown predicted class: {}", s))),
        }
    }
}

impl std::fmt::Display for PredictedClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of classifying one image, with percentages in 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationOutcome {
    pub predicted_class: PredictedClass,
    pub confidence: f64,
    pub probability_bleached: f64,
    pub probability_healthy: f64,
}

impl ClassificationOutcome {
    /// Placeholder verdict used before or instead of a classification
    pub fn pending() -> Self {
        Self {
            predicted_class: PredictedClass::Pending,
            confidence: 0.0,
            probability_bleached: 0.0,
            probability_healthy: 0.0,
        }
    }

    /// Build a verdict from percentages; the class is the argmax and the
    /// confidence its value. Ties resolve to `Healthy`.
    pub fn from_percentages(probability_bleached: f64, probability_healthy: f64) -> Self {
        let class = if probability_bleached > probability_healthy {
            CoralClass::Bleached
        } else {
            CoralClass::Healthy
        };
        Self {
            predicted_class: class.into(),
            confidence: probability_bleached.max(probability_healthy),
            probability_bleached,
            probability_healthy,
        }
    }
}

impl Default for ClassificationOutcome {
    fn default() -> Self {
        Self::pending()
    }
}

/// Insert input for the repository. `id` and `created_at` are assigned by
/// the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionDraft {
    pub image_name: String,
    pub image_url: Option<String>,
    pub predicted_class: PredictedClass,
    pub confidence: f64,
    pub probability_bleached: f64,
    pub probability_healthy: f64,
}

impl PredictionDraft {
    /// A draft with the `Pending` / zeroed verdict
    pub fn pending(image_name: impl Into<String>) -> Self {
        Self::new(image_name, ClassificationOutcome::pending())
    }

    pub fn new(image_name: impl Into<String>, outcome: ClassificationOutcome) -> Self {
        Self {
            image_name: image_name.into(),
            image_url: None,
            predicted_class: outcome.predicted_class,
            confidence: outcome.confidence,
            probability_bleached: outcome.probability_bleached,
            probability_healthy: outcome.probability_healthy,
        }
    }

    pub fn with_image_url(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }

    /// Materialize the row the store will hold for this draft
    pub fn into_prediction(self, id: i64, created_at: DateTime<Utc>) -> Prediction {
        Prediction {
            id,
            image_name: self.image_name,
            image_url: self.image_url,
            predicted_class: self.predicted_class,
            confidence: self.confidence,
            probability_bleached: self.probability_bleached,
            probability_healthy: self.probability_healthy,
            created_at,
        }
    }
}

/// A persisted prediction row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Store-assigned identifier, stable once assigned
    pub id: i64,
    pub image_name: String,
    /// Relative path (`/coral-images/...`) or external URL
    pub image_url: Option<String>,
    pub predicted_class: PredictedClass,
    /// Top-class probability, percentage
    pub confidence: f64,
    pub probability_bleached: f64,
    pub probability_healthy: f64,
    /// Insert time; sort key for every listing
    pub created_at: DateTime<Utc>,
}

impl Prediction {
    /// The draft this row was created from
    pub fn draft(&self) -> PredictionDraft {
        PredictionDraft {
            image_name: self.image_name.clone(),
            image_url: self.image_url.clone(),
            predicted_class: self.predicted_class,
            confidence: self.confidence,
            probability_bleached: self.probability_bleached,
            probability_healthy: self.probability_healthy,
        }
    }
}

/// Aggregate counts served by the statistics endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionStats {
    pub total: usize,
    pub healthy: usize,
    pub bleached: usize,
}

impl PredictionStats {
    /// Rows that are neither healthy nor bleached
    pub fn pending(&self) -> usize {
        self.total.saturating_sub(self.healthy + self.bleached)
    }
}

impl std::fmt::Display for PredictionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Prediction Statistics:")?;
        writeln!(f, "  Total: {}", self.total)?;
        writeln!(f, "  Healthy: {}", self.healthy)?;
        writeln!(f, "  Bleached: {}", self.bleached)?;
        writeln!(f, "  Pending: {}", self.pending())
    }
}
