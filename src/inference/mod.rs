//! Inference boundary
//!
//! The classifier itself is an opaque pre-trained artifact. This module owns
//! what surrounds it: turning an image file into the model's input tensor,
//! and turning the model's two-element output into a
//! [`ClassificationOutcome`]. Running the model is delegated to a
//! [`ModelRunner`].

pub mod onnx;
pub mod preprocess;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::prediction::{ClassificationOutcome, CoralClass};

pub use onnx::OnnxModel;
pub use preprocess::{preprocess, preprocess_image, ImageTensor, INPUT_SIZE};

/// Error types for classification
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Model execution failed: {0}")]
    Runtime(String),

    #[error("Unexpected model output: {0}")]
    Output(String),
}

/// Classifies one image file
pub trait Classifier: Send + Sync {
    fn classify(&self, image_path: &Path) -> Result<ClassificationOutcome, InferenceError>;
}

/// Executes the pre-trained model on a prepared tensor.
///
/// Must return probabilities in [`CoralClass::OUTPUT_ORDER`].
pub trait ModelRunner: Send + Sync {
    fn run(&self, input: &ImageTensor) -> Result<Vec<f32>, InferenceError>;
}

/// Preprocess, run, interpret
pub struct ImageClassifier<R> {
    runner: R,
}

impl<R: ModelRunner> ImageClassifier<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: ModelRunner> Classifier for ImageClassifier<R> {
    fn classify(&self, image_path: &Path) -> Result<ClassificationOutcome, InferenceError> {
        let tensor = preprocess(image_path)?;
        let output = self.runner.run(&tensor)?;
        let outcome = interpret_output(&output)?;
        tracing::info!(
            "Prediction completed for {}: {} ({:.1}%)",
            image_path.display(),
            outcome.predicted_class,
            outcome.confidence
        );
        Ok(outcome)
    }
}

/// Runner used when no model is configured or the configured one failed to
/// load. Every call fails, so callers fall back to their placeholder verdict.
pub struct UnavailableModel {
    model_path: Option<PathBuf>,
}

impl UnavailableModel {
    pub fn new(model_path: Option<PathBuf>) -> Self {
        Self { model_path }
    }
}

impl ModelRunner for UnavailableModel {
    fn run(&self, _input: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
        let detail = match &self.model_path {
            Some(path) => format!("model at {} could not be loaded", path.display()),
            None => "no model configured".to_string(),
        };
        Err(InferenceError::ModelUnavailable(detail))
    }
}

/// Classifier for the configured model path.
///
/// Loads the ONNX model when one is configured; a missing or unreadable model
/// is logged and yields a classifier whose calls fail.
pub fn load_classifier(model_path: Option<PathBuf>) -> Arc<dyn Classifier> {
    if let Some(path) = &model_path {
        match OnnxModel::load(path) {
            Ok(model) => return Arc::new(ImageClassifier::new(model)),
            Err(e) => tracing::warn!("Prediction disabled: {}", e),
        }
    } else {
        tracing::debug!("No model configured, predictions will be stored as Pending");
    }
    Arc::new(ImageClassifier::new(UnavailableModel::new(model_path)))
}

/// Map raw probabilities `[bleached, healthy]` to percentages and a verdict
pub fn interpret_output(probabilities: &[f32]) -> Result<ClassificationOutcome, InferenceError> {
    if probabilities.len() != CoralClass::OUTPUT_ORDER.len() {
        return Err(InferenceError::Output(format!(
            "expected {} probabilities, got {}",
            CoralClass::OUTPUT_ORDER.len(),
            probabilities.len()
        )));
    }
    if probabilities.iter().any(|p| !p.is_finite()) {
        return Err(InferenceError::Output("non-finite probability".to_string()));
    }

    let bleached = f64::from(probabilities[0]) * 100.0;
    let healthy = f64::from(probabilities[1]) * 100.0;
    Ok(ClassificationOutcome::from_percentages(bleached, healthy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::PredictedClass;

    struct FixedOutput(Vec<f32>);

    impl ModelRunner for FixedOutput {
        fn run(&self, input: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
            assert_eq!(input.data.len(), (INPUT_SIZE * INPUT_SIZE * 3) as usize);
            Ok(self.0.clone())
        }
    }

    fn write_png(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("reef.png");
        image::RgbImage::from_pixel(32, 16, image::Rgb([255, 128, 0])).save(&path).unwrap();
        path
    }

    #[test]
    fn test_interpret_output_bleached() {
        let outcome = interpret_output(&[0.75, 0.25]).unwrap();
        assert_eq!(outcome.predicted_class, PredictedClass::Bleached);
        assert_eq!(outcome.confidence, 75.0);
        assert_eq!(outcome.probability_bleached, 75.0);
        assert_eq!(outcome.probability_healthy, 25.0);
    }

    #[test]
    fn test_interpret_output_rejects_wrong_shape() {
        assert!(matches!(interpret_output(&[1.0]), Err(InferenceError::Output(_))));
        assert!(matches!(interpret_output(&[f32::NAN, 0.5]), Err(InferenceError::Output(_))));
    }

    #[test]
    fn test_classifier_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(&dir);

        let classifier = ImageClassifier::new(FixedOutput(vec![0.125, 0.875]));
        let outcome = classifier.classify(&path).unwrap();
        assert_eq!(outcome.predicted_class, PredictedClass::Healthy);
        assert_eq!(outcome.confidence, 87.5);
    }

    #[test]
    fn test_unavailable_model_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(&dir);

        let classifier = ImageClassifier::new(UnavailableModel::new(None));
        assert!(matches!(classifier.classify(&path), Err(InferenceError::ModelUnavailable(_))));
    }

    #[test]
    fn test_load_classifier_falls_back_without_usable_model() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_png(&dir);
        let model = dir.path().join("model.onnx");
        std::fs::write(&model, b"broken").unwrap();

        for configured in [None, Some(model), Some(dir.path().join("absent.onnx"))] {
            let classifier = load_classifier(configured);
            assert!(matches!(classifier.classify(&image), Err(InferenceError::ModelUnavailable(_))));
        }
    }
}
