//! ONNX model runner backed by tract

use std::path::{Path, PathBuf};

use tract_onnx::prelude::*;

use super::{ImageTensor, InferenceError, ModelRunner, INPUT_SIZE};

/// A loaded, optimized classifier graph taking `[1, 224, 224, 3]` f32 input
pub struct OnnxModel {
    plan: TypedRunnableModel<TypedModel>,
    path: PathBuf,
}

impl OnnxModel {
    /// Parse and optimize the model at `path`
    pub fn load(path: &Path) -> std::result::Result<Self, InferenceError> {
        let side = INPUT_SIZE as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| {
                model.with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(1, side, side, 3)))
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| InferenceError::ModelUnavailable(format!("failed to load {}: {}", path.display(), e)))?;

        tracing::info!("Model loaded successfully from {}", path.display());
        Ok(Self {
            plan,
            path: path.to_path_buf(),
        })
    }
}

impl ModelRunner for OnnxModel {
    fn run(&self, input: &ImageTensor) -> std::result::Result<Vec<f32>, InferenceError> {
        let tensor: Tensor = tract_ndarray::Array4::from_shape_vec(input.shape(), input.data.clone())
            .map_err(|e| InferenceError::Runtime(format!("failed to shape input tensor: {}", e)))?
            .into();

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::Runtime(format!("{}: {}", self.path.display(), e)))?;
        let first = outputs
            .first()
            .ok_or_else(|| InferenceError::Output("model produced no outputs".to_string()))?;
        let view = first
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::Output(format!("output is not f32: {}", e)))?;

        Ok(view.iter().copied().collect())
    }
}
