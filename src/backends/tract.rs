//! Tract backend implementation for segmentation models
//!
//! Tract is a pure Rust ONNX runtime: no native libraries, no FFI. The
//! model's input is pinned to `[1, 3, S, S]` so that the graph can be fully
//! optimized ahead of the first inference.

use crate::error::{CutoutError, Result};
use crate::inference::InferenceBackend;
use ndarray::Array4;
use std::path::{Path, PathBuf};
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Tract backend for running segmentation models using pure Rust inference
#[derive(Debug)]
pub struct TractBackend {
    model_path: PathBuf,
    input_size: usize,
    model: Option<TractModel>,
}

impl TractBackend {
    /// Create an uninitialized backend for the ONNX file at `model_path`
    #[must_use]
    pub fn new<P: Into<PathBuf>>(model_path: P, input_size: u32) -> Self {
        Self {
            model_path: model_path.into(),
            input_size: input_size as usize,
            model: None,
        }
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Load and initialize the model using Tract
    fn load_model(&mut self) -> Result<Duration> {
        let model_load_start = Instant::now();

        let model_data = std::fs::read(&self.model_path).map_err(|e| {
            CutoutError::model_load(format!(
                "Failed to read model file '{}': {e}",
                self.model_path.display()
            ))
        })?;

        // Model size in MB (precision loss acceptable for display)
        let size_mb = model_data.len() as f64 / (1024.0 * 1024.0);
        log::info!(
            "Initializing Tract backend: {} ({size_mb:.2} MB, input {}x{})",
            self.model_path.display(),
            self.input_size,
            self.input_size
        );

        let size = self.input_size;
        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| CutoutError::model_load(format!("Failed to parse ONNX model: {e}")))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1usize, 3, size, size)),
            )
            .map_err(|e| CutoutError::model_load(format!("Failed to set model input shape: {e}")))?
            .into_optimized()
            .map_err(|e| CutoutError::model_load(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                CutoutError::model_load(format!("Failed to create runnable model: {e}"))
            })?;

        self.model = Some(model);

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self) -> Result<Option<Duration>> {
        if self.model.is_some() {
            return Ok(None);
        }

        let model_load_time = self.load_model()?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| CutoutError::segmentation("Tract model not initialized"))?;

        log::debug!("Running Tract inference on {:?}", input.shape());
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| CutoutError::segmentation(format!("Tract inference failed: {e}")))?;

        // Salient-object models emit several side outputs; the first is the fused mask
        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| CutoutError::segmentation("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.to_array_view::<f32>().map_err(|e| {
            CutoutError::segmentation(format!("Failed to convert output tensor: {e}"))
        })?;

        let output_array = output_data
            .to_owned()
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|e| {
                CutoutError::segmentation(format!(
                    "Expected 4D output tensor, got {:?}: {e}",
                    output_tensor.shape()
                ))
            })?;

        log::debug!(
            "Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output_array.shape()
        );

        Ok(output_array)
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    fn name(&self) -> &'static str {
        "tract"
    }
}
