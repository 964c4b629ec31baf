//! Inference backend abstraction

use crate::error::Result;
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends running a segmentation model
///
/// Input is an NCHW `[1, 3, S, S]` tensor, output the model's first output
/// tensor `[1, C, S, S]` with the mask in channel 0.
pub trait InferenceBackend {
    /// Load the model; returns the load time, or `None` if already loaded
    ///
    /// # Errors
    /// - `CutoutError::ModelLoad` when the model cannot be read or compiled
    fn initialize(&mut self) -> Result<Option<Duration>>;

    /// Run inference on the input tensor
    ///
    /// # Errors
    /// - `CutoutError::Segmentation` if the backend is not initialized or inference fails
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
