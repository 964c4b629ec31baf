//! Test utilities and mock backends for testing inference functionality
//!
//! `MockBackend` implements `InferenceBackend` without a model file: it
//! returns a centered square mask at the configured resolution.

use crate::{
    error::{CutoutError, Result},
    inference::InferenceBackend,
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// What the mock returns from `infer`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockOutput {
    /// 1.0 inside the central half of the frame, 0.0 elsewhere
    CenteredSquare,
    /// The same value everywhere
    Constant(f32),
}

/// Mock inference backend for testing
#[derive(Debug, Clone)]
pub struct MockBackend {
    size: usize,
    initialized: bool,
    output: MockOutput,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
}

impl MockBackend {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            initialized: false,
            output: MockOutput::CenteredSquare,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
        }
    }

    /// Create a mock backend that will fail during initialization
    #[must_use]
    pub fn new_failing_init(size: usize) -> Self {
        let mut backend = Self::new(size);
        backend.should_fail_init = true;
        backend
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference(size: usize) -> Self {
        let mut backend = Self::new(size);
        backend.should_fail_inference = true;
        backend
    }

    #[must_use]
    pub fn with_output(mut self, output: MockOutput) -> Self {
        self.output = output;
        self
    }

    /// Get the call history for verification in tests
    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    /// Shared handle to the history, usable after the backend is boxed
    pub fn history_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_history)
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn generate_output(&self) -> Array4<f32> {
        let size = self.size;
        match self.output {
            MockOutput::Constant(value) => Array4::from_elem((1, 1, size, size), value),
            MockOutput::CenteredSquare => {
                let (start, end) = (size / 4, size - size / 4);
                Array4::from_shape_fn((1, 1, size, size), |(_, _, y, x)| {
                    if (start..end).contains(&x) && (start..end).contains(&y) {
                        1.0
                    } else {
                        0.0
                    }
                })
            },
        }
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self) -> Result<Option<Duration>> {
        if self.should_fail_init {
            return Err(CutoutError::model_load("Mock initialization failure"));
        }
        if self.initialized {
            return Ok(None);
        }
        self.record_call("initialize");
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(CutoutError::segmentation("Mock backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(CutoutError::segmentation("Mock inference failure"));
        }
        if input.shape() != [1, 3, self.size, self.size] {
            return Err(CutoutError::segmentation(format!(
                "Mock backend expected [1, 3, {0}, {0}], got {1:?}",
                self.size,
                input.shape()
            )));
        }
        self.record_call("infer");
        Ok(self.generate_output())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
