//! Error types for background removal operations

use crate::types::PostProcessStage;
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, CutoutError>;

/// Error kinds surfaced by the cutout pipeline
///
/// `Decode`, `Segmentation`, `Stage` and `Encode` map onto the four phases of
/// a request. The remaining variants belong to model management and
/// configuration.
#[derive(Error, Debug)]
pub enum CutoutError {
    /// Input bytes are not a decodable image
    #[error("Decode error: {0}")]
    Decode(String),

    /// The segmentation provider failed (after the matting fallback, if any)
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// The segmentation model could not be loaded
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// A post-processing stage failed
    #[error("Post-processing stage '{stage}' failed: {message}")]
    Stage {
        stage: PostProcessStage,
        message: String,
    },

    /// PNG serialization failed
    #[error("Encode error: {0}")]
    Encode(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Model download failures
    #[error("Network error: {0}")]
    Network(String),

    /// A worker task panicked or was cancelled
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CutoutError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new segmentation error
    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    /// Create a new model loading error
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new post-processing stage error
    pub fn stage<S: Into<String>>(stage: PostProcessStage, msg: S) -> Self {
        Self::Stage {
            stage,
            message: msg.into(),
        }
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a network error with the failing operation as context
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {error}", context.into()))
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {rec}"),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range}).{recommendation}"
        ))
    }

    /// Whether the error was caused by the request input rather than by the service
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::InvalidConfig(_))
    }
}
