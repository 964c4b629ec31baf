#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # imgly-cutout
//!
//! Background removal for still images: a salient-object segmentation model
//! produces the cut-out, then optional post-processing cleans up its edges
//! and sharpens the result. Output is always an RGBA PNG.
//!
//! ## Features
//!
//! - **Pluggable segmentation**: anything implementing [`SegmentationProvider`];
//!   [`ModelSession`] runs u2net-family ONNX models through Tract (pure Rust)
//! - **Alpha matting**: trimap plus Blur-Fusion foreground estimation, with an
//!   automatic fallback to plain segmentation when matting fails
//! - **Edge refinement**: morphological cleanup, largest-component selection
//!   and a light blur of the alpha mask
//! - **Sharpening**: unsharp-mask style enhancement of color channels
//! - **Model management**: download and cache models under `~/.u2net`
//! - **CLI**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgly_cutout::{ModelSession, Pipeline, PipelineConfig};
//!
//! # fn example(upload: Vec<u8>) -> anyhow::Result<()> {
//! let session = ModelSession::initialize("u2net")?;
//! let pipeline = Pipeline::new(session);
//!
//! let config = PipelineConfig::builder()
//!     .sharpen_factor(1.3)
//!     .build()?;
//! let png = pipeline.process(&upload, &config)?;
//! std::fs::write("cutout.png", png)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): Tract ONNX backend for [`ModelSession`]
//! - `cli` (default): command-line interface and download progress bars
//! - `webp-support` (default): WebP input decoding
//! - `tracing-json`, `tracing-files`: extra log outputs for the CLI

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod postprocess;
pub mod segmentation;
pub mod services;
pub mod tracing_config;
pub mod types;

use std::sync::Arc;
use tokio::io::AsyncRead;

// Public API exports
#[cfg(feature = "tract")]
pub use backends::TractBackend;
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use config::{MattingOptions, PipelineConfig, PipelineConfigBuilder, PngCompression};
pub use download::ModelDownloader;
pub use error::{CutoutError, Result};
pub use inference::InferenceBackend;
pub use models::{ModelKind, ModelSource, ModelSpec, PreprocessingConfig};
pub use pipeline::Pipeline;
pub use postprocess::{refine_edges, sharpen};
pub use segmentation::{ModelSession, SegmentationProvider};
pub use services::ImageIOService;
pub use tracing_config::{events, spans, TracingConfig, TracingFormat, TracingOutput};
pub use types::{PostProcessStage, ProcessedImage, ProcessingMetadata, ProcessingTimings};

/// Remove the background from an encoded image, returning PNG bytes
///
/// One-shot form of [`Pipeline::process`].
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use imgly_cutout::{process, ModelSession, PipelineConfig};
///
/// # fn example(bytes: &[u8]) -> anyhow::Result<()> {
/// let session = Arc::new(ModelSession::initialize("u2netp")?);
/// let png = process(bytes, session, &PipelineConfig::default())?;
/// # Ok(())
/// # }
/// ```
pub fn process(
    image_bytes: &[u8],
    provider: Arc<dyn SegmentationProvider>,
    config: &PipelineConfig,
) -> Result<Vec<u8>> {
    Pipeline::from_shared(provider).process(image_bytes, config)
}

/// Remove the background from an image read from an async stream
///
/// The stream is read to the end, then decoding and processing run on the
/// blocking thread pool.
pub async fn process_reader<R: AsyncRead + Unpin>(
    reader: R,
    provider: Arc<dyn SegmentationProvider>,
    config: &PipelineConfig,
) -> Result<Vec<u8>> {
    Pipeline::from_shared(provider)
        .process_reader(reader, config)
        .await
}
