//! Result and metadata types produced by the pipeline

use crate::{config::PngCompression, error::Result, services::ImageIOService};
use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Post-processing stages, in the order the pipeline applies them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcessStage {
    EdgeRefinement,
    Sharpening,
}

impl std::fmt::Display for PostProcessStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EdgeRefinement => write!(f, "edge_refinement"),
            Self::Sharpening => write!(f, "sharpening"),
        }
    }
}

/// Detailed timing breakdown for one request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Image decoding (zero when the caller supplied pixels)
    pub decode_ms: u64,

    /// Segmentation, including a matting fallback retry
    pub segmentation_ms: u64,

    /// Edge refinement
    pub edge_refinement_ms: u64,

    /// Sharpening
    pub sharpening_ms: u64,

    /// PNG encoding (if the result was serialized)
    pub encode_ms: Option<u64>,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Combined time spent in post-processing stages
    #[must_use]
    pub fn postprocessing_ms(&self) -> u64 {
        self.edge_refinement_ms + self.sharpening_ms
    }

    /// Fraction of the total spent in segmentation
    #[must_use]
    pub fn segmentation_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.segmentation_ms as f64 / self.total_ms as f64
        }
    }
}

/// What happened while processing one image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Provider that produced the mask
    pub provider: String,
    /// Alpha matting was requested by the configuration
    pub matting_requested: bool,
    /// The matting call failed and segmentation was retried without it
    pub matting_fallback: bool,
    /// Post-processing stages that actually ran
    pub stages_applied: Vec<PostProcessStage>,
    /// Timing breakdown
    pub timings: ProcessingTimings,
    /// When processing finished
    pub processed_at: DateTime<Utc>,
}

impl ProcessingMetadata {
    #[must_use]
    pub fn new(width: u32, height: u32, provider: impl Into<String>) -> Self {
        Self {
            width,
            height,
            provider: provider.into(),
            matting_requested: false,
            matting_fallback: false,
            stages_applied: Vec::new(),
            timings: ProcessingTimings::new(),
            processed_at: Utc::now(),
        }
    }
}

/// Cut-out image together with its processing metadata
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub image: RgbaImage,
    pub metadata: ProcessingMetadata,
}

impl ProcessedImage {
    #[must_use]
    pub fn new(image: RgbaImage, metadata: ProcessingMetadata) -> Self {
        Self { image, metadata }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Encode as 8-bit RGBA PNG, recording the encode time
    ///
    /// # Errors
    /// - `CutoutError::Encode` if PNG serialization fails
    pub fn to_png_bytes(&mut self, compression: PngCompression) -> Result<Vec<u8>> {
        let start = instant::Instant::now();
        let bytes = ImageIOService::encode_png(&self.image, compression)?;
        let encode_ms = start.elapsed().as_millis() as u64;
        self.metadata.timings.encode_ms = Some(encode_ms);
        self.metadata.timings.total_ms += encode_ms;
        Ok(bytes)
    }

    /// Write the PNG to disk, creating parent directories as needed
    ///
    /// # Errors
    /// - `CutoutError::Encode` if PNG serialization fails
    /// - `CutoutError::Io` if the file cannot be written
    pub fn save_png<P: AsRef<Path>>(&mut self, path: P, compression: PngCompression) -> Result<()> {
        let bytes = self.to_png_bytes(compression)?;
        ImageIOService::write_bytes(path.as_ref(), &bytes)
    }

    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}
