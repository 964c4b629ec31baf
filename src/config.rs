//! Configuration types for background removal operations

use crate::error::{CutoutError, Result};
use image::codecs::png::CompressionType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters for matting-aware segmentation
///
/// Pixels whose predicted mask value is above `foreground_threshold` are
/// definite foreground, pixels below `background_threshold` definite
/// background. Both regions are eroded by an `erode_size` square before the
/// unknown band between them is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MattingOptions {
    pub foreground_threshold: u8,
    pub background_threshold: u8,
    pub erode_size: u32,
    /// Offset applied to the soft mask inside the unknown band, in [-1, 1]
    pub shift: f32,
}

impl Default for MattingOptions {
    fn default() -> Self {
        Self {
            foreground_threshold: 240,
            background_threshold: 10,
            erode_size: 10,
            shift: 0.0,
        }
    }
}

impl MattingOptions {
    /// Validate the matting parameters
    ///
    /// The `shift` range is not checked here; the provider rejects it at
    /// segmentation time so that the pipeline can fall back.
    ///
    /// # Errors
    /// - Background threshold not below foreground threshold
    /// - Erode size larger than 255
    /// - Non-finite shift
    pub fn validate(&self) -> Result<()> {
        if self.background_threshold >= self.foreground_threshold {
            return Err(CutoutError::invalid_config(format!(
                "Background threshold ({}) must be below foreground threshold ({})",
                self.background_threshold, self.foreground_threshold
            )));
        }

        if self.erode_size > 255 {
            return Err(CutoutError::config_value_error(
                "erode size",
                self.erode_size,
                "0-255",
                Some(10),
            ));
        }

        if !self.shift.is_finite() {
            return Err(CutoutError::invalid_config("Matting shift must be finite"));
        }

        Ok(())
    }
}

/// PNG compression effort for the encoded output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    /// Lowest effort, largest files
    #[default]
    Fast,
    Default,
    /// Highest effort, smallest files
    Best,
}

impl PngCompression {
    /// Map a zlib-style level (0-9) onto a compression preset
    ///
    /// # Errors
    /// - Level above 9
    pub fn from_level(level: u8) -> Result<Self> {
        match level {
            0..=3 => Ok(Self::Fast),
            4..=6 => Ok(Self::Default),
            7..=9 => Ok(Self::Best),
            _ => Err(CutoutError::config_value_error(
                "PNG compression level",
                level,
                "0-9",
                Some(1),
            )),
        }
    }

    #[must_use]
    pub fn compression_type(self) -> CompressionType {
        match self {
            Self::Fast => CompressionType::Fast,
            Self::Default => CompressionType::Default,
            Self::Best => CompressionType::Best,
        }
    }
}

impl std::fmt::Display for PngCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Default => write!(f, "default"),
            Self::Best => write!(f, "best"),
        }
    }
}

/// Per-request pipeline configuration
///
/// Immutable for the duration of a request. `post_process = false` disables
/// edge refinement and sharpening regardless of their own toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct PipelineConfig {
    /// Request matting-aware segmentation, falling back to plain segmentation on failure
    pub alpha_matting: bool,
    /// Parameters used when `alpha_matting` is on
    pub matting: MattingOptions,
    /// Run the edge refiner after segmentation
    pub refine_edges: bool,
    /// Run the sharpener (only when `sharpen_factor > 1.0`)
    pub sharpen: bool,
    pub sharpen_factor: f32,
    /// Master switch for all post-processing stages
    pub post_process: bool,
    /// Output PNG compression
    pub compression: PngCompression,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            alpha_matting: true,
            matting: MattingOptions::default(),
            refine_edges: true,
            sharpen: true,
            sharpen_factor: 1.5,
            post_process: true,
            compression: PngCompression::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Invalid matting parameters
    /// - Non-finite or non-positive sharpen factor
    pub fn validate(&self) -> Result<()> {
        self.matting.validate()?;

        if !self.sharpen_factor.is_finite() || self.sharpen_factor <= 0.0 {
            return Err(CutoutError::config_value_error(
                "sharpen factor",
                self.sharpen_factor,
                "> 0.0",
                Some(1.5),
            ));
        }

        Ok(())
    }

    /// Matting parameters to hand to the provider, `None` when matting is off
    #[must_use]
    pub fn matting_options(&self) -> Option<&MattingOptions> {
        self.alpha_matting.then_some(&self.matting)
    }

    #[must_use]
    pub fn should_refine_edges(&self) -> bool {
        self.post_process && self.refine_edges
    }

    #[must_use]
    pub fn should_sharpen(&self) -> bool {
        self.post_process && self.sharpen && self.sharpen_factor > 1.0
    }

    /// Parse a JSON configuration; missing fields take their defaults
    ///
    /// # Errors
    /// - Malformed JSON
    /// - Values failing validation
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CutoutError::invalid_config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    ///
    /// # Errors
    /// - File cannot be read
    /// - Malformed JSON or invalid values
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| CutoutError::file_io_error("read config file", path, &e))?;
        Self::from_json_str(&json)
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, e.g. one loaded from a file
    #[must_use]
    pub fn from_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Enable or disable alpha matting
    #[must_use]
    pub fn alpha_matting(mut self, enabled: bool) -> Self {
        self.config.alpha_matting = enabled;
        self
    }

    /// Replace all matting parameters
    #[must_use]
    pub fn matting(mut self, options: MattingOptions) -> Self {
        self.config.matting = options;
        self
    }

    #[must_use]
    pub fn foreground_threshold(mut self, threshold: u8) -> Self {
        self.config.matting.foreground_threshold = threshold;
        self
    }

    #[must_use]
    pub fn background_threshold(mut self, threshold: u8) -> Self {
        self.config.matting.background_threshold = threshold;
        self
    }

    #[must_use]
    pub fn erode_size(mut self, size: u32) -> Self {
        self.config.matting.erode_size = size;
        self
    }

    #[must_use]
    pub fn matting_shift(mut self, shift: f32) -> Self {
        self.config.matting.shift = shift;
        self
    }

    /// Enable or disable edge refinement
    #[must_use]
    pub fn refine_edges(mut self, enabled: bool) -> Self {
        self.config.refine_edges = enabled;
        self
    }

    /// Enable or disable sharpening
    #[must_use]
    pub fn sharpen(mut self, enabled: bool) -> Self {
        self.config.sharpen = enabled;
        self
    }

    #[must_use]
    pub fn sharpen_factor(mut self, factor: f32) -> Self {
        self.config.sharpen_factor = factor;
        self
    }

    /// Master switch for post-processing
    #[must_use]
    pub fn post_process(mut self, enabled: bool) -> Self {
        self.config.post_process = enabled;
        self
    }

    #[must_use]
    pub fn compression(mut self, compression: PngCompression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Configuration fails validation
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
