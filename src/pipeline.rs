//! Background removal pipeline
//!
//! Decode, segment (with a matting fallback), optionally refine edges and
//! sharpen, then encode as PNG. The pipeline holds no per-request state and
//! can be cloned freely; clones share the segmentation provider.

use crate::{
    config::PipelineConfig,
    error::{CutoutError, Result},
    postprocess,
    segmentation::SegmentationProvider,
    services::ImageIOService,
    tracing_config::{events, spans},
    types::{PostProcessStage, ProcessedImage, ProcessingMetadata},
};
use image::RgbaImage;
use instant::Instant;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Background removal pipeline over a segmentation provider
#[derive(Clone)]
pub struct Pipeline {
    provider: Arc<dyn SegmentationProvider>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl Pipeline {
    pub fn new<P: SegmentationProvider + 'static>(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    /// Build a pipeline over an already shared provider
    #[must_use]
    pub fn from_shared(provider: Arc<dyn SegmentationProvider>) -> Self {
        Self { provider }
    }

    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Encoded image in, PNG cut-out out
    ///
    /// # Errors
    /// - `CutoutError::Decode` if the bytes are not a supported image; the
    ///   provider is not invoked
    /// - `CutoutError::Segmentation` if the provider fails without matting
    /// - `CutoutError::Stage` if a post-processing stage fails
    /// - `CutoutError::Encode` if PNG serialization fails
    pub fn process(&self, image_bytes: &[u8], config: &PipelineConfig) -> Result<Vec<u8>> {
        let mut result = self.process_bytes(image_bytes, config)?;
        result.to_png_bytes(config.compression)
    }

    /// Like [`Pipeline::process`] but returns the image and metadata unencoded
    ///
    /// # Errors
    /// Same as [`Pipeline::process`], without `Encode`
    pub fn process_bytes(&self, image_bytes: &[u8], config: &PipelineConfig) -> Result<ProcessedImage> {
        let decode_start = Instant::now();
        let image = ImageIOService::decode(image_bytes)?;
        let decode_ms = decode_start.elapsed().as_millis() as u64;

        let mut result = self.process_image(&image, config)?;
        result.metadata.timings.decode_ms = decode_ms;
        result.metadata.timings.total_ms += decode_ms;
        Ok(result)
    }

    /// Run segmentation and post-processing on decoded pixels
    ///
    /// Settings of disabled stages are not checked. Invalid matting
    /// parameters take the same fallback as a failed matting call.
    ///
    /// # Errors
    /// - `CutoutError::Segmentation` if the provider fails without matting or
    ///   returns an image of the wrong size
    /// - `CutoutError::Stage` if a post-processing stage fails
    #[instrument(
        skip(self, image, config),
        fields(
            provider = %self.provider.name(),
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_image(&self, image: &RgbaImage, config: &PipelineConfig) -> Result<ProcessedImage> {
        let total_start = Instant::now();
        let (width, height) = image.dimensions();
        let mut metadata = ProcessingMetadata::new(width, height, self.provider.name());
        metadata.matting_requested = config.matting_options().is_some();

        let segmentation_start = Instant::now();
        let (mut output, fell_back) = self.segment_with_fallback(image, config)?;
        metadata.matting_fallback = fell_back;
        metadata.timings.segmentation_ms = segmentation_start.elapsed().as_millis() as u64;

        if output.dimensions() != (width, height) {
            return Err(CutoutError::segmentation(format!(
                "Provider '{}' returned {}x{} for a {width}x{height} image",
                self.provider.name(),
                output.width(),
                output.height()
            )));
        }

        if config.should_refine_edges() {
            let stage_start = Instant::now();
            output = {
                let _span = spans::postprocess_stage(PostProcessStage::EdgeRefinement).entered();
                postprocess::refine_edges(&output)?
            };
            metadata.timings.edge_refinement_ms = stage_start.elapsed().as_millis() as u64;
            metadata.stages_applied.push(PostProcessStage::EdgeRefinement);
        }

        if config.should_sharpen() {
            let stage_start = Instant::now();
            output = {
                let _span = spans::postprocess_stage(PostProcessStage::Sharpening).entered();
                postprocess::sharpen(&output, config.sharpen_factor)?
            };
            metadata.timings.sharpening_ms = stage_start.elapsed().as_millis() as u64;
            metadata.stages_applied.push(PostProcessStage::Sharpening);
        }

        metadata.timings.total_ms = total_start.elapsed().as_millis() as u64;
        events::performance_metric("process_image", metadata.timings.total_ms);
        debug!(
            segmentation_ms = metadata.timings.segmentation_ms,
            postprocessing_ms = metadata.timings.postprocessing_ms(),
            stages = ?metadata.stages_applied,
            "Image processed"
        );

        Ok(ProcessedImage::new(output, metadata))
    }

    /// Call the provider, retrying once without matting if the matting call fails
    ///
    /// Returns the cut-out and whether the fallback was taken.
    fn segment_with_fallback(&self, image: &RgbaImage, config: &PipelineConfig) -> Result<(RgbaImage, bool)> {
        let matting = config.matting_options();
        let _span = spans::segmentation(self.provider.name(), image.dimensions(), matting.is_some()).entered();

        if let Some(options) = matting {
            match options
                .validate()
                .and_then(|()| self.provider.segment(image, Some(options)))
            {
                Ok(output) => return Ok((output, false)),
                Err(e) => {
                    warn!(
                        provider = %self.provider.name(),
                        error = %e,
                        "Alpha matting failed, retrying without it"
                    );
                },
            }
            return self
                .provider
                .segment(image, None)
                .map(|output| (output, true))
                .map_err(into_segmentation_error);
        }

        self.provider
            .segment(image, None)
            .map(|output| (output, false))
            .map_err(into_segmentation_error)
    }

    /// Process a file, writing `<stem>_nobg.png` next to it unless `output` is given
    ///
    /// Returns the output path and the result metadata.
    ///
    /// # Errors
    /// - `CutoutError::Io` if the input cannot be read or the output written
    /// - Any pipeline error from [`Pipeline::process`]
    pub fn process_file(
        &self,
        input: &Path,
        output: Option<&Path>,
        config: &PipelineConfig,
    ) -> Result<(PathBuf, ProcessingMetadata)> {
        let _span = spans::file_processing(input).entered();

        let bytes = std::fs::read(input).map_err(|e| CutoutError::file_io_error("read input image", input, &e))?;
        let mut result = self.process_bytes(&bytes, config).map_err(|e| match e {
            CutoutError::Decode(message) => {
                CutoutError::decode(format!("{}: {message}", input.display()))
            },
            other => other,
        })?;

        let output_path = output.map_or_else(|| ImageIOService::default_output_path(input), Path::to_path_buf);
        let png = result.to_png_bytes(config.compression)?;
        ImageIOService::write_bytes(&output_path, &png)?;

        info!(
            input = %input.display(),
            output = %output_path.display(),
            total_ms = result.metadata.timings.total_ms,
            "Background removed"
        );
        Ok((output_path, result.metadata))
    }

    /// Read an encoded image from an async stream and process it off the runtime
    ///
    /// # Errors
    /// - `CutoutError::Io` if the stream cannot be read
    /// - `CutoutError::Internal` if the worker task panics
    /// - Any pipeline error from [`Pipeline::process`]
    pub async fn process_reader<R: tokio::io::AsyncRead + Unpin>(
        &self,
        mut reader: R,
        config: &PipelineConfig,
    ) -> Result<Vec<u8>> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;

        let pipeline = self.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || pipeline.process(&buffer, &config))
            .await
            .map_err(|e| CutoutError::internal(format!("Processing task failed: {e}")))?
    }
}

fn into_segmentation_error(error: CutoutError) -> CutoutError {
    match error {
        CutoutError::Segmentation(_) => error,
        other => CutoutError::segmentation(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MattingOptions;
    use image::Rgba;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the image with alpha cleared outside the left half
    struct HalfProvider {
        calls: AtomicUsize,
        fail_matting: bool,
        fail_always: bool,
    }

    impl HalfProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_matting: false,
                fail_always: false,
            }
        }
    }

    impl SegmentationProvider for HalfProvider {
        fn segment(&self, image: &RgbaImage, matting: Option<&MattingOptions>) -> Result<RgbaImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_always || (self.fail_matting && matting.is_some()) {
                return Err(CutoutError::segmentation("provider failure"));
            }
            let half = image.width() / 2;
            let mut out = image.clone();
            for (x, _, pixel) in out.enumerate_pixels_mut() {
                if x >= half {
                    *pixel = Rgba([0, 0, 0, 0]);
                }
            }
            Ok(out)
        }

        fn name(&self) -> &str {
            "half"
        }
    }

    struct WrongSizeProvider;

    impl SegmentationProvider for WrongSizeProvider {
        fn segment(&self, _image: &RgbaImage, _matting: Option<&MattingOptions>) -> Result<RgbaImage> {
            Ok(RgbaImage::new(3, 3))
        }
    }

    fn test_image() -> RgbaImage {
        RgbaImage::from_pixel(20, 20, Rgba([90, 120, 150, 255]))
    }

    #[test]
    fn test_stages_recorded() -> Result<()> {
        let pipeline = Pipeline::new(HalfProvider::new());
        let result = pipeline.process_image(&test_image(), &PipelineConfig::default())?;

        assert_eq!(result.metadata.provider, "half");
        assert_eq!(
            result.metadata.stages_applied,
            vec![PostProcessStage::EdgeRefinement, PostProcessStage::Sharpening]
        );
        assert!(result.metadata.matting_requested);
        assert!(!result.metadata.matting_fallback);
        Ok(())
    }

    #[test]
    fn test_post_process_disabled_returns_provider_output() -> Result<()> {
        let provider = HalfProvider::new();
        let expected = provider.segment(&test_image(), None)?;

        let pipeline = Pipeline::new(provider);
        let config = PipelineConfig::builder().post_process(false).build()?;
        let result = pipeline.process_image(&test_image(), &config)?;

        assert!(result.metadata.stages_applied.is_empty());
        assert_eq!(result.image, expected);
        Ok(())
    }

    #[test]
    fn test_matting_fallback() -> Result<()> {
        let provider = Arc::new(HalfProvider {
            fail_matting: true,
            ..HalfProvider::new()
        });
        let pipeline = Pipeline::from_shared(provider.clone());

        let result = pipeline.process_image(&test_image(), &PipelineConfig::default())?;
        assert!(result.metadata.matting_fallback);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn test_no_matting_failure_propagates() {
        let provider = Arc::new(HalfProvider {
            fail_always: true,
            ..HalfProvider::new()
        });
        let pipeline = Pipeline::from_shared(provider.clone());
        let config = PipelineConfig::builder().alpha_matting(false).build().unwrap();

        let result = pipeline.process_image(&test_image(), &config);
        assert!(matches!(result, Err(CutoutError::Segmentation(_))));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wrong_output_size_rejected() {
        let pipeline = Pipeline::new(WrongSizeProvider);
        let result = pipeline.process_image(&test_image(), &PipelineConfig::default());
        assert!(matches!(result, Err(CutoutError::Segmentation(_))));
    }

    #[test]
    fn test_decode_error_skips_provider() {
        let provider = Arc::new(HalfProvider::new());
        let pipeline = Pipeline::from_shared(provider.clone());

        let result = pipeline.process(b"definitely not an image", &PipelineConfig::default());
        assert!(matches!(result, Err(CutoutError::Decode(_))));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
