//! Segmentation providers
//!
//! A provider turns a decoded RGBA image into a cut-out of the same size:
//! RGBA where alpha marks the foreground. The pipeline only depends on the
//! [`SegmentationProvider`] trait; [`ModelSession`] is the model-backed
//! implementation.

pub mod matting;
pub mod preprocessing;
pub mod session;

pub use session::ModelSession;

use crate::{config::MattingOptions, error::Result};
use image::RgbaImage;

/// Produces a cut-out from an image
///
/// Implementations must be shareable between threads; one provider serves
/// concurrent pipeline calls.
pub trait SegmentationProvider: Send + Sync {
    /// Segment `image`, returning an RGBA image of identical dimensions
    ///
    /// With `matting` set the provider should refine the boundary with
    /// alpha matting and may fail if it cannot; the pipeline then retries
    /// with `None`.
    ///
    /// # Errors
    /// - Any provider failure, surfaced as `CutoutError::Segmentation`
    fn segment(&self, image: &RgbaImage, matting: Option<&MattingOptions>) -> Result<RgbaImage>;

    /// Name used in logs and processing metadata
    fn name(&self) -> &str {
        "custom"
    }
}

impl<P: SegmentationProvider + ?Sized> SegmentationProvider for std::sync::Arc<P> {
    fn segment(&self, image: &RgbaImage, matting: Option<&MattingOptions>) -> Result<RgbaImage> {
        (**self).segment(image, matting)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
