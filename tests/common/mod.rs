//! Shared fakes and image builders for integration tests

#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use imgly_cutout::{CutoutError, ImageIOService, MattingOptions, PngCompression, Result, SegmentationProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// How the fake decides what is foreground
#[derive(Debug, Clone, Copy)]
pub enum FakeMask {
    /// Keep every pixel's alpha
    Passthrough,
    /// Opaque square `[start, start + size)` on both axes, transparent elsewhere
    Square { start: u32, size: u32 },
}

/// Segmentation provider with a scripted mask and call accounting
#[derive(Debug)]
pub struct FakeProvider {
    mask: FakeMask,
    fail_with_matting: bool,
    fail_always: bool,
    calls: AtomicUsize,
    matting_seen: Mutex<Vec<bool>>,
}

impl FakeProvider {
    pub fn new(mask: FakeMask) -> Self {
        Self {
            mask,
            fail_with_matting: false,
            fail_always: false,
            calls: AtomicUsize::new(0),
            matting_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn passthrough() -> Self {
        Self::new(FakeMask::Passthrough)
    }

    pub fn failing_with_matting(mut self) -> Self {
        self.fail_with_matting = true;
        self
    }

    pub fn failing_always(mut self) -> Self {
        self.fail_always = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether each call carried matting options, in call order
    pub fn matting_seen(&self) -> Vec<bool> {
        self.matting_seen.lock().unwrap().clone()
    }
}

impl SegmentationProvider for FakeProvider {
    fn segment(&self, image: &RgbaImage, matting: Option<&MattingOptions>) -> Result<RgbaImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.matting_seen.lock().unwrap().push(matting.is_some());

        if self.fail_always || (self.fail_with_matting && matting.is_some()) {
            return Err(CutoutError::segmentation("scripted provider failure"));
        }

        let mut output = image.clone();
        if let FakeMask::Square { start, size } = self.mask {
            let inside = |v: u32| (start..start + size).contains(&v);
            for (x, y, pixel) in output.enumerate_pixels_mut() {
                if !(inside(x) && inside(y)) {
                    *pixel = Rgba([0, 0, 0, 0]);
                }
            }
        }
        Ok(output)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Opaque image with a horizontal/vertical color gradient
pub fn gradient_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
            255,
        ])
    })
}

pub fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    ImageIOService::encode_png(image, PngCompression::Fast).unwrap()
}

pub fn decode_png(bytes: &[u8]) -> RgbaImage {
    assert_eq!(
        image::guess_format(bytes).unwrap(),
        image::ImageFormat::Png,
        "output must be PNG"
    );
    image::load_from_memory(bytes).unwrap().to_rgba8()
}
