//! Cutout construction from a predicted mask, with and without alpha matting
//!
//! Alpha matting builds a trimap from the soft mask (definite foreground,
//! definite background, unknown band), resolves alpha in the unknown band
//! and re-estimates the foreground colors there with Blur-Fusion
//! (Germer et al., "Approximate Fast Foreground Colour Estimation", ICIP 2021)
//! so the cut-out does not carry the old background along its edges.

use crate::{
    config::MattingOptions,
    error::{CutoutError, Result},
    postprocess::mask::apply_mask,
};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::{distance_transform::Norm, morphology::erode};

/// Trimap value for definite foreground
pub const TRIMAP_FOREGROUND: u8 = 255;
/// Trimap value for definite background
pub const TRIMAP_BACKGROUND: u8 = 0;
/// Trimap value for the unknown band
pub const TRIMAP_UNKNOWN: u8 = 128;

/// Blur-Fusion x2 box radii (window sizes 91 and 7)
const BLUR_FUSION_RADII: [usize; 2] = [45, 3];

/// Composite the image over transparent black using the mask as coverage
#[must_use]
pub fn naive_cutout(image: &RgbaImage, mask: &GrayImage) -> RgbaImage {
    apply_mask(image, mask)
}

/// Build a trimap from a soft mask
///
/// Both definite regions are eroded by an `erode_size` square. The image
/// border counts as background when eroding the foreground, so a subject
/// touching the frame keeps an unknown band there.
///
/// # Errors
/// - `CutoutError::Segmentation` if no definite foreground or no definite
///   background remains
pub fn build_trimap(mask: &GrayImage, options: &MattingOptions) -> Result<GrayImage> {
    let (width, height) = mask.dimensions();
    let threshold = |predicate: &dyn Fn(u8) -> bool| {
        GrayImage::from_fn(width, height, |x, y| {
            if predicate(mask.get_pixel(x, y)[0]) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    };

    let mut foreground = threshold(&|v| v > options.foreground_threshold);
    let mut background = threshold(&|v| v < options.background_threshold);

    let radius = (options.erode_size / 2).min(u32::from(u8::MAX)) as u8;
    if radius > 0 {
        foreground = erode(&foreground, Norm::LInf, radius);
        clear_border(&mut foreground, u32::from(radius));
        background = erode(&background, Norm::LInf, radius);
    }

    let has_foreground = foreground.pixels().any(|p| p[0] > 0);
    let has_background = background.pixels().any(|p| p[0] > 0);
    if !has_foreground {
        return Err(CutoutError::segmentation(
            "Alpha matting failed: trimap has no definite foreground",
        ));
    }
    if !has_background {
        return Err(CutoutError::segmentation(
            "Alpha matting failed: trimap has no definite background",
        ));
    }

    Ok(GrayImage::from_fn(width, height, |x, y| {
        if foreground.get_pixel(x, y)[0] > 0 {
            Luma([TRIMAP_FOREGROUND])
        } else if background.get_pixel(x, y)[0] > 0 {
            Luma([TRIMAP_BACKGROUND])
        } else {
            Luma([TRIMAP_UNKNOWN])
        }
    }))
}

fn clear_border(mask: &mut GrayImage, radius: u32) {
    let (width, height) = mask.dimensions();
    for (x, y, pixel) in mask.enumerate_pixels_mut() {
        if x < radius || y < radius || x + radius >= width || y + radius >= height {
            *pixel = Luma([0]);
        }
    }
}

/// Resolve alpha from a trimap: 255/0 in the definite regions, the shifted
/// soft mask in the unknown band
#[must_use]
pub fn estimate_alpha(mask: &GrayImage, trimap: &GrayImage, shift: f32) -> GrayImage {
    let offset = shift * 255.0;
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        match trimap.get_pixel(x, y)[0] {
            TRIMAP_FOREGROUND => Luma([255]),
            TRIMAP_BACKGROUND => Luma([0]),
            _ => {
                let value = f32::from(mask.get_pixel(x, y)[0]) + offset;
                Luma([value.round().clamp(0.0, 255.0) as u8])
            },
        }
    })
}

/// Matting-aware cutout
///
/// # Errors
/// - `CutoutError::Segmentation` for a non-finite shift or one outside
///   [-1, 1], or a degenerate trimap
pub fn alpha_matting_cutout(
    image: &RgbaImage,
    mask: &GrayImage,
    options: &MattingOptions,
) -> Result<RgbaImage> {
    if !options.shift.is_finite() || options.shift.abs() > 1.0 {
        return Err(CutoutError::segmentation(format!(
            "Alpha matting failed: shift {} outside [-1, 1]",
            options.shift
        )));
    }
    if image.dimensions() != mask.dimensions() {
        return Err(CutoutError::segmentation(format!(
            "Alpha matting failed: mask is {}x{} but image is {}x{}",
            mask.width(),
            mask.height(),
            image.width(),
            image.height()
        )));
    }

    let trimap = build_trimap(mask, options)?;
    let alpha = estimate_alpha(mask, &trimap, options.shift);
    let foreground = estimate_foreground(image, &alpha);

    let (width, height) = image.dimensions();
    Ok(RgbaImage::from_fn(width, height, |x, y| {
        let a = alpha.get_pixel(x, y)[0];
        if a == 0 {
            return Rgba([0, 0, 0, 0]);
        }
        let index = (y as usize * width as usize + x as usize) * 3;
        let channel = |c: usize| {
            let value = foreground.get(index + c).copied().unwrap_or(0.0);
            (value * 255.0).round().clamp(0.0, 255.0) as u8
        };
        Rgba([channel(0), channel(1), channel(2), a])
    }))
}

/// Blur-Fusion x2 foreground color estimation
///
/// Returns interleaved RGB in [0, 1].
#[must_use]
pub fn estimate_foreground(image: &RgbaImage, alpha: &GrayImage) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let colors: Vec<f32> = image
        .pixels()
        .flat_map(|p| [p[0], p[1], p[2]])
        .map(|v| f32::from(v) / 255.0)
        .collect();
    let alphas: Vec<f32> = alpha.pixels().map(|p| f32::from(p[0]) / 255.0).collect();

    let mut foreground = colors.clone();
    let mut background = colors.clone();

    for radius in BLUR_FUSION_RADII {
        let fg_weights: Vec<f32> = alphas.clone();
        let bg_weights: Vec<f32> = alphas.iter().map(|a| 1.0 - a).collect();

        let fg_smooth = weighted_box_mean(&foreground, &fg_weights, w, h, radius);
        let bg_smooth = weighted_box_mean(&background, &bg_weights, w, h, radius);

        for (i, &a) in alphas.iter().enumerate() {
            for c in 0..3 {
                let k = i * 3 + c;
                let (Some(&observed), Some(&f_hat), Some(&b_hat)) =
                    (colors.get(k), fg_smooth.get(k), bg_smooth.get(k))
                else {
                    continue;
                };
                let residual = observed - a * f_hat - (1.0 - a) * b_hat;
                if let Some(f) = foreground.get_mut(k) {
                    *f = (f_hat + a * residual).clamp(0.0, 1.0);
                }
                if let Some(b) = background.get_mut(k) {
                    *b = (b_hat + (1.0 - a) * residual).clamp(0.0, 1.0);
                }
            }
        }
    }

    foreground
}

/// `Σ(w_j · v_j) / Σ w_j` over a `(2r+1)²` box clipped to the image, per RGB channel
///
/// Where the weights sum to zero the plain box mean is used instead.
fn weighted_box_mean(values: &[f32], weights: &[f32], w: usize, h: usize, radius: usize) -> Vec<f32> {
    let mut weighted = Vec::with_capacity(w * h * 4);
    for (i, &weight) in weights.iter().enumerate() {
        for c in 0..3 {
            weighted.push(values.get(i * 3 + c).copied().unwrap_or(0.0) * weight);
        }
        weighted.push(weight);
    }
    let unweighted: Vec<f32> = values.to_vec();

    let weighted_sums = box_sum(&weighted, w, h, 4, radius);
    let plain_sums = box_sum(&unweighted, w, h, 3, radius);

    let mut result = vec![0.0; w * h * 3];
    for y in 0..h {
        let y_span = (y + radius).min(h - 1) - y.saturating_sub(radius) + 1;
        for x in 0..w {
            let x_span = (x + radius).min(w - 1) - x.saturating_sub(radius) + 1;
            let i = y * w + x;
            let weight_sum = weighted_sums.get(i * 4 + 3).copied().unwrap_or(0.0);
            for c in 0..3 {
                let value = if weight_sum > 1e-5 {
                    weighted_sums.get(i * 4 + c).copied().unwrap_or(0.0) / weight_sum
                } else {
                    plain_sums.get(i * 3 + c).copied().unwrap_or(0.0) / (x_span * y_span) as f32
                };
                if let Some(slot) = result.get_mut(i * 3 + c) {
                    *slot = value;
                }
            }
        }
    }
    result
}

/// Separable box sum with running accumulators, window clipped at the borders
fn box_sum(data: &[f32], w: usize, h: usize, channels: usize, radius: usize) -> Vec<f32> {
    let mut horizontal = vec![0.0f32; data.len()];
    for y in 0..h {
        for c in 0..channels {
            let at = |x: usize| data.get((y * w + x) * channels + c).copied().unwrap_or(0.0);
            let mut acc: f64 = (0..=radius.min(w - 1)).map(|x| f64::from(at(x))).sum();
            for x in 0..w {
                if let Some(slot) = horizontal.get_mut((y * w + x) * channels + c) {
                    *slot = acc as f32;
                }
                if x + radius + 1 < w {
                    acc += f64::from(at(x + radius + 1));
                }
                if x >= radius {
                    acc -= f64::from(at(x - radius));
                }
            }
        }
    }

    let mut output = vec![0.0f32; data.len()];
    for x in 0..w {
        for c in 0..channels {
            let at = |y: usize| {
                horizontal
                    .get((y * w + x) * channels + c)
                    .copied()
                    .unwrap_or(0.0)
            };
            let mut acc: f64 = (0..=radius.min(h - 1)).map(|y| f64::from(at(y))).sum();
            for y in 0..h {
                if let Some(slot) = output.get_mut((y * w + x) * channels + c) {
                    *slot = acc as f32;
                }
                if y + radius + 1 < h {
                    acc += f64::from(at(y + radius + 1));
                }
                if y >= radius {
                    acc -= f64::from(at(y - radius));
                }
            }
        }
    }
    output
}
