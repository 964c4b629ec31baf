//! Sharpness enhancement applied to the color channels only

use crate::{
    error::{CutoutError, Result},
    types::PostProcessStage,
};
use image::RgbaImage;

/// Weight of the center tap in the smoothing kernel; all others weigh 1
const SMOOTH_CENTER_WEIGHT: u32 = 5;
/// Sum of the smoothing kernel weights
const SMOOTH_KERNEL_SUM: f32 = 13.0;

/// Enhance sharpness of the RGB channels by `factor`, leaving alpha untouched
///
/// A smoothed copy is built with the kernel `[[1,1,1],[1,5,1],[1,1,1]] / 13`
/// (the outermost rows and columns are copied as-is), then each channel is
/// extrapolated away from it: `smooth + factor * (original - smooth)`.
/// `factor == 1.0` returns the input, values above 1.0 sharpen and values
/// below 1.0 soften.
///
/// # Errors
/// - `CutoutError::Stage` for a non-finite factor
pub fn sharpen(image: &RgbaImage, factor: f32) -> Result<RgbaImage> {
    if !factor.is_finite() {
        return Err(CutoutError::stage(
            PostProcessStage::Sharpening,
            format!("sharpen factor must be finite, got {factor}"),
        ));
    }

    let (width, height) = image.dimensions();
    let mut output = image.clone();
    if width < 3 || height < 3 {
        return Ok(output);
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut sums = [0u32; 3];
            for ny in y - 1..=y + 1 {
                for nx in x - 1..=x + 1 {
                    let weight = if nx == x && ny == y {
                        SMOOTH_CENTER_WEIGHT
                    } else {
                        1
                    };
                    let neighbour = image.get_pixel(nx, ny);
                    for (sum, &value) in sums.iter_mut().zip(&neighbour.0[..3]) {
                        *sum += weight * u32::from(value);
                    }
                }
            }

            let original = image.get_pixel(x, y);
            let pixel = output.get_pixel_mut(x, y);
            for (channel, (&sum, &value)) in pixel.0[..3]
                .iter_mut()
                .zip(sums.iter().zip(&original.0[..3]))
            {
                let smooth = (sum as f32 / SMOOTH_KERNEL_SUM).round();
                let enhanced = smooth + factor * (f32::from(value) - smooth);
                *channel = enhanced.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checkerboard(size: u32) -> RgbaImage {
        RgbaImage::from_fn(size, size, |x, y| {
            let alpha = ((x * 31 + y * 17) % 256) as u8;
            if (x + y) % 2 == 0 {
                Rgba([200, 120, 40, alpha])
            } else {
                Rgba([60, 90, 220, alpha])
            }
        })
    }

    #[test]
    fn test_factor_one_is_identity() {
        let image = checkerboard(9);
        assert_eq!(sharpen(&image, 1.0).unwrap(), image);
    }

    #[test]
    fn test_alpha_untouched() {
        let image = checkerboard(11);
        for factor in [0.5, 1.5, 3.0, 10.0] {
            let sharpened = sharpen(&image, factor).unwrap();
            for (a, b) in image.pixels().zip(sharpened.pixels()) {
                assert_eq!(a[3], b[3]);
            }
        }
    }

    #[test]
    fn test_sharpening_increases_local_contrast() {
        let mut image = RgbaImage::from_pixel(5, 5, Rgba([100, 100, 100, 255]));
        image.put_pixel(2, 2, Rgba([150, 150, 150, 255]));

        let sharpened = sharpen(&image, 2.0).unwrap();
        // smooth = round((8 * 100 + 5 * 150) / 13) = 119, enhanced = 119 + 2 * 31 = 181
        assert_eq!(sharpened.get_pixel(2, 2)[0], 181);
        assert!(sharpened.get_pixel(1, 1)[0] < 100);
        // Border pixels are copied through
        assert_eq!(sharpened.get_pixel(0, 0)[0], 100);
    }

    #[test]
    fn test_output_is_clamped() {
        let mut image = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 255]));
        image.put_pixel(1, 1, Rgba([255, 255, 255, 255]));

        let sharpened = sharpen(&image, 5.0).unwrap();
        assert_eq!(sharpened.get_pixel(1, 1)[0], 255);
    }

    #[test]
    fn test_tiny_images_pass_through() {
        let image = RgbaImage::from_pixel(2, 7, Rgba([1, 2, 3, 4]));
        assert_eq!(sharpen(&image, 2.0).unwrap(), image);
    }

    #[test]
    fn test_non_finite_factor_rejected() {
        let image = checkerboard(4);
        assert!(matches!(
            sharpen(&image, f32::NAN),
            Err(CutoutError::Stage {
                stage: PostProcessStage::Sharpening,
                ..
            })
        ));
    }
}
