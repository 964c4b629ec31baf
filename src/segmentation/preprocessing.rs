//! Image preprocessing and mask extraction for salient-object models

use crate::{
    error::{CutoutError, Result},
    models::PreprocessingConfig,
};
use image::{imageops, DynamicImage, GrayImage, Luma, RgbaImage};
use ndarray::{Array4, ArrayView2};

/// Convert an image into a normalized NCHW tensor
///
/// The image is stretched (aspect ratio not kept) to the model's square
/// input, scaled by its brightest channel value, then normalized per
/// channel with the model's mean and standard deviation.
#[must_use]
pub fn image_to_tensor(image: &RgbaImage, config: &PreprocessingConfig) -> Array4<f32> {
    let size = config.target_size;
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let resized = imageops::resize(&rgb, size, size, imageops::FilterType::Lanczos3);

    let max_value = resized.as_raw().iter().copied().max().unwrap_or(0);
    let scale = if max_value == 0 {
        1.0
    } else {
        f32::from(max_value)
    };

    let size = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            let value = f32::from(pixel[channel]) / scale;
            let normalized = (value - config.normalization_mean[channel])
                / config.normalization_std[channel];
            if let Some(slot) = tensor.get_mut([0, channel, y as usize, x as usize]) {
                *slot = normalized;
            }
        }
    }

    tensor
}

/// Turn the model output into a mask at the original image size
///
/// Channel 0 of the output is min-max normalized to 0-255 and resized back
/// with Lanczos3. A constant prediction yields an all-zero mask.
///
/// # Errors
/// - `CutoutError::Segmentation` for an empty or malformed output tensor
pub fn tensor_to_mask(output: &Array4<f32>, width: u32, height: u32) -> Result<GrayImage> {
    let shape = output.shape();
    if shape.first() != Some(&1) || shape.get(1).map_or(true, |&c| c == 0) {
        return Err(CutoutError::segmentation(format!(
            "Unexpected model output shape {shape:?}, expected [1, C, H, W]"
        )));
    }

    let prediction: ArrayView2<f32> = output.slice(ndarray::s![0, 0, .., ..]);
    let (rows, cols) = prediction.dim();
    if rows == 0 || cols == 0 {
        return Err(CutoutError::segmentation("Model output has no pixels"));
    }
    if prediction.iter().any(|v| !v.is_finite()) {
        return Err(CutoutError::segmentation("Model output contains non-finite values"));
    }

    let (min, max) = prediction
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    let mask = GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        if range <= f32::EPSILON {
            return Luma([0]);
        }
        let value = prediction
            .get((y as usize, x as usize))
            .copied()
            .unwrap_or(min);
        Luma([(((value - min) / range) * 255.0).round().clamp(0.0, 255.0) as u8])
    });

    if mask.dimensions() == (width, height) {
        return Ok(mask);
    }
    Ok(imageops::resize(&mask, width, height, imageops::FilterType::Lanczos3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelKind;
    use image::Rgba;

    #[test]
    fn test_tensor_shape_and_normalization() {
        let config = ModelKind::U2net.preprocessing();
        let image = RgbaImage::from_pixel(50, 30, Rgba([255, 255, 255, 255]));

        let tensor = image_to_tensor(&image, &config);
        assert_eq!(tensor.shape(), &[1, 3, 320, 320]);

        let expected_r = (1.0 - 0.485) / 0.229;
        assert!((tensor[[0, 0, 100, 100]] - expected_r).abs() < 1e-4);
        let expected_b = (1.0 - 0.406) / 0.225;
        assert!((tensor[[0, 2, 5, 300]] - expected_b).abs() < 1e-4);
    }

    #[test]
    fn test_tensor_scales_by_brightest_value() {
        let config = PreprocessingConfig {
            target_size: 4,
            normalization_mean: [0.0; 3],
            normalization_std: [1.0; 3],
        };
        let image = RgbaImage::from_pixel(4, 4, Rgba([100, 50, 25, 255]));

        let tensor = image_to_tensor(&image, &config);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] - 0.5).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 0]] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_black_image_does_not_divide_by_zero() {
        let config = ModelKind::U2netp.preprocessing();
        let image = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let tensor = image_to_tensor(&image, &config);
        assert!(tensor.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_mask_min_max_normalization() {
        let mut output = Array4::<f32>::from_elem((1, 1, 4, 4), 0.2);
        output[[0, 0, 1, 1]] = 0.8;

        let mask = tensor_to_mask(&output, 4, 4).unwrap();
        assert_eq!(mask.get_pixel(1, 1)[0], 255);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_mask_resized_to_original() {
        let output = Array4::<f32>::from_shape_fn((1, 7, 8, 8), |(_, c, _, x)| {
            if c == 0 && x >= 4 {
                1.0
            } else {
                0.0
            }
        });

        let mask = tensor_to_mask(&output, 32, 16).unwrap();
        assert_eq!(mask.dimensions(), (32, 16));
        assert_eq!(mask.get_pixel(2, 8)[0], 0);
        assert_eq!(mask.get_pixel(30, 8)[0], 255);
    }

    #[test]
    fn test_constant_prediction_gives_empty_mask() {
        let output = Array4::<f32>::from_elem((1, 1, 8, 8), 0.7);
        let mask = tensor_to_mask(&output, 8, 8).unwrap();
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_malformed_output_rejected() {
        let output = Array4::<f32>::zeros((2, 1, 4, 4));
        assert!(matches!(
            tensor_to_mask(&output, 4, 4),
            Err(CutoutError::Segmentation(_))
        ));

        let mut output = Array4::<f32>::zeros((1, 1, 4, 4));
        output[[0, 0, 0, 0]] = f32::NAN;
        assert!(tensor_to_mask(&output, 4, 4).is_err());
    }
}
