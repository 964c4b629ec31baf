//! Alpha mask primitives shared by the edge refiner and the cutout step

use image::{GrayImage, Luma, RgbaImage};
use imageproc::{
    distance_transform::Norm,
    morphology::{close, open},
    region_labelling::{connected_components, Connectivity},
};

/// Binary mask from the alpha channel: 255 where alpha > 0
#[must_use]
pub fn binary_alpha_mask(image: &RgbaImage) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if image.get_pixel(x, y)[3] > 0 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Morphological close followed by open, both with a 3x3 square
///
/// Close fills pinholes and hairline gaps, open then drops isolated specks.
/// Pixels outside the image never erode the mask.
#[must_use]
pub fn close_then_open(mask: &GrayImage) -> GrayImage {
    let closed = close(mask, Norm::LInf, 1);
    open(&closed, Norm::LInf, 1)
}

/// Keep only the largest 8-connected foreground region, filled solid
///
/// Background holes fully enclosed by the kept region become foreground, so
/// the result matches filling the region's outer contour. Ties go to the
/// region found first in row-major order. A mask without foreground is
/// returned unchanged.
#[must_use]
pub fn keep_largest_component(mask: &GrayImage) -> GrayImage {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut areas: Vec<u64> = Vec::new();
    for label in labels.pixels().map(|p| p[0] as usize) {
        if label == 0 {
            continue;
        }
        if areas.len() < label {
            areas.resize(label, 0);
        }
        if let Some(area) = areas.get_mut(label - 1) {
            *area += 1;
        }
    }

    let Some(largest) = areas
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, u64)>, (index, &area)| match best {
            Some((_, best_area)) if best_area >= area => best,
            _ => Some((index, area)),
        })
        .map(|(index, _)| (index + 1) as u32)
    else {
        return mask.clone();
    };

    let (width, height) = mask.dimensions();
    let kept = GrayImage::from_fn(width, height, |x, y| {
        if labels.get_pixel(x, y)[0] == largest {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    fill_enclosed_holes(&kept)
}

/// Turn background regions that do not touch the image border into foreground
fn fill_enclosed_holes(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    // Label the background: foreground pixels act as the "background" value here
    let holes = connected_components(mask, Connectivity::Four, Luma([255u8]));

    let mut touches_border = Vec::new();
    for (x, y, label) in holes.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        if touches_border.len() < label {
            touches_border.resize(label, false);
        }
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            if let Some(flag) = touches_border.get_mut(label - 1) {
                *flag = true;
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let label = holes.get_pixel(x, y)[0] as usize;
        if label == 0 {
            return Luma([255]);
        }
        let open_to_border = touches_border.get(label - 1).copied().unwrap_or(true);
        if open_to_border {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

/// Reflect-101 border handling (`gfedcb|abcdefgh|gfedcba`)
fn reflect_101(index: i64, len: u32) -> u32 {
    let len = i64::from(len);
    if len == 1 {
        return 0;
    }
    let reflected = if index < 0 {
        -index
    } else if index >= len {
        2 * len - index - 2
    } else {
        index
    };
    reflected.clamp(0, len - 1) as u32
}

/// 3x3 Gaussian blur with kernel `[1,2,1]ᵀ·[1,2,1] / 16`
///
/// Separable fixed-point implementation with reflect-101 borders and
/// round-half-up on the final division.
#[must_use]
pub fn gaussian_blur_3x3(mask: &GrayImage) -> GrayImage {
    const WEIGHTS: [u32; 3] = [1, 2, 1];

    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return mask.clone();
    }

    let mut horizontal = vec![0u32; width as usize * height as usize];
    for y in 0..height {
        for x in 0..width {
            let sum: u32 = WEIGHTS
                .iter()
                .zip(-1i64..=1)
                .map(|(w, dx)| {
                    let sx = reflect_101(i64::from(x) + dx, width);
                    w * u32::from(mask.get_pixel(sx, y)[0])
                })
                .sum();
            if let Some(slot) = horizontal.get_mut((y * width + x) as usize) {
                *slot = sum;
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let sum: u32 = WEIGHTS
            .iter()
            .zip(-1i64..=1)
            .map(|(w, dy)| {
                let sy = reflect_101(i64::from(y) + dy, height);
                w * horizontal
                    .get((sy * width + x) as usize)
                    .copied()
                    .unwrap_or(0)
            })
            .sum();
        Luma([((sum + 8) / 16).min(255) as u8])
    })
}

/// Scale every channel (alpha included) by `mask / 255`, rounding to nearest
///
/// Soft mask edges therefore darken RGB toward black as well as lowering
/// alpha. Callers must pass a mask with the image's dimensions.
#[must_use]
pub fn apply_mask(image: &RgbaImage, mask: &GrayImage) -> RgbaImage {
    debug_assert_eq!(image.dimensions(), mask.dimensions());

    let mut output = image.clone();
    for (pixel, weight) in output.pixels_mut().zip(mask.pixels()) {
        let weight = u32::from(weight[0]);
        for channel in &mut pixel.0 {
            *channel = ((u32::from(*channel) * weight + 127) / 255) as u8;
        }
    }
    output
}

/// Number of non-zero pixels
#[must_use]
pub fn foreground_area(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p[0] > 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn square_mask(size: u32, start: u32, end: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (start..end).contains(&x) && (start..end).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn test_binary_alpha_mask_threshold() {
        let mut image = RgbaImage::from_pixel(3, 1, Rgba([9, 9, 9, 0]));
        image.put_pixel(1, 0, Rgba([9, 9, 9, 1]));
        image.put_pixel(2, 0, Rgba([9, 9, 9, 255]));

        let mask = binary_alpha_mask(&image);
        assert_eq!(mask.as_raw(), &vec![0, 255, 255]);
    }

    #[test]
    fn test_close_then_open_removes_speck_and_fills_pinhole() {
        let mut mask = square_mask(30, 5, 20);
        mask.put_pixel(12, 12, Luma([0]));
        mask.put_pixel(27, 27, Luma([255]));

        let cleaned = close_then_open(&mask);
        assert_eq!(cleaned.get_pixel(12, 12)[0], 255);
        assert_eq!(cleaned.get_pixel(27, 27)[0], 0);
        assert_eq!(cleaned.get_pixel(5, 5)[0], 255);
        assert_eq!(cleaned.get_pixel(4, 4)[0], 0);
    }

    #[test]
    fn test_close_then_open_keeps_full_mask() {
        let mask = GrayImage::from_pixel(8, 8, Luma([255]));
        assert_eq!(close_then_open(&mask), mask);
    }

    #[test]
    fn test_keep_largest_component() {
        let mut mask = square_mask(40, 2, 20);
        for y in 30..34 {
            for x in 30..34 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }

        let kept = keep_largest_component(&mask);
        assert_eq!(kept.get_pixel(10, 10)[0], 255);
        assert_eq!(kept.get_pixel(31, 31)[0], 0);
        assert_eq!(foreground_area(&kept), 18 * 18);
    }

    #[test]
    fn test_keep_largest_component_fills_holes() {
        let mut mask = square_mask(30, 5, 25);
        for y in 10..15 {
            for x in 10..15 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }

        let kept = keep_largest_component(&mask);
        assert_eq!(kept.get_pixel(12, 12)[0], 255);
        assert_eq!(foreground_area(&kept), 20 * 20);
    }

    #[test]
    fn test_keep_largest_component_diagonal_neighbours_connect() {
        let mut mask = GrayImage::new(5, 5);
        mask.put_pixel(1, 1, Luma([255]));
        mask.put_pixel(2, 2, Luma([255]));
        mask.put_pixel(3, 3, Luma([255]));

        assert_eq!(foreground_area(&keep_largest_component(&mask)), 3);
    }

    #[test]
    fn test_keep_largest_component_empty_mask() {
        let mask = GrayImage::new(6, 4);
        assert_eq!(keep_largest_component(&mask), mask);
    }

    #[test]
    fn test_gaussian_blur_constant_mask_unchanged() {
        for value in [0u8, 255] {
            let mask = GrayImage::from_pixel(7, 5, Luma([value]));
            assert_eq!(gaussian_blur_3x3(&mask), mask);
        }
    }

    #[test]
    fn test_gaussian_blur_step_edge() {
        // Vertical edge between columns 4 and 5
        let mask = GrayImage::from_fn(10, 3, |x, _| if x < 5 { Luma([255]) } else { Luma([0]) });
        let blurred = gaussian_blur_3x3(&mask);

        assert_eq!(blurred.get_pixel(3, 1)[0], 255);
        assert_eq!(blurred.get_pixel(4, 1)[0], 191);
        assert_eq!(blurred.get_pixel(5, 1)[0], 64);
        assert_eq!(blurred.get_pixel(6, 1)[0], 0);
    }

    #[test]
    fn test_gaussian_blur_single_pixel_image() {
        let mask = GrayImage::from_pixel(1, 1, Luma([200]));
        assert_eq!(gaussian_blur_3x3(&mask).get_pixel(0, 0)[0], 200);
    }

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(2, 5), 2);
        assert_eq!(reflect_101(-1, 1), 0);
        assert_eq!(reflect_101(2, 2), 0);
    }

    #[test]
    fn test_apply_mask_premultiplies_all_channels() {
        let image = RgbaImage::from_pixel(2, 1, Rgba([200, 100, 50, 255]));
        let mask = GrayImage::from_raw(2, 1, vec![255, 128]).unwrap();

        let masked = apply_mask(&image, &mask);
        assert_eq!(masked.get_pixel(0, 0), &Rgba([200, 100, 50, 255]));
        assert_eq!(masked.get_pixel(1, 0), &Rgba([100, 50, 25, 128]));
    }
}
