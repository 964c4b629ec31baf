//! Image I/O operations service
//!
//! This module separates decoding, encoding and file access from the
//! pipeline, and assigns each failure its request-phase error kind.

use crate::{
    config::PngCompression,
    error::{CutoutError, Result},
};
use image::{
    codecs::png::{FilterType, PngEncoder},
    ExtendedColorType, ImageEncoder, ImageFormat, RgbaImage,
};
use std::path::Path;

/// Input formats accepted by the pipeline
pub const SUPPORTED_INPUT_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
];

/// Service for handling image decoding, encoding and file access
pub struct ImageIOService;

impl ImageIOService {
    /// Detect the container format from magic bytes
    #[must_use]
    pub fn detect_format(data: &[u8]) -> Option<ImageFormat> {
        image::guess_format(data).ok()
    }

    /// Decode image bytes into 8-bit RGBA
    ///
    /// # Errors
    /// - `CutoutError::Decode` for empty, truncated, unsupported or corrupt input
    pub fn decode(data: &[u8]) -> Result<RgbaImage> {
        if data.is_empty() {
            return Err(CutoutError::decode("input is empty"));
        }

        let format = Self::detect_format(data).ok_or_else(|| {
            CutoutError::decode(format!(
                "unrecognized image format ({} bytes). Supported formats: PNG, JPEG, WebP, BMP, TIFF",
                data.len()
            ))
        })?;

        if !SUPPORTED_INPUT_FORMATS.contains(&format) {
            return Err(CutoutError::decode(format!(
                "unsupported image format: {format:?}"
            )));
        }

        let image = image::load_from_memory_with_format(data, format)
            .map_err(|e| CutoutError::decode(format!("failed to decode {format:?} image: {e}")))?;

        log::debug!(
            "Decoded {:?} image {}x{} ({:?})",
            format,
            image.width(),
            image.height(),
            image.color()
        );

        Ok(image.to_rgba8())
    }

    /// Read and decode an image file
    ///
    /// # Errors
    /// - `CutoutError::Io` if the file cannot be read
    /// - `CutoutError::Decode` if the contents are not a supported image
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
        let path_ref = path.as_ref();
        let data = std::fs::read(path_ref)
            .map_err(|e| CutoutError::file_io_error("read image file", path_ref, &e))?;

        Self::decode(&data).map_err(|e| match e {
            CutoutError::Decode(msg) => {
                CutoutError::decode(format!("{}: {msg}", path_ref.display()))
            },
            other => other,
        })
    }

    /// Encode an image as 8-bit RGBA PNG
    ///
    /// # Errors
    /// - `CutoutError::Encode` if the encoder rejects the buffer
    pub fn encode_png(image: &RgbaImage, compression: PngCompression) -> Result<Vec<u8>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CutoutError::encode(format!(
                "cannot encode an empty {width}x{height} image"
            )));
        }

        let mut buffer = Vec::new();
        let encoder = PngEncoder::new_with_quality(
            &mut buffer,
            compression.compression_type(),
            FilterType::Adaptive,
        );
        encoder
            .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)
            .map_err(|e| CutoutError::encode(format!("PNG encoding failed: {e}")))?;

        log::debug!(
            "Encoded {}x{} PNG ({} compression, {} bytes)",
            width,
            height,
            compression,
            buffer.len()
        );

        Ok(buffer)
    }

    /// Write bytes to a file, creating the parent directory if needed
    ///
    /// # Errors
    /// - `CutoutError::Io` if the directory or file cannot be written
    pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CutoutError::file_io_error("create output directory", parent, &e))?;
            }
        }

        std::fs::write(path, bytes)
            .map_err(|e| CutoutError::file_io_error("write output file", path, &e))
    }

    /// Default output path for an input file: `<stem>_nobg.png` beside it
    #[must_use]
    pub fn default_output_path(input: &Path) -> std::path::PathBuf {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        input.with_file_name(format!("{stem}_nobg.png"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};
    use std::io::Cursor;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn jpeg_bytes() -> Vec<u8> {
        let image: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(8, 6, Rgb([200, 40, 40]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .unwrap();
        bytes
    }

    #[test]
    fn test_decode_jpeg_to_opaque_rgba() {
        let decoded = ImageIOService::decode(&jpeg_bytes()).unwrap();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert!(decoded.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = ImageIOService::decode(b"definitely not an image");
        assert!(matches!(result, Err(CutoutError::Decode(_))));

        let result = ImageIOService::decode(&[]);
        assert!(matches!(result, Err(CutoutError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_truncated_png() {
        let image = RgbaImage::from_pixel(16, 16, Rgba([1, 2, 3, 4]));
        let bytes = ImageIOService::encode_png(&image, PngCompression::Fast).unwrap();
        let truncated = &bytes[..bytes.len() / 2];

        let result = ImageIOService::decode(truncated);
        assert!(matches!(result, Err(CutoutError::Decode(_))));
    }

    #[test]
    fn test_png_roundtrip_preserves_alpha() {
        let mut image = RgbaImage::from_pixel(5, 5, Rgba([0, 0, 0, 0]));
        image.put_pixel(2, 2, Rgba([255, 128, 7, 77]));

        for compression in [PngCompression::Fast, PngCompression::Best] {
            let bytes = ImageIOService::encode_png(&image, compression).unwrap();
            assert_eq!(ImageIOService::detect_format(&bytes), Some(ImageFormat::Png));
            let decoded = ImageIOService::decode(&bytes).unwrap();
            assert_eq!(decoded, image);
        }
    }

    #[test]
    fn test_encode_rejects_empty_image() {
        let image = RgbaImage::new(0, 0);
        let result = ImageIOService::encode_png(&image, PngCompression::Fast);
        assert!(matches!(result, Err(CutoutError::Encode(_))));
    }

    #[test]
    fn test_load_image_missing_file_is_io_error() {
        let result = ImageIOService::load_image("/nonexistent/dir/cat.png");
        assert!(matches!(result, Err(CutoutError::Io(_))));
    }

    #[test]
    fn test_load_image_corrupt_file_is_decode_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nnope")?;

        let result = ImageIOService::load_image(&path);
        match result {
            Err(CutoutError::Decode(msg)) => assert!(msg.contains("broken.png")),
            other => panic!("expected decode error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            ImageIOService::default_output_path(Path::new("photos/cat.jpeg")),
            PathBuf::from("photos/cat_nobg.png")
        );
        assert_eq!(
            ImageIOService::default_output_path(Path::new("portrait.png")),
            PathBuf::from("portrait_nobg.png")
        );
    }
}
