//! Model downloading with progress reporting and atomic placement
//!
//! Files are streamed into a temporary file inside the cache directory,
//! hashed while downloading, and renamed into place only once complete.

use crate::cache::ModelCache;
use crate::error::{CutoutError, Result};
use crate::models::ModelKind;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::Instrument;

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

impl ModelDownloader {
    /// Create a downloader writing into `cache`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .map_err(|e| CutoutError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Download a registered model into the cache, returning its path
    ///
    /// Already cached models are returned without touching the network.
    ///
    /// # Errors
    /// - Network errors or non-success HTTP status
    /// - File system errors while writing the cache
    pub async fn download_model(&self, kind: ModelKind, show_progress: bool) -> Result<PathBuf> {
        let final_path = self.cache.model_path(kind);
        if self.cache.is_cached(kind) {
            log::info!("Model already cached: {}", final_path.display());
            return Ok(final_path);
        }

        let url = kind.download_url();
        log::info!("Downloading model {} from {}", kind, url);

        let progress = if show_progress {
            Self::create_progress_indicator()
        } else {
            ProgressIndicator::NoOp
        };
        progress.set_message(format!("Downloading {}", kind.file_name()));

        let temp_file = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(self.cache.cache_dir())
            .map_err(|e| {
                CutoutError::file_io_error("create temporary file", self.cache.cache_dir(), &e)
            })?;

        let span = crate::tracing_config::spans::download(&url, &final_path);
        match self
            .download_file(&url, temp_file.path(), &progress)
            .instrument(span)
            .await
        {
            Ok(digest) => {
                log::info!("SHA-256 of {}: {}", kind.file_name(), digest);
                temp_file.persist(&final_path).map_err(|e| {
                    CutoutError::file_io_error("move downloaded model to cache", &final_path, &e.error)
                })?;
                progress.finish_with_message(format!("Downloaded {kind}"));
                log::info!("Successfully downloaded model to {}", final_path.display());
                Ok(final_path)
            },
            Err(e) => {
                progress.finish_with_message("Download failed".to_string());
                Err(e)
            },
        }
    }

    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    /// Stream `url` into `local_path`, returning the hex SHA-256 of the body
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CutoutError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(CutoutError::network_error(
                format!("Failed to download {url}"),
                format!("HTTP {}", response.status()),
            ));
        }

        let total_size = response.content_length();
        if let Some(total) = total_size {
            progress.set_length(total);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| CutoutError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| CutoutError::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| CutoutError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
            crate::tracing_config::events::download_progress(url, downloaded, total_size);
        }

        file.flush()
            .await
            .map_err(|e| CutoutError::file_io_error("flush file", local_path, &e))?;

        if downloaded == 0 {
            return Err(CutoutError::network_error(
                format!("Failed to download {url}"),
                "empty response body",
            ));
        }

        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Verify the integrity of a file against an expected SHA-256 hex digest
    ///
    /// Returns `true` when no digest is given.
    ///
    /// # Errors
    /// - File cannot be read
    pub fn verify_file_integrity(file_path: &Path, expected_hash: Option<&str>) -> Result<bool> {
        let Some(expected) = expected_hash else {
            return Ok(true);
        };

        let contents = std::fs::read(file_path)
            .map_err(|e| CutoutError::file_io_error("read file for verification", file_path, &e))?;
        let actual = format!("{:x}", Sha256::digest(&contents));

        if actual.eq_ignore_ascii_case(expected) {
            Ok(true)
        } else {
            log::warn!(
                "File integrity check failed for {}: expected {}, got {}",
                file_path.display(),
                expected,
                actual
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_verify_file_integrity() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("model.onnx");
        std::fs::write(&path, b"abc")?;

        let sha_abc = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert!(ModelDownloader::verify_file_integrity(&path, Some(sha_abc))?);
        assert!(ModelDownloader::verify_file_integrity(
            &path,
            Some(&sha_abc.to_uppercase())
        )?);
        assert!(!ModelDownloader::verify_file_integrity(&path, Some("00"))?);
        assert!(ModelDownloader::verify_file_integrity(&path, None)?);
        Ok(())
    }

    #[tokio::test]
    async fn test_cached_model_skips_network() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let cache = ModelCache::with_dir(temp_dir.path())?;
        std::fs::write(cache.model_path(ModelKind::U2netp), b"cached")?;

        let downloader = ModelDownloader::new(cache)?;
        let path = downloader.download_model(ModelKind::U2netp, false).await?;
        assert_eq!(path, temp_dir.path().join("u2netp.onnx"));
        assert_eq!(std::fs::read(path)?, b"cached");
        Ok(())
    }

    #[test]
    fn test_noop_progress_indicator() {
        let progress = ProgressIndicator::NoOp;
        progress.set_length(10);
        progress.set_position(5);
        progress.set_message("halfway".to_string());
        progress.finish_with_message("done".to_string());
    }
}
