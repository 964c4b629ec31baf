//! Model cache management for downloaded models
//!
//! Models are stored as flat `<name>.onnx` files. The directory is shared
//! with other u2net tooling:
//! - `$U2NET_HOME` when set
//! - `~/.u2net` otherwise

use crate::error::{CutoutError, Result};
use crate::models::ModelKind;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "U2NET_HOME";

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    pub kind: ModelKind,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache manager for the default directory, creating it if needed
    ///
    /// # Errors
    /// - Home directory cannot be determined and `U2NET_HOME` is unset
    /// - Directory cannot be created
    pub fn new() -> Result<Self> {
        Self::with_dir(Self::default_cache_dir()?)
    }

    /// Create a cache manager rooted at `cache_dir`, creating it if needed
    ///
    /// # Errors
    /// - Directory cannot be created
    pub fn with_dir<P: Into<PathBuf>>(cache_dir: P) -> Result<Self> {
        let cache_dir = cache_dir.into();
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                CutoutError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }
        Ok(Self { cache_dir })
    }

    /// Resolve the default cache directory
    ///
    /// # Errors
    /// - Home directory cannot be determined and `U2NET_HOME` is unset
    pub fn default_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            if !cache_override.is_empty() {
                return Ok(PathBuf::from(cache_override));
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".u2net"))
            .ok_or_else(|| {
                CutoutError::invalid_config(format!(
                    "Failed to determine home directory. Set the {CACHE_DIR_ENV} environment variable."
                ))
            })
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path a model is (or would be) cached at
    #[must_use]
    pub fn model_path(&self, kind: ModelKind) -> PathBuf {
        self.cache_dir.join(kind.file_name())
    }

    /// Whether a non-empty model file is present
    #[must_use]
    pub fn is_cached(&self, kind: ModelKind) -> bool {
        fs::metadata(self.model_path(kind)).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
    }

    /// Cached registered models, in registry order
    #[must_use]
    pub fn list_cached(&self) -> Vec<CachedModelInfo> {
        ModelKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let path = self.model_path(kind);
                let meta = fs::metadata(&path).ok()?;
                (meta.is_file() && meta.len() > 0).then(|| CachedModelInfo {
                    kind,
                    path,
                    size_bytes: meta.len(),
                })
            })
            .collect()
    }

    /// Delete a cached model; returns whether a file was removed
    ///
    /// # Errors
    /// - File exists but cannot be removed
    pub fn remove(&self, kind: ModelKind) -> Result<bool> {
        let path = self.model_path(kind);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| CutoutError::file_io_error("remove cached model", &path, &e))?;
        log::info!("Removed cached model: {}", path.display());
        Ok(true)
    }
}

/// Format a byte count for display, e.g. `167.4 MB`
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    match unit {
        0 => format!("{bytes} B"),
        _ => format!("{size:.1} {}", UNITS.get(unit).copied().unwrap_or("GB")),
    }
}
