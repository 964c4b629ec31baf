//! Model-backed segmentation provider

use super::{
    matting::{alpha_matting_cutout, naive_cutout},
    preprocessing::{image_to_tensor, tensor_to_mask},
    SegmentationProvider,
};
use crate::{
    cache::ModelCache,
    config::MattingOptions,
    error::{CutoutError, Result},
    inference::InferenceBackend,
    models::{ModelSource, ModelSpec},
};
use image::{GrayImage, RgbaImage};
use instant::Instant;
use std::sync::Mutex;
use tracing::{debug, info, instrument};

/// A loaded segmentation model
///
/// Inference needs exclusive access to the backend, so concurrent callers
/// are serialized on an internal lock. Pre- and post-processing run outside it.
pub struct ModelSession {
    spec: ModelSpec,
    display_name: String,
    backend: Mutex<Box<dyn InferenceBackend + Send>>,
}

impl std::fmt::Debug for ModelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSession")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl ModelSession {
    /// Load a model by registered name or `.onnx` path, using the default cache
    ///
    /// # Errors
    /// - `CutoutError::ModelLoad` for unknown, missing or unloadable models
    pub fn initialize(model: &str) -> Result<Self> {
        let spec = ModelSpec::parse(model)?;
        let cache = ModelCache::new()?;
        Self::from_spec(spec, &cache)
    }

    /// Load a model from a spec, resolving registered models through `cache`
    ///
    /// # Errors
    /// - `CutoutError::ModelLoad` if the model file is missing or cannot be loaded
    #[instrument(skip(cache), fields(model = %spec.display_name()))]
    pub fn from_spec(spec: ModelSpec, cache: &ModelCache) -> Result<Self> {
        let path = match &spec.source {
            ModelSource::Registered(kind) => {
                if !cache.is_cached(*kind) {
                    return Err(CutoutError::model_load(format!(
                        "Model '{kind}' not found in cache {}. Download it with --download-model",
                        cache.cache_dir().display()
                    )));
                }
                cache.model_path(*kind)
            },
            ModelSource::File(path) => {
                if !path.is_file() {
                    return Err(CutoutError::model_load(format!(
                        "Model file not found: {}",
                        path.display()
                    )));
                }
                path.clone()
            },
        };

        #[cfg(feature = "tract")]
        {
            let backend = crate::backends::TractBackend::new(path, spec.preprocessing.target_size);
            Self::with_backend(spec, Box::new(backend))
        }

        #[cfg(not(feature = "tract"))]
        {
            Err(CutoutError::model_load(format!(
                "Cannot load {}: built without an inference backend (enable the 'tract' feature)",
                path.display()
            )))
        }
    }

    /// Wrap an already constructed backend, initializing it if needed
    ///
    /// # Errors
    /// - `CutoutError::ModelLoad` if backend initialization fails
    pub fn with_backend(spec: ModelSpec, mut backend: Box<dyn InferenceBackend + Send>) -> Result<Self> {
        let _span = crate::tracing_config::spans::model_loading(&spec.display_name()).entered();

        let load_time = backend.initialize().map_err(|e| match e {
            CutoutError::ModelLoad(_) => e,
            other => CutoutError::model_load(other.to_string()),
        })?;
        if let Some(load_time) = load_time {
            info!(
                model = %spec.display_name(),
                backend = backend.name(),
                load_ms = load_time.as_millis() as u64,
                "Segmentation model loaded"
            );
        }

        Ok(Self {
            display_name: spec.display_name(),
            spec,
            backend: Mutex::new(backend),
        })
    }

    #[must_use]
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Predict a soft foreground mask at the image's size
    ///
    /// # Errors
    /// - `CutoutError::Segmentation` if inference fails or the output is malformed
    pub fn predict_mask(&self, image: &RgbaImage) -> Result<GrayImage> {
        let start = Instant::now();
        let input = image_to_tensor(image, &self.spec.preprocessing);

        let output = {
            let mut backend = self
                .backend
                .lock()
                .map_err(|_| CutoutError::segmentation("Inference backend lock poisoned"))?;
            backend.infer(&input)?
        };

        let mask = tensor_to_mask(&output, image.width(), image.height())?;
        debug!(
            model = %self.display_name,
            duration_ms = start.elapsed().as_millis() as u64,
            "Mask predicted"
        );
        Ok(mask)
    }
}

impl SegmentationProvider for ModelSession {
    fn segment(&self, image: &RgbaImage, matting: Option<&MattingOptions>) -> Result<RgbaImage> {
        let mask = self.predict_mask(image)?;
        match matting {
            Some(options) => alpha_matting_cutout(image, &mask, options),
            None => Ok(naive_cutout(image, &mask)),
        }
    }

    fn name(&self) -> &str {
        &self.display_name
    }
}
