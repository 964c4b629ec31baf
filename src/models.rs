//! Segmentation model registry and model specifications

use crate::error::{CutoutError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Release location of the pretrained salient-object models
const MODEL_RELEASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocessing parameters for model input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Square input resolution expected by the model
    pub target_size: u32,
    /// Normalization mean values (RGB)
    pub normalization_mean: [f32; 3],
    /// Normalization standard deviation values (RGB)
    pub normalization_std: [f32; 3],
}

/// Known segmentation models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelKind {
    /// General purpose salient object segmentation
    #[default]
    U2net,
    /// Lightweight u2net
    U2netp,
    /// u2net trained for human segmentation
    U2netHumanSeg,
    /// Reduced-size u2net
    Silueta,
    /// IS-Net general use
    IsnetGeneralUse,
}

impl ModelKind {
    /// All registered models, default first
    pub const ALL: [Self; 5] = [
        Self::U2net,
        Self::U2netp,
        Self::U2netHumanSeg,
        Self::Silueta,
        Self::IsnetGeneralUse,
    ];

    /// Name used on the command line and as the cached file stem
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::U2net => "u2net",
            Self::U2netp => "u2netp",
            Self::U2netHumanSeg => "u2net_human_seg",
            Self::Silueta => "silueta",
            Self::IsnetGeneralUse => "isnet-general-use",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.onnx", self.name())
    }

    #[must_use]
    pub fn download_url(self) -> String {
        format!("{MODEL_RELEASE_URL}/{}", self.file_name())
    }

    #[must_use]
    pub fn preprocessing(self) -> PreprocessingConfig {
        match self {
            Self::U2net | Self::U2netp | Self::U2netHumanSeg | Self::Silueta => {
                PreprocessingConfig {
                    target_size: 320,
                    normalization_mean: IMAGENET_MEAN,
                    normalization_std: IMAGENET_STD,
                }
            },
            Self::IsnetGeneralUse => PreprocessingConfig {
                target_size: 1024,
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::U2net => "general use salient object segmentation",
            Self::U2netp => "lightweight version of u2net",
            Self::U2netHumanSeg => "human segmentation",
            Self::Silueta => "u2net reduced to 43 MB",
            Self::IsnetGeneralUse => "IS-Net general use",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a model is loaded from
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// A registered model, resolved through the model cache
    Registered(ModelKind),
    /// An ONNX file on disk
    File(PathBuf),
}

impl ModelSource {
    /// Get a display name for the model source
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Registered(kind) => kind.name().to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }
}

/// Model specification: source plus preprocessing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub source: ModelSource,
    pub preprocessing: PreprocessingConfig,
}

impl ModelSpec {
    #[must_use]
    pub fn registered(kind: ModelKind) -> Self {
        Self {
            source: ModelSource::Registered(kind),
            preprocessing: kind.preprocessing(),
        }
    }

    /// Parse a model identifier: a registered model name or a path to an `.onnx` file
    ///
    /// Files named after a registered model use its preprocessing; other
    /// files are treated as u2net-family models.
    ///
    /// # Errors
    /// - `CutoutError::ModelLoad` for an unknown name
    pub fn parse(identifier: &str) -> Result<Self> {
        if let Some(kind) = ModelKind::from_name(identifier) {
            return Ok(Self::registered(kind));
        }

        let path = Path::new(identifier);
        let is_onnx = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"));

        if is_onnx || path.is_file() {
            let preprocessing = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(ModelKind::from_name)
                .unwrap_or_default()
                .preprocessing();
            return Ok(Self {
                source: ModelSource::File(path.to_path_buf()),
                preprocessing,
            });
        }

        let known: Vec<&str> = ModelKind::ALL.iter().map(|kind| kind.name()).collect();
        Err(CutoutError::model_load(format!(
            "Unknown model '{identifier}'. Known models: {}. A path to an .onnx file is also accepted",
            known.join(", ")
        )))
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        self.source.display_name()
    }

    /// Registered model kind, if any
    #[must_use]
    pub fn kind(&self) -> Option<ModelKind> {
        match self.source {
            ModelSource::Registered(kind) => Some(kind),
            ModelSource::File(_) => None,
        }
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::registered(ModelKind::default())
    }
}
