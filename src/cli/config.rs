//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::config::{PipelineConfig, PipelineConfigBuilder, PngCompression};
use crate::models::ModelSpec;
use anyhow::{Context, Result};

/// Convert CLI arguments to a `PipelineConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the pipeline configuration: `--config` file (or defaults), then flag overrides
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        let base = match &cli.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        let mut builder = PipelineConfigBuilder::from_config(base);

        if cli.no_alpha_matting {
            builder = builder.alpha_matting(false);
        }
        if let Some(threshold) = cli.foreground_threshold {
            builder = builder.foreground_threshold(threshold);
        }
        if let Some(threshold) = cli.background_threshold {
            builder = builder.background_threshold(threshold);
        }
        if let Some(size) = cli.erode_size {
            builder = builder.erode_size(size);
        }
        if let Some(shift) = cli.matting_shift {
            builder = builder.matting_shift(shift);
        }
        match cli.sharpen {
            Some(factor) if factor > 1.0 => builder = builder.sharpen(true).sharpen_factor(factor),
            Some(factor) if factor.is_finite() => builder = builder.sharpen(false),
            Some(factor) => builder = builder.sharpen_factor(factor),
            None => {},
        }
        if cli.no_refine {
            builder = builder.refine_edges(false);
        }
        if cli.no_post_process {
            builder = builder.post_process(false);
        }
        if let Some(level) = cli.compression {
            builder = builder.compression(PngCompression::from_level(level)?);
        }

        builder.build().context("Invalid configuration")
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        ModelSpec::parse(&cli.model).context("Invalid model specification")?;

        if let Some(shift) = cli.matting_shift {
            if !(-1.0..=1.0).contains(&shift) {
                anyhow::bail!("--matting-shift must be within [-1, 1], got {shift}");
            }
        }

        if cli.input.is_none() && !cli.download_model {
            anyhow::bail!("An input image is required");
        }

        Ok(())
    }
}
