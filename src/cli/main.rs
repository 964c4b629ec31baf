//! Background removal CLI
//!
//! Single-image command-line front end over [`Pipeline`] and [`ModelSession`].

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, ModelCache, CACHE_DIR_ENV},
    config::PipelineConfig,
    download::ModelDownloader,
    models::{ModelKind, ModelSpec},
    pipeline::Pipeline,
    segmentation::ModelSession,
    services::ImageIOService,
    tracing_config::{events, init_cli_tracing, spans},
    types::ProcessingMetadata,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Instrument};

/// Remove image backgrounds with salient-object segmentation models
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imgly-cutout")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image file (use "-" for stdin)
    #[arg(
        value_name = "INPUT",
        required_unless_present_any = ["download_model", "list_models", "show_cache_dir"]
    )]
    pub input: Option<String>,

    /// Output PNG path [default: <INPUT stem>_nobg.png]. Use "-" for stdout.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Model name (see --list-models) or path to an .onnx file
    #[arg(short, long, default_value = "u2net")]
    pub model: String,

    /// Disable alpha matting
    #[arg(long)]
    pub no_alpha_matting: bool,

    /// Mask value above which pixels are definite foreground [default: 240]
    #[arg(long, value_name = "0-255")]
    pub foreground_threshold: Option<u8>,

    /// Mask value below which pixels are definite background [default: 10]
    #[arg(long, value_name = "0-255")]
    pub background_threshold: Option<u8>,

    /// Trimap erosion size in pixels [default: 10]
    #[arg(long, value_name = "PIXELS")]
    pub erode_size: Option<u32>,

    /// Offset applied to the mask in the matting unknown band, in [-1, 1] [default: 0.0]
    #[arg(long, value_name = "SHIFT", allow_hyphen_values = true)]
    pub matting_shift: Option<f32>,

    /// Sharpen factor; 1.0 or below disables sharpening [default: 1.5]
    #[arg(long, value_name = "FACTOR")]
    pub sharpen: Option<f32>,

    /// Skip edge refinement
    #[arg(long)]
    pub no_refine: bool,

    /// Skip all post-processing (edge refinement and sharpening)
    #[arg(long)]
    pub no_post_process: bool,

    /// PNG compression level (0-9)
    #[arg(long, value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(0..=9))]
    pub compression: Option<u8>,

    /// JSON pipeline configuration; command-line flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Download the model into the cache (exits afterwards when no INPUT is given)
    #[arg(long)]
    pub download_model: bool,

    /// List known models and their cache status, then exit
    #[arg(long)]
    pub list_models: bool,

    /// Show the model cache directory, then exit
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Enable verbose logging (-v: debug, -vv: trace, -vvv: trace for dependencies too)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (_tracing_guard, session_id) =
        init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    if cli.show_cache_dir {
        return show_cache_dir();
    }
    if cli.list_models {
        return list_models();
    }

    let span = spans::session(&session_id, &cli.model);
    run(cli).instrument(span).await
}

async fn run(cli: Cli) -> Result<()> {
    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    let spec = ModelSpec::parse(&cli.model).context("Invalid model")?;
    let cache = ModelCache::new().context("Failed to initialize model cache")?;

    ensure_model_available(&spec, &cache, cli.download_model).await?;

    let Some(input) = cli.input.as_deref() else {
        return Ok(());
    };

    let input_bytes = read_input(input)?;

    let session = tokio::task::spawn_blocking(move || ModelSession::from_spec(spec, &cache))
        .await
        .context("Model loading task failed")?
        .context("Failed to load segmentation model")?;
    let pipeline = Pipeline::new(session);

    let (png, metadata) = run_pipeline(&pipeline, input_bytes, &config)
        .await
        .with_context(|| format!("Failed to process {input}"))?;

    match output_destination(input, cli.output.as_deref()) {
        None => write_stdout(&png)?,
        Some(path) => {
            ImageIOService::write_bytes(&path, &png)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Saved {}", path.display());
        },
    }

    log_summary(&metadata);
    Ok(())
}

/// Download a registered model into the cache if it is missing
async fn ensure_model_available(spec: &ModelSpec, cache: &ModelCache, download_requested: bool) -> Result<()> {
    let Some(kind) = spec.kind() else {
        if download_requested {
            warn!("--download-model has no effect for model files");
        }
        return Ok(());
    };

    if cache.is_cached(kind) {
        if download_requested {
            events::progress(&format!(
                "Model '{kind}' already cached at {}",
                cache.model_path(kind).display()
            ));
        }
        return Ok(());
    }

    events::progress(&format!("Model '{kind}' not cached, downloading"));
    let downloader = ModelDownloader::new(cache.clone()).context("Failed to create model downloader")?;
    let path = downloader
        .download_model(kind, true)
        .await
        .with_context(|| format!("Failed to download model '{kind}'"))?;
    events::progress(&format!("Model '{kind}' saved to {}", path.display()));
    Ok(())
}

/// Decode, segment and post-process off the async runtime
async fn run_pipeline(
    pipeline: &Pipeline,
    bytes: Vec<u8>,
    config: &PipelineConfig,
) -> Result<(Vec<u8>, ProcessingMetadata)> {
    let pipeline = pipeline.clone();
    let config = config.clone();
    let (png, metadata) = tokio::task::spawn_blocking(move || -> crate::Result<_> {
        let mut result = pipeline.process_bytes(&bytes, &config)?;
        let png = result.to_png_bytes(config.compression)?;
        Ok((png, result.metadata))
    })
    .await
    .context("Processing task failed")??;
    Ok((png, metadata))
}

fn read_input(input: &str) -> Result<Vec<u8>> {
    if input == "-" {
        return read_stdin();
    }

    let path = Path::new(input);
    if path.is_dir() {
        anyhow::bail!(
            "'{}' is a directory; only single image files are supported",
            path.display()
        );
    }
    std::fs::read(path).with_context(|| format!("Failed to read input image {}", path.display()))
}

/// `None` means stdout
fn output_destination(input: &str, output: Option<&str>) -> Option<PathBuf> {
    match output {
        Some("-") => None,
        Some(path) => Some(PathBuf::from(path)),
        None if input == "-" => None,
        None => Some(ImageIOService::default_output_path(Path::new(input))),
    }
}

fn log_summary(metadata: &ProcessingMetadata) {
    if metadata.matting_fallback {
        events::warning_with_recommendation(
            "Alpha matting failed; the cut-out was produced without it",
            "adjust --foreground-threshold/--background-threshold or pass --no-alpha-matting",
        );
    }
    let timings = &metadata.timings;
    info!(
        width = metadata.width,
        height = metadata.height,
        provider = %metadata.provider,
        stages = ?metadata.stages_applied,
        decode_ms = timings.decode_ms,
        segmentation_ms = timings.segmentation_ms,
        postprocessing_ms = timings.postprocessing_ms(),
        encode_ms = timings.encode_ms.unwrap_or(0),
        total_ms = timings.total_ms,
        "Background removed"
    );
}

fn list_models() -> Result<()> {
    let cache = ModelCache::new().context("Failed to initialize model cache")?;
    let cached = cache.list_cached();

    println!("Models (cache: {})", cache.cache_dir().display());
    for kind in ModelKind::ALL {
        let status = cached
            .iter()
            .find(|info| info.kind == kind)
            .map_or_else(|| "not downloaded".to_string(), |info| format_size(info.size_bytes));
        let default_marker = if kind == ModelKind::default() { " (default)" } else { "" };
        println!(
            "  {:<18} {:<40} [{status}]{default_marker}",
            kind.name(),
            kind.description()
        );
    }
    Ok(())
}

fn show_cache_dir() -> Result<()> {
    let dir = ModelCache::default_cache_dir().context("Failed to determine cache directory")?;
    println!("{}", dir.display());
    if std::env::var_os(CACHE_DIR_ENV).is_some() {
        println!("(from {CACHE_DIR_ENV})");
    }
    Ok(())
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read image data from stdin")?;

    if buffer.is_empty() {
        anyhow::bail!("No data received from stdin");
    }

    Ok(buffer)
}

fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(data)
        .context("Failed to write image data to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_destination() {
        assert_eq!(
            output_destination("photos/cat.jpg", None),
            Some(PathBuf::from("photos/cat_nobg.png"))
        );
        assert_eq!(
            output_destination("cat.jpg", Some("out/cut.png")),
            Some(PathBuf::from("out/cut.png"))
        );
        assert_eq!(output_destination("cat.jpg", Some("-")), None);
        assert_eq!(output_destination("-", None), None);
        assert_eq!(
            output_destination("-", Some("cut.png")),
            Some(PathBuf::from("cut.png"))
        );
    }

    #[test]
    fn test_directories_rejected() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let input = temp_dir.path().to_string_lossy().to_string();
        let error = read_input(&input).unwrap_err();
        assert!(error.to_string().contains("directory"));
    }

    #[test]
    fn test_input_required_unless_info_flag() {
        assert!(Cli::try_parse_from(["imgly-cutout"]).is_err());
        assert!(Cli::try_parse_from(["imgly-cutout", "--list-models"]).is_ok());
        assert!(Cli::try_parse_from(["imgly-cutout", "--download-model", "-m", "u2netp"]).is_ok());
    }

    #[test]
    fn test_compression_range() {
        assert!(Cli::try_parse_from(["imgly-cutout", "in.png", "--compression", "9"]).is_ok());
        assert!(Cli::try_parse_from(["imgly-cutout", "in.png", "--compression", "10"]).is_err());
    }
}
