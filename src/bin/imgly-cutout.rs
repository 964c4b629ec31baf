//! imgly-cutout CLI tool
//!
//! Removes the background from a single image using a u2net-family
//! segmentation model and writes an RGBA PNG.

#[cfg(feature = "cli")]
use imgly_cutout::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
