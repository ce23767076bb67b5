use anyhow::Result;
use clap::{Parser, Subcommand};
use image_scan::cli::{BuildScanArgs, InitArgs, ScanArgs, build_scan, doctor, init, scan};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "image-scan",
    version,
    about = "Run dependency and vulnerability scanners inside a container image and collect their reports"
)]
struct Cli {
    /// Config file (default: ./image-scan.toml when present)
    #[arg(long, global = true, env = "IMAGE_SCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull an image, run the scan commands in it and copy the reports out
    Scan(ScanArgs),
    /// Build an image from a Dockerfile with the scan commands baked in and copy the reports out
    BuildScan(BuildScanArgs),
    /// Write a default image-scan.toml
    Init(InitArgs),
    /// Check the container engine and configuration
    Doctor,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Scan(args) => scan::run(args, config),
        Commands::BuildScan(args) => build_scan::run(args, config),
        Commands::Init(args) => init::run(args),
        Commands::Doctor => doctor::run(config),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
