//! UMI pipeline CLI
//!
//! Runs the SLAM pipeline stages over a recording session, each stage as a
//! batch of external jobs with bounded parallelism.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod signals;

use commands::run::RunCommand;
use commands::stages::{
    BatchSlamCommand, CalibrateCommand, CreateMapCommand, DetectArucoCommand, ExtractImuCommand,
};
use output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "umi-pipeline",
    version,
    about = "Batch runner for the UMI SLAM pipeline",
    long_about = "Turns a session of raw GoPro recordings into calibrated trajectories.\n\
                  Every stage scans the session for work units, skips the ones that are\n\
                  already done, and runs its external tool on the rest in parallel.",
    after_help = "EXAMPLES:\n  \
                  # Whole pipeline, in order\n  \
                  umi-pipeline run ~/sessions/cup_arrangement\n\n  \
                  # Single stages\n  \
                  umi-pipeline extract-imu ~/sessions/cup_arrangement\n  \
                  umi-pipeline batch-slam ~/sessions/cup_arrangement -n 4 --timeout-multiple 8\n  \
                  umi-pipeline detect-aruco ~/sessions/cup_arrangement \\\n    \
                  --camera-intrinsics calibration/gopro_intrinsics_2_7k.json \\\n    \
                  --aruco-config calibration/aruco_config.yaml"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: platform config dir, umi-pipeline/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Report format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract IMU data from every demo video
    ExtractImu(ExtractImuCommand),

    /// Build the SLAM map from the mapping video
    CreateMap(CreateMapCommand),

    /// Localize every demo video against the map
    BatchSlam(BatchSlamCommand),

    /// Detect ArUco tags in every video
    DetectAruco(DetectArucoCommand),

    /// Run SLAM-tag and gripper-range calibration
    Calibrate(CalibrateCommand),

    /// Run all stages in order
    Run(RunCommand),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

    let ctx = commands::Context::load(cli.config.as_deref(), cli.format, cli.verbose)?;

    let success = match cli.command {
        Commands::ExtractImu(cmd) => cmd.execute(&ctx).await?,
        Commands::CreateMap(cmd) => cmd.execute(&ctx).await?,
        Commands::BatchSlam(cmd) => cmd.execute(&ctx).await?,
        Commands::DetectAruco(cmd) => cmd.execute(&ctx).await?,
        Commands::Calibrate(cmd) => cmd.execute(&ctx).await?,
        Commands::Run(cmd) => cmd.execute(&ctx).await?,
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
