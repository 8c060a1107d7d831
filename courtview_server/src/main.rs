//! CourtView - court-space player tracking broadcast
//!
//! Subcommands:
//! - `serve`: replay tracker output through the pipeline and stream frames
//!   to websocket viewers
//! - `calibrate`: compute a calibration from four picked court corners
//! - `transform`: check a stored calibration on a few pixel points

mod cli;
mod server;
mod ws_sink;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{CalibrateArgs, Cli, Command, TransformArgs};
use courtview_core::{CalibrationStore, CoordinateTransformer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Serve(args) => server::serve(args).await,
        Command::Calibrate(args) => calibrate(args),
        Command::Transform(args) => transform(args),
    }
}

fn calibrate(args: CalibrateArgs) -> Result<()> {
    let mut transformer = CoordinateTransformer::new();
    transformer
        .calibrate(&args.points, args.shape())
        .context("calibration failed")?;

    let data = transformer.save_calibration()?;
    let store = CalibrationStore::new(&args.calibration_dir);
    let path = store.save(&args.source, &data)?;

    info!(source = %args.source, path = %path.display(), "Calibration stored");
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

fn transform(args: TransformArgs) -> Result<()> {
    let store = CalibrationStore::new(&args.calibration_dir);
    let mut transformer = CoordinateTransformer::new();
    store
        .load_into(&args.source, &mut transformer)
        .with_context(|| format!("no usable calibration for {}", args.source))?;

    let mapped = transformer.transform_many(&args.points, !args.no_extrapolation);
    for (pixel, court) in args.points.iter().zip(mapped) {
        match court {
            Some(court) => println!("{:.1},{:.1} -> {:.3},{:.3}", pixel.x, pixel.y, court.x, court.y),
            None => println!("{:.1},{:.1} -> outside calibrated area", pixel.x, pixel.y),
        }
    }
    Ok(())
}
