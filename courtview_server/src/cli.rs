//! Command line interface.

use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand};
use courtview_core::TargetShape;
use nalgebra::Point2;
use std::path::PathBuf;

/// Upper bound for `--buffer-size` and `--queue-depth`.
pub const MAX_FRAMES_QUEUED: u64 = 100_000;

/// Accepted `--fps` range.
pub const FPS_RANGE: std::ops::RangeInclusive<f64> = 0.1..=1000.0;

/// CourtView - court-space player positions, broadcast live
#[derive(Parser, Debug)]
#[command(name = "courtview", version)]
#[command(about = "Map tracked players onto the court and stream them to viewers", long_about = None)]
pub struct Cli {
    /// Verbose output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the pipeline and the websocket broadcast server
    Serve(ServeArgs),

    /// Compute and store a calibration from four picked corners
    Calibrate(CalibrateArgs),

    /// Map pixel points through a stored calibration
    Transform(TransformArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind
    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Frames kept for replay to new viewers
    #[arg(long, default_value_t = 60, value_parser = frame_count())]
    pub buffer_size: usize,

    /// Video/camera name; selects the calibration file
    #[arg(long, default_value = "test.mp4")]
    pub source: String,

    #[arg(long, default_value = "calibration")]
    pub calibration_dir: PathBuf,

    /// Recorded tracker output (JSON lines, one frame per line)
    #[arg(long)]
    pub detections: PathBuf,

    /// Replay at this frame rate instead of as fast as possible
    #[arg(long, value_parser = parse_fps)]
    pub fps: Option<f64>,

    /// Drop court positions for players outside the calibrated area
    #[arg(long)]
    pub no_extrapolation: bool,

    /// Live frames a viewer may fall behind by before it is dropped
    #[arg(long, default_value_t = 256, value_parser = frame_count())]
    pub queue_depth: usize,
}

#[derive(Args, Debug, Clone)]
pub struct CalibrateArgs {
    /// Video/camera name; selects the calibration file
    #[arg(long, default_value = "test.mp4")]
    pub source: String,

    /// Court corner in pixels as `x,y`: top-left, top-right, bottom-right, bottom-left
    #[arg(long = "point", value_parser = parse_point, num_args = 1, required = true)]
    pub points: Vec<Point2<f64>>,

    /// Short side of the court in meters
    #[arg(long, default_value_t = 9.0)]
    pub width: f64,

    /// Long side of the court in meters
    #[arg(long, default_value_t = 18.0)]
    pub length: f64,

    /// Camera looks across the court instead of along it
    #[arg(long)]
    pub horizontal: bool,

    #[arg(long, default_value = "calibration")]
    pub calibration_dir: PathBuf,
}

impl CalibrateArgs {
    pub fn shape(&self) -> TargetShape {
        TargetShape {
            width: self.width,
            length: self.length,
            vertical: !self.horizontal,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct TransformArgs {
    #[arg(long, default_value = "test.mp4")]
    pub source: String,

    #[arg(long, default_value = "calibration")]
    pub calibration_dir: PathBuf,

    /// Pixel point as `x,y`; repeat for several
    #[arg(long = "point", value_parser = parse_point, num_args = 1, required = true)]
    pub points: Vec<Point2<f64>>,

    /// Report points outside the calibrated area as unmapped
    #[arg(long)]
    pub no_extrapolation: bool,
}

/// Parses `x,y` into a point.
pub fn parse_point(raw: &str) -> Result<Point2<f64>, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{raw}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("'{}': {e}", v.trim()))
    };
    Ok(Point2::new(parse(x)?, parse(y)?))
}

fn frame_count() -> RangedU64ValueParser<usize> {
    RangedU64ValueParser::new().range(1..=MAX_FRAMES_QUEUED)
}

pub fn parse_fps(raw: &str) -> Result<f64, String> {
    let fps: f64 = raw.trim().parse().map_err(|e| format!("'{raw}': {e}"))?;
    if !FPS_RANGE.contains(&fps) {
        return Err(format!(
            "{fps} is outside {}..={}",
            FPS_RANGE.start(),
            FPS_RANGE.end()
        ));
    }
    Ok(fps)
}
