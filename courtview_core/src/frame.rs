//! Per-frame result entries - the unit that is buffered and broadcast.

use crate::identity_colors::Rgb;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Persistent identity assigned by the external tracker.
pub type TrackId = u64;

/// Integer pixel box, serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Truncates float detector coordinates to whole pixels.
    pub fn from_f64(coords: [f64; 4]) -> Self {
        Self {
            x1: coords[0] as i32,
            y1: coords[1] as i32,
            x2: coords[2] as i32,
            y2: coords[3] as i32,
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [i32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Bottom-center of a box: where the entity touches the ground.
pub fn ground_point(coords: &[f64; 4]) -> Point2<f64> {
    Point2::new((coords[0] + coords[2]) / 2.0, coords[3])
}

/// One detected entity inside a frame entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedEntity {
    /// Tracker identity (absent when tracking was not requested)
    pub track_id: Option<TrackId>,

    /// Pixel box
    pub bbox: BoundingBox,

    /// Detector confidence in [0, 1]
    pub confidence: f64,

    /// Pixel-space anchor (bottom-center of the box)
    pub ground_point: Point2<f64>,

    /// `ground_point` in court space; `None` when uncalibrated or outside
    /// the calibration area with extrapolation disabled
    pub transformed_ground_point: Option<Point2<f64>>,

    /// Stable display color for the track
    pub color: Rgb,
}

/// One processed input frame.
///
/// Entries are wrapped in `Arc` as soon as they enter the history buffer
/// and are never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEntry {
    /// Strictly increasing per pipeline run, starting at 1
    pub sequence_id: u64,

    /// The detector's own frame position
    pub frame_index: u64,

    /// Production wall-clock time (Unix seconds)
    pub timestamp: f64,

    /// Detections in detector order
    pub detections: Vec<DetectedEntity>,
}

impl FrameEntry {
    pub fn new(sequence_id: u64, frame_index: u64, produced_at: SystemTime, detections: Vec<DetectedEntity>) -> Self {
        let timestamp = produced_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        Self {
            sequence_id,
            frame_index,
            timestamp,
            detections,
        }
    }

    /// Number of detections that landed in court space.
    pub fn placed_count(&self) -> usize {
        self.detections
            .iter()
            .filter(|d| d.transformed_ground_point.is_some())
            .count()
    }
}
