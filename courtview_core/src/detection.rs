//! The consumed detector interface and a file-backed replay source.
//!
//! Detection and tracking happen outside this crate. Whatever runs the
//! model hands over one [`DetectionBatch`] per input frame: boxes,
//! confidences and (optionally) persistent track ids.

use crate::frame::TrackId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

/// One raw detection as produced by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// `[x1, y1, x2, y2]` in pixels
    pub bbox: [f64; 4],

    /// Detector confidence in [0, 1]
    pub confidence: f64,

    /// Tracker identity, absent when tracking was not requested
    #[serde(default)]
    pub track_id: Option<TrackId>,
}

impl RawDetection {
    pub fn new(bbox: [f64; 4], confidence: f64, track_id: Option<TrackId>) -> Self {
        Self {
            bbox,
            confidence,
            track_id,
        }
    }

    /// Checks the payload before anything is derived from it.
    pub fn validate(&self, index: usize) -> Result<(), ProcessingError> {
        if self.bbox.iter().any(|v| !v.is_finite()) {
            return Err(ProcessingError::NonFiniteBox { index });
        }
        let [x1, y1, x2, y2] = self.bbox;
        if x1 > x2 || y1 > y2 {
            return Err(ProcessingError::InvertedBox { index });
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ProcessingError::Confidence {
                index,
                confidence: self.confidence,
            });
        }
        Ok(())
    }
}

/// Everything the detector found in one input frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    /// Position of the frame in the source
    pub frame_index: u64,

    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

impl DetectionBatch {
    pub fn new(frame_index: u64, detections: Vec<RawDetection>) -> Self {
        Self {
            frame_index,
            detections,
        }
    }

    pub fn empty(frame_index: u64) -> Self {
        Self::new(frame_index, Vec::new())
    }

    /// Validates every detection and track id uniqueness within the frame.
    pub fn validate(&self) -> Result<(), ProcessingError> {
        let mut seen = HashSet::new();
        for (index, detection) in self.detections.iter().enumerate() {
            detection.validate(index)?;
            if let Some(track_id) = detection.track_id {
                if !seen.insert(track_id) {
                    return Err(ProcessingError::DuplicateTrack(track_id));
                }
            }
        }
        Ok(())
    }
}

/// Per-frame problems. The frame is dropped and the pipeline carries on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessingError {
    #[error("detection {index}: non-finite bounding box")]
    NonFiniteBox { index: usize },

    #[error("detection {index}: inverted bounding box")]
    InvertedBox { index: usize },

    #[error("detection {index}: confidence {confidence} outside [0, 1]")]
    Confidence { index: usize, confidence: f64 },

    #[error("track {0} appears twice in one frame")]
    DuplicateTrack(TrackId),

    /// The detector reported a bad frame
    #[error("detector rejected frame: {0}")]
    Source(String),
}

/// Errors surfaced by a [`Detector`].
#[derive(Debug, Error)]
pub enum DetectorError {
    /// One frame could not be processed; the source is still usable
    #[error("bad frame: {reason}")]
    Frame {
        frame_index: Option<u64>,
        reason: String,
    },

    /// The source cannot produce any further input
    #[error("source failed: {0}")]
    Fatal(String),
}

impl DetectorError {
    pub fn frame(frame_index: Option<u64>, reason: impl Into<String>) -> Self {
        Self::Frame {
            frame_index,
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }
}

/// The external detector/tracker, one call per input frame.
///
/// # Returns
/// * `Ok(Some(batch))` - The next frame's detections (possibly empty)
/// * `Ok(None)` - End of input
/// * `Err(DetectorError::Frame)` - This frame is unusable, try the next
/// * `Err(DetectorError::Fatal)` - No further input can be read
///
/// Implementations that do blocking work (model inference, decoding) should
/// move it off the async runtime with `spawn_blocking`.
#[async_trait]
pub trait Detector: Send + 'static {
    async fn next_batch(&mut self) -> Result<Option<DetectionBatch>, DetectorError>;

    /// Short description for logs.
    fn describe(&self) -> String {
        "detector".to_string()
    }
}

/// Replays tracker output recorded as JSON lines.
///
/// ```text
/// {"frame_index": 1, "detections": [{"bbox": [412, 250, 470, 390], "confidence": 0.91, "track_id": 3}]}
/// {"frame_index": 2, "detections": []}
/// ```
///
/// Blank lines are skipped. A line that does not parse (or is not UTF-8)
/// is a bad frame; any other read error is fatal.
pub struct ReplayDetector {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_number: u64,
}

impl ReplayDetector {
    /// Opens a recording.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DetectorError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|e| DetectorError::fatal(format!("cannot open {}: {e}", path.display())))?;

        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line_number: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Detector for ReplayDetector {
    async fn next_batch(&mut self) -> Result<Option<DetectionBatch>, DetectorError> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(line) => line,
                // The undecodable line has been consumed; the reader carries on
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    self.line_number += 1;
                    return Err(DetectorError::frame(None, format!("line {}: {e}", self.line_number)));
                }
                Err(e) => return Err(DetectorError::fatal(format!("{}: {e}", self.path.display()))),
            };

            let Some(line) = line else {
                return Ok(None);
            };
            self.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            return serde_json::from_str(&line).map(Some).map_err(|e| {
                DetectorError::frame(None, format!("line {}: {e}", self.line_number))
            });
        }
    }

    fn describe(&self) -> String {
        format!("replay:{}", self.path.display())
    }
}
