//! Simulated detector sources.

use crate::oracle::Oracle;
use async_trait::async_trait;
use courtview_core::{Calibration, DetectionBatch, Detector, DetectorError, RawDetection, TrackId};
use nalgebra::Point2;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

/// Where every player really was when each synthetic frame was taken.
///
/// Cloning shares the log, so a handle taken before the detector is moved
/// into a pipeline keeps seeing new frames.
#[derive(Debug, Clone, Default)]
pub struct GroundTruthLog {
    frames: Arc<Mutex<BTreeMap<u64, Vec<(TrackId, Point2<f64>)>>>>,
}

impl GroundTruthLog {
    fn record(&self, frame_index: u64, positions: Vec<(TrackId, Point2<f64>)>) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(frame_index, positions);
    }
    
    /// True court position of `track_id` in the given frame.
    pub fn position(&self, frame_index: u64, track_id: TrackId) -> Option<Point2<f64>> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&frame_index)?
            .iter()
            .find(|(id, _)| *id == track_id)
            .map(|(_, p)| *p)
    }
    
    pub fn len(&self) -> usize {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Detects the Oracle's players, one frame per call.
pub struct SyntheticDetector {
    oracle: Oracle,
    calibration: Calibration,
    
    /// Seconds of match time per frame
    dt: f64,
    
    total_frames: u64,
    frame_index: u64,
    
    /// The source fails fatally when this frame is requested
    outage_at: Option<u64>,
    
    truth: GroundTruthLog,
}

impl SyntheticDetector {
    /// Creates a detector that yields `total_frames` frames at `fps`.
    pub fn new(oracle: Oracle, calibration: Calibration, fps: f64, total_frames: u64) -> Self {
        Self {
            oracle,
            calibration,
            dt: if fps > 0.0 { 1.0 / fps } else { 1.0 / 30.0 },
            total_frames,
            frame_index: 0,
            outage_at: None,
            truth: GroundTruthLog::default(),
        }
    }
    
    /// Makes the source fail fatally at the given frame.
    pub fn with_outage_at(mut self, frame_index: u64) -> Self {
        self.outage_at = Some(frame_index);
        self
    }
    
    pub fn oracle(&self) -> &Oracle {
        &self.oracle
    }
    
    /// Shared handle to the per-frame ground truth.
    pub fn truth_log(&self) -> GroundTruthLog {
        self.truth.clone()
    }
    
    pub fn frames_produced(&self) -> u64 {
        self.frame_index
    }
}

#[async_trait]
impl Detector for SyntheticDetector {
    async fn next_batch(&mut self) -> Result<Option<DetectionBatch>, DetectorError> {
        if self.frame_index >= self.total_frames {
            return Ok(None);
        }
        
        let frame_index = self.frame_index + 1;
        if self.outage_at == Some(frame_index) {
            return Err(DetectorError::fatal(format!("camera lost at frame {frame_index}")));
        }
        self.frame_index = frame_index;
        
        self.oracle.step(self.dt);
        let batch = self
            .oracle
            .observe(&self.calibration, frame_index)
            .ok_or_else(|| DetectorError::fatal("calibration homography is not invertible"))?;
        self.truth.record(frame_index, self.oracle.ground_truth());
        Ok(Some(batch))
    }
    
    fn describe(&self) -> String {
        format!("synthetic:{} players", self.oracle.players().len())
    }
}

/// Replays a fixed list of detector outcomes, then reports end of input.
#[derive(Default)]
pub struct ScriptedDetector {
    outcomes: VecDeque<Result<Option<DetectionBatch>, DetectorError>>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Queues a frame.
    pub fn batch(mut self, frame_index: u64, detections: Vec<RawDetection>) -> Self {
        self.outcomes
            .push_back(Ok(Some(DetectionBatch::new(frame_index, detections))));
        self
    }
    
    /// Queues `count` empty frames, numbered from `first_index`.
    pub fn empty_frames(mut self, first_index: u64, count: u64) -> Self {
        for i in 0..count {
            self.outcomes
                .push_back(Ok(Some(DetectionBatch::empty(first_index + i))));
        }
        self
    }
    
    /// Queues a recoverable per-frame failure.
    pub fn frame_error(mut self, frame_index: u64, reason: &str) -> Self {
        self.outcomes
            .push_back(Err(DetectorError::frame(Some(frame_index), reason)));
        self
    }
    
    /// Queues a fatal source failure.
    pub fn fatal(mut self, reason: &str) -> Self {
        self.outcomes.push_back(Err(DetectorError::fatal(reason)));
        self
    }
    
    pub fn remaining(&self) -> usize {
        self.outcomes.len()
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn next_batch(&mut self) -> Result<Option<DetectionBatch>, DetectorError> {
        self.outcomes.pop_front().unwrap_or(Ok(None))
    }
    
    fn describe(&self) -> String {
        format!("scripted:{} outcomes", self.outcomes.len())
    }
}
