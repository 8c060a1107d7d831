//! Pipeline Runtime - Drives detections through to subscribers.
//!
//! This module is the integration layer between the external detector, the
//! pure components (homography, colors) and the shared broadcast state.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    PipelineOrchestrator                      │
//! │                                                              │
//! │   Detector ──► validate ──► ┌──────────┐ ┌───────────────┐    │
//! │  (external)                 │  SPACE   │ │    COLORS     │    │
//! │                             │transform │ │ track → RGB   │    │
//! │                             └────┬─────┘ └──────┬────────┘    │
//! │                                  └──► FrameEntry ◄┘           │
//! │                                         │                     │
//! │                     1. history.append ──┤                     │
//! │                     2. hub.publish ─────┘                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # State machine
//!
//! `Idle → Running → Stopped`. The run ends on end-of-input or a fatal
//! source error. A bad frame is logged and dropped; it does not consume a
//! sequence id, so subscribers see contiguous ids.

use crate::broadcast_hub::BroadcastHub;
use crate::calibration::CoordinateTransformer;
use crate::detection::{DetectionBatch, Detector, DetectorError, ProcessingError};
use crate::frame::{ground_point, BoundingBox, DetectedEntity, FrameEntry};
use crate::identity_colors::IdentityColorCache;
use courtview_env::CourtViewContext;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Logical name (for logging)
    pub name: String,

    /// Pause after every frame (default: 1ms). Set to the source frame
    /// period to replay recordings in real time.
    pub frame_interval: Duration,

    /// Map ground points that fall outside the calibration area
    /// (default: true)
    pub allow_extrapolation: bool,

    /// Emit a progress line every N frames (default: 300)
    pub progress_log_every: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "courtview-pipeline".to_string(),
            frame_interval: Duration::from_millis(1),
            allow_extrapolation: true,
            progress_log_every: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    Running,
    /// Terminal
    Stopped,
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    SourceExhausted,
    SourceFatalError(String),
}

/// Result of one loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// An entry with this sequence id was buffered and published
    Emitted(u64),
    /// The frame was dropped
    Skipped(ProcessingError),
    /// End of input
    Exhausted,
    /// The source cannot continue
    Fatal(String),
}

/// Snapshot of the pipeline, published on a watch channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub frames_emitted: u64,
    pub frames_skipped: u64,
    pub last_sequence_id: Option<u64>,
    pub stop_reason: Option<StopReason>,
}

/// The sequential production loop.
///
/// Generic over the context and detector so the same loop runs against
/// tokio and a recorded file, or a virtual clock and a scripted source.
pub struct PipelineOrchestrator<Ctx, D>
where
    Ctx: CourtViewContext,
    D: Detector,
{
    context: Arc<Ctx>,
    detector: D,
    transformer: Arc<CoordinateTransformer>,
    colors: Arc<IdentityColorCache>,
    hub: Arc<BroadcastHub>,
    config: PipelineConfig,
    next_sequence_id: u64,
    status: watch::Sender<PipelineStatus>,
}

impl<Ctx, D> PipelineOrchestrator<Ctx, D>
where
    Ctx: CourtViewContext,
    D: Detector,
{
    pub fn new(
        context: Arc<Ctx>,
        detector: D,
        transformer: Arc<CoordinateTransformer>,
        colors: Arc<IdentityColorCache>,
        hub: Arc<BroadcastHub>,
        config: PipelineConfig,
    ) -> Self {
        let (status, _) = watch::channel(PipelineStatus::default());

        Self {
            context,
            detector,
            transformer,
            colors,
            hub,
            config,
            next_sequence_id: 1,
            status,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.status.borrow().state
    }

    pub fn status(&self) -> PipelineStatus {
        self.status.borrow().clone()
    }

    /// Receiver that follows state changes and counters.
    pub fn watch_status(&self) -> watch::Receiver<PipelineStatus> {
        self.status.subscribe()
    }

    /// Turns one detector batch into a frame entry carrying the next
    /// sequence id. Does not consume the id.
    pub fn build_entry(&self, batch: &DetectionBatch) -> Result<FrameEntry, ProcessingError> {
        batch.validate()?;

        let detections = batch
            .detections
            .iter()
            .map(|raw| {
                let color = match raw.track_id {
                    Some(track_id) => self.colors.color_for(track_id),
                    None => self.colors.fresh_color(),
                };
                let ground = ground_point(&raw.bbox);

                DetectedEntity {
                    track_id: raw.track_id,
                    bbox: BoundingBox::from_f64(raw.bbox),
                    confidence: raw.confidence,
                    ground_point: ground,
                    transformed_ground_point: self
                        .transformer
                        .transform(ground, self.config.allow_extrapolation),
                    color,
                }
            })
            .collect();

        Ok(FrameEntry::new(
            self.next_sequence_id,
            batch.frame_index,
            self.context.system_time(),
            detections,
        ))
    }

    /// Runs one iteration: pull, process, append, publish.
    ///
    /// The first call moves the pipeline to `Running`. End of input or a
    /// fatal source error moves it to `Stopped`, after which every call
    /// returns `Exhausted` without touching the detector.
    pub async fn step(&mut self) -> PipelineOutcome {
        match self.state() {
            PipelineState::Stopped => return PipelineOutcome::Exhausted,
            PipelineState::Idle => self.start(),
            PipelineState::Running => {}
        }

        let batch = match self.detector.next_batch().await {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                self.stop(StopReason::SourceExhausted);
                return PipelineOutcome::Exhausted;
            }
            Err(DetectorError::Fatal(reason)) => {
                error!(pipeline = %self.config.name, %reason, "Source failed, stopping production");
                self.stop(StopReason::SourceFatalError(reason.clone()));
                return PipelineOutcome::Fatal(reason);
            }
            Err(DetectorError::Frame { frame_index, reason }) => {
                let err = ProcessingError::Source(reason);
                self.record_skip(frame_index, &err);
                return PipelineOutcome::Skipped(err);
            }
        };

        let entry = match self.build_entry(&batch) {
            Ok(entry) => entry,
            Err(err) => {
                self.record_skip(Some(batch.frame_index), &err);
                return PipelineOutcome::Skipped(err);
            }
        };

        let sequence_id = entry.sequence_id;
        self.next_sequence_id += 1;

        // Append before publish: a subscriber joining in between finds the
        // entry in its replay and the hub skips it on publish
        let entry = self.hub.history().append(entry);
        self.hub.publish(&entry);

        self.status.send_modify(|s| {
            s.frames_emitted += 1;
            s.last_sequence_id = Some(sequence_id);
        });

        if self.config.progress_log_every > 0 && sequence_id % self.config.progress_log_every == 0 {
            debug!(
                pipeline = %self.config.name,
                seq = sequence_id,
                frame = entry.frame_index,
                detections = entry.detections.len(),
                placed = entry.placed_count(),
                subscribers = self.hub.subscriber_count(),
                "Progress"
            );
        }

        PipelineOutcome::Emitted(sequence_id)
    }

    fn record_skip(&self, frame_index: Option<u64>, err: &ProcessingError) {
        warn!(pipeline = %self.config.name, frame = ?frame_index, error = %err, "Skipping frame");
        self.status.send_modify(|s| s.frames_skipped += 1);
    }

    fn start(&self) {
        info!(
            pipeline = %self.config.name,
            source = %self.detector.describe(),
            calibrated = self.transformer.is_ready(),
            capacity = self.hub.history().capacity(),
            "Starting pipeline"
        );
        self.transition(PipelineState::Running, None);
    }

    fn stop(&self, reason: StopReason) {
        self.transition(PipelineState::Stopped, Some(reason));
        let status = self.status();
        info!(
            pipeline = %self.config.name,
            emitted = status.frames_emitted,
            skipped = status.frames_skipped,
            "Pipeline stopped"
        );
    }

    fn transition(&self, state: PipelineState, stop_reason: Option<StopReason>) {
        info!(pipeline = %self.config.name, ?state, "Pipeline state changed");
        self.status.send_modify(|s| {
            s.state = state;
            if stop_reason.is_some() {
                s.stop_reason = stop_reason;
            }
        });
    }

    /// Runs until the source ends or fails, then returns the final status.
    ///
    /// Picks up where earlier `step` calls left off. Subscribers and the
    /// buffered history outlive the run.
    pub async fn run(mut self) -> PipelineStatus {
        loop {
            match self.step().await {
                PipelineOutcome::Emitted(_) | PipelineOutcome::Skipped(_) => {
                    self.context.sleep(self.config.frame_interval).await;
                }
                PipelineOutcome::Exhausted | PipelineOutcome::Fatal(_) => break,
            }
        }
        self.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::TargetShape;
    use crate::detection::RawDetection;
    use crate::frame_history::FrameHistoryBuffer;
    use crate::broadcast_hub::HubConfig;
    use async_trait::async_trait;
    use courtview_env::TokioContext;
    use nalgebra::Point2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::VecDeque;

    struct ListDetector {
        outcomes: VecDeque<Result<Option<DetectionBatch>, DetectorError>>,
    }

    impl ListDetector {
        fn new(outcomes: Vec<Result<Option<DetectionBatch>, DetectorError>>) -> Self {
            Self { outcomes: outcomes.into() }
        }
    }

    #[async_trait]
    impl Detector for ListDetector {
        async fn next_batch(&mut self) -> Result<Option<DetectionBatch>, DetectorError> {
            self.outcomes.pop_front().unwrap_or(Ok(None))
        }
    }

    fn player(track_id: u64, x: f64) -> RawDetection {
        RawDetection::new([x, 300.0, x + 40.0, 420.0], 0.9, Some(track_id))
    }

    fn frame(index: u64, detections: Vec<RawDetection>) -> Result<Option<DetectionBatch>, DetectorError> {
        Ok(Some(DetectionBatch::new(index, detections)))
    }

    fn calibrated() -> CoordinateTransformer {
        let mut transformer = CoordinateTransformer::new();
        transformer
            .calibrate(
                &[
                    Point2::new(400.0, 200.0),
                    Point2::new(880.0, 200.0),
                    Point2::new(1150.0, 680.0),
                    Point2::new(130.0, 680.0),
                ],
                TargetShape::default(),
            )
            .unwrap();
        transformer
    }

    fn pipeline(
        transformer: CoordinateTransformer,
        outcomes: Vec<Result<Option<DetectionBatch>, DetectorError>>,
    ) -> (PipelineOrchestrator<TokioContext, ListDetector>, Arc<BroadcastHub>, Arc<IdentityColorCache>) {
        let hub = BroadcastHub::shared(Arc::new(FrameHistoryBuffer::new(10)), HubConfig::default());
        let colors = Arc::new(IdentityColorCache::new(ChaCha8Rng::seed_from_u64(7)));
        let config = PipelineConfig {
            frame_interval: Duration::ZERO,
            ..PipelineConfig::default()
        };
        let orchestrator = PipelineOrchestrator::new(
            TokioContext::shared(),
            ListDetector::new(outcomes),
            Arc::new(transformer),
            Arc::clone(&colors),
            Arc::clone(&hub),
            config,
        );
        (orchestrator, hub, colors)
    }

    fn buffered(hub: &BroadcastHub) -> Vec<(u64, u64)> {
        hub.history()
            .snapshot()
            .iter()
            .map(|e| (e.sequence_id, e.frame_index))
            .collect()
    }

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.frame_interval, Duration::from_millis(1));
        assert!(config.allow_extrapolation);
        assert_eq!(config.progress_log_every, 300);
    }

    #[tokio::test]
    async fn test_run_to_exhaustion() {
        let (orchestrator, hub, _) = pipeline(
            calibrated(),
            vec![frame(1, vec![player(1, 600.0)]), frame(2, vec![]), frame(3, vec![player(1, 610.0)])],
        );
        assert_eq!(orchestrator.state(), PipelineState::Idle);

        let status = orchestrator.run().await;

        assert_eq!(status.state, PipelineState::Stopped);
        assert_eq!(status.stop_reason, Some(StopReason::SourceExhausted));
        assert_eq!(status.frames_emitted, 3);
        assert_eq!(status.last_sequence_id, Some(3));
        assert_eq!(buffered(&hub), vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[tokio::test]
    async fn test_bad_frames_do_not_consume_sequence_ids() {
        let inverted = RawDetection::new([50.0, 50.0, 10.0, 10.0], 0.5, Some(2));
        let (orchestrator, hub, _) = pipeline(
            calibrated(),
            vec![
                frame(10, vec![player(1, 600.0)]),
                frame(11, vec![inverted]),
                Err(DetectorError::frame(Some(12), "decode error")),
                frame(13, vec![player(1, 620.0)]),
            ],
        );

        let status = orchestrator.run().await;

        assert_eq!(status.frames_emitted, 2);
        assert_eq!(status.frames_skipped, 2);
        assert_eq!(buffered(&hub), vec![(1, 10), (2, 13)]);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_and_keeps_history() {
        let (orchestrator, hub, _) = pipeline(
            calibrated(),
            vec![
                frame(1, vec![player(1, 600.0)]),
                Err(DetectorError::fatal("camera unplugged")),
                frame(2, vec![player(1, 600.0)]),
            ],
        );

        let status = orchestrator.run().await;

        assert_eq!(
            status.stop_reason,
            Some(StopReason::SourceFatalError("camera unplugged".to_string()))
        );
        assert_eq!(buffered(&hub), vec![(1, 1)]);
    }

    #[tokio::test]
    async fn test_colors_follow_track_ids() {
        let (orchestrator, hub, colors) = pipeline(
            calibrated(),
            vec![
                frame(1, vec![player(5, 500.0), player(6, 700.0)]),
                frame(2, vec![player(6, 710.0)]),
                frame(3, vec![player(5, 520.0)]),
            ],
        );
        orchestrator.run().await;

        let history = hub.history().snapshot();
        let first_five = history[0].detections[0].color;
        assert_eq!(history[2].detections[0].color, first_five);
        assert_eq!(history[1].detections[0].color, history[0].detections[1].color);
        assert_eq!(colors.len(), 2);
    }

    #[tokio::test]
    async fn test_ground_points_are_transformed_when_calibrated() {
        let (orchestrator, hub, _) = pipeline(calibrated(), vec![frame(1, vec![player(1, 600.0)])]);
        orchestrator.run().await;

        let entry = &hub.history().snapshot()[0];
        let detection = &entry.detections[0];
        assert_eq!(detection.ground_point, Point2::new(620.0, 420.0));
        let court = detection.transformed_ground_point.unwrap();
        assert!(court.x > 0.0 && court.x < 9.0);
        assert!(court.y > 0.0 && court.y < 18.0);
    }

    #[tokio::test]
    async fn test_uncalibrated_pipeline_still_emits() {
        let (orchestrator, hub, _) = pipeline(CoordinateTransformer::new(), vec![frame(1, vec![player(1, 600.0)])]);
        orchestrator.run().await;

        let entry = &hub.history().snapshot()[0];
        assert!(entry.detections[0].transformed_ground_point.is_none());
    }

    #[tokio::test]
    async fn test_untracked_detections_are_not_cached() {
        let untracked = RawDetection::new([600.0, 300.0, 640.0, 420.0], 0.7, None);
        let (orchestrator, _, colors) = pipeline(calibrated(), vec![frame(1, vec![untracked])]);
        orchestrator.run().await;
        assert!(colors.is_empty());
    }

    #[tokio::test]
    async fn test_status_watch_reports_stop() {
        let (orchestrator, _, _) = pipeline(calibrated(), vec![frame(1, vec![])]);
        let watch = orchestrator.watch_status();
        assert_eq!(watch.borrow().state, PipelineState::Idle);

        let handle = tokio::spawn(orchestrator.run());
        handle.await.unwrap();

        assert_eq!(watch.borrow().state, PipelineState::Stopped);
        assert_eq!(watch.borrow().frames_emitted, 1);
    }

    #[tokio::test]
    async fn test_step_moves_through_states() {
        let (mut orchestrator, _, _) = pipeline(calibrated(), vec![frame(1, vec![])]);
        assert_eq!(orchestrator.state(), PipelineState::Idle);

        assert_eq!(orchestrator.step().await, PipelineOutcome::Emitted(1));
        assert_eq!(orchestrator.state(), PipelineState::Running);

        assert_eq!(orchestrator.step().await, PipelineOutcome::Exhausted);
        assert_eq!(orchestrator.state(), PipelineState::Stopped);
        assert_eq!(orchestrator.status().stop_reason, Some(StopReason::SourceExhausted));
    }

    #[tokio::test]
    async fn test_stopped_is_terminal_after_fatal_step() {
        let (mut orchestrator, hub, _) = pipeline(
            calibrated(),
            vec![
                frame(1, vec![player(1, 600.0)]),
                Err(DetectorError::fatal("gone")),
                frame(2, vec![player(1, 610.0)]),
            ],
        );

        assert_eq!(orchestrator.step().await, PipelineOutcome::Emitted(1));
        assert_eq!(orchestrator.step().await, PipelineOutcome::Fatal("gone".to_string()));
        assert_eq!(orchestrator.state(), PipelineState::Stopped);

        // The detector still has a frame queued, but nothing more is pulled
        assert_eq!(orchestrator.step().await, PipelineOutcome::Exhausted);
        assert_eq!(buffered(&hub), vec![(1, 1)]);
        assert_eq!(orchestrator.detector.outcomes.len(), 1);

        let status = orchestrator.run().await;
        assert_eq!(status.stop_reason, Some(StopReason::SourceFatalError("gone".to_string())));
        assert_eq!(status.frames_emitted, 1);
    }

    #[tokio::test]
    async fn test_run_continues_after_manual_steps() {
        let (mut orchestrator, hub, _) = pipeline(calibrated(), vec![frame(1, vec![]), frame(2, vec![])]);
        orchestrator.step().await;

        let status = orchestrator.run().await;
        assert_eq!(status.state, PipelineState::Stopped);
        assert_eq!(buffered(&hub), vec![(1, 1), (2, 2)]);
    }
}
