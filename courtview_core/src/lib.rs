//! CourtView Core - Court-Space Player Tracking Broadcast
//!
//! This library turns per-frame detector output into court-space positions
//! and streams them to any number of live viewers:
//! 1. **Space**: 4-point planar homography from image pixels to court meters
//! 2. **Identity**: Stable display colors per tracker identity
//! 3. **Broadcast**: Bounded history with gap-free replay-then-live fan-out

pub mod broadcast_hub;
pub mod calibration;
pub mod detection;
pub mod frame;
pub mod frame_history;
pub mod identity_colors;
pub mod pipeline;

// Re-export key types for convenience
pub use broadcast_hub::{BroadcastHub, HubConfig, HubStats, SubscriberPump};
pub use calibration::{
    perspective_transform, Calibration, CalibrationData, CalibrationError, CalibrationState,
    CalibrationStore, CoordinateTransformer, TargetShape,
};
pub use detection::{DetectionBatch, Detector, DetectorError, ProcessingError, RawDetection, ReplayDetector};
pub use frame::{ground_point, BoundingBox, DetectedEntity, FrameEntry, TrackId};
pub use frame_history::FrameHistoryBuffer;
pub use identity_colors::{IdentityColorCache, Rgb};
pub use pipeline::{
    PipelineConfig, PipelineOrchestrator, PipelineOutcome, PipelineState, PipelineStatus, StopReason,
};
