//! SimWorld - The simulation harness container.

use crate::context::SimContext;
use crate::oracle::Oracle;
use crate::sink::{sim_subscriber, SimSinkController};

use courtview_core::{
    BroadcastHub, Calibration, CalibrationError, CoordinateTransformer, Detector, FrameHistoryBuffer,
    HubConfig, IdentityColorCache, PipelineConfig, PipelineOrchestrator, TargetShape,
};
use courtview_env::{CourtViewContext, SubscriberId};
use nalgebra::Point2;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// RNG stream reserved for track colors.
const COLOR_STREAM: u64 = 1;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,
    
    /// History buffer capacity
    pub buffer_capacity: usize,
    
    /// Live queue depth per subscriber
    pub queue_depth: usize,
    
    /// Source frame rate; also the pipeline's frame interval
    pub fps: f64,
    
    /// Court dimensions
    pub shape: TargetShape,
    
    /// Pixel corners of the court, or `None` to run uncalibrated
    pub court_corners: Option<[Point2<f64>; 4]>,
    
    /// Pixel noise standard deviation for synthetic detections
    pub pixel_noise_std: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            buffer_capacity: 60,
            queue_depth: 256,
            fps: 30.0,
            shape: TargetShape::default(),
            // A 1280x720 broadcast view from behind the baseline
            court_corners: Some([
                Point2::new(400.0, 200.0),
                Point2::new(880.0, 200.0),
                Point2::new(1150.0, 680.0),
                Point2::new(130.0, 680.0),
            ]),
            pixel_noise_std: 1.5,
        }
    }
}

/// The SimWorld - container for one pipeline and its subscribers.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,
    
    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,
    
    transformer: Arc<CoordinateTransformer>,
    colors: Arc<IdentityColorCache>,
    hub: Arc<BroadcastHub>,
}

impl SimWorld {
    /// Creates a new simulation world.
    pub fn new(config: SimConfig) -> Result<Self, CalibrationError> {
        let context = SimContext::shared(config.seed);
        
        let mut transformer = CoordinateTransformer::new();
        if let Some(corners) = &config.court_corners {
            transformer.calibrate(corners, config.shape)?;
        }
        
        let history = Arc::new(FrameHistoryBuffer::new(config.buffer_capacity));
        let hub = BroadcastHub::shared(
            history,
            HubConfig {
                subscriber_queue_depth: config.queue_depth,
            },
        );
        let colors = Arc::new(IdentityColorCache::new(context.derive_rng(COLOR_STREAM)));
        
        Ok(Self {
            config,
            context,
            transformer: Arc::new(transformer),
            colors,
            hub,
        })
    }
    
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }
    
    pub fn transformer(&self) -> &Arc<CoordinateTransformer> {
        &self.transformer
    }
    
    pub fn colors(&self) -> &Arc<IdentityColorCache> {
        &self.colors
    }
    
    pub fn calibration(&self) -> Option<&Calibration> {
        self.transformer.calibration()
    }
    
    /// Creates an Oracle for this world's court.
    ///
    /// The physics seed is derived separately from the context seed so that
    /// changing subscriber behavior doesn't affect player trajectories.
    pub fn oracle(&self) -> Oracle {
        let physics_seed = self.config.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let mut oracle = Oracle::new(physics_seed, self.config.shape);
        oracle.set_pixel_noise(self.config.pixel_noise_std);
        oracle
    }
    
    /// Connects a simulated subscriber and starts its pump.
    pub fn subscribe(&self, label: &str) -> (SubscriberId, SimSinkController) {
        self.subscribe_with(label, |_| {})
    }
    
    /// Like [`subscribe`](Self::subscribe), but lets the caller arm faults
    /// on the connection before the backlog replay starts.
    pub fn subscribe_with(
        &self,
        label: &str,
        arm: impl FnOnce(&SimSinkController),
    ) -> (SubscriberId, SimSinkController) {
        let (sink, controller) = sim_subscriber(label);
        arm(&controller);
        let pump = self.hub.on_subscribe(sink);
        let id = pump.id();
        
        self.context.spawn(label, async move {
            let _ = pump.run().await;
        });
        (id, controller)
    }
    
    /// Builds a pipeline over this world's shared components.
    pub fn pipeline<D: Detector>(&self, detector: D) -> PipelineOrchestrator<SimContext, D> {
        let config = PipelineConfig {
            name: format!("sim-{}", self.config.seed),
            frame_interval: Duration::from_secs_f64(1.0 / self.config.fps.max(1.0)),
            ..PipelineConfig::default()
        };
        
        PipelineOrchestrator::new(
            Arc::clone(&self.context),
            detector,
            Arc::clone(&self.transformer),
            Arc::clone(&self.colors),
            Arc::clone(&self.hub),
            config,
        )
    }
    
    /// Yields until `id` is no longer registered, up to `max_yields` times.
    pub async fn wait_until_gone(&self, id: SubscriberId, max_yields: usize) -> bool {
        for _ in 0..max_yields {
            if !self.hub.contains(id) {
                return true;
            }
            tokio::task::yield_now().await;
        }
        debug!(subscriber = %id, "Subscriber still registered");
        !self.hub.contains(id)
    }
}
