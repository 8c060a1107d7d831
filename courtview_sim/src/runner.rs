//! Scenario runner - executes broadcast scenarios against a SimWorld.

use crate::detector::{ScriptedDetector, SyntheticDetector};
use crate::scenarios::ScenarioId;
use crate::sink::SimSinkController;
use crate::world::{SimConfig, SimWorld};

use courtview_core::{FrameEntry, HubStats, PipelineStatus, Rgb, StopReason, TrackId};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,
    
    /// Seed used
    pub seed: u64,
    
    /// Whether scenario passed all assertions
    pub passed: bool,
    
    /// Entries the pipeline emitted
    pub frames_emitted: u64,
    
    /// Subscribers still registered at the end
    pub final_subscribers: usize,
    
    /// Failure message if any
    pub failure_reason: Option<String>,
    
    /// Hub counters at the end of the run
    pub hub: HubStats,
    
    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Entries received across all simulated subscribers
    pub entries_received: u64,
    
    /// Detections that landed in court space
    pub placed_detections: u64,
    
    /// Court-space RMS error against ground truth (meters)
    pub rms_error_m: Option<f64>,
}

type Check = Result<(), String>;

fn ensure(condition: bool, failure: impl FnOnce() -> String) -> Check {
    if condition {
        Ok(())
    } else {
        Err(failure())
    }
}

fn ids(entries: &[FrameEntry]) -> Vec<u64> {
    entries.iter().map(|e| e.sequence_id).collect()
}

/// Runs broadcast scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,
    
    /// Frames in the full match
    match_frames: u64,
    
    /// Players on court in the full match
    players: usize,
    
    /// Real-time limit for a subscriber to receive what it is owed
    collect_timeout: Duration,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            match_frames: 300,
            players: 12,
            collect_timeout: Duration::from_secs(5),
        }
    }
    
    /// Sets the length of the full match.
    pub fn with_frames(mut self, frames: u64) -> Self {
        self.match_frames = frames.max(1);
        self
    }
    
    /// Sets the number of players in the full match.
    pub fn with_players(mut self, players: usize) -> Self {
        self.players = players;
        self
    }
    
    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        
        let mut metrics = ScenarioMetrics::default();
        let outcome = match scenario {
            ScenarioId::LateJoiner => self.run_late_joiner(&mut metrics).await,
            ScenarioId::SeveredSubscriber => self.run_severed_subscriber(&mut metrics).await,
            ScenarioId::IdleHub => self.run_idle_hub(&mut metrics).await,
            ScenarioId::SourceOutage => self.run_source_outage(&mut metrics).await,
            ScenarioId::FullMatch => self.run_full_match(&mut metrics).await,
            ScenarioId::ReplayFailure => self.run_replay_failure(&mut metrics).await,
        };
        
        let (world, status, check) = match outcome {
            Ok(parts) => parts,
            Err(reason) => {
                warn!(scenario = %scenario, %reason, "Scenario could not be set up");
                return ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: false,
                    frames_emitted: 0,
                    final_subscribers: 0,
                    failure_reason: Some(reason),
                    hub: HubStats::default(),
                    metrics,
                };
            }
        };
        
        if let Err(reason) = &check {
            warn!(scenario = %scenario, %reason, "Scenario failed");
        }
        
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: check.is_ok(),
            frames_emitted: status.frames_emitted,
            final_subscribers: world.hub().subscriber_count(),
            failure_reason: check.err(),
            hub: world.hub().stats(),
            metrics,
        }
    }
    
    fn world(&self, config: SimConfig) -> Result<SimWorld, String> {
        SimWorld::new(SimConfig {
            seed: self.seed,
            ..config
        })
        .map_err(|e| e.to_string())
    }
    
    async fn collect(&self, controller: &mut SimSinkController, count: usize, metrics: &mut ScenarioMetrics) -> Vec<FrameEntry> {
        let entries = tokio::time::timeout(self.collect_timeout, controller.collect(count))
            .await
            .unwrap_or_default();
        if entries.len() < count {
            debug!(subscriber = controller.label(), got = entries.len(), wanted = count, "Short read");
        }
        metrics.entries_received += entries.len() as u64;
        entries
    }
    
    /// CV-001: capacity 3, join after 5 frames.
    async fn run_late_joiner(&self, metrics: &mut ScenarioMetrics) -> Result<(SimWorld, PipelineStatus, Check), String> {
        let world = self.world(SimConfig {
            buffer_capacity: 3,
            ..SimConfig::default()
        })?;
        let mut pipeline = world.pipeline(ScriptedDetector::new().empty_frames(1, 7));
        
        for _ in 0..5 {
            pipeline.step().await;
        }
        let (_, mut late) = world.subscribe("late");
        for _ in 0..2 {
            pipeline.step().await;
        }
        
        let received = ids(&self.collect(&mut late, 5, metrics).await);
        let check = ensure(received == vec![3, 4, 5, 6, 7], || {
            format!("expected [3, 4, 5, 6, 7], got {received:?}")
        });
        
        let status = pipeline.status();
        Ok((world, status, check))
    }
    
    /// CV-002: one of three subscribers severed.
    async fn run_severed_subscriber(&self, metrics: &mut ScenarioMetrics) -> Result<(SimWorld, PipelineStatus, Check), String> {
        let world = self.world(SimConfig::default())?;
        let mut pipeline = world.pipeline(ScriptedDetector::new().empty_frames(1, 3));
        
        let (_, mut a) = world.subscribe("a");
        let (b_id, mut b) = world.subscribe("b");
        let (_, mut c) = world.subscribe("c");
        
        pipeline.step().await;
        for controller in [&mut a, &mut b, &mut c] {
            self.collect(controller, 1, metrics).await;
        }
        
        b.sever();
        pipeline.step().await;
        pipeline.step().await;
        
        let got_a = ids(&self.collect(&mut a, 2, metrics).await);
        let got_c = ids(&self.collect(&mut c, 2, metrics).await);
        let pruned = world.wait_until_gone(b_id, 10_000).await;
        
        let check = ensure(got_a == vec![2, 3] && got_c == vec![2, 3], || {
            format!("healthy subscribers got {got_a:?} and {got_c:?}")
        })
        .and_then(|_| ensure(pruned, || "severed subscriber still registered".to_string()))
        .and_then(|_| {
            let remaining = world.hub().subscriber_count();
            ensure(remaining == 2, || format!("expected 2 subscribers, found {remaining}"))
        });
        
        let status = pipeline.status();
        Ok((world, status, check))
    }
    
    /// CV-003: nobody watching.
    async fn run_idle_hub(&self, _metrics: &mut ScenarioMetrics) -> Result<(SimWorld, PipelineStatus, Check), String> {
        let world = self.world(SimConfig::default())?;
        let status = world.pipeline(ScriptedDetector::new().empty_frames(1, 100)).run().await;
        
        let stats = world.hub().stats();
        let check = ensure(stats.frames_published == 100, || {
            format!("expected 100 publishes, got {}", stats.frames_published)
        })
        .and_then(|_| {
            ensure(stats.frames_serialized == 0 && stats.messages_enqueued == 0, || {
                format!("idle hub did work: {stats:?}")
            })
        });
        
        Ok((world, status, check))
    }
    
    /// CV-004: detector dies at frame 90.
    async fn run_source_outage(&self, metrics: &mut ScenarioMetrics) -> Result<(SimWorld, PipelineStatus, Check), String> {
        const OUTAGE_AT: u64 = 90;
        
        let world = self.world(SimConfig::default())?;
        let calibration = world
            .calibration()
            .cloned()
            .ok_or_else(|| "world is not calibrated".to_string())?;
        let mut oracle = world.oracle();
        oracle.spawn_random_players(6);
        let detector = SyntheticDetector::new(oracle, calibration, world.config.fps, 120).with_outage_at(OUTAGE_AT);
        
        let (early_id, mut early) = world.subscribe("early");
        let status = world.pipeline(detector).run().await;
        
        let emitted = OUTAGE_AT - 1;
        let early_ids = ids(&self.collect(&mut early, emitted as usize, metrics).await);
        
        let (_, mut late) = world.subscribe("late");
        let capacity = world.config.buffer_capacity as u64;
        let late_ids = ids(&self.collect(&mut late, capacity as usize, metrics).await);
        
        let check = ensure(
            matches!(status.stop_reason, Some(StopReason::SourceFatalError(_))),
            || format!("unexpected stop reason {:?}", status.stop_reason),
        )
        .and_then(|_| {
            ensure(early_ids == (1..=emitted).collect::<Vec<_>>(), || {
                format!("early subscriber got {} entries", early_ids.len())
            })
        })
        .and_then(|_| {
            let expected: Vec<u64> = (emitted - capacity + 1..=emitted).collect();
            ensure(late_ids == expected, || format!("late subscriber got {late_ids:?}"))
        })
        .and_then(|_| {
            ensure(world.hub().contains(early_id), || {
                "source outage disconnected a subscriber".to_string()
            })
        });
        
        Ok((world, status, check))
    }
    
    /// CV-005: full match against ground truth.
    async fn run_full_match(&self, metrics: &mut ScenarioMetrics) -> Result<(SimWorld, PipelineStatus, Check), String> {
        const MAX_RMS_M: f64 = 0.5;
        
        let world = self.world(SimConfig {
            buffer_capacity: self.match_frames as usize,
            ..SimConfig::default()
        })?;
        let calibration = world
            .calibration()
            .cloned()
            .ok_or_else(|| "world is not calibrated".to_string())?;
        let mut oracle = world.oracle();
        oracle.spawn_random_players(self.players);
        let detector = SyntheticDetector::new(oracle, calibration, world.config.fps, self.match_frames);
        let truth = detector.truth_log();
        
        let (_, mut home) = world.subscribe("home");
        let (_, mut away) = world.subscribe("away");
        let status = world.pipeline(detector).run().await;
        
        let frames = self.match_frames as usize;
        let home_entries = self.collect(&mut home, frames, metrics).await;
        let away_entries = self.collect(&mut away, frames, metrics).await;
        
        let mut squared = 0.0;
        let mut placed = 0u64;
        let mut colors: HashMap<TrackId, Rgb> = HashMap::new();
        let mut color_flips = 0usize;
        
        for entry in &home_entries {
            for detection in &entry.detections {
                let Some(track_id) = detection.track_id else {
                    continue;
                };
                if *colors.entry(track_id).or_insert(detection.color) != detection.color {
                    color_flips += 1;
                }
                let (Some(court), Some(real)) = (
                    detection.transformed_ground_point,
                    truth.position(entry.frame_index, track_id),
                ) else {
                    continue;
                };
                squared += (court - real).norm_squared();
                placed += 1;
            }
        }
        
        metrics.placed_detections = placed;
        let rms = (placed > 0).then(|| (squared / placed as f64).sqrt());
        metrics.rms_error_m = rms;
        
        let check = ensure(home_entries.len() == frames, || {
            format!("home received {} of {frames} entries", home_entries.len())
        })
        .and_then(|_| ensure(home_entries == away_entries, || "subscribers diverged".to_string()))
        .and_then(|_| ensure(color_flips == 0, || format!("{color_flips} track color changes")))
        .and_then(|_| match rms {
            Some(rms) => ensure(rms < MAX_RMS_M, || format!("RMS error {rms:.3}m exceeds {MAX_RMS_M}m")),
            None if self.players == 0 => Ok(()),
            None => Err("no detections were placed on court".to_string()),
        });
        
        Ok((world, status, check))
    }
    
    /// CV-006: send fails mid-replay.
    async fn run_replay_failure(&self, metrics: &mut ScenarioMetrics) -> Result<(SimWorld, PipelineStatus, Check), String> {
        const BACKLOG: u64 = 5;
        const DELIVERED: u64 = 2;
        
        let world = self.world(SimConfig {
            buffer_capacity: 10,
            ..SimConfig::default()
        })?;
        let mut pipeline = world.pipeline(ScriptedDetector::new().empty_frames(1, BACKLOG + 1));
        for _ in 0..BACKLOG {
            pipeline.step().await;
        }
        
        let (flaky_id, mut flaky) = world.subscribe_with("flaky", |c| c.fail_after(DELIVERED));
        let (_, mut steady) = world.subscribe("steady");
        
        // The flaky connection closes once pruned, so this returns early
        let flaky_ids = ids(&self.collect(&mut flaky, BACKLOG as usize, metrics).await);
        let pruned = world.wait_until_gone(flaky_id, 10_000).await;
        
        pipeline.step().await;
        let steady_ids = ids(&self.collect(&mut steady, BACKLOG as usize + 1, metrics).await);
        let late_ids = ids(&flaky.drain());
        
        let check = ensure(flaky_ids == (1..=DELIVERED).collect::<Vec<_>>(), || {
            format!("flaky subscriber got {flaky_ids:?}")
        })
        .and_then(|_| ensure(pruned, || "flaky subscriber still registered".to_string()))
        .and_then(|_| ensure(late_ids.is_empty(), || format!("pruned subscriber got {late_ids:?}")))
        .and_then(|_| {
            let pruned = world.hub().stats().subscribers_pruned;
            ensure(pruned == 1, || format!("expected 1 pruned subscriber, found {pruned}"))
        })
        .and_then(|_| {
            ensure(steady_ids == (1..=BACKLOG + 1).collect::<Vec<_>>(), || {
                format!("steady subscriber got {steady_ids:?}")
            })
        });
        
        let status = pipeline.status();
        Ok((world, status, check))
    }
}
