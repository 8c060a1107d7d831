//! Ground truth oracle for simulation.
//!
//! The Oracle maintains the "God's eye view" of a simulated match:
//! - True court positions of all players (meters)
//! - Kinematics (constant velocity, bouncing off the court lines)
//! - Detector output generation: court → pixel through the inverse
//!   homography, with Gaussian pixel noise

use courtview_core::{Calibration, DetectionBatch, RawDetection, TargetShape, TrackId};
use nalgebra::{Matrix3, Point2, Vector2, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Apparent player size in pixels at the bottom of the frame.
const PLAYER_BOX_WIDTH: f64 = 40.0;
const PLAYER_BOX_HEIGHT: f64 = 110.0;

/// A ground truth player in the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourtPlayer {
    /// Tracker identity the synthetic detector reports
    pub track_id: TrackId,
    
    /// Position in court meters
    pub position: Point2<f64>,
    
    /// Velocity in m/s
    pub velocity: Vector2<f64>,
}

/// The Oracle - maintains ground truth and generates detections.
pub struct Oracle {
    /// RNG for noise and confidences
    rng: ChaCha8Rng,
    
    /// Court extent in target coordinates (x, y)
    extent: Vector2<f64>,
    
    players: Vec<CourtPlayer>,
    
    next_track_id: TrackId,
    
    /// Current simulation time (seconds)
    current_time: f64,
    
    /// Pixel noise standard deviation on the ground point
    pixel_noise_std: f64,
}

impl Oracle {
    /// Creates a new Oracle for a court of the given shape.
    pub fn new(seed: u64, shape: TargetShape) -> Self {
        let extent = shape
            .vertices()
            .iter()
            .fold(Vector2::zeros(), |acc: Vector2<f64>, v| {
                Vector2::new(acc.x.max(v.x), acc.y.max(v.y))
            });
        
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            extent,
            players: Vec::new(),
            next_track_id: 1,
            current_time: 0.0,
            pixel_noise_std: 1.5,
        }
    }
    
    /// Sets the pixel noise standard deviation (0 disables noise).
    pub fn set_pixel_noise(&mut self, std_dev: f64) {
        self.pixel_noise_std = std_dev.max(0.0);
    }
    
    /// Adds a player and returns its track id.
    pub fn spawn_player(&mut self, position: Point2<f64>, velocity: Vector2<f64>) -> TrackId {
        let track_id = self.next_track_id;
        self.next_track_id += 1;
        
        self.players.push(CourtPlayer {
            track_id,
            position,
            velocity,
        });
        track_id
    }
    
    /// Adds `count` players at random positions with random walking speeds.
    pub fn spawn_random_players(&mut self, count: usize) -> Vec<TrackId> {
        (0..count)
            .map(|_| {
                let position = Point2::new(
                    self.rng.gen_range(0.0..self.extent.x),
                    self.rng.gen_range(0.0..self.extent.y),
                );
                let velocity = Vector2::new(self.rng.gen_range(-3.0..3.0), self.rng.gen_range(-3.0..3.0));
                self.spawn_player(position, velocity)
            })
            .collect()
    }
    
    /// Advances kinematics by dt seconds.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;
        let extent = self.extent;
        
        for player in &mut self.players {
            player.position += player.velocity * dt;
            
            // Reflect off the court lines
            for axis in 0..2 {
                if player.position[axis] < 0.0 {
                    player.position[axis] = -player.position[axis];
                    player.velocity[axis] = player.velocity[axis].abs();
                } else if player.position[axis] > extent[axis] {
                    player.position[axis] = 2.0 * extent[axis] - player.position[axis];
                    player.velocity[axis] = -player.velocity[axis].abs();
                }
            }
        }
    }
    
    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.current_time
    }
    
    pub fn players(&self) -> &[CourtPlayer] {
        &self.players
    }
    
    /// Returns ground truth positions for error calculation.
    pub fn ground_truth(&self) -> Vec<(TrackId, Point2<f64>)> {
        self.players
            .iter()
            .map(|p| (p.track_id, p.position))
            .collect()
    }
    
    /// Generates one detector batch as the camera would see the court.
    ///
    /// Visible players are projected into pixel space through the inverse
    /// homography; each becomes a box whose bottom-center is the noisy
    /// projected ground point. Returns `None` if the homography is not
    /// invertible.
    pub fn observe(&mut self, calibration: &Calibration, frame_index: u64) -> Option<DetectionBatch> {
        let inverse = calibration.matrix().try_inverse()?;
        let noise = Normal::new(0.0, self.pixel_noise_std).ok();
        
        let mut detections = Vec::new();
        for player in &self.players {
            let Some(pixel) = apply(&inverse, &player.position) else {
                continue;
            };
            let (dx, dy) = match &noise {
                Some(normal) => (normal.sample(&mut self.rng), normal.sample(&mut self.rng)),
                None => (0.0, 0.0),
            };
            let (x, y) = (pixel.x + dx, pixel.y + dy);
            
            detections.push(RawDetection::new(
                [
                    x - PLAYER_BOX_WIDTH / 2.0,
                    y - PLAYER_BOX_HEIGHT,
                    x + PLAYER_BOX_WIDTH / 2.0,
                    y,
                ],
                self.rng.gen_range(0.55..0.99),
                Some(player.track_id),
            ));
        }
        
        Some(DetectionBatch::new(frame_index, detections))
    }
}

fn apply(matrix: &Matrix3<f64>, point: &Point2<f64>) -> Option<Point2<f64>> {
    let mapped = matrix * Vector3::new(point.x, point.y, 1.0);
    if mapped.z.abs() < 1e-12 {
        return None;
    }
    Some(Point2::new(mapped.x / mapped.z, mapped.y / mapped.z))
}
