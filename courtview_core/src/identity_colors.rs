//! Stable per-track colors.
//!
//! Every track id gets one bright, saturated color the first time it is
//! seen. The color is kept for the lifetime of the run, so a player who
//! leaves the frame and comes back keeps the same color.

use crate::frame::TrackId;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Saturation is drawn from this range (no washed-out colors).
pub const SATURATION_RANGE: RangeInclusive<f64> = 0.8..=1.0;

/// Value is drawn from this range (no near-black colors).
pub const VALUE_RANGE: RangeInclusive<f64> = 0.8..=1.0;

/// 8-bit RGB triple, serialized as `[r, g, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Brightest channel.
    pub fn max_channel(&self) -> u8 {
        self.0.max(self.1).max(self.2)
    }

    /// Darkest channel.
    pub fn min_channel(&self) -> u8 {
        self.0.min(self.1).min(self.2)
    }
}

/// HSV → RGB with all components in `[0, 1]`.
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (v, v, v);
    }

    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    match (sector as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

/// Draws one visually distinct color.
pub fn random_color<R: Rng + ?Sized>(rng: &mut R) -> Rgb {
    let hue = rng.gen::<f64>();
    let saturation = rng.gen_range(SATURATION_RANGE);
    let value = rng.gen_range(VALUE_RANGE);

    let (r, g, b) = hsv_to_rgb(hue, saturation, value);
    let channel = |c: f64| (c * 255.0).clamp(0.0, 255.0) as u8;
    Rgb(channel(r), channel(g), channel(b))
}

struct ColorState {
    colors: HashMap<TrackId, Rgb>,
    rng: ChaCha8Rng,
}

/// Process-wide `track id → color` map.
///
/// The cache is the only writer of its map; callers get copies. A single
/// mutex guards both the map and the generator so concurrent first sightings
/// of the same id resolve to one color.
pub struct IdentityColorCache {
    state: Mutex<ColorState>,
}

impl IdentityColorCache {
    /// Creates an empty cache drawing from `rng`.
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self {
            state: Mutex::new(ColorState {
                colors: HashMap::new(),
                rng,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ColorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the color for `track_id`, generating and storing it on
    /// first sight.
    pub fn color_for(&self, track_id: TrackId) -> Rgb {
        let mut state = self.lock();
        let ColorState { colors, rng } = &mut *state;
        *colors.entry(track_id).or_insert_with(|| random_color(rng))
    }

    /// Draws a color that is not remembered (for untracked detections).
    pub fn fresh_color(&self) -> Rgb {
        random_color(&mut self.lock().rng)
    }

    /// Looks up a color without generating one.
    pub fn get(&self, track_id: TrackId) -> Option<Rgb> {
        self.lock().colors.get(&track_id).copied()
    }

    /// Number of track ids seen so far.
    pub fn len(&self) -> usize {
        self.lock().colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
