//! Simulation context implementing CourtViewContext for deterministic testing.

use async_trait::async_trait;
use courtview_env::CourtViewContext;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::trace;

/// Simulation context backed by deterministic time and RNG.
///
/// This implements `CourtViewContext` using:
/// - A virtual clock that only moves when advanced or slept on
/// - Seeded ChaCha8 generators, one per derived stream
/// - Simulated sleep that advances virtual time and yields
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,
    
    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,
    
    /// Epoch offset (virtual time 0 maps to this wall-clock time)
    epoch: SystemTime,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
            epoch: UNIX_EPOCH + Duration::from_secs(1704067200), // 2024-01-01 00:00:00 UTC
        }
    }
    
    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }
    
    fn clock(&self) -> MutexGuard<'_, u64> {
        self.virtual_time_ns.lock().unwrap_or_else(PoisonError::into_inner)
    }
    
    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.clock();
        *time = time.saturating_add(duration.as_nanos() as u64);
    }
    
    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        *self.clock() = time_ns;
    }
    
    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.clock()
    }
    
    /// Wall-clock time that virtual time 0 maps to.
    pub fn epoch(&self) -> SystemTime {
        self.epoch
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl CourtViewContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }
    
    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }
    
    async fn sleep(&self, duration: Duration) {
        // Sleeping advances virtual time; yielding lets subscriber pumps
        // drain before the next frame is produced
        self.advance_time(duration);
        tokio::task::yield_now().await;
    }
    
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        trace!(task = name, "Spawning simulated task");
        tokio::spawn(future);
    }
    
    fn derive_rng(&self, stream: u64) -> ChaCha8Rng {
        // Combine master seed with the stream id for an independent generator
        let combined_seed = self.seed.wrapping_mul(0x517cc1b727220a95) ^ stream;
        ChaCha8Rng::seed_from_u64(combined_seed)
    }
    
    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;
    
    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);
        
        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));
        
        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));
    }
    
    #[tokio::test]
    async fn test_sim_sleep_advances_virtual_time() {
        let ctx = SimContext::new(1);
        ctx.sleep(Duration::from_secs(3600)).await;
        assert_eq!(ctx.now(), Duration::from_secs(3600));
        assert_eq!(ctx.system_time(), ctx.epoch() + Duration::from_secs(3600));
    }
    
    #[test]
    fn test_sim_context_deterministic_rng() {
        let ctx1 = SimContext::new(42);
        let ctx2 = SimContext::new(42);
        
        // Same seed + stream = same sequence
        assert_eq!(ctx1.derive_rng(1).next_u64(), ctx2.derive_rng(1).next_u64());
        
        // Different stream = different sequence
        assert_ne!(ctx1.derive_rng(1).next_u64(), ctx1.derive_rng(2).next_u64());
    }
    
    #[test]
    fn test_sim_context_seed() {
        let ctx = SimContext::new(12345);
        assert_eq!(ctx.seed(), 12345);
    }
    
    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();
        
        ctx1.advance_time(Duration::from_secs(5));
        
        // Both should see the same time
        assert_eq!(ctx1.now(), ctx2.now());
        
        ctx2.set_time(0);
        assert_eq!(ctx1.time_ns(), 0);
    }
}
