//! Simulated subscribers with fault injection.

use async_trait::async_trait;
use courtview_core::FrameEntry;
use courtview_env::{EnvError, Payload, SubscriberSink};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Fault switches shared between a sink and its controller.
#[derive(Debug)]
struct SinkFaults {
    /// Every send fails once set
    severed: AtomicBool,
    
    /// Sends beyond this count fail (u64::MAX = never)
    fail_after: AtomicU64,
    
    /// Successful sends so far
    delivered: AtomicU64,
}

/// The hub-facing half of a simulated connection.
pub struct SimSink {
    label: String,
    tx: mpsc::UnboundedSender<Payload>,
    faults: Arc<SinkFaults>,
}

/// The test-facing half: receives what the hub delivered and injects faults.
pub struct SimSinkController {
    label: String,
    rx: mpsc::UnboundedReceiver<Payload>,
    faults: Arc<SinkFaults>,
}

/// Creates a connected sink/controller pair.
pub fn sim_subscriber(label: impl Into<String>) -> (SimSink, SimSinkController) {
    let label = label.into();
    let (tx, rx) = mpsc::unbounded_channel();
    let faults = Arc::new(SinkFaults {
        severed: AtomicBool::new(false),
        fail_after: AtomicU64::new(u64::MAX),
        delivered: AtomicU64::new(0),
    });
    
    (
        SimSink {
            label: label.clone(),
            tx,
            faults: Arc::clone(&faults),
        },
        SimSinkController { label, rx, faults },
    )
}

#[async_trait]
impl SubscriberSink for SimSink {
    async fn send(&mut self, payload: Payload) -> Result<(), EnvError> {
        if self.faults.severed.load(Ordering::SeqCst) {
            return Err(EnvError::closed(&self.label));
        }
        
        let delivered = self.faults.delivered.load(Ordering::SeqCst);
        if delivered >= self.faults.fail_after.load(Ordering::SeqCst) {
            return Err(EnvError::send_failed(format!(
                "{}: injected failure after {delivered} sends",
                self.label
            )));
        }
        
        self.tx
            .send(payload)
            .map_err(|_| EnvError::closed(&self.label))?;
        self.faults.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    
    async fn close(&mut self) -> Result<(), EnvError> {
        debug!(subscriber = %self.label, "Simulated connection closed");
        Ok(())
    }
    
    fn describe(&self) -> String {
        format!("sim:{}", self.label)
    }
}

impl SimSinkController {
    pub fn label(&self) -> &str {
        &self.label
    }
    
    /// Severs the connection: every further send fails.
    pub fn sever(&self) {
        warn!(subscriber = %self.label, "Severing simulated connection");
        self.faults.severed.store(true, Ordering::SeqCst);
    }
    
    pub fn is_severed(&self) -> bool {
        self.faults.severed.load(Ordering::SeqCst)
    }
    
    /// Lets `n` more sends through, then fails every send after that.
    pub fn fail_after(&self, n: u64) {
        let delivered = self.faults.delivered.load(Ordering::SeqCst);
        self.faults
            .fail_after
            .store(delivered.saturating_add(n), Ordering::SeqCst);
    }
    
    /// Successful sends so far.
    pub fn delivered(&self) -> u64 {
        self.faults.delivered.load(Ordering::SeqCst)
    }
    
    /// Waits for the next delivered entry.
    ///
    /// Returns `None` once the hub has dropped the sink and everything sent
    /// before that has been received.
    pub async fn recv_entry(&mut self) -> Option<FrameEntry> {
        loop {
            let payload = self.rx.recv().await?;
            match serde_json::from_str(&payload) {
                Ok(entry) => return Some(entry),
                Err(e) => warn!(subscriber = %self.label, error = %e, "Undecodable payload"),
            }
        }
    }
    
    /// Waits for up to `count` entries (fewer if the connection ends).
    pub async fn collect(&mut self, count: usize) -> Vec<FrameEntry> {
        let mut entries = Vec::with_capacity(count);
        while entries.len() < count {
            match self.recv_entry().await {
                Some(entry) => entries.push(entry),
                None => break,
            }
        }
        entries
    }
    
    /// Drains whatever has been delivered so far without waiting.
    pub fn drain(&mut self) -> Vec<FrameEntry> {
        let mut entries = Vec::new();
        while let Ok(payload) = self.rx.try_recv() {
            if let Ok(entry) = serde_json::from_str(&payload) {
                entries.push(entry);
            }
        }
        entries
    }
}
