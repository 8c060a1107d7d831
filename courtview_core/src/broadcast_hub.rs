//! Broadcast Hub - Fan-out of frame entries to live subscribers
//!
//! # Architecture
//!
//! ```text
//!  Pipeline ──append──► FrameHistoryBuffer
//!     │                        │ snapshot (on subscribe)
//!     └──publish──► BroadcastHub ─────────────┐
//!                      │ try_send             │ replay
//!          ┌───────────┼───────────┐          │
//!          ▼           ▼           ▼          ▼
//!       queue #1    queue #2    queue #3   queue #N
//!          │           │           │          │
//!       pump task   pump task   pump task  pump task
//!          │           │           │          │
//!        sink        sink        sink       sink
//! ```
//!
//! Publishing never awaits a subscriber: each subscriber has its own
//! bounded queue drained by its own pump task, so a slow or dead
//! connection cannot stall the pipeline or the other subscribers.
//!
//! # Replay/live boundary
//!
//! Every subscriber slot remembers the highest sequence id it has been
//! handed. Replay and publish both run under the registry lock, and publish
//! skips entries at or below that mark. Whatever the interleaving of
//! `append`, `publish` and `on_subscribe`, each subscriber sees every
//! buffered-or-later entry exactly once, in order.

use crate::frame::FrameEntry;
use crate::frame_history::FrameHistoryBuffer;
use courtview_env::{EnvError, Payload, SubscriberId, SubscriberSink};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Largest bounded queue tokio's mpsc accepts.
const MAX_QUEUE_DEPTH: usize = usize::MAX >> 3;

/// Configuration for the broadcast hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Live entries a subscriber may fall behind by before it is dropped.
    /// The replay backlog gets its own room on top of this.
    pub subscriber_queue_depth: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_depth: 256,
        }
    }
}

/// Counters exposed on the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Currently registered subscribers
    pub subscribers: usize,
    /// `publish` calls
    pub frames_published: u64,
    /// Entries serialized to JSON (replay + live)
    pub frames_serialized: u64,
    /// Payloads handed to subscriber queues
    pub messages_enqueued: u64,
    /// Subscribers removed because a send failed or they fell behind
    pub subscribers_pruned: u64,
}

struct SubscriberSlot {
    queue: mpsc::Sender<Payload>,
    last_sequence_id: Option<u64>,
    label: String,
}

/// Registry of live subscribers plus the single `publish` entry point.
pub struct BroadcastHub {
    history: Arc<FrameHistoryBuffer>,
    config: HubConfig,
    subscribers: Mutex<HashMap<SubscriberId, SubscriberSlot>>,
    frames_published: AtomicU64,
    frames_serialized: AtomicU64,
    messages_enqueued: AtomicU64,
    subscribers_pruned: AtomicU64,
}

impl BroadcastHub {
    pub fn new(history: Arc<FrameHistoryBuffer>, config: HubConfig) -> Self {
        Self {
            history,
            config,
            subscribers: Mutex::new(HashMap::new()),
            frames_published: AtomicU64::new(0),
            frames_serialized: AtomicU64::new(0),
            messages_enqueued: AtomicU64::new(0),
            subscribers_pruned: AtomicU64::new(0),
        }
    }

    /// Creates an Arc-wrapped hub (subscribing needs `Arc<Self>`).
    pub fn shared(history: Arc<FrameHistoryBuffer>, config: HubConfig) -> Arc<Self> {
        Arc::new(Self::new(history, config))
    }

    /// The buffer used for backlog replay.
    pub fn history(&self) -> &Arc<FrameHistoryBuffer> {
        &self.history
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, SubscriberSlot>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn encode(&self, entry: &FrameEntry) -> Result<Payload, EnvError> {
        let json = serde_json::to_string(entry).map_err(|e| EnvError::Serialization(e.to_string()))?;
        self.frames_serialized.fetch_add(1, Ordering::Relaxed);
        Ok(Payload::from(json))
    }

    /// Registers a subscriber and queues the current backlog for it.
    ///
    /// The returned pump owns the sink; spawn [`SubscriberPump::run`] to
    /// start delivery. Snapshot, replay and registration happen under the
    /// registry lock, so no concurrent publish can slip in between.
    pub fn on_subscribe<S: SubscriberSink>(self: &Arc<Self>, sink: S) -> SubscriberPump<S> {
        let id = SubscriberId::new();
        let label = sink.describe();
        let depth = self
            .history
            .capacity()
            .saturating_add(self.config.subscriber_queue_depth.max(1))
            .min(MAX_QUEUE_DEPTH);
        let (tx, rx) = mpsc::channel(depth);

        let mut subscribers = self.lock();

        let backlog = self.history.snapshot();
        let mut last_sequence_id = None;
        let mut replayed = 0usize;
        for entry in &backlog {
            match self.encode(entry) {
                // Queue capacity covers the full backlog
                Ok(payload) => {
                    if tx.try_send(payload).is_ok() {
                        replayed += 1;
                    }
                }
                Err(e) => warn!(subscriber = %id, seq = entry.sequence_id, error = %e, "Skipping unencodable entry in replay"),
            }
            last_sequence_id = Some(entry.sequence_id);
        }
        self.messages_enqueued.fetch_add(replayed as u64, Ordering::Relaxed);

        subscribers.insert(
            id,
            SubscriberSlot {
                queue: tx,
                last_sequence_id,
                label: label.clone(),
            },
        );
        let total = subscribers.len();
        drop(subscribers);

        info!(subscriber = %id, peer = %label, replayed, total, "Subscriber connected");

        SubscriberPump {
            hub: Arc::downgrade(self),
            id,
            queue: rx,
            sink,
        }
    }

    /// Removes a subscriber. Idempotent; returns whether it was present.
    pub fn on_unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.lock();
        let removed = subscribers.remove(&id);
        let remaining = subscribers.len();
        drop(subscribers);

        match removed {
            Some(slot) => {
                info!(subscriber = %id, peer = %slot.label, remaining, "Subscriber disconnected");
                true
            }
            None => false,
        }
    }

    fn prune(&self, id: SubscriberId, reason: &str) {
        if let Some(slot) = self.lock().remove(&id) {
            self.subscribers_pruned.fetch_add(1, Ordering::Relaxed);
            warn!(subscriber = %id, peer = %slot.label, reason, "Pruned subscriber");
        }
    }

    /// Fans one entry out to every subscriber.
    ///
    /// With no subscribers this returns immediately without serializing.
    /// Subscribers whose queue is closed or full are removed after the pass;
    /// the others are unaffected. Returns the number of queues that took the
    /// entry.
    pub fn publish(&self, entry: &FrameEntry) -> usize {
        self.frames_published.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.lock();
        if subscribers.is_empty() {
            return 0;
        }

        let payload = match self.encode(entry) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(seq = entry.sequence_id, error = %e, "Dropping unencodable entry");
                return 0;
            }
        };

        let mut delivered = 0usize;
        let mut dead = Vec::new();

        for (id, slot) in subscribers.iter_mut() {
            // Already handed over during replay
            if matches!(slot.last_sequence_id, Some(last) if entry.sequence_id <= last) {
                continue;
            }

            match slot.queue.try_send(Arc::clone(&payload)) {
                Ok(()) => {
                    slot.last_sequence_id = Some(entry.sequence_id);
                    delivered += 1;
                }
                Err(TrySendError::Full(_)) => dead.push((*id, "send queue full")),
                Err(TrySendError::Closed(_)) => dead.push((*id, "connection closed")),
            }
        }

        for (id, reason) in dead {
            if let Some(slot) = subscribers.remove(&id) {
                self.subscribers_pruned.fetch_add(1, Ordering::Relaxed);
                warn!(subscriber = %id, peer = %slot.label, reason, "Pruned subscriber");
            }
        }
        drop(subscribers);

        self.messages_enqueued.fetch_add(delivered as u64, Ordering::Relaxed);
        debug!(seq = entry.sequence_id, delivered, "Published frame");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Current subscriber handles.
    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.lock().keys().copied().collect()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            subscribers: self.subscriber_count(),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frames_serialized: self.frames_serialized.load(Ordering::Relaxed),
            messages_enqueued: self.messages_enqueued.load(Ordering::Relaxed),
            subscribers_pruned: self.subscribers_pruned.load(Ordering::Relaxed),
        }
    }
}

/// Drains one subscriber's queue into its sink.
///
/// Ends when the sink fails (the subscriber is pruned) or when the hub
/// drops the queue (the subscriber was unsubscribed).
pub struct SubscriberPump<S> {
    hub: Weak<BroadcastHub>,
    id: SubscriberId,
    queue: mpsc::Receiver<Payload>,
    sink: S,
}

impl<S: SubscriberSink> SubscriberPump<S> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Runs until the subscriber goes away. Returns the send error, if that
    /// is what ended it.
    pub async fn run(mut self) -> Result<(), EnvError> {
        let outcome = loop {
            match self.queue.recv().await {
                Some(payload) => {
                    if let Err(e) = self.sink.send(payload).await {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            }
        };

        if let Some(hub) = self.hub.upgrade() {
            match &outcome {
                Err(e) => hub.prune(self.id, &e.to_string()),
                Ok(()) => {
                    hub.on_unsubscribe(self.id);
                }
            }
        }

        let _ = self.sink.close().await;
        outcome
    }
}
