//! Subscriber transport abstraction.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::Payload;

/// One subscriber's outbound half of a persistent connection.
///
/// # Implementations
///
/// - **Production**: the write half of an axum websocket
/// - **Simulation**: an mpsc channel with fault injection
///
/// # Message Flow
///
/// ```text
/// BroadcastHub            writer task              Subscriber
///   |                         |                         |
///   |-- enqueue(payload) ---->|                         |
///   |                         |-- send(payload) ------->|
///   |                         |<- Err(..) on failure ---|
///   |<- unsubscribe(id) ------|                         |
/// ```
///
/// A sink is owned by exactly one writer task, so `send` takes `&mut self`.
#[async_trait]
pub trait SubscriberSink: Send + 'static {
    /// Delivers one serialized frame entry.
    ///
    /// # Returns
    /// * `Ok(())` - The payload was handed to the transport
    /// * `Err(EnvError)` - The subscriber is gone; it will be pruned
    async fn send(&mut self, payload: Payload) -> Result<(), EnvError>;
    
    /// Closes the connection. Errors are ignored by callers.
    async fn close(&mut self) -> Result<(), EnvError> {
        Ok(())
    }
    
    /// Short human-readable description (peer address, test label).
    fn describe(&self) -> String {
        "subscriber".to_string()
    }
}
