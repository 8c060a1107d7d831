//! Error types for the CourtView environment abstraction.

use thiserror::Error;

/// Errors that can occur while talking to a subscriber.
///
/// Every variant is local to one subscriber: the hub prunes that
/// subscriber and carries on with the others.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The transport rejected the write (peer reset, broken pipe, ...)
    #[error("Send failed: {0}")]
    SendFailed(String),
    
    /// The subscriber's connection is already closed
    #[error("Subscriber closed: {0}")]
    Closed(String),
    
    /// Payload could not be encoded for the wire
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EnvError {
    /// Creates a send failure.
    pub fn send_failed(msg: impl Into<String>) -> Self {
        Self::SendFailed(msg.into())
    }
    
    /// Creates a closed-connection error.
    pub fn closed(who: impl std::fmt::Display) -> Self {
        Self::Closed(who.to_string())
    }
}
