//! Common types for the CourtView environment abstraction.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// A serialized frame entry, shared by every subscriber it is sent to.
pub type Payload = Arc<str>;

/// Unique identifier for one subscriber connection.
///
/// Uses UUID v4 so handles never collide, even across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    /// Creates a new random SubscriberId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
    
    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}
