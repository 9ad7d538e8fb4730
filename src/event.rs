//! Lifecycle events published by the upstream system.
//!
//! Every queue message carries one [`LifecycleEvent`]: an event kind and the
//! record it concerns. For `deleted` events only `data.id` is meaningful.
//!
//! # Example
//!
//! ```json
//! {
//!   "event": "created",
//!   "data": {
//!     "id": 1,
//!     "title": "Hello",
//!     "body": "World",
//!     "created_at": "2025-12-11T10:00:00Z"
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::Message;

/// The kind of change a lifecycle event describes.
///
/// Unrecognized kinds decode to [`EventKind::Unknown`] rather than failing,
/// so the applier can report the offending name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
    Unknown(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
            EventKind::Unknown(name) => name,
        }
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "created" => EventKind::Created,
            "updated" => EventKind::Updated,
            "deleted" => EventKind::Deleted,
            _ => EventKind::Unknown(value),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Unknown(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event as it arrives on the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event: EventKind,
    pub data: Message,
}

impl LifecycleEvent {
    pub fn new(event: EventKind, data: Message) -> Self {
        Self { event, data }
    }

    /// Decode a raw queue payload.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Encode as a queue payload.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
