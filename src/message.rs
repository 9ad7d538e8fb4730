//! The message record cached by this service.
//!
//! A [`Message`] is owned by the upstream system; this service never assigns
//! ids. Each record lives under a single key derived from its id, see
//! [`message_key`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key prefix for every stored record
pub const KEY_PREFIX: &str = "message:";

/// Pattern matching every record key
pub const KEY_PATTERN: &str = "message:*";

/// A message record.
///
/// # Example
///
/// ```json
/// {
///   "id": 1,
///   "title": "Hello",
///   "body": "World",
///   "created_at": "2025-12-11T10:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier assigned by the upstream producer
    pub id: i64,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub body: String,

    /// Creation time, RFC 3339. Defaults to the Unix epoch when absent.
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(id: i64, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }

    /// Set the creation timestamp
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// The store key for this record
    pub fn key(&self) -> String {
        message_key(self.id)
    }
}

/// Store key for a message id, e.g. `message:42`.
pub fn message_key(id: i64) -> String {
    format!("{KEY_PREFIX}{id}")
}
