//! Record storage.
//!
//! The [`RecordStore`] trait is the only way records are persisted or read.
//! It holds at most one record per id; a later save for the same id fully
//! replaces the earlier value.
//!
//! ## Backends
//!
//! - [`RedisRecordStore`]: production backend, one JSON string per key
//! - [`MemoryRecordStore`]: in-process backend for tests and local runs

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use thiserror::Error;

use crate::message::Message;

pub use memory::MemoryRecordStore;
pub use self::redis::RedisRecordStore;

/// Errors returned by a record store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record for the key, or nothing to list
    #[error("{0}")]
    NotFound(String),

    /// Transport or (de)serialization failure in the backend
    #[error("{0}")]
    Unavailable(String),
}

/// Keyed storage of [`Message`] records.
///
/// Implementations must be safe to share between the event applier and
/// concurrent HTTP handlers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one record.
    async fn get(&self, id: i64) -> Result<Message, StoreError>;

    /// Fetch every record.
    ///
    /// Entries that fail to fetch or decode are skipped. Returns
    /// [`StoreError::NotFound`] when nothing is left after skipping.
    async fn get_all(&self) -> Result<Vec<Message>, StoreError>;

    /// Write a record under its id, replacing any previous value.
    async fn save(&self, message: &Message) -> Result<(), StoreError>;

    /// Remove a record. Succeeds when the record does not exist.
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

pub(crate) fn not_found() -> StoreError {
    StoreError::NotFound("message not found".to_string())
}

pub(crate) fn none_found() -> StoreError {
    StoreError::NotFound("no messages found".to_string())
}

/// Decode a stored record, mapping failures to [`StoreError::Unavailable`].
pub(crate) fn decode(raw: &str) -> Result<Message, StoreError> {
    serde_json::from_str(raw).map_err(|_| StoreError::Unavailable("json unmarshal error".to_string()))
}

/// Encode a record for storage.
pub(crate) fn encode(message: &Message) -> Result<String, StoreError> {
    serde_json::to_string(message)
        .map_err(|_| StoreError::Unavailable("json marshal error".to_string()))
}
