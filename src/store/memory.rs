//! In-process record store.
//!
//! Mirrors the Redis layout: records are kept as serialized JSON under the
//! same keys, so a raw entry that fails to decode behaves the same way it
//! would in Redis.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{decode, encode, none_found, not_found, RecordStore, StoreError};
use crate::message::{message_key, Message, KEY_PREFIX};

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value under `key`, bypassing serialization.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.into(), value.into());
    }

    /// Number of stored keys, including undecodable ones.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("store lock poisoned".to_string())
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, id: i64) -> Result<Message, StoreError> {
        match self.read_raw(&message_key(id))? {
            Some(raw) => decode(&raw),
            None => Err(not_found()),
        }
    }

    async fn get_all(&self) -> Result<Vec<Message>, StoreError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;

        let messages: Vec<Message> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(KEY_PREFIX))
            .filter_map(|(_, raw)| decode(raw).ok())
            .collect();

        if messages.is_empty() {
            return Err(none_found());
        }
        Ok(messages)
    }

    async fn save(&self, message: &Message) -> Result<(), StoreError> {
        let data = encode(message)?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(message.key(), data);
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(&message_key(id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryRecordStore::new();

        let err = store.get(1).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("message not found".to_string()));
    }

    #[tokio::test]
    async fn test_save_then_get() {
        let store = MemoryRecordStore::new();
        let msg = Message::new(10, "Hello", "World");

        store.save(&msg).await.unwrap();

        assert_eq!(store.get(10).await.unwrap(), msg);
    }

    #[tokio::test]
    async fn test_save_replaces_whole_record() {
        let store = MemoryRecordStore::new();
        store.save(&Message::new(1, "first", "body one")).await.unwrap();

        let replacement = Message::new(1, "second", "");
        store.save(&replacement).await.unwrap();

        let stored = store.get(1).await.unwrap();
        assert_eq!(stored, replacement);
        assert_eq!(stored.body, "");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = MemoryRecordStore::new();
        assert!(store.delete(12).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let store = MemoryRecordStore::new();
        store.save(&Message::new(12, "t", "b")).await.unwrap();

        store.delete(12).await.unwrap();

        assert!(matches!(store.get(12).await, Err(StoreError::NotFound(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_get_all_empty_is_not_found() {
        let store = MemoryRecordStore::new();

        let err = store.get_all().await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("no messages found".to_string()));
    }

    #[tokio::test]
    async fn test_get_all_skips_corrupt_entries() {
        let store = MemoryRecordStore::new();
        store.save(&Message::new(2, "Title", "Body")).await.unwrap();
        store.insert_raw("message:3", "{not json");

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, 2);
    }

    #[tokio::test]
    async fn test_get_all_only_corrupt_is_not_found() {
        let store = MemoryRecordStore::new();
        store.insert_raw("message:3", "{not json");

        assert!(matches!(store.get_all().await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_corrupt_entry_is_unavailable() {
        let store = MemoryRecordStore::new();
        store.insert_raw("message:3", "garbage");

        assert!(matches!(store.get(3).await, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_get_all_ignores_foreign_keys() {
        let store = MemoryRecordStore::new();
        store.insert_raw("session:1", r#"{"id": 1}"#);
        store.save(&Message::new(7, "t", "b")).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, 7);
    }
}
