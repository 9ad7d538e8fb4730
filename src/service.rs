//! Query service - the read path between the HTTP API and the store.
//!
//! [`MessagesService`] is a pass-through: it forwards to the [`RecordStore`]
//! and renames store errors into [`ServiceError`] kinds, keeping the message
//! text as is.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::message::Message;
use crate::store::{RecordStore, StoreError};

/// Errors surfaced to the HTTP layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(message) => ServiceError::NotFound(message),
            StoreError::Unavailable(message) => ServiceError::Internal(message),
        }
    }
}

/// Read operations exposed over HTTP.
#[async_trait]
pub trait QueryService: Send + Sync {
    async fn get_message(&self, id: i64) -> Result<Message, ServiceError>;

    async fn get_all_messages(&self) -> Result<Vec<Message>, ServiceError>;
}

/// [`QueryService`] backed by a record store.
pub struct MessagesService<S: RecordStore + ?Sized> {
    store: Arc<S>,
}

impl<S: RecordStore + ?Sized> MessagesService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: RecordStore + ?Sized> QueryService for MessagesService<S> {
    async fn get_message(&self, id: i64) -> Result<Message, ServiceError> {
        Ok(self.store.get(id).await?)
    }

    async fn get_all_messages(&self) -> Result<Vec<Message>, ServiceError> {
        Ok(self.store.get_all().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;

    /// A store whose reads fail with a fixed error.
    struct FailingStore(StoreError);

    #[async_trait]
    impl RecordStore for FailingStore {
        async fn get(&self, _id: i64) -> Result<Message, StoreError> {
            Err(self.0.clone())
        }

        async fn get_all(&self) -> Result<Vec<Message>, StoreError> {
            Err(self.0.clone())
        }

        async fn save(&self, _message: &Message) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete(&self, _id: i64) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_get_message_success() {
        let store = Arc::new(MemoryRecordStore::new());
        let msg = Message::new(1, "the title", "the body");
        store.save(&msg).await.unwrap();
        let service = MessagesService::new(store);

        let found = service.get_message(1).await.unwrap();
        assert_eq!(found, msg);
    }

    #[tokio::test]
    async fn test_get_message_not_found() {
        let service = MessagesService::new(Arc::new(FailingStore(StoreError::NotFound(
            "the id is not found".to_string(),
        ))));

        let err = service.get_message(1).await.unwrap_err();
        assert_eq!(err, ServiceError::NotFound("the id is not found".to_string()));
    }

    #[tokio::test]
    async fn test_get_all_messages() {
        let store = Arc::new(MemoryRecordStore::new());
        store.save(&Message::new(1, "first title", "first body")).await.unwrap();
        store.save(&Message::new(2, "second title", "second body")).await.unwrap();
        let service = MessagesService::new(store);

        let mut messages = service.get_all_messages().await.unwrap();
        messages.sort_by_key(|m| m.id);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].title, "first title");
        assert_eq!(messages[1].body, "second body");
    }

    #[tokio::test]
    async fn test_get_all_messages_store_error() {
        let service = MessagesService::new(Arc::new(FailingStore(StoreError::Unavailable(
            "error getting messages".to_string(),
        ))));

        let err = service.get_all_messages().await.unwrap_err();
        assert_eq!(err, ServiceError::Internal("error getting messages".to_string()));
    }

    #[test]
    fn test_store_error_mapping_keeps_message() {
        assert_eq!(
            ServiceError::from(StoreError::NotFound("no messages found".to_string())),
            ServiceError::NotFound("no messages found".to_string())
        );
        assert_eq!(
            ServiceError::from(StoreError::Unavailable("redis get error".to_string())),
            ServiceError::Internal("redis get error".to_string())
        );
    }
}
