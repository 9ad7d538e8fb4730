//! Event Applier - keeps the record store in step with upstream.
//!
//! The [`EventApplier`] pulls raw messages from an [`EventSource`], decodes
//! each into a [`LifecycleEvent`] and applies it to a [`RecordStore`].
//!
//! # Dispatch
//!
//! ```text
//! event     | store operation
//! ----------|--------------------------
//! created   | save(data)   (upsert)
//! updated   | save(data)   (upsert)
//! deleted   | delete(data.id)
//! other     | none, logged and dropped
//! ```
//!
//! # Failure Handling
//!
//! A message is handled exactly once. Decode failures, unknown kinds and
//! store errors are logged and the message is acknowledged anyway: the cache
//! is a disposable projection and is rebuilt from upstream, so nothing is
//! retried or dead-lettered. Events are applied strictly in delivery order
//! with no version check; the last applied event for an id wins.
//!
//! # Lifecycle
//!
//! ```text
//! connecting --declare ok--> consuming --shutdown / source closed--> stopped
//!     |
//!     +--declare failed--> error returned to caller
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::event::{EventKind, LifecycleEvent};
use crate::queue::{EventSource, QueueError};
use crate::shutdown::ShutdownSignal;
use crate::store::{RecordStore, StoreError};

/// Pause before reading again after a transport error
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Log statistics every this many applied events
const STATS_INTERVAL: u64 = 100;

/// What happened to a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A created/updated event was written
    Saved(i64),

    /// A deleted event removed the record (or it was already absent)
    Deleted(i64),

    /// The payload did not decode
    Malformed(String),

    /// The event kind is not one we handle
    Unknown(String),

    /// The store rejected the operation
    StoreFailed(StoreError),
}

impl ApplyOutcome {
    /// Returns true if the store was changed as the event asked
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Saved(_) | ApplyOutcome::Deleted(_))
    }
}

/// Counters reported when the consuming loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplierStats {
    /// Messages that changed the store
    pub applied: u64,

    /// Messages that were logged and discarded
    pub dropped: u64,
}

/// Applies lifecycle events to a record store.
pub struct EventApplier<S: RecordStore + ?Sized> {
    store: Arc<S>,
}

impl<S: RecordStore + ?Sized> Clone for EventApplier<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RecordStore + ?Sized> EventApplier<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Decode one raw message and apply it.
    pub async fn apply(&self, body: &[u8]) -> ApplyOutcome {
        let event = match LifecycleEvent::from_slice(body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Failed to decode lifecycle event, discarding");
                return ApplyOutcome::Malformed(e.to_string());
            }
        };

        self.apply_event(&event).await
    }

    /// Apply an already decoded event.
    pub async fn apply_event(&self, event: &LifecycleEvent) -> ApplyOutcome {
        let id = event.data.id;

        match &event.event {
            EventKind::Created | EventKind::Updated => match self.store.save(&event.data).await {
                Ok(()) => {
                    info!(id = id, event = %event.event, "Message stored");
                    ApplyOutcome::Saved(id)
                }
                Err(e) => {
                    error!(id = id, event = %event.event, error = %e, "Failed to save message");
                    ApplyOutcome::StoreFailed(e)
                }
            },
            EventKind::Deleted => match self.store.delete(id).await {
                Ok(()) => {
                    info!(id = id, "Message deleted");
                    ApplyOutcome::Deleted(id)
                }
                Err(e) => {
                    error!(id = id, error = %e, "Failed to delete message");
                    ApplyOutcome::StoreFailed(e)
                }
            },
            EventKind::Unknown(name) => {
                warn!(id = id, event = %name, "Unknown event type, discarding");
                ApplyOutcome::Unknown(name.clone())
            }
        }
    }

    /// Consume `source` until `shutdown` fires or the source closes.
    ///
    /// Fails only if the consumption target cannot be declared.
    pub async fn run<E>(
        &self,
        source: &mut E,
        shutdown: &ShutdownSignal,
    ) -> Result<ApplierStats, QueueError>
    where
        E: EventSource + ?Sized,
    {
        info!("Event applier connecting");
        source.declare().await?;
        info!("Event applier consuming");

        let mut stats = ApplierStats::default();

        loop {
            let delivery = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping event applier");
                    break;
                }
                result = source.recv() => result,
            };

            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(QueueError::Closed) => {
                    info!("Event source closed, stopping event applier");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read from event source");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                    }
                }
            };

            debug!(
                delivery_id = %delivery.id,
                body = %String::from_utf8_lossy(&delivery.body),
                "Received message"
            );

            if self.apply(&delivery.body).await.is_applied() {
                stats.applied += 1;
                if stats.applied.is_multiple_of(STATS_INTERVAL) {
                    info!(
                        applied = stats.applied,
                        dropped = stats.dropped,
                        "Applier statistics"
                    );
                }
            } else {
                stats.dropped += 1;
            }

            // Consumed regardless of outcome
            if let Err(e) = source.ack(&delivery).await {
                error!(delivery_id = %delivery.id, error = %e, "Failed to ACK message");
            }
        }

        info!(
            applied = stats.applied,
            dropped = stats.dropped,
            "Event applier stopped"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::queue::{ChannelSource, Delivery};
    use crate::store::MemoryRecordStore;
    use async_trait::async_trait;

    /// A store whose writes always fail.
    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn get(&self, _id: i64) -> Result<Message, StoreError> {
            Err(StoreError::Unavailable("redis get error".to_string()))
        }

        async fn get_all(&self) -> Result<Vec<Message>, StoreError> {
            Err(StoreError::Unavailable("error fetching keys".to_string()))
        }

        async fn save(&self, _message: &Message) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("redis save error".to_string()))
        }

        async fn delete(&self, _id: i64) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("redis delete error".to_string()))
        }
    }

    /// A source whose target cannot be declared.
    struct UndeclarableSource;

    #[async_trait]
    impl EventSource for UndeclarableSource {
        async fn declare(&mut self) -> Result<(), QueueError> {
            Err(QueueError::Transport("connection refused".to_string()))
        }

        async fn recv(&mut self) -> Result<Delivery, QueueError> {
            Err(QueueError::Closed)
        }

        async fn ack(&mut self, _delivery: &Delivery) -> Result<(), QueueError> {
            Ok(())
        }
    }

    fn body(event: &str, data: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({ "event": event, "data": data })).unwrap()
    }

    #[tokio::test]
    async fn test_created_saves_record() {
        let store = Arc::new(MemoryRecordStore::new());
        let applier = EventApplier::new(store.clone());

        let outcome = applier
            .apply(&body("created", serde_json::json!({"id": 1, "title": "T", "body": "B"})))
            .await;

        assert_eq!(outcome, ApplyOutcome::Saved(1));
        let stored = store.get(1).await.unwrap();
        assert_eq!(stored.title, "T");
        assert_eq!(stored.body, "B");
    }

    #[tokio::test]
    async fn test_created_overwrites_existing() {
        let store = Arc::new(MemoryRecordStore::new());
        store.save(&Message::new(1, "old", "old body")).await.unwrap();
        let applier = EventApplier::new(store.clone());

        applier
            .apply(&body("created", serde_json::json!({"id": 1, "title": "new"})))
            .await;

        let stored = store.get(1).await.unwrap();
        assert_eq!(stored.title, "new");
        assert_eq!(stored.body, "");
    }

    #[tokio::test]
    async fn test_deleted_removes_record() {
        let store = Arc::new(MemoryRecordStore::new());
        store.save(&Message::new(5, "t", "b")).await.unwrap();
        let applier = EventApplier::new(store.clone());

        let outcome = applier.apply(&body("deleted", serde_json::json!({"id": 5}))).await;

        assert_eq!(outcome, ApplyOutcome::Deleted(5));
        assert!(matches!(store.get(5).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_deleted_missing_record_succeeds() {
        let store = Arc::new(MemoryRecordStore::new());
        let applier = EventApplier::new(store);

        let outcome = applier.apply(&body("deleted", serde_json::json!({"id": 99}))).await;
        assert_eq!(outcome, ApplyOutcome::Deleted(99));
    }

    #[tokio::test]
    async fn test_unknown_event_leaves_store_untouched() {
        let store = Arc::new(MemoryRecordStore::new());
        store.save(&Message::new(3, "keep", "me")).await.unwrap();
        let applier = EventApplier::new(store.clone());

        let outcome = applier
            .apply(&body("archived", serde_json::json!({"id": 3, "title": "changed"})))
            .await;

        assert_eq!(outcome, ApplyOutcome::Unknown("archived".to_string()));
        assert_eq!(store.get(3).await.unwrap().title, "keep");
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let store = Arc::new(MemoryRecordStore::new());
        let applier = EventApplier::new(store.clone());

        let outcome = applier.apply(b"{not json").await;

        assert!(matches!(outcome, ApplyOutcome::Malformed(_)));
        assert!(!outcome.is_applied());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let applier = EventApplier::new(Arc::new(BrokenStore));

        let saved = applier.apply(&body("updated", serde_json::json!({"id": 1}))).await;
        let deleted = applier.apply(&body("deleted", serde_json::json!({"id": 1}))).await;

        assert_eq!(
            saved,
            ApplyOutcome::StoreFailed(StoreError::Unavailable("redis save error".to_string()))
        );
        assert_eq!(
            deleted,
            ApplyOutcome::StoreFailed(StoreError::Unavailable("redis delete error".to_string()))
        );
    }

    #[tokio::test]
    async fn test_run_consumes_until_source_closes() {
        let store = Arc::new(MemoryRecordStore::new());
        let applier = EventApplier::new(store.clone());
        let (sender, mut source) = ChannelSource::channel(8);

        sender
            .send(body("created", serde_json::json!({"id": 1, "title": "T", "body": "B"})))
            .await
            .unwrap();
        sender.send(b"garbage".to_vec()).await.unwrap();
        sender
            .send(body("updated", serde_json::json!({"id": 1, "title": "T2", "body": "B2"})))
            .await
            .unwrap();
        drop(sender);

        let stats = applier.run(&mut source, &ShutdownSignal::new()).await.unwrap();

        assert_eq!(stats, ApplierStats { applied: 2, dropped: 1 });
        // Every message is acknowledged, including the dropped one
        assert_eq!(source.acked().len(), 3);
        assert_eq!(store.get(1).await.unwrap().title, "T2");
    }

    #[tokio::test]
    async fn test_run_acks_after_store_failure() {
        let applier = EventApplier::new(Arc::new(BrokenStore));
        let (sender, mut source) = ChannelSource::channel(8);
        sender.send(body("created", serde_json::json!({"id": 1}))).await.unwrap();
        drop(sender);

        let stats = applier.run(&mut source, &ShutdownSignal::new()).await.unwrap();

        assert_eq!(stats, ApplierStats { applied: 0, dropped: 1 });
        assert_eq!(source.acked(), ["1".to_string()]);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(MemoryRecordStore::new());
        let applier = EventApplier::new(store);
        // Keep the sender alive so the source never closes on its own
        let (_sender, mut source) = ChannelSource::channel(8);
        let shutdown = ShutdownSignal::new();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });

        let result =
            tokio::time::timeout(Duration::from_secs(1), applier.run(&mut source, &shutdown)).await;

        let stats = result.expect("applier did not stop").unwrap();
        assert_eq!(stats, ApplierStats::default());
    }

    #[tokio::test]
    async fn test_run_fails_when_declare_fails() {
        let applier = EventApplier::new(Arc::new(MemoryRecordStore::new()));

        let result = applier.run(&mut UndeclarableSource, &ShutdownSignal::new()).await;
        assert_eq!(
            result,
            Err(QueueError::Transport("connection refused".to_string()))
        );
    }
}
