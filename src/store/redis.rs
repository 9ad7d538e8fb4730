//! Redis-backed record store.
//!
//! Each record is stored as a JSON string under `message:{id}` with no
//! expiry. Listing walks the keyspace with `SCAN MATCH message:*` and fetches
//! every key individually so that one corrupt entry cannot fail the listing.

use async_trait::async_trait;
use deadpool_redis::redis::{cmd, AsyncCommands};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use tracing::{debug, error, info, warn};

use super::{decode, encode, none_found, not_found, RecordStore, StoreError};
use crate::message::{message_key, Message, KEY_PATTERN};

/// Keys requested per SCAN round trip
const SCAN_BATCH: usize = 100;

/// Record store over a Redis connection pool.
#[derive(Clone)]
pub struct RedisRecordStore {
    pool: Pool,
}

impl RedisRecordStore {
    /// Wrap an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pool for `url` (e.g. `redis://:secret@localhost:6379/0`).
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Unavailable(format!("failed to create redis pool: {e}")))?;
        Ok(Self::new(pool))
    }

    /// The underlying pool, shared with the event stream consumer.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Check connectivity with a `PING`.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: String = cmd("PING").query_async(&mut conn).await.map_err(|e| {
            error!(error = %e, "Redis PING failed");
            StoreError::Unavailable(format!("redis ping error: {e}"))
        })?;
        info!("Connected to Redis");
        Ok(())
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        self.pool.get().await.map_err(|e| {
            error!(error = %e, "Failed to get Redis connection");
            StoreError::Unavailable("redis connection error".to_string())
        })
    }

    /// Collect every key matching the record pattern.
    async fn scan_keys(&self, conn: &mut Connection) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(KEY_PATTERN)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(conn)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to scan message keys");
                    StoreError::Unavailable("error fetching keys".to_string())
                })?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn get(&self, id: i64) -> Result<Message, StoreError> {
        let mut conn = self.connection().await?;
        let key = message_key(id);

        let raw: Option<String> = conn.get(&key).await.map_err(|e| {
            error!(key = %key, error = %e, "Redis GET failed");
            StoreError::Unavailable("redis get error".to_string())
        })?;

        match raw {
            Some(raw) => decode(&raw),
            None => Err(not_found()),
        }
    }

    async fn get_all(&self) -> Result<Vec<Message>, StoreError> {
        let mut conn = self.connection().await?;
        let keys = self.scan_keys(&mut conn).await?;

        let mut messages = Vec::with_capacity(keys.len());
        for key in &keys {
            let raw: Option<String> = match conn.get(key).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping key that failed to fetch");
                    continue;
                }
            };

            // Deleted between SCAN and GET
            let Some(raw) = raw else { continue };

            match decode(&raw) {
                Ok(message) => messages.push(message),
                Err(_) => warn!(key = %key, "Skipping key that failed to decode"),
            }
        }

        debug!(keys = keys.len(), messages = messages.len(), "Listed messages");

        if messages.is_empty() {
            return Err(none_found());
        }
        Ok(messages)
    }

    async fn save(&self, message: &Message) -> Result<(), StoreError> {
        let data = encode(message)?;
        let mut conn = self.connection().await?;
        let key = message.key();

        let _: () = conn.set(&key, data).await.map_err(|e| {
            error!(key = %key, error = %e, "Redis SET failed");
            StoreError::Unavailable("redis save error".to_string())
        })?;

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let key = message_key(id);

        let removed: u64 = conn.del(&key).await.map_err(|e| {
            error!(key = %key, error = %e, "Redis DEL failed");
            StoreError::Unavailable("redis delete error".to_string())
        })?;

        debug!(key = %key, removed = removed, "Deleted message key");
        Ok(())
    }
}
