//! Redis Stream event source.
//!
//! The upstream system appends one entry per lifecycle event to a stream
//! (`XADD messages:events * body '{"event": ..., "data": ...}'`). This source
//! reads it through a consumer group so that several mirror processes can
//! share the work, and acknowledges each entry with `XACK` once handled.

use async_trait::async_trait;
use deadpool_redis::redis::streams::{StreamReadOptions, StreamReadReply};
use deadpool_redis::redis::{cmd, AsyncCommands, Value as RedisValue};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

use super::{Delivery, EventSource, QueueError};

/// Stream entry field holding the raw payload
pub const BODY_FIELD: &str = "body";

/// How long a single XREADGROUP blocks (in milliseconds)
const READ_BLOCK_MS: usize = 2000;

/// Entries fetched per read
const READ_COUNT: usize = 10;

/// Consumer-group reader over a Redis Stream.
///
/// Entries are read in batches; any still buffered or in flight when the
/// consumer stops stay in the group's pending list and are not reclaimed.
pub struct RedisStreamSource {
    pool: Pool,
    stream: String,
    group: String,
    consumer: String,
    buffered: VecDeque<Delivery>,
}

impl RedisStreamSource {
    pub fn new(
        pool: Pool,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
            buffered: VecDeque::new(),
        }
    }

    /// Build a source with its own pool for `url`.
    pub fn from_url(
        url: &str,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self, QueueError> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| QueueError::Transport(format!("failed to create redis pool: {e}")))?;
        Ok(Self::new(pool, stream, group, consumer))
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    async fn connection(&self) -> Result<Connection, QueueError> {
        self.pool
            .get()
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))
    }

    /// Read the next batch of new entries into the local buffer.
    ///
    /// Returns `Ok(0)` when the blocking read timed out with nothing new.
    async fn fill(&mut self) -> Result<usize, QueueError> {
        let mut conn = self.connection().await?;

        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .block(READ_BLOCK_MS)
            .count(READ_COUNT);

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.stream], &[">"], &opts)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        let Some(reply) = reply else {
            return Ok(0);
        };

        let mut count = 0;
        for stream_key in reply.keys {
            for element in stream_key.ids {
                let body = extract_body(&element.map);
                self.buffered.push_back(Delivery::new(element.id, body));
                count += 1;
            }
        }

        debug!(stream = %self.stream, count = count, "Read stream entries");
        Ok(count)
    }
}

#[async_trait]
impl EventSource for RedisStreamSource {
    async fn declare(&mut self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;

        let result: Result<(), _> = cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => info!(
                stream = %self.stream,
                consumer_group = %self.group,
                "Created consumer group"
            ),
            Err(e) if e.to_string().contains("BUSYGROUP") => info!(
                stream = %self.stream,
                consumer_group = %self.group,
                "Consumer group already exists"
            ),
            Err(e) => return Err(QueueError::Transport(e.to_string())),
        }

        Ok(())
    }

    async fn recv(&mut self) -> Result<Delivery, QueueError> {
        loop {
            if let Some(delivery) = self.buffered.pop_front() {
                return Ok(delivery);
            }
            self.fill().await?;
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;

        let _: u64 = conn
            .xack(&self.stream, &self.group, &[&delivery.id])
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        Ok(())
    }
}

/// Pull the raw payload out of a stream entry.
///
/// A missing or non-string field yields an empty body, which the applier
/// rejects as malformed.
fn extract_body(map: &HashMap<String, RedisValue>) -> Vec<u8> {
    match map.get(BODY_FIELD) {
        Some(RedisValue::BulkString(bytes)) => bytes.clone(),
        Some(RedisValue::SimpleString(s)) => s.clone().into_bytes(),
        _ => Vec::new(),
    }
}
