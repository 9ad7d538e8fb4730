//! Event sources for the applier.
//!
//! An [`EventSource`] is a named consumption target that hands out raw
//! message bodies one at a time. Decoding is left to the applier.
//!
//! ## Sources
//!
//! - [`RedisStreamSource`]: Redis Stream read through a consumer group
//! - [`ChannelSource`]: tokio channel, for tests and in-process feeds

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::ChannelSource;
pub use self::redis::RedisStreamSource;

/// Errors raised by an event source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The broker connection or command failed
    #[error("queue transport error: {0}")]
    Transport(String),

    /// The source will never yield another message
    #[error("event source closed")]
    Closed,
}

/// A message received from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned message id (e.g. a stream entry id)
    pub id: String,

    /// Raw payload
    pub body: Vec<u8>,
}

impl Delivery {
    pub fn new(id: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
        }
    }
}

/// A sequential stream of queue messages.
#[async_trait]
pub trait EventSource: Send {
    /// Establish the consumption target (create it if missing).
    async fn declare(&mut self) -> Result<(), QueueError>;

    /// Wait for the next message.
    async fn recv(&mut self) -> Result<Delivery, QueueError>;

    /// Mark a message as consumed.
    async fn ack(&mut self, delivery: &Delivery) -> Result<(), QueueError>;
}
