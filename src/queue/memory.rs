use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Delivery, EventSource, QueueError};

/// An [`EventSource`] fed through a tokio channel.
///
/// Each body sent on the channel becomes one delivery with a sequential id.
/// The source reports [`QueueError::Closed`] once every sender is dropped and
/// the buffer is drained.
pub struct ChannelSource {
    receiver: mpsc::Receiver<Vec<u8>>,
    next_id: u64,
    acked: Vec<String>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            sender,
            Self {
                receiver,
                next_id: 0,
                acked: Vec::new(),
            },
        )
    }

    /// Ids acknowledged so far, in order.
    pub fn acked(&self) -> &[String] {
        &self.acked
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn declare(&mut self) -> Result<(), QueueError> {
        Ok(())
    }

    async fn recv(&mut self) -> Result<Delivery, QueueError> {
        let body = self.receiver.recv().await.ok_or(QueueError::Closed)?;
        self.next_id += 1;
        Ok(Delivery::new(self.next_id.to_string(), body))
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), QueueError> {
        self.acked.push(delivery.id.clone());
        Ok(())
    }
}
