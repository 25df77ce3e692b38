//! The queue transport seam.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueResult;

/// A message handed out by [`MessageQueue::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub body: String,
    /// Token that acknowledges this particular delivery.
    pub receipt_handle: String,
    /// How many times this message has been delivered, including this one.
    pub receive_count: u32,
}

/// An at-least-once message queue.
///
/// A received message stays hidden from other receivers until it is deleted
/// or its visibility timeout lapses, after which it is delivered again.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Queue name, for logging.
    fn name(&self) -> &str;

    /// Publish a message body. Returns the message id.
    async fn send(&self, body: String) -> QueueResult<String>;

    /// Receive up to `max_messages`, waiting at most `wait` for the first
    /// one to arrive. An empty vector means the wait elapsed.
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> QueueResult<Vec<ReceivedMessage>>;

    /// Acknowledge a delivery so the message is never redelivered.
    async fn delete(&self, receipt_handle: &str) -> QueueResult<()>;

    /// Approximate count of messages waiting to be received.
    async fn approximate_depth(&self) -> QueueResult<u64>;
}
