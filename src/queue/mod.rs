pub mod memory;
pub mod redb;

use anyhow::Result;

/// A delivered message. `receipt` identifies this delivery for `ack`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub receipt: String,
    pub body: String,
}

/// At-least-once delivery channel. A received message that is never acked
/// becomes visible again under the queue's own redelivery policy.
pub trait JobQueue: Send + Sync {
    fn push(&self, queue: &str, body: &str) -> Result<()>;

    fn receive(&self, queue: &str) -> Result<Option<Message>>;

    fn ack(&self, queue: &str, message: &Message) -> Result<()>;
}
