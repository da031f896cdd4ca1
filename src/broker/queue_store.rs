// src/broker/queue_store.rs

use std::sync::Arc;

use crate::broker::errors::Result;
use crate::message::{Message, QueueName};

/// A message handed out by the store.
#[derive(Clone, Debug)]
pub struct QueuedMessage {
    pub message: Arc<Message>,
    /// Set once the message has been delivered and returned to the queue.
    pub redelivered: bool,
}

/// Result of an enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routed {
    Queued,
    /// The target queue does not exist; the message is gone.
    Dropped,
}

/// Storage contract for named FIFO queues.
///
/// Implementations must keep per-producer FIFO order and must be safe to call
/// from many channels concurrently.
pub trait QueueStore: Send + Sync {
    /// Creates the queue if missing. Returns `true` when it was created.
    fn declare(&self, queue: &QueueName) -> bool;

    /// Appends a message. Never fails: a missing queue drops the message.
    fn enqueue(&self, queue: &QueueName, message: Arc<Message>) -> Routed;

    /// Takes the next deliverable message, if any.
    fn dequeue(&self, queue: &QueueName) -> Result<Option<QueuedMessage>>;

    /// Puts messages back at the head of the queue, keeping their relative
    /// order, and marks them redelivered. Missing queues drop them.
    fn requeue_front(&self, queue: &QueueName, messages: Vec<Arc<Message>>);

    /// Removes the queue, returning how many messages it still held.
    fn delete(&self, queue: &QueueName) -> Option<usize>;

    fn purge(&self, queue: &QueueName) -> Option<usize>;

    fn message_count(&self, queue: &QueueName) -> Option<usize>;

    fn exists(&self, queue: &QueueName) -> bool {
        self.message_count(queue).is_some()
    }
}

/// Shared queue store pointer, cloned into every channel.
pub type QueueStorePtr = Arc<dyn QueueStore>;
