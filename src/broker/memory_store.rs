// src/broker/memory_store.rs

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::broker::errors::{BrokerError, Result};
use crate::broker::queue_store::{QueueStore, QueueStorePtr, QueuedMessage, Routed};
use crate::message::{Message, QueueName};

#[derive(Default)]
pub struct MemoryQueueStore {
    queues: Mutex<HashMap<QueueName, VecDeque<QueuedMessage>>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> QueueStorePtr {
        Arc::new(Self::new())
    }

    // A poisoned lock only means another thread panicked mid-operation; the
    // map itself is never left half-updated, so keep serving it.
    fn lock(&self) -> MutexGuard<'_, HashMap<QueueName, VecDeque<QueuedMessage>>> {
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl QueueStore for MemoryQueueStore {
    fn declare(&self, queue: &QueueName) -> bool {
        let mut queues = self.lock();
        if queues.contains_key(queue) {
            return false;
        }
        queues.insert(queue.clone(), VecDeque::new());
        debug!(queue = %queue, "Declared queue");
        true
    }

    fn enqueue(&self, queue: &QueueName, message: Arc<Message>) -> Routed {
        let mut queues = self.lock();
        match queues.get_mut(queue) {
            Some(messages) => {
                messages.push_back(QueuedMessage {
                    message,
                    redelivered: false,
                });
                Routed::Queued
            }
            None => {
                debug!(queue = %queue, message_id = %message.id, "No such queue, dropping message");
                Routed::Dropped
            }
        }
    }

    fn dequeue(&self, queue: &QueueName) -> Result<Option<QueuedMessage>> {
        let mut queues = self.lock();
        let messages = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        Ok(messages.pop_front())
    }

    fn requeue_front(&self, queue: &QueueName, messages: Vec<Arc<Message>>) {
        if messages.is_empty() {
            return;
        }

        let mut queues = self.lock();
        let Some(existing) = queues.get_mut(queue) else {
            warn!(queue = %queue, count = messages.len(), "Queue gone, requeued messages dropped");
            return;
        };

        for message in messages.into_iter().rev() {
            existing.push_front(QueuedMessage {
                message,
                redelivered: true,
            });
        }
    }

    fn delete(&self, queue: &QueueName) -> Option<usize> {
        let removed = self.lock().remove(queue).map(|messages| messages.len());
        if let Some(count) = removed {
            debug!(queue = %queue, dropped = count, "Deleted queue");
        }
        removed
    }

    fn purge(&self, queue: &QueueName) -> Option<usize> {
        let mut queues = self.lock();
        queues.get_mut(queue).map(|messages| {
            let count = messages.len();
            messages.clear();
            count
        })
    }

    fn message_count(&self, queue: &QueueName) -> Option<usize> {
        self.lock().get(queue).map(VecDeque::len)
    }
}
