// src/broker/connection.rs

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};
use uuid::Uuid;

use crate::broker::channel_manager::{ChannelHandle, ChannelManager};
use crate::broker::memory_store::MemoryQueueStore;
use crate::broker::queue_store::QueueStorePtr;
use crate::channel::Channel;
use crate::config::ChannelSettings;
use crate::message::QueueName;

/// Opens channels against one shared queue store.
///
/// Channel ids are `<id_prefix>-<n>`, unique for the life of the connection.
/// Each channel gets fresh state, so reopening starts delivery tags at 1.
pub struct Connection {
    id: Uuid,
    store: QueueStorePtr,
    settings: ChannelSettings,
    channels_opened: AtomicU64,
}

impl Connection {
    pub fn new(store: QueueStorePtr, settings: ChannelSettings) -> Self {
        let id = Uuid::new_v4();
        info!(connection_id = %id, prefix = %settings.id_prefix, "Opened connection");

        Self {
            id,
            store,
            settings,
            channels_opened: AtomicU64::new(0),
        }
    }

    /// Connection backed by a fresh [`MemoryQueueStore`].
    pub fn in_memory(settings: ChannelSettings) -> Self {
        Self::new(MemoryQueueStore::shared(), settings)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn store(&self) -> &QueueStorePtr {
        &self.store
    }

    pub fn open_channel(&self) -> Channel {
        let n = self.channels_opened.fetch_add(1, Ordering::Relaxed) + 1;
        Channel::open(format!("{}-{}", self.settings.id_prefix, n), self.store.clone())
    }

    /// Opens a channel driven by its own task. Requires a tokio runtime.
    pub fn open_managed_channel(&self) -> ChannelHandle {
        ChannelManager::spawn(self.open_channel(), self.settings.command_buffer)
    }

    pub fn declare_queue(&self, queue: impl Into<QueueName>) -> bool {
        let queue = queue.into();
        let created = self.store.declare(&queue);
        debug!(connection_id = %self.id, queue = %queue, created, "queue.declare");
        created
    }

    /// queue.delete. Buffered publishes aimed at the queue will be dropped at commit.
    pub fn delete_queue(&self, queue: impl Into<QueueName>) -> Option<usize> {
        let queue = queue.into();
        let dropped = self.store.delete(&queue);
        debug!(connection_id = %self.id, queue = %queue, ?dropped, "queue.delete");
        dropped
    }

    pub fn purge_queue(&self, queue: impl Into<QueueName>) -> Option<usize> {
        self.store.purge(&queue.into())
    }

    pub fn message_count(&self, queue: impl Into<QueueName>) -> Option<usize> {
        self.store.message_count(&queue.into())
    }
}
