// src/broker/mod.rs
// Queue storage, connections and managed channels around the channel engine

pub mod errors;
pub mod queue_store;

mod channel_manager;
mod connection;
mod memory_store;

// Re-export specific items to simplify imports elsewhere
pub use channel_manager::{ChannelHandle, ChannelManager};
pub use connection::Connection;
pub use errors::{reply_code, BrokerError, Result};
pub use memory_store::MemoryQueueStore;
pub use queue_store::{QueueStore, QueueStorePtr, QueuedMessage, Routed};
