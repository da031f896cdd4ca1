// src/lib.rs

pub mod broker;
pub mod channel;
pub mod config;
pub mod env;
pub mod message;

pub use broker::{
    //
    reply_code,
    BrokerError,
    ChannelHandle,
    ChannelManager,
    Connection,
    MemoryQueueStore,
    QueueStore,
    QueueStorePtr,
    QueuedMessage,
    Result,
    Routed,
};
pub use channel::{
    //
    Channel,
    ChannelMode,
    CloseOutcome,
    CommitOutcome,
    Delivery,
    DeliveryContext,
    DeliveryTag,
    RecoverOutcome,
    RollbackOutcome,
};
pub use config::{ChannelSettings, EngineConfig};
pub use message::{DeliveryMode, Message, MessageProperties, QueueName};
