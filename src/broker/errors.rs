// src/broker/errors.rs

use thiserror::Error;

use crate::channel::DeliveryTag;

/// AMQP reply codes attached to channel-level failures.
pub mod reply_code {
    pub const NOT_FOUND: u16 = 404;
    pub const PRECONDITION_FAILED: u16 = 406;
    pub const CHANNEL_ERROR: u16 = 504;
    pub const NOT_ALLOWED: u16 = 530;
    pub const INTERNAL_ERROR: u16 = 541;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// tx.commit / tx.rollback on a channel that never issued tx.select.
    #[error("PRECONDITION_FAILED - {0}")]
    PreconditionFailed(String),

    #[error("PRECONDITION_FAILED - unknown delivery tag {0}")]
    UnknownDeliveryTag(DeliveryTag),

    #[error("NOT_FOUND - no queue '{0}'")]
    QueueNotFound(String),

    #[error("channel {0} is closed")]
    ChannelClosed(String),

    #[error("NOT_ALLOWED - attempt to reuse consumer tag '{0}'")]
    ConsumerExists(String),

    #[error("PRECONDITION_FAILED - unknown consumer tag '{0}'")]
    UnknownConsumer(String),

    /// The allocator handed out a tag that is already outstanding.
    #[error("INTERNAL_ERROR - delivery tag {0} recorded twice")]
    DuplicateTag(DeliveryTag),

    #[error("INTERNAL_ERROR - delivery tags exhausted on this channel")]
    TagsExhausted,

    /// The task driving a channel has stopped.
    #[error("channel task is no longer running")]
    ChannelUnavailable,
}

impl BrokerError {
    pub fn reply_code(&self) -> u16 {
        match self {
            BrokerError::PreconditionFailed(_)
            | BrokerError::UnknownDeliveryTag(_)
            | BrokerError::UnknownConsumer(_) => reply_code::PRECONDITION_FAILED,
            BrokerError::QueueNotFound(_) => reply_code::NOT_FOUND,
            BrokerError::ChannelClosed(_) | BrokerError::ChannelUnavailable => reply_code::CHANNEL_ERROR,
            BrokerError::ConsumerExists(_) => reply_code::NOT_ALLOWED,
            BrokerError::DuplicateTag(_) | BrokerError::TagsExhausted => reply_code::INTERNAL_ERROR,
        }
    }

    /// Errors that mean the channel itself can no longer be used.
    pub fn is_channel_fatal(&self) -> bool {
        matches!(
            self,
            BrokerError::ChannelClosed(_)
                | BrokerError::ChannelUnavailable
                | BrokerError::DuplicateTag(_)
                | BrokerError::TagsExhausted
        )
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, BrokerError::DuplicateTag(_) | BrokerError::TagsExhausted)
    }

    pub(crate) fn not_transactional(method: &str) -> Self {
        BrokerError::PreconditionFailed(format!("channel is not transactional, cannot {method}"))
    }
}

// Custom Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;
