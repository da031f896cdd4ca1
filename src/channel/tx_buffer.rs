// src/channel/tx_buffer.rs

use std::sync::Arc;

use crate::channel::DeliveryTag;
use crate::message::{Message, QueueName};

/// Transactional state of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelMode {
    NonTransactional,
    Transactional,
    Closed,
}

impl ChannelMode {
    pub fn is_transactional(self) -> bool {
        self == ChannelMode::Transactional
    }

    pub fn is_closed(self) -> bool {
        self == ChannelMode::Closed
    }
}

/// Side effect held back until the transaction commits.
#[derive(Clone, Debug)]
pub enum TxEntry {
    PendingPublish {
        message: Arc<Message>,
        target: QueueName,
    },
    PendingAck {
        tag: DeliveryTag,
        multiple: bool,
    },
}

/// Ordered buffer of transactional side effects.
#[derive(Debug, Default)]
pub struct TxBuffer {
    entries: Vec<TxEntry>,
}

impl TxBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_publish(&mut self, message: Arc<Message>, target: QueueName) {
        self.entries.push(TxEntry::PendingPublish { message, target });
    }

    pub fn push_ack(&mut self, tag: DeliveryTag, multiple: bool) {
        self.entries.push(TxEntry::PendingAck { tag, multiple });
    }

    /// Takes every entry in issuance order, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<TxEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Drops every entry. Returns how many publishes were thrown away.
    pub fn discard(&mut self) -> usize {
        self.take()
            .iter()
            .filter(|entry| matches!(entry, TxEntry::PendingPublish { .. }))
            .count()
    }

    pub fn pending_publishes(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, TxEntry::PendingPublish { .. }))
            .count()
    }

    pub fn pending_acks(&self) -> usize {
        self.entries.len() - self.pending_publishes()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageProperties;

    fn publish(buffer: &mut TxBuffer, body: &'static str) {
        let message = Message::new(body, MessageProperties::transient()).into_shared();
        buffer.push_publish(message, QueueName::from("q"));
    }

    #[test]
    fn entries_keep_issuance_order() {
        let mut buffer = TxBuffer::new();
        publish(&mut buffer, "a");
        buffer.push_ack(DeliveryTag(1), false);
        publish(&mut buffer, "b");

        let entries = buffer.take();
        assert!(buffer.is_empty());
        assert_eq!(entries.len(), 3);
        assert!(matches!(&entries[0], TxEntry::PendingPublish { message, .. } if &message.payload[..] == b"a"));
        assert!(matches!(entries[1], TxEntry::PendingAck { tag: DeliveryTag(1), multiple: false }));
        assert!(matches!(&entries[2], TxEntry::PendingPublish { message, .. } if &message.payload[..] == b"b"));
    }

    #[test]
    fn discard_counts_publishes_only() {
        let mut buffer = TxBuffer::new();
        publish(&mut buffer, "a");
        publish(&mut buffer, "b");
        buffer.push_ack(DeliveryTag::ALL, true);

        assert_eq!(buffer.pending_publishes(), 2);
        assert_eq!(buffer.pending_acks(), 1);
        assert_eq!(buffer.discard(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn closed_mode_is_not_transactional() {
        assert!(ChannelMode::Transactional.is_transactional());
        assert!(!ChannelMode::Closed.is_transactional());
        assert!(ChannelMode::Closed.is_closed());
    }
}
