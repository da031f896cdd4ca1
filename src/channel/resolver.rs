// src/channel/resolver.rs

use tracing::{debug, info};

use crate::broker::errors::{BrokerError, Result};
use crate::broker::queue_store::Routed;
use crate::channel::{Channel, ChannelMode, TxEntry};

/// What a commit applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    pub published: usize,
    /// Publishes whose queue disappeared before the commit.
    pub dropped: usize,
    pub acked: usize,
}

/// What a rollback threw away.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RollbackOutcome {
    pub discarded_publishes: usize,
    /// Deliveries whose buffered ack was cancelled; they are outstanding again.
    pub unacked: usize,
}

impl Channel {
    fn ensure_transactional(&self, method: &str) -> Result<()> {
        match self.state.mode {
            ChannelMode::Transactional => Ok(()),
            ChannelMode::NonTransactional => Err(BrokerError::not_transactional(method)),
            ChannelMode::Closed => Err(BrokerError::ChannelClosed(self.id.clone())),
        }
    }

    /// tx.commit: applies buffered publishes, then buffered acks, each in the
    /// order they were issued.
    ///
    /// A publish whose queue was deleted during the transaction is dropped;
    /// the commit still succeeds.
    pub fn commit(&mut self) -> Result<CommitOutcome> {
        self.ensure_transactional("commit")?;

        let entries = self.state.tx.take();
        let mut outcome = CommitOutcome::default();
        let mut acks = Vec::new();

        for entry in entries {
            match entry {
                TxEntry::PendingPublish { message, target } => match self.store.enqueue(&target, message) {
                    Routed::Queued => outcome.published += 1,
                    Routed::Dropped => {
                        debug!(channel_id = %self.id, queue = %target, "Committed publish not routed");
                        outcome.dropped += 1;
                    }
                },
                TxEntry::PendingAck { tag, multiple } => acks.push((tag, multiple)),
            }
        }

        for (tag, multiple) in acks {
            outcome.acked += self.state.unacked.resolve_pending(tag, multiple).len();
        }

        info!(
            channel_id = %self.id,
            published = outcome.published,
            dropped = outcome.dropped,
            acked = outcome.acked,
            "Committed transaction"
        );
        Ok(outcome)
    }

    /// tx.rollback: discards buffered publishes and acks.
    ///
    /// Deliveries acked in the transaction stay in the unacked table and can
    /// be acked again. Nothing is requeued.
    pub fn rollback(&mut self) -> Result<RollbackOutcome> {
        self.ensure_transactional("rollback")?;

        let outcome = RollbackOutcome {
            discarded_publishes: self.state.tx.discard(),
            unacked: self.state.unacked.clear_pending(),
        };

        info!(
            channel_id = %self.id,
            discarded_publishes = outcome.discarded_publishes,
            unacked = outcome.unacked,
            "Rolled back transaction"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use crate::broker::errors::{reply_code, BrokerError};
    use crate::broker::MemoryQueueStore;
    use crate::channel::{Channel, DeliveryTag};
    use crate::message::{Message, MessageProperties, QueueName};
    use crate::QueueStorePtr;

    use super::*;

    fn setup() -> (QueueStorePtr, Channel) {
        let store = MemoryQueueStore::shared();
        store.declare(&QueueName::from("q"));
        let channel = Channel::open("ch-resolver", store.clone());
        (store, channel)
    }

    fn msg(body: &'static str) -> Message {
        Message::new(body, MessageProperties::transient())
    }

    fn count(store: &QueueStorePtr) -> Option<usize> {
        store.message_count(&QueueName::from("q"))
    }

    #[test]
    fn commit_outside_transaction_fails_and_changes_nothing() {
        let (_store, mut channel) = setup();
        let err = channel.commit().unwrap_err();
        assert_eq!(err.reply_code(), reply_code::PRECONDITION_FAILED);
        assert_eq!(channel.mode(), ChannelMode::NonTransactional);
    }

    #[test]
    fn rollback_outside_transaction_fails() {
        let (_store, mut channel) = setup();
        assert!(matches!(channel.rollback(), Err(BrokerError::PreconditionFailed(_))));
    }

    #[test]
    fn commit_applies_publishes_in_order() {
        let (store, mut channel) = setup();
        channel.tx_select().unwrap();
        channel.publish(msg("a"), "q").unwrap();
        channel.publish(msg("b"), "q").unwrap();

        let outcome = channel.commit().unwrap();
        assert_eq!(outcome, CommitOutcome { published: 2, dropped: 0, acked: 0 });
        assert_eq!(count(&store), Some(2));

        let first = store.dequeue(&QueueName::from("q")).unwrap().unwrap();
        assert_eq!(&first.message.payload[..], b"a");
        assert_eq!(channel.mode(), ChannelMode::Transactional);
        assert_eq!(channel.buffered_len(), 0);
    }

    #[test]
    fn commit_resolves_buffered_acks() {
        let (_store, mut channel) = setup();
        channel.publish(msg("a"), "q").unwrap();
        channel.publish(msg("b"), "q").unwrap();
        channel.tx_select().unwrap();
        channel.basic_get("q", false).unwrap();
        channel.basic_get("q", false).unwrap();
        channel.ack(DeliveryTag::ALL, true).unwrap();

        let outcome = channel.commit().unwrap();
        assert_eq!(outcome.acked, 2);
        assert_eq!(channel.unacked_count(), 0);
    }

    #[test]
    fn commit_only_resolves_acks_issued_in_the_transaction() {
        let (_store, mut channel) = setup();
        channel.publish(msg("a"), "q").unwrap();
        channel.publish(msg("b"), "q").unwrap();
        channel.tx_select().unwrap();
        let first = channel.basic_get("q", false).unwrap().unwrap();
        channel.ack(first.tag, false).unwrap();
        let second = channel.basic_get("q", false).unwrap().unwrap();

        channel.commit().unwrap();
        assert_eq!(channel.unacked_tags(), vec![second.tag]);
    }

    #[test]
    fn rollback_discards_publishes_and_reopens_acks() {
        let (store, mut channel) = setup();
        channel.publish(msg("a"), "q").unwrap();
        channel.tx_select().unwrap();
        let delivery = channel.basic_get("q", false).unwrap().unwrap();
        channel.ack(delivery.tag, false).unwrap();
        channel.publish(msg("b"), "q").unwrap();

        let outcome = channel.rollback().unwrap();
        assert_eq!(outcome, RollbackOutcome { discarded_publishes: 1, unacked: 1 });
        assert_eq!(count(&store), Some(0));
        assert_eq!(channel.unacked_tags(), vec![delivery.tag]);

        channel.ack(delivery.tag, false).unwrap();
        assert_eq!(channel.commit().unwrap().acked, 1);
        assert_eq!(channel.unacked_count(), 0);
    }

    // A queue deleted mid-transaction swallows its publishes; the commit still succeeds.
    #[test]
    fn commit_drops_publish_to_deleted_queue() {
        let (store, mut channel) = setup();
        channel.tx_select().unwrap();
        channel.publish(msg("a"), "q").unwrap();
        store.delete(&QueueName::from("q"));

        let outcome = channel.commit().unwrap();
        assert_eq!(outcome, CommitOutcome { published: 0, dropped: 1, acked: 0 });
    }
}
