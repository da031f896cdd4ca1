// src/channel/mod.rs

mod consumer;
mod delivery;
mod lifecycle;
mod resolver;
mod tag;
mod tx_buffer;
mod unacked;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::broker::errors::{BrokerError, Result};
use crate::broker::queue_store::{QueueStorePtr, QueuedMessage, Routed};
use crate::message::{Message, QueueName};

pub use consumer::{ConsumerRegistry, ConsumerSpec};
pub use delivery::{Delivery, DeliveryContext};
pub use lifecycle::{CloseOutcome, RecoverOutcome};
pub use resolver::{CommitOutcome, RollbackOutcome};
pub use tag::{DeliveryTag, DeliveryTagAllocator};
pub use tx_buffer::{ChannelMode, TxBuffer, TxEntry};
pub use unacked::UnackedDeliveryTable;

/// Mutable per-channel bookkeeping.
#[derive(Debug)]
pub struct ChannelState {
    pub mode: ChannelMode,
    pub tags: DeliveryTagAllocator,
    pub unacked: UnackedDeliveryTable,
    pub tx: TxBuffer,
    pub consumers: ConsumerRegistry,
}

impl ChannelState {
    pub fn new() -> Self {
        Self {
            mode: ChannelMode::NonTransactional,
            tags: DeliveryTagAllocator::new(),
            unacked: UnackedDeliveryTable::new(),
            tx: TxBuffer::new(),
            consumers: ConsumerRegistry::new(),
        }
    }
}

impl Default for ChannelState {
    fn default() -> Self {
        Self::new()
    }
}

/// Outside a transaction publishes and acks apply at once; after
/// [`Channel::tx_select`] they wait for commit or rollback.
pub struct Channel {
    id: String,
    store: QueueStorePtr,
    state: ChannelState,
}

impl Channel {
    /// Opens a channel over `store` with fresh state: tags restart at 1.
    pub fn open(id: impl Into<String>, store: QueueStorePtr) -> Self {
        let id = id.into();
        debug!(channel_id = %id, "Opened channel");

        Self {
            id,
            store,
            state: ChannelState::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> ChannelMode {
        self.state.mode
    }

    pub fn is_open(&self) -> bool {
        !self.state.mode.is_closed()
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn unacked_count(&self) -> usize {
        self.state.unacked.len()
    }

    pub fn unacked_tags(&self) -> Vec<DeliveryTag> {
        self.state.unacked.tags()
    }

    /// Number of publishes and acks waiting for commit.
    pub fn buffered_len(&self) -> usize {
        self.state.tx.len()
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.state.mode.is_closed() {
            return Err(BrokerError::ChannelClosed(self.id.clone()));
        }
        Ok(())
    }

    /// tx.select: switches the channel into transactional mode for the rest
    /// of its life. Selecting again is a no-op.
    pub fn tx_select(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.state.mode == ChannelMode::NonTransactional {
            self.state.mode = ChannelMode::Transactional;
            info!(channel_id = %self.id, "Channel is now transactional");
        }
        Ok(())
    }

    /// basic.publish to the named queue.
    ///
    /// A publish to a queue that does not exist is dropped without error.
    pub fn publish(&mut self, message: Message, target: impl Into<QueueName>) -> Result<()> {
        self.ensure_open()?;
        let target = target.into();
        let message = Arc::new(message);

        match self.state.mode {
            ChannelMode::Transactional => {
                debug!(channel_id = %self.id, queue = %target, message_id = %message.id, "Buffered publish");
                self.state.tx.push_publish(message, target);
            }
            _ => {
                if self.store.enqueue(&target, message) == Routed::Dropped {
                    debug!(channel_id = %self.id, queue = %target, "Publish not routed");
                }
            }
        }
        Ok(())
    }

    /// basic.get. With `no_ack` the delivery is acknowledged on the spot and
    /// never enters the unacked table.
    pub fn basic_get(&mut self, queue: impl Into<QueueName>, no_ack: bool) -> Result<Option<Delivery>> {
        self.ensure_open()?;
        let queue = queue.into();

        match self.store.dequeue(&queue)? {
            Some(queued) => self.deliver(queued, queue, DeliveryContext::Get, no_ack).map(Some),
            None => Ok(None),
        }
    }

    /// basic.consume. Returns the consumer tag, generated when `consumer_tag` is empty.
    pub fn basic_consume(
        &mut self,
        queue: impl Into<QueueName>,
        consumer_tag: &str,
        no_ack: bool,
    ) -> Result<String> {
        self.ensure_open()?;
        let queue = queue.into();
        if !self.store.exists(&queue) {
            return Err(BrokerError::QueueNotFound(queue.to_string()));
        }

        let tag = self
            .state
            .consumers
            .register(consumer_tag, ConsumerSpec { queue: queue.clone(), no_ack })?;
        debug!(channel_id = %self.id, consumer_tag = %tag, queue = %queue, no_ack, "Consumer registered");
        Ok(tag)
    }

    /// Pulls the next message for a registered consumer.
    pub fn next_delivery(&mut self, consumer_tag: &str) -> Result<Option<Delivery>> {
        self.ensure_open()?;
        let spec = self.state.consumers.get(consumer_tag)?.clone();

        match self.store.dequeue(&spec.queue)? {
            Some(queued) => self
                .deliver(
                    queued,
                    spec.queue,
                    DeliveryContext::Consumer(consumer_tag.to_string()),
                    spec.no_ack,
                )
                .map(Some),
            None => Ok(None),
        }
    }

    /// basic.cancel. Deliveries already made to the consumer stay unacked.
    pub fn basic_cancel(&mut self, consumer_tag: &str) -> Result<()> {
        self.ensure_open()?;
        self.state.consumers.cancel(consumer_tag)?;
        debug!(channel_id = %self.id, consumer_tag, "Consumer cancelled");
        Ok(())
    }

    /// basic.ack.
    ///
    /// Tags are validated now in both modes. Outside a transaction the
    /// deliveries are removed at once; inside one they are flagged and the
    /// ack is buffered until commit.
    pub fn ack(&mut self, tag: impl Into<DeliveryTag>, multiple: bool) -> Result<()> {
        self.ensure_open()?;
        let tag = tag.into();

        // A tag above anything delivered on this channel can never have been outstanding.
        if multiple && !tag.is_all() && !self.state.tags.was_issued(tag) {
            return Err(BrokerError::UnknownDeliveryTag(tag));
        }

        if self.state.mode.is_transactional() {
            let marked = self.state.unacked.mark_pending(tag, multiple)?;
            self.state.tx.push_ack(tag, multiple);
            debug!(channel_id = %self.id, tag = %tag, multiple, marked = marked.len(), "Buffered ack");
        } else {
            let acked = self.state.unacked.resolve(tag, multiple)?;
            debug!(channel_id = %self.id, tag = %tag, multiple, acked = acked.len(), "Acked");
        }
        Ok(())
    }

    fn deliver(
        &mut self,
        queued: QueuedMessage,
        queue: QueueName,
        context: DeliveryContext,
        no_ack: bool,
    ) -> Result<Delivery> {
        let tag = match self.state.tags.next() {
            Ok(tag) => tag,
            Err(err) => {
                warn!(channel_id = %self.id, queue = %queue, "Delivery tags exhausted, returning message");
                self.store.requeue_front(&queue, vec![queued.message]);
                return Err(err);
            }
        };

        let delivery = Delivery {
            tag,
            message: queued.message,
            queue,
            context,
            redelivered: queued.redelivered,
        };

        if !no_ack {
            if let Err(err) = self.state.unacked.record(delivery.clone()) {
                warn!(channel_id = %self.id, tag = %delivery.tag, "Tag already outstanding, returning message");
                self.store
                    .requeue_front(&delivery.queue, vec![delivery.message.clone()]);
                return Err(err);
            }
        }

        debug!(
            channel_id = %self.id,
            tag = %delivery.tag,
            queue = %delivery.queue,
            redelivered = delivery.redelivered,
            no_ack,
            "Delivered"
        );
        Ok(delivery)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryQueueStore;
    use crate::message::MessageProperties;

    fn setup() -> (QueueStorePtr, Channel) {
        let store = MemoryQueueStore::shared();
        store.declare(&QueueName::from("q"));
        let channel = Channel::open("ch-test", store.clone());
        (store, channel)
    }

    fn msg(body: &'static str) -> Message {
        Message::new(body, MessageProperties::transient())
    }

    #[test]
    fn publish_outside_transaction_is_visible_immediately() {
        let (store, mut channel) = setup();
        channel.publish(msg("a"), "q").unwrap();
        assert_eq!(store.message_count(&QueueName::from("q")), Some(1));
    }

    #[test]
    fn publish_inside_transaction_is_buffered() {
        let (store, mut channel) = setup();
        channel.tx_select().unwrap();
        channel.publish(msg("a"), "q").unwrap();

        assert_eq!(store.message_count(&QueueName::from("q")), Some(0));
        assert_eq!(channel.buffered_len(), 1);
    }

    #[test]
    fn tx_select_is_idempotent() {
        let (_store, mut channel) = setup();
        channel.tx_select().unwrap();
        channel.tx_select().unwrap();
        assert_eq!(channel.mode(), ChannelMode::Transactional);
    }

    #[test]
    fn get_allocates_increasing_tags() {
        let (_store, mut channel) = setup();
        channel.publish(msg("a"), "q").unwrap();
        channel.publish(msg("b"), "q").unwrap();

        let first = channel.basic_get("q", false).unwrap().unwrap();
        let second = channel.basic_get("q", true).unwrap().unwrap();

        assert_eq!(first.tag, DeliveryTag(1));
        assert_eq!(second.tag, DeliveryTag(2));
        assert_eq!(channel.unacked_tags(), vec![DeliveryTag(1)]);
    }

    #[test]
    fn get_on_missing_queue_fails() {
        let (_store, mut channel) = setup();
        assert_eq!(
            channel.basic_get("missing", false).unwrap_err(),
            BrokerError::QueueNotFound("missing".into())
        );
    }

    #[test]
    fn ack_outside_transaction_resolves_immediately() {
        let (_store, mut channel) = setup();
        channel.publish(msg("a"), "q").unwrap();
        let delivery = channel.basic_get("q", false).unwrap().unwrap();

        channel.ack(delivery.tag, false).unwrap();
        assert_eq!(channel.unacked_count(), 0);
        assert_eq!(
            channel.ack(delivery.tag, false),
            Err(BrokerError::UnknownDeliveryTag(delivery.tag))
        );
    }

    #[test]
    fn ack_inside_transaction_keeps_delivery_until_commit() {
        let (_store, mut channel) = setup();
        channel.publish(msg("a"), "q").unwrap();
        channel.tx_select().unwrap();
        let delivery = channel.basic_get("q", false).unwrap().unwrap();

        channel.ack(delivery.tag, false).unwrap();
        assert_eq!(channel.unacked_count(), 1);
        assert!(channel.state().unacked.is_pending(delivery.tag));
    }

    #[test]
    fn multiple_ack_beyond_last_tag_is_rejected() {
        let (_store, mut channel) = setup();
        channel.publish(msg("a"), "q").unwrap();
        let delivery = channel.basic_get("q", false).unwrap().unwrap();

        assert_eq!(
            channel.ack(delivery.tag.0 + 1, true),
            Err(BrokerError::UnknownDeliveryTag(DeliveryTag(2)))
        );
        assert_eq!(channel.unacked_count(), 1);
    }

    #[test]
    fn multiple_ack_of_already_acked_tag_is_accepted() {
        let (_store, mut channel) = setup();
        channel.publish(msg("a"), "q").unwrap();
        channel.publish(msg("b"), "q").unwrap();
        let first = channel.basic_get("q", false).unwrap().unwrap();
        channel.ack(first.tag, false).unwrap();
        let second = channel.basic_get("q", false).unwrap().unwrap();

        channel.ack(first.tag, true).unwrap();
        assert_eq!(channel.unacked_tags(), vec![second.tag]);
    }

    #[test]
    fn consumer_deliveries_carry_consumer_tag() {
        let (_store, mut channel) = setup();
        channel.publish(msg("a"), "q").unwrap();
        let ctag = channel.basic_consume("q", "worker", false).unwrap();

        let delivery = channel.next_delivery(&ctag).unwrap().unwrap();
        assert_eq!(delivery.consumer_tag(), Some("worker"));
        assert_eq!(channel.unacked_count(), 1);
        assert!(channel.next_delivery(&ctag).unwrap().is_none());
    }

    #[test]
    fn no_ack_consumer_leaves_nothing_unacked() {
        let (_store, mut channel) = setup();
        channel.publish(msg("a"), "q").unwrap();
        let ctag = channel.basic_consume("q", "", true).unwrap();

        assert!(channel.next_delivery(&ctag).unwrap().is_some());
        assert_eq!(channel.unacked_count(), 0);
    }

    #[test]
    fn cancelled_consumer_keeps_its_unacked_deliveries() {
        let (_store, mut channel) = setup();
        channel.publish(msg("a"), "q").unwrap();
        channel.basic_consume("q", "worker", false).unwrap();
        channel.next_delivery("worker").unwrap();

        channel.basic_cancel("worker").unwrap();
        assert_eq!(channel.unacked_count(), 1);
        assert_eq!(
            channel.next_delivery("worker").unwrap_err(),
            BrokerError::UnknownConsumer("worker".into())
        );
    }

    #[test]
    fn consume_on_missing_queue_fails() {
        let (_store, mut channel) = setup();
        assert_eq!(
            channel.basic_consume("missing", "worker", false).unwrap_err(),
            BrokerError::QueueNotFound("missing".into())
        );
    }

    #[test]
    fn exhausted_tags_leave_message_on_queue() {
        let (store, mut channel) = setup();
        channel.publish(msg("a"), "q").unwrap();
        channel.state.tags = DeliveryTagAllocator::resume_after(u64::MAX);

        assert!(matches!(channel.basic_get("q", false), Err(BrokerError::TagsExhausted)));
        assert_eq!(channel.unacked_count(), 0);
        assert_eq!(store.message_count(&QueueName::from("q")), Some(1));
    }
}
