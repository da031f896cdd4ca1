// src/channel/lifecycle.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::broker::errors::Result;
use crate::channel::{Channel, ChannelMode, Delivery};
use crate::message::{Message, QueueName};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CloseOutcome {
    pub requeued: usize,
    pub discarded_publishes: usize,
    pub cancelled_consumers: usize,
}

#[derive(Clone, Debug, Default)]
pub enum RecoverOutcome {
    /// Outstanding deliveries to hand out again under their existing tags.
    Redeliver(Vec<Delivery>),
    /// Number of deliveries returned to their queues.
    Requeued(usize),
    #[default]
    Nothing,
}

impl RecoverOutcome {
    pub fn redeliveries(&self) -> &[Delivery] {
        match self {
            RecoverOutcome::Redeliver(deliveries) => deliveries,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RecoverOutcome::Redeliver(deliveries) => deliveries.len(),
            RecoverOutcome::Requeued(count) => *count,
            RecoverOutcome::Nothing => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Channel {
    /// Closes the channel. Closing twice is a no-op.
    pub fn close(&mut self) -> CloseOutcome {
        self.shutdown("client close")
    }

    /// basic.recover.
    ///
    /// With `requeue` false the outstanding deliveries are flagged redelivered
    /// and returned with their current tags; they stay in the unacked table.
    /// With `requeue` true they leave the table and go back to their queues.
    /// Deliveries whose ack is waiting for commit are left alone either way.
    pub fn recover(&mut self, requeue: bool) -> Result<RecoverOutcome> {
        self.ensure_open()?;

        let outcome = if requeue {
            let deliveries = self.state.unacked.take_outstanding();
            let count = deliveries.len();
            self.requeue(deliveries);
            RecoverOutcome::Requeued(count)
        } else {
            RecoverOutcome::Redeliver(self.state.unacked.mark_redelivered())
        };

        debug!(channel_id = %self.id, requeue, count = outcome.len(), "Recovered");
        Ok(outcome)
    }

    fn shutdown(&mut self, reason: &str) -> CloseOutcome {
        if self.state.mode == ChannelMode::Closed {
            return CloseOutcome::default();
        }

        let discarded_publishes = self.state.tx.discard();
        let deliveries = self.state.unacked.drain_all();
        let requeued = deliveries.len();
        self.requeue(deliveries);
        let cancelled_consumers = self.state.consumers.cancel_all();
        self.state.mode = ChannelMode::Closed;

        info!(
            channel_id = %self.id,
            reason,
            requeued,
            discarded_publishes,
            cancelled_consumers,
            "Closed channel"
        );

        CloseOutcome {
            requeued,
            discarded_publishes,
            cancelled_consumers,
        }
    }

    /// Returns deliveries to their queues, one batch per queue in tag order.
    fn requeue(&self, deliveries: Vec<Delivery>) {
        let mut by_queue: BTreeMap<QueueName, Vec<Arc<Message>>> = BTreeMap::new();
        for delivery in deliveries {
            by_queue.entry(delivery.queue).or_default().push(delivery.message);
        }

        for (queue, messages) in by_queue {
            self.store.requeue_front(&queue, messages);
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.shutdown("dropped");
    }
}
