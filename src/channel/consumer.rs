// src/channel/consumer.rs

use std::collections::HashMap;

use uuid::Uuid;

use crate::broker::errors::{BrokerError, Result};
use crate::message::QueueName;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerSpec {
    pub queue: QueueName,
    /// Deliveries to this consumer are acknowledged on delivery.
    pub no_ack: bool,
}

/// Pull consumers registered on one channel.
#[derive(Debug, Default)]
pub struct ConsumerRegistry {
    consumers: HashMap<String, ConsumerSpec>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a consumer and returns its tag; an empty tag gets a generated one.
    pub fn register(&mut self, consumer_tag: &str, spec: ConsumerSpec) -> Result<String> {
        let tag = if consumer_tag.is_empty() {
            format!("ctag-{}", Uuid::new_v4())
        } else {
            consumer_tag.to_string()
        };

        if self.consumers.contains_key(&tag) {
            return Err(BrokerError::ConsumerExists(tag));
        }
        self.consumers.insert(tag.clone(), spec);
        Ok(tag)
    }

    pub fn get(&self, consumer_tag: &str) -> Result<&ConsumerSpec> {
        self.consumers
            .get(consumer_tag)
            .ok_or_else(|| BrokerError::UnknownConsumer(consumer_tag.to_string()))
    }

    pub fn cancel(&mut self, consumer_tag: &str) -> Result<ConsumerSpec> {
        self.consumers
            .remove(consumer_tag)
            .ok_or_else(|| BrokerError::UnknownConsumer(consumer_tag.to_string()))
    }

    /// Removes every consumer, returning how many there were.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.consumers.len();
        self.consumers.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}
