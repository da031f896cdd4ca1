// src/channel/delivery.rs

use std::sync::Arc;

use crate::channel::DeliveryTag;
use crate::message::{Message, QueueName};

/// How a delivery left its queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryContext {
    /// basic.get
    Get,
    /// Pulled by the named consumer.
    Consumer(String),
}

/// A message handed to a channel, identified by its tag.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub message: Arc<Message>,
    /// Queue the message came from; requeues go back here.
    pub queue: QueueName,
    pub context: DeliveryContext,
    pub redelivered: bool,
}

impl Delivery {
    pub fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    pub fn consumer_tag(&self) -> Option<&str> {
        match &self.context {
            DeliveryContext::Consumer(tag) => Some(tag),
            DeliveryContext::Get => None,
        }
    }
}
