// src/message.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of a queue held by the queue store.
///
/// Cheap to clone; channels keep one per delivery so a message can be
/// requeued where it came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueName(pub Arc<str>);

impl QueueName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T> From<T> for QueueName
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        QueueName(value.into())
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    #[default]
    Transient,
    Persistent,
}

/// Basic properties carried alongside the payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageProperties {
    pub content_type: Option<String>,
    #[serde(default)]
    pub delivery_mode: DeliveryMode,
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, serde_json::Value>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl MessageProperties {
    pub fn transient() -> Self {
        Self::default()
    }

    pub fn persistent() -> Self {
        Self {
            delivery_mode: DeliveryMode::Persistent,
            ..Self::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.headers.insert(key.into(), value);
        self
    }
}

/// A published message. Immutable once created; queues and unacked tables
/// share it through an `Arc`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub properties: MessageProperties,
    pub payload: Bytes,
}

impl Message {
    /// Creates a message with a generated id and the current timestamp
    /// (unless the properties already carry one).
    pub fn new(payload: impl Into<Bytes>, mut properties: MessageProperties) -> Self {
        let id = Uuid::new_v4();
        if properties.message_id.is_none() {
            properties.message_id = Some(id.to_string());
        }
        if properties.timestamp.is_none() {
            properties.timestamp = Some(Utc::now());
        }

        Message {
            id,
            properties,
            payload: payload.into(),
        }
    }

    /// Serializes `value` as JSON and tags the message `application/json`.
    pub fn json<T: Serialize>(value: &T, properties: MessageProperties) -> serde_json::Result<Self> {
        let payload = serde_json::to_vec(value)?;
        Ok(Self::new(payload, properties.with_content_type("application/json")))
    }

    pub fn is_persistent(&self) -> bool {
        self.properties.delivery_mode == DeliveryMode::Persistent
    }

    pub fn into_shared(self) -> Arc<Message> {
        Arc::new(self)
    }
}
