// src/channel/tag.rs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::broker::errors::{BrokerError, Result};

/// Channel-scoped delivery identifier.
///
/// Tags start at 1; `DeliveryTag(0)` is only meaningful as the "everything
/// delivered so far" argument of a multiple ack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryTag(pub u64);

impl DeliveryTag {
    pub const ALL: DeliveryTag = DeliveryTag(0);

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_all(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for DeliveryTag {
    fn from(value: u64) -> Self {
        DeliveryTag(value)
    }
}

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out strictly increasing tags for one channel.
///
/// A fresh allocator belongs to every newly opened channel, so reopening a
/// channel starts again from 1.
#[derive(Debug, Default)]
pub struct DeliveryTagAllocator {
    last: u64,
}

impl DeliveryTagAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails once `u64::MAX` has been issued; tags are never reused.
    pub fn next(&mut self) -> Result<DeliveryTag> {
        self.last = self.last.checked_add(1).ok_or(BrokerError::TagsExhausted)?;
        Ok(DeliveryTag(self.last))
    }

    /// Highest tag issued so far, `DeliveryTag(0)` before the first delivery.
    pub fn last(&self) -> DeliveryTag {
        DeliveryTag(self.last)
    }

    /// True if `tag` has been handed out by this allocator.
    pub fn was_issued(&self, tag: DeliveryTag) -> bool {
        tag.0 != 0 && tag.0 <= self.last
    }
}

#[cfg(test)]
impl DeliveryTagAllocator {
    pub(crate) fn resume_after(last: u64) -> Self {
        Self { last }
    }
}
