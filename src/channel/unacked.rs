// src/channel/unacked.rs

use std::collections::BTreeMap;

use crate::broker::errors::{BrokerError, Result};
use crate::channel::{Delivery, DeliveryTag};

#[derive(Debug)]
struct UnackedEntry {
    delivery: Delivery,
    /// Acked inside a transaction that has not committed yet.
    ack_pending: bool,
}

#[derive(Debug, Default)]
pub struct UnackedDeliveryTable {
    entries: BTreeMap<DeliveryTag, UnackedEntry>,
}

impl UnackedDeliveryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, delivery: Delivery) -> Result<()> {
        let tag = delivery.tag;
        if self.entries.contains_key(&tag) {
            return Err(BrokerError::DuplicateTag(tag));
        }
        self.entries.insert(
            tag,
            UnackedEntry {
                delivery,
                ack_pending: false,
            },
        );
        Ok(())
    }

    /// Acknowledges deliveries, removing them from the table.
    ///
    /// With `multiple`, removes every tag up to and including `tag`
    /// (`DeliveryTag::ALL` removes everything); `tag` itself need not be
    /// present. Without it, `tag` must be present.
    pub fn resolve(&mut self, tag: DeliveryTag, multiple: bool) -> Result<Vec<DeliveryTag>> {
        if !multiple {
            return match self.entries.remove(&tag) {
                Some(_) => Ok(vec![tag]),
                None => Err(BrokerError::UnknownDeliveryTag(tag)),
            };
        }

        let removed = if tag.is_all() {
            std::mem::take(&mut self.entries)
        } else {
            match tag.0.checked_add(1) {
                Some(bound) => {
                    let rest = self.entries.split_off(&DeliveryTag(bound));
                    std::mem::replace(&mut self.entries, rest)
                }
                None => std::mem::take(&mut self.entries),
            }
        };

        Ok(removed.into_keys().collect())
    }

    /// Flags deliveries as acked-pending-commit without removing them.
    ///
    /// Same selection rules as [`resolve`](Self::resolve), except that
    /// entries already pending are not outstanding: a single ack naming one
    /// fails, a multiple ack skips them.
    pub fn mark_pending(&mut self, tag: DeliveryTag, multiple: bool) -> Result<Vec<DeliveryTag>> {
        if !multiple {
            return match self.entries.get_mut(&tag) {
                Some(entry) if !entry.ack_pending => {
                    entry.ack_pending = true;
                    Ok(vec![tag])
                }
                _ => Err(BrokerError::UnknownDeliveryTag(tag)),
            };
        }

        let marked = self
            .entries
            .iter_mut()
            .take_while(|(key, _)| tag.is_all() || **key <= tag)
            .filter(|(_, entry)| !entry.ack_pending)
            .map(|(key, entry)| {
                entry.ack_pending = true;
                *key
            })
            .collect();

        Ok(marked)
    }

    /// Removes deliveries previously flagged by [`mark_pending`](Self::mark_pending).
    pub fn resolve_pending(&mut self, tag: DeliveryTag, multiple: bool) -> Vec<DeliveryTag> {
        let tags: Vec<DeliveryTag> = if multiple {
            self.entries
                .iter()
                .take_while(|(key, _)| tag.is_all() || **key <= tag)
                .filter(|(_, entry)| entry.ack_pending)
                .map(|(key, _)| *key)
                .collect()
        } else {
            match self.entries.get(&tag) {
                Some(entry) if entry.ack_pending => vec![tag],
                _ => Vec::new(),
            }
        };

        for tag in &tags {
            self.entries.remove(tag);
        }
        tags
    }

    /// Makes every pending delivery outstanding again. Returns how many were reset.
    pub fn clear_pending(&mut self) -> usize {
        let mut reset = 0;
        for entry in self.entries.values_mut().filter(|entry| entry.ack_pending) {
            entry.ack_pending = false;
            reset += 1;
        }
        reset
    }

    /// Removes and returns every delivery in tag order.
    pub fn drain_all(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.entries)
            .into_values()
            .map(|entry| entry.delivery)
            .collect()
    }

    /// Removes and returns the deliveries that are not pending commit.
    pub fn take_outstanding(&mut self) -> Vec<Delivery> {
        let tags: Vec<DeliveryTag> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.ack_pending)
            .map(|(tag, _)| *tag)
            .collect();

        tags.into_iter()
            .filter_map(|tag| self.entries.remove(&tag))
            .map(|entry| entry.delivery)
            .collect()
    }

    /// Flags outstanding deliveries as redelivered and returns copies of them,
    /// leaving the table otherwise untouched.
    pub fn mark_redelivered(&mut self) -> Vec<Delivery> {
        self.entries
            .values_mut()
            .filter(|entry| !entry.ack_pending)
            .map(|entry| {
                entry.delivery.redelivered = true;
                entry.delivery.clone()
            })
            .collect()
    }

    pub fn get(&self, tag: DeliveryTag) -> Option<&Delivery> {
        self.entries.get(&tag).map(|entry| &entry.delivery)
    }

    pub fn contains(&self, tag: DeliveryTag) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn is_pending(&self, tag: DeliveryTag) -> bool {
        self.entries.get(&tag).is_some_and(|entry| entry.ack_pending)
    }

    pub fn pending_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.ack_pending).count()
    }

    pub fn tags(&self) -> Vec<DeliveryTag> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
