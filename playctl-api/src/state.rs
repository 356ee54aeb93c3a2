//! Player state store
//!
//! Latest known value per field name. Written by the sync loop (and by
//! engine push updates), read by HTTP `GET` and by `all` subscribers.
//!
//! Writes are serialized by one lock; change detection and fan-out happen
//! under it, so a field's updates reach every subscriber in write order and
//! snapshots never mix two writes.

use playctl_common::Fields;
use serde_json::Value;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

use crate::subscriptions::SubscriptionManager;

/// Field table shared by all transports
pub struct StateStore {
    fields: RwLock<Fields>,
    subscriptions: Arc<SubscriptionManager>,
}

impl StateStore {
    /// Create an empty store that fans changes out through `subscriptions`
    pub fn new(subscriptions: Arc<SubscriptionManager>) -> Self {
        Self {
            fields: RwLock::new(Fields::new()),
            subscriptions,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Fields> {
        self.fields.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Fields> {
        self.fields.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `value` under `name` and notify subscribers.
    ///
    /// A value deep-equal to the stored one is a no-op: nothing is
    /// broadcast. Returns whether the field changed.
    pub fn set_field(&self, name: &str, value: Value) -> bool {
        let mut fields = self.write();
        if fields.get(name) == Some(&value) {
            return false;
        }

        trace!("Field {} changed", name);
        fields.insert(name.to_string(), value);
        if let Some(stored) = fields.get(name) {
            self.subscriptions.notify(name, stored, &fields);
        }
        true
    }

    /// Apply several fields one at a time. Returns how many changed.
    pub fn set_fields(&self, fields: Fields) -> usize {
        fields
            .into_iter()
            .filter(|(name, value)| self.set_field(name, value.clone()))
            .count()
    }

    /// Point-in-time copy of every field
    pub fn get_all(&self) -> Fields {
        self.read().clone()
    }

    /// Current value of one field
    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.read().get(name).cloned()
    }
}
