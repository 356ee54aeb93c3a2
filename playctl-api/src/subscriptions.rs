//! Per-connection subscriptions and update fan-out
//!
//! Each WebSocket connection owns one entry in the table: an outbound
//! channel to its writer task plus its [`Subscription`]. Removing the entry
//! drops the channel sender, so nothing more is ever sent to a closed
//! connection.
//!
//! **Note:** `notify` is called by the state store while it holds its own
//! write lock. Messages are only enqueued here (unbounded channels, no
//! awaiting), which keeps same-field updates in write order for every
//! subscriber.

use playctl_common::protocol::is_truthy;
use playctl_common::{Fields, ServerFrame};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Opaque connection handle
pub type ConnectionId = Uuid;

/// Message for a connection's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// JSON text frame
    Text(String),
    /// Close the socket
    Close,
}

/// Declared interest of one connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscription {
    pub fields: HashSet<String>,
    pub all: bool,
}

impl Subscription {
    /// Whether an update to `field` goes to this connection
    pub fn wants(&self, field: &str) -> bool {
        self.all || self.fields.contains(field)
    }
}

struct Connection {
    tx: mpsc::UnboundedSender<Outgoing>,
    subscription: Subscription,
}

/// Connection → subscription table
#[derive(Default)]
pub struct SubscriptionManager {
    connections: Mutex<HashMap<ConnectionId, Connection>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<ConnectionId, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new connection with an empty subscription.
    ///
    /// Returns the connection id and the receiver its writer task drains.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let mut table = self.table();
        table.insert(
            id,
            Connection {
                tx,
                subscription: Subscription::default(),
            },
        );
        info!("WebSocket client {} connected, total clients: {}", id, table.len());
        (id, rx)
    }

    /// Drop a connection's entry. Safe to call more than once.
    pub fn disconnect(&self, id: ConnectionId) {
        let mut table = self.table();
        if table.remove(&id).is_some() {
            info!("WebSocket client {} disconnected, total clients: {}", id, table.len());
        }
    }

    /// Replace a connection's subscription.
    ///
    /// `fields` must be a list of strings; anything else is rejected and the
    /// previous subscription is kept. `all` follows loose truthiness.
    /// Returns the field list in request order (deduplicated) and the flag,
    /// for the `subscribed` reply.
    pub fn subscribe(
        &self,
        id: ConnectionId,
        fields: Option<&Value>,
        all: Option<&Value>,
    ) -> Result<(Vec<String>, bool)> {
        let malformed = || Error::Malformed("subscribe".to_string());

        let requested = fields.and_then(Value::as_array).ok_or_else(malformed)?;
        let mut ordered = Vec::with_capacity(requested.len());
        let mut set = HashSet::with_capacity(requested.len());
        for item in requested {
            let name = item.as_str().ok_or_else(malformed)?;
            if set.insert(name.to_string()) {
                ordered.push(name.to_string());
            }
        }
        let all = is_truthy(all);

        let mut table = self.table();
        if let Some(conn) = table.get_mut(&id) {
            conn.subscription = Subscription { fields: set, all };
            debug!("Client {} subscribed to {:?} (all: {})", id, ordered, all);
        }
        Ok((ordered, all))
    }

    /// Clear a connection's subscription; the connection stays open
    pub fn unsubscribe(&self, id: ConnectionId) {
        if let Some(conn) = self.table().get_mut(&id) {
            conn.subscription = Subscription::default();
            debug!("Client {} unsubscribed", id);
        }
    }

    /// Current subscription of a connection
    pub fn subscription(&self, id: ConnectionId) -> Option<Subscription> {
        self.table().get(&id).map(|conn| conn.subscription.clone())
    }

    /// Send one frame to one connection. A closed connection is a no-op.
    pub fn send(&self, id: ConnectionId, frame: &ServerFrame) {
        self.send_text(id, frame.to_json());
    }

    /// Send an already-encoded JSON text frame to one connection
    pub fn send_text(&self, id: ConnectionId, text: String) {
        if let Some(conn) = self.table().get(&id) {
            let _ = conn.tx.send(Outgoing::Text(text));
        }
    }

    /// Fan a changed field out to interested connections.
    ///
    /// Field subscribers get the single value; `all` subscribers get the
    /// whole `snapshot` (which already contains the new value). Entries whose
    /// writer task has gone away are purged.
    pub fn notify(&self, field: &str, value: &Value, snapshot: &Fields) {
        let mut table = self.table();
        if table.is_empty() {
            return;
        }

        let mut field_frame: Option<String> = None;
        let mut snapshot_frame: Option<String> = None;
        let mut closed = Vec::new();

        for (id, conn) in table.iter() {
            let text = if conn.subscription.all {
                snapshot_frame
                    .get_or_insert_with(|| ServerFrame::snapshot_update(snapshot.clone()).to_json())
                    .clone()
            } else if conn.subscription.fields.contains(field) {
                field_frame
                    .get_or_insert_with(|| {
                        ServerFrame::field_update(field, value.clone()).to_json()
                    })
                    .clone()
            } else {
                continue;
            };

            if conn.tx.send(Outgoing::Text(text)).is_err() {
                closed.push(*id);
            }
        }

        for id in closed {
            table.remove(&id);
            debug!("Purged closed client {}", id);
        }
    }

    /// Ask every connection to close and empty the table
    pub fn close_all(&self) {
        let mut table = self.table();
        let count = table.len();
        for conn in table.values() {
            let _ = conn.tx.send(Outgoing::Close);
        }
        table.clear();
        if count > 0 {
            info!("Closed {} WebSocket clients", count);
        }
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        self.table().len()
    }
}
