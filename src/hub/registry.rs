//! Live client registry owned by the hub event loop

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::websocket::Message;

use super::ClientId;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Registry entry for one accepted connection.
///
/// The entry holds the only sender of the connection's outbound buffer, so
/// dropping the entry is what closes the buffer. `serial` is unique per
/// process and tells apart two connections that claim the same id.
#[derive(Debug)]
pub struct Connection {
    pub id: ClientId,
    pub connected_at: DateTime<Utc>,
    serial: u64,
    sender: mpsc::Sender<Message>,
    channels: HashSet<String>,
}

impl Connection {
    /// Create a connection record and the receiving half of its outbound buffer
    pub fn open(id: ClientId, capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id,
            connected_at: Utc::now(),
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            sender,
            channels: HashSet::new(),
        };
        (connection, receiver)
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    /// Whether a message should be delivered to this connection
    pub fn accepts(&self, message: &Message) -> bool {
        message.is_global() || self.is_subscribed(&message.channel)
    }

    fn recipient(&self) -> Recipient {
        Recipient {
            id: self.id.clone(),
            serial: self.serial,
            sender: self.sender.clone(),
        }
    }

    fn info(&self) -> ClientInfo {
        let mut channels: Vec<String> = self.channels.iter().cloned().collect();
        channels.sort();
        ClientInfo {
            id: self.id.clone(),
            channels,
            connected_at: self.connected_at,
        }
    }
}

/// Why a non-blocking enqueue was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// Outbound buffer is at capacity (slow or stuck consumer)
    Full,
    /// Outbound pump is gone
    Closed,
}

impl DeliveryFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Closed => "closed",
        }
    }
}

/// Delivery target copied out of the registry so that enqueueing happens
/// without holding the registry lock.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub id: ClientId,
    pub serial: u64,
    sender: mpsc::Sender<Message>,
}

impl Recipient {
    pub fn try_deliver(&self, message: Message) -> Result<(), DeliveryFailure> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryFailure::Full,
            TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}

/// Point-in-time view of a single client
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub id: ClientId,
    pub channels: Vec<String>,
    pub connected_at: DateTime<Utc>,
}

/// Consistent point-in-time view of the whole registry
#[derive(Debug, Clone, Serialize)]
pub struct HubSnapshot {
    pub count: usize,
    pub taken_at: DateTime<Utc>,
    pub clients: Vec<ClientInfo>,
}

impl HubSnapshot {
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|c| c.id.clone()).collect()
    }

    /// Distinct channels with at least one subscriber at snapshot time
    pub fn channel_count(&self) -> usize {
        self.clients
            .iter()
            .flat_map(|c| c.channels.iter())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// client_id -> Connection
///
/// The per-connection channel set is the only record of subscriptions; there
/// is no reverse channel index to keep in sync.
#[derive(Debug, Default)]
pub struct Registry {
    clients: HashMap<ClientId, Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection. A duplicate id is refused and handed back.
    pub fn insert(&mut self, connection: Connection) -> Result<(), Connection> {
        if self.clients.contains_key(&connection.id) {
            return Err(connection);
        }
        self.clients.insert(connection.id.clone(), connection);
        Ok(())
    }

    /// Remove a connection, closing its outbound buffer. Returns false if the
    /// id is not registered or is held by a different connection.
    pub fn remove(&mut self, id: &ClientId, serial: u64) -> bool {
        match self.clients.get(id) {
            Some(connection) if connection.serial == serial => {
                self.clients.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Returns false if the id is not registered
    pub fn subscribe(&mut self, id: &ClientId, channel: &str) -> bool {
        match self.clients.get_mut(id) {
            Some(connection) => {
                connection.channels.insert(channel.to_string());
                true
            }
            None => false,
        }
    }

    /// Returns false if the id is not registered
    pub fn unsubscribe(&mut self, id: &ClientId, channel: &str) -> bool {
        match self.clients.get_mut(id) {
            Some(connection) => {
                connection.channels.remove(channel);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.clients.contains_key(id)
    }

    pub fn get(&self, id: &ClientId) -> Option<&Connection> {
        self.clients.get(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Every connection the message should reach
    pub fn recipients(&self, message: &Message) -> Vec<Recipient> {
        self.clients
            .values()
            .filter(|c| c.accepts(message))
            .map(Connection::recipient)
            .collect()
    }

    pub fn recipient(&self, id: &ClientId) -> Option<Recipient> {
        self.clients.get(id).map(Connection::recipient)
    }

    /// Drop every connection, closing all outbound buffers
    pub fn clear(&mut self) -> usize {
        let count = self.clients.len();
        self.clients.clear();
        count
    }

    pub fn snapshot(&self) -> HubSnapshot {
        let mut clients: Vec<ClientInfo> = self.clients.values().map(Connection::info).collect();
        clients.sort_by(|a, b| a.id.cmp(&b.id));

        HubSnapshot {
            count: clients.len(),
            taken_at: Utc::now(),
            clients,
        }
    }
}
