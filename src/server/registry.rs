//! Connected clients and subscriber sets.
//!
//! Tracks which clients the server has handed an ID to and which of them
//! asked for rooms-list or per-room updates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::ClientId;

/// A client the server has completed the handshake with.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    /// Server-assigned ID
    pub client_id: ClientId,

    /// When the handshake was sent
    pub connected_at: DateTime<Utc>,

    /// Last message received from this client
    pub last_activity: DateTime<Utc>,

    /// Number of valid messages received
    pub messages_received: u64,
}

impl ClientConnection {
    pub fn new(client_id: ClientId) -> Self {
        let now = Utc::now();
        Self {
            client_id,
            connected_at: now,
            last_activity: now,
            messages_received: 0,
        }
    }

    /// Record an inbound message.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
        self.messages_received += 1;
    }
}

/// Connected clients by ID.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, ClientConnection>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client under a fresh UUID.
    pub fn connect(&mut self) -> ClientId {
        let client_id = Uuid::new_v4().to_string();
        self.clients
            .insert(client_id.clone(), ClientConnection::new(client_id.clone()));
        client_id
    }

    pub fn get(&self, client_id: &str) -> Option<&ClientConnection> {
        self.clients.get(client_id)
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Record activity; false if the client is unknown.
    pub fn touch(&mut self, client_id: &str) -> bool {
        match self.clients.get_mut(client_id) {
            Some(conn) => {
                conn.touch();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, client_id: &str) -> Option<ClientConnection> {
        self.clients.remove(client_id)
    }

    pub fn count(&self) -> usize {
        self.clients.len()
    }
}

/// A subscription registration.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub client_id: ClientId,
    pub subscribed_at: DateTime<Utc>,
}

/// Result of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Maximum number of subscribers ({max}) reached")]
pub struct SubscriberLimitReached {
    pub max: usize,
}

/// Capped set of subscribers, kept in subscription order.
#[derive(Debug, Clone)]
pub struct SubscriberSet {
    max_subscribers: usize,
    subscribers: Vec<Subscriber>,
}

impl SubscriberSet {
    pub fn new(max_subscribers: usize) -> Self {
        Self {
            max_subscribers,
            subscribers: Vec::new(),
        }
    }

    /// Register a client. Re-registering is a no-op and never hits the cap.
    pub fn add(&mut self, client_id: &str) -> Result<SubscribeOutcome, SubscriberLimitReached> {
        if self.contains(client_id) {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }
        if self.subscribers.len() >= self.max_subscribers {
            return Err(SubscriberLimitReached {
                max: self.max_subscribers,
            });
        }
        self.subscribers.push(Subscriber {
            client_id: client_id.to_string(),
            subscribed_at: Utc::now(),
        });
        Ok(SubscribeOutcome::Subscribed)
    }

    pub fn remove(&mut self, client_id: &str) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.client_id != client_id);
        self.subscribers.len() != before
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.subscribers.iter().any(|s| s.client_id == client_id)
    }

    /// Subscriber IDs in subscription order.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.subscribers.iter().map(|s| s.client_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
