//! Connected clients and the client registry
//!
//! A `Client` pairs a connection identity with its unique display name and
//! the outbound message channel drained by that connection's writer task.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::{uniquify, ClientId};

/// Connected client information
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this client
    pub id: ClientId,
    /// Display name, unique among connected clients
    pub name: String,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Client {
    /// Create a new client with the given ID, name and sender channel
    pub fn new(id: ClientId, name: String, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, name, sender }
    }

    /// Queue a message for this client without waiting
    ///
    /// Returns an error if the channel is closed (client disconnected) or
    /// the client's outbound queue is full.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Closed(_) => SendError::ChannelClosed,
            TrySendError::Full(_) => SendError::Lagging,
        })
    }
}

/// Registry of every client that finished registration
///
/// Owned by the `ChatServer` actor, so each operation runs to completion
/// before the next one starts.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, Client>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a unique name derived from `preferred` and insert the client
    ///
    /// Returns the assigned name.
    pub fn register_unique(
        &mut self,
        id: ClientId,
        preferred: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> String {
        let name = uniquify(preferred, |candidate| {
            self.clients.values().any(|c| c.name == candidate)
        });
        self.clients
            .insert(id, Client::new(id, name.clone(), sender));
        name
    }

    /// Remove a client; removing an unknown client is a no-op
    pub fn unregister(&mut self, id: ClientId) -> Option<Client> {
        self.clients.remove(&id)
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    /// Find the connected client with the given display name
    pub fn lookup_by_name(&self, name: &str) -> Option<ClientId> {
        self.clients
            .values()
            .find(|c| c.name == name)
            .map(|c| c.id)
    }

    /// Snapshot of all display names, sorted
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.values().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
