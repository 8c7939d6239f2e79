//! Connected sockets and the players they belong to.
//!
//! The receiver adds entries on accept and removes them on disconnect; the
//! broadcaster removes entries whose writes fail. Both go through one
//! `RwLock<ConnectionTable>` so neither sees a half-updated roster. Player
//! records themselves live in the resolver's game state.

use log::info;
use shared::PlayerId;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::{Mutex, Notify};

/// Write half of a client socket, shared between the table and the broadcaster.
pub type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

pub struct Connection {
    pub id: PlayerId,
    pub addr: SocketAddr,
    pub writer: SharedWriter,
    /// Wakes the connection's reader task when someone else closes it.
    pub closed: Arc<Notify>,
}

impl Connection {
    pub fn new<W>(id: PlayerId, addr: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            addr,
            writer: Arc::new(Mutex::new(Box::new(writer))),
            closed: Arc::new(Notify::new()),
        }
    }
}

pub struct ConnectionTable {
    connections: BTreeMap<PlayerId, Connection>,
    /// Next player id. Ids are never reused during the process lifetime.
    next_player_id: PlayerId,
    max_clients: usize,
}

impl ConnectionTable {
    pub fn new(max_clients: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            next_player_id: 1,
            max_clients,
        }
    }

    pub fn is_full(&self) -> bool {
        self.connections.len() >= self.max_clients
    }

    /// Registers a new connection. Returns `None` when the table is full.
    pub fn add<W>(&mut self, addr: SocketAddr, writer: W) -> Option<PlayerId>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        if self.is_full() {
            return None;
        }

        let id = self.next_player_id;
        self.next_player_id += 1;

        info!("Client {} connected from {}", id, addr);
        self.connections.insert(id, Connection::new(id, addr, writer));
        Some(id)
    }

    /// Removes a connection. Only the first caller for a given id gets it back,
    /// which keeps the disconnect path from running twice.
    pub fn remove(&mut self, id: PlayerId) -> Option<Connection> {
        let removed = self.connections.remove(&id);
        if let Some(connection) = &removed {
            info!("Client {} disconnected ({})", id, connection.addr);
        }
        removed
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn closed_signal(&self, id: PlayerId) -> Option<Arc<Notify>> {
        self.connections.get(&id).map(|c| Arc::clone(&c.closed))
    }

    pub fn addr_of(&self, id: PlayerId) -> Option<SocketAddr> {
        self.connections.get(&id).map(|c| c.addr)
    }

    /// Snapshot of writers for the broadcaster, taken so no write happens
    /// while the table lock is held.
    pub fn writers(&self) -> Vec<(PlayerId, SharedWriter)> {
        self.connections
            .iter()
            .map(|(id, c)| (*id, Arc::clone(&c.writer)))
            .collect()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.connections.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
