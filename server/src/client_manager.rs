//! Client slot table for the connection manager
//!
//! This module tracks every open connection, including:
//! - A bounded table of slots, reused first-free on accept
//! - The outgoing message channel feeding each connection's writer task
//! - The reader/writer task handles, so a connection can be torn down
//!
//! Slot ids double as client identifiers for the matchmaking queue and the
//! session registry. A slot is only handed out again after the previous
//! connection's disconnect has been processed by the event loop.

use log::{debug, info};
use shared::ServerMessage;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Index into the client table.
pub type SlotId = usize;

/// One connected socket
///
/// Messages pushed through [`Client::send`] are written to the socket in
/// order by the connection's writer task.
#[derive(Debug)]
pub struct Client {
    /// Slot this client occupies
    pub id: SlotId,
    /// Peer address, for logging
    pub addr: SocketAddr,
    /// When the connection was accepted
    pub connected_at: Instant,
    outbox: mpsc::UnboundedSender<ServerMessage>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Client {
    pub fn new(id: SlotId, addr: SocketAddr, outbox: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            outbox,
            reader: None,
            writer: None,
        }
    }

    /// Remembers the socket tasks serving this client.
    pub fn attach_tasks(&mut self, reader: JoinHandle<()>, writer: JoinHandle<()>) {
        self.reader = Some(reader);
        self.writer = Some(writer);
    }

    /// Queues a message for the writer task. Returns false if the writer is gone.
    pub fn send(&self, message: ServerMessage) -> bool {
        debug!("Send {} to {}", message, self.id);
        self.outbox.send(message).is_ok()
    }

    /// Stops reading and lets the writer flush what is queued, then close
    /// the socket. The returned handle completes once the writer is done.
    pub fn close(mut self) -> Option<JoinHandle<()>> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.writer.take()
    }
}

/// Bounded table of client slots
///
/// Capacity is fixed at startup. New connections take the lowest free slot;
/// when every slot is taken the caller must reject the connection.
pub struct ClientManager {
    slots: Vec<Option<Client>>,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            slots: (0..max_clients).map(|_| None).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Lowest unoccupied slot, if any.
    pub fn free_slot(&self) -> Option<SlotId> {
        self.slots.iter().position(Option::is_none)
    }

    /// Puts a new client into the first free slot.
    ///
    /// Returns `None` if the table is full.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        outbox: mpsc::UnboundedSender<ServerMessage>,
    ) -> Option<SlotId> {
        let id = self.free_slot()?;
        self.slots[id] = Some(Client::new(id, addr, outbox));
        info!("Client {} connected from {}", id, addr);
        Some(id)
    }

    /// Frees the slot and hands the client back for teardown.
    pub fn remove_client(&mut self, id: SlotId) -> Option<Client> {
        let client = self.slots.get_mut(id)?.take()?;
        info!(
            "Client {} ({}) disconnected after {:?}",
            id,
            client.addr,
            client.connected_at.elapsed()
        );
        Some(client)
    }

    pub fn get(&self, id: SlotId) -> Option<&Client> {
        self.slots.get(id)?.as_ref()
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut Client> {
        self.slots.get_mut(id)?.as_mut()
    }

    /// Queues a message for one client. Returns false if the slot is empty
    /// or the connection is already going away.
    pub fn send(&self, id: SlotId, message: ServerMessage) -> bool {
        self.get(id).is_some_and(|client| client.send(message))
    }

    /// Queues the same message for every connected client.
    pub fn broadcast(&self, message: ServerMessage) {
        for client in self.slots.iter().flatten() {
            client.send(message);
        }
    }

    /// Empties every slot.
    pub fn drain(&mut self) -> Vec<Client> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
