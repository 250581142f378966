//! Model client.
//!
//! Tracks what one user would see: connection, the room they are joined to,
//! rooms that refused their password, and how many messages they received.
//! Also records which room the relay still counts them in, which can differ
//! from the joined room after a refused switch.

use std::collections::BTreeSet;

use super::operation::{ClientId, ModelRoomId};

/// Model client state.
#[derive(Debug, Clone)]
pub struct ModelClient {
    id: ClientId,
    pub(super) connected: bool,
    pub(super) active: Option<ModelRoomId>,
    pub(super) joined: Option<ModelRoomId>,
    pub(super) relay_room: Option<ModelRoomId>,
    pub(super) rejected: BTreeSet<ModelRoomId>,
    pub(super) received: usize,
}

impl ModelClient {
    /// Fresh, disconnected client.
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            connected: false,
            active: None,
            joined: None,
            relay_room: None,
            rejected: BTreeSet::new(),
            received: 0,
        }
    }

    /// Client identifier.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Whether the transport is up.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Room the client is joined to.
    pub fn joined(&self) -> Option<ModelRoomId> {
        self.joined
    }

    /// Room the relay counts the client in.
    pub fn relay_room(&self) -> Option<ModelRoomId> {
        self.relay_room
    }

    /// Rooms whose password was refused.
    pub fn rejected(&self) -> impl Iterator<Item = ModelRoomId> + '_ {
        self.rejected.iter().copied()
    }

    /// Messages received from others.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Transport went away, cleanly or not.
    pub(super) fn disconnect(&mut self) {
        self.connected = false;
        self.active = None;
        self.joined = None;
        self.relay_room = None;
    }
}
