//! Model relay.
//!
//! Rooms exist while they have members and remember the password they were
//! created with. Members are kept in join order.

use std::collections::BTreeMap;

use super::operation::{ClientId, ModelRoomId, PasswordId};

#[derive(Debug, Clone)]
struct ModelRoom {
    password: PasswordId,
    members: Vec<ClientId>,
}

/// Model relay state.
#[derive(Debug, Clone, Default)]
pub struct ModelRelay {
    rooms: BTreeMap<ModelRoomId, ModelRoom>,
}

impl ModelRelay {
    /// Relay with no rooms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `client` to `room`, moving it out of `previous`.
    ///
    /// Returns `false` (and changes nothing) if the room exists under a
    /// different password.
    pub fn join(
        &mut self,
        client: ClientId,
        room: ModelRoomId,
        password: PasswordId,
        previous: Option<ModelRoomId>,
    ) -> bool {
        if self.rooms.get(&room).is_some_and(|r| r.password != password) {
            return false;
        }

        if let Some(previous) = previous {
            self.remove(previous, client);
        }

        self.rooms
            .entry(room)
            .or_insert_with(|| ModelRoom { password, members: Vec::new() })
            .members
            .push(client);
        true
    }

    /// Take `client` out of `room`, destroying the room if it empties.
    pub fn remove(&mut self, room: ModelRoomId, client: ClientId) {
        let Some(entry) = self.rooms.get_mut(&room) else {
            return;
        };

        entry.members.retain(|m| *m != client);
        if entry.members.is_empty() {
            self.rooms.remove(&room);
        }
    }

    /// Members of a room in join order.
    pub fn members(&self, room: ModelRoomId) -> Option<&[ClientId]> {
        self.rooms.get(&room).map(|r| r.members.as_slice())
    }

    /// Whether `client` is in `room`.
    pub fn is_member(&self, room: ModelRoomId, client: ClientId) -> bool {
        self.members(room).is_some_and(|m| m.contains(&client))
    }

    /// Existing rooms in id order.
    pub fn rooms(&self) -> impl Iterator<Item = (ModelRoomId, &[ClientId])> {
        self.rooms.iter().map(|(id, r)| (*id, r.members.as_slice()))
    }
}
