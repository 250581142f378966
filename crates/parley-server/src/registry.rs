//! Room Registry
//!
//! Owns every piece of shared relay state: which sessions exist, which room
//! each is verified into, and the verifier that gates each room.
//!
//! ## Room lifecycle
//!
//! - Created by the first successful join; that joiner's verifier becomes
//!   the room's verifier for as long as the room exists
//! - Destroyed in the same step that removes its last member, so a stale
//!   verifier can never lock out the next group that picks the room name
//!
//! ## Design
//!
//! - Single owner: the driver holds the registry and nothing else touches the
//!   maps; every mutation completes before control returns
//! - Membership implies verification: a session is only ever listed in a
//!   room after its verifier matched

use std::collections::HashMap;

use parley_core::{DisplayName, RoomName};
use parley_proto::Verifier;

/// Identifier of one transport connection.
pub type SessionId = u64;

/// Maximum number of display names in a presence snapshot.
pub const MAX_PRESENCE_NAMES: usize = 200;

/// Per-connection state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionInfo {
    /// Room the session is verified into.
    pub room: Option<RoomName>,
    /// Display name, reset to the default when the session leaves a room.
    pub name: DisplayName,
    /// Set only by a successful join.
    pub verified: bool,
}

#[derive(Debug)]
struct Room {
    /// Members in join order.
    members: Vec<SessionId>,
    /// Verifier presented by the room's first joiner.
    verifier: Verifier,
}

/// Why the registry refused a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRejection {
    /// Verifier does not match the room's verifier.
    BadPassword,
    /// The session is not registered.
    UnknownSession,
}

/// A session's removal from a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Room the session left.
    pub room: RoomName,
    /// Whether the room was destroyed because it became empty.
    pub room_closed: bool,
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Room the session is now in.
    pub room: RoomName,
    /// Display name the session now carries.
    pub name: DisplayName,
    /// Room the session was in before, if any.
    pub previous: Option<Departure>,
    /// Whether this join created the room.
    pub created: bool,
}

/// Presence snapshot of one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    /// Room described.
    pub room: RoomName,
    /// Number of verified members.
    pub count: usize,
    /// Display names of verified members, at most [`MAX_PRESENCE_NAMES`].
    pub users: Vec<String>,
}

/// Mapping of rooms to members and verifiers.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    sessions: HashMap<SessionId, SessionInfo>,
    rooms: HashMap<RoomName, Room>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly connected session.
    ///
    /// Returns `false` if the id is already registered.
    pub fn register(&mut self, session_id: SessionId) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }

        self.sessions.insert(session_id, SessionInfo::default());
        true
    }

    /// Whether a session is registered.
    pub fn is_registered(&self, session_id: SessionId) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// State of a session.
    pub fn session(&self, session_id: SessionId) -> Option<&SessionInfo> {
        self.sessions.get(&session_id)
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether a room currently exists.
    pub fn has_room(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Admit a session to a room.
    ///
    /// Establishes the room with `verifier` if it does not exist, otherwise
    /// requires an exact verifier match. On rejection nothing changes, in
    /// particular the session keeps its current room. On success the session
    /// is removed from its previous room first.
    pub fn join(
        &mut self,
        session_id: SessionId,
        room: RoomName,
        name: DisplayName,
        verifier: &Verifier,
    ) -> Result<Admission, JoinRejection> {
        if !self.sessions.contains_key(&session_id) {
            return Err(JoinRejection::UnknownSession);
        }

        if let Some(existing) = self.rooms.get(&room) {
            if existing.verifier != *verifier {
                return Err(JoinRejection::BadPassword);
            }
        }

        let previous = self.detach(session_id);

        let created = !self.rooms.contains_key(&room);
        self.rooms
            .entry(room.clone())
            .or_insert_with(|| Room { members: Vec::new(), verifier: verifier.clone() })
            .members
            .push(session_id);

        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.room = Some(room.clone());
            session.name = name.clone();
            session.verified = true;
        }

        Ok(Admission { room, name, previous, created })
    }

    /// Remove a session from its room. No-op if it is in none.
    pub fn leave(&mut self, session_id: SessionId) -> Option<Departure> {
        self.detach(session_id)
    }

    /// Forget a session entirely, removing it from its room first.
    pub fn unregister(&mut self, session_id: SessionId) -> Option<Departure> {
        let departure = self.detach(session_id);
        self.sessions.remove(&session_id);
        departure
    }

    /// Room a session is verified into.
    pub fn room_of(&self, session_id: SessionId) -> Option<&RoomName> {
        self.sessions.get(&session_id).filter(|s| s.verified).and_then(|s| s.room.as_ref())
    }

    /// Verified members of `room` in join order, optionally excluding one.
    pub fn peers(&self, room: &str, exclude: Option<SessionId>) -> Vec<SessionId> {
        self.rooms
            .get(room)
            .map(|r| {
                r.members
                    .iter()
                    .copied()
                    .filter(|id| Some(*id) != exclude)
                    .filter(|id| self.sessions.get(id).is_some_and(|s| s.verified))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Presence snapshot of `room`.
    pub fn presence(&self, room: &RoomName) -> Presence {
        let members = self.peers(room.as_str(), None);
        let users = members
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .map(|s| s.name.to_string())
            .take(MAX_PRESENCE_NAMES)
            .collect();

        Presence { room: room.clone(), count: members.len(), users }
    }

    /// Take a session out of its room, destroying the room if it empties.
    fn detach(&mut self, session_id: SessionId) -> Option<Departure> {
        let session = self.sessions.get_mut(&session_id)?;
        let room = session.room.take()?;
        session.name = DisplayName::default();
        session.verified = false;

        let room_closed = match self.rooms.get_mut(&room) {
            Some(entry) => {
                entry.members.retain(|id| *id != session_id);
                entry.members.is_empty()
            },
            None => true,
        };

        if room_closed {
            self.rooms.remove(&room);
        }

        Some(Departure { room, room_closed })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lobby() -> RoomName {
        RoomName::resolve("lobby")
    }

    fn name(raw: &str) -> DisplayName {
        DisplayName::resolve(raw)
    }

    #[test]
    fn register_rejects_duplicate_ids() {
        let mut registry = RoomRegistry::new();
        assert!(registry.register(1));
        assert!(!registry.register(1));
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn join_unknown_session_is_rejected() {
        let mut registry = RoomRegistry::new();
        let result = registry.join(9, lobby(), name("a"), &Verifier::new("v1"));
        assert_eq!(result.unwrap_err(), JoinRejection::UnknownSession);
        assert!(!registry.has_room("lobby"));
    }

    #[test]
    fn detach_resets_session_state() {
        let mut registry = RoomRegistry::new();
        registry.register(1);
        registry.join(1, lobby(), name("ann"), &Verifier::new("v1")).unwrap();

        registry.leave(1);

        assert_eq!(registry.session(1), Some(&SessionInfo::default()));
    }

    #[test]
    fn peers_preserve_join_order() {
        let mut registry = RoomRegistry::new();
        for id in [30, 10, 20] {
            registry.register(id);
            registry.join(id, lobby(), name("x"), &Verifier::new("v1")).unwrap();
        }

        assert_eq!(registry.peers("lobby", None), vec![30, 10, 20]);
        assert_eq!(registry.peers("lobby", Some(10)), vec![30, 20]);
    }

    #[test]
    fn presence_names_are_capped() {
        let mut registry = RoomRegistry::new();
        for id in 0..(MAX_PRESENCE_NAMES as u64 + 5) {
            registry.register(id);
            registry.join(id, lobby(), name("x"), &Verifier::new("v1")).unwrap();
        }

        let presence = registry.presence(&lobby());
        assert_eq!(presence.count, MAX_PRESENCE_NAMES + 5);
        assert_eq!(presence.users.len(), MAX_PRESENCE_NAMES);
    }
}
