//! Fan-out of room traffic.
//!
//! Builds the broadcast actions for a room from the registry's current
//! membership. Recipients are resolved here, at processing time, so a frame
//! can never reach a session that had already left when it was relayed.

use parley_core::RoomName;
use parley_proto::{ServerFrame, SystemEvent};

use crate::{
    driver::ServerAction,
    registry::{RoomRegistry, SessionId},
};

/// Broadcast `frame` to the verified members of `room`, minus `exclude`.
///
/// Returns `None` when nobody would receive it.
pub(crate) fn fan_out(
    registry: &RoomRegistry,
    room: &RoomName,
    frame: ServerFrame,
    exclude: Option<SessionId>,
) -> Option<ServerAction> {
    let recipients = registry.peers(room.as_str(), exclude);
    if recipients.is_empty() {
        return None;
    }

    Some(ServerAction::Broadcast { recipients, frame })
}

/// Current presence snapshot of `room`, sent to all of its members.
pub(crate) fn presence(registry: &RoomRegistry, room: &RoomName) -> Option<ServerAction> {
    let snapshot = registry.presence(room);
    let frame = ServerFrame::Presence {
        room: snapshot.room.to_string(),
        count: snapshot.count,
        users: snapshot.users,
    };

    fan_out(registry, room, frame, None)
}

/// Membership event for the members of `room`, minus `exclude`.
pub(crate) fn system(
    registry: &RoomRegistry,
    room: &RoomName,
    event: SystemEvent,
    ts: u64,
    exclude: Option<SessionId>,
) -> Option<ServerAction> {
    fan_out(registry, room, ServerFrame::System { event, ts }, exclude)
}

/// Chat envelope from `sender` to the other members of its room.
///
/// The envelope is passed through untouched. Returns `None` if the sender is
/// not verified into a room.
pub(crate) fn chat(
    registry: &RoomRegistry,
    sender: SessionId,
    iv: String,
    ciphertext: String,
    ts: u64,
) -> Option<ServerAction> {
    let room = registry.room_of(sender)?;
    let frame = ServerFrame::Chat { room: room.to_string(), iv, ciphertext, ts };
    fan_out(registry, room, frame, Some(sender))
}

/// Typing indicator from `sender` to the other members of its room.
pub(crate) fn typing(
    registry: &RoomRegistry,
    sender: SessionId,
    active: bool,
    ts: u64,
) -> Option<ServerAction> {
    let room = registry.room_of(sender)?;
    let frame = ServerFrame::Typing { room: room.to_string(), active, ts };
    fan_out(registry, room, frame, Some(sender))
}
