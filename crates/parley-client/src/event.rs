//! Client events and actions.

use parley_core::RoomName;
use parley_proto::ClientFrame;

use crate::{
    keys::{Password, RoomKeys},
    message::{HistoryEntry, ReplyTo},
};

/// Join progress of one remembered room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Not joined. The initial state and the state after leaving.
    Unjoined,
    /// Keys are being derived or the join awaits the relay's answer.
    Verifying,
    /// The relay acknowledged the join.
    Joined,
    /// The relay refused the credentials. Stays here until new credentials
    /// are entered.
    Rejected,
}

/// State of the shared transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No connection.
    Disconnected,
    /// `Connect` was requested.
    Connecting,
    /// Connected; frames can be sent.
    Open,
}

/// Inputs to the client state machine.
#[derive(Debug)]
pub enum ClientEvent {
    /// Remember a room (or replace its credentials) and select it.
    AddRoom {
        /// Room identifier, sanitized like the relay does.
        room: String,
        /// Display name to join with.
        name: String,
        /// Room password.
        password: Password,
    },

    /// Make a remembered room the active one and join it.
    SelectRoom {
        /// Room identifier.
        room: String,
    },

    /// Leave the active room but keep remembering it.
    LeaveRoom,

    /// Forget a room, leaving it first if it is active.
    RemoveRoom {
        /// Room identifier.
        room: String,
    },

    /// A `DeriveKeys` request finished.
    KeysDerived {
        /// Room the keys were derived for.
        room: RoomName,
        /// Id of the request.
        request: u64,
        /// The derived material.
        keys: RoomKeys,
    },

    /// The transport connected.
    TransportOpened,

    /// The transport closed, for whatever reason.
    TransportClosed,

    /// A text frame arrived from the relay.
    FrameReceived(String),

    /// Send a chat message to the active room.
    SendMessage {
        /// Message text.
        text: String,
        /// Message being replied to.
        reply_to: Option<ReplyTo>,
    },

    /// Local typing state changed.
    SetTyping {
        /// Whether the user is typing.
        active: bool,
    },

    /// Leave the active room and close the transport.
    Disconnect,
}

/// Outputs of the client state machine, executed by the caller in order.
#[derive(Debug)]
pub enum ClientAction {
    /// Open the transport, then report `TransportOpened` or
    /// `TransportClosed`.
    Connect,

    /// Send a frame to the relay.
    Send(ClientFrame),

    /// Close the transport, then report `TransportClosed`.
    Close,

    /// Derive keys off the event loop, then report `KeysDerived`.
    DeriveKeys {
        /// Room identifier.
        room: RoomName,
        /// Password to derive from.
        password: Password,
        /// Id to echo back in `KeysDerived`.
        request: u64,
    },

    /// A room's join phase changed.
    RoomPhaseChanged {
        /// Room.
        room: RoomName,
        /// New phase.
        phase: RoomPhase,
    },

    /// Key fingerprint of the room about to be joined.
    FingerprintReady {
        /// Room.
        room: RoomName,
        /// Hex fingerprint.
        fingerprint: String,
    },

    /// New history entry for a room.
    Deliver {
        /// Room.
        room: RoomName,
        /// The entry, already appended to the room's history.
        entry: HistoryEntry,
    },

    /// Presence of the active room changed.
    PresenceChanged {
        /// Room.
        room: RoomName,
        /// Number of verified members.
        count: usize,
        /// Their display names.
        users: Vec<String>,
    },

    /// Someone else in the active room started or stopped typing.
    TypingChanged {
        /// Room.
        room: RoomName,
        /// Whether someone is typing.
        active: bool,
    },

    /// Diagnostic message.
    Log {
        /// Message.
        message: String,
    },
}
