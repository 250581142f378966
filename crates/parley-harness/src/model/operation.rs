//! Operations for model-based testing.
//!
//! Operations represent everything a user or the network can do to the
//! system. They are generated randomly by proptest and applied to both the
//! model and the simulated system.

use arbitrary::Arbitrary;

/// Client identifier (0-indexed).
pub type ClientId = u8;

/// Room identifier, mapped to `room-<n>` in the real system.
pub type ModelRoomId = u8;

/// Password identifier, mapped to a fixed password list.
pub type PasswordId = u8;

/// Rooms the generated operations draw from.
pub const MODEL_ROOMS: u8 = 3;

/// Passwords the generated operations draw from.
pub const MODEL_PASSWORDS: u8 = 2;

/// Operations that can be applied to the system.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Client enters (or re-enters) a room with a password.
    Join {
        /// Client joining.
        client_id: ClientId,
        /// Target room.
        room_id: ModelRoomId,
        /// Password to derive the room keys from.
        password: PasswordId,
    },

    /// Client sends a chat message to its active room.
    SendMessage {
        /// Client sending the message.
        client_id: ClientId,
        /// Message content (kept small for efficiency).
        content: SmallMessage,
    },

    /// Client leaves its active room.
    LeaveRoom {
        /// Client leaving.
        client_id: ClientId,
    },

    /// Client disconnects cleanly.
    Disconnect {
        /// Client disconnecting.
        client_id: ClientId,
    },

    /// Client's transport fails without a leave.
    DropConnection {
        /// Client whose transport fails.
        client_id: ClientId,
    },

    /// Advance simulation time and run liveness sweeps.
    ///
    /// Every simulated client answers pings, so nobody is evicted.
    AdvanceTime {
        /// Milliseconds to advance.
        millis: u16,
    },
}

impl Operation {
    /// Fold identifiers into the ranges a world of `num_clients` uses.
    pub fn clamp(self, num_clients: usize) -> Self {
        let clients = u8::try_from(num_clients.clamp(1, usize::from(u8::MAX))).unwrap_or(u8::MAX);
        match self {
            Self::Join { client_id, room_id, password } => Self::Join {
                client_id: client_id % clients,
                room_id: room_id % MODEL_ROOMS,
                password: password % MODEL_PASSWORDS,
            },
            Self::SendMessage { client_id, content } => {
                Self::SendMessage { client_id: client_id % clients, content }
            },
            Self::LeaveRoom { client_id } => Self::LeaveRoom { client_id: client_id % clients },
            Self::Disconnect { client_id } => Self::Disconnect { client_id: client_id % clients },
            Self::DropConnection { client_id } => {
                Self::DropConnection { client_id: client_id % clients }
            },
            other @ Self::AdvanceTime { .. } => other,
        }
    }
}

/// Small message content for testing.
///
/// Compact representation that expands deterministically to text.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub struct SmallMessage {
    /// Message seed.
    pub seed: u8,
    /// Length hint (0-3 maps to empty/small/medium/large).
    pub size_class: u8,
}

impl SmallMessage {
    /// Expand to message text.
    pub fn to_text(&self) -> String {
        let len = match self.size_class % 4 {
            0 => 0,
            1 => 8,
            2 => 64,
            _ => 256,
        };

        (0..len)
            .map(|i: usize| {
                let offset = (usize::from(self.seed) + i) % 26;
                char::from(b'a' + offset as u8)
            })
            .collect()
    }
}

/// Result of applying an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation succeeded.
    Ok,

    /// Operation failed with expected error.
    Error(OperationError),
}

/// Expected errors that can occur during operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// The client is not joined to a room.
    NotJoined,

    /// Invalid client ID.
    InvalidClient,
}

impl OperationResult {
    /// Check if operation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Check if operation failed.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_message_sizes() {
        let text = |size_class| SmallMessage { seed: 250, size_class }.to_text();
        assert_eq!(text(0), "");
        assert_eq!(text(1).len(), 8);
        assert_eq!(text(2).len(), 64);
        assert_eq!(text(7).len(), 256);
        assert!(text(3).chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn clamp_folds_identifiers() {
        let op = Operation::Join { client_id: 7, room_id: 200, password: 9 }.clamp(3);
        assert_eq!(op, Operation::Join { client_id: 1, room_id: 2, password: 1 });
    }
}
