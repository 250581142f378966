//! Client error types.

use parley_crypto::CryptoError;
use parley_proto::ProtocolError;
use thiserror::Error;

/// Errors from client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Room is not remembered by the client.
    #[error("room not found: {room}")]
    RoomNotFound {
        /// The room identifier that was not found.
        room: String,
    },

    /// The relay refused the stored credentials for this room.
    #[error("credentials for room {room} were rejected; re-enter the password")]
    CredentialsRejected {
        /// The room whose credentials were rejected.
        room: String,
    },

    /// A room was added without a password.
    #[error("a password is required for room {room}")]
    MissingPassword {
        /// The room that was being added.
        room: String,
    },

    /// The operation needs a joined active room.
    #[error("not joined to a room")]
    NotJoined,

    /// Outbound frame could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Message encryption failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Inner chat payload could not be serialized.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl ClientError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Fatal errors indicate bugs in the client itself. Everything a user can
    /// fix by picking another room or re-entering a password is transient.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Protocol(_) | Self::Crypto(_) | Self::Payload(_) => true,

            Self::RoomNotFound { .. }
            | Self::CredentialsRejected { .. }
            | Self::MissingPassword { .. }
            | Self::NotJoined => false,
        }
    }
}
