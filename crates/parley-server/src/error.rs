//! Server error types.

use parley_proto::ProtocolError;
use thiserror::Error;

use crate::registry::SessionId;

/// Errors that can occur in the relay.
///
/// Driver errors describe events that do not fit the current state (a frame
/// from a session that was never accepted, a reused session id). They never
/// describe client misbehaviour: malformed client input is dropped inside the
/// driver, not surfaced here.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// WebSocket handshake or framing error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Outbound frame could not be encoded
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Event referenced a session the driver does not know
    #[error("unknown session {0:#x}")]
    UnknownSession(SessionId),

    /// Connection was accepted under an id that is already in use
    #[error("duplicate session {0:#x}")]
    DuplicateSession(SessionId),

    /// The dispatcher has stopped
    #[error("server is shutting down")]
    Shutdown,
}

impl ServerError {
    /// Whether the error should end the connection it occurred on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::WebSocket(_) | Self::DuplicateSession(_) | Self::Shutdown
        )
    }
}
