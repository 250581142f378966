//! Client and server frame definitions.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::ProtocolError;

/// Room-entry verifier presented in a join request.
///
/// Treated by the relay as an opaque bearer token and compared only by
/// equality. Anyone who observes a verifier can replay it to join the room.
///
/// # Security
///
/// - **Debug Redaction**: the `Debug` impl prints only the length so
///   verifiers never end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Verifier(String);

impl Verifier {
    /// Wrap an encoded verifier token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The encoded token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the token is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Verifier(<redacted {} chars>)", self.0.chars().count())
    }
}

/// Frames sent from a client to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Enter a room, leaving any room the session is currently in.
    Join {
        /// Requested room identifier (sanitized by the relay).
        #[serde(default)]
        room: String,
        /// Requested display name (sanitized by the relay).
        #[serde(default)]
        name: String,
        /// Verifier derived from the room password. Required: a join
        /// without one is malformed.
        verifier: Verifier,
    },

    /// Encrypted chat envelope for the session's current room.
    Chat {
        /// Base64 nonce.
        iv: String,
        /// Base64 ciphertext including the authentication tag.
        ciphertext: String,
    },

    /// Anonymous typing indicator.
    Typing {
        /// Whether the user is currently typing.
        #[serde(default)]
        active: bool,
    },

    /// Leave the current room.
    Leave {},
}

impl ClientFrame {
    const TYPES: &'static [&'static str] = &["join", "chat", "typing", "leave"];

    /// Decode a frame from JSON text.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_tagged(text, Self::TYPES)
    }

    /// Encode the frame as JSON text.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Why a join was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// The verifier does not match the one the room was created with.
    BadPassword,
    /// The request was refused for any other reason.
    Rejected,
}

/// Membership events broadcast to the other members of a room.
///
/// Carries no identity; names are only exchanged through presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemEvent {
    /// Someone joined.
    Join,
    /// Someone left explicitly.
    Leave,
    /// Someone's connection went away.
    Disconnect,
}

/// Frames sent from the relay to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    /// Private acknowledgment of a successful join.
    Joined {
        /// Room as resolved by the relay.
        room: String,
        /// Display name as resolved by the relay.
        name: String,
        /// Server timestamp (unix milliseconds).
        ts: u64,
    },

    /// Private refusal of a join.
    JoinRejected {
        /// Refusal reason.
        reason: RejectReason,
    },

    /// Relayed chat envelope.
    Chat {
        /// Room the envelope was sent to.
        room: String,
        /// Base64 nonce, untouched by the relay.
        iv: String,
        /// Base64 ciphertext, untouched by the relay.
        ciphertext: String,
        /// Server timestamp (unix milliseconds).
        ts: u64,
    },

    /// Relayed typing indicator.
    Typing {
        /// Room the indicator applies to.
        room: String,
        /// Whether someone is typing.
        active: bool,
        /// Server timestamp (unix milliseconds).
        ts: u64,
    },

    /// Presence snapshot of a room.
    Presence {
        /// Room the snapshot describes.
        room: String,
        /// Number of verified members.
        count: usize,
        /// Display names of verified members (capped).
        users: Vec<String>,
    },

    /// Membership change notification.
    System {
        /// What happened.
        event: SystemEvent,
        /// Server timestamp (unix milliseconds).
        ts: u64,
    },
}

impl ServerFrame {
    const TYPES: &'static [&'static str] =
        &["joined", "join-rejected", "chat", "typing", "presence", "system"];

    /// Decode a frame from JSON text.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_tagged(text, Self::TYPES)
    }

    /// Encode the frame as JSON text.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of this frame's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Joined { .. } => "joined",
            Self::JoinRejected { .. } => "join-rejected",
            Self::Chat { .. } => "chat",
            Self::Typing { .. } => "typing",
            Self::Presence { .. } => "presence",
            Self::System { .. } => "system",
        }
    }
}

/// Check the discriminator before deserializing so an unknown type is
/// reported separately from a malformed known type.
fn decode_tagged<T: DeserializeOwned>(text: &str, known: &[&str]) -> Result<T, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;
    let frame_type = value.get("type").and_then(Value::as_str).ok_or(ProtocolError::MissingType)?;

    if !known.contains(&frame_type) {
        return Err(ProtocolError::UnknownType(frame_type.to_string()));
    }

    Ok(serde_json::from_value(value)?)
}
