//! Protocol error types.

use thiserror::Error;

/// Errors from encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Text was not valid JSON or was missing required fields.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Frame had no string `type` field.
    #[error("frame has no type")]
    MissingType,

    /// Frame carried a `type` this end does not understand.
    #[error("unknown frame type: {0}")]
    UnknownType(String),
}

impl ProtocolError {
    /// Unknown frame types are expected from newer peers and are not a sign
    /// of a broken or hostile peer.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, Self::UnknownType(_))
    }
}
