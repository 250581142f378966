//! Room credentials and derived key material.

use std::fmt;

use parley_core::RoomName;
use parley_crypto::{RoomKey, compute_verifier};
use parley_proto::Verifier;
use zeroize::Zeroizing;

/// Room password, zeroized on drop.
///
/// # Security
///
/// - **Debug Redaction**: `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(Zeroizing<String>);

impl Password {
    /// Wrap a password.
    pub fn new(password: impl Into<String>) -> Self {
        Self(Zeroizing::new(password.into()))
    }

    /// The password text.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the password is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Everything derived from one `(password, room)` pair.
#[derive(Clone)]
pub struct RoomKeys {
    key: RoomKey,
    verifier: Verifier,
    fingerprint: String,
}

impl RoomKeys {
    /// Run both derivations. Slow: this is the 150,000-iteration key
    /// stretch and must not run on an async executor thread.
    pub fn derive(password: &Password, room: &RoomName) -> Self {
        let key = RoomKey::derive(password.expose(), room.as_str());
        let verifier = Verifier::new(compute_verifier(password.expose(), room.as_str()));
        let fingerprint = key.fingerprint();
        Self { key, verifier, fingerprint }
    }

    /// Symmetric room key.
    pub fn key(&self) -> &RoomKey {
        &self.key
    }

    /// Join verifier.
    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Key fingerprint for out-of-band comparison.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl fmt::Debug for RoomKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomKeys").field("fingerprint", &self.fingerprint).finish_non_exhaustive()
    }
}
