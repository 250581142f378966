//! Password-based room key and verifier derivation.
//!
//! Both derivations are PBKDF2-HMAC-SHA256 over the UTF-8 password with a
//! salt bound to the literal room identifier. The salts live in separate
//! namespaces so the verifier pass never computes anything the key pass
//! does. Salt strings and parameters are fixed: changing any of them would
//! split every room into clients that can no longer read each other.

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

/// Salt namespace for the encryption key.
const KEY_SALT_PREFIX: &str = "e2ee-chat|";

/// Salt namespace for the room-entry verifier.
const VERIFIER_SALT_PREFIX: &str = "e2ee-chat-verifier|";

/// PBKDF2 iterations for the encryption key.
pub const KEY_ITERATIONS: u32 = 150_000;

/// PBKDF2 iterations for the verifier. Runs on every join.
pub const VERIFIER_ITERATIONS: u32 = 1_000;

/// Encryption key size in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// Verifier size in bytes before base64 encoding.
pub const VERIFIER_SIZE: usize = 16;

/// Stretched verifier material, sized as an HMAC-SHA256 key (one block).
const VERIFIER_MATERIAL_SIZE: usize = 64;

/// Fingerprint size in bytes before hex encoding.
const FINGERPRINT_SIZE: usize = 8;

/// Symmetric room key.
///
/// Never leaves the client. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct RoomKey(Zeroizing<[u8; KEY_SIZE]>);

impl RoomKey {
    /// Derive the room key from a password and a room identifier.
    ///
    /// Deliberately slow (150,000 PBKDF2 iterations). Identical inputs give
    /// bit-identical keys on every client.
    pub fn derive(password: &str, room: &str) -> Self {
        let salt = format!("{KEY_SALT_PREFIX}{room}");
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), KEY_ITERATIONS, &mut *key);
        Self(key)
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Short human-comparable tag: first 8 bytes of SHA-256 over the raw key,
    /// hex encoded.
    ///
    /// Lets two people confirm they typed the same password. It is not a
    /// security boundary.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_slice());
        hex::encode(&digest[..FINGERPRINT_SIZE])
    }
}

impl std::fmt::Debug for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RoomKey").field(&"<redacted>").finish()
    }
}

/// Compute the room-entry verifier for a password and room identifier.
///
/// PBKDF2 with 1,000 iterations under the verifier salt, hashed with SHA-256,
/// truncated to 16 bytes and base64 encoded (24 characters).
pub fn compute_verifier(password: &str, room: &str) -> String {
    use base64::{Engine, engine::general_purpose::STANDARD};

    let salt = format!("{VERIFIER_SALT_PREFIX}{room}");
    let mut material = [0u8; VERIFIER_MATERIAL_SIZE];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), VERIFIER_ITERATIONS, &mut material);

    let digest = Sha256::digest(material);
    material.zeroize();

    STANDARD.encode(&digest[..VERIFIER_SIZE])
}
