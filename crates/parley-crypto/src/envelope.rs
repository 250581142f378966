//! Message envelopes.
//!
//! AES-256-GCM with a 12-byte nonce. Wire format is two base64 strings:
//!
//! ```text
//! iv          base64(nonce[12])
//! ciphertext  base64(ciphertext || tag[16])
//! ```

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use zeroize::Zeroizing;

use crate::{CryptoError, RoomKey};

/// Nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Encrypted message as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Base64 nonce.
    pub iv: String,
    /// Base64 ciphertext with appended authentication tag.
    pub ciphertext: String,
}

/// Encrypt `plaintext` under `key` with a caller-supplied nonce.
///
/// `nonce` MUST be freshly drawn from a cryptographic RNG for every call.
/// Reusing a nonce under the same key leaks the XOR of both plaintexts and
/// allows forgeries.
pub fn encrypt(
    key: &RoomKey,
    plaintext: &[u8],
    nonce: [u8; NONCE_SIZE],
) -> Result<Envelope, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let ciphertext =
        cipher.encrypt(Nonce::from_slice(&nonce), plaintext).map_err(|_| CryptoError::Encrypt)?;

    Ok(Envelope { iv: STANDARD.encode(nonce), ciphertext: STANDARD.encode(ciphertext) })
}

/// Decrypt an envelope.
///
/// Fails on any malformed field or authentication failure; never returns
/// partially decrypted data.
pub fn decrypt(key: &RoomKey, iv: &str, ciphertext: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let nonce = STANDARD.decode(iv).map_err(|_| CryptoError::Encoding { field: "iv" })?;
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::NonceLength { expected: NONCE_SIZE, actual: nonce.len() });
    }

    let ciphertext =
        STANDARD.decode(ciphertext).map_err(|_| CryptoError::Encoding { field: "ciphertext" })?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| CryptoError::Decrypt)?;

    Ok(Zeroizing::new(plaintext))
}
