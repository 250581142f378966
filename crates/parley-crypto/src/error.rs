//! Crypto error types.

use thiserror::Error;

/// Errors from envelope operations.
///
/// Every decryption failure means the same thing to a caller: this message
/// cannot be read with this key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// AEAD encryption failed.
    #[error("encryption failed")]
    Encrypt,

    /// Authentication tag mismatch: wrong key, tampered ciphertext or nonce.
    #[error("decryption failed (authentication tag mismatch)")]
    Decrypt,

    /// A field was not valid base64.
    #[error("invalid base64 in {field}")]
    Encoding {
        /// Envelope field that failed to decode.
        field: &'static str,
    },

    /// Nonce had the wrong length.
    #[error("invalid nonce length: expected {expected}, got {actual}")]
    NonceLength {
        /// Required nonce length.
        expected: usize,
        /// Length found in the envelope.
        actual: usize,
    },
}
