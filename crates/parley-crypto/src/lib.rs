//! Parley Cryptographic Primitives
//!
//! Turns a human password and a room identifier into everything a client
//! needs to take part in a room:
//!
//! - [`RoomKey`]: AES-256-GCM key, PBKDF2-SHA256 with 150,000 iterations
//! - [`compute_verifier`]: cheap room-entry token the relay compares by
//!   equality, stretched under a separate salt so it reveals nothing about
//!   the key
//! - [`RoomKey::fingerprint`]: 16 hex characters for humans to compare out of
//!   band
//! - [`encrypt`] / [`decrypt`]: the `{iv, ciphertext}` envelope the relay
//!   forwards opaquely
//!
//! # Design
//!
//! All functions are pure. The 12-byte nonce for [`encrypt`] is supplied by
//! the caller from its environment's RNG so simulations stay deterministic;
//! a nonce must never be reused under the same key.
//!
//! # Security Properties
//!
//! - Key derivation is deterministic in `(password, room)`: there is no key
//!   exchange, agreeing on the password is agreeing on the key
//! - Different rooms yield different keys and verifiers for the same password
//! - Decryption is authenticated: tampering yields an error, never altered
//!   plaintext
//! - No forward secrecy and no sender authentication: anyone holding the
//!   room password can read and write as anyone

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod envelope;
mod error;
mod kdf;

pub use envelope::{Envelope, NONCE_SIZE, decrypt, encrypt};
pub use error::CryptoError;
pub use kdf::{
    KEY_ITERATIONS, KEY_SIZE, RoomKey, VERIFIER_ITERATIONS, VERIFIER_SIZE, compute_verifier,
};
