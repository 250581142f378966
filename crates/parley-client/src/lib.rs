//! Parley client.
//!
//! Multi-room chat client for the Parley relay. Every room is protected by a
//! shared password: the client derives the room key and a join verifier from
//! it locally, and the relay only ever sees the verifier and ciphertext.
//!
//! ## Architecture
//!
//! ```text
//! parley-client
//!   ├─ Client      (Sans-IO room session controller)
//!   ├─ RoomKeys    (key, verifier and fingerprint for one room)
//!   ├─ ChatBody    (inner JSON payload)
//!   └─ Session     (WebSocket + key derivation runtime)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod event;
mod keys;
mod message;
mod session;

pub use client::{Client, ClientConfig};
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent, RoomPhase, TransportState};
pub use keys::{Password, RoomKeys};
pub use message::{ChatBody, HistoryEntry, ReplyTo, UNKNOWN_SENDER};
pub use session::Session;
