//! Parley wire protocol.
//!
//! Every frame is a single JSON text message carrying a `type` discriminator.
//! The relay never sees plaintext: chat bodies travel as an opaque
//! `{iv, ciphertext}` envelope that only room members can open.
//!
//! # Frames
//!
//! ```text
//! client -> server   join{room,name,verifier}  chat{iv,ciphertext}
//!                    typing{active}            leave{}
//!
//! server -> client   joined{room,name,ts}      join-rejected{reason}
//!                    chat{room,iv,ciphertext,ts}
//!                    typing{room,active,ts}    presence{room,count,users}
//!                    system{event,ts}
//! ```
//!
//! Frames with an unrecognized `type` decode to [`ProtocolError::UnknownType`]
//! so both ends can ignore them without treating them as malformed.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod frame;

pub use error::ProtocolError;
pub use frame::{ClientFrame, RejectReason, ServerFrame, SystemEvent, Verifier};
