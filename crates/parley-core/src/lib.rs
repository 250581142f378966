//! Parley core.
//!
//! Pieces shared by the relay and the client that carry no I/O of their own:
//!
//! - [`env::Environment`]: wall-clock time and randomness, swapped for a
//!   seeded simulation in tests
//! - [`names`]: sanitization of room identifiers and display names

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod names;

pub use env::{Environment, SystemEnv};
pub use names::{DisplayName, RoomName};
