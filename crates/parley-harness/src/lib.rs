//! Deterministic simulation harness for Parley.
//!
//! Runs the relay driver and any number of client state machines in one
//! process, with a virtual clock and seeded randomness, so every run with
//! the same seed and inputs is identical.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation. Operations are
//! applied to both the model and a [`SimWorld`], and their observable states
//! are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod key_cache;
pub mod model;
pub mod scenario;
mod sim_env;
pub mod world;

pub use key_cache::KeyCache;
pub use model::{
    ClientId, ClientView, ModelClient, ModelRelay, ModelRoomId, ModelWorld, ObservableState,
    Operation, OperationError, OperationResult, PasswordId, SmallMessage,
};
pub use scenario::{Oracle, Scenario};
pub use sim_env::{SIM_EPOCH_MILLIS, SimEnv};
pub use world::{ClientIndex, SimWorld};
