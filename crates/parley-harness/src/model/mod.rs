//! Reference model for model-based testing.
//!
//! The model captures what the relay and its clients are supposed to do,
//! without sockets, JSON or cryptography. It serves as the oracle against
//! which the simulated system is verified.
//!
//! # Design Principles
//!
//! - Simplicity: The model should be obviously correct
//! - Behavior, not mechanism: membership and delivery, never frames
//! - Deterministic: Same inputs produce same outputs

mod client;
pub mod operation;
mod relay;
mod world;

pub use client::ModelClient;
pub use operation::{
    ClientId, MODEL_PASSWORDS, MODEL_ROOMS, ModelRoomId, Operation, OperationError,
    OperationResult, PasswordId, SmallMessage,
};
pub use relay::ModelRelay;
pub use world::{ClientView, ModelWorld, ObservableState};
