//! Scripted simulation runs.
//!
//! A `Scenario` is a list of operations replayed against a fresh
//! [`SimWorld`], followed by oracle checks on the final state.
//!
//! ```rust,ignore
//! Scenario::new(2)
//!     .with_seed(7)
//!     .op(Operation::Join { client_id: 0, room_id: 0, password: 0 })
//!     .op(Operation::Join { client_id: 1, room_id: 0, password: 0 })
//!     .oracle(Box::new(|world| {
//!         let members = world.driver().registry().peers("room-0", None).len();
//!         if members == 2 { Ok(()) } else { Err(format!("{members} members")) }
//!     }))
//!     .run()?;
//! ```

use crate::{
    SimWorld,
    model::{Operation, OperationResult},
};

/// Check run against the world once every operation has been applied.
pub type Oracle = Box<dyn Fn(&SimWorld) -> Result<(), String>>;

/// Builder for a scripted run.
pub struct Scenario {
    num_clients: usize,
    seed: u64,
    ops: Vec<Operation>,
    oracles: Vec<Oracle>,
}

impl Scenario {
    /// Empty scenario with `num_clients` clients and seed 0.
    pub fn new(num_clients: usize) -> Self {
        Self { num_clients, seed: 0, ops: Vec::new(), oracles: Vec::new() }
    }

    /// Seed for the simulated environment.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Append one operation.
    #[must_use]
    pub fn op(mut self, op: Operation) -> Self {
        self.ops.push(op);
        self
    }

    /// Append several operations.
    #[must_use]
    pub fn ops(mut self, ops: impl IntoIterator<Item = Operation>) -> Self {
        self.ops.extend(ops);
        self
    }

    /// Add an oracle.
    #[must_use]
    pub fn oracle(mut self, oracle: Oracle) -> Self {
        self.oracles.push(oracle);
        self
    }

    /// Replay the operations, then run the oracles.
    ///
    /// # Errors
    ///
    /// The first delivery fault or failed oracle, described.
    pub fn run(self) -> Result<(SimWorld, Vec<OperationResult>), String> {
        let mut world = SimWorld::new(self.num_clients, self.seed);
        let results = self.ops.iter().map(|op| world.apply_operation(op)).collect();

        if let Some(fault) = world.faults().first() {
            return Err(format!("delivery fault: {fault}"));
        }

        for oracle in &self.oracles {
            oracle(&world)?;
        }

        Ok((world, results))
    }
}
