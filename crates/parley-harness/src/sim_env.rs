//! Simulated environment.
//!
//! Virtual wall clock that only moves when told to, and a seeded ChaCha20
//! stream for randomness. Clones share state, so the relay and every client
//! in one simulation draw from the same clock and the same stream.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use parley_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Unix time every simulation starts at (2023-11-14T22:13:20Z).
pub const SIM_EPOCH_MILLIS: u64 = 1_700_000_000_000;

#[derive(Debug)]
struct SimState {
    now_millis: u64,
    rng: ChaCha20Rng,
}

/// Deterministic environment for simulations.
#[derive(Debug, Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Environment at [`SIM_EPOCH_MILLIS`] with randomness seeded by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                now_millis: SIM_EPOCH_MILLIS,
                rng: ChaCha20Rng::seed_from_u64(seed),
            })),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        let mut state = self.lock();
        state.now_millis = state.now_millis.saturating_add(by);
    }

    // A panic while holding the lock leaves plain data behind; keep using it.
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Environment for SimEnv {
    fn unix_millis(&self) -> u64 {
        self.lock().now_millis
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}
