//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples protocol logic from system resources
//! (wall-clock time and randomness). The relay driver and the client state
//! machine only ever read the clock or draw random bytes through it, so a
//! seeded simulation reproduces a run exactly.
//!
//! # Invariants
//!
//! - Monotonicity: `env.unix_millis()` must never go backwards within a run
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::{SystemTime, UNIX_EPOCH};

/// Abstract environment providing time and randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Milliseconds since the unix epoch.
    ///
    /// Used for every `ts` field on the wire.
    fn unix_millis(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Security
    ///
    /// Production implementations MUST draw from the OS entropy pool. Nonces
    /// for message encryption come from here, so a predictable source breaks
    /// confidentiality.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Used for session identifiers.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Production environment using the system clock and `getrandom`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        if let Err(e) = getrandom::fill(buffer) {
            // NOTE: Only reachable on platforms without an entropy source. There
            // is nothing sensible to fall back to, and handing out zeros as
            // nonces would silently break confidentiality, so abort instead.
            tracing::error!("getrandom failed: {}", e);
            std::process::abort();
        }
    }
}
