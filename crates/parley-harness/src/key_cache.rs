//! Memoized room key derivation.
//!
//! A full-strength derivation costs tens of milliseconds, and simulations
//! derive the same handful of `(password, room)` pairs over and over.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

use parley_client::{Password, RoomKeys};
use parley_core::RoomName;

/// Process-wide cache of derived room keys.
#[derive(Debug, Clone, Default)]
pub struct KeyCache {
    keys: Arc<Mutex<HashMap<(String, String), RoomKeys>>>,
}

impl KeyCache {
    /// The cache shared by every simulation in this process.
    pub fn shared() -> Self {
        static SHARED: OnceLock<KeyCache> = OnceLock::new();
        SHARED.get_or_init(Self::default).clone()
    }

    /// Derive, or reuse an earlier derivation of, the keys for a room.
    pub fn derive(&self, password: &Password, room: &RoomName) -> RoomKeys {
        let slot = (password.expose().to_string(), room.to_string());
        if let Some(keys) = self.keys.lock().unwrap_or_else(PoisonError::into_inner).get(&slot) {
            return keys.clone();
        }

        // Derive outside the lock; a racing duplicate is identical.
        let keys = RoomKeys::derive(password, room);
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).insert(slot, keys.clone());
        keys
    }

    /// Number of cached derivations.
    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been derived yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
