//! Liveness Monitor
//!
//! Two-phase probe: every sweep evicts sessions that have not answered the
//! previous sweep's ping, then marks the survivors as awaiting and pings them
//! again. A pong at any point marks the session alive. A session therefore
//! survives at least one full interval after its last pong.

use std::collections::BTreeMap;

use crate::registry::SessionId;

/// Probe state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    /// Answered since the last sweep.
    Alive,
    /// Pinged and not yet answered.
    Awaiting,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sweep {
    /// Sessions to terminate, in ascending id order.
    pub evicted: Vec<SessionId>,
    /// Sessions to ping, in ascending id order.
    pub probed: Vec<SessionId>,
}

/// Tracks ping/pong liveness of every open session.
#[derive(Debug, Default)]
pub struct LivenessMonitor {
    sessions: BTreeMap<SessionId, ProbeState>,
}

impl LivenessMonitor {
    /// Create an empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a session. New sessions start alive.
    pub fn track(&mut self, session_id: SessionId) {
        self.sessions.insert(session_id, ProbeState::Alive);
    }

    /// Stop tracking a session. Returns whether it was tracked.
    pub fn forget(&mut self, session_id: SessionId) -> bool {
        self.sessions.remove(&session_id).is_some()
    }

    /// Record a pong. Returns whether the session is tracked.
    pub fn acknowledge(&mut self, session_id: SessionId) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(state) => {
                *state = ProbeState::Alive;
                true
            },
            None => false,
        }
    }

    /// Current probe state of a session.
    pub fn state(&self, session_id: SessionId) -> Option<ProbeState> {
        self.sessions.get(&session_id).copied()
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is tracked.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Run one sweep.
    ///
    /// Evicted sessions are no longer tracked when this returns.
    pub fn sweep(&mut self) -> Sweep {
        let mut sweep = Sweep::default();

        self.sessions.retain(|id, state| match state {
            ProbeState::Awaiting => {
                sweep.evicted.push(*id);
                false
            },
            ProbeState::Alive => {
                *state = ProbeState::Awaiting;
                sweep.probed.push(*id);
                true
            },
        });

        sweep
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn silent_session_is_evicted_on_second_sweep() {
        let mut monitor = LivenessMonitor::new();
        monitor.track(7);

        let first = monitor.sweep();
        assert_eq!(first, Sweep { evicted: vec![], probed: vec![7] });

        let second = monitor.sweep();
        assert_eq!(second, Sweep { evicted: vec![7], probed: vec![] });
        assert!(monitor.is_empty());
    }

    #[test]
    fn pong_keeps_session_alive() {
        let mut monitor = LivenessMonitor::new();
        monitor.track(7);

        for _ in 0..5 {
            let sweep = monitor.sweep();
            assert!(sweep.evicted.is_empty());
            assert_eq!(monitor.state(7), Some(ProbeState::Awaiting));
            assert!(monitor.acknowledge(7));
        }
    }

    #[test]
    fn acknowledge_unknown_session_is_ignored() {
        let mut monitor = LivenessMonitor::new();
        assert!(!monitor.acknowledge(1));
        assert!(monitor.is_empty());
    }

    #[test]
    fn forgotten_session_is_never_probed() {
        let mut monitor = LivenessMonitor::new();
        monitor.track(1);
        monitor.track(2);
        assert!(monitor.forget(1));

        assert_eq!(monitor.sweep().probed, vec![2]);
    }

    proptest! {
        #[test]
        fn sweep_partitions_tracked_sessions(
            ids in proptest::collection::btree_set(any::<u64>(), 0..32),
            answered in proptest::collection::vec(any::<bool>(), 32),
        ) {
            let mut monitor = LivenessMonitor::new();
            for id in &ids {
                monitor.track(*id);
            }
            monitor.sweep();
            for (id, pong) in ids.iter().zip(&answered) {
                if *pong {
                    monitor.acknowledge(*id);
                }
            }

            let sweep = monitor.sweep();
            let expected_alive = ids.iter().zip(&answered).filter(|(_, pong)| **pong).count();
            prop_assert_eq!(sweep.probed.len(), expected_alive);
            prop_assert_eq!(sweep.evicted.len() + sweep.probed.len(), ids.len());
            prop_assert_eq!(monitor.len(), expected_alive);
        }
    }
}
