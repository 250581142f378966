//! Fuzz target for the client's handling of relay frames
//!
//! The relay is untrusted: a malicious or buggy relay can send anything.
//!
//! # Strategy
//!
//! - Start from a joined room, then feed arbitrary text and arbitrary
//!   well-typed frames
//! - Chat envelopes with arbitrary `iv` and `ciphertext` values
//!
//! # Invariants
//!
//! - NEVER panic, and never return an error for an inbound frame
//! - History only grows through surfaced deliveries
//! - The active room never changes because of an inbound frame

#![no_main]

use std::{
    collections::VecDeque,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_client::{Client, ClientAction, ClientConfig, ClientEvent, Password, RoomKeys};
use parley_core::{Environment, RoomName};
use parley_proto::{RejectReason, ServerFrame, SystemEvent};

#[derive(Clone, Default)]
struct FuzzEnv {
    counter: Arc<AtomicU64>,
}

impl Environment for FuzzEnv {
    fn unix_millis(&self) -> u64 {
        1_700_000_000_000
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let n = self.counter.fetch_add(1, Ordering::Relaxed).to_le_bytes();
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = n[i % n.len()];
        }
    }
}

/// Derived once per process; the full derivation dominates otherwise.
fn lobby_keys() -> RoomKeys {
    static KEYS: OnceLock<RoomKeys> = OnceLock::new();
    KEYS.get_or_init(|| RoomKeys::derive(&Password::new("swordfish"), &RoomName::resolve("lobby")))
        .clone()
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzedFrame {
    Raw(String),
    Joined { room: String, name: String, ts: u64 },
    Rejected { bad_password: bool },
    Chat { room_is_lobby: bool, iv: String, ciphertext: String, ts: u64 },
    Typing { active: bool },
    Presence { count: usize, users: Vec<String> },
    System { event: u8, ts: u64 },
}

impl FuzzedFrame {
    fn to_text(&self) -> String {
        let frame = match self {
            Self::Raw(text) => return text.clone(),
            Self::Joined { room, name, ts } => {
                ServerFrame::Joined { room: room.clone(), name: name.clone(), ts: *ts }
            },
            Self::Rejected { bad_password } => ServerFrame::JoinRejected {
                reason: if *bad_password { RejectReason::BadPassword } else { RejectReason::Rejected },
            },
            Self::Chat { room_is_lobby, iv, ciphertext, ts } => ServerFrame::Chat {
                room: if *room_is_lobby { "lobby".to_string() } else { "den".to_string() },
                iv: iv.clone(),
                ciphertext: ciphertext.clone(),
                ts: *ts,
            },
            Self::Typing { active } => {
                ServerFrame::Typing { room: "lobby".to_string(), active: *active, ts: 0 }
            },
            Self::Presence { count, users } => {
                ServerFrame::Presence { room: "lobby".to_string(), count: *count, users: users.clone() }
            },
            Self::System { event, ts } => ServerFrame::System {
                event: match event % 3 {
                    0 => SystemEvent::Join,
                    1 => SystemEvent::Leave,
                    _ => SystemEvent::Disconnect,
                },
                ts: *ts,
            },
        };
        frame.encode().unwrap_or_default()
    }
}

fn joined_client() -> Client<FuzzEnv> {
    let mut client = Client::new(FuzzEnv::default(), ClientConfig { history_limit: 64 });
    let mut queue = VecDeque::from([
        ClientEvent::AddRoom {
            room: "lobby".to_string(),
            name: "ann".to_string(),
            password: Password::new("swordfish"),
        },
    ]);

    while let Some(event) = queue.pop_front() {
        let actions = client.handle(event).unwrap_or_default();
        for action in actions {
            match action {
                ClientAction::DeriveKeys { room, request, .. } => {
                    queue.push_back(ClientEvent::KeysDerived { room, request, keys: lobby_keys() });
                },
                ClientAction::Connect => queue.push_back(ClientEvent::TransportOpened),
                _ => {},
            }
        }
    }

    let joined = ServerFrame::Joined { room: "lobby".into(), name: "ann".into(), ts: 0 };
    let _ = client.handle(ClientEvent::FrameReceived(joined.encode().unwrap_or_default()));
    client
}

fuzz_target!(|frames: Vec<FuzzedFrame>| {
    let mut client = joined_client();
    let active = client.active_room().cloned();

    for frame in frames {
        let before = client.history("lobby").map_or(0, |h| h.len());
        let result = client.handle(ClientEvent::FrameReceived(frame.to_text()));
        let actions = match result {
            Ok(actions) => actions,
            Err(e) => panic!("inbound frame raised an error: {e}"),
        };

        let delivered = actions.iter().filter(|a| matches!(a, ClientAction::Deliver { .. })).count();
        let after = client.history("lobby").map_or(0, |h| h.len());
        assert!(after <= before + delivered, "history grew without a delivery");

        assert_eq!(client.active_room().cloned(), active, "inbound frame changed the active room");
    }
});
