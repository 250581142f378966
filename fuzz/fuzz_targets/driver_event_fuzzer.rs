//! Fuzz target for [`ServerDriver`] event handling
//!
//! Untrusted clients control every byte of every frame; nothing they send
//! may crash the relay or corrupt its registry.
//!
//! # Strategy
//!
//! - Event sequences: accepts, frames, pongs, closes and sweeps over a small
//!   pool of session ids so they collide often
//! - Frames: well-formed frames with hostile field values, plus raw text
//! - Reuse: closing and re-accepting the same id
//!
//! # Invariants
//!
//! - NEVER panic, whatever the input
//! - Errors are only `UnknownSession` or `DuplicateSession`
//! - Every broadcast goes to registered sessions only, never to the sender
//!   of a chat
//! - Chat envelopes are relayed byte for byte
//! - Every registered session in a room sees that room in the registry

#![no_main]

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_core::Environment;
use parley_proto::{ClientFrame, ServerFrame, Verifier};
use parley_server::{DriverConfig, ServerAction, ServerDriver, ServerError, ServerEvent};

#[derive(Clone, Default)]
struct FuzzEnv {
    ticks: Arc<AtomicU64>,
}

impl Environment for FuzzEnv {
    fn unix_millis(&self) -> u64 {
        1_700_000_000_000 + self.ticks.fetch_add(1, Ordering::Relaxed)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0x5a);
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzedFrame {
    Join { room: String, name: String, verifier: String },
    Chat { iv: String, ciphertext: String },
    Typing { active: bool },
    Leave,
    Raw(String),
}

impl FuzzedFrame {
    fn to_text(&self) -> String {
        let frame = match self {
            Self::Join { room, name, verifier } => ClientFrame::Join {
                room: room.clone(),
                name: name.clone(),
                verifier: Verifier::new(verifier.clone()),
            },
            Self::Chat { iv, ciphertext } => {
                ClientFrame::Chat { iv: iv.clone(), ciphertext: ciphertext.clone() }
            },
            Self::Typing { active } => ClientFrame::Typing { active: *active },
            Self::Leave => ClientFrame::Leave {},
            Self::Raw(text) => return text.clone(),
        };
        frame.encode().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum DriverInput {
    Accept { session: u8 },
    Frame { session: u8, frame: FuzzedFrame },
    Pong { session: u8 },
    Close { session: u8 },
    Tick,
}

/// Fuzz input: a small connection limit so the refusal path is reachable.
#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    max_connections: u8,
    events: Vec<DriverInput>,
}

fuzz_target!(|input: FuzzInput| {
    let config = DriverConfig {
        max_connections: usize::from(input.max_connections % 8) + 1,
        max_frame_bytes: 4096,
    };
    let mut driver = ServerDriver::new(FuzzEnv::default(), config);

    for event in input.events {
        // Eight ids: enough to share rooms, few enough to collide.
        let (event, chat) = match event {
            DriverInput::Accept { session } => {
                (ServerEvent::ConnectionAccepted { session_id: u64::from(session % 8) }, None)
            },
            DriverInput::Frame { session, frame } => {
                let chat = match &frame {
                    FuzzedFrame::Chat { iv, ciphertext } => {
                        Some((u64::from(session % 8), iv.clone(), ciphertext.clone()))
                    },
                    _ => None,
                };
                let event = ServerEvent::FrameReceived {
                    session_id: u64::from(session % 8),
                    text: frame.to_text(),
                };
                (event, chat)
            },
            DriverInput::Pong { session } => {
                (ServerEvent::PongReceived { session_id: u64::from(session % 8) }, None)
            },
            DriverInput::Close { session } => (
                ServerEvent::ConnectionClosed {
                    session_id: u64::from(session % 8),
                    reason: "fuzz".to_string(),
                },
                None,
            ),
            DriverInput::Tick => (ServerEvent::LivenessTick, None),
        };

        let actions = match driver.process_event(event) {
            Ok(actions) => actions,
            Err(ServerError::UnknownSession(_) | ServerError::DuplicateSession(_)) => continue,
            Err(e) => panic!("unexpected driver error: {e}"),
        };

        for action in &actions {
            if let ServerAction::Broadcast { recipients, frame } = action {
                for recipient in recipients {
                    assert!(
                        driver.registry().is_registered(*recipient),
                        "broadcast to unregistered session {recipient}"
                    );
                }

                if let (ServerFrame::Chat { iv, ciphertext, .. }, Some((sender, sent_iv, sent_ct))) =
                    (frame, &chat)
                {
                    assert!(!recipients.contains(sender), "chat echoed to its sender");
                    assert_eq!(iv, sent_iv, "iv altered in transit");
                    assert_eq!(ciphertext, sent_ct, "ciphertext altered in transit");
                }
            }
        }

        for session_id in 0..8 {
            if let Some(room) = driver.registry().room_of(session_id) {
                assert!(driver.registry().has_room(room.as_str()), "session in missing room");
            }
        }
        assert!(driver.registry().room_count() <= driver.session_count());
    }
});
