//! Client state machine tests.
//!
//! Key derivation and connects are performed inline, and frames produced by
//! one client are handed to another as the relay would forward them.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parley_client::{
    ChatBody, Client, ClientAction, ClientConfig, ClientError, ClientEvent, HistoryEntry,
    Password, ReplyTo, RoomKeys, RoomPhase, TransportState, UNKNOWN_SENDER,
};
use parley_core::{Environment, RoomName};
use parley_crypto::encrypt;
use parley_proto::{ClientFrame, RejectReason, ServerFrame, SystemEvent};

const NOW: u64 = 1_700_000_000_000;

#[derive(Clone, Default)]
struct TestEnv {
    counter: Arc<AtomicU64>,
}

impl Environment for TestEnv {
    fn unix_millis(&self) -> u64 {
        NOW
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let n = self.counter.fetch_add(1, Ordering::Relaxed).to_be_bytes();
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = n[i % n.len()];
        }
    }
}

fn client() -> Client<TestEnv> {
    Client::new(TestEnv::default(), ClientConfig::default())
}

/// Feed an event, completing derivations and connects immediately.
fn drive(client: &mut Client<TestEnv>, event: ClientEvent) -> Vec<ClientAction> {
    let mut queue = VecDeque::from([event]);
    let mut surfaced = Vec::new();

    while let Some(event) = queue.pop_front() {
        for action in client.handle(event).unwrap() {
            match action {
                ClientAction::DeriveKeys { room, password, request } => {
                    let keys = RoomKeys::derive(&password, &room);
                    queue.push_back(ClientEvent::KeysDerived { room, request, keys });
                },
                ClientAction::Connect => queue.push_back(ClientEvent::TransportOpened),
                other => surfaced.push(other),
            }
        }
    }

    surfaced
}

fn add_room(room: &str, name: &str, password: &str) -> ClientEvent {
    ClientEvent::AddRoom {
        room: room.to_string(),
        name: name.to_string(),
        password: Password::new(password),
    }
}

fn frame(frame: &ServerFrame) -> ClientEvent {
    ClientEvent::FrameReceived(frame.encode().unwrap())
}

fn sent(actions: &[ClientAction]) -> Vec<ClientFrame> {
    actions
        .iter()
        .filter_map(|a| match a {
            ClientAction::Send(frame) => Some(frame.clone()),
            _ => None,
        })
        .collect()
}

fn delivered(actions: &[ClientAction]) -> Vec<HistoryEntry> {
    actions
        .iter()
        .filter_map(|a| match a {
            ClientAction::Deliver { entry, .. } => Some(entry.clone()),
            _ => None,
        })
        .collect()
}

/// Add `room` and complete the join handshake.
fn join(client: &mut Client<TestEnv>, room: &str, name: &str, password: &str) -> Vec<ClientAction> {
    let mut actions = drive(client, add_room(room, name, password));
    assert!(
        sent(&actions).iter().any(|f| matches!(f, ClientFrame::Join { room: r, .. } if r == room)),
        "expected a join for {room}"
    );
    actions.extend(drive(
        client,
        frame(&ServerFrame::Joined { room: room.into(), name: name.into(), ts: NOW }),
    ));
    assert_eq!(client.phase(room), Some(RoomPhase::Joined));
    actions
}

/// What the relay would forward for a client's chat frame.
fn relay_chat(room: &str, actions: &[ClientAction]) -> ServerFrame {
    let frames = sent(actions);
    let Some(ClientFrame::Chat { iv, ciphertext }) = frames.first() else {
        panic!("expected a chat frame, got {frames:?}");
    };
    ServerFrame::Chat { room: room.into(), iv: iv.clone(), ciphertext: ciphertext.clone(), ts: NOW }
}

fn last_chat(client: &Client<TestEnv>, room: &str) -> Option<(ChatBody, bool)> {
    client.history(room)?.iter().rev().find_map(|entry| match entry {
        HistoryEntry::Chat { body, own } => Some((body.clone(), *own)),
        HistoryEntry::System { .. } => None,
    })
}

#[test]
fn fresh_join_walks_through_every_step() {
    let mut ann = client();
    let actions = drive(&mut ann, add_room("lobby", "ann", "swordfish"));

    assert!(actions.iter().any(|a| matches!(
        a,
        ClientAction::RoomPhaseChanged { phase: RoomPhase::Verifying, .. }
    )));
    assert!(actions.iter().any(|a| matches!(a, ClientAction::FingerprintReady { .. })));
    assert_eq!(ann.transport(), TransportState::Open);

    let Some(ClientFrame::Join { room, name, verifier }) = sent(&actions).into_iter().next() else {
        panic!("expected join frame");
    };
    assert_eq!(room, "lobby");
    assert_eq!(name, "ann");
    assert_eq!(verifier.as_str().len(), 24);

    let actions = drive(
        &mut ann,
        frame(&ServerFrame::Joined { room: "lobby".into(), name: "ann".into(), ts: NOW }),
    );
    assert_eq!(ann.phase("lobby"), Some(RoomPhase::Joined));
    assert!(matches!(
        delivered(&actions).as_slice(),
        [HistoryEntry::System { text, .. }] if text == "Joined room lobby as ann"
    ));
}

#[test]
fn members_with_same_password_read_each_other() {
    let mut ann = client();
    let mut bob = client();
    join(&mut ann, "lobby", "ann", "swordfish");
    join(&mut bob, "lobby", "bob", "swordfish");

    assert_eq!(ann.fingerprint("lobby"), bob.fingerprint("lobby"));

    let actions =
        drive(&mut ann, ClientEvent::SendMessage { text: "hello bob".into(), reply_to: None });
    let actions = drive(&mut bob, frame(&relay_chat("lobby", &actions)));

    let entries = delivered(&actions);
    let [HistoryEntry::Chat { body, own: false }] = entries.as_slice() else {
        panic!("expected one chat delivery");
    };
    assert_eq!(body.from, "ann");
    assert_eq!(body.text, "hello bob");
    assert_eq!(body.ts, NOW);
}

#[test]
fn different_password_cannot_read_messages() {
    let mut ann = client();
    let mut eve = client();
    join(&mut ann, "lobby", "ann", "swordfish");
    join(&mut eve, "lobby", "eve", "guess");

    assert_ne!(ann.fingerprint("lobby"), eve.fingerprint("lobby"));

    let before = eve.history("lobby").unwrap().len();
    let actions = drive(&mut ann, ClientEvent::SendMessage { text: "secret".into(), reply_to: None });
    let actions = drive(&mut eve, frame(&relay_chat("lobby", &actions)));

    assert!(delivered(&actions).is_empty());
    assert!(actions.iter().any(|a| matches!(a, ClientAction::Log { .. })));
    assert_eq!(eve.history("lobby").unwrap().len(), before);
}

#[test]
fn same_password_in_another_room_gives_another_key() {
    let mut ann = client();
    join(&mut ann, "lobby", "ann", "swordfish");
    let lobby = ann.fingerprint("lobby").unwrap().to_string();

    join(&mut ann, "den", "ann", "swordfish");
    assert_ne!(ann.fingerprint("den").unwrap(), lobby);
}

#[test]
fn own_messages_are_echoed_locally() {
    let mut ann = client();
    join(&mut ann, "lobby", "ann", "swordfish");

    let actions = drive(&mut ann, ClientEvent::SendMessage { text: "hi".into(), reply_to: None });

    assert!(matches!(sent(&actions).as_slice(), [ClientFrame::Chat { .. }]));
    let (body, own) = last_chat(&ann, "lobby").unwrap();
    assert!(own);
    assert_eq!(body.text, "hi");
}

#[test]
fn nonces_are_fresh_per_message() {
    let mut ann = client();
    join(&mut ann, "lobby", "ann", "swordfish");

    let first = drive(&mut ann, ClientEvent::SendMessage { text: "a".into(), reply_to: None });
    let second = drive(&mut ann, ClientEvent::SendMessage { text: "a".into(), reply_to: None });

    let (ServerFrame::Chat { iv: a, .. }, ServerFrame::Chat { iv: b, .. }) =
        (relay_chat("lobby", &first), relay_chat("lobby", &second))
    else {
        panic!("expected chat frames");
    };
    assert_ne!(a, b);
}

#[test]
fn replies_carry_the_quote() {
    let mut ann = client();
    let mut bob = client();
    join(&mut ann, "lobby", "ann", "swordfish");
    join(&mut bob, "lobby", "bob", "swordfish");

    let quote = ReplyTo { from: "bob".into(), text: "lunch?".into(), ts: NOW - 5_000 };
    let actions = drive(
        &mut ann,
        ClientEvent::SendMessage { text: "sure".into(), reply_to: Some(quote.clone()) },
    );
    drive(&mut bob, frame(&relay_chat("lobby", &actions)));

    let (body, _) = last_chat(&bob, "lobby").unwrap();
    assert_eq!(body.reply_to, Some(quote));
}

#[test]
fn non_json_plaintext_is_shown_verbatim() {
    let mut bob = client();
    join(&mut bob, "lobby", "bob", "swordfish");

    let keys = RoomKeys::derive(&Password::new("swordfish"), &RoomName::resolve("lobby"));
    let envelope = encrypt(keys.key(), b"plain words", [7; 12]).unwrap();
    drive(
        &mut bob,
        frame(&ServerFrame::Chat {
            room: "lobby".into(),
            iv: envelope.iv,
            ciphertext: envelope.ciphertext,
            ts: NOW,
        }),
    );

    let (body, own) = last_chat(&bob, "lobby").unwrap();
    assert!(!own);
    assert_eq!(body.from, UNKNOWN_SENDER);
    assert_eq!(body.text, "plain words");
}

#[test]
fn bad_password_rejects_until_credentials_change() {
    let mut eve = client();
    drive(&mut eve, add_room("lobby", "eve", "guess"));

    let actions = drive(&mut eve, frame(&ServerFrame::JoinRejected { reason: RejectReason::BadPassword }));
    assert_eq!(eve.phase("lobby"), Some(RoomPhase::Rejected));
    assert!(matches!(
        delivered(&actions).as_slice(),
        [HistoryEntry::System { text, .. }] if text == "Incorrect room password."
    ));

    let result = eve.handle(ClientEvent::SelectRoom { room: "lobby".into() });
    assert!(matches!(result, Err(ClientError::CredentialsRejected { .. })));

    let actions = drive(&mut eve, add_room("lobby", "eve", "swordfish"));
    assert_eq!(eve.phase("lobby"), Some(RoomPhase::Verifying));
    assert!(matches!(sent(&actions).as_slice(), [ClientFrame::Join { .. }]));
}

#[test]
fn generic_rejection_has_its_own_notice() {
    let mut ann = client();
    drive(&mut ann, add_room("lobby", "ann", "swordfish"));

    let actions = drive(&mut ann, frame(&ServerFrame::JoinRejected { reason: RejectReason::Rejected }));
    assert!(matches!(
        delivered(&actions).as_slice(),
        [HistoryEntry::System { text, .. }] if text == "Join rejected."
    ));
}

#[test]
fn join_answers_follow_the_order_joins_were_sent() {
    let mut ann = client();
    drive(&mut ann, add_room("attic", "ann", "wrong"));
    drive(&mut ann, add_room("cellar", "ann", "right"));

    // The relay answers the attic join first, then admits the cellar join.
    let actions = drive(&mut ann, frame(&ServerFrame::JoinRejected { reason: RejectReason::BadPassword }));
    assert_eq!(ann.phase("attic"), Some(RoomPhase::Rejected));
    assert_eq!(ann.phase("cellar"), Some(RoomPhase::Verifying));
    assert!(matches!(
        actions.as_slice(),
        [
            ClientAction::RoomPhaseChanged { phase: RoomPhase::Rejected, .. },
            ClientAction::Deliver { room, entry: HistoryEntry::System { .. } },
        ] if room.as_str() == "attic"
    ));

    drive(&mut ann, frame(&ServerFrame::Joined { room: "cellar".into(), name: "ann".into(), ts: NOW }));
    assert_eq!(ann.phase("cellar"), Some(RoomPhase::Joined));
    assert!(ann.history("cellar").unwrap().iter().all(|e| !matches!(
        e,
        HistoryEntry::System { text, .. } if text == "Incorrect room password."
    )));

    let result = ann.handle(ClientEvent::SelectRoom { room: "attic".into() });
    assert!(matches!(result, Err(ClientError::CredentialsRejected { .. })));
    let actions = drive(&mut ann, ClientEvent::SendMessage { text: "made it".into(), reply_to: None });
    assert!(matches!(sent(&actions).as_slice(), [ClientFrame::Chat { .. }]));
}

#[test]
fn join_answers_are_forgotten_with_the_transport() {
    let mut ann = client();
    drive(&mut ann, add_room("lobby", "ann", "swordfish"));
    drive(&mut ann, ClientEvent::TransportClosed);

    let actions = drive(&mut ann, frame(&ServerFrame::JoinRejected { reason: RejectReason::BadPassword }));
    assert!(matches!(actions.as_slice(), [ClientAction::Log { .. }]));
    assert_eq!(ann.phase("lobby"), Some(RoomPhase::Unjoined));
}

#[test]
fn latest_selection_wins_while_keys_are_derived() {
    let mut ann = client();

    let lobby = ann.handle(add_room("lobby", "ann", "swordfish")).unwrap();
    let den = ann.handle(add_room("den", "ann", "swordfish")).unwrap();

    let request_for = |actions: &[ClientAction]| {
        actions.iter().find_map(|a| match a {
            ClientAction::DeriveKeys { room, password, request } => {
                Some((room.clone(), password.clone(), *request))
            },
            _ => None,
        })
    };
    let (lobby_room, lobby_password, lobby_request) = request_for(&lobby).unwrap();
    let (den_room, den_password, den_request) = request_for(&den).unwrap();

    // The lobby derivation finishes late: its keys are cached, nothing joins.
    let keys = RoomKeys::derive(&lobby_password, &lobby_room);
    let actions = ann
        .handle(ClientEvent::KeysDerived { room: lobby_room, request: lobby_request, keys })
        .unwrap();
    assert!(actions.is_empty());
    assert!(ann.fingerprint("lobby").is_some());
    assert_eq!(ann.phase("lobby"), Some(RoomPhase::Unjoined));

    let keys = RoomKeys::derive(&den_password, &den_room);
    let actions = ann
        .handle(ClientEvent::KeysDerived { room: den_room, request: den_request, keys })
        .unwrap();
    assert!(actions.iter().any(|a| matches!(a, ClientAction::Connect)));
    assert_eq!(ann.active_room().map(RoomName::as_str), Some("den"));

    let actions = drive(&mut ann, ClientEvent::TransportOpened);
    assert!(matches!(
        sent(&actions).as_slice(),
        [ClientFrame::Join { room, .. }] if room == "den"
    ));
}

#[test]
fn switching_rooms_reuses_cached_keys_and_transport() {
    let mut ann = client();
    join(&mut ann, "lobby", "ann", "swordfish");
    join(&mut ann, "den", "ann", "hunter2");
    assert_eq!(ann.phase("lobby"), Some(RoomPhase::Unjoined));

    let actions = ann.handle(ClientEvent::SelectRoom { room: "lobby".into() }).unwrap();
    assert!(!actions.iter().any(|a| matches!(a, ClientAction::DeriveKeys { .. })));
    assert!(!actions.iter().any(|a| matches!(a, ClientAction::Connect)));
    assert!(matches!(
        sent(&actions).as_slice(),
        [ClientFrame::Join { room, .. }] if room == "lobby"
    ));
    assert_eq!(ann.phase("den"), Some(RoomPhase::Unjoined));
}

#[test]
fn presence_is_surfaced_for_the_active_room_only() {
    let mut ann = client();
    join(&mut ann, "lobby", "ann", "swordfish");
    join(&mut ann, "den", "ann", "swordfish");

    let actions = drive(
        &mut ann,
        frame(&ServerFrame::Presence { room: "lobby".into(), count: 1, users: vec!["bob".into()] }),
    );
    assert!(actions.is_empty());
    assert_eq!(ann.presence("lobby"), Some((1, ["bob".to_string()].as_slice())));

    let actions = drive(
        &mut ann,
        frame(&ServerFrame::Presence {
            room: "den".into(),
            count: 2,
            users: vec!["ann".into(), "cy".into()],
        }),
    );
    assert!(matches!(
        actions.as_slice(),
        [ClientAction::PresenceChanged { count: 2, .. }]
    ));
}

#[test]
fn frames_for_other_rooms_are_dropped() {
    let mut ann = client();
    join(&mut ann, "lobby", "ann", "swordfish");
    let before = ann.history("lobby").unwrap().len();

    let actions = drive(
        &mut ann,
        frame(&ServerFrame::Typing { room: "den".into(), active: true, ts: NOW }),
    );
    assert!(actions.is_empty());

    let actions = drive(
        &mut ann,
        frame(&ServerFrame::Chat { room: "den".into(), iv: "AAAA".into(), ciphertext: "AAAA".into(), ts: NOW }),
    );
    assert!(actions.is_empty());
    assert_eq!(ann.history("lobby").unwrap().len(), before);
}

#[test]
fn system_events_become_history() {
    let mut ann = client();
    join(&mut ann, "lobby", "ann", "swordfish");

    for (event, expected) in [
        (SystemEvent::Join, "User joined"),
        (SystemEvent::Leave, "User left"),
        (SystemEvent::Disconnect, "User disconnected"),
    ] {
        let actions = drive(&mut ann, frame(&ServerFrame::System { event, ts: NOW }));
        assert!(matches!(
            delivered(&actions).as_slice(),
            [HistoryEntry::System { text, .. }] if text == expected
        ));
    }
}

#[test]
fn history_is_capped() {
    let mut ann = Client::new(TestEnv::default(), ClientConfig { history_limit: 3 });
    join(&mut ann, "lobby", "ann", "swordfish");

    for ts in 0..5 {
        drive(&mut ann, frame(&ServerFrame::System { event: SystemEvent::Join, ts }));
    }

    let history = ann.history("lobby").unwrap();
    assert_eq!(history.len(), 3);
    let stamps: Vec<u64> = history
        .iter()
        .filter_map(|e| match e {
            HistoryEntry::System { ts, .. } => Some(*ts),
            HistoryEntry::Chat { .. } => None,
        })
        .collect();
    assert_eq!(stamps, vec![2, 3, 4]);
}

#[test]
fn typing_is_debounced() {
    let mut ann = client();
    join(&mut ann, "lobby", "ann", "swordfish");

    let first = drive(&mut ann, ClientEvent::SetTyping { active: true });
    let second = drive(&mut ann, ClientEvent::SetTyping { active: true });
    assert_eq!(sent(&first), vec![ClientFrame::Typing { active: true }]);
    assert!(sent(&second).is_empty());

    // Sending a message ends the typing indicator.
    let actions = drive(&mut ann, ClientEvent::SendMessage { text: "done".into(), reply_to: None });
    let frames = sent(&actions);
    assert!(matches!(frames.as_slice(), [ClientFrame::Chat { .. }, ClientFrame::Typing { active: false }]));

    let actions = drive(&mut ann, ClientEvent::SetTyping { active: false });
    assert!(sent(&actions).is_empty());
}

#[test]
fn transport_loss_resets_joined_rooms_but_keeps_rejections() {
    let mut ann = client();
    drive(&mut ann, add_room("den", "ann", "guess"));
    drive(&mut ann, frame(&ServerFrame::JoinRejected { reason: RejectReason::BadPassword }));
    join(&mut ann, "lobby", "ann", "swordfish");

    drive(&mut ann, ClientEvent::TransportClosed);

    assert_eq!(ann.transport(), TransportState::Disconnected);
    assert_eq!(ann.active_room(), None);
    assert_eq!(ann.phase("lobby"), Some(RoomPhase::Unjoined));
    assert_eq!(ann.phase("den"), Some(RoomPhase::Rejected));

    let result = ann.handle(ClientEvent::SendMessage { text: "hi".into(), reply_to: None });
    assert!(matches!(result, Err(ClientError::NotJoined)));

    // Reselecting reconnects without deriving again.
    let actions = ann.handle(ClientEvent::SelectRoom { room: "lobby".into() }).unwrap();
    assert!(actions.iter().any(|a| matches!(a, ClientAction::Connect)));
    assert!(!actions.iter().any(|a| matches!(a, ClientAction::DeriveKeys { .. })));
}

#[test]
fn disconnect_leaves_then_closes() {
    let mut ann = client();
    join(&mut ann, "lobby", "ann", "swordfish");

    let actions = ann.handle(ClientEvent::Disconnect).unwrap();
    assert!(matches!(
        actions.as_slice(),
        [ClientAction::Send(ClientFrame::Leave {}), ClientAction::Close]
    ));
}

#[test]
fn leave_and_remove() {
    let mut ann = client();
    join(&mut ann, "lobby", "ann", "swordfish");

    let actions = drive(&mut ann, ClientEvent::LeaveRoom);
    assert_eq!(sent(&actions), vec![ClientFrame::Leave {}]);
    assert_eq!(ann.phase("lobby"), Some(RoomPhase::Unjoined));
    assert_eq!(ann.active_room(), None);

    drive(&mut ann, ClientEvent::RemoveRoom { room: "lobby".into() });
    assert_eq!(ann.rooms().count(), 0);
    assert_eq!(ann.phase("lobby"), None);
}

#[test]
fn stale_join_ack_is_ignored() {
    let mut ann = client();
    join(&mut ann, "lobby", "ann", "swordfish");
    drive(&mut ann, add_room("den", "ann", "swordfish"));

    // Ack for the room we just left arrives after the switch.
    drive(
        &mut ann,
        frame(&ServerFrame::Joined { room: "lobby".into(), name: "ann".into(), ts: NOW }),
    );
    assert_eq!(ann.phase("lobby"), Some(RoomPhase::Unjoined));
    assert_eq!(ann.phase("den"), Some(RoomPhase::Verifying));
}
