//! Client state machine.
//!
//! The `Client` remembers any number of rooms with their credentials, but
//! only one room is active at a time and all rooms share one transport.
//! Selecting a room walks it through `Unjoined → Verifying → Joined` (or
//! `Rejected`), deriving keys, connecting and joining as needed.
//!
//! Pure state machine: returns actions, the caller performs the I/O and the
//! key derivation and reports back through events.

use std::collections::{BTreeMap, VecDeque};

use parley_core::{DisplayName, Environment, RoomName};
use parley_crypto::{NONCE_SIZE, decrypt, encrypt};
use parley_proto::{ClientFrame, RejectReason, ServerFrame, SystemEvent};

use crate::{
    error::ClientError,
    event::{ClientAction, ClientEvent, RoomPhase, TransportState},
    keys::{Password, RoomKeys},
    message::{ChatBody, HistoryEntry, ReplyTo},
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// History entries kept per room; older entries are dropped.
    pub history_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { history_limit: 500 }
    }
}

/// Per-room state.
#[derive(Debug)]
struct RoomState {
    name: DisplayName,
    password: Password,
    /// Derived from the current password, once available.
    keys: Option<RoomKeys>,
    /// Outstanding derivation for the current password.
    pending_request: Option<u64>,
    phase: RoomPhase,
    history: VecDeque<HistoryEntry>,
    presence: (usize, Vec<String>),
}

impl RoomState {
    fn new(name: DisplayName, password: Password) -> Self {
        Self {
            name,
            password,
            keys: None,
            pending_request: None,
            phase: RoomPhase::Unjoined,
            history: VecDeque::new(),
            presence: (0, Vec::new()),
        }
    }
}

/// Client state machine.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for time/randomness
#[derive(Debug)]
pub struct Client<E: Environment> {
    env: E,
    config: ClientConfig,
    transport: TransportState,
    /// Remembered rooms.
    rooms: BTreeMap<RoomName, RoomState>,
    /// Currently selected room.
    active: Option<RoomName>,
    /// Rooms whose `join` is on the wire, oldest first. The relay answers
    /// joins in order and `join-rejected` names no room.
    in_flight: VecDeque<RoomName>,
    /// Whether we last told the relay we are typing.
    typing: bool,
    next_request: u64,
}

impl<E: Environment> Client<E> {
    /// Create a client with no rooms and no connection.
    pub fn new(env: E, config: ClientConfig) -> Self {
        Self {
            env,
            config,
            transport: TransportState::Disconnected,
            rooms: BTreeMap::new(),
            active: None,
            in_flight: VecDeque::new(),
            typing: false,
            next_request: 0,
        }
    }

    /// Transport state as last reported.
    pub fn transport(&self) -> TransportState {
        self.transport
    }

    /// The selected room, if any.
    pub fn active_room(&self) -> Option<&RoomName> {
        self.active.as_ref()
    }

    /// Remembered rooms in name order.
    pub fn rooms(&self) -> impl Iterator<Item = &RoomName> {
        self.rooms.keys()
    }

    /// Join phase of a remembered room.
    pub fn phase(&self, room: &str) -> Option<RoomPhase> {
        self.rooms.get(room).map(|r| r.phase)
    }

    /// Local history of a remembered room, oldest first.
    pub fn history(&self, room: &str) -> Option<&VecDeque<HistoryEntry>> {
        self.rooms.get(room).map(|r| &r.history)
    }

    /// Last known presence of a remembered room.
    pub fn presence(&self, room: &str) -> Option<(usize, &[String])> {
        self.rooms.get(room).map(|r| (r.presence.0, r.presence.1.as_slice()))
    }

    /// Key fingerprint of a room whose keys have been derived.
    pub fn fingerprint(&self, room: &str) -> Option<&str> {
        self.rooms.get(room).and_then(|r| r.keys.as_ref()).map(RoomKeys::fingerprint)
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the event cannot be processed.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::AddRoom { room, name, password } => {
                self.handle_add_room(&room, &name, password)
            },
            ClientEvent::SelectRoom { room } => self.handle_select_room(&RoomName::resolve(&room)),
            ClientEvent::LeaveRoom => Ok(self.handle_leave_room()),
            ClientEvent::RemoveRoom { room } => self.handle_remove_room(&RoomName::resolve(&room)),
            ClientEvent::KeysDerived { room, request, keys } => {
                Ok(self.handle_keys_derived(room, request, keys))
            },
            ClientEvent::TransportOpened => Ok(self.handle_transport_opened()),
            ClientEvent::TransportClosed => Ok(self.handle_transport_closed()),
            ClientEvent::FrameReceived(text) => Ok(self.handle_frame(&text)),
            ClientEvent::SendMessage { text, reply_to } => self.handle_send_message(text, reply_to),
            ClientEvent::SetTyping { active } => Ok(self.handle_set_typing(active)),
            ClientEvent::Disconnect => Ok(self.handle_disconnect()),
        }
    }

    fn handle_add_room(
        &mut self,
        room: &str,
        name: &str,
        password: Password,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let room = RoomName::resolve(room);
        if password.is_empty() {
            return Err(ClientError::MissingPassword { room: room.to_string() });
        }

        let name = DisplayName::resolve(name);
        let mut actions = Vec::new();

        match self.rooms.get_mut(&room) {
            Some(state) => {
                state.name = name;
                if state.password != password {
                    state.password = password;
                    state.keys = None;
                    state.pending_request = None;
                }
                if state.phase == RoomPhase::Rejected {
                    state.phase = RoomPhase::Unjoined;
                    actions.push(ClientAction::RoomPhaseChanged {
                        room: room.clone(),
                        phase: RoomPhase::Unjoined,
                    });
                }
            },
            None => {
                self.rooms.insert(room.clone(), RoomState::new(name, password));
            },
        }

        actions.extend(self.handle_select_room(&room)?);
        Ok(actions)
    }

    fn handle_select_room(&mut self, room: &RoomName) -> Result<Vec<ClientAction>, ClientError> {
        let phase = self
            .rooms
            .get(room)
            .map(|r| r.phase)
            .ok_or_else(|| ClientError::RoomNotFound { room: room.to_string() })?;

        if phase == RoomPhase::Rejected {
            return Err(ClientError::CredentialsRejected { room: room.to_string() });
        }

        let mut actions = Vec::new();

        if let Some(previous) = self.active.take() {
            if previous != *room {
                actions.extend(self.demote(&previous));
            }
        }
        self.active = Some(room.clone());
        self.typing = false;

        actions.extend(self.set_phase(room, RoomPhase::Verifying));

        let Some(state) = self.rooms.get_mut(room) else {
            return Ok(actions);
        };

        if state.keys.is_some() {
            actions.extend(self.proceed_join(room));
        } else {
            let request = self.next_request;
            self.next_request += 1;
            state.pending_request = Some(request);
            actions.push(ClientAction::DeriveKeys {
                room: room.clone(),
                password: state.password.clone(),
                request,
            });
        }

        Ok(actions)
    }

    /// Keys are available for the active, verifying room: show the
    /// fingerprint and get the join onto the wire.
    fn proceed_join(&mut self, room: &RoomName) -> Vec<ClientAction> {
        let mut actions = Vec::new();

        if let Some(keys) = self.rooms.get(room).and_then(|r| r.keys.as_ref()) {
            actions.push(ClientAction::FingerprintReady {
                room: room.clone(),
                fingerprint: keys.fingerprint().to_string(),
            });
        }

        match self.transport {
            TransportState::Open => actions.extend(self.join_frame(room)),
            TransportState::Connecting => {},
            TransportState::Disconnected => {
                self.transport = TransportState::Connecting;
                actions.push(ClientAction::Connect);
            },
        }

        actions
    }

    fn join_frame(&mut self, room: &RoomName) -> Option<ClientAction> {
        let state = self.rooms.get(room)?;
        let keys = state.keys.as_ref()?;

        let frame = ClientFrame::Join {
            room: room.to_string(),
            name: state.name.to_string(),
            verifier: keys.verifier().clone(),
        };
        self.in_flight.push_back(room.clone());
        Some(ClientAction::Send(frame))
    }

    fn handle_keys_derived(
        &mut self,
        room: RoomName,
        request: u64,
        keys: RoomKeys,
    ) -> Vec<ClientAction> {
        let Some(state) = self.rooms.get_mut(&room) else {
            return vec![ClientAction::Log { message: format!("discarding keys for removed room {room}") }];
        };

        if state.pending_request != Some(request) {
            return vec![ClientAction::Log { message: format!("discarding stale keys for {room}") }];
        }

        state.pending_request = None;
        state.keys = Some(keys);

        if self.active.as_ref() == Some(&room) && state.phase == RoomPhase::Verifying {
            self.proceed_join(&room)
        } else {
            Vec::new()
        }
    }

    fn handle_leave_room(&mut self) -> Vec<ClientAction> {
        let Some(room) = self.active.take() else {
            return Vec::new();
        };

        let mut actions = Vec::new();
        if self.transport == TransportState::Open {
            actions.push(ClientAction::Send(ClientFrame::Leave {}));
        }
        actions.extend(self.demote(&room));
        self.typing = false;

        actions
    }

    fn handle_remove_room(&mut self, room: &RoomName) -> Result<Vec<ClientAction>, ClientError> {
        if !self.rooms.contains_key(room) {
            return Err(ClientError::RoomNotFound { room: room.to_string() });
        }

        let mut actions = Vec::new();
        if self.active.as_ref() == Some(room) {
            actions.extend(self.handle_leave_room());
        }
        self.rooms.remove(room);

        Ok(actions)
    }

    fn handle_transport_opened(&mut self) -> Vec<ClientAction> {
        self.transport = TransportState::Open;

        let Some(room) = self.active.clone() else {
            return Vec::new();
        };

        match self.rooms.get(&room) {
            Some(state) if state.phase == RoomPhase::Verifying => {
                self.join_frame(&room).into_iter().collect()
            },
            _ => Vec::new(),
        }
    }

    fn handle_transport_closed(&mut self) -> Vec<ClientAction> {
        self.transport = TransportState::Disconnected;
        self.active = None;
        self.in_flight.clear();
        self.typing = false;

        let mut actions = Vec::new();
        for (room, state) in &mut self.rooms {
            if matches!(state.phase, RoomPhase::Verifying | RoomPhase::Joined) {
                state.phase = RoomPhase::Unjoined;
                state.presence = (0, Vec::new());
                actions.push(ClientAction::RoomPhaseChanged {
                    room: room.clone(),
                    phase: RoomPhase::Unjoined,
                });
            }
        }

        actions
    }

    fn handle_frame(&mut self, text: &str) -> Vec<ClientAction> {
        let frame = match ServerFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) if e.is_unknown_type() => return Vec::new(),
            Err(e) => {
                return vec![ClientAction::Log { message: format!("dropping malformed frame: {e}") }];
            },
        };

        let frame = match frame {
            ServerFrame::Joined { room, name, ts } => return self.handle_joined(&room, &name, ts),
            ServerFrame::JoinRejected { reason } => return self.handle_join_rejected(reason),
            other => other,
        };

        let Some(active) = self.active.clone() else {
            return Vec::new();
        };

        match frame {
            ServerFrame::Joined { .. } | ServerFrame::JoinRejected { .. } => Vec::new(),

            ServerFrame::Chat { room, iv, ciphertext, ts } => {
                if room != active.as_str() || self.phase(&room) != Some(RoomPhase::Joined) {
                    return Vec::new();
                }
                self.open_chat(&active, &iv, &ciphertext, ts)
            },

            ServerFrame::Typing { room, active: typing, .. } => {
                if room != active.as_str() {
                    return Vec::new();
                }
                vec![ClientAction::TypingChanged { room: active, active: typing }]
            },

            ServerFrame::Presence { room, count, users } => {
                let room = RoomName::resolve(&room);
                let Some(state) = self.rooms.get_mut(&room) else {
                    return Vec::new();
                };
                state.presence = (count, users.clone());
                if room == active {
                    vec![ClientAction::PresenceChanged { room, count, users }]
                } else {
                    Vec::new()
                }
            },

            ServerFrame::System { event, ts } => {
                if self.phase(active.as_str()) != Some(RoomPhase::Joined) {
                    return Vec::new();
                }
                let text = match event {
                    SystemEvent::Join => "User joined",
                    SystemEvent::Leave => "User left",
                    SystemEvent::Disconnect => "User disconnected",
                };
                self.record(&active, HistoryEntry::System { text: text.to_string(), ts })
                    .into_iter()
                    .collect()
            },
        }
    }

    /// Acknowledgment for the oldest join on the wire.
    fn handle_joined(&mut self, room: &str, name: &str, ts: u64) -> Vec<ClientAction> {
        if self.in_flight.front().map(RoomName::as_str) != Some(room) {
            return vec![ClientAction::Log { message: format!("ignoring unexpected join ack for {room}") }];
        }
        let Some(room) = self.in_flight.pop_front() else {
            return Vec::new();
        };

        if self.active.as_ref() != Some(&room) || self.phase(room.as_str()) != Some(RoomPhase::Verifying) {
            return vec![ClientAction::Log { message: format!("ignoring stale join ack for {room}") }];
        }

        let mut actions: Vec<_> = self.set_phase(&room, RoomPhase::Joined).into_iter().collect();
        actions.extend(self.record(&room, HistoryEntry::System {
            text: format!("Joined room {room} as {name}"),
            ts,
        }));
        actions
    }

    /// Rejection of the oldest join on the wire, which need not be the
    /// active room any more.
    fn handle_join_rejected(&mut self, reason: RejectReason) -> Vec<ClientAction> {
        let Some(room) = self.in_flight.pop_front() else {
            return vec![ClientAction::Log { message: "ignoring unexpected join rejection".to_string() }];
        };
        if !matches!(self.phase(room.as_str()), Some(RoomPhase::Verifying | RoomPhase::Unjoined)) {
            return Vec::new();
        }

        let text = match reason {
            RejectReason::BadPassword => "Incorrect room password.",
            RejectReason::Rejected => "Join rejected.",
        };
        let ts = self.env.unix_millis();

        let mut actions: Vec<_> = self.set_phase(&room, RoomPhase::Rejected).into_iter().collect();
        actions.extend(self.record(&room, HistoryEntry::System { text: text.to_string(), ts }));
        actions
    }

    /// Decrypt a relayed envelope. Anything that does not open under this
    /// room's key is dropped: a wrong key is by far the most likely cause.
    fn open_chat(&mut self, room: &RoomName, iv: &str, ciphertext: &str, ts: u64) -> Vec<ClientAction> {
        let Some(keys) = self.rooms.get(room).and_then(|r| r.keys.as_ref()) else {
            return Vec::new();
        };

        let plaintext = match decrypt(keys.key(), iv, ciphertext) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                return vec![ClientAction::Log { message: format!("dropping message in {room}: {e}") }];
            },
        };

        let body = ChatBody::from_plaintext(&plaintext, ts);
        self.record(room, HistoryEntry::Chat { body, own: false }).into_iter().collect()
    }

    fn handle_send_message(
        &mut self,
        text: String,
        reply_to: Option<ReplyTo>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let room = self.joined_room().ok_or(ClientError::NotJoined)?;
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let (name, keys) = match self.rooms.get(&room) {
            Some(RoomState { name, keys: Some(keys), .. }) => (name.to_string(), keys),
            _ => return Err(ClientError::NotJoined),
        };

        let body = ChatBody { from: name, text, ts: self.env.unix_millis(), reply_to };
        let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(&body)?);

        let mut nonce = [0u8; NONCE_SIZE];
        self.env.random_bytes(&mut nonce);
        let envelope = encrypt(keys.key(), &plaintext, nonce)?;

        let mut actions = vec![ClientAction::Send(ClientFrame::Chat {
            iv: envelope.iv,
            ciphertext: envelope.ciphertext,
        })];

        actions.extend(self.record(&room, HistoryEntry::Chat { body, own: true }));

        if self.typing {
            self.typing = false;
            actions.push(ClientAction::Send(ClientFrame::Typing { active: false }));
        }

        Ok(actions)
    }

    fn handle_set_typing(&mut self, active: bool) -> Vec<ClientAction> {
        if self.joined_room().is_none() || self.typing == active {
            return Vec::new();
        }

        self.typing = active;
        vec![ClientAction::Send(ClientFrame::Typing { active })]
    }

    fn handle_disconnect(&mut self) -> Vec<ClientAction> {
        if self.transport == TransportState::Disconnected {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.transport == TransportState::Open && self.active.is_some() {
            actions.push(ClientAction::Send(ClientFrame::Leave {}));
        }
        actions.push(ClientAction::Close);

        actions
    }

    /// Active room, if it is joined over an open transport.
    fn joined_room(&self) -> Option<RoomName> {
        let room = self.active.as_ref()?;
        let joined = self.transport == TransportState::Open
            && self.phase(room.as_str()) == Some(RoomPhase::Joined);
        joined.then(|| room.clone())
    }

    /// Drop a room back to `Unjoined` unless its credentials were rejected.
    fn demote(&mut self, room: &RoomName) -> Option<ClientAction> {
        match self.phase(room.as_str())? {
            RoomPhase::Rejected => None,
            _ => self.set_phase(room, RoomPhase::Unjoined),
        }
    }

    fn set_phase(&mut self, room: &RoomName, phase: RoomPhase) -> Option<ClientAction> {
        let state = self.rooms.get_mut(room)?;
        if state.phase == phase {
            return None;
        }

        state.phase = phase;
        if phase != RoomPhase::Joined {
            state.presence = (0, Vec::new());
        }

        Some(ClientAction::RoomPhaseChanged { room: room.clone(), phase })
    }

    /// Append to a room's history and surface the entry.
    fn record(&mut self, room: &RoomName, entry: HistoryEntry) -> Option<ClientAction> {
        let state = self.rooms.get_mut(room)?;
        state.history.push_back(entry.clone());
        while state.history.len() > self.config.history_limit {
            state.history.pop_front();
        }

        Some(ClientAction::Deliver { room: room.clone(), entry })
    }
}
