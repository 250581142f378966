//! In-memory simulation of a relay and its clients.
//!
//! `SimWorld` wires one [`ServerDriver`] to any number of [`Client`]s without
//! sockets. Every action either side emits is turned into an event for the
//! other side and queued; [`SimWorld::run`] drains the queue in FIFO order,
//! which preserves per-connection ordering the way a real transport does.
//!
//! ```text
//! Client ──Send──▶ queue ──FrameReceived──▶ ServerDriver
//!   ▲                                            │
//!   └──FrameReceived◀── queue ◀──SendToSession/Broadcast
//! ```
//!
//! Key derivation is answered immediately from a shared [`KeyCache`], and
//! pings are answered unless a client has been made unresponsive.

use std::{collections::VecDeque, time::Duration};

use parley_client::{
    Client, ClientAction, ClientConfig, ClientError, ClientEvent, HistoryEntry, Password,
    RoomPhase, TransportState,
};
use parley_core::Environment;
use parley_server::{DriverConfig, LogLevel, ServerAction, ServerDriver, ServerEvent, SessionId};

use crate::{
    KeyCache, SimEnv,
    model::{
        ClientId, ClientView, MODEL_ROOMS, ModelRoomId, ObservableState, Operation,
        OperationError, OperationResult, PasswordId,
    },
};

/// Index of a client in the world.
pub type ClientIndex = usize;

/// Passwords behind [`PasswordId`]s.
const PASSWORDS: [&str; 2] = ["swordfish", "hunter2"];

/// Room identifier used for a model room.
pub fn room_name(room: ModelRoomId) -> String {
    format!("room-{room}")
}

/// Display name used for a model client.
pub fn user_name(client: ClientId) -> String {
    format!("user-{client}")
}

fn password(id: PasswordId) -> Password {
    Password::new(PASSWORDS[usize::from(id) % PASSWORDS.len()])
}

#[derive(Debug)]
enum Delivery {
    ToServer(ServerEvent),
    ToClient(ClientIndex, ClientEvent),
}

#[derive(Debug)]
struct SimClient {
    client: Client<SimEnv>,
    session: Option<SessionId>,
    responsive: bool,
    surfaced: Vec<ClientAction>,
}

/// A relay and its clients, run to quiescence after every input.
#[derive(Debug)]
pub struct SimWorld {
    env: SimEnv,
    driver: ServerDriver<SimEnv>,
    clients: Vec<SimClient>,
    keys: KeyCache,
    next_session: SessionId,
    queue: VecDeque<Delivery>,
    server_logs: Vec<(LogLevel, String)>,
    faults: Vec<String>,
}

impl SimWorld {
    /// World with default configuration.
    pub fn new(num_clients: usize, seed: u64) -> Self {
        Self::with_config(num_clients, seed, DriverConfig::default(), ClientConfig::default())
    }

    /// World with explicit relay and client configuration.
    pub fn with_config(
        num_clients: usize,
        seed: u64,
        driver: DriverConfig,
        client: ClientConfig,
    ) -> Self {
        let env = SimEnv::with_seed(seed);
        let clients = (0..num_clients)
            .map(|_| SimClient {
                client: Client::new(env.clone(), client.clone()),
                session: None,
                responsive: true,
                surfaced: Vec::new(),
            })
            .collect();

        Self {
            driver: ServerDriver::new(env.clone(), driver),
            next_session: env.random_u64(),
            env,
            clients,
            keys: KeyCache::shared(),
            queue: VecDeque::new(),
            server_logs: Vec::new(),
            faults: Vec::new(),
        }
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// The relay.
    pub fn driver(&self) -> &ServerDriver<SimEnv> {
        &self.driver
    }

    /// Number of clients.
    pub fn num_clients(&self) -> usize {
        self.clients.len()
    }

    /// A client's state machine.
    pub fn client(&self, index: ClientIndex) -> Option<&Client<SimEnv>> {
        self.clients.get(index).map(|c| &c.client)
    }

    /// Relay session currently carrying a client.
    pub fn session_of(&self, index: ClientIndex) -> Option<SessionId> {
        self.clients.get(index).and_then(|c| c.session)
    }

    /// Log lines the relay emitted so far.
    pub fn server_logs(&self) -> &[(LogLevel, String)] {
        &self.server_logs
    }

    /// Errors raised while delivering queued events. A healthy run has none.
    pub fn faults(&self) -> &[String] {
        &self.faults
    }

    /// Take the user-facing actions a client produced since the last call.
    pub fn take_surfaced(&mut self, index: ClientIndex) -> Vec<ClientAction> {
        self.clients.get_mut(index).map(|c| std::mem::take(&mut c.surfaced)).unwrap_or_default()
    }

    /// Stop (or resume) answering liveness pings for a client.
    pub fn set_responsive(&mut self, index: ClientIndex, responsive: bool) {
        if let Some(client) = self.clients.get_mut(index) {
            client.responsive = responsive;
        }
    }

    /// Feed a user event to a client and run until nothing is in flight.
    /// Unknown indices are ignored.
    ///
    /// # Errors
    ///
    /// Whatever the client returns for `event` itself. Errors from the
    /// follow-up deliveries are recorded in [`SimWorld::faults`].
    pub fn apply(&mut self, index: ClientIndex, event: ClientEvent) -> Result<(), ClientError> {
        let Some(sim) = self.clients.get_mut(index) else {
            return Ok(());
        };
        let actions = sim.client.handle(event)?;
        self.execute_client(index, actions);
        self.run();
        Ok(())
    }

    /// Convenience: add `room` with credentials and select it.
    ///
    /// # Errors
    ///
    /// As [`SimWorld::apply`].
    pub fn join(
        &mut self,
        index: ClientIndex,
        room: &str,
        name: &str,
        password: &str,
    ) -> Result<(), ClientError> {
        self.apply(index, ClientEvent::AddRoom {
            room: room.to_string(),
            name: name.to_string(),
            password: Password::new(password),
        })
    }

    /// Advance the clock and run one liveness sweep.
    pub fn tick(&mut self, by: Duration) {
        self.env.advance(by);
        self.queue.push_back(Delivery::ToServer(ServerEvent::LivenessTick));
        self.run();
    }

    /// Fail a client's transport without a goodbye on either side.
    pub fn drop_connection(&mut self, index: ClientIndex) {
        let Some(session_id) = self.clients.get_mut(index).and_then(|c| c.session.take()) else {
            return;
        };
        self.queue.push_back(Delivery::ToServer(ServerEvent::ConnectionClosed {
            session_id,
            reason: "transport failed".to_string(),
        }));
        self.queue.push_back(Delivery::ToClient(index, ClientEvent::TransportClosed));
        self.run();
    }

    /// Deliver queued events until none remain.
    pub fn run(&mut self) {
        while let Some(delivery) = self.queue.pop_front() {
            match delivery {
                Delivery::ToServer(event) => match self.driver.process_event(event) {
                    Ok(actions) => self.execute_server(actions),
                    Err(e) => self.fault(format!("relay: {e}")),
                },
                Delivery::ToClient(index, event) => {
                    let Some(sim) = self.clients.get_mut(index) else {
                        continue;
                    };
                    match sim.client.handle(event) {
                        Ok(actions) => self.execute_client(index, actions),
                        Err(e) => self.fault(format!("client {index}: {e}")),
                    }
                },
            }
        }
    }

    fn fault(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.faults.push(message);
    }

    fn execute_client(&mut self, index: ClientIndex, actions: Vec<ClientAction>) {
        for action in actions {
            match action {
                ClientAction::Connect => self.connect(index),

                ClientAction::Send(frame) => {
                    let Some(session_id) = self.session_of(index) else {
                        continue;
                    };
                    match frame.encode() {
                        Ok(text) => self.queue.push_back(Delivery::ToServer(
                            ServerEvent::FrameReceived { session_id, text },
                        )),
                        Err(e) => self.fault(format!("client {index} encode: {e}")),
                    }
                },

                ClientAction::Close => {
                    if let Some(session_id) = self.clients.get_mut(index).and_then(|c| c.session.take()) {
                        self.queue.push_back(Delivery::ToServer(ServerEvent::ConnectionClosed {
                            session_id,
                            reason: "client closed".to_string(),
                        }));
                    }
                    self.queue.push_back(Delivery::ToClient(index, ClientEvent::TransportClosed));
                },

                ClientAction::DeriveKeys { room, password, request } => {
                    let keys = self.keys.derive(&password, &room);
                    self.queue.push_back(Delivery::ToClient(index, ClientEvent::KeysDerived {
                        room,
                        request,
                        keys,
                    }));
                },

                other => {
                    if let Some(sim) = self.clients.get_mut(index) {
                        sim.surfaced.push(other);
                    }
                },
            }
        }
    }

    /// Accepting happens synchronously so the client learns at once whether
    /// the relay kept the connection.
    fn connect(&mut self, index: ClientIndex) {
        let session_id = self.next_session;
        self.next_session = self.next_session.wrapping_add(1);

        if let Some(sim) = self.clients.get_mut(index) {
            sim.session = Some(session_id);
        }

        match self.driver.process_event(ServerEvent::ConnectionAccepted { session_id }) {
            Ok(actions) => self.execute_server(actions),
            Err(e) => self.fault(format!("relay: {e}")),
        }

        // A refused connection has already queued `TransportClosed`.
        if self.session_of(index) == Some(session_id) {
            self.queue.push_back(Delivery::ToClient(index, ClientEvent::TransportOpened));
        }
    }

    fn client_for(&self, session_id: SessionId) -> Option<ClientIndex> {
        self.clients.iter().position(|c| c.session == Some(session_id))
    }

    fn execute_server(&mut self, actions: Vec<ServerAction>) {
        for action in actions {
            match action {
                ServerAction::SendToSession { session_id, frame } => {
                    self.send_frame(session_id, &frame);
                },
                ServerAction::Broadcast { recipients, frame } => {
                    for session_id in recipients {
                        self.send_frame(session_id, &frame);
                    }
                },
                ServerAction::Ping { session_id } => {
                    let answers = self
                        .client_for(session_id)
                        .and_then(|i| self.clients.get(i))
                        .is_some_and(|c| c.responsive);
                    if answers {
                        self.queue.push_back(Delivery::ToServer(ServerEvent::PongReceived {
                            session_id,
                        }));
                    }
                },
                ServerAction::CloseConnection { session_id, .. } => {
                    if let Some(index) = self.client_for(session_id) {
                        if let Some(sim) = self.clients.get_mut(index) {
                            sim.session = None;
                        }
                        self.queue.push_back(Delivery::ToClient(index, ClientEvent::TransportClosed));
                    }
                },
                ServerAction::Log { level, message } => self.server_logs.push((level, message)),
            }
        }
    }

    fn send_frame(&mut self, session_id: SessionId, frame: &parley_proto::ServerFrame) {
        let Some(index) = self.client_for(session_id) else {
            return;
        };
        match frame.encode() {
            Ok(text) => self.queue.push_back(Delivery::ToClient(index, ClientEvent::FrameReceived(text))),
            Err(e) => self.fault(format!("relay encode: {e}")),
        }
    }

    /// Apply a model operation to the simulated system.
    pub fn apply_operation(&mut self, op: &Operation) -> OperationResult {
        let client = match op {
            Operation::Join { client_id, .. }
            | Operation::SendMessage { client_id, .. }
            | Operation::LeaveRoom { client_id }
            | Operation::Disconnect { client_id }
            | Operation::DropConnection { client_id } => Some(usize::from(*client_id)),
            Operation::AdvanceTime { .. } => None,
        };
        if client.is_some_and(|c| c >= self.clients.len()) {
            return OperationResult::Error(OperationError::InvalidClient);
        }

        let result = match op {
            Operation::Join { client_id, room_id, password: password_id } => {
                self.apply(usize::from(*client_id), ClientEvent::AddRoom {
                    room: room_name(*room_id),
                    name: user_name(*client_id),
                    password: password(*password_id),
                })
            },
            Operation::SendMessage { client_id, content } => self.apply(
                usize::from(*client_id),
                ClientEvent::SendMessage { text: content.to_text(), reply_to: None },
            ),
            Operation::LeaveRoom { client_id } => {
                self.apply(usize::from(*client_id), ClientEvent::LeaveRoom)
            },
            Operation::Disconnect { client_id } => {
                self.apply(usize::from(*client_id), ClientEvent::Disconnect)
            },
            Operation::DropConnection { client_id } => {
                self.drop_connection(usize::from(*client_id));
                Ok(())
            },
            Operation::AdvanceTime { millis } => {
                let half = Duration::from_millis(u64::from(*millis) / 2);
                self.tick(half);
                self.tick(half);
                Ok(())
            },
        };

        match result {
            Ok(()) => OperationResult::Ok,
            Err(ClientError::NotJoined) => OperationResult::Error(OperationError::NotJoined),
            Err(e) => {
                self.fault(format!("unexpected client error: {e}"));
                OperationResult::Error(OperationError::NotJoined)
            },
        }
    }

    /// Observable state in model terms.
    pub fn observable_state(&self) -> ObservableState {
        let rooms = (0..MODEL_ROOMS)
            .filter_map(|id| {
                let name = parley_core::RoomName::resolve(&room_name(id));
                if !self.driver.registry().has_room(name.as_str()) {
                    return None;
                }
                let members = self
                    .driver
                    .registry()
                    .presence(&name)
                    .users
                    .iter()
                    .filter_map(|u| parse_suffix(u, "user-"))
                    .collect();
                Some((id, members))
            })
            .collect();

        let clients = self.clients.iter().map(|sim| view(&sim.client)).collect();

        ObservableState { rooms, clients }
    }
}

fn parse_suffix(value: &str, prefix: &str) -> Option<u8> {
    value.strip_prefix(prefix)?.parse().ok()
}

fn view(client: &Client<SimEnv>) -> ClientView {
    let joined = client
        .active_room()
        .filter(|room| client.phase(room.as_str()) == Some(RoomPhase::Joined))
        .and_then(|room| parse_suffix(room.as_str(), "room-"));

    let rejected = client
        .rooms()
        .filter(|room| client.phase(room.as_str()) == Some(RoomPhase::Rejected))
        .filter_map(|room| parse_suffix(room.as_str(), "room-"))
        .collect();

    let received = client
        .rooms()
        .filter_map(|room| client.history(room.as_str()))
        .flatten()
        .filter(|entry| matches!(entry, HistoryEntry::Chat { own: false, .. }))
        .count();

    ClientView {
        connected: client.transport() == TransportState::Open,
        joined,
        rejected,
        received,
    }
}
