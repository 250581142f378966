//! Server Driver
//!
//! Sans-IO orchestrator for the relay. Consumes [`ServerEvent`]s from the
//! runtime and returns the [`ServerAction`]s the runtime must perform. The
//! driver never touches a socket or a timer, so the whole relay can be run
//! inside a deterministic simulation.
//!
//! ## Ordering
//!
//! Events are processed one at a time and each event's actions are returned
//! in the order they must be delivered. For a successful join that is:
//!
//! 1. presence of the room the session just left (if it still exists)
//! 2. `joined` to the joiner
//! 3. `system join` to the other members
//! 4. presence of the joined room
//!
//! ## Content blindness
//!
//! Chat envelopes are forwarded byte for byte. The driver has no key and no
//! code path that looks inside `iv` or `ciphertext`.

use parley_core::{DisplayName, Environment, RoomName};
use parley_proto::{ClientFrame, ProtocolError, RejectReason, ServerFrame, SystemEvent, Verifier};

use crate::{
    error::ServerError,
    liveness::LivenessMonitor,
    registry::{Admission, Departure, JoinRejection, RoomRegistry, SessionId},
    relay,
};

/// Longest verifier the relay accepts, in characters.
pub const MAX_VERIFIER_CHARS: usize = 128;

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum number of concurrently registered sessions.
    pub max_connections: usize,
    /// Largest inbound text frame processed, in bytes. Larger frames are
    /// dropped.
    pub max_frame_bytes: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_connections: 10_000, max_frame_bytes: 64 * 1024 }
    }
}

/// Log severity carried by [`ServerAction::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug
    Debug,
    /// Info
    Info,
    /// Warn
    Warn,
    /// Error
    Error,
}

/// Inputs to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A transport connection was established.
    ConnectionAccepted {
        /// New session.
        session_id: SessionId,
    },

    /// A text frame arrived on a session.
    FrameReceived {
        /// Sending session.
        session_id: SessionId,
        /// Raw frame text.
        text: String,
    },

    /// A session answered a liveness ping.
    PongReceived {
        /// Answering session.
        session_id: SessionId,
    },

    /// A transport connection went away.
    ConnectionClosed {
        /// Closed session.
        session_id: SessionId,
        /// Human-readable cause, for logging.
        reason: String,
    },

    /// Periodic liveness sweep.
    LivenessTick,
}

/// Outputs of the driver, executed by the runtime in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Send a frame to one session.
    SendToSession {
        /// Recipient.
        session_id: SessionId,
        /// Frame to send.
        frame: ServerFrame,
    },

    /// Send the same frame to every listed session.
    Broadcast {
        /// Recipients in room join order.
        recipients: Vec<SessionId>,
        /// Frame to send.
        frame: ServerFrame,
    },

    /// Send a transport-level ping.
    Ping {
        /// Session to probe.
        session_id: SessionId,
    },

    /// Terminate a connection. The driver has already forgotten it.
    CloseConnection {
        /// Session to close.
        session_id: SessionId,
        /// Human-readable cause, for logging.
        reason: String,
    },

    /// Emit a log line.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message.
        message: String,
    },
}

/// Sans-IO relay driver.
#[derive(Debug)]
pub struct ServerDriver<E: Environment> {
    env: E,
    config: DriverConfig,
    registry: RoomRegistry,
    liveness: LivenessMonitor,
}

impl<E: Environment> ServerDriver<E> {
    /// Create a driver with no sessions.
    pub fn new(env: E, config: DriverConfig) -> Self {
        Self { env, config, registry: RoomRegistry::new(), liveness: LivenessMonitor::new() }
    }

    /// Read access to the room registry.
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Read access to the liveness monitor.
    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Process one event.
    ///
    /// # Errors
    ///
    /// - `UnknownSession` if a frame arrives for a session that was never
    ///   accepted
    /// - `DuplicateSession` if a connection is accepted under an id in use
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, ServerError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => self.handle_accept(session_id),
            ServerEvent::FrameReceived { session_id, text } => {
                self.handle_frame(session_id, &text)
            },
            ServerEvent::PongReceived { session_id } => {
                self.liveness.acknowledge(session_id);
                Ok(Vec::new())
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                Ok(self.handle_close(session_id, &reason))
            },
            ServerEvent::LivenessTick => Ok(self.handle_sweep()),
        }
    }

    fn handle_accept(&mut self, session_id: SessionId) -> Result<Vec<ServerAction>, ServerError> {
        if self.registry.session_count() >= self.config.max_connections {
            return Ok(vec![
                ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "refusing session {session_id:#x}: {} connections open",
                        self.config.max_connections
                    ),
                },
                ServerAction::CloseConnection { session_id, reason: "server full".to_string() },
            ]);
        }

        if !self.registry.register(session_id) {
            return Err(ServerError::DuplicateSession(session_id));
        }
        self.liveness.track(session_id);

        Ok(vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("session {session_id:#x} connected"),
        }])
    }

    fn handle_frame(
        &mut self,
        session_id: SessionId,
        text: &str,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if !self.registry.is_registered(session_id) {
            return Err(ServerError::UnknownSession(session_id));
        }

        if text.len() > self.config.max_frame_bytes {
            return Ok(vec![debug(format!(
                "dropping {} byte frame from session {session_id:#x}",
                text.len()
            ))]);
        }

        let frame = match ClientFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => return Ok(vec![Self::drop_undecodable(session_id, &e)]),
        };

        let ts = self.env.unix_millis();
        let actions = match frame {
            ClientFrame::Join { room, name, verifier } => {
                self.handle_join(session_id, &room, &name, &verifier)
            },
            ClientFrame::Chat { iv, ciphertext } => {
                relay::chat(&self.registry, session_id, iv, ciphertext, ts).into_iter().collect()
            },
            ClientFrame::Typing { active } => {
                relay::typing(&self.registry, session_id, active, ts).into_iter().collect()
            },
            ClientFrame::Leave {} => match self.registry.leave(session_id) {
                Some(departure) => self.announce_departure(&departure, SystemEvent::Leave),
                None => Vec::new(),
            },
        };

        Ok(actions)
    }

    fn drop_undecodable(session_id: SessionId, error: &ProtocolError) -> ServerAction {
        if error.is_unknown_type() {
            debug(format!("ignoring frame from session {session_id:#x}: {error}"))
        } else {
            debug(format!("dropping malformed frame from session {session_id:#x}: {error}"))
        }
    }

    fn handle_join(
        &mut self,
        session_id: SessionId,
        room: &str,
        name: &str,
        verifier: &Verifier,
    ) -> Vec<ServerAction> {
        if !is_well_formed(verifier) {
            return vec![reject(session_id, RejectReason::Rejected)];
        }

        let room = RoomName::resolve(room);
        let name = DisplayName::resolve(name);

        match self.registry.join(session_id, room, name, verifier) {
            Ok(admission) => self.announce_admission(session_id, admission),
            Err(JoinRejection::BadPassword) => {
                vec![
                    debug(format!("session {session_id:#x} presented a mismatched verifier")),
                    reject(session_id, RejectReason::BadPassword),
                ]
            },
            Err(JoinRejection::UnknownSession) => vec![reject(session_id, RejectReason::Rejected)],
        }
    }

    fn announce_admission(&self, session_id: SessionId, admission: Admission) -> Vec<ServerAction> {
        let ts = self.env.unix_millis();
        let Admission { room, name, previous, created } = admission;
        let mut actions = Vec::new();

        if created {
            actions.push(debug(format!("room created by session {session_id:#x}")));
        }

        if let Some(previous) = previous {
            if !previous.room_closed && previous.room != room {
                actions.extend(relay::presence(&self.registry, &previous.room));
            }
        }

        actions.push(ServerAction::SendToSession {
            session_id,
            frame: ServerFrame::Joined { room: room.to_string(), name: name.to_string(), ts },
        });
        actions.extend(relay::system(
            &self.registry,
            &room,
            SystemEvent::Join,
            ts,
            Some(session_id),
        ));
        actions.extend(relay::presence(&self.registry, &room));

        actions
    }

    /// Notify the remaining members of a room that someone is gone.
    fn announce_departure(&self, departure: &Departure, event: SystemEvent) -> Vec<ServerAction> {
        if departure.room_closed {
            return vec![debug("room closed".to_string())];
        }

        let ts = self.env.unix_millis();
        relay::system(&self.registry, &departure.room, event, ts, None)
            .into_iter()
            .chain(relay::presence(&self.registry, &departure.room))
            .collect()
    }

    fn handle_close(&mut self, session_id: SessionId, reason: &str) -> Vec<ServerAction> {
        self.liveness.forget(session_id);

        if !self.registry.is_registered(session_id) {
            return Vec::new();
        }

        let mut actions = vec![debug(format!("session {session_id:#x} closed: {reason}"))];
        if let Some(departure) = self.registry.unregister(session_id) {
            actions.extend(self.announce_departure(&departure, SystemEvent::Disconnect));
        }

        actions
    }

    fn handle_sweep(&mut self) -> Vec<ServerAction> {
        let sweep = self.liveness.sweep();
        let mut actions = Vec::new();

        for session_id in sweep.evicted {
            actions.push(ServerAction::Log {
                level: LogLevel::Info,
                message: format!("session {session_id:#x} missed a liveness probe"),
            });
            actions.push(ServerAction::CloseConnection {
                session_id,
                reason: "liveness timeout".to_string(),
            });
            if let Some(departure) = self.registry.unregister(session_id) {
                actions.extend(self.announce_departure(&departure, SystemEvent::Disconnect));
            }
        }

        actions.extend(sweep.probed.into_iter().map(|session_id| ServerAction::Ping { session_id }));

        actions
    }
}

/// Cheap shape check before any registry work.
fn is_well_formed(verifier: &Verifier) -> bool {
    let token = verifier.as_str();
    !token.is_empty()
        && token.chars().count() <= MAX_VERIFIER_CHARS
        && !token.chars().any(char::is_control)
}

fn reject(session_id: SessionId, reason: RejectReason) -> ServerAction {
    ServerAction::SendToSession { session_id, frame: ServerFrame::JoinRejected { reason } }
}

fn debug(message: String) -> ServerAction {
    ServerAction::Log { level: LogLevel::Debug, message }
}
