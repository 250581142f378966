//! Dispatcher
//!
//! The single task that owns the [`ServerDriver`]. Connection tasks talk to
//! it over one shared inbound channel; it answers over each session's own
//! outbound channel. Liveness sweeps run on an interval inside the same
//! `select!`, so sweeps and client events are strictly serialized and no
//! lock is ever taken around relay state.

use std::{collections::HashMap, time::Duration};

use parley_core::Environment;
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};

use crate::{
    LogLevel, ServerAction, ServerDriver, ServerEvent,
    registry::SessionId,
    transport::{Inbound, Outbound},
};

pub(crate) struct Dispatcher<E: Environment> {
    driver: ServerDriver<E>,
    peers: HashMap<SessionId, mpsc::UnboundedSender<Outbound>>,
}

impl<E: Environment> Dispatcher<E> {
    pub(crate) fn new(driver: ServerDriver<E>) -> Self {
        Self { driver, peers: HashMap::new() }
    }

    /// Run until every connection task and the listener have dropped their
    /// inbound senders.
    pub(crate) async fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<Inbound>,
        liveness_interval: Duration,
    ) {
        let mut ticker = time::interval_at(time::Instant::now() + liveness_interval, liveness_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                next = inbound.recv() => match next {
                    Some(message) => self.handle_inbound(message),
                    None => break,
                },
                _ = ticker.tick() => self.dispatch(None, ServerEvent::LivenessTick),
            }
        }

        tracing::info!("Dispatcher stopped");
    }

    fn handle_inbound(&mut self, message: Inbound) {
        match message {
            Inbound::Opened { session_id, outbound } => {
                self.peers.insert(session_id, outbound);
                self.dispatch(Some(session_id), ServerEvent::ConnectionAccepted { session_id });
            },
            Inbound::Event(event) => {
                let closed = match &event {
                    ServerEvent::ConnectionClosed { session_id, .. } => Some(*session_id),
                    _ => None,
                };
                let origin = match &event {
                    ServerEvent::ConnectionAccepted { session_id }
                    | ServerEvent::FrameReceived { session_id, .. }
                    | ServerEvent::PongReceived { session_id }
                    | ServerEvent::ConnectionClosed { session_id, .. } => Some(*session_id),
                    ServerEvent::LivenessTick => None,
                };

                self.dispatch(origin, event);

                if let Some(session_id) = closed {
                    self.peers.remove(&session_id);
                }
            },
        }
    }

    fn dispatch(&mut self, origin: Option<SessionId>, event: ServerEvent) {
        match self.driver.process_event(event) {
            Ok(actions) => self.execute(actions),
            Err(e) => {
                tracing::warn!("Event processing error: {}", e);
                if e.is_fatal() {
                    if let Some(session_id) = origin {
                        self.close(session_id);
                    }
                }
            },
        }
    }

    fn execute(&mut self, actions: Vec<ServerAction>) {
        for action in actions {
            match action {
                ServerAction::SendToSession { session_id, frame } => match frame.encode() {
                    Ok(text) => self.send(session_id, Outbound::Text(text)),
                    Err(e) => tracing::error!("Failed to encode {} frame: {}", frame.type_name(), e),
                },

                ServerAction::Broadcast { recipients, frame } => match frame.encode() {
                    Ok(text) => {
                        for session_id in recipients {
                            self.send(session_id, Outbound::Text(text.clone()));
                        }
                    },
                    Err(e) => tracing::error!("Failed to encode {} frame: {}", frame.type_name(), e),
                },

                ServerAction::Ping { session_id } => self.send(session_id, Outbound::Ping),

                ServerAction::CloseConnection { session_id, reason } => {
                    tracing::info!("Closing connection {:#x}: {}", session_id, reason);
                    self.close(session_id);
                },

                ServerAction::Log { level, message } => match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => tracing::info!("{}", message),
                    LogLevel::Warn => tracing::warn!("{}", message),
                    LogLevel::Error => tracing::error!("{}", message),
                },
            }
        }
    }

    fn send(&self, session_id: SessionId, outbound: Outbound) {
        if let Some(peer) = self.peers.get(&session_id) {
            // A closed channel means the connection task is already gone and
            // its ConnectionClosed event is queued behind this one.
            let _ = peer.send(outbound);
        }
    }

    fn close(&mut self, session_id: SessionId) {
        if let Some(peer) = self.peers.remove(&session_id) {
            let _ = peer.send(Outbound::Close);
        }
    }
}
