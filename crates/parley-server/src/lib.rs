//! Parley relay server.
//!
//! A content-blind room relay: it admits sessions into rooms by comparing
//! password-derived verifiers, forwards encrypted chat envelopes untouched
//! between the members of a room, and keeps everyone's presence view up to
//! date. It never holds a key and never sees plaintext.
//!
//! ## Architecture
//!
//! ```text
//! parley-server
//!   ├─ Server             (accept loop, tokio)
//!   ├─ transport          (one WebSocket task per connection)
//!   ├─ Dispatcher         (single owner of the driver, liveness interval)
//!   └─ ServerDriver       (Sans-IO orchestrator)
//!        ├─ RoomRegistry      (membership + verifiers)
//!        ├─ relay             (fan-out)
//!        └─ LivenessMonitor   (ping/pong sweep)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod dispatcher;
mod driver;
mod error;
mod liveness;
mod registry;
mod relay;
mod transport;

use std::{net::SocketAddr, time::Duration};

pub use driver::{
    DriverConfig, LogLevel, MAX_VERIFIER_CHARS, ServerAction, ServerDriver, ServerEvent,
};
pub use error::ServerError;
pub use liveness::{LivenessMonitor, ProbeState, Sweep};
use parley_core::{Environment, SystemEnv};
pub use registry::{
    Admission, Departure, JoinRejection, MAX_PRESENCE_NAMES, Presence, RoomRegistry, SessionId,
    SessionInfo,
};
use tokio::{net::TcpListener, sync::mpsc};

use crate::dispatcher::Dispatcher;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:3000")
    pub bind_address: String,
    /// Time between liveness sweeps
    pub liveness_interval: Duration,
    /// Driver configuration (limits)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            liveness_interval: Duration::from_secs(30),
            driver: DriverConfig::default(),
        }
    }
}

/// Production Parley server.
///
/// Wraps `ServerDriver` with a WebSocket listener and the system environment.
pub struct Server {
    listener: TcpListener,
    config: ServerRuntimeConfig,
    env: SystemEnv,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// # Errors
    ///
    /// Returns error if the liveness interval is zero or binding fails.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if config.liveness_interval.is_zero() {
            return Err(ServerError::Config("liveness interval must be non-zero".to_string()));
        }

        let listener = TcpListener::bind(&config.bind_address).await?;

        Ok(Self { listener, config, env: SystemEnv::new() })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server, accepting connections and relaying frames.
    ///
    /// This method runs until the task is cancelled.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.listener.local_addr()?);

        let Self { listener, config, env } = self;
        let max_frame_bytes = config.driver.max_frame_bytes;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let driver = ServerDriver::new(env, config.driver);
        tokio::spawn(Dispatcher::new(driver).run(inbound_rx, config.liveness_interval));

        // Sequential ids from a random start never collide within a process.
        let mut next_session_id = env.random_u64();

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let session_id = next_session_id;
                    next_session_id = next_session_id.wrapping_add(1);
                    let inbound = inbound_tx.clone();

                    tracing::debug!("Accepted {} as session {:#x}", peer, session_id);

                    tokio::spawn(async move {
                        if let Err(e) = transport::serve_connection(
                            stream,
                            session_id,
                            inbound,
                            max_frame_bytes,
                        )
                        .await
                        {
                            tracing::debug!("Connection {:#x} ended: {}", session_id, e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }
}
