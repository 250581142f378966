//! Client runtime.
//!
//! Wraps the [`Client`] state machine with a real WebSocket and a blocking
//! thread pool for key derivation. Everything the state machine asks for that
//! involves I/O is done here; everything meant for the user is handed back.

use std::collections::VecDeque;

use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use parley_core::SystemEnv;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::{Client, ClientAction, ClientConfig, ClientError, ClientEvent, RoomKeys};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A live client: state machine, transport and key derivation workers.
pub struct Session {
    url: String,
    client: Client<SystemEnv>,
    sink: Option<SplitSink<Socket, Message>>,
    stream: Option<SplitStream<Socket>>,
    derived_tx: mpsc::UnboundedSender<ClientEvent>,
    derived_rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl Session {
    /// Create a session for the relay at `url`. Nothing connects until a room
    /// is selected.
    pub fn new(url: impl Into<String>, config: ClientConfig) -> Self {
        let (derived_tx, derived_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            client: Client::new(SystemEnv::new(), config),
            sink: None,
            stream: None,
            derived_tx,
            derived_rx,
        }
    }

    /// The underlying state machine.
    pub fn client(&self) -> &Client<SystemEnv> {
        &self.client
    }

    /// Feed one event through the state machine, performing any I/O it asks
    /// for. Returns the actions meant for the user, in order.
    ///
    /// # Errors
    ///
    /// Returns the first `ClientError` raised by the state machine; events
    /// queued behind it are dropped.
    pub async fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        let mut queue = VecDeque::from([event]);
        let mut surfaced = Vec::new();

        while let Some(event) = queue.pop_front() {
            for action in self.client.handle(event)? {
                match action {
                    ClientAction::Connect => match connect_async(self.url.as_str()).await {
                        Ok((socket, _)) => {
                            tracing::debug!("Connected to {}", self.url);
                            let (sink, stream) = socket.split();
                            self.sink = Some(sink);
                            self.stream = Some(stream);
                            queue.push_back(ClientEvent::TransportOpened);
                        },
                        Err(e) => {
                            tracing::warn!("Failed to connect to {}: {}", self.url, e);
                            surfaced.push(ClientAction::Log {
                                message: format!("could not connect: {e}"),
                            });
                            queue.push_back(ClientEvent::TransportClosed);
                        },
                    },

                    ClientAction::Send(frame) => {
                        let text = frame.encode()?;
                        let sent = match self.sink.as_mut() {
                            Some(sink) => sink.send(Message::Text(text.into())).await,
                            None => continue,
                        };
                        if let Err(e) = sent {
                            tracing::debug!("Send failed: {}", e);
                            self.drop_transport();
                            queue.push_back(ClientEvent::TransportClosed);
                        }
                    },

                    ClientAction::Close => {
                        if let Some(mut sink) = self.sink.take() {
                            let _ = sink.close().await;
                        }
                        self.drop_transport();
                        queue.push_back(ClientEvent::TransportClosed);
                    },

                    ClientAction::DeriveKeys { room, password, request } => {
                        let derived = self.derived_tx.clone();
                        tokio::task::spawn_blocking(move || {
                            let keys = RoomKeys::derive(&password, &room);
                            let _ = derived.send(ClientEvent::KeysDerived { room, request, keys });
                        });
                    },

                    other => surfaced.push(other),
                }
            }
        }

        Ok(surfaced)
    }

    /// Wait for the next event from the outside world: an inbound frame, the
    /// transport going away, or a finished key derivation.
    ///
    /// Cancel safe.
    pub async fn next_event(&mut self) -> ClientEvent {
        loop {
            let stream = &mut self.stream;
            let inbound = async move {
                match stream.as_mut() {
                    Some(stream) => stream.next().await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                Some(event) = self.derived_rx.recv() => return event,
                message = inbound => match message {
                    Some(Ok(Message::Text(text))) => {
                        return ClientEvent::FrameReceived(text.as_str().to_owned());
                    },
                    Some(Ok(Message::Close(_)) | Err(_)) | None => {
                        self.drop_transport();
                        return ClientEvent::TransportClosed;
                    },
                    // Pings are answered by tungstenite itself.
                    Some(Ok(_)) => {},
                },
            }
        }
    }

    fn drop_transport(&mut self) {
        self.sink = None;
        self.stream = None;
    }
}
