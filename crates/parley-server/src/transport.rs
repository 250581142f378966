//! WebSocket transport.
//!
//! One task per connection. The task owns the socket: inbound text frames and
//! pongs are forwarded to the dispatcher as driver events, and a per-session
//! channel carries outbound frames back. The task never interprets a frame.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::tungstenite::{Message, protocol::WebSocketConfig};

use crate::{ServerError, ServerEvent, registry::SessionId};

/// Message from a connection task to the dispatcher.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// Handshake completed; `outbound` reaches the connection.
    Opened { session_id: SessionId, outbound: mpsc::UnboundedSender<Outbound> },
    /// Driver event produced by the connection.
    Event(ServerEvent),
}

/// Message from the dispatcher to a connection task.
#[derive(Debug, Clone)]
pub(crate) enum Outbound {
    /// Encoded server frame.
    Text(String),
    /// Liveness probe.
    Ping,
    /// Close the connection.
    Close,
}

/// Transport ceiling as a multiple of the driver's frame limit. Messages
/// between the two reach the driver, which drops them and keeps the
/// connection; only messages past the ceiling end it.
const TRANSPORT_CEILING_FACTOR: usize = 4;

/// WebSocket limits for a given maximum frame size.
fn websocket_config(max_frame_bytes: usize) -> WebSocketConfig {
    let ceiling = max_frame_bytes.saturating_mul(TRANSPORT_CEILING_FACTOR);
    WebSocketConfig::default().max_message_size(Some(ceiling)).max_frame_size(Some(ceiling))
}

/// Serve one accepted TCP connection until either side closes it.
///
/// Always reports `ConnectionClosed` to the dispatcher once the handshake has
/// completed, whatever ended the connection.
pub(crate) async fn serve_connection(
    stream: TcpStream,
    session_id: SessionId,
    inbound: mpsc::UnboundedSender<Inbound>,
    max_frame_bytes: usize,
) -> Result<(), ServerError> {
    let ws = tokio_tungstenite::accept_async_with_config(
        stream,
        Some(websocket_config(max_frame_bytes)),
    )
    .await?;
    let (mut sink, mut source) = ws.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    inbound
        .send(Inbound::Opened { session_id, outbound: outbound_tx })
        .map_err(|_| ServerError::Shutdown)?;

    let mut writer = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            let result = match outbound {
                Outbound::Text(text) => sink.send(Message::Text(text.into())).await,
                Outbound::Ping => sink.send(Message::Ping(Bytes::new())).await,
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                },
            };

            if let Err(e) = result {
                tracing::debug!("Write error on session {:#x}: {}", session_id, e);
                break;
            }
        }
    });

    let reason = loop {
        tokio::select! {
            _ = &mut writer => break "closed by server".to_string(),
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let event = ServerEvent::FrameReceived { session_id, text: text.as_str().to_owned() };
                    if inbound.send(Inbound::Event(event)).is_err() {
                        break "dispatcher stopped".to_string();
                    }
                },
                Some(Ok(Message::Pong(_))) => {
                    let event = ServerEvent::PongReceived { session_id };
                    if inbound.send(Inbound::Event(event)).is_err() {
                        break "dispatcher stopped".to_string();
                    }
                },
                Some(Ok(Message::Close(_))) | None => break "closed by peer".to_string(),
                // Binary frames carry nothing the relay understands; pings are
                // answered by tungstenite itself.
                Some(Ok(_)) => {},
                Some(Err(e)) => break format!("transport error: {e}"),
            },
        }
    };

    writer.abort();
    let _ = inbound.send(Inbound::Event(ServerEvent::ConnectionClosed { session_id, reason }));

    Ok(())
}
