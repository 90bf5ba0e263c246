//! Per-connection signaling session
//!
//! A session registers its peer, reads frames until the peer goes away, and
//! deregisters exactly once. Outbound frames reach the socket through the
//! peer's queue and a writer future polled alongside the reader.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::connection::ChannelConnection;
use crate::messages::{CodecError, Signal};
use crate::registry::ConnectionId;
use crate::relay::Relay;

/// Knobs for one session
#[derive(Clone, Copy, Debug)]
pub struct SessionSettings {
    /// Outbound queue capacity
    pub outbound_queue: usize,
    /// Upper bound on a single socket write
    pub send_timeout: Duration,
}

/// Why a session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Peer sent a close frame or the stream ended
    Closed,
    /// Read failed at the WebSocket layer
    Transport(String),
    /// A frame could not be decoded
    Decode(CodecError),
    /// Writing to the peer failed
    WriteFailed(String),
    /// Writing to the peer did not finish in time
    WriteTimeout(Duration),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Closed => write!(f, "closed by peer"),
            SessionEnd::Transport(e) => write!(f, "transport error: {}", e),
            SessionEnd::Decode(e) => write!(f, "decode error: {}", e),
            SessionEnd::WriteFailed(e) => write!(f, "write failed: {}", e),
            SessionEnd::WriteTimeout(t) => write!(f, "write timed out after {:?}", t),
        }
    }
}

/// Run a signaling session to completion
pub async fn run(
    relay: &Relay,
    ws: WebSocket,
    peer_addr: SocketAddr,
    settings: SessionSettings,
) -> SessionEnd {
    let (sink, mut stream) = ws.split();
    let (connection, rx) = ChannelConnection::new(settings.outbound_queue);
    let id = relay.connect(Box::new(connection));
    debug!(peer = %id, addr = %peer_addr, "Session started");

    let writer = write_frames(rx, sink, settings.send_timeout);
    tokio::pin!(writer);
    let reader = read_frames(relay, id, &mut stream);
    tokio::pin!(reader);

    let mut writer_done = false;
    let end = tokio::select! {
        end = &mut reader => end,
        end = &mut writer => {
            writer_done = true;
            end.err().unwrap_or(SessionEnd::Closed)
        }
    };

    relay.disconnect(id);

    // Dropping the queue lets the writer flush what is left and send a close
    if !writer_done {
        let _ = tokio::time::timeout(settings.send_timeout, &mut writer).await;
    }

    info!(peer = %id, addr = %peer_addr, reason = %end, "Session ended");
    end
}

async fn read_frames(
    relay: &Relay,
    id: ConnectionId,
    stream: &mut SplitStream<WebSocket>,
) -> SessionEnd {
    while let Some(msg) = stream.next().await {
        let decoded = match msg {
            Ok(Message::Text(text)) => Signal::decode(text.as_bytes()),
            Ok(Message::Binary(data)) => Signal::decode(&data),
            Ok(Message::Close(_)) => return SessionEnd::Closed,
            // Pings are answered by tungstenite on the next flush
            Ok(_) => continue,
            Err(e) => return SessionEnd::Transport(e.to_string()),
        };

        match decoded {
            Ok(signal) => {
                relay.handle(id, signal);
            }
            Err(e) => return SessionEnd::Decode(e),
        }
    }

    SessionEnd::Closed
}

async fn write_frames(
    mut rx: mpsc::Receiver<String>,
    mut sink: SplitSink<WebSocket, Message>,
    send_timeout: Duration,
) -> Result<(), SessionEnd> {
    while let Some(frame) = rx.recv().await {
        match tokio::time::timeout(send_timeout, sink.send(Message::Text(frame))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SessionEnd::WriteFailed(e.to_string())),
            Err(_) => return Err(SessionEnd::WriteTimeout(send_timeout)),
        }
    }

    let _ = tokio::time::timeout(send_timeout, sink.close()).await;
    Ok(())
}
