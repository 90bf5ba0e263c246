//! Peer connections
//!
//! The registry owns one [`PeerConnection`] per live peer. Sending never
//! blocks: the WebSocket-backed implementation hands encoded frames to a
//! bounded queue that a writer future drains onto the socket, so a stalled
//! recipient can never hold the registry lock.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Outbound half of one peer's transport
pub trait PeerConnection: Send + Sync {
    /// Queue an encoded frame for delivery
    fn send(&self, frame: &str) -> Result<(), SendError>;

    /// Release the connection. Queued frames are still flushed.
    fn close(self: Box<Self>) {}
}

/// Per-recipient send failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error("outbound queue full")]
    Full,
}

/// Connection backed by a bounded frame queue
pub struct ChannelConnection {
    tx: mpsc::Sender<String>,
}

impl ChannelConnection {
    /// Create a connection and the receiver its writer drains
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl PeerConnection for ChannelConnection {
    fn send(&self, frame: &str) -> Result<(), SendError> {
        self.tx.try_send(frame.to_owned()).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }
}
