//! Relay engine
//!
//! Interprets the action tag of each decoded frame: call markers update the
//! sender's call state, everything else is broadcast to all other peers.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::connection::PeerConnection;
use crate::messages::{Envelope, Signal};
use crate::registry::{CallTransition, ConnectionId, Registry};

/// What handling one frame did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Sender entered a call
    CallStarted,
    /// Sender left a call
    CallEnded,
    /// Call marker matched the current state, or the sender is gone
    Unchanged,
    /// Frame was offered to every other peer
    Broadcast { delivered: usize, failed: usize },
    /// Frame could not be re-encoded and was dropped
    Dropped,
}

/// Relay engine over a shared registry. Cheap to clone.
#[derive(Clone)]
pub struct Relay {
    registry: Arc<Registry>,
}

impl Relay {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// The registry this relay operates on
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register a freshly accepted connection
    pub fn connect(&self, connection: Box<dyn PeerConnection>) -> ConnectionId {
        let id = self.registry.register(connection);
        let presence = self.registry.snapshot();
        info!(peer = %id, peers = presence.peers, "Peer connected");
        id
    }

    /// Handle one decoded frame from `from`
    pub fn handle(&self, from: ConnectionId, signal: Signal) -> Outcome {
        match signal {
            Signal::CallStarted => self.set_call_state(from, true),
            Signal::CallEnded => self.set_call_state(from, false),
            Signal::Relay(envelope) => self.broadcast(from, &envelope),
        }
    }

    fn set_call_state(&self, id: ConnectionId, in_call: bool) -> Outcome {
        match self.registry.set_call_state(id, in_call) {
            CallTransition::Started { active } => {
                info!(peer = %id, active, "Call started");
                Outcome::CallStarted
            }
            CallTransition::Ended { active } => {
                info!(peer = %id, active, "Call ended");
                Outcome::CallEnded
            }
            CallTransition::Unchanged => {
                debug!(peer = %id, in_call, "Call state unchanged");
                Outcome::Unchanged
            }
            CallTransition::UnknownPeer => {
                debug!(peer = %id, "Call state update for unregistered peer");
                Outcome::Unchanged
            }
        }
    }

    /// Send `envelope` to every registered peer except `from`.
    ///
    /// A failed recipient is logged and skipped. It is not deregistered here;
    /// its own session notices the failure and disconnects itself.
    pub fn broadcast(&self, from: ConnectionId, envelope: &Envelope) -> Outcome {
        let frame = match envelope.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(peer = %from, error = %e, "Failed to encode relayed message");
                return Outcome::Dropped;
            }
        };

        let mut delivered = 0;
        let mut failed = 0;
        self.registry.for_each_except(from, |to, connection| {
            match connection.send(&frame) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!(from = %from, to = %to, error = %e, "Failed to relay message");
                }
            }
        });

        debug!(peer = %from, delivered, failed, "Relayed message");
        Outcome::Broadcast { delivered, failed }
    }

    /// Deregister a peer and release its connection. Safe to call twice.
    pub fn disconnect(&self, id: ConnectionId) {
        match self.registry.deregister(id) {
            Some(departed) => {
                let presence = departed.presence;
                departed.connection.close();
                if departed.was_in_call {
                    info!(peer = %id, active = presence.in_call, "Peer in call disconnected");
                }
                info!(peer = %id, peers = presence.peers, "Peer disconnected");
            }
            None => debug!(peer = %id, "Peer already deregistered"),
        }
    }
}
