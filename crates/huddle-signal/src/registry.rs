//! Connection registry and presence counters
//!
//! One lock guards the peer map and the active-call counter together, so
//! `active` always equals the number of peers with `in_call` set. Broadcast
//! iterates under the exclusive lock; sends only enqueue, so the critical
//! section never waits on a remote peer.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::error;

use crate::connection::PeerConnection;

/// Identity of one accepted connection. Never reused within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// A registered peer
struct Peer {
    connection: Box<dyn PeerConnection>,
    in_call: bool,
}

#[derive(Default)]
struct Inner {
    peers: HashMap<ConnectionId, Peer>,
    active: usize,
}

impl Inner {
    fn presence(&self) -> Presence {
        Presence {
            peers: self.peers.len(),
            in_call: self.active,
        }
    }

    fn decrement_active(&mut self) {
        match self.active.checked_sub(1) {
            Some(active) => self.active = active,
            None => error!("Active call count would go negative, clamping to zero"),
        }
    }
}

/// Result of a call-state update
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallTransition {
    /// Peer entered a call; `active` is the counter after the increment
    Started { active: usize },
    /// Peer left a call; `active` is the counter after the decrement
    Ended { active: usize },
    /// Peer was already in the requested state
    Unchanged,
    /// No such peer is registered
    UnknownPeer,
}

/// A peer removed from the registry
pub struct Departed {
    /// The peer's connection, to be closed by the caller
    pub connection: Box<dyn PeerConnection>,
    /// Whether the peer was counted as in a call
    pub was_in_call: bool,
    /// Counters right after the removal
    pub presence: Presence,
}

/// Counters taken under a single lock acquisition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Presence {
    /// Registered peers
    pub peers: usize,
    /// Peers currently in a call
    pub in_call: usize,
}

/// Process-wide registry of live peers
pub struct Registry {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Insert a new peer that is not in a call
    pub fn register(&self, connection: Box<dyn PeerConnection>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let peer = Peer {
            connection,
            in_call: false,
        };
        self.inner.write().peers.insert(id, peer);
        id
    }

    /// Remove a peer, correcting the active counter if it was in a call.
    ///
    /// Returns the removed connection so the caller can close it outside the
    /// lock. Removing an absent peer is a no-op.
    pub fn deregister(&self, id: ConnectionId) -> Option<Departed> {
        let mut inner = self.inner.write();
        let peer = inner.peers.remove(&id)?;
        if peer.in_call {
            inner.decrement_active();
        }
        Some(Departed {
            connection: peer.connection,
            was_in_call: peer.in_call,
            presence: inner.presence(),
        })
    }

    /// Set a peer's call flag, adjusting the active counter only on change
    pub fn set_call_state(&self, id: ConnectionId, in_call: bool) -> CallTransition {
        let mut inner = self.inner.write();

        let Some(peer) = inner.peers.get_mut(&id) else {
            return CallTransition::UnknownPeer;
        };

        if peer.in_call == in_call {
            return CallTransition::Unchanged;
        }
        peer.in_call = in_call;

        if in_call {
            inner.active += 1;
            CallTransition::Started {
                active: inner.active,
            }
        } else {
            inner.decrement_active();
            CallTransition::Ended {
                active: inner.active,
            }
        }
    }

    /// Number of registered peers
    pub fn count_all(&self) -> usize {
        self.inner.read().peers.len()
    }

    /// Number of peers in a call
    pub fn count_active(&self) -> usize {
        self.inner.read().active
    }

    /// Both counters from one consistent view
    pub fn snapshot(&self) -> Presence {
        self.inner.read().presence()
    }

    /// Whether a peer is registered
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.inner.read().peers.contains_key(&id)
    }

    /// A peer's call flag, if registered
    pub fn in_call(&self, id: ConnectionId) -> Option<bool> {
        self.inner.read().peers.get(&id).map(|p| p.in_call)
    }

    /// Run `f` for every peer except `exclude`, holding the exclusive lock
    /// for the whole iteration
    pub fn for_each_except<F>(&self, exclude: ConnectionId, mut f: F)
    where
        F: FnMut(ConnectionId, &dyn PeerConnection),
    {
        let inner = self.inner.write();
        for (id, peer) in inner.peers.iter() {
            if *id != exclude {
                f(*id, peer.connection.as_ref());
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
