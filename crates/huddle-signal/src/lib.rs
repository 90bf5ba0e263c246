//! Huddle Signal Server
//!
//! Real-time signaling relay for WebRTC call setup. Clients hold a WebSocket
//! open; the server tracks who is connected, relays offer/answer/candidate
//! frames between them, and counts how many peers are in a call.
//!
//! # Protocol
//!
//! 1. Client connects to `/ws` and is registered as a peer
//! 2. `{"action":"call_started"}` / `{"action":"call_ended"}` update the
//!    sender's call state
//! 3. Any other frame is forwarded unchanged to every other peer
//! 4. Disconnecting deregisters the peer and corrects the counters
//!
//! `/count` and `/active` expose the counters as plain decimal strings.

pub mod connection;
pub mod messages;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod tls;
pub mod web;

pub use connection::{ChannelConnection, PeerConnection, SendError};
pub use messages::{CodecError, Envelope, Signal};
pub use registry::{ConnectionId, Presence, Registry};
pub use relay::{Outcome, Relay};
pub use server::{ServerError, SignalServer};
pub use web::WebState;
