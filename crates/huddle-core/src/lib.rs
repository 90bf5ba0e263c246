//! Huddle Core - configuration and error types
//!
//! Shared by the signaling relay and its binary. It has no dependencies on
//! networking code.

pub mod config;
pub mod error;

pub use config::{AuthConfig, Config, RelayConfig, ServerConfig, TlsConfig};
pub use error::ConfigError;

/// Default listen port
pub const DEFAULT_PORT: u16 = 8888;

/// Maximum inbound WebSocket frame size (1 MB)
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;
