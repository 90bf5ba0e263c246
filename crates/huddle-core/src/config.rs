//! Configuration for the Huddle signaling relay
//!
//! Supports TOML configuration files with sensible defaults. When no file is
//! given explicitly, configuration is loaded from:
//! - macOS: ~/Library/Application Support/huddle/config.toml
//! - Linux: ~/.config/huddle/config.toml
//! - Windows: %APPDATA%/huddle/config.toml
//!
//! Command-line flags and environment variables are applied on top by the
//! binary, after which [`Config::validate`] must pass before serving.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::{DEFAULT_PORT, MAX_FRAME_BYTES};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener settings
    pub server: ServerConfig,
    /// Relay engine settings
    pub relay: RelayConfig,
    /// TLS certificate settings
    pub tls: TlsConfig,
    /// Shared login secret
    pub auth: AuthConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind: IpAddr,
    /// Listen port
    pub port: u16,
    /// Directory holding the client assets
    pub static_dir: PathBuf,
    /// Largest inbound WebSocket frame accepted
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            static_dir: PathBuf::from("/app/frontend"),
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

/// Relay engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Frames buffered per peer before broadcasts to it start dropping
    pub outbound_queue: usize,
    /// Upper bound on a single WebSocket write (milliseconds)
    pub send_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            outbound_queue: 64,
            send_timeout_ms: 10_000,
        }
    }
}

impl RelayConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// TLS configuration. Plain TCP is served when both paths are unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM certificate chain
    pub cert_path: Option<PathBuf>,
    /// PEM (PKCS#8) private key
    pub key_path: Option<PathBuf>,
}

impl TlsConfig {
    /// Certificate and key paths, if TLS is fully configured
    pub fn paths(&self) -> Option<(&Path, &Path)> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }
}

/// Shared-secret configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Value `/checkUser` compares the submitted `login` field against
    pub login: Option<String>,
}

impl AuthConfig {
    /// Compare a client-supplied login against the configured secret
    pub fn check(&self, submitted: &str) -> bool {
        self.login.as_deref() == Some(submitted)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("login", &self.login.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    /// Load configuration from `path`, or from the default path when `None`.
    ///
    /// An explicitly named file must exist; a missing default file yields
    /// the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::read(path),
            None => match Self::default_path() {
                Some(path) => Self::load_from(&path),
                None => {
                    debug!("No config directory found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Load configuration from a specific path, falling back to defaults if
    /// the file does not exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        Self::read(path)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "huddle", "huddle")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Socket address the listener binds to
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind, self.server.port)
    }

    /// Check that the configuration is complete enough to serve
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.auth.login.as_deref() {
            Some(login) if !login.is_empty() => {}
            _ => return Err(ConfigError::MissingLogin),
        }

        if self.tls.cert_path.is_some() != self.tls.key_path.is_some() {
            return Err(ConfigError::IncompleteTls);
        }

        if self.relay.outbound_queue == 0 {
            return Err(ConfigError::Invalid("relay.outbound_queue must be > 0".into()));
        }

        if self.relay.send_timeout_ms == 0 {
            return Err(ConfigError::Invalid("relay.send_timeout_ms must be > 0".into()));
        }

        if self.server.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid("server.max_frame_bytes must be > 0".into()));
        }

        Ok(())
    }
}
