//! Error types shared across Huddle crates

use thiserror::Error;

/// Configuration errors. All of them are fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("login secret is not configured (set LOGIN or [auth] login)")]
    MissingLogin,

    #[error("tls.cert_path and tls.key_path must be set together")]
    IncompleteTls,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
