//! Optional TLS termination
//!
//! When a certificate and key are configured, every accepted TCP connection
//! is wrapped in TLS (1.2 minimum) before the HTTP request is read.

use std::path::{Path, PathBuf};

use native_tls::{Identity, Protocol};
use thiserror::Error;
use tracing::info;

use huddle_core::TlsConfig;

/// TLS identity loading errors
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid certificate or key: {0}")]
    Identity(#[from] native_tls::Error),
}

/// How accepted connections are wrapped
pub enum Acceptor {
    /// Plain TCP
    Plain,
    /// TLS over TCP
    Tls(tokio_native_tls::TlsAcceptor),
}

impl Acceptor {
    /// Build an acceptor from configuration
    pub fn from_config(tls: &TlsConfig) -> Result<Self, TlsError> {
        let Some((cert_path, key_path)) = tls.paths() else {
            info!("TLS disabled, serving plain TCP");
            return Ok(Acceptor::Plain);
        };

        let cert = read(cert_path)?;
        let key = read(key_path)?;
        let identity = Identity::from_pkcs8(&cert, &key)?;

        let acceptor = native_tls::TlsAcceptor::builder(identity)
            .min_protocol_version(Some(Protocol::Tlsv12))
            .build()?;

        info!("TLS enabled with certificate {:?}", cert_path);
        Ok(Acceptor::Tls(acceptor.into()))
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Acceptor::Tls(_))
    }
}

fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}
