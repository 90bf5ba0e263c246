//! Signal server: listener setup and TLS termination
//!
//! Plain listeners are handed to `axum::serve`. With TLS configured, each
//! accepted connection is wrapped in a native-tls stream and served by
//! hyper's HTTP/1 connection with upgrades enabled, so `/ws` works over
//! `wss://` too.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_native_tls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use huddle_core::{Config, ConfigError};

use crate::registry::Registry;
use crate::relay::Relay;
use crate::session::SessionSettings;
use crate::tls::{Acceptor, TlsError};
use crate::web::{self, WebState, WS_PATH};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

struct Shared {
    config: Config,
    state: Arc<WebState>,
    acceptor: Acceptor,
}

/// Signal server state. Cheap to clone.
#[derive(Clone)]
pub struct SignalServer {
    shared: Arc<Shared>,
}

impl SignalServer {
    /// Build a server from validated configuration
    pub fn new(config: Config) -> Result<Self, ServerError> {
        config.validate()?;
        let acceptor = Acceptor::from_config(&config.tls)?;

        let state = Arc::new(WebState {
            relay: Relay::new(Arc::new(Registry::new())),
            auth: config.auth.clone(),
            session: SessionSettings {
                outbound_queue: config.relay.outbound_queue,
                send_timeout: config.relay.send_timeout(),
            },
            max_frame_bytes: config.server.max_frame_bytes,
        });

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                state,
                acceptor,
            }),
        })
    }

    /// The live peer registry (for monitoring)
    pub fn registry(&self) -> &Arc<Registry> {
        self.shared.state.relay.registry()
    }

    /// Bind the configured address and serve forever
    pub async fn serve(&self) -> Result<(), ServerError> {
        let addr = self.shared.config.listen_addr();
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on(&self, listener: TcpListener) -> Result<(), ServerError> {
        let scheme = if self.shared.acceptor.is_tls() { "wss" } else { "ws" };
        info!(
            "Signal server listening on {}://{}{}",
            scheme,
            listener.local_addr()?,
            WS_PATH
        );

        let app = web::router(
            self.shared.state.clone(),
            &self.shared.config.server.static_dir,
        );

        match &self.shared.acceptor {
            Acceptor::Plain => {
                axum::serve(
                    listener,
                    app.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .await?;
                Ok(())
            }
            Acceptor::Tls(tls) => serve_tls(listener, tls.clone(), app).await,
        }
    }
}

/// Accept loop for `wss://`: one task per connection, TLS first, then HTTP
async fn serve_tls(listener: TcpListener, tls: TlsAcceptor, app: Router) -> Result<(), ServerError> {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let tls = tls.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let stream = match tls.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!("TLS handshake with {} failed: {}", peer_addr, e);
                    return;
                }
            };

            let service = service_fn(move |mut request: Request<Incoming>| {
                request.extensions_mut().insert(ConnectInfo(peer_addr));
                app.clone().oneshot(request)
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades()
                .await
            {
                debug!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}
