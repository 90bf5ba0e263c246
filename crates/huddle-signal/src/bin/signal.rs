//! Huddle Signal Server
//!
//! WebSocket signaling relay with presence counters.
//!
//! # Usage
//!
//! ```bash
//! # Plain WebSocket on the default port
//! LOGIN=secret huddle-signal
//!
//! # TLS with a Let's Encrypt certificate
//! LOGIN=secret huddle-signal --tls-cert /app/cert/fullchain.pem --tls-key /app/cert/privkey.pem
//!
//! # Settings from a file, overridden by flags
//! huddle-signal --config /etc/huddle/config.toml --port 9000
//! ```

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use huddle_core::Config;
use huddle_signal::SignalServer;

#[derive(Parser, Debug)]
#[command(name = "huddle-signal")]
#[command(about = "Signaling relay for WebRTC call setup")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "HUDDLE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "HUDDLE_PORT")]
    port: Option<u16>,

    /// Bind address
    #[arg(short, long, env = "HUDDLE_BIND")]
    bind: Option<IpAddr>,

    /// Directory with the client assets
    #[arg(long, env = "HUDDLE_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// PEM certificate chain (enables TLS together with --tls-key)
    #[arg(long, env = "HUDDLE_TLS_CERT")]
    tls_cert: Option<PathBuf>,

    /// PEM private key
    #[arg(long, env = "HUDDLE_TLS_KEY")]
    tls_key: Option<PathBuf>,

    /// Shared login secret checked by /checkUser
    #[arg(long, env = "LOGIN", hide_env_values = true)]
    login: Option<String>,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,
}

impl Args {
    /// Apply flags and environment on top of file configuration
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(dir) = self.static_dir {
            config.server.static_dir = dir;
        }
        if let Some(cert) = self.tls_cert {
            config.tls.cert_path = Some(cert);
        }
        if let Some(key) = self.tls_key {
            config.tls.key_path = Some(key);
        }
        if let Some(login) = self.login {
            config.auth.login = Some(login);
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.json);

    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply(&mut config);

    info!("Starting Huddle Signal Server");
    info!("Serving assets from {:?}", config.server.static_dir);

    let server = SignalServer::new(config).context("invalid configuration")?;
    server.serve().await.context("signal server failed")?;

    Ok(())
}
