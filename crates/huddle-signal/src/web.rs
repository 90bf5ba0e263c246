//! HTTP front door: axum routes for the relay
//!
//! - `GET /ws` upgrades to a signaling session
//! - `/count` and `/active` return the presence counters as decimal text
//! - `/checkUser` compares the `login` form value with the shared secret
//! - `GET /health` and `GET /stats` return monitoring JSON
//! - anything else is served from the static asset directory

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Form, Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Json};
use axum::routing::{any, get};
use axum::Router;
use serde::Deserialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use huddle_core::AuthConfig;

use crate::registry::Presence;
use crate::relay::Relay;
use crate::session::{self, SessionSettings};

/// WebSocket endpoint path
pub const WS_PATH: &str = "/ws";

/// Shared state for the handlers
pub struct WebState {
    pub relay: Relay,
    pub auth: AuthConfig,
    pub session: SessionSettings,
    /// Largest inbound WebSocket message and frame
    pub max_frame_bytes: usize,
}

/// Build the router. Unknown paths fall through to files under `static_dir`.
pub fn router(state: Arc<WebState>, static_dir: &Path) -> Router {
    Router::new()
        .route(WS_PATH, get(ws_upgrade))
        .route("/count", any(count))
        .route("/active", any(active))
        .route("/checkUser", any(check_user))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(state)
        .fallback_service(ServeDir::new(static_dir).append_index_html_on_directories(true))
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<WebState>>,
) -> impl IntoResponse {
    let limit = state.max_frame_bytes;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| async move {
            session::run(&state.relay, socket, peer_addr, state.session).await;
        })
}

async fn count(State(state): State<Arc<WebState>>) -> String {
    state.relay.registry().count_all().to_string()
}

async fn active(State(state): State<Arc<WebState>>) -> String {
    state.relay.registry().count_active().to_string()
}

#[derive(Debug, Default, Deserialize)]
struct LoginForm {
    login: Option<String>,
}

/// A urlencoded POST body wins over the query string. Both answers are 200.
async fn check_user(
    State(state): State<Arc<WebState>>,
    query: Option<Query<LoginForm>>,
    form: Option<Form<LoginForm>>,
) -> &'static str {
    let login = form
        .and_then(|Form(form)| form.login)
        .or_else(|| query.and_then(|Query(query)| query.login))
        .unwrap_or_default();

    if state.auth.check(&login) {
        "Ok"
    } else {
        "Failed"
    }
}

async fn health(State(state): State<Arc<WebState>>) -> impl IntoResponse {
    let presence = state.relay.registry().snapshot();
    Json(serde_json::json!({
        "status": "healthy",
        "peers": presence.peers,
        "in_call": presence.in_call,
    }))
}

async fn stats(State(state): State<Arc<WebState>>) -> Json<Presence> {
    Json(state.relay.registry().snapshot())
}
