//! The axum application hosting the HTTP transports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{middleware, Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::http::HttpSession;
use super::sse::SseSession;
use super::{auth, http, sse};
use crate::config::{ServerConfig, TransportKind};
use crate::error::ServerError;
use crate::mcp::protocol::SERVER_NAME;
use crate::mcp::{Dispatcher, SessionStore, MCP_PROTOCOL_VERSION};

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    /// The dispatcher every session is bound to.
    pub dispatcher: Arc<Dispatcher>,
    /// Live `GET /sse` sessions.
    pub sse_sessions: Arc<SessionStore<SseSession>>,
    /// Live `/mcp` sessions.
    pub http_sessions: Arc<SessionStore<HttpSession>>,
    /// Set once the listener is bound.
    pub ready: Arc<AtomicBool>,
    pub started: Instant,
    pub transport: TransportKind,
    pub port: u16,
    /// Shared secret for the streaming endpoints, if any.
    pub auth_token: Option<Arc<str>>,
    /// How long an `/mcp` session may go unused.
    pub session_idle: Duration,
}

impl AppState {
    /// Creates the state for `server`, not yet ready.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, server: &ServerConfig) -> Self {
        Self {
            dispatcher,
            sse_sessions: Arc::new(SessionStore::new()),
            http_sessions: Arc::new(SessionStore::new()),
            ready: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            transport: server.transport,
            port: server.port,
            auth_token: server.auth_token.as_deref().map(Arc::from),
            session_idle: Duration::from_secs(server.session_idle_secs),
        }
    }

    /// Returns `true` once the listener is bound.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Drops `/mcp` sessions unused for longer than `session_idle`.
    ///
    /// Event-stream sessions are left alone; they end with their stream.
    pub fn expire_idle_sessions(&self) -> usize {
        let expired = self.http_sessions.expire_idle(self.session_idle);
        for (id, _) in &expired {
            tracing::info!(session_id = %id, "HTTP session expired");
        }
        expired.len()
    }

    /// Closes every live session on both transports.
    pub fn close_sessions(&self) {
        let sse = self.sse_sessions.drain().len();
        let http = self.http_sessions.drain().len();
        if sse + http > 0 {
            tracing::info!(sse, http, "Closed live sessions");
        }
    }
}

/// Builds the router for the configured transport.
///
/// Auxiliary endpoints are always mounted. The streaming endpoints for the
/// selected transport sit behind the token gate.
pub fn build_router(state: AppState) -> Router {
    let streaming: Router<AppState> = match state.transport {
        TransportKind::Sse => Router::new()
            .route("/sse", get(sse::open_stream))
            .route("/messages", post(sse::post_message)),
        TransportKind::Http => Router::new().route("/mcp", any(http::handle)),
        TransportKind::Stdio => Router::new(),
    };

    let streaming = if state.transport == TransportKind::Stdio {
        streaming
    } else {
        streaming.route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ))
    };

    Router::new()
        .route("/", get(identity))
        .route("/health", get(health))
        .route("/capabilities", get(capabilities))
        .route("/.well-known/oauth-authorization-server", get(oauth_metadata))
        .merge(streaming)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `host:port` and serves until a shutdown signal arrives.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the listener cannot be bound, or
/// [`ServerError::Io`] if serving fails.
pub async fn serve(state: AppState, host: &str) -> Result<(), ServerError> {
    let addr = format!("{host}:{}", state.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    state.ready.store(true, Ordering::SeqCst);
    tracing::info!(
        addr = %addr,
        transport = %state.transport,
        tools = state.dispatcher.tools().len(),
        prompts = state.dispatcher.prompts().len(),
        "Listening"
    );

    let sweeper = tokio::spawn(sweep_idle_sessions(state.clone()));

    let app = build_router(state.clone());
    let shutdown_state = state.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            super::shutdown_signal().await;
            shutdown_state.ready.store(false, Ordering::SeqCst);
            shutdown_state.close_sessions();
        })
        .await;
    sweeper.abort();
    served?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Periodically expires idle `/mcp` sessions.
async fn sweep_idle_sessions(state: AppState) {
    let period = state
        .session_idle
        .min(Duration::from_secs(60))
        .max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        state.expire_idle_sessions();
    }
}

/// `GET /health`
async fn health(State(state): State<AppState>) -> Response {
    let ready = state.is_ready();
    let (status, label) = if ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    };

    let body = json!({
        "status": label,
        "ready": ready,
        "uptime": state.started.elapsed().as_secs(),
        "tools": state.dispatcher.tools().len(),
        "prompts": state.dispatcher.prompts().len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "port": state.port,
    });
    (status, Json(body)).into_response()
}

/// `GET /capabilities`
async fn capabilities(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "tools": state.dispatcher.tools().definitions(),
        "prompts": state.dispatcher.prompts().definitions(),
    }))
}

/// `GET /`
async fn identity(State(state): State<AppState>) -> Json<serde_json::Value> {
    let endpoints = match state.transport {
        TransportKind::Sse => json!({"sse": "/sse", "messages": "/messages"}),
        TransportKind::Http => json!({"mcp": "/mcp"}),
        TransportKind::Stdio => json!({}),
    };
    Json(json!({
        "name": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "transport": state.transport.to_string(),
        "endpoints": endpoints,
    }))
}

/// `GET /.well-known/oauth-authorization-server`
async fn oauth_metadata() -> Response {
    super::error_response(
        StatusCode::NOT_FOUND,
        crate::mcp::ErrorKind::Transport,
        "oauth_not_supported",
        "OAuth is not supported; use a bearer token",
    )
}
