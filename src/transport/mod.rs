//! Transport adapters.
//!
//! Adapters only transcode: they turn wire messages into envelopes or
//! JSON-RPC messages and write back whatever the dispatcher produced, on the
//! same stream or session that carried the request. Failures never escape an
//! adapter: they become an error response while the channel is writable and
//! a log line otherwise.
//!
//! - [`stdio`]: line-delimited JSON on stdin/stdout
//! - [`sse`]: `GET /sse` event stream + `POST /messages?sessionId=`
//! - [`http`]: session-correlated `ALL /mcp` keyed by `mcp-session-id`
//! - [`server`]: the axum application hosting the HTTP transports and the
//!   auxiliary endpoints
//! - [`auth`]: optional shared-token gate for the streaming endpoints

pub mod auth;
pub mod http;
pub mod server;
pub mod sse;
pub mod stdio;

pub use server::{build_router, serve, AppState};
pub use stdio::StdioTransport;

use std::future::Future;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use crate::mcp::protocol::{is_json_rpc, RequestId};
use crate::mcp::{ErrorKind, JsonRpcError, Reply, ResponseEnvelope, UNKNOWN_REQUEST_ID};

/// Builds an HTTP response carrying an error envelope.
pub(crate) fn error_response(
    status: StatusCode,
    kind: ErrorKind,
    code: &str,
    message: impl Into<String>,
) -> Response {
    let envelope = ResponseEnvelope::error(UNKNOWN_REQUEST_ID, kind, code, message);
    (status, Json(envelope)).into_response()
}

/// Runs one request on its own task.
///
/// If the task panics, `on_panic` receives `fallback` (built with
/// [`panic_reply`] before the message was moved into the task).
pub(crate) fn spawn_request<F, P>(task: F, fallback: Option<String>, on_panic: P)
where
    F: Future<Output = ()> + Send + 'static,
    P: FnOnce(String) + Send + 'static,
{
    let handle = tokio::spawn(task);
    tokio::spawn(async move {
        match handle.await {
            Err(e) if e.is_panic() => {
                tracing::error!("Request handler panicked");
                if let Some(line) = fallback {
                    on_panic(line);
                }
            }
            Err(e) => tracing::debug!(error = %e, "Request task cancelled"),
            Ok(()) => {}
        }
    });
}

/// Error reply for a request whose handler panicked.
///
/// JSON-RPC requests get an internal error carrying their `id`; notifications
/// get nothing. Anything else gets an `execution/internal_error` envelope
/// echoing the best-known `request_id`.
pub(crate) fn panic_reply(message: &Value) -> Option<String> {
    if is_json_rpc(message) {
        let id = message
            .get("id")
            .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok())?;
        let error = JsonRpcError::internal_error(id, "Request handler failed unexpectedly");
        return Some(Reply::Error(error).to_json_line());
    }

    let request_id = message
        .get("request_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .unwrap_or(UNKNOWN_REQUEST_ID);
    let envelope = ResponseEnvelope::error(
        request_id,
        ErrorKind::Execution,
        "internal_error",
        "Request handler failed unexpectedly",
    );
    Some(envelope.to_json_line())
}

/// Resolves when the process receives SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(i), Ok(t)) => (i, t),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "Failed to install signal handlers");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Resolves when the process receives Ctrl+C.
#[cfg(windows)]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
