//! Session-correlated HTTP transport on `ALL /mcp`.
//!
//! A request whose `mcp-session-id` header names a stored session is handled
//! by that session's [`ProtocolHandler`]. Without a live session, an
//! `initialize` request starts a new one whose identifier is returned in the
//! `mcp-session-id` response header; any other message is answered by a
//! throwaway handler and nothing is stored. A body that is not JSON never
//! touches the session store. Sessions left unused are expired by the
//! server's idle sweep.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{ALLOW, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use super::error_response;
use super::server::AppState;
use crate::mcp::{ErrorKind, JsonRpcError, ProtocolHandler, Reply, SessionStore};

/// Request and response header carrying the session identifier.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// One live HTTP session.
pub struct HttpSession {
    id: String,
    protocol: ProtocolHandler,
}

impl HttpSession {
    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// `ALL /mcp`
pub async fn handle(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let requested = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());

    match method {
        Method::POST => post(&state, requested, &body).await,
        Method::DELETE => delete(&state, requested),
        _ => {
            let mut response = StatusCode::METHOD_NOT_ALLOWED.into_response();
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("POST, DELETE"));
            response
        }
    }
}

async fn post(state: &AppState, requested: Option<&str>, body: &[u8]) -> Response {
    let value = match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Unparseable JSON-RPC body");
            return json_response(
                StatusCode::BAD_REQUEST,
                &Reply::Error(JsonRpcError::parse_error()),
            );
        }
    };

    let session = match requested.and_then(|id| state.http_sessions.get(id)) {
        Some(session) => Some(session),
        None if is_initialize(&value) => Some(open_session(state)),
        None => None,
    };

    let reply = match &session {
        Some(session) => session.protocol.handle_value(value).await,
        None => {
            tracing::debug!(requested = ?requested, "Message outside a live session");
            ProtocolHandler::new(Arc::clone(&state.dispatcher))
                .handle_value(value)
                .await
        }
    };

    let mut response = match reply {
        Some(Reply::Error(error)) if error.id.is_none() => {
            json_response(StatusCode::BAD_REQUEST, &Reply::Error(error))
        }
        Some(reply) => json_response(StatusCode::OK, &reply),
        None => StatusCode::ACCEPTED.into_response(),
    };

    if let Some(value) = session.and_then(|s| HeaderValue::from_str(&s.id).ok()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

fn is_initialize(message: &Value) -> bool {
    message.get("method").and_then(Value::as_str) == Some("initialize")
}

fn delete(state: &AppState, requested: Option<&str>) -> Response {
    let Some(id) = requested else {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            "missing_session_id",
            "Missing mcp-session-id header",
        );
    };

    if state.http_sessions.remove(id).is_some() {
        tracing::info!(session_id = %id, "HTTP session closed");
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            ErrorKind::Transport,
            "session_not_found",
            format!("Session not found: {id}"),
        )
    }
}

fn open_session(state: &AppState) -> Arc<HttpSession> {
    let id = SessionStore::<HttpSession>::new_id();
    let session = Arc::new(HttpSession {
        id: id.clone(),
        protocol: ProtocolHandler::new(Arc::clone(&state.dispatcher)),
    });
    state.http_sessions.insert(id.clone(), Arc::clone(&session));
    tracing::info!(session_id = %id, "HTTP session opened");
    session
}

fn json_response(status: StatusCode, reply: &Reply) -> Response {
    (
        status,
        [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        reply.to_json_line(),
    )
        .into_response()
}
