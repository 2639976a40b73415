//! Event-stream transport: `GET /sse` plus `POST /messages?sessionId=<id>`.
//!
//! Opening the stream allocates a session with its own [`ProtocolHandler`]
//! and announces the message endpoint in an `endpoint` event. Messages
//! posted for that session are handled in a spawned task and the reply is
//! pushed down the stream as a `message` event. Dropping the stream (client
//! disconnect) removes the session; replies still in flight are discarded.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use super::error_response;
use super::server::AppState;
use crate::mcp::{ErrorKind, ProtocolHandler, ResponseEnvelope, SessionStore};

/// One live event-stream session.
pub struct SseSession {
    id: String,
    sender: mpsc::UnboundedSender<String>,
    protocol: ProtocolHandler,
}

impl SseSession {
    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queues a message event. Returns `false` if the stream is gone.
    pub fn send(&self, data: String) -> bool {
        self.sender.send(data).is_ok()
    }

    fn deliver(&self, data: String) {
        if !self.send(data) {
            tracing::debug!(session_id = %self.id, "SSE stream closed, reply discarded");
        }
    }
}

/// Removes the session when the event stream is dropped.
struct SessionGuard {
    id: String,
    store: Arc<SessionStore<SseSession>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.store.remove(&self.id).is_some() {
            tracing::info!(session_id = %self.id, "SSE session closed");
        }
    }
}

/// `GET /sse`
pub async fn open_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let id = SessionStore::<SseSession>::new_id();
    let (sender, receiver) = mpsc::unbounded_channel();

    let session = Arc::new(SseSession {
        id: id.clone(),
        sender,
        protocol: ProtocolHandler::new(Arc::clone(&state.dispatcher)),
    });
    state.sse_sessions.insert(id.clone(), session);
    tracing::info!(session_id = %id, "SSE session opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages?sessionId={id}"));

    let guard = SessionGuard {
        id,
        store: Arc::clone(&state.sse_sessions),
    };

    let messages = stream::unfold((receiver, guard), |(mut receiver, guard)| async move {
        let data = receiver.recv().await?;
        let event = Event::default().event("message").data(data);
        Some((Ok(event), (receiver, guard)))
    });

    let events = stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(messages);

    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// `POST /messages?sessionId=<id>`
pub async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let Some(id) = query.session_id.filter(|id| !id.is_empty()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            "missing_session_id",
            "Missing sessionId query parameter",
        );
    };

    let Some(session) = state.sse_sessions.get(&id) else {
        tracing::debug!(session_id = %id, "Message for unknown SSE session");
        return error_response(
            StatusCode::NOT_FOUND,
            ErrorKind::Transport,
            "session_not_found",
            format!("Session not found: {id}"),
        );
    };

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ResponseEnvelope::parse_error(e)),
            )
                .into_response();
        }
    };

    let fallback = super::panic_reply(&value);
    let fallback_session = Arc::clone(&session);
    let task = async move {
        if let Some(reply) = session.protocol.handle_value(value).await {
            session.deliver(reply.to_json_line());
        }
    };
    super::spawn_request(task, fallback, move |line| fallback_session.deliver(line));

    (StatusCode::ACCEPTED, "Accepted").into_response()
}
