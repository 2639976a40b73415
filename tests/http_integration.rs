//! Integration tests for the HTTP transports.
//!
//! The router is exercised in-process with `tower::ServiceExt::oneshot`; no
//! socket is bound.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use readwise_mcp::api::{ApiRequest, ReadwiseApi};
use readwise_mcp::builtin_dispatcher;
use readwise_mcp::config::{ServerConfig, TransportKind};
use readwise_mcp::error::ApiError;
use readwise_mcp::transport::{build_router, AppState};

struct EmptyLibrary;

#[async_trait]
impl ReadwiseApi for EmptyLibrary {
    async fn call(&self, _: ApiRequest) -> Result<Value, ApiError> {
        Ok(json!({"count": 0, "results": []}))
    }
}

fn state(transport: TransportKind, auth_token: Option<&str>) -> AppState {
    let api: Arc<dyn ReadwiseApi> = Arc::new(EmptyLibrary);
    let server = ServerConfig {
        transport,
        auth_token: auth_token.map(str::to_owned),
        ..ServerConfig::default()
    };
    AppState::new(Arc::new(builtin_dispatcher(&api).unwrap()), &server)
}

async fn next_frame<S>(stream: &mut S) -> String
where
    S: futures::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin,
{
    let chunk = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timed out waiting for an event")
        .expect("stream ended")
        .unwrap();
    String::from_utf8(chunk.to_vec()).unwrap()
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_sse_session_flow() {
    let state = state(TransportKind::Sse, None);
    let app = build_router(state.clone());

    let response = app
        .clone()
        .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut events = response.into_body().into_data_stream();

    let endpoint = next_frame(&mut events).await;
    assert!(endpoint.starts_with("event: endpoint\n"), "{endpoint}");
    let path = endpoint
        .lines()
        .find_map(|l| l.strip_prefix("data: "))
        .unwrap()
        .to_string();
    assert!(path.starts_with("/messages?sessionId="));
    let session_id = path.trim_start_matches("/messages?sessionId=").to_string();
    assert!(state.sse_sessions.contains(&session_id));

    let init = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});
    let accepted = app.clone().oneshot(post(&path, &init)).await.unwrap();
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);

    let message = next_frame(&mut events).await;
    assert!(message.starts_with("event: message\n"), "{message}");
    let data = message
        .lines()
        .find_map(|l| l.strip_prefix("data: "))
        .unwrap();
    let reply: Value = serde_json::from_str(data).unwrap();
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["serverInfo"]["name"], "readwise-mcp");

    drop(events);
    assert!(!state.sse_sessions.contains(&session_id));

    let late = app.oneshot(post(&path, &init)).await.unwrap();
    assert_eq!(late.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_messages_without_session_id() {
    let app = build_router(state(TransportKind::Sse, None));
    let response = app.oneshot(post("/messages", &json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap())
            .unwrap();
    assert_eq!(body["error"]["type"], "validation");
    assert_eq!(body["error"]["details"]["code"], "missing_session_id");
}

#[tokio::test]
async fn test_http_sessions_are_independent() {
    let state = state(TransportKind::Http, None);
    let app = build_router(state.clone());
    let init = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});

    let first = app.clone().oneshot(post("/mcp", &init)).await.unwrap();
    let second = app.clone().oneshot(post("/mcp", &init)).await.unwrap();
    let first_id = first.headers()["mcp-session-id"].to_str().unwrap().to_owned();
    let second_id = second.headers()["mcp-session-id"].to_str().unwrap().to_owned();
    assert_ne!(first_id, second_id);
    assert_eq!(state.http_sessions.len(), 2);

    // Re-initialising an existing session is rejected; a fresh one is not.
    let again = Request::post("/mcp")
        .header("mcp-session-id", &first_id)
        .body(Body::from(init.to_string()))
        .unwrap();
    let response = app.clone().oneshot(again).await.unwrap();
    assert_eq!(response.headers()["mcp-session-id"], first_id.as_str());
    let body: Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap())
            .unwrap();
    assert_eq!(body["error"]["message"], "Server already initialised");

    let stale = Request::post("/mcp")
        .header("mcp-session-id", "no-such-session")
        .body(Body::from(init.to_string()))
        .unwrap();
    let response = app.oneshot(stale).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_ne!(response.headers()["mcp-session-id"], "no-such-session");
    assert_eq!(state.http_sessions.len(), 3);
}

#[tokio::test]
async fn test_token_gate_leaves_auxiliary_routes_open() {
    let state = state(TransportKind::Http, Some("letmein"));
    let app = build_router(state);

    let ping = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
    let response = app.clone().oneshot(post("/mcp", &ping)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.clone().oneshot(post("/mcp?token=nope", &ping)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.clone().oneshot(post("/mcp?token=letmein", &ping)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/capabilities").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap())
            .unwrap();
    assert_eq!(body["tools"].as_array().unwrap().len(), 15);
    assert_eq!(body["prompts"].as_array().unwrap().len(), 2);
}
