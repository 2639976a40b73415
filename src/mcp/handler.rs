//! Per-session MCP protocol handler.
//!
//! A [`ProtocolHandler`] is the protocol-layer object a streaming transport
//! binds to one session. It tracks the MCP lifecycle for that session and
//! turns `tools/call` and `prompts/get` into request envelopes for the
//! shared [`Dispatcher`].
//!
//! Lifecycle:
//!
//! 1. **`AwaitingInit`**: only `initialize` and `ping` are accepted
//! 2. **`Initialising`**: `initialize` answered; operations allowed
//! 3. **`Running`**: `notifications/initialized` received

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::dispatcher::Dispatcher;
use super::envelope::{ContentItem, ErrorKind, RequestEnvelope, ResponseEnvelope};
use super::protocol::{
    parse_message, parse_value, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData,
    JsonRpcRequest, JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use super::registry::Registry;

/// Session state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize answered, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
}

/// Server information for the initialize response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters shared by `tools/call` and `prompts/get`.
#[derive(Debug, Clone, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// What a handled message produced.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A success response.
    Response(JsonRpcResponse),
    /// An error response.
    Error(JsonRpcError),
}

impl Reply {
    /// Serialises the reply as a single-line JSON string.
    #[must_use]
    pub fn to_json_line(&self) -> String {
        let result = match self {
            Self::Response(r) => serde_json::to_string(r),
            Self::Error(e) => serde_json::to_string(e),
        };
        result.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialise JSON-RPC reply");
            let id = match self {
                Self::Response(r) => Some(r.id.clone()),
                Self::Error(e) => e.id.clone(),
            };
            let fallback = JsonRpcError::new(
                id,
                JsonRpcErrorData::with_message(ErrorCode::InternalError, "Failed to serialise reply"),
            );
            serde_json::to_string(&fallback).unwrap_or_default()
        })
    }
}

/// Protocol state machine for one session.
pub struct ProtocolHandler {
    dispatcher: Arc<Dispatcher>,
    state: Mutex<SessionState>,
}

impl ProtocolHandler {
    /// Creates a handler bound to `dispatcher`.
    #[must_use]
    pub const fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            state: Mutex::new(SessionState::AwaitingInit),
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Handles a raw text message. Returns `None` for notifications.
    pub async fn handle_text(&self, text: &str) -> Option<Reply> {
        match parse_message(text) {
            Ok(msg) => self.handle_message(msg).await,
            Err(error) => Some(Reply::Error(error)),
        }
    }

    /// Handles an already-decoded JSON value. Returns `None` for notifications.
    pub async fn handle_value(&self, value: Value) -> Option<Reply> {
        match parse_value(value) {
            Ok(msg) => self.handle_message(msg).await,
            Err(error) => Some(Reply::Error(error)),
        }
    }

    /// Handles a parsed incoming message.
    pub async fn handle_message(&self, msg: IncomingMessage) -> Option<Reply> {
        match msg {
            IncomingMessage::Request(req) => Some(match self.handle_request(&req).await {
                Ok(result) => Reply::Response(JsonRpcResponse::success(req.id, result)),
                Err(error) => Reply::Error(error),
            }),
            IncomingMessage::Notification(notif) => {
                if notif.method == "notifications/initialized"
                    && self.state() == SessionState::Initialising
                {
                    self.set_state(SessionState::Running);
                    tracing::debug!("Session running");
                } else {
                    tracing::trace!(method = %notif.method, "Ignoring notification");
                }
                None
            }
        }
    }

    async fn handle_request(&self, req: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "ping" => Ok(json!({})),
            "tools/list" => {
                self.require_initialised(&req.id)?;
                Ok(json!({ "tools": tool_listing(self.dispatcher.tools()) }))
            }
            "prompts/list" => {
                self.require_initialised(&req.id)?;
                Ok(json!({ "prompts": prompt_listing(self.dispatcher.prompts()) }))
            }
            "tools/call" => {
                self.require_initialised(&req.id)?;
                self.handle_tools_call(req).await
            }
            "prompts/get" => {
                self.require_initialised(&req.id)?;
                self.handle_prompts_get(req).await
            }
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        }
    }

    fn handle_initialize(&self, req: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        if self.state() != SessionState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server already initialised",
                ),
            ));
        }

        if let Some(client) = req
            .params
            .as_ref()
            .and_then(|p| p.get("clientInfo"))
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
        {
            tracing::info!(client = client, "Client initialising");
        }

        self.set_state(SessionState::Initialising);

        Ok(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "prompts": {},
            },
            "serverInfo": ServerInfo::default(),
        }))
    }

    fn require_initialised(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state() == SessionState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(id.clone()),
                JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, "Server not initialised"),
            ));
        }
        Ok(())
    }

    async fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let (name, arguments) = call_params(req)?;
        let envelope = RequestEnvelope::tool_call(name, arguments, req.id.to_string());

        match self.dispatcher.dispatch(envelope).await {
            ResponseEnvelope::Success(success) => {
                let mut result = success.extra;
                result.insert("content".to_string(), content_value(&req.id, &success.content)?);
                Ok(Value::Object(result))
            }
            ResponseEnvelope::Error(failure) => {
                if failure.error.kind == ErrorKind::Transport {
                    return Err(transport_failure(&req.id, &failure.error));
                }
                let mut text = format!(
                    "{}: {}",
                    failure.error.details.code, failure.error.details.message
                );
                for line in failure.error.details.errors.iter().flatten() {
                    text.push_str("\n- ");
                    text.push_str(line);
                }
                Ok(json!({
                    "content": [ContentItem::text(text)],
                    "isError": true,
                }))
            }
        }
    }

    async fn handle_prompts_get(&self, req: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let (name, arguments) = call_params(req)?;
        let description = self
            .dispatcher
            .prompts()
            .get(&name)
            .map(|op| op.description().to_string());
        let envelope = RequestEnvelope::prompt_call(name, arguments, req.id.to_string());

        match self.dispatcher.dispatch(envelope).await {
            ResponseEnvelope::Success(success) => {
                let messages: Vec<Value> = success
                    .content
                    .iter()
                    .map(|item| json!({ "role": "user", "content": item }))
                    .collect();
                Ok(json!({
                    "description": description,
                    "messages": messages,
                }))
            }
            ResponseEnvelope::Error(failure) => Err(transport_failure(&req.id, &failure.error)),
        }
    }
}

fn call_params(req: &JsonRpcRequest) -> Result<(String, Map<String, Value>), JsonRpcError> {
    let params: CallParams = req
        .params
        .as_ref()
        .map(|p| serde_json::from_value(p.clone()))
        .transpose()
        .map_err(|e| JsonRpcError::invalid_params(req.id.clone(), format!("Invalid call params: {e}")))?
        .ok_or_else(|| JsonRpcError::invalid_params(req.id.clone(), "Missing call params"))?;

    let arguments = match params.arguments {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(JsonRpcError::invalid_params(
                req.id.clone(),
                "arguments must be an object",
            ))
        }
    };

    Ok((params.name, arguments))
}

fn content_value(id: &RequestId, content: &[ContentItem]) -> Result<Value, JsonRpcError> {
    serde_json::to_value(content).map_err(|e| {
        tracing::error!(error = %e, "Failed to serialise tool content");
        JsonRpcError::internal_error(id.clone(), "Internal error: failed to serialise result")
    })
}

/// Maps a dispatcher error onto a JSON-RPC error, keeping the envelope error as `data`.
fn transport_failure(id: &RequestId, error: &super::envelope::ErrorBody) -> JsonRpcError {
    let code = match error.kind {
        ErrorKind::Transport | ErrorKind::Validation => ErrorCode::InvalidParams,
        ErrorKind::Execution => ErrorCode::InternalError,
    };
    let mut data = JsonRpcErrorData::with_message(code, error.details.message.clone());
    if let Ok(body) = serde_json::to_value(error) {
        data = data.with_data(body);
    }
    JsonRpcError::new(Some(id.clone()), data)
}

fn tool_listing(registry: &Registry) -> Vec<Value> {
    registry
        .definitions()
        .into_iter()
        .map(|def| {
            json!({
                "name": def.name,
                "description": def.description,
                "inputSchema": def.parameters,
            })
        })
        .collect()
}

/// Derives MCP prompt arguments from a parameter schema.
fn prompt_listing(registry: &Registry) -> Vec<Value> {
    registry
        .definitions()
        .into_iter()
        .map(|def| {
            let required: Vec<&str> = def
                .parameters
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            let arguments: Vec<Value> = def
                .parameters
                .get("properties")
                .and_then(Value::as_object)
                .map(|props| {
                    props
                        .iter()
                        .map(|(name, schema)| {
                            json!({
                                "name": name,
                                "description": schema.get("description").cloned().unwrap_or(Value::Null),
                                "required": required.contains(&name.as_str()),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();

            json!({
                "name": def.name,
                "description": def.description,
                "arguments": arguments,
            })
        })
        .collect()
}
