//! Request and response envelopes exchanged between adapters and the dispatcher.
//!
//! Every adapter decodes its wire format into a [`RequestEnvelope`] and
//! encodes the [`ResponseEnvelope`] it gets back. The envelope shapes are
//! transport-agnostic:
//!
//! ```text
//! request:  {"type": "tool_call"|"prompt_call", "name": ..., "parameters": {...}, "request_id": ...}
//! success:  {"content": [{"type": "text", "text": ...}], "request_id": ...}
//! error:    {"error": {"type": ..., "details": {"code": ..., "message": ..., "errors"?: [...]}}, "request_id": ...}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel `request_id` used when the originating request could not be parsed.
pub const UNKNOWN_REQUEST_ID: &str = "unknown";

/// Which registry a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// Invoke a tool.
    ToolCall,
    /// Invoke a prompt.
    PromptCall,
}

impl CallKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToolCall => "tool_call",
            Self::PromptCall => "prompt_call",
        }
    }

    fn from_wire(s: &str) -> Option<Self> {
        match s {
            "tool_call" => Some(Self::ToolCall),
            "prompt_call" => Some(Self::PromptCall),
            _ => None,
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded, envelope-validated request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestEnvelope {
    /// Target registry.
    #[serde(rename = "type")]
    pub kind: CallKind,
    /// Operation name (non-empty).
    pub name: String,
    /// Operation parameters.
    pub parameters: Map<String, Value>,
    /// Correlation identifier (non-empty).
    pub request_id: String,
}

impl RequestEnvelope {
    /// Creates a tool call envelope.
    #[must_use]
    pub fn tool_call(
        name: impl Into<String>,
        parameters: Map<String, Value>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            kind: CallKind::ToolCall,
            name: name.into(),
            parameters,
            request_id: request_id.into(),
        }
    }

    /// Creates a prompt call envelope.
    #[must_use]
    pub fn prompt_call(
        name: impl Into<String>,
        parameters: Map<String, Value>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            kind: CallKind::PromptCall,
            name: name.into(),
            parameters,
            request_id: request_id.into(),
        }
    }

    /// Validates the envelope fields of a raw JSON value.
    ///
    /// On failure, returns a `transport/invalid_request` response that echoes
    /// the best-known `request_id` (or [`UNKNOWN_REQUEST_ID`]).
    ///
    /// # Errors
    ///
    /// Returns the error response when a field is missing, has the wrong
    /// type, or `type` is not one of the two known kinds.
    #[allow(clippy::result_large_err)] // the error is the response itself
    pub fn from_value(value: Value) -> Result<Self, ResponseEnvelope> {
        let request_id = value
            .get("request_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let best_id = request_id
            .clone()
            .unwrap_or_else(|| UNKNOWN_REQUEST_ID.to_string());
        let invalid =
            |message: String| ResponseEnvelope::invalid_request(best_id.clone(), message);

        let Value::Object(mut obj) = value else {
            return Err(invalid("Request must be a JSON object".to_string()));
        };

        let kind = match obj.get("type") {
            Some(Value::String(t)) => CallKind::from_wire(t)
                .ok_or_else(|| invalid(format!("Invalid request type: {t}")))?,
            Some(_) => return Err(invalid("Field 'type' must be a string".to_string())),
            None => return Err(invalid("Missing required field: type".to_string())),
        };

        let name = match obj.get("name") {
            Some(Value::String(n)) if !n.is_empty() => n.clone(),
            Some(Value::String(_)) => {
                return Err(invalid("Field 'name' must not be empty".to_string()))
            }
            Some(_) => return Err(invalid("Field 'name' must be a string".to_string())),
            None => return Err(invalid("Missing required field: name".to_string())),
        };

        let Some(request_id) = request_id else {
            return Err(invalid(match obj.get("request_id") {
                None => "Missing required field: request_id".to_string(),
                Some(_) => "Field 'request_id' must be a non-empty string".to_string(),
            }));
        };

        let parameters = match obj.remove("parameters") {
            Some(Value::Object(params)) => params,
            Some(_) => return Err(invalid("Field 'parameters' must be an object".to_string())),
            None => return Err(invalid("Missing required field: parameters".to_string())),
        };

        Ok(Self {
            kind,
            name,
            parameters,
            request_id,
        })
    }
}

/// Error taxonomy carried by every error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Malformed envelope, unknown operation, unknown session, routing failure.
    Transport,
    /// Invalid parameters, or an authentication failure during execution.
    Validation,
    /// The operation ran and failed.
    Execution,
}

/// Machine-readable detail of an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Stable error code, e.g. `tool_not_found`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Per-field messages formatted as `"<field>: <message>"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

/// The `error` member of an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error kind.
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Code, message and optional field errors.
    pub details: ErrorDetails,
}

/// A single piece of response content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Base64-encoded image data.
    Image {
        /// Base64 payload.
        data: String,
        /// MIME type of the payload.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// An embedded resource.
    Resource {
        /// Resource description as the protocol defines it.
        resource: Value,
    },
}

impl ContentItem {
    /// Creates a text item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Content-shaped operation output.
///
/// `extra` carries any additional top-level members the operation wants to
/// pass through alongside `content`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentEnvelope {
    /// Content items.
    pub content: Vec<ContentItem>,
    /// Additional members merged into the success response.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentEnvelope {
    /// Creates an envelope holding a single text item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            extra: Map::new(),
        }
    }
}

/// Success shape of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessResponse {
    /// Content items.
    pub content: Vec<ContentItem>,
    /// Pass-through members from a content-shaped result.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Correlation identifier of the originating request.
    pub request_id: String,
}

/// Error shape of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Kind and details.
    pub error: ErrorBody,
    /// Correlation identifier of the originating request.
    pub request_id: String,
}

/// What the dispatcher hands back to an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    /// The request failed.
    Error(ErrorResponse),
    /// The request completed.
    Success(SuccessResponse),
}

impl ResponseEnvelope {
    /// Builds a success response from content-shaped output.
    #[must_use]
    pub fn success(request_id: impl Into<String>, envelope: ContentEnvelope) -> Self {
        let ContentEnvelope { content, mut extra } = envelope;
        // reserved members: the originating request_id always wins, and a
        // success must not carry a second `content` or an `error`
        for reserved in ["request_id", "content", "error"] {
            extra.remove(reserved);
        }
        Self::Success(SuccessResponse {
            content,
            extra,
            request_id: request_id.into(),
        })
    }

    /// Builds an error response.
    #[must_use]
    pub fn error(
        request_id: impl Into<String>,
        kind: ErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Error(ErrorResponse {
            error: ErrorBody {
                kind,
                details: ErrorDetails {
                    code: code.into(),
                    message: message.into(),
                    errors: None,
                },
            },
            request_id: request_id.into(),
        })
    }

    /// Builds a `transport/invalid_request` error.
    #[must_use]
    pub fn invalid_request(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::error(request_id, ErrorKind::Transport, "invalid_request", message)
    }

    /// Builds the response for a payload that is not even valid JSON.
    #[must_use]
    pub fn parse_error(message: impl fmt::Display) -> Self {
        Self::invalid_request(UNKNOWN_REQUEST_ID, format!("Invalid JSON: {message}"))
    }

    /// Attaches per-field messages to an error response.
    #[must_use]
    pub fn with_field_errors(mut self, errors: Vec<String>) -> Self {
        if let Self::Error(e) = &mut self {
            e.error.details.errors = Some(errors);
        }
        self
    }

    /// Returns the correlation identifier.
    #[must_use]
    pub fn request_id(&self) -> &str {
        match self {
            Self::Error(e) => &e.request_id,
            Self::Success(s) => &s.request_id,
        }
    }

    /// Returns `true` for error responses.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Serialises to a single-line JSON string.
    ///
    /// Falls back to a hand-built `transport/internal_error` envelope if the
    /// response cannot be serialised, so callers always have something to emit.
    #[must_use]
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialise response envelope");
            let fallback = Self::error(
                self.request_id(),
                ErrorKind::Transport,
                "internal_error",
                "Failed to serialise response",
            );
            serde_json::to_string(&fallback).unwrap_or_else(|_| {
                format!(
                    r#"{{"error":{{"type":"transport","details":{{"code":"internal_error","message":"Failed to serialise response"}}}},"request_id":{}}}"#,
                    Value::String(self.request_id().to_string())
                )
            })
        })
    }
}
