//! Request dispatch.
//!
//! Each request moves through
//! `received → envelope-validated → operation-resolved → parameters-validated → executing`
//! and ends in exactly one response envelope. The dispatcher keeps no
//! per-request state: no deduplication, retries, queueing or caching.

use serde_json::Value;

use super::envelope::{CallKind, ContentEnvelope, ErrorKind, RequestEnvelope, ResponseEnvelope};
use super::registry::{OperationError, OperationOutput, Registry};
use super::validation;

/// Routes request envelopes to registered operations.
pub struct Dispatcher {
    tools: Registry,
    prompts: Registry,
}

impl Dispatcher {
    /// Creates a dispatcher over fixed tool and prompt catalogs.
    #[must_use]
    pub const fn new(tools: Registry, prompts: Registry) -> Self {
        Self { tools, prompts }
    }

    /// The tool catalog.
    #[must_use]
    pub const fn tools(&self) -> &Registry {
        &self.tools
    }

    /// The prompt catalog.
    #[must_use]
    pub const fn prompts(&self) -> &Registry {
        &self.prompts
    }

    /// Validates a raw JSON payload as an envelope, then dispatches it.
    pub async fn dispatch_value(&self, raw: Value) -> ResponseEnvelope {
        match RequestEnvelope::from_value(raw) {
            Ok(request) => self.dispatch(request).await,
            Err(response) => {
                tracing::debug!(request_id = response.request_id(), "Rejected malformed envelope");
                response
            }
        }
    }

    /// Dispatches an envelope-validated request.
    pub async fn dispatch(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let RequestEnvelope {
            kind,
            name,
            parameters,
            request_id,
        } = request;

        let (registry, not_found_code, label) = match kind {
            CallKind::ToolCall => (&self.tools, "tool_not_found", "Tool"),
            CallKind::PromptCall => (&self.prompts, "prompt_not_found", "Prompt"),
        };

        let Some(operation) = registry.get(&name) else {
            tracing::info!(kind = %kind, name = %name, request_id = %request_id, "Unknown operation");
            return ResponseEnvelope::error(
                request_id,
                ErrorKind::Transport,
                not_found_code,
                format!("{label} not found: {name}"),
            );
        };

        let verdict = validation::validate(operation.as_ref(), &parameters);
        if !verdict.valid {
            tracing::info!(
                name = %name,
                request_id = %request_id,
                errors = verdict.errors.len(),
                "Parameter validation failed"
            );
            return ResponseEnvelope::error(
                request_id,
                ErrorKind::Validation,
                "invalid_parameters",
                format!("Invalid parameters for {name}"),
            )
            .with_field_errors(verdict.formatted());
        }

        tracing::debug!(kind = %kind, name = %name, request_id = %request_id, "Executing operation");

        match operation.execute(parameters).await {
            Ok(output) => Self::complete(request_id, output),
            Err(err) => {
                tracing::warn!(name = %name, request_id = %request_id, error = %err, "Operation failed");
                Self::fail(request_id, err)
            }
        }
    }

    fn complete(request_id: String, output: OperationOutput) -> ResponseEnvelope {
        let envelope = match output {
            OperationOutput::Content(envelope) => envelope,
            OperationOutput::Raw(value) => match serde_json::to_string_pretty(&value) {
                Ok(text) => ContentEnvelope::text(text),
                Err(e) => {
                    return ResponseEnvelope::error(
                        request_id,
                        ErrorKind::Execution,
                        "serialization_error",
                        format!("Failed to serialise result: {e}"),
                    )
                }
            },
        };
        ResponseEnvelope::success(request_id, envelope)
    }

    fn fail(request_id: String, err: OperationError) -> ResponseEnvelope {
        match err {
            OperationError::Authentication { code, message } => {
                ResponseEnvelope::error(request_id, ErrorKind::Validation, code, message)
            }
            OperationError::Structured { code, message } => {
                ResponseEnvelope::error(request_id, ErrorKind::Execution, code, message)
            }
            OperationError::Failed(message) => {
                ResponseEnvelope::error(request_id, ErrorKind::Execution, "execution_error", message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Map};

    use super::*;
    use crate::mcp::envelope::{ContentItem, ErrorResponse, SuccessResponse};
    use crate::mcp::registry::Operation;
    use crate::mcp::validation::{ParamChecker, ValidationResult};

    /// Echoes its parameters back, counting invocations.
    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Operation for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo parameters"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
        }

        fn validate(&self, parameters: &Map<String, Value>) -> ValidationResult {
            ParamChecker::new(parameters).required_string("text").finish()
        }

        async fn execute(
            &self,
            parameters: Map<String, Value>,
        ) -> Result<OperationOutput, OperationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OperationOutput::Raw(Value::Object(parameters)))
        }
    }

    /// Returns a canned outcome without validation.
    struct Canned(&'static str, Result<OperationOutput, OperationError>);

    #[async_trait]
    impl Operation for Canned {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "canned"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(
            &self,
            _parameters: Map<String, Value>,
        ) -> Result<OperationOutput, OperationError> {
            self.1.clone()
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<Echo>) {
        let echo = Arc::new(Echo {
            calls: AtomicUsize::new(0),
        });
        let mut tools = Registry::tools();
        tools.register(echo.clone()).unwrap();
        tools
            .register(Arc::new(Canned(
                "content",
                Ok(OperationOutput::Content(ContentEnvelope::text("already shaped"))),
            )))
            .unwrap();
        tools
            .register(Arc::new(Canned(
                "auth_fail",
                Err(OperationError::Authentication {
                    code: "authentication_error".to_string(),
                    message: "bad token".to_string(),
                }),
            )))
            .unwrap();
        tools
            .register(Arc::new(Canned(
                "upstream_fail",
                Err(OperationError::structured("api_error", "Readwise API returned 500")),
            )))
            .unwrap();
        tools
            .register(Arc::new(Canned(
                "plain_fail",
                Err(OperationError::Failed("boom".to_string())),
            )))
            .unwrap();

        let mut prompts = Registry::prompts();
        prompts
            .register(Arc::new(Canned(
                "echo",
                Ok(OperationOutput::Content(ContentEnvelope::text("prompt text"))),
            )))
            .unwrap();

        (Dispatcher::new(tools, prompts), echo)
    }

    fn expect_error(response: ResponseEnvelope) -> ErrorResponse {
        match response {
            ResponseEnvelope::Error(e) => e,
            ResponseEnvelope::Success(s) => panic!("expected error, got {s:?}"),
        }
    }

    fn expect_success(response: ResponseEnvelope) -> SuccessResponse {
        match response {
            ResponseEnvelope::Success(s) => s,
            ResponseEnvelope::Error(e) => panic!("expected success, got {e:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_transport_error() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher
            .dispatch_value(json!({
                "type": "tool_call",
                "name": "get_tags",
                "request_id": "r1",
                "parameters": {}
            }))
            .await;

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "error": {
                    "type": "transport",
                    "details": {"code": "tool_not_found", "message": "Tool not found: get_tags"}
                },
                "request_id": "r1"
            })
        );
    }

    #[tokio::test]
    async fn prompts_and_tools_are_separate_namespaces() {
        let (dispatcher, echo) = dispatcher();

        let prompt = expect_success(
            dispatcher
                .dispatch(RequestEnvelope::prompt_call("echo", Map::new(), "p1"))
                .await,
        );
        assert_eq!(prompt.content, vec![ContentItem::text("prompt text")]);
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);

        let missing = expect_error(
            dispatcher
                .dispatch(RequestEnvelope::prompt_call("content", Map::new(), "p2"))
                .await,
        );
        assert_eq!(missing.error.details.code, "prompt_not_found");
        assert_eq!(missing.error.details.message, "Prompt not found: content");
    }

    #[tokio::test]
    async fn invalid_parameters_skip_execution() {
        let (dispatcher, echo) = dispatcher();
        let response = expect_error(
            dispatcher
                .dispatch(RequestEnvelope::tool_call("echo", Map::new(), "r2"))
                .await,
        );

        assert_eq!(response.error.kind, ErrorKind::Validation);
        assert_eq!(response.error.details.code, "invalid_parameters");
        assert_eq!(
            response.error.details.errors,
            Some(vec!["text: is required".to_string()])
        );
        assert_eq!(response.request_id, "r2");
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn raw_results_become_one_text_item() {
        let (dispatcher, _) = dispatcher();
        let mut params = Map::new();
        params.insert("text".to_string(), json!("hi"));

        let response = expect_success(
            dispatcher
                .dispatch(RequestEnvelope::tool_call("echo", params, "r3"))
                .await,
        );

        assert_eq!(response.request_id, "r3");
        assert_eq!(response.content.len(), 1);
        let ContentItem::Text { text } = &response.content[0] else {
            panic!("expected text content");
        };
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed, json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn content_results_pass_through() {
        let (dispatcher, _) = dispatcher();
        let response = expect_success(
            dispatcher
                .dispatch(RequestEnvelope::tool_call("content", Map::new(), "r4"))
                .await,
        );
        assert_eq!(response.content, vec![ContentItem::text("already shaped")]);
        assert_eq!(response.request_id, "r4");
    }

    #[tokio::test]
    async fn authentication_failures_are_validation_errors() {
        let (dispatcher, _) = dispatcher();
        let response = expect_error(
            dispatcher
                .dispatch(RequestEnvelope::tool_call("auth_fail", Map::new(), "r5"))
                .await,
        );
        assert_eq!(response.error.kind, ErrorKind::Validation);
        assert_eq!(response.error.details.code, "authentication_error");
        assert_eq!(response.error.details.message, "bad token");
    }

    #[tokio::test]
    async fn execution_failures_keep_structured_code() {
        let (dispatcher, _) = dispatcher();

        let structured = expect_error(
            dispatcher
                .dispatch(RequestEnvelope::tool_call("upstream_fail", Map::new(), "r6"))
                .await,
        );
        assert_eq!(structured.error.kind, ErrorKind::Execution);
        assert_eq!(structured.error.details.code, "api_error");

        let plain = expect_error(
            dispatcher
                .dispatch(RequestEnvelope::tool_call("plain_fail", Map::new(), "r7"))
                .await,
        );
        assert_eq!(plain.error.kind, ErrorKind::Execution);
        assert_eq!(plain.error.details.code, "execution_error");
        assert_eq!(plain.error.details.message, "boom");
    }

    #[tokio::test]
    async fn repeated_requests_execute_independently() {
        let (dispatcher, echo) = dispatcher();
        let mut params = Map::new();
        params.insert("text".to_string(), json!("again"));

        let first = dispatcher
            .dispatch(RequestEnvelope::tool_call("echo", params.clone(), "same"))
            .await;
        let second = dispatcher
            .dispatch(RequestEnvelope::tool_call("echo", params, "same"))
            .await;

        assert_eq!(first, second);
        assert_eq!(echo.calls.load(Ordering::SeqCst), 2);
    }
}
