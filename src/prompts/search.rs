use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{render_highlights, DEFAULT_LIMIT, MAX_LIMIT};
use crate::api::ReadwiseApi;
use crate::mcp::{
    ContentEnvelope, Operation, OperationError, OperationOutput, ParamChecker, ValidationResult,
};
use crate::tools::{int_param, search_highlights, str_param};

/// `readwise_search`: answers a question from matching highlights.
pub struct SearchPrompt {
    api: Arc<dyn ReadwiseApi>,
}

impl SearchPrompt {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for SearchPrompt {
    fn name(&self) -> &str {
        "readwise_search"
    }

    fn description(&self) -> &str {
        "Search Readwise highlights and discuss what they say about a topic"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Topic or text to search for"},
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_LIMIT,
                    "default": DEFAULT_LIMIT
                }
            },
            "required": ["query"]
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params)
            .required_string("query")
            .optional_integer("limit", 1, MAX_LIMIT)
            .finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let query = str_param(&params, "query").unwrap_or_default();
        let limit = int_param(&params, "limit").unwrap_or(DEFAULT_LIMIT);

        let results = search_highlights(self.api.as_ref(), query, limit).await?;
        let text = if results.is_empty() {
            format!("No highlights matched \"{query}\".")
        } else {
            format!(
                "Here are {} highlights matching \"{query}\". Explain what they say about \
                 this topic, citing the highlights where relevant.\n\n{}",
                results.len(),
                render_highlights(&results)
            )
        };

        Ok(OperationOutput::Content(ContentEnvelope::text(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::tools::testing::ScriptedApi;

    fn params(query: &str) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("query".into(), json!(query));
        params
    }

    #[tokio::test]
    async fn lists_matches() {
        let api = Arc::new(ScriptedApi::new().respond(Ok(json!({
            "results": [{"text": "a"}, {"text": "b"}]
        }))));
        let output = SearchPrompt::new(api).execute(params("focus")).await.unwrap();
        let expected = "Here are 2 highlights matching \"focus\". Explain what they say about \
                        this topic, citing the highlights where relevant.\n\n1. \"a\"\n2. \"b\"\n";
        assert_eq!(output, OperationOutput::Content(ContentEnvelope::text(expected)));
    }

    #[tokio::test]
    async fn no_matches() {
        let api = Arc::new(ScriptedApi::new().respond(Ok(json!({"results": []}))));
        let output = SearchPrompt::new(api).execute(params("zzz")).await.unwrap();
        assert_eq!(
            output,
            OperationOutput::Content(ContentEnvelope::text("No highlights matched \"zzz\"."))
        );
    }

    #[tokio::test]
    async fn rate_limit_is_structured() {
        let api = Arc::new(ScriptedApi::new().respond(Err(ApiError::RateLimited { attempts: 4 })));
        let err = SearchPrompt::new(api).execute(params("x")).await.unwrap_err();
        assert_eq!(
            err,
            OperationError::structured(
                "rate_limit_exceeded",
                "rate limit exceeded after 4 attempt(s)"
            )
        );
    }
}
