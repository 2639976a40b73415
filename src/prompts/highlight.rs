use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{render_highlights, DEFAULT_LIMIT, MAX_LIMIT};
use crate::api::{ApiRequest, ReadwiseApi, Service};
use crate::mcp::{
    ContentEnvelope, Operation, OperationError, OperationOutput, ParamChecker, ValidationResult,
};
use crate::tools::{id_param, int_param, str_param};

const TASKS: &[&str] = &["summarize", "analyze", "connect", "question"];

/// `readwise_highlight`: asks the model to work with a set of highlights.
pub struct HighlightPrompt {
    api: Arc<dyn ReadwiseApi>,
}

impl HighlightPrompt {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

fn instruction(task: &str) -> &'static str {
    match task {
        "analyze" => "Analyze these highlights. Identify the main arguments, the evidence behind them and any assumptions worth questioning.",
        "connect" => "Find connections between these highlights. Group related ideas and point out where they reinforce or contradict each other.",
        "question" => "Write thoughtful questions prompted by these highlights that would deepen understanding of the material.",
        _ => "Summarize the key ideas in these highlights in a few concise paragraphs.",
    }
}

#[async_trait]
impl Operation for HighlightPrompt {
    fn name(&self) -> &str {
        "readwise_highlight"
    }

    fn description(&self) -> &str {
        "Work with Readwise highlights: summarize, analyze, connect or question them"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "book_id": {
                    "type": ["integer", "string"],
                    "description": "Only use highlights from this book"
                },
                "task": {"type": "string", "enum": TASKS, "default": "summarize"},
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_LIMIT,
                    "default": DEFAULT_LIMIT
                }
            }
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params)
            .optional_id("book_id")
            .optional_enum("task", TASKS)
            .optional_integer("limit", 1, MAX_LIMIT)
            .finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let task = str_param(&params, "task").unwrap_or("summarize");
        let limit = int_param(&params, "limit").unwrap_or(DEFAULT_LIMIT);
        let book_id = id_param(&params, "book_id");

        let request = ApiRequest::get(Service::Highlights, "highlights/")
            .query("page_size", limit)
            .query_opt("book_id", book_id.as_deref());
        let response = self.api.call(request).await?;
        let highlights = response
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let text = if highlights.is_empty() {
            "No highlights were found for this request.".to_string()
        } else {
            format!(
                "{}\n\nHighlights:\n{}",
                instruction(task),
                render_highlights(highlights)
            )
        };

        Ok(OperationOutput::Content(ContentEnvelope::text(text)))
    }
}
