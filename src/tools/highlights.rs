//! Tools backed by the highlights API (`/api/v2`).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{id_param, int_param, str_param, BOOK_CATEGORIES, HIGHLIGHT_COLORS, MAX_PAGE_SIZE};
use crate::api::{ApiRequest, ReadwiseApi, Service};
use crate::mcp::{Operation, OperationError, OperationOutput, ParamChecker, ValidationResult};

/// Number of results `search_highlights` returns when no limit is given.
const DEFAULT_SEARCH_LIMIT: i64 = 10;

/// Largest `search_highlights` limit.
const MAX_SEARCH_LIMIT: i64 = 100;

/// `get_books`: lists books, articles and other sources.
pub struct GetBooks {
    api: Arc<dyn ReadwiseApi>,
}

impl GetBooks {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for GetBooks {
    fn name(&self) -> &str {
        "get_books"
    }

    fn description(&self) -> &str {
        "List books and other highlight sources in the Readwise library"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page": {"type": "integer", "minimum": 1, "description": "Page number"},
                "page_size": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_PAGE_SIZE,
                    "description": "Results per page"
                },
                "category": {
                    "type": "string",
                    "enum": BOOK_CATEGORIES,
                    "description": "Only return sources of this category"
                }
            }
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params)
            .optional_integer("page", 1, i64::MAX)
            .optional_integer("page_size", 1, MAX_PAGE_SIZE)
            .optional_enum("category", BOOK_CATEGORIES)
            .finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let request = ApiRequest::get(Service::Highlights, "books/")
            .query_opt("page", int_param(&params, "page"))
            .query_opt("page_size", int_param(&params, "page_size"))
            .query_opt("category", str_param(&params, "category"));

        Ok(OperationOutput::Raw(self.api.call(request).await?))
    }
}

/// `get_highlights`: lists highlights, optionally for one book.
pub struct GetHighlights {
    api: Arc<dyn ReadwiseApi>,
}

impl GetHighlights {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for GetHighlights {
    fn name(&self) -> &str {
        "get_highlights"
    }

    fn description(&self) -> &str {
        "List highlights, optionally filtered by book or text"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page": {"type": "integer", "minimum": 1},
                "page_size": {"type": "integer", "minimum": 1, "maximum": MAX_PAGE_SIZE},
                "book_id": {
                    "type": ["integer", "string"],
                    "description": "Only return highlights from this book"
                },
                "search": {"type": "string", "description": "Text to match"}
            }
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params)
            .optional_integer("page", 1, i64::MAX)
            .optional_integer("page_size", 1, MAX_PAGE_SIZE)
            .optional_id("book_id")
            .optional_string("search")
            .finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let request = ApiRequest::get(Service::Highlights, "highlights/")
            .query_opt("page", int_param(&params, "page"))
            .query_opt("page_size", int_param(&params, "page_size"))
            .query_opt("book_id", id_param(&params, "book_id"))
            .query_opt("search", str_param(&params, "search"));

        Ok(OperationOutput::Raw(self.api.call(request).await?))
    }
}

/// `search_highlights`: full-text search over highlights.
pub struct SearchHighlights {
    api: Arc<dyn ReadwiseApi>,
}

impl SearchHighlights {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

/// Runs a highlight search and keeps at most `limit` results.
pub(crate) async fn search(
    api: &dyn ReadwiseApi,
    query: &str,
    limit: i64,
) -> Result<Vec<Value>, OperationError> {
    let request = ApiRequest::get(Service::Highlights, "highlights/")
        .query("search", query)
        .query("page_size", limit);

    let response = api.call(request).await?;
    let results = response
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Ok(results
        .into_iter()
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .collect())
}

#[async_trait]
impl Operation for SearchHighlights {
    fn name(&self) -> &str {
        "search_highlights"
    }

    fn description(&self) -> &str {
        "Search highlights by text"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Text to search for"},
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_SEARCH_LIMIT,
                    "default": DEFAULT_SEARCH_LIMIT
                }
            },
            "required": ["query"]
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params)
            .required_string("query")
            .optional_integer("limit", 1, MAX_SEARCH_LIMIT)
            .finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let query = str_param(&params, "query").unwrap_or_default();
        let limit = int_param(&params, "limit").unwrap_or(DEFAULT_SEARCH_LIMIT);

        let results = search(self.api.as_ref(), query, limit).await?;
        tracing::debug!(query, count = results.len(), "Highlight search");

        Ok(OperationOutput::Raw(json!({
            "query": query,
            "count": results.len(),
            "results": results,
        })))
    }
}

/// `get_tags`: lists every tag.
pub struct GetTags {
    api: Arc<dyn ReadwiseApi>,
}

impl GetTags {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for GetTags {
    fn name(&self) -> &str {
        "get_tags"
    }

    fn description(&self) -> &str {
        "List all tags"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let request = ApiRequest::get(Service::Highlights, "tags/");
        Ok(OperationOutput::Raw(self.api.call(request).await?))
    }
}

/// `create_highlight`: saves a new highlight.
pub struct CreateHighlight {
    api: Arc<dyn ReadwiseApi>,
}

impl CreateHighlight {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for CreateHighlight {
    fn name(&self) -> &str {
        "create_highlight"
    }

    fn description(&self) -> &str {
        "Create a highlight, optionally attached to a book or source"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "description": "Highlighted text"},
                "title": {"type": "string", "description": "Title of the source"},
                "author": {"type": "string"},
                "source_url": {"type": "string"},
                "note": {"type": "string", "description": "Note attached to the highlight"},
                "book_id": {"type": ["integer", "string"]}
            },
            "required": ["text"]
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params)
            .required_string("text")
            .optional_string("title")
            .optional_string("author")
            .optional_string("source_url")
            .optional_string("note")
            .optional_id("book_id")
            .finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let mut highlight = Map::new();
        for field in ["text", "title", "author", "source_url", "note"] {
            if let Some(value) = str_param(&params, field) {
                highlight.insert(field.to_string(), Value::String(value.to_string()));
            }
        }
        if let Some(book_id) = params.get("book_id").filter(|v| !v.is_null()) {
            highlight.insert("book_id".to_string(), book_id.clone());
        }

        let body = json!({ "highlights": [highlight] });
        let request = ApiRequest::post(Service::Highlights, "highlights/", body);
        Ok(OperationOutput::Raw(self.api.call(request).await?))
    }
}

/// `update_highlight`: edits the text, note or color of a highlight.
pub struct UpdateHighlight {
    api: Arc<dyn ReadwiseApi>,
}

impl UpdateHighlight {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for UpdateHighlight {
    fn name(&self) -> &str {
        "update_highlight"
    }

    fn description(&self) -> &str {
        "Update the text, note or color of an existing highlight"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "highlight_id": {"type": "integer", "minimum": 1},
                "text": {"type": "string"},
                "note": {"type": "string", "description": "Replaces the current note; empty clears it"},
                "color": {"type": "string", "enum": HIGHLIGHT_COLORS}
            },
            "required": ["highlight_id"]
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params)
            .required_integer("highlight_id", 1, i64::MAX)
            .optional_string("text")
            .optional_string("note")
            .optional_enum("color", HIGHLIGHT_COLORS)
            .any_of(&["text", "note", "color"])
            .finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let highlight_id = int_param(&params, "highlight_id").unwrap_or_default();

        // the note is sent even when empty so it can be cleared
        let mut changes = Map::new();
        for field in ["text", "note", "color"] {
            if let Some(value) = params.get(field).and_then(Value::as_str) {
                changes.insert(field.to_string(), Value::String(value.to_string()));
            }
        }

        let path = format!("highlights/{highlight_id}/");
        let request = ApiRequest::patch(Service::Highlights, path, Value::Object(changes));
        Ok(OperationOutput::Raw(self.api.call(request).await?))
    }
}

/// `delete_highlight`: removes a highlight.
pub struct DeleteHighlight {
    api: Arc<dyn ReadwiseApi>,
}

impl DeleteHighlight {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for DeleteHighlight {
    fn name(&self) -> &str {
        "delete_highlight"
    }

    fn description(&self) -> &str {
        "Permanently delete a highlight"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "highlight_id": {"type": "integer", "minimum": 1}
            },
            "required": ["highlight_id"]
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params)
            .required_integer("highlight_id", 1, i64::MAX)
            .finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let highlight_id = int_param(&params, "highlight_id").unwrap_or_default();
        let request = ApiRequest::delete(Service::Highlights, format!("highlights/{highlight_id}/"));
        self.api.call(request).await?;

        Ok(OperationOutput::Raw(json!({
            "highlight_id": highlight_id,
            "deleted": true,
        })))
    }
}
