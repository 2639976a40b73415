//! Tools backed by the Reader API (`/api/v3`).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{id_param, str_param, DOCUMENT_CATEGORIES, DOCUMENT_LOCATIONS};
use crate::api::{ApiRequest, ReadwiseApi, Service};
use crate::mcp::{Operation, OperationError, OperationOutput, ParamChecker, ValidationResult};

/// `get_documents`: lists Reader documents.
pub struct GetDocuments {
    api: Arc<dyn ReadwiseApi>,
}

impl GetDocuments {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for GetDocuments {
    fn name(&self) -> &str {
        "get_documents"
    }

    fn description(&self) -> &str {
        "List documents saved to Reader"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {"type": "string", "enum": DOCUMENT_LOCATIONS},
                "category": {"type": "string", "enum": DOCUMENT_CATEGORIES},
                "page_cursor": {
                    "type": "string",
                    "description": "Cursor returned as nextPageCursor by a previous call"
                }
            }
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params)
            .optional_enum("location", DOCUMENT_LOCATIONS)
            .optional_enum("category", DOCUMENT_CATEGORIES)
            .optional_string("page_cursor")
            .finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let request = ApiRequest::get(Service::Reader, "list/")
            .query_opt("location", str_param(&params, "location"))
            .query_opt("category", str_param(&params, "category"))
            .query_opt("pageCursor", str_param(&params, "page_cursor"));

        Ok(OperationOutput::Raw(self.api.call(request).await?))
    }
}

/// `get_reading_progress`: reports how far a document has been read.
pub struct GetReadingProgress {
    api: Arc<dyn ReadwiseApi>,
}

impl GetReadingProgress {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for GetReadingProgress {
    fn name(&self) -> &str {
        "get_reading_progress"
    }

    fn description(&self) -> &str {
        "Get the reading progress of a Reader document"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_id": {"type": ["string", "integer"], "description": "Reader document id"}
            },
            "required": ["document_id"]
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params).required_id("document_id").finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let document_id = id_param(&params, "document_id").unwrap_or_default();
        let request = ApiRequest::get(Service::Reader, "list/").query("id", &document_id);

        let response = self.api.call(request).await?;
        let Some(document) = response
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
        else {
            return Err(OperationError::structured(
                "document_not_found",
                format!("Document not found: {document_id}"),
            ));
        };

        Ok(OperationOutput::Raw(json!({
            "document_id": document_id,
            "title": document.get("title").cloned().unwrap_or(Value::Null),
            "reading_progress": document.get("reading_progress").cloned().unwrap_or(json!(0)),
            "location": document.get("location").cloned().unwrap_or(Value::Null),
        })))
    }
}
