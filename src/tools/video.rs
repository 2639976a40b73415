//! Video tools, backed by Reader documents of category `video`.
//!
//! Playback position is Reader's `reading_progress`: a fraction between 0
//! and 1 of the video's length. Video highlights are stored through the
//! highlights API with a `time_offset` location in seconds.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{id_param, int_param, str_param, DOCUMENT_LOCATIONS};
use crate::api::{ApiRequest, ReadwiseApi, Service};
use crate::mcp::{Operation, OperationError, OperationOutput, ParamChecker, ValidationResult};

const VIDEO_CATEGORY: &str = "video";

/// Looks up one Reader document and checks that it is a video.
async fn fetch_video(api: &dyn ReadwiseApi, document_id: &str) -> Result<Value, OperationError> {
    let request = ApiRequest::get(Service::Reader, "list/").query("id", document_id);
    let response = api.call(request).await?;

    response
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .filter(|doc| doc.get("category").and_then(Value::as_str) == Some(VIDEO_CATEGORY))
        .cloned()
        .ok_or_else(|| {
            OperationError::structured("video_not_found", format!("Video not found: {document_id}"))
        })
}

fn field(document: &Value, key: &str) -> Value {
    document.get(key).cloned().unwrap_or(Value::Null)
}

fn document_id_schema() -> Value {
    json!({"type": ["string", "integer"], "description": "Reader document id of the video"})
}

/// `get_videos`: lists videos saved to Reader.
pub struct GetVideos {
    api: Arc<dyn ReadwiseApi>,
}

impl GetVideos {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for GetVideos {
    fn name(&self) -> &str {
        "get_videos"
    }

    fn description(&self) -> &str {
        "List videos saved to Reader"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {"type": "string", "enum": DOCUMENT_LOCATIONS},
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
            .optional_string("page_cursor")
            .finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let request = ApiRequest::get(Service::Reader, "list/")
            .query("category", VIDEO_CATEGORY)
            .query_opt("location", str_param(&params, "location"))
            .query_opt("pageCursor", str_param(&params, "page_cursor"));

        Ok(OperationOutput::Raw(self.api.call(request).await?))
    }
}

/// `get_video`: fetches one video's details.
pub struct GetVideo {
    api: Arc<dyn ReadwiseApi>,
}

impl GetVideo {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for GetVideo {
    fn name(&self) -> &str {
        "get_video"
    }

    fn description(&self) -> &str {
        "Get the details of a video saved to Reader"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"document_id": document_id_schema()},
            "required": ["document_id"]
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params).required_id("document_id").finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let document_id = id_param(&params, "document_id").unwrap_or_default();
        let video = fetch_video(self.api.as_ref(), &document_id).await?;
        Ok(OperationOutput::Raw(video))
    }
}

/// `get_video_position`: reports where playback stopped.
pub struct GetVideoPosition {
    api: Arc<dyn ReadwiseApi>,
}

impl GetVideoPosition {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for GetVideoPosition {
    fn name(&self) -> &str {
        "get_video_position"
    }

    fn description(&self) -> &str {
        "Get the playback position of a video, as a fraction of its length"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"document_id": document_id_schema()},
            "required": ["document_id"]
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params).required_id("document_id").finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let document_id = id_param(&params, "document_id").unwrap_or_default();
        let video = fetch_video(self.api.as_ref(), &document_id).await?;

        Ok(OperationOutput::Raw(json!({
            "document_id": document_id,
            "title": field(&video, "title"),
            "position": video.get("reading_progress").cloned().unwrap_or(json!(0)),
            "last_moved_at": field(&video, "last_moved_at"),
        })))
    }
}

/// `update_video_position`: stores a new playback position.
pub struct UpdateVideoPosition {
    api: Arc<dyn ReadwiseApi>,
}

impl UpdateVideoPosition {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for UpdateVideoPosition {
    fn name(&self) -> &str {
        "update_video_position"
    }

    fn description(&self) -> &str {
        "Set the playback position of a video"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_id": document_id_schema(),
                "position": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "description": "Fraction of the video already watched"
                }
            },
            "required": ["document_id", "position"]
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params)
            .required_path_id("document_id")
            .required_number("position", 0.0, 1.0)
            .finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let document_id = id_param(&params, "document_id").unwrap_or_default();
        let position = params.get("position").and_then(Value::as_f64).unwrap_or_default();

        let request = ApiRequest::patch(
            Service::Reader,
            format!("update/{document_id}/"),
            json!({ "reading_progress": position }),
        );
        self.api.call(request).await?;

        Ok(OperationOutput::Raw(json!({
            "document_id": document_id,
            "position": position,
        })))
    }
}

/// `get_video_highlights`: lists highlights made on a video.
pub struct GetVideoHighlights {
    api: Arc<dyn ReadwiseApi>,
}

impl GetVideoHighlights {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for GetVideoHighlights {
    fn name(&self) -> &str {
        "get_video_highlights"
    }

    fn description(&self) -> &str {
        "List the highlights made on a video"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_id": document_id_schema(),
                "page_cursor": {"type": "string"}
            },
            "required": ["document_id"]
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params)
            .required_id("document_id")
            .optional_string("page_cursor")
            .finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let document_id = id_param(&params, "document_id").unwrap_or_default();
        let request = ApiRequest::get(Service::Reader, "list/")
            .query("parent_id", &document_id)
            .query_opt("pageCursor", str_param(&params, "page_cursor"));

        Ok(OperationOutput::Raw(self.api.call(request).await?))
    }
}

/// `create_video_highlight`: highlights a moment of a video.
pub struct CreateVideoHighlight {
    api: Arc<dyn ReadwiseApi>,
}

impl CreateVideoHighlight {
    #[must_use]
    pub fn new(api: Arc<dyn ReadwiseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Operation for CreateVideoHighlight {
    fn name(&self) -> &str {
        "create_video_highlight"
    }

    fn description(&self) -> &str {
        "Create a highlight on a video, optionally at a timestamp"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_id": document_id_schema(),
                "text": {"type": "string", "description": "Transcript text to highlight"},
                "note": {"type": "string"},
                "timestamp": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Offset into the video, in seconds"
                }
            },
            "required": ["document_id", "text"]
        })
    }

    fn validate(&self, params: &Map<String, Value>) -> ValidationResult {
        ParamChecker::new(params)
            .required_id("document_id")
            .required_string("text")
            .optional_string("note")
            .optional_integer("timestamp", 0, i64::MAX)
            .finish()
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<OperationOutput, OperationError> {
        let document_id = id_param(&params, "document_id").unwrap_or_default();
        let video = fetch_video(self.api.as_ref(), &document_id).await?;

        let mut highlight = Map::new();
        highlight.insert("text".into(), json!(str_param(&params, "text").unwrap_or_default()));
        for key in ["title", "author", "source_url"] {
            if let Some(value) = video.get(key).filter(|v| v.is_string()) {
                highlight.insert(key.into(), value.clone());
            }
        }
        if let Some(note) = str_param(&params, "note") {
            highlight.insert("note".into(), json!(note));
        }
        if let Some(seconds) = int_param(&params, "timestamp") {
            highlight.insert("location".into(), json!(seconds));
            highlight.insert("location_type".into(), json!("time_offset"));
        }

        let body = json!({ "highlights": [highlight] });
        let request = ApiRequest::post(Service::Highlights, "highlights/", body);
        Ok(OperationOutput::Raw(self.api.call(request).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::ScriptedApi;
    use super::*;
    use crate::api::Method;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn video_list() -> Value {
        json!({
            "count": 1,
            "results": [{
                "id": "01vid",
                "category": "video",
                "title": "Simple Made Easy",
                "author": "Rich Hickey",
                "source_url": "https://example.com/watch?v=1",
                "reading_progress": 0.5,
                "last_moved_at": "2024-03-01T10:00:00Z"
            }]
        })
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn get_videos_filters_on_category() {
        let api = Arc::new(ScriptedApi::new());
        GetVideos::new(api.clone())
            .execute(params(json!({"location": "later", "page_cursor": "c2"})))
            .await
            .unwrap();

        let request = &api.requests()[0];
        assert_eq!(request.service, Service::Reader);
        assert_eq!(request.path, "list/");
        assert_eq!(
            request.query,
            pairs(&[("category", "video"), ("location", "later"), ("pageCursor", "c2")])
        );
    }

    #[tokio::test]
    async fn get_video_returns_the_document() {
        let api = Arc::new(ScriptedApi::new().respond(Ok(video_list())));
        let output = GetVideo::new(api.clone())
            .execute(params(json!({"document_id": "01vid"})))
            .await
            .unwrap();
        assert_eq!(output, OperationOutput::Raw(video_list()["results"][0].clone()));
        assert_eq!(api.requests()[0].query, pairs(&[("id", "01vid")]));
    }

    #[tokio::test]
    async fn articles_are_not_videos() {
        let article = json!({"count": 1, "results": [{"id": "01art", "category": "article"}]});
        let api = Arc::new(ScriptedApi::new().respond(Ok(article)));
        let err = GetVideo::new(api)
            .execute(params(json!({"document_id": "01art"})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OperationError::structured("video_not_found", "Video not found: 01art")
        );
    }

    #[tokio::test]
    async fn video_position_reports_progress() {
        let api = Arc::new(ScriptedApi::new().respond(Ok(video_list())));
        let output = GetVideoPosition::new(api)
            .execute(params(json!({"document_id": "01vid"})))
            .await
            .unwrap();
        assert_eq!(
            output,
            OperationOutput::Raw(json!({
                "document_id": "01vid",
                "title": "Simple Made Easy",
                "position": 0.5,
                "last_moved_at": "2024-03-01T10:00:00Z"
            }))
        );
    }

    #[tokio::test]
    async fn update_video_position_patches_progress() {
        let api = Arc::new(ScriptedApi::new().respond(Ok(json!({"id": "01vid"}))));
        let tool = UpdateVideoPosition::new(api.clone());
        let args = params(json!({"document_id": "01vid", "position": 0.75}));
        assert!(tool.validate(&args).valid);

        let output = tool.execute(args).await.unwrap();
        assert_eq!(
            output,
            OperationOutput::Raw(json!({"document_id": "01vid", "position": 0.75}))
        );

        let request = &api.requests()[0];
        assert_eq!(request.method, Method::Patch);
        assert_eq!(request.service, Service::Reader);
        assert_eq!(request.path, "update/01vid/");
        assert_eq!(request.body, Some(json!({"reading_progress": 0.75})));
    }

    #[test]
    fn update_video_position_validates_range_and_id() {
        let tool = UpdateVideoPosition::new(Arc::new(ScriptedApi::new()));
        let result = tool.validate(&params(json!({"document_id": "../admin", "position": 2})));
        assert_eq!(
            result.formatted(),
            vec![
                "document_id: must contain only letters, digits, '-' or '_'".to_string(),
                "position: must be between 0 and 1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn video_highlights_are_child_documents() {
        let api = Arc::new(ScriptedApi::new());
        GetVideoHighlights::new(api.clone())
            .execute(params(json!({"document_id": "01vid"})))
            .await
            .unwrap();
        assert_eq!(api.requests()[0].query, pairs(&[("parent_id", "01vid")]));
    }

    #[tokio::test]
    async fn create_video_highlight_uses_time_offset() {
        let api = Arc::new(
            ScriptedApi::new()
                .respond(Ok(video_list()))
                .respond(Ok(json!([{"id": 1, "modified_highlights": [55]}]))),
        );
        let tool = CreateVideoHighlight::new(api.clone());
        tool.execute(params(json!({
            "document_id": "01vid",
            "text": "Simple is not easy",
            "timestamp": 754
        })))
        .await
        .unwrap();

        let requests = api.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].method, Method::Post);
        assert_eq!(requests[1].service, Service::Highlights);
        assert_eq!(
            requests[1].body,
            Some(json!({"highlights": [{
                "text": "Simple is not easy",
                "title": "Simple Made Easy",
                "author": "Rich Hickey",
                "source_url": "https://example.com/watch?v=1",
                "location": 754,
                "location_type": "time_offset"
            }]}))
        );
    }

    #[tokio::test]
    async fn create_video_highlight_stops_when_video_is_missing() {
        let api = Arc::new(ScriptedApi::new().respond(Ok(json!({"count": 0, "results": []}))));
        let err = CreateVideoHighlight::new(api.clone())
            .execute(params(json!({"document_id": "gone", "text": "x"})))
            .await
            .unwrap_err();
        assert_eq!(err, OperationError::structured("video_not_found", "Video not found: gone"));
        assert_eq!(api.requests().len(), 1);
    }
}
