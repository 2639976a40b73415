//! Built-in Readwise tools.
//!
//! Every tool validates its parameters with a [`ParamChecker`] and performs
//! one API call, except `create_video_highlight`, which first looks up the
//! video. Results are returned as [`OperationOutput::Raw`] so the dispatcher
//! renders them as pretty-printed JSON text.
//!
//! | Tool                     | API                                            |
//! |--------------------------|------------------------------------------------|
//! | `get_books`              | `GET v2 books/`                                |
//! | `get_highlights`         | `GET v2 highlights/`                           |
//! | `search_highlights`      | `GET v2 highlights/`                           |
//! | `get_tags`               | `GET v2 tags/`                                 |
//! | `create_highlight`       | `POST v2 highlights/`                          |
//! | `update_highlight`       | `PATCH v2 highlights/{id}/`                    |
//! | `delete_highlight`       | `DELETE v2 highlights/{id}/`                   |
//! | `get_documents`          | `GET v3 list/`                                 |
//! | `get_reading_progress`   | `GET v3 list/?id=`                             |
//! | `get_videos`             | `GET v3 list/?category=video`                  |
//! | `get_video`              | `GET v3 list/?id=`                             |
//! | `get_video_position`     | `GET v3 list/?id=`                             |
//! | `update_video_position`  | `PATCH v3 update/{id}/`                        |
//! | `get_video_highlights`   | `GET v3 list/?parent_id=`                      |
//! | `create_video_highlight` | `GET v3 list/?id=`, then `POST v2 highlights/` |
//!
//! [`ParamChecker`]: crate::mcp::ParamChecker
//! [`OperationOutput::Raw`]: crate::mcp::OperationOutput::Raw

mod highlights;
mod reader;
mod video;

pub(crate) use highlights::search as search_highlights;
pub use highlights::{
    CreateHighlight, DeleteHighlight, GetBooks, GetHighlights, GetTags, SearchHighlights,
    UpdateHighlight,
};
pub use reader::{GetDocuments, GetReadingProgress};
pub use video::{
    CreateVideoHighlight, GetVideo, GetVideoHighlights, GetVideoPosition, GetVideos,
    UpdateVideoPosition,
};

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::api::ReadwiseApi;
use crate::mcp::{Registry, RegistryError};

/// Book categories accepted by the highlights API.
pub const BOOK_CATEGORIES: &[&str] = &["books", "articles", "tweets", "supplementals", "podcasts"];

/// Reader document locations.
pub const DOCUMENT_LOCATIONS: &[&str] = &["new", "later", "shortlist", "archive", "feed"];

/// Reader document categories.
pub const DOCUMENT_CATEGORIES: &[&str] = &[
    "article", "email", "rss", "highlight", "note", "pdf", "epub", "tweet", "video",
];

/// Highlight colors the highlights API accepts.
pub const HIGHLIGHT_COLORS: &[&str] = &["yellow", "blue", "pink", "orange", "green", "purple"];

/// Largest page the highlights API serves.
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Builds the tool registry over `api`.
///
/// # Errors
///
/// Returns [`RegistryError::Duplicate`] if two tools share a name.
pub fn registry(api: &Arc<dyn ReadwiseApi>) -> Result<Registry, RegistryError> {
    let mut tools = Registry::tools();
    tools.register(Arc::new(GetBooks::new(Arc::clone(api))))?;
    tools.register(Arc::new(GetHighlights::new(Arc::clone(api))))?;
    tools.register(Arc::new(SearchHighlights::new(Arc::clone(api))))?;
    tools.register(Arc::new(GetTags::new(Arc::clone(api))))?;
    tools.register(Arc::new(CreateHighlight::new(Arc::clone(api))))?;
    tools.register(Arc::new(UpdateHighlight::new(Arc::clone(api))))?;
    tools.register(Arc::new(DeleteHighlight::new(Arc::clone(api))))?;
    tools.register(Arc::new(GetDocuments::new(Arc::clone(api))))?;
    tools.register(Arc::new(GetReadingProgress::new(Arc::clone(api))))?;
    tools.register(Arc::new(GetVideos::new(Arc::clone(api))))?;
    tools.register(Arc::new(GetVideo::new(Arc::clone(api))))?;
    tools.register(Arc::new(GetVideoPosition::new(Arc::clone(api))))?;
    tools.register(Arc::new(UpdateVideoPosition::new(Arc::clone(api))))?;
    tools.register(Arc::new(GetVideoHighlights::new(Arc::clone(api))))?;
    tools.register(Arc::new(CreateVideoHighlight::new(Arc::clone(api))))?;
    Ok(tools)
}

/// Reads a non-empty string parameter.
pub(crate) fn str_param<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Reads an integer parameter.
pub(crate) fn int_param(params: &Map<String, Value>, key: &str) -> Option<i64> {
    params.get(key).and_then(Value::as_i64)
}

/// Reads an identifier given either as a number or a string.
pub(crate) fn id_param(params: &Map<String, Value>, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory API used by the tool and prompt tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::api::{ApiRequest, ReadwiseApi};
    use crate::error::ApiError;

    /// Replays queued responses and records every request.
    #[derive(Default)]
    pub struct ScriptedApi {
        responses: Mutex<VecDeque<Result<Value, ApiError>>>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl ScriptedApi {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, response: Result<Value, ApiError>) -> Self {
            self.responses.lock().unwrap().push_back(response);
            self
        }

        pub fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReadwiseApi for ScriptedApi {
        async fn call(&self, request: ApiRequest) -> Result<Value, ApiError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Value::Null))
        }
    }
}
