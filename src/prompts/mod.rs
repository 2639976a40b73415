//! Built-in prompts.
//!
//! Prompts fetch highlights and assemble a single text message for the
//! model. They return [`OperationOutput::Content`], which the dispatcher
//! passes through unchanged.
//!
//! [`OperationOutput::Content`]: crate::mcp::OperationOutput::Content

mod highlight;
mod search;

pub use highlight::HighlightPrompt;
pub use search::SearchPrompt;

use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::Value;

use crate::api::ReadwiseApi;
use crate::mcp::{Registry, RegistryError};

/// Highlights included when no limit is given.
pub const DEFAULT_LIMIT: i64 = 10;

/// Most highlights a prompt will include.
pub const MAX_LIMIT: i64 = 100;

/// Builds the prompt registry over `api`.
///
/// # Errors
///
/// Returns [`RegistryError::Duplicate`] if two prompts share a name.
pub fn registry(api: &Arc<dyn ReadwiseApi>) -> Result<Registry, RegistryError> {
    let mut prompts = Registry::prompts();
    prompts.register(Arc::new(HighlightPrompt::new(Arc::clone(api))))?;
    prompts.register(Arc::new(SearchPrompt::new(Arc::clone(api))))?;
    Ok(prompts)
}

/// Renders highlights as a numbered list with their notes.
pub(crate) fn render_highlights(highlights: &[Value]) -> String {
    let mut out = String::new();
    for (index, highlight) in highlights.iter().enumerate() {
        let text = highlight
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim();
        let _ = writeln!(out, "{}. \"{text}\"", index + 1);

        if let Some(note) = highlight
            .get("note")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
        {
            let _ = writeln!(out, "   Note: {note}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tools::testing::ScriptedApi;

    #[test]
    fn registry_holds_both_prompts() {
        let api: Arc<dyn ReadwiseApi> = Arc::new(ScriptedApi::new());
        let prompts = registry(&api).unwrap();
        assert_eq!(prompts.names(), vec!["readwise_highlight", "readwise_search"]);
        assert_eq!(prompts.kind(), "prompt");
    }

    #[test]
    fn render_numbers_highlights_and_keeps_notes() {
        let rendered = render_highlights(&[
            json!({"text": " First ", "note": ""}),
            json!({"text": "Second", "note": "why it matters"}),
        ]);
        assert_eq!(
            rendered,
            "1. \"First\"\n2. \"Second\"\n   Note: why it matters\n"
        );
    }
}
