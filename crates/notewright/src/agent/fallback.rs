use serde_json::Value;
use tracing::debug;

use crate::llm::types::ToolCall;

/// Tool the resolver targets when a model writes page arguments as bare JSON.
pub const DEFAULT_PAGE_CREATION_TOOL: &str = "notion_create_page";

/// Recovers a tool call from a text-only model response that carries the
/// call as JSON instead of a structured tool-use block.
///
/// Two shapes are recognized:
/// - `{"tool_name": "...", "arguments": {...}}`
/// - bare page arguments with `title`, `content` and `parentPageId` or
///   `pageId`, routed to the page-creation tool.
///
/// The resolver does not consult the registry. An unknown `tool_name` is
/// returned as-is and fails at dispatch like any other unknown call.
#[derive(Debug, Clone)]
pub struct FallbackResolver {
    page_creation_tool: String,
}

impl Default for FallbackResolver {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_CREATION_TOOL)
    }
}

impl FallbackResolver {
    pub fn new(page_creation_tool: impl Into<String>) -> Self {
        Self {
            page_creation_tool: page_creation_tool.into(),
        }
    }

    pub fn page_creation_tool(&self) -> &str {
        &self.page_creation_tool
    }

    /// Returns `None` unless the trimmed text starts with `{` and the span
    /// from the first `{` to the last `}` parses into a recognized shape.
    pub fn resolve(&self, text: &str) -> Option<ToolCall> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        let end = trimmed.rfind('}')?;
        let candidate = &trimmed[..=end];

        let parsed: Value = match serde_json::from_str(candidate) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "response text looked like JSON but did not parse");
                return None;
            }
        };

        let (name, input) = if let Some(name) = parsed.get("tool_name").and_then(Value::as_str)
            && !name.is_empty()
            && let Some(arguments) = parsed.get("arguments").filter(|a| a.is_object())
        {
            (name.to_string(), arguments.clone())
        } else if has_page_arguments(&parsed) {
            (self.page_creation_tool.clone(), parsed)
        } else {
            debug!("JSON response text matched no tool call shape");
            return None;
        };

        debug!(tool = %name, "recovered tool call from response text");
        Some(ToolCall {
            id: format!("recovered_{}", uuid::Uuid::new_v4()),
            name,
            input,
        })
    }
}

fn has_page_arguments(value: &Value) -> bool {
    let present = |key: &str| value.get(key).is_some_and(|v| !is_empty(v));
    present("title") && present("content") && (present("parentPageId") || present("pageId"))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Bool(b) => !b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrapper_shape_becomes_named_call() {
        let call = FallbackResolver::default()
            .resolve(r#"{"tool_name":"search_tool","arguments":{"query":"x"}}"#)
            .unwrap();
        assert_eq!(call.name, "search_tool");
        assert_eq!(call.input, json!({"query": "x"}));
        assert!(call.id.starts_with("recovered_"));
    }

    #[test]
    fn bare_page_arguments_target_page_creation_tool() {
        let text = r##"{"parentPageId":"p-1","title":"Linear functions","content":"# Notes"}"##;
        let call = FallbackResolver::default().resolve(text).unwrap();
        assert_eq!(call.name, "notion_create_page");
        assert_eq!(
            call.input,
            json!({"parentPageId": "p-1", "title": "Linear functions", "content": "# Notes"})
        );
    }

    #[test]
    fn page_id_also_qualifies_and_tool_is_configurable() {
        let resolver = FallbackResolver::new("workspace_create_page");
        let call = resolver
            .resolve(r#"{"pageId":"p-2","title":"T","content":"C"}"#)
            .unwrap();
        assert_eq!(call.name, "workspace_create_page");
    }

    #[test]
    fn trailing_prose_after_last_brace_is_ignored() {
        let text = "  {\"tool_name\":\"notion_search\",\"arguments\":{\"query\":\"sophie\"}}\nCalling now.";
        let call = FallbackResolver::default().resolve(text).unwrap();
        assert_eq!(call.name, "notion_search");
    }

    #[test]
    fn text_not_starting_with_brace_is_ignored() {
        let text = r#"Here you go: {"tool_name":"notion_search","arguments":{}}"#;
        assert!(FallbackResolver::default().resolve(text).is_none());
    }

    #[test]
    fn malformed_or_unrecognized_json_is_ignored() {
        let resolver = FallbackResolver::default();
        assert!(resolver.resolve("{not json}").is_none());
        assert!(resolver.resolve("{").is_none());
        assert!(resolver.resolve(r#"{"title":"T","content":"C"}"#).is_none());
        assert!(resolver.resolve(r#"{"tool_name":"notion_search"}"#).is_none());
        assert!(resolver.resolve(r#"{"answer":42}"#).is_none());
    }

    #[test]
    fn wrapper_arguments_must_be_an_object() {
        let resolver = FallbackResolver::default();
        for arguments in ["null", "false", "\"\"", "0", "[]", "\"{}\""] {
            let text = format!(r#"{{"tool_name":"notion_search","arguments":{arguments}}}"#);
            assert!(resolver.resolve(&text).is_none(), "accepted {arguments}");
        }
        let call = resolver
            .resolve(r#"{"tool_name":"notion_search","arguments":{}}"#)
            .unwrap();
        assert_eq!(call.input, json!({}));
    }

    #[test]
    fn synthesized_ids_are_unique() {
        let resolver = FallbackResolver::default();
        let text = r#"{"tool_name":"notion_search","arguments":{}}"#;
        let a = resolver.resolve(text).unwrap();
        let b = resolver.resolve(text).unwrap();
        assert_ne!(a.id, b.id);
    }
}
