//! Turns heterogeneous tool outputs into page references.
//!
//! Workspace tools answer either with JSON (structured content, or JSON
//! serialized into text) or with human-readable lines such as
//! `Page created. ID: 1a2b-3c URL: https://notion.so/1a2b3c`. Both shapes are
//! reduced to a [`PageRef`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::{SideEffect, ToolOutput, ToolPayload};

// Static compiled regexes for the human-readable result lines.
static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ID:\s*([a-zA-Z0-9-]+)").unwrap());
static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"URL:\s*(https?://[^\s,]+)").unwrap());

/// Identifier and link extracted from a tool output. Either may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRef {
    pub id: Option<String>,
    pub url: Option<String>,
}

/// A workspace page created during a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// String ids pass through; numeric ids are rendered. Empty strings, `null`
/// and other shapes count as missing.
fn id_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn from_json(value: &Value) -> PageRef {
    // Lookup tools answer `{"found": true, "id": ...}`, which the top-level
    // check already covers; `found` without an id is not a hit.
    let id = id_value(value.get("id"))
        .or_else(|| id_value(value.get("results")?.get(0)?.get("id")))
        .or_else(|| {
            is_truthy(value.get("found"))
                .then(|| id_value(value.get("id")))
                .flatten()
        });
    let url = value
        .get("url")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    PageRef { id, url }
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extract a page reference from a tool output.
///
/// Structured payloads are read as JSON directly. Text is first parsed as
/// JSON; when that yields no id, the `ID:`/`URL:` line patterns are tried.
/// Pure and deterministic: the same output always yields the same reference.
pub fn extract_page_ref(output: &ToolOutput) -> PageRef {
    match &output.payload {
        ToolPayload::Structured(value) => from_json(value),
        ToolPayload::Text(text) => {
            let mut page = serde_json::from_str::<Value>(text)
                .map(|value| from_json(&value))
                .unwrap_or_default();
            if page.id.is_none() {
                page.id = capture(&ID_PATTERN, text);
                if page.url.is_none() {
                    page.url = capture(&URL_PATTERN, text);
                }
            }
            page
        }
    }
}

/// Record a created page for a successful call to a state-creating tool.
///
/// Read-only tools, tool-reported errors and outputs with no id never
/// produce a record.
pub fn created_page(side_effect: SideEffect, output: &ToolOutput) -> Option<CreatedPage> {
    if side_effect != SideEffect::CreatesState || output.is_error {
        return None;
    }
    let PageRef { id, url } = extract_page_ref(output);
    id.map(|id| CreatedPage { id, url })
}
