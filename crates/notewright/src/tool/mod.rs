pub mod mcp;
pub mod registry;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::llm::types::ToolDefinition;

/// Declared side-effect class of a tool.
///
/// Only `CreatesState` tools can produce created-page records; a read-only
/// search never does, even when its output carries page ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    #[default]
    ReadOnly,
    CreatesState,
}

/// Raw value returned by a tool: free text or a structured payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    Text(String),
    Structured(serde_json::Value),
}

/// Output of a tool execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub payload: ToolPayload,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            payload: ToolPayload::Text(content.into()),
            is_error: false,
        }
    }

    pub fn structured(value: serde_json::Value) -> Self {
        Self {
            payload: ToolPayload::Structured(value),
            is_error: false,
        }
    }

    /// A tool-reported failure (the tool ran, but says it did not succeed).
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            payload: ToolPayload::Text(content.into()),
            is_error: true,
        }
    }

    /// Text form of the payload, as it is written into the transcript.
    pub fn render(&self) -> String {
        match &self.payload {
            ToolPayload::Text(text) => text.clone(),
            ToolPayload::Structured(value) => value.to_string(),
        }
    }
}

/// Trait for tools the model can invoke.
///
/// Uses `Pin<Box<dyn Future>>` return type for dyn-compatibility,
/// allowing tools to be stored as `Arc<dyn Tool>`.
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    fn side_effect(&self) -> SideEffect {
        SideEffect::ReadOnly
    }

    fn execute(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, Error>> + Send + '_>>;
}
