use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::types::{ToolCall, ToolDefinition, ToolResult};
use crate::tool::{SideEffect, Tool, ToolOutput};

/// Why a dispatched call produced no tool output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The model named a tool outside the active registry.
    NotFound,
    /// The tool raised while executing.
    Execution,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    pub tool: String,
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::NotFound => write!(f, "Error: Tool {} not found.", self.tool),
            FailureKind::Execution => {
                write!(f, "Error executing {}: {}", self.tool, self.message)
            }
        }
    }
}

/// Tagged outcome of dispatching one call. Stringified only by
/// [`Dispatch::into_result`], at the transcript boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Success {
        output: ToolOutput,
        side_effect: SideEffect,
    },
    Failure(ToolFailure),
}

impl Dispatch {
    pub fn into_result(self, call_id: impl Into<String>) -> ToolResult {
        match self {
            Dispatch::Success { output, .. } if output.is_error => {
                ToolResult::error(call_id, output.render())
            }
            Dispatch::Success { output, .. } => ToolResult::success(call_id, output.render()),
            Dispatch::Failure(failure) => ToolResult::error(call_id, failure.to_string()),
        }
    }
}

/// Named set of tools available to the model.
///
/// Definitions keep registration order so the model sees a stable tool list.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    definitions: Vec<ToolDefinition>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        let mut registry = Self::default();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    /// Add a tool. A later tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let def = tool.definition();
        if let Some(existing) = self.definitions.iter_mut().find(|d| d.name == def.name) {
            warn!(tool = %def.name, "duplicate tool name, replacing earlier registration");
            *existing = def.clone();
        } else {
            self.definitions.push(def.clone());
        }
        self.tools.insert(def.name, tool);
    }

    /// Restrict the registry to the named tools, keeping registration order.
    /// Names with no matching tool are logged and skipped.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Self {
        for name in names {
            if !self.tools.contains_key(name.as_ref()) {
                warn!(tool = name.as_ref(), "requested tool is not registered");
            }
        }
        let keep = |def: &ToolDefinition| names.iter().any(|n| n.as_ref() == def.name);
        Self::new(
            self.definitions
                .iter()
                .filter(|def| keep(*def))
                .filter_map(|def| self.tools.get(&def.name).cloned()),
        )
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn side_effect(&self, name: &str) -> Option<SideEffect> {
        self.tools.get(name).map(|t| t.side_effect())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Invoke the tool named by `call`. Never fails: unknown tools and
    /// execution errors come back as [`Dispatch::Failure`].
    pub async fn dispatch(&self, call: &ToolCall) -> Dispatch {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "model called unknown tool");
            return Dispatch::Failure(ToolFailure {
                tool: call.name.clone(),
                kind: FailureKind::NotFound,
                message: "not registered".into(),
            });
        };

        debug!(tool = %call.name, call_id = %call.id, "executing tool");
        match tool.execute(call.input.clone()).await {
            Ok(output) => Dispatch::Success {
                output,
                side_effect: tool.side_effect(),
            },
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "tool execution failed");
                Dispatch::Failure(ToolFailure {
                    tool: call.name.clone(),
                    kind: FailureKind::Execution,
                    message: e.to_string(),
                })
            }
        }
    }
}
