//! Model Context Protocol client for the workspace tool server.
//!
//! The Notion tools (`notion_search`, `notion_create_page`, ...) live behind an
//! MCP server reached over streamable HTTP. This module performs the
//! handshake, discovers the tools and wraps each one as a [`Tool`] whose
//! side-effect class comes from the caller's list of creating tool names.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Error;
use crate::llm::types::ToolDefinition;
use crate::tool::{SideEffect, Tool, ToolOutput};

const PROTOCOL_VERSION: &str = "2025-06-18";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SESSION_HEADER: &str = "Mcp-Session-Id";

#[derive(Debug, Serialize)]
struct JsonRpcMessage<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    /// `None` for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct McpToolDef {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct McpToolsListResult {
    tools: Vec<McpToolDef>,
}

#[derive(Debug, Deserialize)]
struct McpContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct McpCallToolResult {
    #[serde(default)]
    content: Vec<McpContent>,
    #[serde(default)]
    structured_content: Option<Value>,
    #[serde(default)]
    is_error: bool,
}

/// Collect the `data:` payloads of a `text/event-stream` body, one per event.
fn extract_sse_events(body: &str) -> Result<Vec<String>, Error> {
    let mut events = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in body.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                events.push(current.join("\n"));
                current.clear();
            }
        } else if let Some(rest) = line.strip_prefix("data:") {
            current.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if !current.is_empty() {
        events.push(current.join("\n"));
    }

    if events.is_empty() {
        return Err(Error::Mcp("No data field in SSE response".into()));
    }
    Ok(events)
}

/// Pick the event answering request `id`, else the last one (some servers
/// drop the id on error responses).
fn find_rpc_response(events: Vec<String>, id: u64) -> Result<String, Error> {
    let matching = events.iter().position(|event| {
        serde_json::from_str::<Value>(event)
            .ok()
            .and_then(|v| v.get("id").and_then(Value::as_u64))
            == Some(id)
    });
    match matching {
        Some(idx) => Ok(events.into_iter().nth(idx).unwrap_or_default()),
        None => events
            .into_iter()
            .last()
            .ok_or_else(|| Error::Mcp("No events in SSE response".into())),
    }
}

/// Prefer `structuredContent` when the server sends it; otherwise join the
/// text parts. Non-text parts (images, resources) are dropped.
fn call_result_to_output(result: McpCallToolResult) -> ToolOutput {
    let text = || {
        result
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    };

    match (result.is_error, &result.structured_content) {
        (true, _) => ToolOutput::error(text()),
        (false, Some(value)) => ToolOutput::structured(value.clone()),
        (false, None) => ToolOutput::success(text()),
    }
}

fn to_definition(tool: &McpToolDef) -> ToolDefinition {
    ToolDefinition {
        name: tool.name.clone(),
        description: tool.description.clone().unwrap_or_default(),
        input_schema: tool
            .input_schema
            .clone()
            .unwrap_or_else(|| serde_json::json!({"type": "object"})),
    }
}

struct McpSession {
    client: reqwest::Client,
    endpoint: String,
    session_id: RwLock<Option<String>>,
    next_id: AtomicU64,
    auth_header: Option<String>,
}

impl McpSession {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn post(&self, message: &JsonRpcMessage<'_>) -> Result<reqwest::Response, Error> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json, text/event-stream")
            .json(message);

        let session_id = self
            .session_id
            .read()
            .map_err(|e| Error::Mcp(format!("Lock poisoned: {e}")))?
            .clone();
        if let Some(sid) = session_id {
            builder = builder.header(SESSION_HEADER, sid);
        }
        if let Some(auth) = &self.auth_header {
            builder = builder.header("Authorization", auth);
        }

        let response = builder.send().await?;
        if let Some(sid) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self
                .session_id
                .write()
                .map_err(|e| Error::Mcp(format!("Lock poisoned: {e}")))? = Some(sid.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Mcp(format!(
                "{} HTTP {}: {}",
                message.method,
                status.as_u16(),
                body
            )));
        }
        Ok(response)
    }

    async fn rpc(&self, method: &str, params: Option<Value>) -> Result<Value, Error> {
        let id = self.next_id();
        let response = self
            .post(&JsonRpcMessage {
                jsonrpc: "2.0",
                method,
                params,
                id: Some(id),
            })
            .await?;

        let is_sse = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));
        let body = response.text().await?;
        let json = if is_sse {
            find_rpc_response(extract_sse_events(&body)?, id)?
        } else {
            body
        };

        let rpc: JsonRpcResponse = serde_json::from_str(&json)?;
        if let Some(err) = rpc.error {
            return Err(Error::Mcp(format!(
                "JSON-RPC error {}: {}",
                err.code, err.message
            )));
        }
        rpc.result
            .ok_or_else(|| Error::Mcp("Response missing both result and error".into()))
    }

    async fn notify(&self, method: &str) -> Result<(), Error> {
        self.post(&JsonRpcMessage {
            jsonrpc: "2.0",
            method,
            params: None,
            id: None,
        })
        .await
        .map(|_| ())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, Error> {
        // Servers expect an object; models sometimes send null for no-arg tools.
        let arguments = if arguments.is_null() {
            serde_json::json!({})
        } else {
            arguments
        };
        let result = self
            .rpc(
                "tools/call",
                Some(serde_json::json!({"name": name, "arguments": arguments})),
            )
            .await?;
        let result: McpCallToolResult = serde_json::from_value(result)?;
        Ok(call_result_to_output(result))
    }
}

struct McpTool {
    session: Arc<McpSession>,
    def: ToolDefinition,
    side_effect: SideEffect,
}

impl Tool for McpTool {
    fn definition(&self) -> ToolDefinition {
        self.def.clone()
    }

    fn side_effect(&self) -> SideEffect {
        self.side_effect
    }

    fn execute(
        &self,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, Error>> + Send + '_>> {
        // Transport failures propagate so the loop can report them as
        // execution errors to the model.
        Box::pin(self.session.call_tool(&self.def.name, input))
    }
}

/// Connected MCP tool server.
pub struct McpClient {
    session: Arc<McpSession>,
    tools: Vec<McpToolDef>,
}

impl McpClient {
    /// Connect and discover tools: `initialize` → `notifications/initialized`
    /// → `tools/list`.
    ///
    /// `auth_header` is sent verbatim as the `Authorization` header.
    pub async fn connect(endpoint: &str, auth_header: Option<String>) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let session = Arc::new(McpSession {
            client,
            endpoint: endpoint.to_string(),
            session_id: RwLock::new(None),
            next_id: AtomicU64::new(0),
            auth_header,
        });

        session
            .rpc(
                "initialize",
                Some(serde_json::json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                })),
            )
            .await?;
        session.notify("notifications/initialized").await?;

        let listed: McpToolsListResult =
            serde_json::from_value(session.rpc("tools/list", None).await?)?;
        info!(
            endpoint,
            tools = listed.tools.len(),
            "connected to MCP tool server"
        );

        Ok(Self {
            session,
            tools: listed.tools,
        })
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(to_definition).collect()
    }

    /// Wrap the discovered tools. Tools named in `creates_state` are declared
    /// [`SideEffect::CreatesState`]; all others are read-only.
    pub fn into_tools<S: AsRef<str>>(self, creates_state: &[S]) -> Vec<Arc<dyn Tool>> {
        let creating: HashSet<&str> = creates_state.iter().map(AsRef::as_ref).collect();
        self.tools
            .iter()
            .map(|t| {
                let side_effect = if creating.contains(t.name.as_str()) {
                    SideEffect::CreatesState
                } else {
                    SideEffect::ReadOnly
                };
                debug!(tool = %t.name, ?side_effect, "registering MCP tool");
                Arc::new(McpTool {
                    session: Arc::clone(&self.session),
                    def: to_definition(t),
                    side_effect,
                }) as Arc<dyn Tool>
            })
            .collect()
    }
}
