use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::config::ProviderConfig;
use crate::error::Error;
use crate::llm::LlmProvider;
use crate::llm::types::{
    CompletionRequest, CompletionResponse, ContentBlock, Role, StopReason, TokenUsage,
    ToolDefinition,
};

pub const DEFAULT_BASE_URL: &str = "https://aistudio.baidu.com/llm/lmapi/v3";
pub const DEFAULT_MODEL: &str = "ernie-4.5-turbo-vl";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Provider for any OpenAI-compatible `chat/completions` endpoint.
///
/// The default endpoint is Baidu AI Studio's ERNIE gateway; point `base_url`
/// elsewhere for other compatible services.
pub struct OpenAiCompatProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
            model: model.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build a provider from configuration, resolving the API key from the
    /// environment variable named in `config.api_key_env`.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, Error> {
        let api_key = config.api_key_from(|name| std::env::var(name).ok())?;
        Ok(Self::new(api_key, &config.model)?.with_base_url(&config.base_url))
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl LlmProvider for OpenAiCompatProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        let body = build_openai_request(&self.model, &request);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Do not echo auth failure bodies; some gateways reflect the key.
            let message = if status.as_u16() == 401 || status.as_u16() == 403 {
                format!("authentication failed (HTTP {})", status.as_u16())
            } else {
                response
                    .text()
                    .await
                    .unwrap_or_else(|e| format!("<body read error: {e}>"))
            };
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: OpenAiResponse = response.json().await?;
        into_completion_response(api_response)
    }

    fn model_name(&self) -> Option<&str> {
        Some(&self.model)
    }
}

// --- Request building: transcript → OpenAI format ---

fn build_openai_request(model: &str, request: &CompletionRequest) -> serde_json::Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if !request.system.is_empty() {
        messages.push(serde_json::json!({
            "role": "system",
            "content": request.system,
        }));
    }

    for msg in &request.messages {
        match msg.role {
            Role::User => push_user_message(&mut messages, &msg.content),
            Role::Assistant => messages.push(assistant_message(&msg.content)),
        }
    }

    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens,
    });

    if let Some(temperature) = request.temperature {
        body["temperature"] = serde_json::json!(temperature);
    }

    if !request.tools.is_empty() {
        let tools: Vec<serde_json::Value> = request.tools.iter().map(tool_to_openai).collect();
        body["tools"] = serde_json::Value::Array(tools);
    }

    body
}

/// Tool results become individual `tool` messages (they must directly follow
/// the assistant turn that issued the calls); text blocks are merged into one
/// `user` message after them.
fn push_user_message(messages: &mut Vec<serde_json::Value>, content: &[ContentBlock]) {
    let mut text_parts = Vec::new();
    for block in content {
        match block {
            ContentBlock::Text { text } => text_parts.push(text.as_str()),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => messages.push(serde_json::json!({
                "role": "tool",
                "tool_call_id": tool_use_id,
                "content": content,
            })),
            ContentBlock::ToolUse { .. } => {}
        }
    }
    if !text_parts.is_empty() {
        messages.push(serde_json::json!({
            "role": "user",
            "content": text_parts.join("\n\n"),
        }));
    }
}

fn assistant_message(content: &[ContentBlock]) -> serde_json::Value {
    let text: String = content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    let tool_calls: Vec<serde_json::Value> = content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => Some(serde_json::json!({
                "id": id,
                "type": "function",
                "function": {
                    "name": name,
                    "arguments": input.to_string(),
                }
            })),
            _ => None,
        })
        .collect();

    let mut msg = serde_json::json!({
        "role": "assistant",
        "content": if text.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::Value::String(text)
        },
    });
    if !tool_calls.is_empty() {
        msg["tool_calls"] = serde_json::Value::Array(tool_calls);
    }
    msg
}

fn tool_to_openai(tool: &ToolDefinition) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

// --- Response parsing: OpenAI format → our types ---

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunction,
}

#[derive(Deserialize)]
struct OpenAiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

fn into_completion_response(api: OpenAiResponse) -> Result<CompletionResponse, Error> {
    let choice = api.choices.into_iter().next().ok_or_else(|| Error::Api {
        status: 0,
        message: "empty choices array in response".into(),
    })?;

    let mut content = Vec::new();

    if let Some(text) = choice.message.content
        && !text.is_empty()
    {
        content.push(ContentBlock::Text { text });
    }

    for tc in choice.message.tool_calls.unwrap_or_default() {
        let input = if tc.function.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&tc.function.arguments).unwrap_or_else(|e| {
                warn!(
                    tool = %tc.function.name,
                    error = %e,
                    "malformed tool arguments JSON, defaulting to empty object"
                );
                serde_json::json!({})
            })
        };
        content.push(ContentBlock::ToolUse {
            id: tc.id,
            name: tc.function.name,
            input,
        });
    }

    let stop_reason = match choice.finish_reason.as_deref() {
        Some("stop") | None => StopReason::EndTurn,
        Some("tool_calls") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        Some(other) => {
            warn!(
                finish_reason = other,
                "unknown finish_reason, treating as EndTurn"
            );
            StopReason::EndTurn
        }
    };

    let usage = api.usage.map_or(TokenUsage::default(), |u| TokenUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });

    Ok(CompletionResponse {
        content,
        stop_reason,
        usage,
    })
}
