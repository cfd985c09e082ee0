use crate::llm::types::{
    CompletionRequest, CompletionResponse, Message, Role, ToolDefinition, ToolResult,
};

/// Per-task transcript. Append-only; owned by one running loop and dropped
/// when the task finishes.
pub struct AgentContext {
    system: String,
    messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    max_steps: usize,
    current_step: usize,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl AgentContext {
    pub fn new(
        system: impl Into<String>,
        prompt: impl Into<String>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            system: system.into(),
            messages: vec![Message::user(prompt)],
            tools,
            max_steps: 10,
            current_step: 0,
            max_tokens: 2048,
            temperature: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn has_steps_left(&self) -> bool {
        self.current_step < self.max_steps
    }

    pub fn increment_step(&mut self) {
        self.current_step += 1;
    }

    /// Record the model's response verbatim, including any recovered call
    /// blocks the loop appended to it.
    pub fn add_model_response(&mut self, response: &CompletionResponse) {
        self.messages.push(Message {
            role: Role::Assistant,
            content: response.content.clone(),
        });
    }

    /// All results of one step go into a single message, in call order.
    pub fn add_tool_results(&mut self, results: Vec<ToolResult>) {
        self.messages.push(Message::tool_results(results));
    }

    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn to_request(&self) -> CompletionRequest {
        CompletionRequest {
            system: self.system.clone(),
            messages: self.messages.clone(),
            tools: self.tools.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}
