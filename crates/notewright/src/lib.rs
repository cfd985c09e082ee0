pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod tool;
pub mod workflow;

pub use agent::detector::{CompletionDetector, HeuristicDetector, Verdict};
pub use agent::fallback::FallbackResolver;
pub use agent::normalize::{CreatedPage, PageRef, created_page, extract_page_ref};
pub use agent::{AgentRunner, STALLED_OUTCOME, TaskOutput};
pub use config::{AgentConfig, NotewrightConfig, ProviderConfig, WorkspaceConfig};
pub use error::Error;
pub use llm::LlmProvider;
pub use llm::openai::OpenAiCompatProvider;
pub use llm::types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, Role, StopReason, TokenUsage,
    ToolCall, ToolDefinition, ToolResult,
};
pub use tool::mcp::McpClient;
pub use tool::registry::{Dispatch, FailureKind, ToolFailure, ToolRegistry};
pub use tool::{SideEffect, Tool, ToolOutput, ToolPayload};
pub use workflow::prompt::{EXECUTION_SYSTEM_PROMPT, build_task_prompt};
pub use workflow::types::{ExecutionState, LearnerProfile, OcrResult, Task, TaskKind};
pub use workflow::{RunReport, StepSummary, Workflow};
