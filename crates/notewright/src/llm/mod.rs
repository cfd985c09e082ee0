pub mod openai;
pub mod types;

use crate::llm::types::{CompletionRequest, CompletionResponse};

/// Trait for chat model providers.
///
/// Implementors must be `Send + Sync` so a single provider handle can be
/// constructed once and shared by reference across task executions.
pub trait LlmProvider: Send + Sync {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, crate::error::Error>> + Send;

    /// Model identifier, when the provider knows it statically.
    fn model_name(&self) -> Option<&str> {
        None
    }
}
