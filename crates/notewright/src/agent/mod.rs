pub mod context;
pub mod detector;
pub mod fallback;
pub mod normalize;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::llm::LlmProvider;
use crate::llm::types::{ContentBlock, TokenUsage, ToolCall};
use crate::tool::registry::{Dispatch, ToolRegistry};
use crate::workflow::types::Task;

use self::context::AgentContext;
use self::detector::{CompletionDetector, HeuristicDetector, Verdict};
use self::fallback::FallbackResolver;
use self::normalize::{CreatedPage, created_page};

/// Content returned when a task runs out of steps. Callers that need to tell
/// it apart from a model answer compare `model_calls` with the cap.
pub const STALLED_OUTCOME: &str = "Task execution stopped due to maximum step limit.";

/// Output of one task execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    pub content: String,
    /// Pages created by this task, in creation order.
    pub created_pages: Vec<CreatedPage>,
    pub model_calls: usize,
    pub tool_calls_made: usize,
    pub tokens_used: TokenUsage,
}

/// Runs one task: model call → tool dispatch → repeat until the model
/// finishes or the step cap is reached.
///
/// Each call to [`AgentRunner::execute`] owns a fresh transcript; the runner
/// itself holds only configuration and shared handles.
pub struct AgentRunner<P: LlmProvider> {
    provider: Arc<P>,
    name: String,
    system_prompt: String,
    registry: Arc<ToolRegistry>,
    max_steps: usize,
    max_tokens: u32,
    temperature: Option<f32>,
    resolver: FallbackResolver,
    detector: Arc<dyn CompletionDetector>,
}

impl<P: LlmProvider> AgentRunner<P> {
    pub fn builder(provider: Arc<P>) -> AgentRunnerBuilder<P> {
        AgentRunnerBuilder {
            provider,
            name: String::new(),
            system_prompt: String::new(),
            registry: Arc::new(ToolRegistry::default()),
            max_steps: 10,
            max_tokens: 2048,
            temperature: None,
            resolver: FallbackResolver::default(),
            detector: Arc::new(HeuristicDetector),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Execute `task` starting from the rendered `prompt`.
    ///
    /// Tool failures are reported to the model and never end the run. Model
    /// transport failures are returned as `Err`.
    pub async fn execute(&self, task: &Task, prompt: &str) -> Result<TaskOutput, Error> {
        let mut ctx = AgentContext::new(
            &self.system_prompt,
            prompt,
            self.registry.definitions().to_vec(),
        )
        .with_max_steps(self.max_steps)
        .with_max_tokens(self.max_tokens)
        .with_temperature(self.temperature);

        let mut created_pages: Vec<CreatedPage> = Vec::new();
        let mut tool_calls_made = 0usize;
        let mut total_usage = TokenUsage::default();

        while ctx.has_steps_left() {
            ctx.increment_step();
            let step = ctx.current_step();
            debug!(agent = %self.name, task = %task.id, step, max_steps = ctx.max_steps(), "executing step");

            let mut response = self.provider.complete(ctx.to_request()).await?;
            total_usage += response.usage;

            let mut tool_calls = response.tool_calls();
            let content = response.text();

            // Structured calls always take precedence over recovered ones.
            if tool_calls.is_empty()
                && content.trim_start().starts_with('{')
                && let Some(call) = self.resolver.resolve(&content)
            {
                info!(agent = %self.name, task = %task.id, tool = %call.name, call_id = %call.id, "recovered tool call from response text");
                response.content.push(ContentBlock::from(call.clone()));
                tool_calls.push(call);
            }

            ctx.add_model_response(&response);

            if !tool_calls.is_empty() {
                tool_calls_made += tool_calls.len();
                let results = self.dispatch_sequential(&tool_calls, &mut created_pages).await;
                ctx.add_tool_results(results);
                continue;
            }

            match self
                .detector
                .classify(&content, task.kind, created_pages.len())
            {
                Verdict::NeedsCorrection => {
                    warn!(agent = %self.name, task = %task.id, step, "model claimed an action without a tool call, correcting");
                    ctx.add_user_message(self.detector.correction());
                }
                verdict => {
                    debug!(agent = %self.name, task = %task.id, step, ?verdict, "task finished");
                    return Ok(TaskOutput {
                        content,
                        created_pages,
                        model_calls: step,
                        tool_calls_made,
                        tokens_used: total_usage,
                    });
                }
            }
        }

        warn!(agent = %self.name, task = %task.id, max_steps = ctx.max_steps(), "task reached step limit");
        Ok(TaskOutput {
            content: STALLED_OUTCOME.to_string(),
            created_pages,
            model_calls: ctx.current_step(),
            tool_calls_made,
            tokens_used: total_usage,
        })
    }

    /// Dispatch calls one at a time, in emission order, collecting one result
    /// per call. Later calls may depend on earlier side effects.
    async fn dispatch_sequential(
        &self,
        calls: &[ToolCall],
        created_pages: &mut Vec<CreatedPage>,
    ) -> Vec<crate::llm::types::ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let dispatch = self.registry.dispatch(call).await;
            if let Dispatch::Success {
                output,
                side_effect,
            } = &dispatch
                && let Some(page) = created_page(*side_effect, output)
            {
                info!(agent = %self.name, tool = %call.name, call_id = %call.id, page_id = %page.id, "workspace page created");
                created_pages.push(page);
            }
            results.push(dispatch.into_result(call.id.clone()));
        }
        results
    }
}

pub struct AgentRunnerBuilder<P: LlmProvider> {
    provider: Arc<P>,
    name: String,
    system_prompt: String,
    registry: Arc<ToolRegistry>,
    max_steps: usize,
    max_tokens: u32,
    temperature: Option<f32>,
    resolver: FallbackResolver,
    detector: Arc<dyn CompletionDetector>,
}

impl<P: LlmProvider> AgentRunnerBuilder<P> {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Active tool set. The model sees exactly these definitions.
    pub fn registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn fallback_resolver(mut self, resolver: FallbackResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn detector(mut self, detector: Arc<dyn CompletionDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn build(self) -> Result<AgentRunner<P>, Error> {
        if self.max_steps == 0 {
            return Err(Error::Config("max_steps must be at least 1".into()));
        }
        if self.max_tokens == 0 {
            return Err(Error::Config("max_tokens must be at least 1".into()));
        }

        Ok(AgentRunner {
            provider: self.provider,
            name: self.name,
            system_prompt: self.system_prompt,
            registry: self.registry,
            max_steps: self.max_steps,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            resolver: self.resolver,
            detector: self.detector,
        })
    }
}
