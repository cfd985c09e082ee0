pub mod prompt;
pub mod types;

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::agent::AgentRunner;
use crate::agent::normalize::CreatedPage;
use crate::error::Error;
use crate::llm::LlmProvider;
use crate::llm::types::TokenUsage;

use self::prompt::build_task_prompt;
use self::types::{ExecutionState, Task};

/// One entry of the run summary shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSummary {
    pub title: String,
    pub status: String,
    pub details: String,
}

/// Result of running every task in an [`ExecutionState`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub page_ids: Vec<String>,
    pub created_pages: Vec<CreatedPage>,
    pub contents: Vec<String>,
    pub steps: Vec<StepSummary>,
    pub tokens_used: TokenUsage,
}

/// Executes planned tasks strictly in order, one agent loop per task.
pub struct Workflow<P: LlmProvider> {
    runner: Arc<AgentRunner<P>>,
    preview_chars: usize,
}

impl<P: LlmProvider> Workflow<P> {
    pub fn new(runner: Arc<AgentRunner<P>>) -> Self {
        Self {
            runner,
            preview_chars: 500,
        }
    }

    /// Length of each earlier result quoted in later task prompts.
    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    /// Run the remaining tasks of `state`. State is updated once per task,
    /// after that task's loop has finished.
    pub async fn run(&self, mut state: ExecutionState) -> Result<RunReport, Error> {
        let mut tokens_used = TokenUsage::default();

        while let Some(task) = state.current_task().cloned() {
            info!(
                task = %task.id,
                kind = %task.kind,
                index = state.current_task_index(),
                total = state.tasks.len(),
                "executing task"
            );
            let prompt = build_task_prompt(&state, &task, self.preview_chars);
            let output = self
                .runner
                .execute(&task, &prompt)
                .await
                .map_err(|e| Error::Workflow(format!("task {} failed: {e}", task.id)))?;
            tokens_used += output.tokens_used;

            info!(
                task = %task.id,
                model_calls = output.model_calls,
                tool_calls = output.tool_calls_made,
                pages = output.created_pages.len(),
                "task finished"
            );
            let content = with_page_links(output.content, &output.created_pages);
            state.apply_outcome(content, output.created_pages);
        }

        Ok(report(&state, tokens_used))
    }
}

/// Append a links line for pages created by the task. Content is returned
/// unchanged when no page was created.
pub fn with_page_links(content: String, pages: &[CreatedPage]) -> String {
    if pages.is_empty() {
        return content;
    }
    let links = pages
        .iter()
        .map(|page| match &page.url {
            Some(url) => format!("[📄 查看 Notion 页面]({url})"),
            None => format!("[📄 页面 ID: {}](#)", page.id),
        })
        .collect::<Vec<_>>()
        .join("  ");
    format!("{content}\n\n> **相关链接**：{links}")
}

fn task_step(task: &Task) -> StepSummary {
    StepSummary {
        title: task.description.clone(),
        status: "completed".into(),
        details: format!("Type: {}. Priority: {}.", task.kind, task.priority),
    }
}

fn report(state: &ExecutionState, tokens_used: TokenUsage) -> RunReport {
    let done = state.current_task_index().min(state.tasks.len());
    let mut steps: Vec<StepSummary> = state.tasks[..done].iter().map(task_step).collect();

    let pages = state.created_pages();
    if !pages.is_empty() {
        steps.push(StepSummary {
            title: "Notion Sync".into(),
            status: "completed".into(),
            details: format!("Created {} page(s).", pages.len()),
        });
    }

    RunReport {
        page_ids: pages.iter().map(|p| p.id.clone()).collect(),
        created_pages: pages.to_vec(),
        contents: state.generated_contents().to_vec(),
        steps,
        tokens_used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{
        CompletionRequest, CompletionResponse, ContentBlock, StopReason, ToolDefinition,
    };
    use crate::tool::registry::ToolRegistry;
    use crate::tool::{SideEffect, Tool, ToolOutput};
    use crate::workflow::types::TaskKind;
    use serde_json::json;
    use std::sync::Mutex;

    struct MockProvider {
        responses: Mutex<Vec<CompletionResponse>>,
        prompts: Mutex<Vec<String>>,
    }

    impl LlmProvider for MockProvider {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
            self.prompts
                .lock()
                .expect("mock lock poisoned")
                .push(request.messages[0].text());
            let mut responses = self.responses.lock().expect("mock lock poisoned");
            if responses.is_empty() {
                return Err(Error::Api {
                    status: 503,
                    message: "model unavailable".into(),
                });
            }
            Ok(responses.remove(0))
        }
    }

    struct CreatePage;

    impl Tool for CreatePage {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "notion_create_page".into(),
                description: "Create a page".into(),
                input_schema: json!({"type": "object"}),
            }
        }

        fn side_effect(&self) -> SideEffect {
            SideEffect::CreatesState
        }

        fn execute(
            &self,
            _input: serde_json::Value,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<ToolOutput, Error>> + Send + '_>,
        > {
            Box::pin(async {
                Ok(ToolOutput::success(
                    "Page created. ID: page-1 URL: https://notion.so/page-1",
                ))
            })
        }
    }

    fn text(text: &str) -> CompletionResponse {
        CompletionResponse {
            content: vec![ContentBlock::Text { text: text.into() }],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage {
                input_tokens: 5,
                output_tokens: 5,
            },
        }
    }

    fn task(id: &str, kind: TaskKind, description: &str) -> Task {
        Task {
            id: id.into(),
            kind,
            description: description.into(),
            priority: 5,
            due_date: None,
            estimated_duration: None,
            input_data: Vec::new(),
            output_format: None,
        }
    }

    fn workflow(responses: Vec<CompletionResponse>) -> (Workflow<MockProvider>, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider {
            responses: Mutex::new(responses),
            prompts: Mutex::new(Vec::new()),
        });
        let runner = AgentRunner::builder(provider.clone())
            .system_prompt(prompt::EXECUTION_SYSTEM_PROMPT)
            .registry(Arc::new(ToolRegistry::new([
                Arc::new(CreatePage) as Arc<dyn Tool>
            ])))
            .build()
            .unwrap();
        (Workflow::new(Arc::new(runner)), provider)
    }

    #[tokio::test]
    async fn runs_tasks_in_order_and_links_pages() {
        let (workflow, provider) = workflow(vec![
            text("The function has slope 2."),
            CompletionResponse {
                content: vec![ContentBlock::ToolUse {
                    id: "c1".into(),
                    name: "notion_create_page".into(),
                    input: json!({"parentPageId": "p", "title": "Slope", "content": "# Slope"}),
                }],
                stop_reason: StopReason::ToolUse,
                usage: TokenUsage::default(),
            },
            text("✅ T2 done → Slope https://notion.so/page-1"),
        ]);
        let state = ExecutionState::new(vec![
            task("T1", TaskKind::Analysis, "Analyse the worksheet"),
            task("T2", TaskKind::Execution, "Create the note page"),
        ]);

        let report = workflow.run(state).await.unwrap();

        assert_eq!(report.page_ids, vec!["page-1".to_string()]);
        assert_eq!(report.contents[0], "The function has slope 2.");
        assert_eq!(
            report.contents[1],
            "✅ T2 done → Slope https://notion.so/page-1\n\n> **相关链接**：[📄 查看 Notion 页面](https://notion.so/page-1)"
        );
        assert_eq!(
            report.steps.iter().map(|s| s.title.as_str()).collect::<Vec<_>>(),
            vec!["Analyse the worksheet", "Create the note page", "Notion Sync"]
        );
        assert_eq!(report.steps[1].details, "Type: execution. Priority: 5.");
        assert_eq!(report.tokens_used.input_tokens, 10);

        // The second task sees the first task's result.
        let prompts = provider.prompts.lock().unwrap();
        assert!(!prompts[0].contains("[Task 1 Result]"));
        assert!(prompts[1].contains("[Task 1 Result]: The function has slope 2...."));
    }

    #[tokio::test]
    async fn no_pages_means_no_sync_step_or_links() {
        let (workflow, _) = workflow(vec![text("Annotated.")]);
        let report = workflow
            .run(ExecutionState::new(vec![task(
                "T1",
                TaskKind::Annotation,
                "Annotate",
            )]))
            .await
            .unwrap();
        assert_eq!(report.contents, vec!["Annotated.".to_string()]);
        assert_eq!(report.steps.len(), 1);
        assert!(report.page_ids.is_empty());
    }

    #[tokio::test]
    async fn model_failure_aborts_the_run() {
        let (workflow, _) = workflow(vec![]);
        let err = workflow
            .run(ExecutionState::new(vec![task("T1", TaskKind::Analysis, "a")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Workflow(_)));
        assert!(err.to_string().contains("task T1 failed"));
        assert!(err.to_string().contains("model unavailable"));
    }

    #[tokio::test]
    async fn empty_plan_yields_empty_report() {
        let (workflow, provider) = workflow(vec![]);
        let report = workflow.run(ExecutionState::new(vec![])).await.unwrap();
        assert!(report.contents.is_empty());
        assert!(report.steps.is_empty());
        assert!(provider.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn page_link_without_url_uses_id() {
        let content = with_page_links(
            "done".into(),
            &[
                CreatedPage {
                    id: "a1".into(),
                    url: None,
                },
                CreatedPage {
                    id: "b2".into(),
                    url: Some("https://x/b2".into()),
                },
            ],
        );
        assert_eq!(
            content,
            "done\n\n> **相关链接**：[📄 页面 ID: a1](#)  [📄 查看 Notion 页面](https://x/b2)"
        );
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = RunReport {
            page_ids: vec!["p".into()],
            created_pages: vec![],
            contents: vec![],
            steps: vec![],
            tokens_used: TokenUsage::default(),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["pageIds"], json!(["p"]));
        assert!(value.get("tokensUsed").is_some());
    }
}
