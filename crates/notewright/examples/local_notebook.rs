//! Run a task list against an in-process notebook instead of a Notion MCP
//! server. Useful for trying prompts without touching a real workspace.
//!
//! ```bash
//! export WENXIN_API_KEY="..."
//! cargo run -p notewright --example local_notebook
//! ```

use std::pin::Pin;
use std::sync::{Arc, Mutex};

use notewright::{
    AgentRunner, EXECUTION_SYSTEM_PROMPT, ExecutionState, OcrResult, OpenAiCompatProvider,
    ProviderConfig, SideEffect, Task, TaskKind, Tool, ToolDefinition, ToolOutput, ToolRegistry,
    Workflow,
};
use serde_json::json;

/// Pages kept in memory. `notion_search` always finds the root page.
#[derive(Default)]
struct Notebook {
    pages: Mutex<Vec<(String, String)>>,
}

struct CreatePage(Arc<Notebook>);
struct Search;

impl Tool for CreatePage {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "notion_create_page".into(),
            description: "Create a page under a parent page.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "parentPageId": {"type": "string"},
                    "title": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["parentPageId", "title", "content"]
            }),
        }
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::CreatesState
    }

    fn execute<'a>(
        &'a self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<ToolOutput, notewright::Error>> + Send + 'a>>
    {
        Box::pin(async move {
            let title = input
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("Untitled")
                .to_string();
            let mut pages = self.0.pages.lock().expect("notebook lock poisoned");
            let id = format!("local-{}", pages.len() + 1);
            pages.push((id.clone(), title));
            Ok(ToolOutput::structured(json!({
                "id": id,
                "url": format!("https://notebook.local/{id}"),
            })))
        })
    }
}

impl Tool for Search {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "notion_search".into(),
            description: "Search pages by title.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {"query": {"type": "string"}}
            }),
        }
    }

    fn execute<'a>(
        &'a self,
        _input: serde_json::Value,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<ToolOutput, notewright::Error>> + Send + 'a>>
    {
        Box::pin(async {
            Ok(ToolOutput::structured(json!({
                "results": [{"id": "root", "title": "sophie"}]
            })))
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ProviderConfig::default();
    config.apply_overrides(|name| std::env::var(name).ok());
    let provider = Arc::new(OpenAiCompatProvider::from_config(&config)?);

    let notebook = Arc::new(Notebook::default());
    let registry = ToolRegistry::new([
        Arc::new(CreatePage(Arc::clone(&notebook))) as Arc<dyn Tool>,
        Arc::new(Search),
    ]);

    let runner = AgentRunner::builder(provider)
        .name("executor")
        .system_prompt(EXECUTION_SYSTEM_PROMPT)
        .registry(Arc::new(registry))
        .max_tokens(config.max_tokens)
        .temperature(config.temperature)
        .build()?;

    let state = ExecutionState::new(vec![Task {
        id: "T1".into(),
        kind: TaskKind::Execution,
        description: "Call notion_create_page to save a short note on the slope of y = 2x + 1."
            .into(),
        priority: 5,
        due_date: None,
        estimated_duration: Some("10min".into()),
        input_data: vec!["OCR text".into()],
        output_format: Some("Notion page".into()),
    }])
    .with_ocr_result(OcrResult {
        plain_text: "y = 2x + 1".into(),
        ..OcrResult::default()
    })
    .with_user_query("Make me a note about this function.");

    let report = Workflow::new(Arc::new(runner)).run(state).await?;

    for content in &report.contents {
        println!("{content}\n");
    }
    for (id, title) in notebook.pages.lock().expect("notebook lock poisoned").iter() {
        println!("page {id}: {title}");
    }
    Ok(())
}
