use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use notewright::{
    AgentRunner, EXECUTION_SYSTEM_PROMPT, ExecutionState, FallbackResolver, LearnerProfile,
    McpClient, NotewrightConfig, OcrResult, OpenAiCompatProvider, Task, ToolRegistry, Workflow,
};

#[derive(Parser)]
#[command(
    name = "notewright",
    about = "Run a planned task list against the learner's workspace"
)]
struct Args {
    /// Path to notewright.toml config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON array of planned tasks
    #[arg(long)]
    tasks: PathBuf,

    /// JSON OCR result of the uploaded image
    #[arg(long)]
    ocr: Option<PathBuf>,

    /// JSON learner profile
    #[arg(long)]
    profile: Option<PathBuf>,

    /// The learner's free-text request
    #[arg(long)]
    query: Option<String>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

async fn active_registry(config: &NotewrightConfig) -> Result<ToolRegistry> {
    let Some(workspace) = &config.workspace else {
        warn!("no [workspace] configured, running without tools");
        return Ok(ToolRegistry::default());
    };

    let client = McpClient::connect(&workspace.mcp_endpoint, workspace.auth_header.clone())
        .await
        .with_context(|| format!("failed to connect to {}", workspace.mcp_endpoint))?;
    let registry = ToolRegistry::new(client.into_tools(&workspace.creates_state))
        .subset(&workspace.active_tools);
    info!(tools = ?registry.names(), "binding workspace tools");
    Ok(registry)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => NotewrightConfig::from_file(path)?,
        None => NotewrightConfig::default(),
    };
    config
        .provider
        .apply_overrides(|name| std::env::var(name).ok());

    // Credential problems surface before any task runs.
    let provider = Arc::new(OpenAiCompatProvider::from_config(&config.provider)?);

    let tasks: Vec<Task> = read_json(&args.tasks)?;
    if tasks.is_empty() {
        bail!("{} contains no tasks", args.tasks.display());
    }
    let ocr: OcrResult = match &args.ocr {
        Some(path) => read_json(path)?,
        None => OcrResult::default(),
    };
    let profile: LearnerProfile = match &args.profile {
        Some(path) => read_json(path)?,
        None => LearnerProfile::default(),
    };

    let registry = active_registry(&config).await?;

    let runner = AgentRunner::builder(provider)
        .name("executor")
        .system_prompt(EXECUTION_SYSTEM_PROMPT)
        .registry(Arc::new(registry))
        .max_steps(config.agent.max_steps)
        .max_tokens(config.provider.max_tokens)
        .temperature(config.provider.temperature)
        .fallback_resolver(FallbackResolver::new(&config.agent.page_creation_tool))
        .build()?;

    let mut state = ExecutionState::new(tasks)
        .with_learner_profile(profile)
        .with_ocr_result(ocr);
    if let Some(query) = args.query {
        state = state.with_user_query(query);
    }

    let report = Workflow::new(Arc::new(runner))
        .with_preview_chars(config.agent.preview_chars)
        .run(state)
        .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    eprintln!(
        "\n---\nTokens used: {} in / {} out | Pages created: {}",
        report.tokens_used.input_tokens,
        report.tokens_used.output_tokens,
        report.page_ids.len(),
    );

    Ok(())
}
