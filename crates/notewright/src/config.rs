use std::path::Path;

use serde::Deserialize;

use crate::Error;
use crate::agent::fallback::DEFAULT_PAGE_CREATION_TOOL;
use crate::llm::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Environment variable overriding `provider.base_url`.
pub const BASE_URL_ENV: &str = "WENXIN_BASE_URL";
/// Environment variable overriding `provider.model`.
pub const MODEL_ENV: &str = "WENXIN_MODEL";

/// Top-level configuration loaded from `notewright.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct NotewrightConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    pub workspace: Option<WorkspaceConfig>,
}

/// OpenAI-compatible chat model endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key. The key itself
    /// never appears in the config file.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            api_key_env: "WENXIN_API_KEY".into(),
            temperature: 0.35,
            max_tokens: 2048,
        }
    }
}

impl ProviderConfig {
    /// Resolve the API key through `lookup`. Unset and empty values are both
    /// reported as [`Error::MissingCredential`].
    pub fn api_key_from(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<String, Error> {
        lookup(&self.api_key_env)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::MissingCredential(self.api_key_env.clone()))
    }

    /// Apply `WENXIN_BASE_URL` / `WENXIN_MODEL` overrides. Empty values are
    /// ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.is_empty()) {
            self.base_url = url;
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|v| !v.is_empty()) {
            self.model = model;
        }
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_steps: usize,
    /// Characters of each earlier task result quoted in later prompts.
    pub preview_chars: usize,
    /// Tool targeted by page arguments recovered from response text.
    pub page_creation_tool: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            preview_chars: 500,
            page_creation_tool: DEFAULT_PAGE_CREATION_TOOL.into(),
        }
    }
}

/// Workspace tool server (MCP over streamable HTTP).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkspaceConfig {
    pub mcp_endpoint: String,
    /// Sent verbatim as the `Authorization` header, e.g. `"Bearer ntn_..."`.
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Tools exposed to the model. Everything else the server offers stays
    /// hidden.
    #[serde(default = "default_active_tools")]
    pub active_tools: Vec<String>,
    /// Tools whose successful results record created pages.
    #[serde(default = "default_creates_state")]
    pub creates_state: Vec<String>,
}

fn default_active_tools() -> Vec<String> {
    [
        "notion_create_page",
        "notion_append_content",
        "notion_search",
        "notion_retrieve_page",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_creates_state() -> Vec<String> {
    vec![DEFAULT_PAGE_CREATION_TOOL.to_string()]
}

impl NotewrightConfig {
    /// Parse a TOML string into a `NotewrightConfig`.
    pub fn from_toml(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.agent.max_steps == 0 {
            return Err(Error::Config("agent.max_steps must be at least 1".into()));
        }
        if self.provider.max_tokens == 0 {
            return Err(Error::Config(
                "provider.max_tokens must be at least 1".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(Error::Config(format!(
                "provider.temperature must be between 0 and 2, got {}",
                self.provider.temperature
            )));
        }
        if self.provider.api_key_env.trim().is_empty() {
            return Err(Error::Config(
                "provider.api_key_env must not be empty".into(),
            ));
        }
        if self.agent.page_creation_tool.trim().is_empty() {
            return Err(Error::Config(
                "agent.page_creation_tool must not be empty".into(),
            ));
        }
        if let Some(workspace) = &self.workspace {
            if workspace.mcp_endpoint.trim().is_empty() {
                return Err(Error::Config(
                    "workspace.mcp_endpoint must not be empty".into(),
                ));
            }
            if workspace.active_tools.is_empty() {
                return Err(Error::Config(
                    "workspace.active_tools must name at least one tool".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[provider]
base_url = "http://localhost:8080/v1"
model = "ernie-4.5"
api_key_env = "MY_KEY"
temperature = 0.2
max_tokens = 1024

[agent]
max_steps = 6
preview_chars = 200
page_creation_tool = "workspace_create_page"

[workspace]
mcp_endpoint = "http://localhost:3000/mcp"
auth_header = "Bearer ntn_123"
active_tools = ["workspace_create_page", "notion_search"]
creates_state = ["workspace_create_page"]
"#;
        let config = NotewrightConfig::from_toml(toml).unwrap();
        assert_eq!(config.provider.base_url, "http://localhost:8080/v1");
        assert_eq!(config.provider.api_key_env, "MY_KEY");
        assert_eq!(config.provider.max_tokens, 1024);
        assert_eq!(config.agent.max_steps, 6);
        assert_eq!(config.agent.page_creation_tool, "workspace_create_page");
        let workspace = config.workspace.unwrap();
        assert_eq!(workspace.auth_header.as_deref(), Some("Bearer ntn_123"));
        assert_eq!(workspace.active_tools.len(), 2);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = NotewrightConfig::from_toml("").unwrap();
        assert_eq!(config.provider, ProviderConfig::default());
        assert_eq!(config.provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.provider.model, "ernie-4.5-turbo-vl");
        assert_eq!(config.provider.temperature, 0.35);
        assert_eq!(config.agent.max_steps, 10);
        assert_eq!(config.agent.preview_chars, 500);
        assert!(config.workspace.is_none());
    }

    #[test]
    fn workspace_defaults_bind_core_tools() {
        let config = NotewrightConfig::from_toml(
            r#"
[workspace]
mcp_endpoint = "http://localhost:3000/mcp"
"#,
        )
        .unwrap();
        let workspace = config.workspace.unwrap();
        assert_eq!(
            workspace.active_tools,
            vec![
                "notion_create_page",
                "notion_append_content",
                "notion_search",
                "notion_retrieve_page"
            ]
        );
        assert_eq!(workspace.creates_state, vec!["notion_create_page"]);
        assert!(workspace.auth_header.is_none());
    }

    #[test]
    fn zero_max_steps_rejected() {
        let err = NotewrightConfig::from_toml("[agent]\nmax_steps = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_steps"), "error: {err}");
    }

    #[test]
    fn zero_max_tokens_rejected() {
        let err = NotewrightConfig::from_toml("[provider]\nmax_tokens = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_tokens"), "error: {err}");
    }

    #[test]
    fn out_of_range_temperature_rejected() {
        let err = NotewrightConfig::from_toml("[provider]\ntemperature = 2.5\n").unwrap_err();
        assert!(err.to_string().contains("temperature"), "error: {err}");
    }

    #[test]
    fn empty_api_key_env_rejected() {
        let err = NotewrightConfig::from_toml("[provider]\napi_key_env = \"\"\n").unwrap_err();
        assert!(err.to_string().contains("api_key_env"), "error: {err}");
    }

    #[test]
    fn empty_active_tools_rejected() {
        let err = NotewrightConfig::from_toml(
            "[workspace]\nmcp_endpoint = \"http://x/mcp\"\nactive_tools = []\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("active_tools"), "error: {err}");
    }

    #[test]
    fn workspace_requires_endpoint() {
        let err = NotewrightConfig::from_toml("[workspace]\nauth_header = \"x\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unknown_field_type_is_config_error() {
        let err = NotewrightConfig::from_toml("[agent]\nmax_steps = \"ten\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn api_key_resolution() {
        let config = ProviderConfig::default();
        assert_eq!(
            config
                .api_key_from(env(&[("WENXIN_API_KEY", "sk-1")]))
                .unwrap(),
            "sk-1"
        );

        let err = config.api_key_from(env(&[])).unwrap_err();
        assert!(matches!(err, Error::MissingCredential(ref v) if v == "WENXIN_API_KEY"));

        let err = config
            .api_key_from(env(&[("WENXIN_API_KEY", "  ")]))
            .unwrap_err();
        assert!(matches!(err, Error::MissingCredential(_)));
    }

    #[test]
    fn env_overrides_base_url_and_model() {
        let mut config = ProviderConfig::default();
        config.apply_overrides(env(&[
            ("WENXIN_BASE_URL", "http://proxy/v1"),
            ("WENXIN_MODEL", ""),
        ]));
        assert_eq!(config.base_url, "http://proxy/v1");
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent]\nmax_steps = 3").unwrap();
        let config = NotewrightConfig::from_file(file.path()).unwrap();
        assert_eq!(config.agent.max_steps, 3);
    }

    #[test]
    fn from_file_nonexistent_path() {
        let err = NotewrightConfig::from_file(Path::new("/nonexistent/notewright.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("failed to read"), "error: {err}");
    }
}
