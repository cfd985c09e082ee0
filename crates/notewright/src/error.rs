use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A required credential is absent. Fatal: raised before any model call.
    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Workflow error: {0}")]
    Workflow(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = Error::Api {
            status: 429,
            message: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "API error (429): rate limited");

        let err = Error::MissingCredential("WENXIN_API_KEY".into());
        assert_eq!(
            err.to_string(),
            "Missing credential: environment variable WENXIN_API_KEY is not set"
        );
    }

    #[test]
    fn error_tool_display_message() {
        let err = Error::Tool("parentPageId is required".into());
        assert_eq!(err.to_string(), "Tool error: parentPageId is required");
    }

    #[test]
    fn error_workflow_display_message() {
        let err = Error::Workflow("no task at index 3".into());
        assert_eq!(err.to_string(), "Workflow error: no task at index 3");
    }
}
