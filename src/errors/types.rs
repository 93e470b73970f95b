use thiserror::Error;

#[derive(Debug, Error)]
pub enum LanternError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid cron expression: {0}")]
    Cron(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for LanternError {
    fn from(e: rusqlite::Error) -> Self {
        LanternError::Storage(e.to_string())
    }
}
