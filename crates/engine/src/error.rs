//! Error types for the orchestration engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Raw message reported by the browser driver
    #[error("{0}")]
    Driver(String),

    #[error("Playwright bridge unavailable: {0}")]
    BridgeUnavailable(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Invalid action value '{value}': {reason}")]
    InvalidAction { value: String, reason: String },

    #[error("Download failed or missing file ({0})")]
    DownloadMissing(String),

    /// Expected-outcome clause that did not hold
    #[error("{0}")]
    Expectation(String),

    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Common(#[from] rowpilot_common::Error),
}

impl EngineError {
    /// Build an [`EngineError::InvalidAction`]
    pub fn invalid_action(value: &str, reason: &str) -> Self {
        EngineError::InvalidAction {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
