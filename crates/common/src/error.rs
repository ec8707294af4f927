//! Error types for Rowpilot

use thiserror::Error;

/// Result type alias using Rowpilot Error
pub type Result<T> = std::result::Result<T, Error>;

/// Rowpilot error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported browser: {0}")]
    UnsupportedBrowser(String),
}
