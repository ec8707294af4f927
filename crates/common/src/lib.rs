//! Rowpilot Common Library
//!
//! Data model, row mapping and configuration shared by the engine and CLI.

pub mod config;
pub mod error;
pub mod row;
pub mod types;

pub use config::{BrowserKind, OverlayConfig, RunnerConfig, TimeoutConfig};
pub use error::{Error, Result};
pub use row::{CellValue, RawRow, TestRow};
pub use types::*;

/// Rowpilot version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
