//! Core types for Rowpilot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pass/fail verdict of a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Default for Verdict {
    fn default() -> Self {
        Self::Pass
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "Pass"),
            Verdict::Fail => write!(f, "Fail"),
        }
    }
}

/// One network attribution emitted per executed action.
///
/// `method`, `url` and `network_status` are `None` when no fresh network
/// event could be attributed to the action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub test_case: String,
    pub action_type: String,
    pub selector_or_value: String,
    pub method: Option<String>,
    pub url: Option<String>,
    pub network_status: Option<u16>,
}

/// Point-in-time copy of the most recent network event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    /// HTTP status; `None` for failed requests
    pub status: Option<u16>,
    pub method: String,
    pub url: String,
    pub observed_at: DateTime<Utc>,
}

/// Browser viewport size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Finished test case, handed to report writers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub name: String,
    pub verdict: Verdict,
    pub duration_seconds: f64,
    pub outcome: String,
    pub evidence: Vec<PathBuf>,
    pub device_tag: Option<String>,
    pub viewport: Viewport,
    pub executed_actions: Vec<String>,
    pub network: Vec<ActionRecord>,
}

impl TestCaseResult {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    /// Device label shown in reports
    pub fn device_label(&self) -> &str {
        self.device_tag.as_deref().unwrap_or("default")
    }
}
