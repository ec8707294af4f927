//! Run configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Browser engine to launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
    Edge,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
            BrowserKind::Edge => "edge",
        }
    }
}

impl FromStr for BrowserKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" | "safari" => Ok(BrowserKind::Webkit),
            "edge" | "msedge" | "microsoft_edge" => Ok(BrowserKind::Edge),
            other => Err(Error::UnsupportedBrowser(other.to_string())),
        }
    }
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Browser engine
    pub browser: BrowserKind,

    /// Run the browser without a window
    pub headless: bool,

    /// Root directory for per-file result folders
    pub results_dir: PathBuf,

    /// File the running step count is persisted to
    pub progress_file: Option<PathBuf>,

    /// Command used to start the Node.js Playwright bridge
    pub node_binary: String,

    pub timeouts: TimeoutConfig,

    pub overlay: OverlayConfig,

    /// Age limit for attributing a network event to an action
    pub network_freshness_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: true,
            results_dir: PathBuf::from("results"),
            progress_file: None,
            node_binary: "node".to_string(),
            timeouts: TimeoutConfig::default(),
            overlay: OverlayConfig::default(),
            network_freshness_ms: 1500,
        }
    }
}

/// Per-stage driver wait limits, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub write_ms: u64,
    pub click_ms: u64,
    pub select_ms: u64,
    pub select_button_ms: u64,
    pub option_ms: u64,
    pub download_ms: u64,
    pub appear_text_ms: u64,
    pub highlight_ms: u64,
    pub navigation_settle_ms: u64,
    pub default_wait_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            write_ms: 10_000,
            click_ms: 10_000,
            select_ms: 15_000,
            select_button_ms: 15_000,
            option_ms: 10_000,
            download_ms: 15_000,
            appear_text_ms: 5_000,
            highlight_ms: 5_000,
            navigation_settle_ms: 5_000,
            default_wait_ms: 3_000,
        }
    }
}

/// Blocking-overlay polling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub poll_interval_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            max_wait_ms: 10_000,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.overlay.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "overlay.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.overlay.poll_interval_ms > self.overlay.max_wait_ms {
            return Err(Error::InvalidConfig(
                "overlay.poll_interval_ms exceeds overlay.max_wait_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Progress file location, defaulting to the system temp directory
    pub fn progress_file(&self) -> PathBuf {
        self.progress_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("test_progress.txt"))
    }

    pub fn network_freshness(&self) -> Duration {
        Duration::from_millis(self.network_freshness_ms)
    }
}
