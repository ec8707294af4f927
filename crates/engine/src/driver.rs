//! Browser automation boundary
//!
//! The engine never talks to a browser directly. Everything it needs from
//! one (navigation, element waits, input, screenshots, in-page evaluation
//! and the network/download event stream) goes through [`BrowserDriver`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use rowpilot_common::Viewport;

use crate::error::EngineResult;

/// Element state to wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

/// Page load milestone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

/// Layout box of an element, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Asynchronous network notifications pushed by the driver
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    Response {
        status: u16,
        method: String,
        url: String,
    },
    RequestFailed {
        method: String,
        url: String,
    },
}

/// A download that started and has not been saved yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub id: String,
    pub suggested_filename: String,
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate and wait for DOM content; returns the response status if any
    async fn goto(&self, url: &str) -> EngineResult<Option<u16>>;

    async fn wait_for_load_state(&self, state: LoadState) -> EngineResult<()>;

    async fn wait_for_selector(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> EngineResult<()>;

    async fn click(&self, selector: &str) -> EngineResult<()>;

    async fn fill(&self, selector: &str, value: &str) -> EngineResult<()>;

    /// Choose a `<select>` option by its label
    async fn select_option(&self, selector: &str, label: &str) -> EngineResult<()>;

    async fn key_down(&self, key: &str) -> EngineResult<()>;

    async fn key_press(&self, key: &str) -> EngineResult<()>;

    async fn key_up(&self, key: &str) -> EngineResult<()>;

    async fn wait_for_navigation(&self, timeout: Duration) -> EngineResult<()>;

    /// Resolve once the page starts a download
    async fn wait_for_download(&self, timeout: Duration) -> EngineResult<Download>;

    async fn save_download(&self, download: &Download, path: &Path) -> EngineResult<()>;

    async fn screenshot(&self, path: &Path, full_page: bool) -> EngineResult<()>;

    /// Evaluate a function expression in the page with one JSON argument
    async fn evaluate(&self, script: &str, arg: Value) -> EngineResult<Value>;

    /// Evaluate a function expression against the first element matching `selector`
    async fn eval_on_selector(&self, selector: &str, script: &str, arg: Value)
        -> EngineResult<Value>;

    async fn bounding_box(&self, selector: &str) -> EngineResult<Option<BoundingBox>>;

    /// Text content of the single element matching `selector`
    async fn text_content(&self, selector: &str, timeout: Duration) -> EngineResult<Option<String>>;

    async fn current_url(&self) -> EngineResult<String>;

    async fn set_viewport(&self, viewport: Viewport) -> EngineResult<()>;

    /// Hand over the network event stream. Returns `None` after the first call.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<DriverEvent>>;

    async fn close(&self) -> EngineResult<()>;
}

/// Launches one driver per test file
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self) -> EngineResult<Arc<dyn BrowserDriver>>;
}

/// Resolves after two animation frames
pub const PAINT_SETTLE_SCRIPT: &str =
    "() => new Promise(resolve => requestAnimationFrame(() => requestAnimationFrame(resolve)))";

/// Wait for pending paints; falls back to a short sleep
pub async fn settle_paint(driver: &dyn BrowserDriver) {
    if let Err(e) = driver.evaluate(PAINT_SETTLE_SCRIPT, Value::Null).await {
        debug!("Paint settle failed, sleeping instead: {}", e);
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
}
