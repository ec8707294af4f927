//! Scripted in-memory browser used by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use rowpilot_common::{RawRow, RunnerConfig, TestRow, Viewport};
use rowpilot_engine::driver::{BoundingBox, BrowserDriver, Download, DriverEvent, DriverFactory, LoadState, WaitState};
use rowpilot_engine::overlay::{
    APPLY_HIGHLIGHT_SCRIPT, OVERLAY_VISIBLE_PROBE, RESTORE_STYLE_SCRIPT, TOP_ELEMENT_PROBE,
};
use rowpilot_engine::{EngineError, EngineResult};

#[derive(Default)]
struct PageState {
    url: String,
    pages: HashMap<String, u16>,
    navigations: HashMap<String, String>,
    texts: HashMap<String, String>,
    missing: HashSet<String>,
    download: Option<(String, bool)>,
    /// z-index of the popup and how many visibility polls still see it
    popup: Option<(String, usize)>,
    restore_fails: bool,
    screenshots_fail: bool,
    calls: Vec<String>,
}

pub struct MockDriver {
    state: Mutex<PageState>,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<DriverEvent>>>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(PageState {
                url: "about:blank".to_string(),
                ..Default::default()
            }),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Reachable URL and the status its navigation returns
    pub fn page(self, url: &str, status: u16) -> Self {
        self.state.lock().pages.insert(url.to_string(), status);
        self
    }

    /// Clicking `selector` moves the page to `url`
    pub fn click_navigates(self, selector: &str, url: &str) -> Self {
        self.state
            .lock()
            .navigations
            .insert(selector.to_string(), url.to_string());
        self
    }

    /// Text shown by elements matching `selector`
    pub fn text(self, selector: &str, text: &str) -> Self {
        self.state
            .lock()
            .texts
            .insert(selector.to_string(), text.to_string());
        self
    }

    /// Selector that never becomes visible
    pub fn missing(self, selector: &str) -> Self {
        self.state.lock().missing.insert(selector.to_string());
        self
    }

    /// Next click starts a download; `lands` decides whether the file is written
    pub fn download(self, name: &str, lands: bool) -> Self {
        self.state.lock().download = Some((name.to_string(), lands));
        self
    }

    /// A popup covers every element and stays visible for `visible_polls`
    /// overlay polls; `usize::MAX` keeps it up for good
    pub fn popup(self, z_index: &str, visible_polls: usize) -> Self {
        self.state.lock().popup = Some((z_index.to_string(), visible_polls));
        self
    }

    /// Restoring a highlighted element's style errors
    pub fn restore_fails(self) -> Self {
        self.state.lock().restore_fails = true;
        self
    }

    /// Every screenshot errors without writing a file
    pub fn screenshots_fail(self) -> Self {
        self.state.lock().screenshots_fail = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    fn log(&self, call: String) {
        self.state.lock().calls.push(call);
    }

    fn is_missing(&self, selector: &str) -> bool {
        let state = self.state.lock();
        state.missing.contains(selector)
            || (selector.starts_with("text=") && !state.texts.contains_key(selector))
    }
}

fn timeout_error(timeout: Duration) -> EngineError {
    EngineError::Driver(format!("Timeout {}ms exceeded.", timeout.as_millis()))
}

#[async_trait]
impl BrowserDriver for MockDriver {
    async fn goto(&self, url: &str) -> EngineResult<Option<u16>> {
        self.log(format!("goto {}", url));
        let status = self.state.lock().pages.get(url).copied();
        match status {
            Some(status) => {
                self.state.lock().url = url.to_string();
                let _ = self.events_tx.send(DriverEvent::Response {
                    status,
                    method: "GET".to_string(),
                    url: url.to_string(),
                });
                Ok(Some(status))
            }
            None => Err(EngineError::Driver(format!(
                "net::ERR_NAME_NOT_RESOLVED at {}",
                url
            ))),
        }
    }

    async fn wait_for_load_state(&self, _state: LoadState) -> EngineResult<()> {
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        _state: WaitState,
        timeout: Duration,
    ) -> EngineResult<()> {
        if self.is_missing(selector) {
            return Err(timeout_error(timeout));
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> EngineResult<()> {
        self.log(format!("click {}", selector));
        let mut state = self.state.lock();
        if let Some(url) = state.navigations.get(selector).cloned() {
            state.url = url.clone();
            let _ = self.events_tx.send(DriverEvent::Response {
                status: 302,
                method: "POST".to_string(),
                url,
            });
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> EngineResult<()> {
        self.log(format!("fill {} {}", selector, value));
        Ok(())
    }

    async fn select_option(&self, selector: &str, label: &str) -> EngineResult<()> {
        self.log(format!("select {} {}", selector, label));
        Ok(())
    }

    async fn key_down(&self, key: &str) -> EngineResult<()> {
        self.log(format!("down {}", key));
        Ok(())
    }

    async fn key_press(&self, key: &str) -> EngineResult<()> {
        self.log(format!("press {}", key));
        Ok(())
    }

    async fn key_up(&self, key: &str) -> EngineResult<()> {
        self.log(format!("up {}", key));
        Ok(())
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> EngineResult<()> {
        Err(timeout_error(timeout))
    }

    async fn wait_for_download(&self, timeout: Duration) -> EngineResult<Download> {
        let download = self.state.lock().download.clone();
        match download {
            Some((name, _)) => Ok(Download {
                id: "1".to_string(),
                suggested_filename: name,
            }),
            None => Err(timeout_error(timeout)),
        }
    }

    async fn save_download(&self, _download: &Download, path: &Path) -> EngineResult<()> {
        let lands = self
            .state
            .lock()
            .download
            .as_ref()
            .map(|(_, lands)| *lands)
            .unwrap_or(false);
        if lands {
            std::fs::write(path, b"report")?;
        }
        Ok(())
    }

    async fn screenshot(&self, path: &Path, _full_page: bool) -> EngineResult<()> {
        if self.state.lock().screenshots_fail {
            return Err(EngineError::Driver("Target page has been closed".to_string()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"")?;
        Ok(())
    }

    async fn evaluate(&self, script: &str, _arg: Value) -> EngineResult<Value> {
        let mut state = self.state.lock();
        let Some((z_index, visible_polls)) = state.popup.as_mut() else {
            return Ok(Value::Null);
        };
        if script == TOP_ELEMENT_PROBE {
            return Ok(json!({
                "topTag": "DIV",
                "topClass": "toast",
                "topZ": z_index,
                "looksLikePopup": true,
            }));
        }
        if script == OVERLAY_VISIBLE_PROBE {
            let visible = *visible_polls > 0;
            *visible_polls = visible_polls.saturating_sub(1);
            return Ok(json!(visible));
        }
        Ok(Value::Null)
    }

    async fn eval_on_selector(
        &self,
        selector: &str,
        script: &str,
        _arg: Value,
    ) -> EngineResult<Value> {
        if script == APPLY_HIGHLIGHT_SCRIPT {
            self.log(format!("outline {}", selector));
        } else if script == RESTORE_STYLE_SCRIPT {
            self.log(format!("restore {}", selector));
            if self.state.lock().restore_fails {
                return Err(EngineError::Driver(
                    "Execution context was destroyed".to_string(),
                ));
            }
        }
        Ok(Value::String(String::new()))
    }

    async fn bounding_box(&self, _selector: &str) -> EngineResult<Option<BoundingBox>> {
        Ok(Some(BoundingBox {
            x: 10.0,
            y: 10.0,
            width: 100.0,
            height: 20.0,
        }))
    }

    async fn text_content(&self, selector: &str, timeout: Duration) -> EngineResult<Option<String>> {
        match self.state.lock().texts.get(selector) {
            Some(text) => Ok(Some(text.clone())),
            None => Err(timeout_error(timeout)),
        }
    }

    async fn current_url(&self) -> EngineResult<String> {
        Ok(self.state.lock().url.clone())
    }

    async fn set_viewport(&self, viewport: Viewport) -> EngineResult<()> {
        self.log(format!("viewport {}x{}", viewport.width, viewport.height));
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<DriverEvent>> {
        self.events_rx.lock().take()
    }

    async fn close(&self) -> EngineResult<()> {
        self.log("close".to_string());
        Ok(())
    }
}

/// Launches a freshly scripted [`MockDriver`] per file
pub struct MockFactory {
    script: Box<dyn Fn() -> MockDriver + Send + Sync>,
}

impl MockFactory {
    pub fn new(script: impl Fn() -> MockDriver + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
        }
    }
}

#[async_trait]
impl DriverFactory for MockFactory {
    async fn launch(&self) -> EngineResult<Arc<dyn BrowserDriver>> {
        Ok(Arc::new((self.script)()))
    }
}

pub fn row(cells: &[(&str, &str)]) -> TestRow {
    let raw = cells
        .iter()
        .fold(RawRow::new(), |raw, (header, value)| raw.with(header, *value));
    TestRow::from_raw(&raw)
}

/// Config with short timeouts and results under `results_dir`
pub fn fast_config(results_dir: &Path) -> RunnerConfig {
    let mut config = RunnerConfig {
        results_dir: results_dir.to_path_buf(),
        ..Default::default()
    };
    config.timeouts.navigation_settle_ms = 10;
    config.timeouts.highlight_ms = 10;
    config.timeouts.default_wait_ms = 10;
    config.overlay.poll_interval_ms = 5;
    config.overlay.max_wait_ms = 10;
    config
}
