//! Playwright-backed [`BrowserDriver`]
//!
//! A long-lived Node.js process runs an embedded bridge script that owns the
//! browser. Requests go to its stdin as JSON lines `{id, op, args}`; replies
//! come back on stdout as `{id, ok, result | error}`, interleaved with
//! `{event: "response" | "requestfailed" | "ready" | "fatal"}` notifications.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rowpilot_common::{BrowserKind, RunnerConfig, Viewport};

use crate::driver::{BoundingBox, BrowserDriver, Download, DriverEvent, DriverFactory, LoadState, WaitState};
use crate::error::{EngineError, EngineResult};

/// How long the bridge may take to launch the browser
const READY_TIMEOUT: Duration = Duration::from_secs(60);

const BRIDGE_SCRIPT: &str = r#"
const readline = require('readline');
const pw = require('playwright');

const opts = JSON.parse(process.argv[2]);
const send = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');
const asFunction = (src) => (0, eval)('(' + src + ')');
const message = (e) => String((e && e.message) || e);

(async () => {
  const launchOptions = { headless: opts.headless };
  if (opts.channel) launchOptions.channel = opts.channel;
  const browser = await pw[opts.browser].launch(launchOptions);
  const context = await browser.newContext({ acceptDownloads: true, viewport: opts.viewport });
  const page = await context.newPage();
  const downloads = new Map();
  let nextDownload = 0;

  page.on('response', (r) => send({ event: 'response', status: r.status(), method: r.request().method(), url: r.url() }));
  page.on('requestfailed', (r) => send({ event: 'requestfailed', method: r.method(), url: r.url() }));

  const ops = {
    goto: async ({ url }) => {
      const resp = await page.goto(url, { waitUntil: 'domcontentloaded' });
      return resp ? resp.status() : null;
    },
    waitForLoadState: ({ state }) => page.waitForLoadState(state),
    waitForSelector: async ({ selector, state, timeout }) => { await page.waitForSelector(selector, { state, timeout }); },
    click: ({ selector }) => page.click(selector),
    fill: ({ selector, value }) => page.fill(selector, value),
    selectOption: ({ selector, label }) => page.selectOption(selector, { label }),
    keyDown: ({ key }) => page.keyboard.down(key),
    keyPress: ({ key }) => page.keyboard.press(key),
    keyUp: ({ key }) => page.keyboard.up(key),
    waitForNavigation: ({ timeout }) => page.waitForNavigation({ waitUntil: 'domcontentloaded', timeout }),
    waitForDownload: async ({ timeout }) => {
      const download = await page.waitForEvent('download', { timeout });
      const id = String(nextDownload++);
      downloads.set(id, download);
      return { id, suggestedFilename: download.suggestedFilename() };
    },
    saveDownload: async ({ id, path }) => {
      const download = downloads.get(id);
      if (!download) throw new Error('unknown download ' + id);
      await download.saveAs(path);
      downloads.delete(id);
    },
    screenshot: ({ path, fullPage }) => page.screenshot({ path, fullPage }),
    evaluate: ({ script, arg }) => page.evaluate(asFunction(script), arg),
    evalOnSelector: ({ selector, script, arg }) => page.$eval(selector, asFunction(script), arg),
    boundingBox: async ({ selector }) => {
      const el = await page.$(selector);
      return el ? await el.boundingBox() : null;
    },
    textContent: ({ selector, timeout }) => page.locator(selector).textContent({ timeout }),
    url: async () => page.url(),
    setViewport: ({ width, height }) => page.setViewportSize({ width, height }),
    close: () => browser.close(),
  };

  const rl = readline.createInterface({ input: process.stdin });
  rl.on('line', async (line) => {
    let req;
    try { req = JSON.parse(line); } catch (e) { return; }
    try {
      const op = ops[req.op];
      if (!op) throw new Error('unknown op ' + req.op);
      const result = await op(req.args || {});
      send({ id: req.id, ok: true, result: result === undefined ? null : result });
      if (req.op === 'close') process.exit(0);
    } catch (e) {
      send({ id: req.id, ok: false, error: message(e) });
    }
  });
  rl.on('close', async () => {
    await browser.close().catch(() => {});
    process.exit(0);
  });

  send({ event: 'ready' });
})().catch((e) => {
  send({ event: 'fatal', error: message(e) });
  process.exit(1);
});
"#;

/// Launch settings for the bridge
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: BrowserKind,
    pub headless: bool,
    /// Node.js executable
    pub node_binary: String,
    pub viewport: Viewport,
}

impl From<&RunnerConfig> for PlaywrightConfig {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            browser: config.browser,
            headless: config.headless,
            node_binary: config.node_binary.clone(),
            viewport: Viewport::default(),
        }
    }
}

impl PlaywrightConfig {
    /// Options object handed to the bridge script
    pub fn launch_options(&self) -> Value {
        let (browser, channel) = match self.browser {
            BrowserKind::Chromium => ("chromium", None),
            BrowserKind::Firefox => ("firefox", None),
            BrowserKind::Webkit => ("webkit", None),
            BrowserKind::Edge => ("chromium", Some("msedge")),
        };
        json!({
            "browser": browser,
            "channel": channel,
            "headless": self.headless,
            "viewport": { "width": self.viewport.width, "height": self.viewport.height },
        })
    }
}

/// One line of bridge output
#[derive(Debug, Clone, PartialEq)]
enum BridgeMessage {
    Ready,
    Fatal(String),
    Event(DriverEvent),
    Reply { id: u64, result: Result<Value, String> },
    Ignored,
}

#[derive(Deserialize)]
struct RawLine {
    id: Option<u64>,
    ok: Option<bool>,
    result: Option<Value>,
    error: Option<String>,
    event: Option<String>,
    status: Option<u16>,
    method: Option<String>,
    url: Option<String>,
}

fn parse_bridge_line(line: &str) -> BridgeMessage {
    let Ok(raw) = serde_json::from_str::<RawLine>(line) else {
        return BridgeMessage::Ignored;
    };

    if let Some(id) = raw.id {
        let result = if raw.ok.unwrap_or(false) {
            Ok(raw.result.unwrap_or(Value::Null))
        } else {
            Err(raw.error.unwrap_or_else(|| "unknown bridge error".to_string()))
        };
        return BridgeMessage::Reply { id, result };
    }

    match raw.event.as_deref() {
        Some("ready") => BridgeMessage::Ready,
        Some("fatal") => BridgeMessage::Fatal(raw.error.unwrap_or_default()),
        Some("response") => BridgeMessage::Event(DriverEvent::Response {
            status: raw.status.unwrap_or_default(),
            method: raw.method.unwrap_or_default(),
            url: raw.url.unwrap_or_default(),
        }),
        Some("requestfailed") => BridgeMessage::Event(DriverEvent::RequestFailed {
            method: raw.method.unwrap_or_default(),
            url: raw.url.unwrap_or_default(),
        }),
        _ => BridgeMessage::Ignored,
    }
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>;

pub struct PlaywrightDriver {
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Pending,
    next_id: AtomicU64,
    events: Mutex<Option<mpsc::UnboundedReceiver<DriverEvent>>>,
    child: Mutex<Option<Child>>,
    reader: JoinHandle<()>,
    /// Holds the staged bridge script
    _script_dir: TempDir,
}

impl PlaywrightDriver {
    pub async fn launch(config: &PlaywrightConfig) -> EngineResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("rowpilot-bridge.js");
        tokio::fs::write(&script_path, BRIDGE_SCRIPT).await?;

        let mut child = Command::new(&config.node_binary)
            .arg(&script_path)
            .arg(config.launch_options().to_string())
            .env("NODE_PATH", node_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::BridgeUnavailable(format!("{}: {}", config.node_binary, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::BridgeUnavailable("no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::BridgeUnavailable("no stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[bridge] {}", line);
                }
            });
        }

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let reader = {
            let pending = Arc::clone(&pending);
            tokio::spawn(async move {
                let mut ready_tx = Some(ready_tx);
                let mut lines = BufReader::new(stdout).lines();

                while let Ok(Some(line)) = lines.next_line().await {
                    match parse_bridge_line(&line) {
                        BridgeMessage::Ready => {
                            if let Some(tx) = ready_tx.take() {
                                let _ = tx.send(Ok(()));
                            }
                        }
                        BridgeMessage::Fatal(error) => {
                            warn!("Playwright bridge failed: {}", error);
                            if let Some(tx) = ready_tx.take() {
                                let _ = tx.send(Err(error));
                            }
                        }
                        BridgeMessage::Event(event) => {
                            let _ = events_tx.send(event);
                        }
                        BridgeMessage::Reply { id, result } => {
                            if let Some(tx) = pending.lock().remove(&id) {
                                let _ = tx.send(result);
                            }
                        }
                        BridgeMessage::Ignored => debug!("[bridge] {}", line),
                    }
                }

                for (_, tx) in pending.lock().drain() {
                    let _ = tx.send(Err("Playwright bridge exited".to_string()));
                }
            })
        };

        match tokio::time::timeout(READY_TIMEOUT, ready_rx).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(error))) => return Err(EngineError::BridgeUnavailable(error)),
            Ok(Err(_)) => {
                return Err(EngineError::BridgeUnavailable(
                    "bridge exited before the browser was ready".to_string(),
                ))
            }
            Err(_) => return Err(EngineError::Timeout("Playwright browser launch".to_string())),
        }

        info!(
            "🌐 Browser: {} (headless: {})",
            config.browser, config.headless
        );

        Ok(Self {
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            events: Mutex::new(Some(events_rx)),
            child: Mutex::new(Some(child)),
            reader,
            _script_dir: script_dir,
        })
    }

    async fn request(&self, op: &str, args: Value) -> EngineResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let mut line = serde_json::to_string(&json!({ "id": id, "op": op, "args": args }))?;
        line.push('\n');
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.pending.lock().remove(&id);
                return Err(EngineError::BridgeUnavailable(e.to_string()));
            }
            stdin.flush().await?;
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(EngineError::Driver(message)),
            Err(_) => Err(EngineError::BridgeUnavailable(format!("no reply to {}", op))),
        }
    }

    async fn call(&self, op: &str, args: Value) -> EngineResult<()> {
        self.request(op, args).await.map(|_| ())
    }
}

/// Module search path for the bridge; `NODE_PATH` wins over `./node_modules`
fn node_path() -> PathBuf {
    std::env::var_os("NODE_PATH")
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok().map(|dir| dir.join("node_modules")))
        .unwrap_or_else(|| PathBuf::from("node_modules"))
}

fn millis(timeout: Duration) -> u64 {
    timeout.as_millis() as u64
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    async fn goto(&self, url: &str) -> EngineResult<Option<u16>> {
        let status = self.request("goto", json!({ "url": url })).await?;
        Ok(status.as_u64().map(|s| s as u16))
    }

    async fn wait_for_load_state(&self, state: LoadState) -> EngineResult<()> {
        self.call("waitForLoadState", json!({ "state": state.as_str() }))
            .await
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> EngineResult<()> {
        self.call(
            "waitForSelector",
            json!({ "selector": selector, "state": state.as_str(), "timeout": millis(timeout) }),
        )
        .await
    }

    async fn click(&self, selector: &str) -> EngineResult<()> {
        self.call("click", json!({ "selector": selector })).await
    }

    async fn fill(&self, selector: &str, value: &str) -> EngineResult<()> {
        self.call("fill", json!({ "selector": selector, "value": value }))
            .await
    }

    async fn select_option(&self, selector: &str, label: &str) -> EngineResult<()> {
        self.call("selectOption", json!({ "selector": selector, "label": label }))
            .await
    }

    async fn key_down(&self, key: &str) -> EngineResult<()> {
        self.call("keyDown", json!({ "key": key })).await
    }

    async fn key_press(&self, key: &str) -> EngineResult<()> {
        self.call("keyPress", json!({ "key": key })).await
    }

    async fn key_up(&self, key: &str) -> EngineResult<()> {
        self.call("keyUp", json!({ "key": key })).await
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> EngineResult<()> {
        self.call("waitForNavigation", json!({ "timeout": millis(timeout) }))
            .await
    }

    async fn wait_for_download(&self, timeout: Duration) -> EngineResult<Download> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Started {
            id: String,
            suggested_filename: String,
        }

        let value = self
            .request("waitForDownload", json!({ "timeout": millis(timeout) }))
            .await?;
        let started: Started = serde_json::from_value(value)?;
        Ok(Download {
            id: started.id,
            suggested_filename: started.suggested_filename,
        })
    }

    async fn save_download(&self, download: &Download, path: &Path) -> EngineResult<()> {
        self.call("saveDownload", json!({ "id": download.id, "path": path }))
            .await
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> EngineResult<()> {
        self.call("screenshot", json!({ "path": path, "fullPage": full_page }))
            .await
    }

    async fn evaluate(&self, script: &str, arg: Value) -> EngineResult<Value> {
        self.request("evaluate", json!({ "script": script, "arg": arg }))
            .await
    }

    async fn eval_on_selector(
        &self,
        selector: &str,
        script: &str,
        arg: Value,
    ) -> EngineResult<Value> {
        self.request(
            "evalOnSelector",
            json!({ "selector": selector, "script": script, "arg": arg }),
        )
        .await
    }

    async fn bounding_box(&self, selector: &str) -> EngineResult<Option<BoundingBox>> {
        let value = self
            .request("boundingBox", json!({ "selector": selector }))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn text_content(&self, selector: &str, timeout: Duration) -> EngineResult<Option<String>> {
        let value = self
            .request(
                "textContent",
                json!({ "selector": selector, "timeout": millis(timeout) }),
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn current_url(&self) -> EngineResult<String> {
        let value = self.request("url", Value::Null).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn set_viewport(&self, viewport: Viewport) -> EngineResult<()> {
        self.call(
            "setViewport",
            json!({ "width": viewport.width, "height": viewport.height }),
        )
        .await
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<DriverEvent>> {
        self.events.lock().take()
    }

    async fn close(&self) -> EngineResult<()> {
        let closed = self.call("close", Value::Null).await;
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            if tokio::time::timeout(Duration::from_secs(5), child.wait())
                .await
                .is_err()
            {
                warn!("Playwright bridge did not exit, killing it");
                child.kill().await?;
            }
        }
        self.reader.abort();
        match closed {
            Ok(()) | Err(EngineError::BridgeUnavailable(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Starts one [`PlaywrightDriver`] per test file
#[derive(Debug, Clone)]
pub struct PlaywrightLauncher {
    config: PlaywrightConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DriverFactory for PlaywrightLauncher {
    async fn launch(&self) -> EngineResult<Arc<dyn BrowserDriver>> {
        let driver = PlaywrightDriver::launch(&self.config).await?;
        Ok(Arc::new(driver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_lines() {
        assert_eq!(
            parse_bridge_line(r#"{"id":3,"ok":true,"result":"https://x/"}"#),
            BridgeMessage::Reply {
                id: 3,
                result: Ok(json!("https://x/"))
            }
        );
        assert_eq!(
            parse_bridge_line(r#"{"id":4,"ok":false,"error":"Timeout 10000ms exceeded."}"#),
            BridgeMessage::Reply {
                id: 4,
                result: Err("Timeout 10000ms exceeded.".to_string())
            }
        );
        assert_eq!(
            parse_bridge_line(r#"{"id":5,"ok":true}"#),
            BridgeMessage::Reply {
                id: 5,
                result: Ok(Value::Null)
            }
        );
    }

    #[test]
    fn test_parse_event_lines() {
        assert_eq!(
            parse_bridge_line(
                r#"{"event":"response","status":201,"method":"POST","url":"https://x/api"}"#
            ),
            BridgeMessage::Event(DriverEvent::Response {
                status: 201,
                method: "POST".to_string(),
                url: "https://x/api".to_string()
            })
        );
        assert_eq!(
            parse_bridge_line(r#"{"event":"requestfailed","method":"GET","url":"https://x/a"}"#),
            BridgeMessage::Event(DriverEvent::RequestFailed {
                method: "GET".to_string(),
                url: "https://x/a".to_string()
            })
        );
        assert_eq!(parse_bridge_line(r#"{"event":"ready"}"#), BridgeMessage::Ready);
        assert_eq!(
            parse_bridge_line(r#"{"event":"fatal","error":"no browser"}"#),
            BridgeMessage::Fatal("no browser".to_string())
        );
        assert_eq!(parse_bridge_line("Debugger attached."), BridgeMessage::Ignored);
    }

    #[test]
    fn test_edge_uses_chromium_channel() {
        let config = PlaywrightConfig {
            browser: BrowserKind::Edge,
            headless: false,
            node_binary: "node".to_string(),
            viewport: Viewport::default(),
        };
        let options = config.launch_options();
        assert_eq!(options["browser"], "chromium");
        assert_eq!(options["channel"], "msedge");
        assert_eq!(options["headless"], false);

        let firefox = PlaywrightConfig {
            browser: BrowserKind::Firefox,
            ..config
        };
        assert!(firefox.launch_options()["channel"].is_null());
    }

    #[tokio::test]
    async fn test_missing_node_binary_is_reported() {
        let config = PlaywrightConfig {
            browser: BrowserKind::Chromium,
            headless: true,
            node_binary: "/nonexistent/rowpilot-node".to_string(),
            viewport: Viewport::default(),
        };
        let result = PlaywrightDriver::launch(&config).await;
        assert!(matches!(result, Err(EngineError::BridgeUnavailable(_))));
    }
}
