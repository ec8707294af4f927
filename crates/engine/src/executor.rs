//! Per-row step sequencer
//!
//! A row runs its stages in a fixed order, whichever fields are populated:
//!
//! ```text
//! Goto → WaitForDocumentLoaded → Write → (Highlight | Screenshot) → Keyboard
//!      → Download → Select → SelectButton → Click → ExpectedOutcome → Wait
//! ```
//!
//! Stages are independent. A failing stage marks the row `Fail` and the next
//! stage still runs, except for navigation failures, which cancel the run.

use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use rowpilot_common::{ActionRecord, RunnerConfig, TestCaseResult, TestRow, Verdict};

use crate::device::DeviceProfile;
use crate::driver::{settle_paint, BrowserDriver, LoadState, WaitState};
use crate::error::{EngineError, EngineResult};
use crate::evidence::EvidenceRecorder;
use crate::network::NetworkCorrelator;
use crate::outcome::{parse_clauses, OutcomeEvaluator};
use crate::progress::{ProgressTracker, StepReport};
use crate::readable::rewrite_step_error;
use crate::runlog::RunLog;
use crate::selector::{normalize, split_target};

/// Liveness tick interval while a Wait stage blocks
const WAIT_TICK: Duration = Duration::from_secs(1);

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Everything a row needs from its file run
#[derive(Clone, Copy)]
pub struct RowContext<'a> {
    pub driver: &'a dyn BrowserDriver,
    pub network: &'a NetworkCorrelator,
    pub tracker: &'a ProgressTracker,
    pub log: &'a RunLog,
    pub config: &'a RunnerConfig,
    pub screenshots_dir: &'a Path,
    pub downloads_dir: &'a Path,
}

/// Outcome of running one row
#[derive(Debug, Clone)]
pub struct RowRun {
    pub result: TestCaseResult,
    /// Navigation failed; the rest of the run is cancelled
    pub serious: bool,
}

pub struct RowExecutor<'a> {
    ctx: RowContext<'a>,
    row: &'a TestRow,
    evidence: EvidenceRecorder,
    executed: Vec<String>,
    records: Vec<ActionRecord>,
    narrative: String,
    verdict: Verdict,
    serious: bool,
}

impl<'a> RowExecutor<'a> {
    pub fn new(ctx: RowContext<'a>, row: &'a TestRow) -> Self {
        Self {
            evidence: EvidenceRecorder::new(ctx.screenshots_dir, row.file_stem()),
            ctx,
            row,
            executed: Vec::new(),
            records: Vec::new(),
            narrative: String::new(),
            verdict: Verdict::Pass,
            serious: false,
        }
    }

    pub async fn run(mut self) -> RowRun {
        let started = Instant::now();
        let row = self.row;
        let driver = self.ctx.driver;

        info!("---------- 🎌 TestCase: ({}) ----------", row.test_case);
        self.ctx
            .log
            .line(format!("---------- 🎌 TestCase to run: ({}) ----------", row.test_case));

        let profile = DeviceProfile::resolve(row.device_type.as_deref());
        self.ctx.log.line(format!(
            "📱 Device Type specified \"{}\": {}",
            row.test_case, profile.name
        ));
        if let Err(e) = driver.set_viewport(profile.viewport).await {
            warn!("Could not apply viewport for {}: {}", profile.name, e);
        }

        if let Some(url) = row.goto.as_deref() {
            self.goto(url).await;
            if self.serious {
                return self.finish(started, &profile);
            }
        }

        let baseline_url = driver.current_url().await.unwrap_or_default();

        if let Some(value) = row.wait_for_document_loaded.as_deref() {
            self.wait_for_document_loaded(value).await;
        }

        if let Some(value) = row.write.as_deref() {
            let result = self.write(value).await;
            self.finish_stage("Write", format!("Filled input: {}", value), result);
        }

        if let Some(value) = row.highlight.as_deref() {
            self.highlight(value).await;
        } else if row.screenshot {
            self.evidence.capture(driver, "screenshot").await;
        }

        if let Some(value) = row.keyboard.as_deref() {
            self.keyboard(value).await;
        }

        if let Some(value) = row.download.as_deref() {
            self.download(value).await;
        }

        if let Some(value) = row.select.as_deref() {
            let result = self.select(value).await;
            let option = split_target(value).1.unwrap_or_default();
            self.finish_stage("Select", format!("Selected: {} in {}", option, value), result);
        }

        if let Some(value) = row.select_button.as_deref() {
            let result = self.select_button(value).await;
            self.finish_stage("SelectButton", format!("Selected Button: {}", value), result);
        }

        if let Some(value) = row.click.as_deref() {
            let result = self.click(value).await;
            self.finish_stage("Click", format!("Clicked: {}", value), result);
        }

        if let Some(expression) = row.expected_outcome.as_deref() {
            self.expected_outcome(expression, &baseline_url).await;
        }

        if let Some(value) = row.wait.as_deref() {
            self.wait(value).await;
        }

        self.finish(started, &profile)
    }

    /// Attribute the freshest network event to an action
    fn record(&mut self, action_type: &str, value: &str) {
        let attribution = self.ctx.network.correlate();
        self.records.push(ActionRecord {
            test_case: self.row.test_case.clone(),
            action_type: action_type.to_string(),
            selector_or_value: value.to_string(),
            method: attribution.method,
            url: attribution.url,
            network_status: attribution.status,
        });
    }

    fn advance(&self, report: StepReport) {
        self.ctx.tracker.advance(&report, self.ctx.log);
    }

    fn fail(&mut self, description: &str, error: &EngineError) {
        self.verdict = Verdict::Fail;
        let friendly = rewrite_step_error(description, &error.to_string());
        self.narrative.push_str(&format!("❌ {} ", friendly));
    }

    /// Count a finished stage and fold its failure into the row
    fn finish_stage(&mut self, action: &str, description: String, result: EngineResult<()>) {
        match result {
            Ok(()) => self.advance(StepReport::ok(action, description)),
            Err(e) => {
                self.fail(&description, &e);
                self.advance(StepReport::ok(action, description).with_issue(e.to_string()));
            }
        }
    }

    async fn goto(&mut self, url: &str) {
        let driver = self.ctx.driver;
        let description = format!("Navigated to: {}", url);

        let navigated = async {
            let status = driver.goto(url).await?;
            driver.wait_for_load_state(LoadState::NetworkIdle).await?;
            settle_paint(driver).await;
            Ok::<_, EngineError>(status)
        }
        .await;

        match navigated {
            Ok(status) => {
                let attribution = self.ctx.network.correlate();
                self.records.push(ActionRecord {
                    test_case: self.row.test_case.clone(),
                    action_type: "GoTo".to_string(),
                    selector_or_value: url.to_string(),
                    method: Some("GET".to_string()),
                    url: Some(url.to_string()),
                    network_status: status.or(attribution.status),
                });
                self.executed.push("GoTo".to_string());
                self.advance(StepReport::ok("Go To", description));
            }
            Err(e) => {
                self.fail(&description, &e);
                self.advance(
                    StepReport::ok("Go To", description)
                        .with_issue(e.to_string())
                        .serious(),
                );
                self.ctx.tracker.cancel();
                self.serious = true;
            }
        }
    }

    async fn wait_for_document_loaded(&mut self, value: &str) {
        if !value.trim().eq_ignore_ascii_case("true") {
            debug!("Skipping document load wait for value '{}'", value);
            return;
        }
        let result = self.ctx.driver.wait_for_load_state(LoadState::Load).await;
        if result.is_ok() {
            self.record("DocumentLoaded", "true");
            self.executed.push("DocumentLoaded".to_string());
        }
        self.finish_stage(
            "Wait For Document Loaded",
            "Waited for document to fully load!".to_string(),
            result,
        );
    }

    async fn write(&mut self, value: &str) -> EngineResult<()> {
        let driver = self.ctx.driver;
        let (target, text) = split_target(value);
        let text = text.ok_or_else(|| EngineError::invalid_action(value, "expected selector:value"))?;
        let selector = normalize(target);

        driver
            .wait_for_selector(&selector, WaitState::Visible, ms(self.ctx.config.timeouts.write_ms))
            .await?;
        driver.fill(&selector, text).await?;

        self.record("Write", value);
        self.executed.push("Write".to_string());
        Ok(())
    }

    async fn highlight(&mut self, value: &str) {
        let ctx = self.ctx;
        let path = self.evidence.path_for("highlight");
        let outcome = self
            .evidence
            .highlight(
                ctx.driver,
                value,
                &path,
                self.row.outline_color(),
                &ctx.config.overlay,
                ms(ctx.config.timeouts.highlight_ms),
            )
            .await;

        if !self.narrative.is_empty() {
            self.narrative.push('\n');
        }
        self.narrative.push_str(&outcome.message);
        self.narrative.push(' ');

        self.record("Highlight", value);
        self.executed.push("Highlight".to_string());
        self.advance(StepReport::ok("Highlight", format!("Highlighted: {}", value)));
    }

    async fn keyboard(&mut self, value: &str) {
        let driver = self.ctx.driver;
        let chord = KeyChord::parse(value);

        self.evidence.capture(driver, &format!("Before_{}", value)).await;

        let (navigation, pressed) = tokio::join!(
            driver.wait_for_navigation(ms(self.ctx.config.timeouts.navigation_settle_ms)),
            chord.dispatch(driver)
        );
        if let Err(e) = navigation {
            debug!("No navigation after key input '{}': {}", value, e);
        }

        let description = format!("Pressed key(s): {}", chord);
        match pressed {
            Ok(()) => {
                settle_paint(driver).await;
                if chord.is_combination() {
                    self.narrative
                        .push_str(&format!("✅ Pressed key combination '{}' successfully. ", chord));
                } else {
                    self.narrative
                        .push_str(&format!("✅ Pressed '{}' successfully. ", chord));
                }
                self.record("Keyboard", value);
                self.executed.push("Keyboard".to_string());
                self.finish_stage("Keyboard", description, Ok(()));
            }
            Err(e) => self.finish_stage("Keyboard", description, Err(e)),
        }

        self.evidence.capture(driver, &format!("After_{}", value)).await;
    }

    async fn download(&mut self, value: &str) {
        let ctx = self.ctx;
        let timeout = ms(ctx.config.timeouts.download_ms);
        let selector = normalize(value);

        let saved = async {
            ctx.driver
                .wait_for_selector(&selector, WaitState::Attached, timeout)
                .await?;
            let (download, ()) = tokio::try_join!(
                ctx.driver.wait_for_download(timeout),
                ctx.driver.click(&selector)
            )?;

            let name = download.suggested_filename.clone();
            let path = ctx.downloads_dir.join(&name);
            tokio::fs::create_dir_all(ctx.downloads_dir).await?;
            ctx.driver.save_download(&download, &path).await?;

            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                Ok(name)
            } else {
                Err(EngineError::DownloadMissing(name))
            }
        }
        .await;

        match saved {
            Ok(name) => {
                info!("📥 Downloaded {} into {}", name, ctx.downloads_dir.display());
                self.narrative
                    .push_str(&format!("✅ File downloaded: {}. ", name));
                self.record("Download", value);
                self.executed.push("Download".to_string());
                self.finish_stage("Download", format!("Download file: {}", name), Ok(()));
            }
            Err(e) => {
                warn!("⚠️ Download failed: {}", e);
                let description = match &e {
                    EngineError::DownloadMissing(name) => {
                        format!("Download file: {} wasn't completed", name)
                    }
                    _ => format!("Download file: {}", value),
                };
                self.finish_stage("Download", description, Err(e));
            }
        }
    }

    async fn select(&mut self, value: &str) -> EngineResult<()> {
        let driver = self.ctx.driver;
        let (target, option) = split_target(value);
        let option =
            option.ok_or_else(|| EngineError::invalid_action(value, "expected selector:option"))?;
        let selector = normalize(target);

        driver
            .wait_for_selector(&selector, WaitState::Visible, ms(self.ctx.config.timeouts.select_ms))
            .await?;
        driver.select_option(&selector, option).await?;

        self.record("Select", value);
        self.executed.push("Select".to_string());
        Ok(())
    }

    async fn select_button(&mut self, value: &str) -> EngineResult<()> {
        let ctx = self.ctx;
        let timeouts = &ctx.config.timeouts;
        self.executed.push("SelectButton".to_string());

        let (trigger, option) = split_target(value);
        let selector = normalize(trigger);
        ctx.driver
            .wait_for_selector(&selector, WaitState::Visible, ms(timeouts.select_button_ms))
            .await?;
        ctx.driver.click(&selector).await?;
        self.record("SelectButton (Open)", value);

        let Some(option) = option.filter(|o| !o.is_empty()) else {
            return Ok(());
        };

        let option_selector = format!("text={}", option);
        ctx.driver
            .wait_for_selector(&option_selector, WaitState::Visible, ms(timeouts.option_ms))
            .await?;
        ctx.driver.click(&option_selector).await?;
        self.record("SelectButton (Choose)", option);

        if self.row.highlight.is_some() {
            let path = self.evidence.path_for("selectbutton_choose");
            self.evidence
                .highlight(
                    ctx.driver,
                    &option_selector,
                    &path,
                    self.row.outline_color(),
                    &ctx.config.overlay,
                    ms(timeouts.highlight_ms),
                )
                .await;
        }
        Ok(())
    }

    async fn click(&mut self, value: &str) -> EngineResult<()> {
        let driver = self.ctx.driver;
        let selector = normalize(value);

        driver
            .wait_for_selector(&selector, WaitState::Visible, ms(self.ctx.config.timeouts.click_ms))
            .await?;
        settle_paint(driver).await;
        driver.click(&selector).await?;

        self.record("Click", value);
        self.executed.push("Click".to_string());
        Ok(())
    }

    async fn expected_outcome(&mut self, expression: &str, baseline_url: &str) {
        let ctx = self.ctx;
        let evaluator = OutcomeEvaluator {
            driver: ctx.driver,
            baseline_url,
            timeouts: &ctx.config.timeouts,
            overlay: &ctx.config.overlay,
            outline_color: self.row.outline_color(),
        };

        for clause in parse_clauses(expression) {
            let verdict = evaluator.evaluate(&clause, &mut self.evidence).await;
            self.narrative.push_str(&verdict.narrative);

            let mut report = StepReport::ok("Expected Outcome", verdict.description.clone());
            if !verdict.passed {
                self.verdict = Verdict::Fail;
                if let Some(issue) = verdict.issue {
                    let friendly = rewrite_step_error(&verdict.description, &issue);
                    self.narrative.push_str(&format!("❌ {} ", friendly));
                    report = report.with_issue(issue);
                }
            }
            self.advance(report);
        }
    }

    async fn wait(&mut self, value: &str) {
        let requested = leading_integer(value);
        let wait_ms = if requested > 0 {
            requested as u64
        } else {
            self.ctx.config.timeouts.default_wait_ms
        };
        self.executed.push("Wait".to_string());

        let sleep = tokio::time::sleep(ms(wait_ms));
        tokio::pin!(sleep);
        let mut ticker = tokio::time::interval(WAIT_TICK);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                _ = ticker.tick() => debug!("Waiting for {}ms...", wait_ms),
            }
        }

        self.advance(StepReport::ok("Wait", format!("Waited: {}ms", wait_ms)));
    }

    fn finish(self, started: Instant, profile: &DeviceProfile) -> RowRun {
        let outcome = if self.executed.is_empty() {
            self.narrative.trim_end().to_string()
        } else if self.narrative.trim().is_empty() {
            format!("Run Action: {}", self.executed.join(","))
        } else {
            format!(
                "Run Action: {}\n{}",
                self.executed.join(","),
                self.narrative.trim_end()
            )
        };

        match self.verdict {
            Verdict::Pass => info!("✅ TestCase {} passed", self.row.test_case),
            Verdict::Fail => warn!("❌ TestCase {} failed", self.row.test_case),
        }
        self.ctx.log.line(format!(
            "{} TestCase {}: {}",
            if self.verdict == Verdict::Pass { "✅" } else { "❌" },
            self.row.test_case,
            self.verdict
        ));

        RowRun {
            result: TestCaseResult {
                name: self.row.test_case.clone(),
                verdict: self.verdict,
                duration_seconds: started.elapsed().as_secs_f64(),
                outcome,
                evidence: self.evidence.into_paths(),
                device_tag: self.row.device_tag(),
                viewport: profile.viewport,
                executed_actions: self.executed,
                network: self.records,
            },
            serious: self.serious,
        }
    }
}

/// Keyboard input: one key, or modifiers held around a final key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    keys: Vec<String>,
}

impl KeyChord {
    /// Parse `+`-separated friendly key names
    pub fn parse(value: &str) -> Self {
        Self {
            keys: value
                .split('+')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(driver_key_name)
                .collect(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn is_combination(&self) -> bool {
        self.keys.len() > 1
    }

    /// Hold all but the last key, press the last, release in reverse
    pub async fn dispatch(&self, driver: &dyn BrowserDriver) -> EngineResult<()> {
        let Some((last, modifiers)) = self.keys.split_last() else {
            return Err(EngineError::invalid_action("", "no key given"));
        };
        for key in modifiers {
            driver.key_down(key).await?;
        }
        driver.key_press(last).await?;
        for key in modifiers.iter().rev() {
            driver.key_up(key).await?;
        }
        Ok(())
    }
}

impl std::fmt::Display for KeyChord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keys.join("+"))
    }
}

/// Leading decimal integer of `value` after trimming, with an optional sign.
/// Anything unparsable is 0.
pub fn leading_integer(value: &str) -> i64 {
    let value = value.trim();
    let digits_start = usize::from(value.starts_with(['-', '+']));
    let digits_end = value[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(value.len(), |i| digits_start + i);
    value[..digits_end].parse().unwrap_or(0)
}

/// Map a friendly key name to the driver's key name
pub fn driver_key_name(name: &str) -> String {
    let mapped = match name.to_lowercase().as_str() {
        "enter" => "Enter",
        "tab" => "Tab",
        "del" | "delete" => "Delete",
        "esc" | "escape" => "Escape",
        "backspace" => "Backspace",
        "arrowup" => "ArrowUp",
        "arrowdown" => "ArrowDown",
        "arrowleft" => "ArrowLeft",
        "arrowright" => "ArrowRight",
        "ctrl" | "control" => "Control",
        "shift" => "Shift",
        "alt" => "Alt",
        "meta" => "Meta",
        _ => return name.to_string(),
    };
    mapped.to_string()
}
