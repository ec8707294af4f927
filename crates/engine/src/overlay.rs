//! Blocking-overlay detection and highlighted evidence capture
//!
//! Toasts, snackbars and modals frequently sit on top of the element a row
//! wants to highlight. Before painting the highlight the element's centre is
//! probed; if the topmost element there looks like a popup, the page is
//! polled until no foreground popup remains or the wait budget runs out.

use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use rowpilot_common::OverlayConfig;

use crate::driver::{settle_paint, BoundingBox, BrowserDriver, WaitState};
use crate::error::EngineResult;
use crate::selector::{normalize, split_targets};

/// Classifies the topmost element at a point. Argument: `{x, y}`.
pub const TOP_ELEMENT_PROBE: &str = r#"({ x, y }) => {
    const top = document.elementFromPoint(x, y);
    if (!top) return null;
    const style = window.getComputedStyle(top);
    const looksLikePopup =
        top.closest('[data-sonner-toast], [role="alert"], [role="status"], [data-type="error"], [data-type="success"], [aria-live], .toast, .snackbar, .alert, .popup, .modal, .dialog') !== null ||
        (["fixed", "absolute"].includes(style.position) && Number(style.zIndex) > 100);
    return { topTag: top.tagName, topClass: String(top.className || ""), topZ: style.zIndex, looksLikePopup };
}"#;

/// True while a foreground popup is still visible
pub const OVERLAY_VISIBLE_PROBE: &str = r#"() => {
    const popup = document.querySelector('[data-sonner-toast][data-visible="true"], [role="alert"], [role="status"], .toast, .snackbar, .alert, .popup, .modal, .dialog');
    if (!popup) return false;
    const style = window.getComputedStyle(popup);
    const visible = style.display !== "none" && style.visibility !== "hidden" &&
        popup.getAttribute("data-removed") !== "true" && popup.offsetParent !== null;
    const z = Number(style.zIndex) || 0;
    const foreground = z > 100 || style.position === "fixed" || style.position === "absolute";
    return visible && foreground;
}"#;

pub const READ_STYLE_SCRIPT: &str = r#"(e) => e.getAttribute("style") || """#;

pub const APPLY_HIGHLIGHT_SCRIPT: &str = r#"(e, color) => {
    e.style.outline = `4px solid ${color}`;
    e.style.outlineOffset = "5px";
    e.style.boxShadow = `0 0 10px 3px ${color}`;
}"#;

pub const RESTORE_STYLE_SCRIPT: &str = r#"(e, style) => e.setAttribute("style", style)"#;

/// What the page reports as the topmost element over a target
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TopElement {
    pub top_tag: String,
    #[serde(default)]
    pub top_class: String,
    #[serde(default)]
    pub top_z: String,
    pub looks_like_popup: bool,
}

/// Result of waiting out a blocking overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clearance {
    NotBlocked,
    Cleared { elapsed: Duration },
    /// Overlay still present after the full budget; evidence may include it
    TimedOut { waited: Duration },
}

impl Clearance {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Clearance::TimedOut { .. })
    }
}

/// Poll `still_blocked` every `interval` until it reports false or `max_wait`
/// has been spent. Probe errors count as cleared.
pub async fn poll_until_clear<F, Fut>(
    mut still_blocked: F,
    interval: Duration,
    max_wait: Duration,
) -> Clearance
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<bool>>,
{
    let mut waited = Duration::ZERO;

    while waited < max_wait {
        match still_blocked().await {
            Ok(true) => {}
            Ok(false) => return Clearance::Cleared { elapsed: waited },
            Err(e) => {
                debug!("Overlay probe failed, treating as cleared: {}", e);
                return Clearance::Cleared { elapsed: waited };
            }
        }
        debug!("Waiting for popup/toast/modal to disappear...");
        let step = interval.min(max_wait - waited);
        tokio::time::sleep(step).await;
        waited += step;
    }

    Clearance::TimedOut { waited: max_wait }
}

pub struct OverlayResolver<'a> {
    driver: &'a dyn BrowserDriver,
    interval: Duration,
    max_wait: Duration,
}

impl<'a> OverlayResolver<'a> {
    pub fn new(driver: &'a dyn BrowserDriver, config: &OverlayConfig) -> Self {
        Self {
            driver,
            interval: Duration::from_millis(config.poll_interval_ms),
            max_wait: Duration::from_millis(config.max_wait_ms),
        }
    }

    pub async fn top_element(&self, bbox: &BoundingBox) -> EngineResult<Option<TopElement>> {
        let (x, y) = bbox.center();
        let arg = json!({ "x": x, "y": y });
        let value = self.driver.evaluate(TOP_ELEMENT_PROBE, arg).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Wait for any popup covering `bbox` to go away.
    ///
    /// Returns the clearance and, when a popup was seen, a message for the
    /// row outcome.
    pub async fn resolve(&self, bbox: &BoundingBox) -> EngineResult<(Clearance, Option<String>)> {
        let top = match self.top_element(bbox).await? {
            Some(top) if top.looks_like_popup => top,
            _ => return Ok((Clearance::NotBlocked, None)),
        };

        info!("👻 PopUp/s appeared over target ({} z-index={})", top.top_tag, top.top_z);

        let driver = self.driver;
        let clearance = poll_until_clear(
            || async move {
                let visible = driver.evaluate(OVERLAY_VISIBLE_PROBE, Value::Null).await?;
                Ok(visible.as_bool().unwrap_or(false))
            },
            self.interval,
            self.max_wait,
        )
        .await;

        let message = match &clearance {
            Clearance::TimedOut { waited } => {
                let msg = format!(
                    "⚠️ Popup/s (z-index={}) blocked element for > {}ms. Screenshot may include overlay.",
                    top.top_z,
                    waited.as_millis()
                );
                warn!("{}", msg);
                msg
            }
            Clearance::Cleared { elapsed } => {
                let msg = format!(
                    "🍃 Popup/s disappeared after {:.2}s.",
                    elapsed.as_secs_f64()
                );
                info!("{}", msg);
                msg
            }
            Clearance::NotBlocked => return Ok((clearance, None)),
        };

        Ok((clearance, Some(message)))
    }
}

/// Evidence produced by [`highlight_and_capture`]
#[derive(Debug, Clone, Default)]
pub struct HighlightOutcome {
    pub screenshots: Vec<PathBuf>,
    pub highlighted: usize,
    pub degraded: bool,
    pub message: String,
}

/// Highlight every element of an `&`-separated selector expression and take
/// one full-page screenshot of them.
///
/// Unresolvable selectors are skipped with a warning. Original inline styles
/// are restored afterwards on a best-effort basis.
pub async fn highlight_and_capture(
    driver: &dyn BrowserDriver,
    expression: &str,
    screenshot_path: &Path,
    color: &str,
    overlay: &OverlayConfig,
    selector_timeout: Duration,
) -> HighlightOutcome {
    let targets = split_targets(expression);
    let mut outcome = HighlightOutcome::default();

    if targets.is_empty() {
        warn!("⚠️ No valid selector/s provided");
        outcome.message = "❌ No valid selector/s provided.".to_string();
        return outcome;
    }

    let resolver = OverlayResolver::new(driver, overlay);
    let mut notes = Vec::new();
    let mut highlighted: Vec<(String, String)> = Vec::new();

    for target in targets {
        let selector = normalize(target);
        match highlight_one(driver, &resolver, &selector, color, selector_timeout).await {
            Ok((original_style, clearance, note)) => {
                outcome.degraded |= clearance.is_degraded();
                notes.extend(note);
                highlighted.push((selector, original_style));
            }
            Err(e) => {
                warn!("⚠️ Failed to highlight selector {}: {}", selector, e);
            }
        }
    }

    if highlighted.is_empty() {
        warn!("⚠️ No elements found to highlight");
        notes.push("❌ No elements found to highlight.".to_string());
        outcome.message = notes.join(" ");
        return outcome;
    }

    if let Some(parent) = screenshot_path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!("Could not create {}: {}", parent.display(), e);
        }
    }
    settle_paint(driver).await;
    match driver.screenshot(screenshot_path, true).await {
        Ok(()) => outcome.screenshots.push(screenshot_path.to_path_buf()),
        Err(e) => {
            warn!("⚠️ Highlight screenshot failed: {}", e);
            notes.push(format!("❌ Highlight failed: {}", e));
        }
    }

    for (selector, style) in &highlighted {
        if let Err(e) = driver
            .eval_on_selector(selector, RESTORE_STYLE_SCRIPT, json!(style))
            .await
        {
            warn!("⚠️ Could not restore style of {}: {}", selector, e);
        }
    }

    outcome.highlighted = highlighted.len();
    notes.push(format!(
        "✅ Highlighted {} element(s) successfully.",
        highlighted.len()
    ));
    outcome.message = notes.join(" ");
    outcome
}

async fn highlight_one(
    driver: &dyn BrowserDriver,
    resolver: &OverlayResolver<'_>,
    selector: &str,
    color: &str,
    timeout: Duration,
) -> EngineResult<(String, Clearance, Option<String>)> {
    driver
        .wait_for_selector(selector, WaitState::Visible, timeout)
        .await?;

    let (clearance, note) = match driver.bounding_box(selector).await? {
        Some(bbox) => resolver.resolve(&bbox).await?,
        None => {
            warn!("⚠️ Element not visible or detached: {}", selector);
            (Clearance::NotBlocked, None)
        }
    };

    let original = driver
        .eval_on_selector(selector, READ_STYLE_SCRIPT, Value::Null)
        .await?;
    let original = original.as_str().unwrap_or_default().to_string();

    driver
        .eval_on_selector(selector, APPLY_HIGHLIGHT_SCRIPT, json!(color))
        .await?;

    Ok((original, clearance, note))
}
