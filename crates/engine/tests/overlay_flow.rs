//! Highlighting against pages with and without blocking popups

mod support;

use std::time::Duration;

use rowpilot_common::OverlayConfig;
use rowpilot_engine::overlay::highlight_and_capture;
use support::MockDriver;
use tempfile::TempDir;

const SELECTOR_TIMEOUT: Duration = Duration::from_millis(10);

fn overlay(poll_interval_ms: u64, max_wait_ms: u64) -> OverlayConfig {
    OverlayConfig {
        poll_interval_ms,
        max_wait_ms,
    }
}

fn shot(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("screenshots").join("Case_highlight.png")
}

#[tokio::test(start_paused = true)]
async fn test_popup_that_disappears_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new().popup("9999", 3);

    let outcome = highlight_and_capture(
        &driver,
        "#save",
        &shot(&dir),
        "red",
        &overlay(200, 10_000),
        SELECTOR_TIMEOUT,
    )
    .await;

    assert!(!outcome.degraded);
    assert_eq!(outcome.highlighted, 1);
    assert_eq!(
        outcome.message,
        "🍃 Popup/s disappeared after 0.60s. ✅ Highlighted 1 element(s) successfully."
    );
    assert_eq!(outcome.screenshots, vec![shot(&dir)]);
}

#[tokio::test(start_paused = true)]
async fn test_popup_that_stays_degrades_the_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new().popup("9999", usize::MAX);
    let start = tokio::time::Instant::now();

    let outcome = highlight_and_capture(
        &driver,
        "#save",
        &shot(&dir),
        "red",
        &overlay(200, 1_000),
        SELECTOR_TIMEOUT,
    )
    .await;

    assert!(outcome.degraded);
    assert!(start.elapsed() >= Duration::from_millis(1_000));
    assert!(outcome.message.starts_with(
        "⚠️ Popup/s (z-index=9999) blocked element for > 1000ms. Screenshot may include overlay."
    ));
    assert_eq!(outcome.highlighted, 1);
    assert_eq!(outcome.screenshots.len(), 1);
}

#[tokio::test]
async fn test_unresolvable_selector_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new().missing("#gone");

    let outcome = highlight_and_capture(
        &driver,
        "#gone & id=save",
        &shot(&dir),
        "blue",
        &overlay(5, 10),
        SELECTOR_TIMEOUT,
    )
    .await;

    assert_eq!(outcome.highlighted, 1);
    assert_eq!(outcome.message, "✅ Highlighted 1 element(s) successfully.");
    let calls = driver.calls();
    assert!(calls.contains(&"outline #save".to_string()));
    assert!(!calls.contains(&"outline #gone".to_string()));
    assert!(calls.contains(&"restore #save".to_string()));
}

#[tokio::test]
async fn test_nothing_resolvable_takes_no_screenshot() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new().missing("#gone");

    let outcome =
        highlight_and_capture(&driver, "#gone", &shot(&dir), "red", &overlay(5, 10), SELECTOR_TIMEOUT)
            .await;

    assert_eq!(outcome.highlighted, 0);
    assert_eq!(outcome.message, "❌ No elements found to highlight.");
    assert!(outcome.screenshots.is_empty());
    assert!(!shot(&dir).exists());
}

#[tokio::test]
async fn test_style_restore_failure_keeps_the_highlight() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new().restore_fails();

    let outcome = highlight_and_capture(
        &driver,
        "#a & #b",
        &shot(&dir),
        "red",
        &overlay(5, 10),
        SELECTOR_TIMEOUT,
    )
    .await;

    assert_eq!(outcome.highlighted, 2);
    assert_eq!(outcome.message, "✅ Highlighted 2 element(s) successfully.");
    assert_eq!(outcome.screenshots, vec![shot(&dir)]);
    let restores = driver
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("restore"))
        .count();
    assert_eq!(restores, 2);
}
