//! Screenshot evidence for one test case

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use rowpilot_common::OverlayConfig;

use crate::driver::BrowserDriver;
use crate::overlay::{highlight_and_capture, HighlightOutcome};

/// Collects the evidence files produced while a row runs
pub struct EvidenceRecorder {
    screenshots_dir: PathBuf,
    /// Test case name with whitespace replaced
    stem: String,
    shots: Vec<PathBuf>,
}

impl EvidenceRecorder {
    pub fn new(screenshots_dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            screenshots_dir: screenshots_dir.into(),
            stem: stem.into(),
            shots: Vec::new(),
        }
    }

    /// `<dir>/<stem>_<action>.png`, whitespace in `action` replaced with `_`
    pub fn path_for(&self, action: &str) -> PathBuf {
        let action = action.split_whitespace().collect::<Vec<_>>().join("_");
        self.screenshots_dir
            .join(format!("{}_{}.png", self.stem, action))
    }

    /// Path for a file name used as-is
    pub fn named(&self, file_name: &str) -> PathBuf {
        self.screenshots_dir.join(file_name)
    }

    /// Full-page screenshot named after `action`. Capture errors are logged
    /// and never fail the row.
    pub async fn capture(&mut self, driver: &dyn BrowserDriver, action: &str) -> PathBuf {
        let path = self.path_for(action);
        self.capture_to(driver, path).await
    }

    pub async fn capture_to(&mut self, driver: &dyn BrowserDriver, path: PathBuf) -> PathBuf {
        if let Err(e) = tokio::fs::create_dir_all(&self.screenshots_dir).await {
            warn!("Could not create {}: {}", self.screenshots_dir.display(), e);
        }
        if let Err(e) = driver.screenshot(&path, true).await {
            warn!("⚠️ Screenshot failed for {}: {}", path.display(), e);
        } else if path_exists(&path).await {
            debug!("Screenshot saved: {}", path.display());
            self.shots.push(path.clone());
        } else {
            warn!("⚠️ Screenshot file not found after capture: {}", path.display());
        }
        path
    }

    /// Highlight `expression` and keep whatever screenshots resulted
    pub async fn highlight(
        &mut self,
        driver: &dyn BrowserDriver,
        expression: &str,
        path: &Path,
        color: &str,
        overlay: &OverlayConfig,
        timeout: Duration,
    ) -> HighlightOutcome {
        let outcome =
            highlight_and_capture(driver, expression, path, color, overlay, timeout).await;
        for shot in &outcome.screenshots {
            if path_exists(shot).await {
                self.shots.push(shot.clone());
            } else {
                warn!("⚠️ Highlight screenshot missing: {}", shot.display());
            }
        }
        outcome
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        self.shots
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
