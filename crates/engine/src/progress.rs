//! Two-pass progress accounting
//!
//! Pass 1 counts every populated action field and every unique expected
//! outcome clause of every row before anything runs. Pass 2 advances a
//! shared counter once per completed stage or clause. The counter is shared
//! by all concurrently running files through one [`ProgressTracker`] and is
//! mirrored to a [`ProgressSink`] so an external surface can follow along.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use rowpilot_common::TestRow;

use crate::error::EngineResult;
use crate::outcome::parse_clauses;
use crate::readable::rewrite_step_error;
use crate::runlog::RunLog;

/// Marker written by the surface when the operator closes it
pub const CLOSED_MARKER: &str = "CLOSED";

/// Marker written on a completed run
pub const DONE_MARKER: &str = "DONE";

/// Units of work a row contributes to the total
pub fn count_row_steps(row: &TestRow) -> u64 {
    let actions = row.populated_action_count() as u64;
    let clauses = row
        .expected_outcome
        .as_deref()
        .map(|expr| parse_clauses(expr).len() as u64)
        .unwrap_or(0);
    actions + clauses
}

/// Pass 1: total units across every row of every file
pub fn count_total_steps<'a>(rows: impl IntoIterator<Item = &'a TestRow>) -> u64 {
    rows.into_iter().map(count_row_steps).sum()
}

/// External progress surface
pub trait ProgressSink: Send + Sync {
    fn start(&self, total: u64) -> EngineResult<()>;

    fn update(&self, completed: u64);

    /// `finished` is true when the run completed rather than aborted
    fn close(&self, finished: bool);

    fn is_cancelled(&self) -> bool;
}

/// Sink for runs without a progress surface
#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn start(&self, _total: u64) -> EngineResult<()> {
        Ok(())
    }

    fn update(&self, _completed: u64) {}

    fn close(&self, _finished: bool) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Persists the running count to a file polled by an external surface.
///
/// The surface reports closure by writing [`CLOSED_MARKER`] into the file or
/// by removing it.
pub struct FileProgressSink {
    path: PathBuf,
    started: AtomicBool,
}

impl FileProgressSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            started: AtomicBool::new(false),
        }
    }

    fn write(&self, content: &str) {
        if let Err(e) = fs::write(&self.path, content) {
            warn!("Could not write progress file {}: {}", self.path.display(), e);
        }
    }
}

impl ProgressSink for FileProgressSink {
    fn start(&self, total: u64) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, "0")?;
        self.started.store(true, Ordering::SeqCst);
        info!("📄 Progress file initialized at: {} ({} steps)", self.path.display(), total);
        Ok(())
    }

    fn update(&self, completed: u64) {
        if self.is_cancelled() {
            return;
        }
        self.write(&completed.to_string());
    }

    fn close(&self, finished: bool) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        self.write(if finished { DONE_MARKER } else { CLOSED_MARKER });
    }

    fn is_cancelled(&self) -> bool {
        if !self.started.load(Ordering::SeqCst) {
            return false;
        }
        match fs::read_to_string(&self.path) {
            Ok(content) => content.trim() == CLOSED_MARKER,
            Err(_) => true,
        }
    }
}

/// One completed unit of work
#[derive(Debug, Clone)]
pub struct StepReport {
    pub action: String,
    pub description: String,
    /// Raw error text when the step failed
    pub issue: Option<String>,
    /// Serious issues abort the run
    pub serious: bool,
}

impl StepReport {
    pub fn ok(action: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            description: description.into(),
            issue: None,
            serious: false,
        }
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issue = Some(issue.into());
        self
    }

    pub fn serious(mut self) -> Self {
        self.serious = true;
        self
    }
}

/// Shared run-wide counters
pub struct ProgressTracker {
    total: u64,
    completed: AtomicU64,
    cancelled: AtomicBool,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressTracker {
    pub fn new(total: u64, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            total,
            completed: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            sink,
        }
    }

    /// Tracker that reports nowhere
    pub fn detached(total: u64) -> Self {
        Self::new(total, Arc::new(NullProgressSink))
    }

    pub fn start(&self) -> EngineResult<()> {
        info!("ℹ️ Total steps to run: {}", self.total);
        self.sink.start(self.total)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Rounded completion percentage
    pub fn percent(&self) -> u64 {
        if self.total == 0 {
            return 0;
        }
        (self.completed() * 100 + self.total / 2) / self.total
    }

    /// Count one completed unit and report it. Returns the new count.
    pub fn advance(&self, step: &StepReport, log: &RunLog) -> u64 {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;

        if completed < self.total {
            info!("⏳ Step {}/{}({}):: {}", completed, self.total, step.action, step.description);
            log.line(format!(
                "⏳ Step {}/{}({}):: {}",
                completed, self.total, step.action, step.description
            ));
        } else if completed == self.total {
            info!("⌛ Step {}/{}({}):: {}", completed, self.total, step.action, step.description);
            log.line(format!(
                "⌛ Step {}/{}({}):: {}",
                completed, self.total, step.action, step.description
            ));
        } else {
            debug!("Step {} beyond precomputed total {}", completed, self.total);
        }

        if let Some(issue) = &step.issue {
            let friendly = rewrite_step_error(&step.description, issue);
            if step.serious {
                error!("❌ Step {} Error: {}", completed, friendly);
                log.line(format!("❌ Step {} (ERROR): {}", completed, friendly));
            } else {
                warn!("⚠️ Step {} Issue: {}", completed, friendly);
                log.line(format!("⚠️ Step {} (ISSUE): {}", completed, friendly));
            }
        }

        self.sink.update(completed);
        completed
    }

    /// Abort the run: every file stops before its next row
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            warn!("🛑 Run cancelled at {}% ({}/{})", self.percent(), self.completed(), self.total);
            self.sink.close(false);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.sink.is_cancelled()
    }

    /// Mark the persisted value as complete at the end of a file run
    pub fn persist_total(&self) {
        if !self.is_cancelled() {
            self.sink.update(self.total);
        }
    }

    /// Close the sink at the end of the whole run
    pub fn finish(&self) {
        if self.is_cancelled() {
            return;
        }
        self.sink.update(self.total);
        self.sink.close(true);
        info!("🎉 All tests completed! Progress marked 100%");
    }
}
