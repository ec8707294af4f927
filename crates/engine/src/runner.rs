//! Multi-file test run
//!
//! Pass 1 counts every step of every file. Pass 2 runs all files at once,
//! one task and one browser per file, sharing a single [`ProgressTracker`].

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use rowpilot_common::RunnerConfig;

use crate::driver::DriverFactory;
use crate::error::{EngineError, EngineResult};
use crate::executor::{RowContext, RowExecutor};
use crate::loader::TestFile;
use crate::network::NetworkCorrelator;
use crate::progress::{count_total_steps, ProgressSink, ProgressTracker};
use crate::report::{run_timestamp, FileReport, ReportWriter, ResultLayout};
use crate::runlog::RunLog;

/// Aggregate of a whole run
#[derive(Debug, Clone, Default)]
pub struct SuiteSummary {
    pub files: Vec<FileReport>,
    /// Files that could not be run at all
    pub errors: Vec<String>,
    pub total_steps: u64,
    pub completed_steps: u64,
    pub cancelled: bool,
}

impl SuiteSummary {
    pub fn total_cases(&self) -> usize {
        self.files.iter().map(|f| f.cases.len()).sum()
    }

    pub fn passed(&self) -> usize {
        self.files.iter().map(FileReport::passed).sum()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().map(FileReport::failed).sum()
    }

    pub fn success(&self) -> bool {
        self.failed() == 0 && self.errors.is_empty()
    }
}

pub struct SuiteRunner {
    config: Arc<RunnerConfig>,
    drivers: Arc<dyn DriverFactory>,
    reports: Arc<dyn ReportWriter>,
    sink: Arc<dyn ProgressSink>,
}

impl SuiteRunner {
    pub fn new(
        config: RunnerConfig,
        drivers: Arc<dyn DriverFactory>,
        reports: Arc<dyn ReportWriter>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            drivers,
            reports,
            sink,
        }
    }

    pub async fn run(&self, files: Vec<TestFile>) -> EngineResult<SuiteSummary> {
        let total = count_total_steps(files.iter().flat_map(|file| file.rows.iter()));
        let tracker = Arc::new(ProgressTracker::new(total, Arc::clone(&self.sink)));
        tracker.start()?;

        let timestamp = run_timestamp();
        let mut tasks = JoinSet::new();

        for file in files {
            let config = Arc::clone(&self.config);
            let drivers = Arc::clone(&self.drivers);
            let reports = Arc::clone(&self.reports);
            let tracker = Arc::clone(&tracker);
            let timestamp = timestamp.clone();

            tasks.spawn(async move {
                let name = file.path.display().to_string();
                info!("📂 Test file: {}", name);
                let result =
                    run_file(file, &config, drivers.as_ref(), reports.as_ref(), &tracker, &timestamp)
                        .await;
                (name, result)
            });
        }

        let mut summary = SuiteSummary {
            total_steps: total,
            ..Default::default()
        };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(report))) => {
                    info!(
                        "✅ Finished test file: {} ({} passed, {} failed)",
                        name,
                        report.passed(),
                        report.failed()
                    );
                    summary.cancelled |= report.cancelled;
                    summary.files.push(report);
                }
                Ok((name, Err(e))) => {
                    error!("❌ Test file {} could not run: {}", name, e);
                    summary.errors.push(format!("{}: {}", name, e));
                }
                Err(e) => {
                    let e = EngineError::Task(e.to_string());
                    error!("❌ {}", e);
                    summary.errors.push(e.to_string());
                }
            }
        }

        summary.files.sort_by(|a, b| a.file.cmp(&b.file));
        summary.completed_steps = tracker.completed();
        summary.cancelled |= tracker.is_cancelled();
        tracker.finish();

        info!(
            "Test Results: {} passed, {} failed across {} file(s)",
            summary.passed(),
            summary.failed(),
            summary.files.len()
        );
        Ok(summary)
    }
}

/// Run every row of one file against its own browser
pub async fn run_file(
    file: TestFile,
    config: &RunnerConfig,
    drivers: &dyn DriverFactory,
    reports: &dyn ReportWriter,
    tracker: &ProgressTracker,
    timestamp: &str,
) -> EngineResult<FileReport> {
    let started_at = Utc::now();
    let started = Instant::now();

    let log = RunLog::new();
    log.line(format!("📂 Test file: {}", file.path.display()));

    let layout = ResultLayout::new(&config.results_dir, &file.base_name(), timestamp);
    layout.create()?;
    log.open(&layout.log_path())?;
    log.line(format!("🌐 Browser: {}", config.browser));
    log.line(format!("ℹ️ Total steps to run: {}", tracker.total()));

    let driver = drivers.launch().await?;
    let network = Arc::new(NetworkCorrelator::new(config.network_freshness()));
    let listener = driver.take_events().map(|events| network.spawn_listener(events));

    let screenshots_dir = layout.screenshots_dir();
    let downloads_dir = layout.downloads_dir();
    let ctx = RowContext {
        driver: driver.as_ref(),
        network: &network,
        tracker,
        log: &log,
        config,
        screenshots_dir: &screenshots_dir,
        downloads_dir: &downloads_dir,
    };

    let mut cases = Vec::with_capacity(file.rows.len());
    let mut cancelled = false;

    for row in &file.rows {
        if tracker.is_cancelled() {
            let message = format!(
                "🛑 Testing was stopped at {}% ({}/{}) Before reaching: TestCase({})",
                tracker.percent(),
                tracker.completed(),
                tracker.total(),
                row.test_case
            );
            warn!("{}", message);
            log.line(message);
            cancelled = true;
            break;
        }

        let run = RowExecutor::new(ctx, row).run().await;
        cases.push(run.result);
        if run.serious {
            cancelled = true;
            break;
        }
    }

    tracker.persist_total();

    if let Err(e) = driver.close().await {
        warn!("Browser did not close cleanly: {}", e);
    }
    if let Some(listener) = listener {
        listener.abort();
    }

    let report = FileReport {
        file: file.path.clone(),
        browser: config.browser.to_string(),
        started_at,
        total_seconds: started.elapsed().as_secs_f64(),
        cancelled,
        cases,
        network_history: network.history(),
    };

    if let Err(e) = reports.write(&report, &layout) {
        error!("Could not write report for {}: {}", file.path.display(), e);
        log.line(format!("❌ Could not write report: {}", e));
    }
    log.line(format!("✅ Finished test file: {}", file.path.display()));

    Ok(report)
}
