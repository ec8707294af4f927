//! Result directory layout and report writers

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use rowpilot_common::{NetworkSnapshot, TestCaseResult};

use crate::error::EngineResult;
use crate::probe::EvidenceInfo;

/// Timestamp format used in result folder and file names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn run_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// `<results>/<base>_<timestamp>_results/` and everything inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLayout {
    dir: PathBuf,
    prefix: String,
}

impl ResultLayout {
    pub fn new(results_root: &Path, base_name: &str, timestamp: &str) -> Self {
        let prefix = format!("{}_{}", base_name, timestamp);
        Self {
            dir: results_root.join(format!("{}_results", prefix)),
            prefix,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.dir.join("screenshots")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.dir.join("downloads")
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(format!("{}_runLog.txt", self.prefix))
    }

    pub fn report_path(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("{}_result.{}", self.prefix, extension))
    }

    pub fn create(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.screenshots_dir())?;
        std::fs::create_dir_all(self.downloads_dir())?;
        Ok(())
    }
}

/// Everything produced by one test file run
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: PathBuf,
    pub browser: String,
    pub started_at: DateTime<Utc>,
    pub total_seconds: f64,
    /// Stopped early by a cancellation
    pub cancelled: bool,
    pub cases: Vec<TestCaseResult>,
    /// Recent raw network events
    pub network_history: Vec<NetworkSnapshot>,
}

impl FileReport {
    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|c| c.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.cases.len() - self.passed()
    }
}

/// Persists a [`FileReport`]
pub trait ReportWriter: Send + Sync {
    fn write(&self, report: &FileReport, layout: &ResultLayout) -> EngineResult<PathBuf>;
}

/// Writes `<prefix>_result.json` with evidence metrics
#[derive(Debug, Default)]
pub struct JsonReportWriter;

#[derive(Serialize)]
struct JsonCase<'a> {
    #[serde(flatten)]
    result: &'a TestCaseResult,
    device: &'a str,
    evidence_info: Vec<EvidenceInfo>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    file: &'a Path,
    browser: &'a str,
    started_at: DateTime<Utc>,
    total_seconds: f64,
    cancelled: bool,
    passed: usize,
    failed: usize,
    cases: Vec<JsonCase<'a>>,
    network_history: &'a [NetworkSnapshot],
}

impl ReportWriter for JsonReportWriter {
    fn write(&self, report: &FileReport, layout: &ResultLayout) -> EngineResult<PathBuf> {
        let cases = report
            .cases
            .iter()
            .map(|result| JsonCase {
                result,
                device: result.device_label(),
                evidence_info: result
                    .evidence
                    .iter()
                    .map(|path| EvidenceInfo::probe(path))
                    .collect(),
            })
            .collect();

        let document = JsonReport {
            file: &report.file,
            browser: &report.browser,
            started_at: report.started_at,
            total_seconds: report.total_seconds,
            cancelled: report.cancelled,
            passed: report.passed(),
            failed: report.failed(),
            cases,
            network_history: &report.network_history,
        };

        std::fs::create_dir_all(layout.dir())?;
        let path = layout.report_path("json");
        std::fs::write(&path, serde_json::to_string_pretty(&document)?)?;

        info!("📝 Results written to: {}", path.display());
        Ok(path)
    }
}
