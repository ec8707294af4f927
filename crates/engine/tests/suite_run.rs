//! Whole-suite runs: shared progress across files, reports and cancellation

mod support;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rowpilot_engine::progress::{CLOSED_MARKER, DONE_MARKER};
use rowpilot_engine::{
    EngineResult, FileProgressSink, JsonReportWriter, ProgressSink, SuiteRunner, TestFile,
};
use support::{fast_config, row, MockDriver, MockFactory};

const LOGIN: &str = "https://app.test/login";

fn factory() -> Arc<MockFactory> {
    Arc::new(MockFactory::new(|| {
        MockDriver::new()
            .page(LOGIN, 200)
            .click_navigates("#submit", "https://app.test/home")
    }))
}

fn report_files(root: &std::path::Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.to_string_lossy().ends_with("_result.json"))
        .collect();
    found.sort();
    found
}

#[tokio::test]
async fn test_progress_is_shared_across_files() {
    let dir = tempfile::tempdir().unwrap();
    let progress = dir.path().join("progress.txt");
    let sink = Arc::new(FileProgressSink::new(&progress));

    let files = vec![
        TestFile {
            path: PathBuf::from("login.yaml"),
            rows: vec![
                row(&[
                    ("Test Cases", "Stay"),
                    ("GoTo", LOGIN),
                    ("Click", "#noop"),
                    ("Expected Outcome", "stay"),
                ]),
                row(&[
                    ("Test Cases", "Submit"),
                    ("GoTo", LOGIN),
                    ("Click", "#submit"),
                    ("Expected Outcome", "/home"),
                ]),
            ],
        },
        TestFile {
            path: PathBuf::from("search.yaml"),
            rows: vec![row(&[
                ("Test Cases", "Wait"),
                ("GoTo", LOGIN),
                ("Wait", "5"),
            ])],
        },
    ];

    let runner = SuiteRunner::new(
        fast_config(dir.path()),
        factory(),
        Arc::new(JsonReportWriter),
        sink,
    );
    let summary = runner.run(files).await.unwrap();

    assert_eq!(summary.total_steps, 8);
    assert_eq!(summary.completed_steps, 8);
    assert_eq!(summary.total_cases(), 3);
    assert_eq!(summary.passed(), 3);
    assert!(summary.success());
    assert!(!summary.cancelled);
    assert_eq!(std::fs::read_to_string(&progress).unwrap(), DONE_MARKER);

    let reports = report_files(dir.path());
    assert_eq!(reports.len(), 2);
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&reports[0]).unwrap()).unwrap();
    assert_eq!(json["file"], "login.yaml");
    assert_eq!(json["passed"], 2);
}

#[tokio::test]
async fn test_navigation_failure_cancels_run() {
    let dir = tempfile::tempdir().unwrap();
    let progress = dir.path().join("progress.txt");
    let sink = Arc::new(FileProgressSink::new(&progress));

    let files = vec![TestFile {
        path: PathBuf::from("broken.yaml"),
        rows: vec![
            row(&[("Test Cases", "Down"), ("GoTo", "https://down.test/")]),
            row(&[("Test Cases", "Never"), ("GoTo", LOGIN)]),
        ],
    }];

    let runner = SuiteRunner::new(
        fast_config(dir.path()),
        factory(),
        Arc::new(JsonReportWriter),
        sink,
    );
    let summary = runner.run(files).await.unwrap();

    assert!(summary.cancelled);
    assert!(!summary.success());
    assert_eq!(summary.files[0].cases.len(), 1);
    assert_eq!(summary.completed_steps, 1);
    assert_eq!(std::fs::read_to_string(&progress).unwrap(), CLOSED_MARKER);
    assert_eq!(report_files(dir.path()).len(), 1);
}

/// Surface that reports closure once `after` steps have been persisted
struct CloseAfter {
    after: u64,
    seen: AtomicU64,
}

impl ProgressSink for CloseAfter {
    fn start(&self, _total: u64) -> EngineResult<()> {
        Ok(())
    }

    fn update(&self, completed: u64) {
        self.seen.store(completed, Ordering::SeqCst);
    }

    fn close(&self, _finished: bool) {}

    fn is_cancelled(&self) -> bool {
        self.seen.load(Ordering::SeqCst) >= self.after
    }
}

#[tokio::test]
async fn test_external_close_stops_before_next_row() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(CloseAfter {
        after: 1,
        seen: AtomicU64::new(0),
    });

    let files = vec![TestFile {
        path: PathBuf::from("closing.yaml"),
        rows: vec![
            row(&[("Test Cases", "First"), ("GoTo", LOGIN)]),
            row(&[("Test Cases", "Second"), ("GoTo", LOGIN)]),
            row(&[("Test Cases", "Third"), ("GoTo", LOGIN)]),
        ],
    }];

    let runner = SuiteRunner::new(
        fast_config(dir.path()),
        factory(),
        Arc::new(JsonReportWriter),
        sink,
    );
    let summary = runner.run(files).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.total_steps, 3);
    assert_eq!(summary.completed_steps, 1);
    assert_eq!(summary.files[0].cases.len(), 1);
    assert_eq!(summary.files[0].cases[0].name, "First");
}
