//! Rowpilot Engine
//!
//! Runs row-driven browser tests: every row of a test file becomes a fixed
//! sequence of browser actions followed by expected-outcome checks, with
//! screenshots, network attribution and shared progress along the way.

pub mod device;
pub mod driver;
pub mod error;
pub mod evidence;
pub mod executor;
pub mod loader;
pub mod network;
pub mod outcome;
pub mod overlay;
pub mod playwright;
pub mod probe;
pub mod progress;
pub mod readable;
pub mod report;
pub mod runlog;
pub mod runner;
pub mod selector;

pub use device::DeviceProfile;
pub use driver::{BrowserDriver, DriverEvent, DriverFactory};
pub use error::{EngineError, EngineResult};
pub use loader::{load_test_files, RowLoader, TestFile, YamlRowLoader};
pub use network::NetworkCorrelator;
pub use playwright::{PlaywrightConfig, PlaywrightDriver, PlaywrightLauncher};
pub use progress::{FileProgressSink, NullProgressSink, ProgressSink, ProgressTracker};
pub use report::{FileReport, JsonReportWriter, ReportWriter, ResultLayout};
pub use runner::{SuiteRunner, SuiteSummary};
