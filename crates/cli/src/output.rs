//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use rowpilot_common::TestCaseResult;
use rowpilot_engine::{DeviceProfile, SuiteSummary};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No items found.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
    }
}

/// One test case line of the run summary
#[derive(Debug, Serialize)]
pub struct CaseDisplay {
    pub file: String,
    pub name: String,
    pub result: String,
    pub device: String,
    pub seconds: f64,
    pub evidence: usize,
    pub outcome: String,
}

impl CaseDisplay {
    fn new(file: &str, case: &TestCaseResult) -> Self {
        Self {
            file: file.to_string(),
            name: case.name.clone(),
            result: case.verdict.to_string(),
            device: case.device_label().to_string(),
            seconds: case.duration_seconds,
            evidence: case.evidence.len(),
            outcome: case.outcome.clone(),
        }
    }
}

impl TableDisplay for CaseDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["File", "Test Case", "Result", "Device", "Time (s)", "Shots", "Outcome"]
    }

    fn row(&self) -> Vec<String> {
        let result = if self.result == "Pass" {
            self.result.green().to_string()
        } else {
            self.result.red().to_string()
        };
        vec![
            self.file.clone(),
            self.name.clone(),
            result,
            self.device.clone(),
            format!("{:.2}", self.seconds),
            self.evidence.to_string(),
            self.outcome.clone(),
        ]
    }
}

/// Flatten a run summary into printable rows
pub fn summary_cases(summary: &SuiteSummary) -> Vec<CaseDisplay> {
    summary
        .files
        .iter()
        .flat_map(|report| {
            let file = report
                .file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            report
                .cases
                .iter()
                .map(move |case| CaseDisplay::new(&file, case))
        })
        .collect()
}

/// Print the run summary, then the totals line
pub fn print_summary(summary: &SuiteSummary, format: OutputFormat) {
    print_list(&summary_cases(summary), format);

    for error in &summary.errors {
        print_error(error);
    }

    let totals = format!(
        "{} passed, {} failed, {}/{} steps",
        summary.passed(),
        summary.failed(),
        summary.completed_steps,
        summary.total_steps
    );
    if summary.cancelled {
        print_warning(&format!("Run stopped early: {}", totals));
    } else if summary.success() {
        print_success(&totals);
    } else {
        print_error(&totals);
    }
}

/// Device profile line for `rowpilot devices`
#[derive(Debug, Serialize)]
pub struct DeviceDisplay {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
    pub mobile: bool,
}

impl From<DeviceProfile> for DeviceDisplay {
    fn from(profile: DeviceProfile) -> Self {
        Self {
            name: profile.name,
            width: profile.viewport.width,
            height: profile.viewport.height,
            scale: profile.device_scale_factor,
            mobile: profile.is_mobile,
        }
    }
}

impl TableDisplay for DeviceDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Device", "Viewport", "Scale", "Mobile"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            format!("{}x{}", self.width, self.height),
            format!("{}", self.scale),
            if self.mobile { "yes" } else { "no" }.to_string(),
        ]
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}
