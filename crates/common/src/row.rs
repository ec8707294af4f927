//! Test row records and header mapping
//!
//! Loaders produce [`RawRow`]s: ordered header/cell pairs exactly as they
//! appear in the source. [`TestRow::from_raw`] performs the one-time mapping
//! from normalized header names onto typed, optional fields.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Header that is renamed instead of collapsed
const TEST_CASE_HEADER: &str = "test cases";

/// Normalized key of the test case name column
pub const TEST_CASE_KEY: &str = "testCase";

/// Normalized keys that count as actions during the step pre-scan
pub const ACTION_KEYS: [&str; 10] = [
    "goto",
    "click",
    "write",
    "select",
    "selectbutton",
    "highlight",
    "wait",
    "keyboard",
    "download",
    "waitfordocumentloaded",
];

/// A single cell value as read by a loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Render the cell as text; integral numbers lose their fraction
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                format!("{}", *n as i64)
            }
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Loose truthiness used by flag columns
    pub fn is_true(&self) -> bool {
        match self {
            CellValue::Bool(b) => *b,
            CellValue::Number(n) => *n == 1.0,
            CellValue::Text(s) => s.trim().eq_ignore_ascii_case("true"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

/// Ordered header/cell pairs of one source row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub cells: Vec<(String, CellValue)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, header: &str, value: impl Into<CellValue>) -> Self {
        self.cells.push((header.to_string(), value.into()));
        self
    }
}

/// Normalize a column header.
///
/// `"Test Cases"` becomes `testCase`; every other header is trimmed,
/// stripped of whitespace and lower-cased.
pub fn normalize_header(header: &str) -> String {
    let trimmed = header.trim();
    if trimmed.eq_ignore_ascii_case(TEST_CASE_HEADER) {
        return TEST_CASE_KEY.to_string();
    }
    trimmed
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Typed test case row. Immutable once mapped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestRow {
    pub test_case: String,
    pub goto: Option<String>,
    pub wait_for_document_loaded: Option<String>,
    pub write: Option<String>,
    pub highlight: Option<String>,
    pub screenshot: bool,
    pub keyboard: Option<String>,
    pub download: Option<String>,
    pub select: Option<String>,
    pub select_button: Option<String>,
    pub click: Option<String>,
    pub expected_outcome: Option<String>,
    pub wait: Option<String>,
    pub device_type: Option<String>,
    pub outline_color: Option<String>,
}

impl TestRow {
    /// Map a raw row onto typed fields. Unknown headers are ignored.
    pub fn from_raw(raw: &RawRow) -> Self {
        let mut row = TestRow::default();

        for (header, value) in &raw.cells {
            let key = normalize_header(header);
            let text = if value.is_blank() {
                None
            } else {
                Some(value.as_text().trim().to_string())
            };

            match key.as_str() {
                TEST_CASE_KEY => row.test_case = text.unwrap_or_default(),
                "goto" => row.goto = text,
                "waitfordocumentloaded" => row.wait_for_document_loaded = text,
                "write" => row.write = text,
                "highlight" => row.highlight = text,
                "screenshot" => row.screenshot = value.is_true(),
                "keyboard" => row.keyboard = text,
                "download" => row.download = text,
                "select" => row.select = text,
                "selectbutton" => row.select_button = text,
                "click" => row.click = text,
                "expectedoutcome" => row.expected_outcome = text,
                "wait" => row.wait = text,
                "devicetype" => row.device_type = text,
                "outlinecolor" => row.outline_color = text,
                other => debug!("Ignoring unknown column '{}'", other),
            }
        }

        row
    }

    /// Value of an action field by its normalized key
    pub fn action_field(&self, key: &str) -> Option<&str> {
        let field = match key {
            "goto" => &self.goto,
            "click" => &self.click,
            "write" => &self.write,
            "select" => &self.select,
            "selectbutton" => &self.select_button,
            "highlight" => &self.highlight,
            "wait" => &self.wait,
            "keyboard" => &self.keyboard,
            "download" => &self.download,
            "waitfordocumentloaded" => &self.wait_for_document_loaded,
            _ => return None,
        };
        field.as_deref()
    }

    /// Number of populated action fields
    pub fn populated_action_count(&self) -> usize {
        ACTION_KEYS
            .iter()
            .filter(|key| self.action_field(key).is_some())
            .count()
    }

    /// Highlight outline colour, `red` when unset
    pub fn outline_color(&self) -> &str {
        self.outline_color.as_deref().unwrap_or("red")
    }

    /// Device tag, lower-cased
    pub fn device_tag(&self) -> Option<String> {
        self.device_type.as_ref().map(|d| d.trim().to_lowercase())
    }

    /// Test case name with whitespace replaced, for evidence file names
    pub fn file_stem(&self) -> String {
        self.test_case.split_whitespace().collect::<Vec<_>>().join("_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header(" Test Cases "), "testCase");
        assert_eq!(normalize_header("TEST CASES"), "testCase");
        assert_eq!(normalize_header("Expected Outcome"), "expectedoutcome");
        assert_eq!(normalize_header("Select Button"), "selectbutton");
        assert_eq!(normalize_header("Wait For Document Loaded"), "waitfordocumentloaded");
    }

    #[test]
    fn test_from_raw_maps_fields() {
        let raw = RawRow::new()
            .with("Test Cases", "Login ok")
            .with("GoTo", "https://x/login")
            .with("Write", "#user:alice")
            .with("Click", "#submit")
            .with("Expected Outcome", "stay")
            .with("Screenshot", true)
            .with("Wait", CellValue::Number(2500.0))
            .with("Notes", "ignored");

        let row = TestRow::from_raw(&raw);
        assert_eq!(row.test_case, "Login ok");
        assert_eq!(row.goto.as_deref(), Some("https://x/login"));
        assert_eq!(row.write.as_deref(), Some("#user:alice"));
        assert_eq!(row.expected_outcome.as_deref(), Some("stay"));
        assert_eq!(row.wait.as_deref(), Some("2500"));
        assert!(row.screenshot);
        assert_eq!(row.file_stem(), "Login_ok");
    }

    #[test]
    fn test_blank_cells_are_absent() {
        let raw = RawRow::new()
            .with("Click", "   ")
            .with("Goto", "https://x");
        let row = TestRow::from_raw(&raw);
        assert!(row.click.is_none());
        assert_eq!(row.populated_action_count(), 1);
    }

    #[test]
    fn test_populated_action_count_ignores_non_actions() {
        let raw = RawRow::new()
            .with("Goto", "https://x")
            .with("Highlight", "#logo")
            .with("Wait For Document Loaded", "false")
            .with("Expected Outcome", "stay")
            .with("Device Type", "iPhone 13")
            .with("Outline Color", "blue");
        let row = TestRow::from_raw(&raw);
        assert_eq!(row.populated_action_count(), 3);
        assert_eq!(row.outline_color(), "blue");
        assert_eq!(row.device_tag().as_deref(), Some("iphone 13"));
    }

    #[test]
    fn test_cell_truthiness() {
        assert!(CellValue::Bool(true).is_true());
        assert!(CellValue::from("TRUE").is_true());
        assert!(CellValue::Number(1.0).is_true());
        assert!(!CellValue::from("yes").is_true());
        assert_eq!(CellValue::Number(3.5).as_text(), "3.5");
    }
}
