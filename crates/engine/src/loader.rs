//! Test file discovery and row loading
//!
//! The stock loader reads YAML or JSON documents holding a sequence of
//! header → cell maps, one map per test case:
//!
//! ```yaml
//! - Test Cases: Login ok
//!   GoTo: https://example.com/login
//!   Write: "#user:alice"
//!   Click: "#submit"
//!   Expected Outcome: stay
//! ```

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use rowpilot_common::{CellValue, RawRow, TestRow};

use crate::error::{EngineError, EngineResult};

/// Extensions picked up when a directory is given
pub const TEST_FILE_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Turns one test file into typed rows
pub trait RowLoader: Send + Sync {
    fn load(&self, path: &Path) -> EngineResult<Vec<TestRow>>;
}

/// Loaded test file
#[derive(Debug, Clone)]
pub struct TestFile {
    pub path: PathBuf,
    pub rows: Vec<TestRow>,
}

impl TestFile {
    /// File name without extension
    pub fn base_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tests".to_string())
    }
}

#[derive(Debug, Default)]
pub struct YamlRowLoader;

impl YamlRowLoader {
    pub fn parse(content: &str) -> EngineResult<Vec<TestRow>> {
        let records: Vec<serde_yaml::Mapping> = serde_yaml::from_str(content)?;

        Ok(records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let raw = record
                    .iter()
                    .filter_map(|(key, value)| Some((key.as_str()?, cell_value(value))))
                    .fold(RawRow::new(), |raw, (header, cell)| raw.with(header, cell));

                let mut row = TestRow::from_raw(&raw);
                if row.test_case.is_empty() {
                    row.test_case = format!("Row {}", index + 1);
                }
                row
            })
            .collect())
    }
}

impl RowLoader for YamlRowLoader {
    fn load(&self, path: &Path) -> EngineResult<Vec<TestRow>> {
        let content = std::fs::read_to_string(path)?;
        let rows = Self::parse(&content)
            .map_err(|e| EngineError::Loader(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded {} row(s) from {}", rows.len(), path.display());
        Ok(rows)
    }
}

fn cell_value(value: &serde_yaml::Value) -> CellValue {
    match value {
        serde_yaml::Value::Bool(b) => CellValue::Bool(*b),
        serde_yaml::Value::Number(n) => n
            .as_f64()
            .map(CellValue::Number)
            .unwrap_or_else(|| CellValue::Text(n.to_string())),
        serde_yaml::Value::String(s) => CellValue::Text(s.clone()),
        serde_yaml::Value::Null => CellValue::Text(String::new()),
        other => CellValue::Text(
            serde_yaml::to_string(other)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        ),
    }
}

/// Expand inputs into test file paths. Directories are walked for known
/// extensions; missing paths are skipped with a warning.
pub fn discover_test_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| has_test_extension(path))
                .collect();
            found.sort();
            files.extend(found);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            warn!("File not found: {}", input.display());
        }
    }

    files
}

fn has_test_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            TEST_FILE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Discover and load every test file
pub fn load_test_files(inputs: &[PathBuf], loader: &dyn RowLoader) -> EngineResult<Vec<TestFile>> {
    let paths = discover_test_files(inputs);
    if paths.is_empty() {
        return Err(EngineError::Loader("no test files found".to_string()));
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let rows = loader.load(&path)?;
        info!("📂 Test file: {} ({} test case(s))", path.display(), rows.len());
        files.push(TestFile { path, rows });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_rows() {
        let rows = YamlRowLoader::parse(
            r##"
- Test Cases: Login ok
  GoTo: https://x/login
  Write: "#user:alice"
  Screenshot: true
  Wait: 500
- Click: "#submit"
  Expected Outcome: stay
"##,
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].test_case, "Login ok");
        assert_eq!(rows[0].write.as_deref(), Some("#user:alice"));
        assert!(rows[0].screenshot);
        assert_eq!(rows[0].wait.as_deref(), Some("500"));
        assert_eq!(rows[1].test_case, "Row 2");
        assert_eq!(rows[1].expected_outcome.as_deref(), Some("stay"));
    }

    #[test]
    fn test_parse_json_rows() {
        let rows =
            YamlRowLoader::parse(r##"[{"Test Cases": "a", "Click": "id=go", "Device Type": null}]"##)
                .unwrap();
        assert_eq!(rows[0].click.as_deref(), Some("id=go"));
        assert_eq!(rows[0].device_type, None);
    }

    #[test]
    fn test_discover_walks_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), "[]").unwrap();
        std::fs::write(dir.path().join("a.json"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        let missing = dir.path().join("missing.yaml");

        let files = discover_test_files(&[dir.path().to_path_buf(), missing]);
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.yaml"]);
    }

    #[test]
    fn test_load_without_files_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_test_files(&[dir.path().join("none.yaml")], &YamlRowLoader);
        assert!(matches!(result, Err(EngineError::Loader(_))));
    }
}
