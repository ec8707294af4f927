//! User-facing rewriting of raw step errors

use once_cell::sync::Lazy;
use regex::Regex;

static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(https?://[^\s"]+)"#).expect("valid regex"));

static STRICT_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"locator\('text=(.*?)'\)").expect("valid regex"));

static STRICT_CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d\)) (.*?) aka (.*?)\n").expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Rewrite a raw driver/engine error into a message for the report.
///
/// Known signatures get a templated explanation; anything else is passed
/// through with whitespace collapsed.
pub fn rewrite_step_error(step: &str, message: &str) -> String {
    if message.trim().is_empty() {
        return format!("Step Issue: {} -> Unknown error occurred.", step);
    }

    if message.to_uppercase().contains("ERR_CONNECTION_REFUSED") {
        let url = URL
            .captures(message)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or("the target URL");
        return format!(
            "Failed to reach \"{}\"\n💡 NOTE FIX: Please check your link and ensure the server is running or your network connection is stable.",
            url
        );
    }

    if message.contains("strict mode violation") && message.contains("locator('text=") {
        let expected = STRICT_TEXT
            .captures(message)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or("the expected text");

        let candidates: Vec<String> = STRICT_CANDIDATE
            .captures_iter(message)
            .enumerate()
            .map(|(i, c)| {
                let marker = if i == 0 { "✔ Accurate" } else { "" };
                format!(" {} {} {}", &c[1], &c[2], marker)
            })
            .collect();

        return format!(
            "Expected text: ('{expected}') was found in multiple elements.\n Error: Strict-mode violation of selector('text={expected}'). Found {} similar elements:\n{}\n💡 NOTE FIX: Please reconsider your text.",
            candidates.len(),
            candidates.join("\n"),
        );
    }

    WHITESPACE.replace_all(message.trim(), " ").into_owned()
}
