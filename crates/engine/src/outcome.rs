//! Expected-outcome expressions
//!
//! An expression is a list of `&`-separated clauses. Clauses are de-duplicated
//! case-insensitively (first occurrence wins) and then classified:
//!
//! - `stay`: the URL must equal the one captured right after navigation
//! - text without `=`: the current URL must contain it
//! - `key=value`: a keyed predicate; only `appeartext` is defined

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use rowpilot_common::{OverlayConfig, TimeoutConfig};

use crate::driver::{BrowserDriver, WaitState};
use crate::error::{EngineError, EngineResult};
use crate::evidence::EvidenceRecorder;

static SLUG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[!./+\-]").expect("valid regex"));

static SLUG_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Parsed clause of an expected-outcome expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeClause {
    Stay,
    UrlContains(String),
    Keyed { key: String, value: String },
}

impl OutcomeClause {
    fn classify(text: &str) -> Self {
        if text.eq_ignore_ascii_case("stay") {
            return OutcomeClause::Stay;
        }
        match text.split_once('=') {
            None => OutcomeClause::UrlContains(text.to_string()),
            Some((key, value)) => OutcomeClause::Keyed {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            },
        }
    }

    /// Step description used for progress lines
    pub fn describe(&self) -> String {
        match self {
            OutcomeClause::Stay => "Checking expected outcome: stay".to_string(),
            OutcomeClause::UrlContains(fragment) => {
                format!("Checking expected outcome: URL contains '{}'", fragment)
            }
            OutcomeClause::Keyed { key, value } if key.eq_ignore_ascii_case("appeartext") => {
                format!("Checking expected outcome: AppearText='{}'", value)
            }
            OutcomeClause::Keyed { key, value } => {
                format!("Checking expected outcome: {}={}", key, value)
            }
        }
    }
}

/// Split, trim, drop empties and collapse case-insensitive duplicates
pub fn parse_clauses(expression: &str) -> Vec<OutcomeClause> {
    let mut seen = HashSet::new();
    expression
        .split('&')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter(|part| seen.insert(part.to_lowercase()))
        .map(OutcomeClause::classify)
        .collect()
}

/// How visible text relates to an expected text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    Exact,
    Partial,
    Missing,
}

pub fn match_appear_text(expected: &str, visible: &str) -> TextMatch {
    if visible == expected {
        TextMatch::Exact
    } else if visible.contains(expected) {
        TextMatch::Partial
    } else {
        TextMatch::Missing
    }
}

/// File-name slug for appeartext evidence
pub fn appear_text_slug(text: &str) -> String {
    let stripped = SLUG_STRIP.replace_all(text, "");
    let underscored = SLUG_SPACE.replace_all(&stripped, "_");
    underscored.trim_end_matches('_').to_lowercase()
}

/// Result of one clause evaluation
#[derive(Debug, Clone)]
pub struct ClauseVerdict {
    pub passed: bool,
    /// Text appended to the row outcome
    pub narrative: String,
    /// Raw failure detail for the progress log
    pub issue: Option<String>,
    pub description: String,
}

impl ClauseVerdict {
    fn pass(description: String, narrative: String) -> Self {
        Self {
            passed: true,
            narrative,
            issue: None,
            description,
        }
    }

    fn fail(description: String, narrative: String, issue: String) -> Self {
        Self {
            passed: false,
            narrative,
            issue: Some(issue),
            description,
        }
    }
}

/// Evaluates clauses against the live page of one row
pub struct OutcomeEvaluator<'a> {
    pub driver: &'a dyn BrowserDriver,
    /// URL captured right after the row's navigation stage
    pub baseline_url: &'a str,
    pub timeouts: &'a TimeoutConfig,
    pub overlay: &'a OverlayConfig,
    pub outline_color: &'a str,
}

impl<'a> OutcomeEvaluator<'a> {
    /// Evaluate one clause. Never errors: failures become failing verdicts.
    pub async fn evaluate(
        &self,
        clause: &OutcomeClause,
        evidence: &mut EvidenceRecorder,
    ) -> ClauseVerdict {
        let description = clause.describe();
        match self.evaluate_inner(clause, &description, evidence).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Expected outcome check failed: {}", e);
                ClauseVerdict::fail(
                    description,
                    format!("❌ {} not met. ", clause_text(clause)),
                    e.to_string(),
                )
            }
        }
    }

    async fn evaluate_inner(
        &self,
        clause: &OutcomeClause,
        description: &str,
        evidence: &mut EvidenceRecorder,
    ) -> EngineResult<ClauseVerdict> {
        match clause {
            OutcomeClause::Stay => {
                let current = self.driver.current_url().await?;
                if current == self.baseline_url {
                    evidence.capture(self.driver, "page_url_stayed_same").await;
                    Ok(ClauseVerdict::pass(
                        description.to_string(),
                        "✅ Stayed on same page. ".to_string(),
                    ))
                } else {
                    evidence.capture(self.driver, "ERROR_STAY_FAILED").await;
                    Ok(ClauseVerdict::fail(
                        description.to_string(),
                        format!(
                            "❌ Expected to stay on same page, but URL changed from {} to {}. ",
                            self.baseline_url, current
                        ),
                        format!("URL did not stay the same. Current: {}", current),
                    ))
                }
            }
            OutcomeClause::UrlContains(fragment) => {
                let current = self.driver.current_url().await?;
                if current.contains(fragment.as_str()) {
                    evidence.capture(self.driver, "page_url_matched").await;
                    Ok(ClauseVerdict::pass(
                        description.to_string(),
                        format!("✅ Expected URL matched: {}. ", fragment),
                    ))
                } else {
                    evidence.capture(self.driver, "ERROR_URL_MISMATCH").await;
                    Ok(ClauseVerdict::fail(
                        description.to_string(),
                        format!("❌ Expected URL {}, got {}. ", fragment, current),
                        format!("URL mismatch. Expected: {}, Found: {}", fragment, current),
                    ))
                }
            }
            OutcomeClause::Keyed { key, value } if key.eq_ignore_ascii_case("appeartext") => {
                Ok(self.appear_text(value, description, evidence).await)
            }
            OutcomeClause::Keyed { key, .. } => Err(EngineError::Expectation(format!(
                "Unsupported expected outcome key '{}'",
                key
            ))),
        }
    }

    async fn appear_text(
        &self,
        expected: &str,
        description: &str,
        evidence: &mut EvidenceRecorder,
    ) -> ClauseVerdict {
        let selector = format!("text={}", expected);
        let timeout = Duration::from_millis(self.timeouts.appear_text_ms);

        let visible = match self.visible_text(&selector, timeout).await {
            Ok(visible) => visible,
            Err(e) => {
                debug!("AppearText lookup failed for '{}': {}", expected, e);
                let path = evidence.named("ERROR_APPEARTEXT_CONFLICT.png");
                let highlight = self.highlight(evidence, &selector, &path).await;
                return ClauseVerdict::fail(
                    description.to_string(),
                    format!("❌ AppearText={} not met. {}", expected, highlight),
                    e.to_string(),
                );
            }
        };

        let (mut verdict, path) = match match_appear_text(expected, &visible) {
            TextMatch::Exact => (
                ClauseVerdict::pass(
                    description.to_string(),
                    format!("✅ AppearText found exactly: ({}). ", expected),
                ),
                evidence.path_for(&format!("appeartext_{}", appear_text_slug(expected))),
            ),
            TextMatch::Partial => (
                ClauseVerdict::pass(
                    description.to_string(),
                    format!(
                        "✅ AppearText partially matched: ({}). Found: ({}). ",
                        expected, visible
                    ),
                ),
                evidence.path_for(&format!("appeartext_{}", appear_text_slug(expected))),
            ),
            TextMatch::Missing => (
                ClauseVerdict::fail(
                    description.to_string(),
                    format!("❌ AppearText not met: {}. Found: ({}). ", expected, visible),
                    format!("AppearText='{}' not found. Actual='{}'", expected, visible),
                ),
                evidence.named("ERROR_APPEARTEXT_NOTFOUND.png"),
            ),
        };

        let highlight = self.highlight(evidence, &selector, &path).await;
        verdict.narrative.push_str(&highlight);
        verdict
    }

    async fn visible_text(&self, selector: &str, timeout: Duration) -> EngineResult<String> {
        self.driver
            .wait_for_selector(selector, WaitState::Visible, timeout)
            .await?;
        Ok(self
            .driver
            .text_content(selector, timeout)
            .await?
            .unwrap_or_default())
    }

    async fn highlight(
        &self,
        evidence: &mut EvidenceRecorder,
        selector: &str,
        path: &std::path::Path,
    ) -> String {
        evidence
            .highlight(
                self.driver,
                selector,
                path,
                self.outline_color,
                self.overlay,
                Duration::from_millis(self.timeouts.highlight_ms),
            )
            .await
            .message
    }
}

fn clause_text(clause: &OutcomeClause) -> String {
    match clause {
        OutcomeClause::Stay => "stay".to_string(),
        OutcomeClause::UrlContains(fragment) => fragment.clone(),
        OutcomeClause::Keyed { key, value } => format!("{}={}", key, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_duplicate_stay_is_collapsed() {
        let clauses = parse_clauses("Stay & stay & URLContains");
        assert_eq!(
            clauses,
            vec![
                OutcomeClause::Stay,
                OutcomeClause::UrlContains("URLContains".to_string())
            ]
        );
        assert_eq!(
            clauses.iter().filter(|c| **c == OutcomeClause::Stay).count(),
            1
        );
    }

    #[test]
    fn test_keyed_clause_keeps_value_equals() {
        assert_eq!(
            parse_clauses(" appeartext = a=b & & "),
            vec![OutcomeClause::Keyed {
                key: "appeartext".to_string(),
                value: "a=b".to_string()
            }]
        );
    }

    #[test]
    fn test_dedup_is_case_insensitive_first_wins() {
        let clauses = parse_clauses("/Home & /home & AppearText=Hi & appeartext=hi");
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0], OutcomeClause::UrlContains("/Home".to_string()));
        assert_eq!(
            clauses[1],
            OutcomeClause::Keyed {
                key: "AppearText".to_string(),
                value: "Hi".to_string()
            }
        );
    }

    #[test_case("Welcome Alice", "Welcome Alice", TextMatch::Exact ; "exact")]
    #[test_case("Welcome Alice", "Welcome Alice!", TextMatch::Partial ; "partial")]
    #[test_case("Welcome Alice", "Goodbye", TextMatch::Missing ; "missing")]
    fn test_match_appear_text(expected: &str, visible: &str, result: TextMatch) {
        assert_eq!(match_appear_text(expected, visible), result);
    }

    #[test_case("Welcome Alice", "welcome_alice" ; "spaces")]
    #[test_case("Saved! ", "saved" ; "trailing")]
    #[test_case("v1.2 - ready/set", "v12_readyset" ; "punctuation")]
    fn test_appear_text_slug(text: &str, slug: &str) {
        assert_eq!(appear_text_slug(text), slug);
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            OutcomeClause::UrlContains("/home".to_string()).describe(),
            "Checking expected outcome: URL contains '/home'"
        );
        assert_eq!(
            OutcomeClause::Keyed {
                key: "appearText".to_string(),
                value: "Hi".to_string()
            }
            .describe(),
            "Checking expected outcome: AppearText='Hi'"
        );
    }
}
