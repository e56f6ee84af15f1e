//! Example-file regression runner.
//!
//! Each non-comment line reads `EXPECTED|MESSAGE`, where `EXPECTED` is one of
//! `ALLOW`, `FLAG` or `BLOCK`. A case passes when the moderator's `allowed`
//! matches `EXPECTED == ALLOW`.

use crate::components::decision_engine::FinalDecision;
use crate::features::Decision;
use crate::moderator::{ChatKind, ContentModerator};
use anyhow::{Context, Result};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionCase {
    pub line_number: usize,
    pub expected: Decision,
    pub message: String,
}

impl RegressionCase {
    pub fn expected_allowed(&self) -> bool {
        self.expected == Decision::Allow
    }
}

#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub case: RegressionCase,
    pub result: FinalDecision,
}

impl CaseOutcome {
    pub fn passed(&self) -> bool {
        self.result.allowed == self.case.expected_allowed()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegressionReport {
    pub outcomes: Vec<CaseOutcome>,
}

impl RegressionReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.passed() as f64 / self.total() as f64 * 100.0
    }
}

pub fn parse_examples(content: &str) -> Vec<RegressionCase> {
    let mut cases = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some((expected, message)) = trimmed.split_once('|') else {
            log::warn!("Skipping invalid line {}: {}", line_number, trimmed);
            continue;
        };

        let expected = match expected.parse::<Decision>() {
            Ok(decision) => decision,
            Err(_) => {
                log::warn!(
                    "Invalid expected result on line {}: {}",
                    line_number,
                    expected.trim()
                );
                continue;
            }
        };

        cases.push(RegressionCase {
            line_number,
            expected,
            message: message.trim().to_string(),
        });
    }

    cases
}

pub fn load_examples<P: AsRef<Path>>(path: P) -> Result<Vec<RegressionCase>> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read examples file: {}", path.as_ref().display()))?;
    Ok(parse_examples(&content))
}

/// Moderate every case with its own submitter so cases never trip
/// repetition checks on each other
pub async fn run_suite(moderator: &ContentModerator, cases: &[RegressionCase]) -> RegressionReport {
    let mut report = RegressionReport::default();

    for (i, case) in cases.iter().enumerate() {
        let submitter = format!("test-user-{}", i);
        let result = moderator
            .moderate(Some(&case.message), Some(&submitter), ChatKind::City)
            .await;
        report.outcomes.push(CaseOutcome {
            case: case.clone(),
            result,
        });
    }

    report
}
