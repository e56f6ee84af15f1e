use super::{Decision, RuleVerdict};
use crate::history::{HistoryEntry, HistoryStore, InMemoryHistoryStore};
use crate::normalization::{normalize_message, similarity, word_count};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const EXACT_DUPLICATE_WINDOW: Duration = Duration::from_secs(5 * 60);
const NEAR_DUPLICATE_WINDOW: Duration = Duration::from_secs(10 * 60);
const NEAR_DUPLICATE_SIMILARITY: f64 = 0.9;
const RAPID_FIRE_MESSAGES: usize = 5;
const RAPID_FIRE_SPAN: Duration = Duration::from_secs(60);
const REPEATED_LINK_WINDOW: Duration = Duration::from_secs(10 * 60);
const REPEATED_LINK_MIN_MESSAGES: usize = 2;
const TEMPLATE_HISTORY: usize = 3;
const TEMPLATE_LENGTH_VARIANCE: f64 = 0.2;
const TEMPLATE_SIMILARITY: f64 = 0.6;

/// Submitter-scoped duplicate, cadence and template detection.
///
/// Every analyzed message is appended to the submitter's window whatever
/// the verdict, so blocked messages still count toward later checks.
pub struct RepetitionDetector {
    store: Arc<dyn HistoryStore>,
}

impl Default for RepetitionDetector {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryHistoryStore::default()))
    }
}

impl RepetitionDetector {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    pub fn analyze(
        &self,
        submitter: &str,
        text: &str,
        links: &[String],
        now: SystemTime,
    ) -> RuleVerdict {
        let normalized = normalize_message(text);
        let history = self.store.record(
            submitter,
            HistoryEntry {
                normalized: normalized.clone(),
                original: text.to_string(),
                links: links.to_vec(),
                timestamp: now,
            },
        );

        let mut verdict = RuleVerdict::allow();

        if is_exact_duplicate(&history, &normalized, now) {
            verdict.raise("exact_duplicate", Decision::Block);
        } else if is_near_duplicate(&history, text, now) {
            verdict.raise("near_duplicate", Decision::Flag);
        }

        if is_rapid_fire(&history, now) {
            verdict.raise("rapid_fire", Decision::Flag);
        }

        if has_repeated_link(&history, links, now) {
            verdict.raise("repeated_link", Decision::Flag);
        }

        if has_template_pattern(&history, text) {
            verdict.raise("template_pattern", Decision::Flag);
        }

        log::debug!(
            "Repetition check for {}: {} prior messages, decision {}, flags {:?}",
            submitter,
            history.len(),
            verdict.decision,
            verdict.flags
        );
        verdict
    }
}

fn is_exact_duplicate(history: &[HistoryEntry], normalized: &str, now: SystemTime) -> bool {
    history
        .iter()
        .any(|e| e.normalized == normalized && e.age(now) < EXACT_DUPLICATE_WINDOW)
}

fn is_near_duplicate(history: &[HistoryEntry], text: &str, now: SystemTime) -> bool {
    history.iter().any(|e| {
        e.age(now) < NEAR_DUPLICATE_WINDOW
            && similarity(text, &e.original) > NEAR_DUPLICATE_SIMILARITY
    })
}

fn is_rapid_fire(history: &[HistoryEntry], now: SystemTime) -> bool {
    if history.len() < RAPID_FIRE_MESSAGES {
        return false;
    }
    let oldest_of_recent = &history[history.len() - RAPID_FIRE_MESSAGES];
    oldest_of_recent.age(now) < RAPID_FIRE_SPAN
}

fn has_repeated_link(history: &[HistoryEntry], links: &[String], now: SystemTime) -> bool {
    links.iter().any(|link| {
        history
            .iter()
            .filter(|e| e.age(now) < REPEATED_LINK_WINDOW && e.links.contains(link))
            .count()
            >= REPEATED_LINK_MIN_MESSAGES
    })
}

/// Same shape as the last few messages: similar length and heavy word overlap
fn has_template_pattern(history: &[HistoryEntry], text: &str) -> bool {
    if history.len() < TEMPLATE_HISTORY {
        return false;
    }

    let mut recent: Vec<&str> = history[history.len() - TEMPLATE_HISTORY..]
        .iter()
        .map(|e| e.original.as_str())
        .collect();
    recent.push(text);

    let counts: Vec<f64> = recent.iter().map(|m| word_count(m) as f64).collect();
    let mean = counts.iter().sum::<f64>() / counts.len() as f64;
    if mean == 0.0 {
        return false;
    }
    if !counts
        .iter()
        .all(|c| (c - mean).abs() / mean < TEMPLATE_LENGTH_VARIANCE)
    {
        return false;
    }

    let mut similarities = Vec::new();
    for i in 0..recent.len() {
        for j in (i + 1)..recent.len() {
            similarities.push(similarity(recent[i], recent[j]));
        }
    }
    let average = similarities.iter().sum::<f64>() / similarities.len() as f64;
    average > TEMPLATE_SIMILARITY
}
