use super::{Decision, RuleDetector, RuleVerdict};
use std::collections::HashMap;

const MIN_LENGTH: usize = 5;
const MAX_LENGTH: usize = 2000;
// 6+ so that stretched words like "goood" or "sooo" still pass
const CHAR_RUN_THRESHOLD: usize = 6;
const PUNCTUATION_RUN_THRESHOLD: usize = 4;
const WORD_REPEAT_THRESHOLD: usize = 3;
const CAPS_RATIO: f64 = 0.5;
const CAPS_MIN_LETTERS: usize = 10;
const SHORT_MESSAGE_CHARS: usize = 100;
const SHORT_MESSAGE_MAX_PUNCTUATION: usize = 5;
const WHITESPACE_RATIO: f64 = 0.2;
const NEWLINE_RUN_THRESHOLD: usize = 6;
const SYMBOL_RATIO: f64 = 0.4;

/// Shape-based spam checks on a single message
#[derive(Debug, Default)]
pub struct SpamDetector;

impl SpamDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn has_extreme_length(&self, trimmed: &str) -> bool {
        let len = trimmed.chars().count();
        (len > 0 && len < MIN_LENGTH) || len > MAX_LENGTH
    }

    pub fn has_excessive_repetition(&self, text: &str) -> bool {
        longest_run(text, |c| !is_line_terminator(c)) >= CHAR_RUN_THRESHOLD
    }

    /// Any word longer than two characters repeated three times, or three
    /// identical tokens in a row
    pub fn has_repeated_words(&self, text: &str) -> bool {
        let lowered = text.trim().to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();
        if words.len() < WORD_REPEAT_THRESHOLD {
            return false;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for word in words.iter().copied() {
            *counts.entry(word).or_insert(0) += 1;
        }
        if counts
            .iter()
            .any(|(word, count)| *count >= WORD_REPEAT_THRESHOLD && word.chars().count() > 2)
        {
            return true;
        }

        words
            .windows(3)
            .any(|w| w[0] == w[1] && w[1] == w[2] && w[0].chars().count() > 2)
    }

    pub fn has_excessive_caps(&self, text: &str) -> bool {
        let letters: Vec<char> = text.chars().filter(|c| c.is_ascii_alphabetic()).collect();
        if letters.is_empty() {
            return false;
        }
        let upper = letters.iter().filter(|c| c.is_ascii_uppercase()).count();
        let ratio = upper as f64 / letters.len() as f64;
        ratio > CAPS_RATIO && letters.len() >= CAPS_MIN_LETTERS
    }

    pub fn has_excessive_punctuation(&self, text: &str) -> bool {
        if longest_span(text, is_sentence_punctuation) >= PUNCTUATION_RUN_THRESHOLD {
            return true;
        }

        if text.chars().count() < SHORT_MESSAGE_CHARS {
            let count = text.chars().filter(|c| is_sentence_punctuation(*c)).count();
            return count > SHORT_MESSAGE_MAX_PUNCTUATION;
        }

        false
    }

    pub fn has_whitespace_flooding(&self, text: &str) -> bool {
        let total = text.chars().count();
        if total == 0 {
            return false;
        }
        let whitespace = text.chars().filter(|c| c.is_whitespace()).count();
        if whitespace as f64 / total as f64 > WHITESPACE_RATIO {
            return true;
        }

        longest_span(text, |c| c == '\n') >= NEWLINE_RUN_THRESHOLD
    }

    pub fn has_excessive_symbols(&self, text: &str) -> bool {
        let total = text.chars().count();
        if total == 0 {
            return false;
        }
        let plain = text
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
            .count();
        1.0 - (plain as f64 / total as f64) > SYMBOL_RATIO
    }

    /// Runs of one repeated character, or of one repeated `!`, `?` or `.`
    pub fn matches_spam_patterns(&self, text: &str) -> bool {
        if self.has_excessive_repetition(text) {
            return true;
        }

        ['!', '?', '.']
            .iter()
            .any(|mark| longest_run(text, |c| c == *mark) >= PUNCTUATION_RUN_THRESHOLD)
    }
}

impl RuleDetector for SpamDetector {
    fn analyze(&self, text: &str) -> RuleVerdict {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return RuleVerdict::with_flag(Decision::Block, "empty_message");
        }

        let mut verdict = RuleVerdict::allow();

        if self.has_extreme_length(trimmed) {
            let decision = if trimmed.chars().count() < MIN_LENGTH {
                Decision::Block
            } else {
                Decision::Flag
            };
            verdict.raise("extreme_length", decision);
        }

        if self.has_excessive_repetition(trimmed) {
            verdict.raise("character_repetition", Decision::Block);
        }

        if self.has_repeated_words(trimmed) {
            verdict.raise("word_repetition", Decision::Block);
        }

        if self.has_excessive_caps(trimmed) {
            verdict.raise("excessive_caps", Decision::Flag);
        }

        if self.has_excessive_punctuation(trimmed) {
            verdict.raise("excessive_punctuation", Decision::Flag);
        }

        if self.has_whitespace_flooding(trimmed) {
            verdict.raise("whitespace_flooding", Decision::Flag);
        }

        if self.has_excessive_symbols(trimmed) {
            verdict.raise("excessive_symbols", Decision::Flag);
        }

        if self.matches_spam_patterns(trimmed) {
            verdict.raise("spam_pattern", Decision::Block);
        }

        verdict.flags = super::dedup_flags(verdict.flags);
        log::debug!(
            "Spam check: decision {}, flags {:?}",
            verdict.decision,
            verdict.flags
        );
        verdict
    }

    fn name(&self) -> &str {
        "SpamDetector"
    }
}

/// Length of the longest run of one repeated character satisfying `pred`
fn longest_run<F>(text: &str, pred: F) -> usize
where
    F: Fn(char) -> bool,
{
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<char> = None;

    for c in text.chars() {
        if !pred(c) {
            current = 0;
            previous = None;
            continue;
        }
        if previous == Some(c) {
            current += 1;
        } else {
            current = 1;
        }
        previous = Some(c);
        longest = longest.max(current);
    }

    longest
}

/// Length of the longest stretch of consecutive characters satisfying `pred`
fn longest_span<F>(text: &str, pred: F) -> usize
where
    F: Fn(char) -> bool,
{
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if pred(c) {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn is_sentence_punctuation(c: char) -> bool {
    matches!(c, '!' | '?' | '.')
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}
