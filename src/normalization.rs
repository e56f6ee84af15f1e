use std::collections::HashSet;

/// Lowercase, collapse whitespace and strip punctuation so that trivially
/// altered copies of a message compare equal
pub fn normalize_message(text: &str) -> String {
    let lowered = text.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect()
}

pub fn word_set(text: &str) -> HashSet<String> {
    normalize_message(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Word-overlap (Jaccard) similarity in [0, 1]
pub fn similarity(a: &str, b: &str) -> f64 {
    jaccard(&word_set(a), &word_set(b))
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / union as f64
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_message() {
        assert_eq!(
            normalize_message("  Hello,   WORLD!!\n How are you? "),
            "hello world how are you"
        );
        assert_eq!(normalize_message("Привет, мир!"), "привет мир");
        assert_eq!(normalize_message("!!!"), "");
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("Hello world", "hello, WORLD!"), 1.0);
        assert_eq!(similarity("one two", "three four"), 0.0);
        assert!((similarity("a b c", "a b d") - 0.5).abs() < f64::EPSILON);
        assert_eq!(similarity("", "?!"), 0.0);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two\tthree\n"), 3);
        assert_eq!(word_count(""), 0);
    }
}
