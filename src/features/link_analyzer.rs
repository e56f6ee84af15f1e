use super::{Decision, RuleDetector, RuleVerdict};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

lazy_static! {
    static ref URL_REGEX: Regex = Regex::new(
        r"(?i)(https?://[^\s]+|www\.[^\s]+|[a-zA-Z0-9-]+\.[a-zA-Z]{2,}[^\s]*)"
    )
    .unwrap();
    static ref IP_ADDRESS_REGEX: Regex = Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap();
}

const URL_SHORTENERS: &[&str] = &[
    "bit.ly",
    "tinyurl.com",
    "goo.gl",
    "t.co",
    "ow.ly",
    "is.gd",
    "buff.ly",
    "short.link",
    "tiny.cc",
    "rebrand.ly",
    "cutt.ly",
    "shorturl.at",
    "v.gd",
    "shorte.st",
    "adf.ly",
    "bc.vc",
];

// Free or generic TLDs with high abuse rates
const SUSPICIOUS_TLDS: &[&str] = &[
    ".tk", ".ml", ".ga", ".cf", ".gq", ".xyz", ".top", ".click", ".download", ".stream",
    ".online", ".site", ".website", ".space",
];

const AFFILIATE_PARAMS: &[&str] = &[
    "ref=",
    "affiliate=",
    "partner=",
    "utm_source=",
    "utm_medium=",
    "aff=",
    "ref_id=",
    "referrer=",
    "source=",
    "campaign=",
];

// Sentence punctuation directly after a link is not part of it
const TRAILING_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':', ')', '"', '\''];

const MAX_LINKS_BEFORE_FLAG: usize = 2;
const MAX_LINK_DENSITY: f64 = 0.3;

/// Lexical link checks. No DNS or HTTP lookups are made.
pub struct LinkAnalyzer {
    shorteners: HashSet<&'static str>,
}

impl Default for LinkAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkAnalyzer {
    pub fn new() -> Self {
        Self {
            shorteners: URL_SHORTENERS.iter().copied().collect(),
        }
    }

    /// Extract candidate URLs, prefixing bare matches with `https://` and
    /// dropping trailing sentence punctuation
    pub fn extract_urls(&self, text: &str) -> Vec<String> {
        URL_REGEX
            .find_iter(text)
            .map(|m| {
                let url = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
                if url.starts_with("http://") || url.starts_with("https://") {
                    url.to_string()
                } else {
                    format!("https://{}", url)
                }
            })
            .collect()
    }

    pub fn is_url_shortener(&self, url: &str) -> bool {
        match hostname(url) {
            Some(host) => {
                self.shorteners.contains(host.as_str())
                    || host.contains("short")
                    || host.contains("tiny")
            }
            None => false,
        }
    }

    pub fn has_suspicious_tld(&self, url: &str) -> bool {
        hostname(url)
            .map(|host| SUSPICIOUS_TLDS.iter().any(|tld| host.ends_with(tld)))
            .unwrap_or(false)
    }

    pub fn is_ip_address(&self, url: &str) -> bool {
        IP_ADDRESS_REGEX.is_match(url)
    }

    pub fn has_affiliate_params(&self, url: &str) -> bool {
        let query = match Url::parse(url) {
            Ok(parsed) => parsed.query().map(|q| q.to_lowercase()),
            Err(_) => None,
        };

        match query {
            Some(query) => AFFILIATE_PARAMS.iter().any(|param| query.contains(param)),
            None => false,
        }
    }

    pub fn is_insecure(&self, url: &str) -> bool {
        url.starts_with("http://")
    }

    /// Excessive digits, excessive hyphens, or Latin mixed with Cyrillic
    pub fn has_suspicious_domain(&self, url: &str) -> bool {
        let host = match hostname(url) {
            Some(host) => host,
            None => return false,
        };

        let digit_count = host.chars().filter(|c| c.is_ascii_digit()).count();
        if digit_count > 3 {
            return true;
        }

        let hyphen_count = host.chars().filter(|c| *c == '-').count();
        if hyphen_count > 3 {
            return true;
        }

        let has_latin = host.chars().any(|c| c.is_ascii_lowercase());
        let has_cyrillic = host.chars().any(is_cyrillic);
        has_latin && has_cyrillic
    }
}

impl RuleDetector for LinkAnalyzer {
    fn analyze(&self, text: &str) -> RuleVerdict {
        let urls = self.extract_urls(text);
        if urls.is_empty() {
            return RuleVerdict::allow();
        }

        let mut verdict = RuleVerdict::allow();

        for url in &urls {
            // An IP-literal host is terminal for this URL
            if self.is_ip_address(url) {
                verdict.raise("suspicious_link", Decision::Block);
                continue;
            }

            if self.is_url_shortener(url) {
                verdict.raise("url_shortener", Decision::Flag);
            }

            if self.has_suspicious_tld(url) {
                verdict.raise("suspicious_tld", Decision::Block);
            }

            if self.has_affiliate_params(url) {
                verdict.raise("affiliate_link", Decision::Flag);
            }

            if self.is_insecure(url) {
                verdict.raise("insecure_link", Decision::Flag);
            }

            if self.has_suspicious_domain(url) {
                verdict.raise("suspicious_domain", Decision::Flag);
            }
        }

        if urls.len() > MAX_LINKS_BEFORE_FLAG {
            verdict.raise("multiple_links", Decision::Flag);
        }

        let link_chars: usize = urls.iter().map(|u| u.chars().count()).sum();
        let text_chars = text.chars().count().max(1);
        if link_chars as f64 / text_chars as f64 > MAX_LINK_DENSITY {
            verdict.raise("high_link_density", Decision::Flag);
        }

        verdict.flags = super::dedup_flags(verdict.flags);
        log::debug!(
            "Link analysis: {} urls, decision {}, flags {:?}",
            urls.len(),
            verdict.decision,
            verdict.flags
        );
        verdict.urls = urls;
        verdict
    }

    fn name(&self) -> &str {
        "LinkAnalyzer"
    }
}

/// Lowercased host portion of an absolute URL, without userinfo or port.
/// Kept lexical so non-ASCII hosts are not punycode-encoded.
fn hostname(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;
    let host = host_port.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

fn is_cyrillic(c: char) -> bool {
    matches!(c, '\u{0430}'..='\u{044F}' | '\u{0410}'..='\u{042F}' | 'ё' | 'Ё')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_urls_normalizes_bare_domains() {
        let analyzer = LinkAnalyzer::new();
        let urls = analyzer.extract_urls("see www.example.com and example.org/page or https://a.io");
        assert_eq!(
            urls,
            vec![
                "https://www.example.com",
                "https://example.org/page",
                "https://a.io"
            ]
        );
    }

    #[test]
    fn test_no_urls_allows() {
        let analyzer = LinkAnalyzer::new();
        let verdict = analyzer.analyze("Hello, how is everyone doing today?");
        assert_eq!(verdict.decision, Decision::Allow);
        assert!(verdict.flags.is_empty());
        assert!(verdict.urls.is_empty());
    }

    #[test]
    fn test_ip_address_blocks() {
        let analyzer = LinkAnalyzer::new();
        for text in [
            "login here http://192.168.1.10/account please, it is quick",
            "my server is at https://10.0.0.1:8080/admin if you want to look",
        ] {
            let verdict = analyzer.analyze(text);
            assert_eq!(verdict.decision, Decision::Block, "{}", text);
            assert!(verdict.has_flag("suspicious_link"));
        }
    }

    #[test]
    fn test_suspicious_tld_blocks() {
        let analyzer = LinkAnalyzer::new();
        let verdict = analyzer.analyze("free prizes waiting for you at https://winner.tk today");
        assert_eq!(verdict.decision, Decision::Block);
        assert!(verdict.has_flag("suspicious_tld"));
    }

    #[test]
    fn test_suspicious_tld_at_sentence_end_blocks() {
        let analyzer = LinkAnalyzer::new();
        for text in [
            "Cheap rooms at winner.tk.",
            "Cheap rooms at winner.tk, hurry",
            "go to https://prizes.xyz!",
            "(see https://prizes.xyz)",
        ] {
            let verdict = analyzer.analyze(text);
            assert_eq!(verdict.decision, Decision::Block, "{}", text);
            assert!(verdict.has_flag("suspicious_tld"), "{}", text);
        }

        assert_eq!(
            analyzer.extract_urls("Cheap rooms at winner.tk."),
            vec!["https://winner.tk"]
        );
    }

    #[test]
    fn test_shortener_flags() {
        let analyzer = LinkAnalyzer::new();
        assert!(analyzer.is_url_shortener("https://bit.ly/abc"));
        assert!(analyzer.is_url_shortener("https://myshortlinks.com/abc"));
        assert!(!analyzer.is_url_shortener("https://example.com/short"));

        let verdict = analyzer
            .analyze("the photos from yesterday evening are up at https://bit.ly/xyz123 enjoy");
        assert_eq!(verdict.decision, Decision::Flag);
        assert!(verdict.has_flag("url_shortener"));
    }

    #[test]
    fn test_block_is_not_downgraded_by_later_urls() {
        let analyzer = LinkAnalyzer::new();
        let verdict = analyzer.analyze("http://1.2.3.4/x and then https://bit.ly/y");
        assert_eq!(verdict.decision, Decision::Block);
        assert!(verdict.has_flag("suspicious_link"));
        assert!(verdict.has_flag("url_shortener"));
    }

    #[test]
    fn test_affiliate_and_insecure() {
        let analyzer = LinkAnalyzer::new();
        assert!(analyzer.has_affiliate_params("https://shop.com/item?ref=abc"));
        assert!(analyzer.has_affiliate_params("https://shop.com/?UTM_SOURCE=chat"));
        assert!(!analyzer.has_affiliate_params("https://shop.com/item?color=red"));
        assert!(analyzer.is_insecure("http://shop.com"));
        assert!(!analyzer.is_insecure("https://shop.com"));
    }

    #[test]
    fn test_suspicious_domain_shapes() {
        let analyzer = LinkAnalyzer::new();
        assert!(analyzer.has_suspicious_domain("https://win12345.com"));
        assert!(analyzer.has_suspicious_domain("https://a-b-c-d-e.com"));
        // Cyrillic 'а' mixed into a Latin hostname
        assert!(analyzer.has_suspicious_domain("https://p\u{0430}ypal.com"));
        assert!(!analyzer.has_suspicious_domain("https://paypal.com"));
    }

    #[test]
    fn test_multiple_links_and_density() {
        let analyzer = LinkAnalyzer::new();
        let verdict = analyzer.analyze("a.com b.com c.com");
        assert_eq!(verdict.decision, Decision::Flag);
        assert!(verdict.has_flag("multiple_links"));
        assert!(verdict.has_flag("high_link_density"));
        assert_eq!(verdict.urls.len(), 3);
    }

    #[test]
    fn test_hostname_strips_userinfo_and_port() {
        assert_eq!(
            hostname("https://user:pw@Example.COM:8443/path?q=1"),
            Some("example.com".to_string())
        );
        assert_eq!(hostname("not a url"), None);
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let analyzer = LinkAnalyzer::new();
        let text = "check http://deals-4-you-now-today.xyz?ref=me";
        assert_eq!(analyzer.analyze(text), analyzer.analyze(text));
    }
}
