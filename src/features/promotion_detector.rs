use super::{Decision, RuleDetector, RuleVerdict};
use lazy_static::lazy_static;
use regex::Regex;

const PROMOTIONAL_KEYWORDS: &[&str] = &[
    "discount",
    "deal",
    "offer",
    "limited time",
    "act now",
    "click here",
    "buy now",
    "special price",
    "cheapest",
    "guaranteed",
    "best price",
    "exclusive",
    "sale",
    "promo",
    "coupon",
    "voucher",
    "free shipping",
    "hurry",
    "limited offer",
    "don't miss",
    "order now",
    "shop now",
    "check out",
    "visit us",
    "call now",
    "book now",
    "reserve now",
];

const URGENCY_PHRASES: &[&str] = &[
    "urgent",
    "hurry",
    "limited",
    "expires",
    "ending soon",
    "last chance",
    "today only",
    "now only",
    "while supplies last",
    "act fast",
];

const BOOKING_PLATFORMS: &[&str] = &[
    "booking.com",
    "expedia",
    "agoda",
    "hotels.com",
    "priceline",
    "kayak",
    "trivago",
    "orbitz",
    "travelocity",
];

lazy_static! {
    static ref CONTACT_PATTERNS: Vec<Regex> = [
        r"(?i)dm\s+me",
        r"(?i)contact\s+me",
        r"(?i)message\s+me",
        r"(?i)reach\s+out",
        r"(?i)get\s+in\s+touch",
        r"(?i)call\s+me",
        r"(?i)text\s+me",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
    static ref SOCIAL_MEDIA_PATTERNS: Vec<Regex> = [
        r"@\w+",
        r"(?i)follow\s+(us|me)",
        r"(?i)instagram",
        r"(?i)facebook",
        r"(?i)twitter",
        r"(?i)tiktok",
        r"(?i)youtube",
        r"(?i)subscribe",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
    static ref PRICE_PATTERNS: Vec<Regex> = [
        r"(?i)\$\d+\s*only",
        r"(?i)\d+%\s*off",
        r"(?i)only\s+\$\d+",
        r"(?i)save\s+\$\d+",
        r"(?i)save\s+\d+%",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
    static ref PHONE_REGEX: Regex =
        Regex::new(r"(\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap();
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap();
}

const BLOCK_SCORE: u32 = 4;
const FLAG_SCORE: u32 = 2;
const MAX_PLATFORM_MENTIONS: usize = 2;

/// Additive marketing-language score over a single message
#[derive(Debug, Default)]
pub struct PromotionDetector;

impl PromotionDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn count_promotional_keywords(&self, lower_text: &str) -> usize {
        PROMOTIONAL_KEYWORDS
            .iter()
            .filter(|keyword| lower_text.contains(*keyword))
            .count()
    }

    pub fn has_urgency_language(&self, lower_text: &str) -> bool {
        URGENCY_PHRASES.iter().any(|phrase| lower_text.contains(phrase))
    }

    pub fn has_contact_solicitation(&self, text: &str) -> bool {
        CONTACT_PATTERNS.iter().any(|p| p.is_match(text))
    }

    pub fn has_social_media_promotion(&self, text: &str) -> bool {
        SOCIAL_MEDIA_PATTERNS.iter().any(|p| p.is_match(text))
    }

    pub fn has_price_emphasis(&self, text: &str) -> bool {
        PRICE_PATTERNS.iter().any(|p| p.is_match(text))
    }

    pub fn has_excessive_booking_mentions(&self, lower_text: &str) -> bool {
        let mentions = BOOKING_PLATFORMS
            .iter()
            .filter(|platform| lower_text.contains(*platform))
            .count();
        mentions > MAX_PLATFORM_MENTIONS
    }

    pub fn has_contact_info(&self, text: &str) -> bool {
        PHONE_REGEX.is_match(text) || EMAIL_REGEX.is_match(text)
    }
}

impl RuleDetector for PromotionDetector {
    fn analyze(&self, text: &str) -> RuleVerdict {
        let lower_text = text.to_lowercase();
        let mut verdict = RuleVerdict::allow();
        let mut score = 0;

        let keyword_count = self.count_promotional_keywords(&lower_text);
        if keyword_count >= 3 {
            verdict.flags.push("promotional_keywords".to_string());
            score += 2;
        } else if keyword_count == 2 {
            verdict.flags.push("promotional_keywords".to_string());
            score += 1;
        }

        if self.has_urgency_language(&lower_text) {
            verdict.flags.push("urgency_language".to_string());
            score += 1;
        }

        if self.has_contact_solicitation(text) {
            verdict.flags.push("contact_solicitation".to_string());
            score += 2;
        }

        if self.has_social_media_promotion(text) {
            verdict.flags.push("social_media_promotion".to_string());
            score += 2;
        }

        if self.has_price_emphasis(text) {
            verdict.flags.push("price_emphasis".to_string());
            score += 1;
        }

        if self.has_contact_info(text) {
            verdict.flags.push("contact_info".to_string());
            score += 2;
        }

        if self.has_excessive_booking_mentions(&lower_text) {
            verdict.flags.push("excessive_platform_mentions".to_string());
            score += 1;
        }

        verdict.decision = if score >= BLOCK_SCORE {
            Decision::Block
        } else if score >= FLAG_SCORE {
            Decision::Flag
        } else {
            Decision::Allow
        };
        verdict.promotional_score = Some(score);

        log::debug!(
            "Promotion check: score {}, decision {}, flags {:?}",
            score,
            verdict.decision,
            verdict.flags
        );
        verdict
    }

    fn name(&self) -> &str {
        "PromotionDetector"
    }
}
