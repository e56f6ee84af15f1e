pub mod link_analyzer;
pub mod promotion_detector;
pub mod repetition_detector;
pub mod spam_detector;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Outcome of a single check, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    #[default]
    Allow,
    Flag,
    Block,
}

impl Decision {
    /// Raise to `other` if it is more severe. Never lowers the decision.
    pub fn escalate(&mut self, other: Decision) {
        if other > *self {
            *self = other;
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Flag => "FLAG",
            Decision::Block => "BLOCK",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Decision {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ALLOW" => Ok(Decision::Allow),
            "FLAG" => Ok(Decision::Flag),
            "BLOCK" => Ok(Decision::Block),
            other => Err(anyhow::anyhow!("Unknown decision: {}", other)),
        }
    }
}

/// Verdict produced by one rule detector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleVerdict {
    pub decision: Decision,
    pub flags: Vec<String>,
    /// URLs extracted by the link analyzer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    /// Additive score computed by the promotion detector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotional_score: Option<u32>,
}

impl RuleVerdict {
    pub fn allow() -> Self {
        Self::default()
    }

    pub fn with_flag(decision: Decision, flag: &str) -> Self {
        Self {
            decision,
            flags: vec![flag.to_string()],
            ..Default::default()
        }
    }

    /// Record a flag and escalate to `decision`
    pub fn raise(&mut self, flag: &str, decision: Decision) {
        self.flags.push(flag.to_string());
        self.decision.escalate(decision);
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

/// A pure, stateless check over the message text
pub trait RuleDetector: Send + Sync {
    fn analyze(&self, text: &str) -> RuleVerdict;
    fn name(&self) -> &str;
}

/// Remove duplicate flags, keeping first-seen order
pub fn dedup_flags(flags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    flags
        .into_iter()
        .filter(|flag| seen.insert(flag.clone()))
        .collect()
}
