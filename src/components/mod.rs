//! Verdict aggregation components
//!
//! The rule detectors report into a [`RuleAnalysis`]; the decision engine
//! decides whether the classifier is worth consulting and merges the two.

pub mod decision_engine;

use crate::features::{dedup_flags, Decision, RuleVerdict};
use serde::Serialize;

/// Per-detector verdicts plus their worst-of aggregate
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleAnalysis {
    pub link: RuleVerdict,
    pub spam: RuleVerdict,
    pub promotion: RuleVerdict,
    /// `None` when no submitter was given
    pub repetition: Option<RuleVerdict>,
    pub decision: Decision,
    pub flags: Vec<String>,
}

impl RuleAnalysis {
    pub fn new(
        link: RuleVerdict,
        spam: RuleVerdict,
        promotion: RuleVerdict,
        repetition: Option<RuleVerdict>,
    ) -> Self {
        let mut decision = Decision::Allow;
        let mut flags = Vec::new();
        for verdict in [Some(&link), Some(&spam), Some(&promotion), repetition.as_ref()]
            .into_iter()
            .flatten()
        {
            decision.escalate(verdict.decision);
            flags.extend(verdict.flags.iter().cloned());
        }

        Self {
            link,
            spam,
            promotion,
            repetition,
            decision,
            flags: dedup_flags(flags),
        }
    }

    pub fn urls(&self) -> &[String] {
        &self.link.urls
    }
}
