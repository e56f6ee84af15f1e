//! Decision Engine Component
//!
//! Decides when the classifier is consulted and merges its verdict with the
//! aggregate rule verdict. Rules take precedence: the classifier can escalate,
//! or rescue a rule block it reads as legitimate feedback, but only blocks on
//! high confidence.

use crate::components::RuleAnalysis;
use crate::config::ModeratorConfig;
use crate::features::{dedup_flags, Decision};
use crate::machine_learning::ClassifierVerdict;
use serde::{Deserialize, Serialize};

const AI_BLOCK_CONFIDENCE: f64 = 0.85;
const AI_FLAG_CONFIDENCE: f64 = 0.70;
const SEVERE_FLAG_LIMIT: usize = 2;

const SUSPICIOUS_FLAG_MARKERS: [&str; 5] = [
    "url_shortener",
    "suspicious",
    "promotional",
    "potential_abuse",
    "repetition",
];

const SEVERE_FLAG_MARKERS: [&str; 5] = [
    "threat",
    "identity_hate",
    "severe_toxic",
    "suspicious_link",
    "ip_address",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub require_classifier_for_block: bool,
    pub short_message_chars: usize,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            require_classifier_for_block: false,
            short_message_chars: 100,
        }
    }
}

impl From<&ModeratorConfig> for DecisionConfig {
    fn from(config: &ModeratorConfig) -> Self {
        Self {
            require_classifier_for_block: config.require_classifier_for_block,
            short_message_chars: config.short_message_chars,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionSources {
    pub rule_based: bool,
    pub ai: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDecision {
    pub allowed: bool,
    pub decision: Decision,
    pub flags: Vec<String>,
    pub confidence: f64,
    pub reason: Option<String>,
    pub sources: DecisionSources,
}

impl FinalDecision {
    /// Fail-closed result for a message without text
    pub fn invalid_content() -> Self {
        Self {
            allowed: false,
            decision: Decision::Block,
            flags: vec!["invalid_content".to_string()],
            confidence: 1.0,
            reason: Some("Invalid message content".to_string()),
            sources: DecisionSources {
                rule_based: true,
                ai: false,
            },
        }
    }

    /// Result taken from the rule layer alone
    pub fn rule_only(analysis: &RuleAnalysis, confidence: f64, reason: &str) -> Self {
        Self {
            allowed: analysis.decision != Decision::Block,
            decision: analysis.decision,
            flags: analysis.flags.clone(),
            confidence,
            reason: Some(reason.to_string()),
            sources: DecisionSources {
                rule_based: true,
                ai: false,
            },
        }
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

pub struct DecisionEngine {
    config: DecisionConfig,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    /// Whether the rule results stop the pipeline before the classifier
    pub fn short_circuits(&self, analysis: &RuleAnalysis) -> bool {
        analysis.decision == Decision::Block && !self.config.require_classifier_for_block
    }

    /// Classifier-invocation policy
    pub fn should_invoke_classifier(&self, analysis: &RuleAnalysis, text: &str) -> bool {
        if self.short_circuits(analysis) {
            return false;
        }

        let has_suspicious_flags = analysis.flags.iter().any(|flag| {
            SUSPICIOUS_FLAG_MARKERS
                .iter()
                .any(|marker| flag.contains(marker))
        });

        let is_short_message =
            text.chars().count() < self.config.short_message_chars && !text.trim().is_empty();

        analysis.decision == Decision::Flag
            || has_suspicious_flags
            || (analysis.decision == Decision::Allow && is_short_message)
    }

    /// Merge the rule results with the classifier verdict, if any
    pub fn combine(
        &self,
        analysis: &RuleAnalysis,
        classifier: Option<&ClassifierVerdict>,
    ) -> FinalDecision {
        let mut result = FinalDecision {
            allowed: true,
            decision: Decision::Allow,
            flags: analysis.flags.clone(),
            confidence: 0.0,
            reason: None,
            sources: DecisionSources {
                rule_based: true,
                ai: false,
            },
        };

        match analysis.decision {
            Decision::Block => {
                result.decision = Decision::Block;
                result.reason = Some("Blocked by rule-based checks".to_string());
            }
            Decision::Flag => {
                result.decision = Decision::Flag;
                result.reason = Some("Flagged by rule-based checks".to_string());
            }
            Decision::Allow => {}
        }

        match classifier {
            Some(verdict) if verdict.is_scored() => self.merge_classifier(&mut result, verdict),
            Some(verdict) => {
                // Degraded classifier: surface why, keep the rule decision
                result.flags.extend(verdict.flags.iter().cloned());
            }
            None => {}
        }

        result.flags = dedup_flags(result.flags);

        let severe = result
            .flags
            .iter()
            .filter(|flag| SEVERE_FLAG_MARKERS.iter().any(|marker| flag.contains(marker)))
            .count();
        if severe >= SEVERE_FLAG_LIMIT {
            result.decision = Decision::Block;
            result.reason = Some("Multiple severe violations detected".to_string());
        }

        result.allowed = result.decision != Decision::Block;
        result
    }

    fn merge_classifier(&self, result: &mut FinalDecision, verdict: &ClassifierVerdict) {
        result.sources.ai = true;
        result.confidence = verdict.confidence;
        result.flags.extend(verdict.flags.iter().cloned());

        let category = verdict.max_category.as_deref().unwrap_or("toxic");

        match verdict.decision {
            Decision::Block => {
                if verdict.confidence > AI_BLOCK_CONFIDENCE {
                    result.decision = Decision::Block;
                    result.reason = Some(format!(
                        "Blocked by AI toxicity detection: {} (confidence: {:.1}%)",
                        category,
                        verdict.confidence * 100.0
                    ));
                } else if verdict.confidence > AI_FLAG_CONFIDENCE {
                    result.decision = Decision::Flag;
                    result.reason = Some(format!(
                        "Flagged by AI: {} (confidence: {:.1}%)",
                        category,
                        verdict.confidence * 100.0
                    ));
                }
            }
            Decision::Allow => {
                let reads_legitimate = verdict
                    .flags
                    .iter()
                    .any(|f| f.contains("potentially_toxic") || !f.contains("toxic"));
                if result.decision == Decision::Block && reads_legitimate {
                    result.decision = Decision::Allow;
                    result.reason = Some("Allowed - legitimate feedback".to_string());
                }
            }
            Decision::Flag => {
                if result.decision == Decision::Allow {
                    result.decision = Decision::Flag;
                    result.reason = Some(format!("Flagged by AI: {}", category));
                }
            }
        }
    }

    pub fn get_config(&self) -> &DecisionConfig {
        &self.config
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(DecisionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::RuleVerdict;
    use std::collections::BTreeMap;

    fn rules(decision: Decision, flags: &[&str]) -> RuleAnalysis {
        RuleAnalysis {
            decision,
            flags: flags.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    fn scored(decision: Decision, confidence: f64, flags: &[&str]) -> ClassifierVerdict {
        let mut scores = BTreeMap::new();
        scores.insert("toxic".to_string(), confidence);
        ClassifierVerdict {
            decision,
            confidence,
            flags: flags.iter().map(|f| f.to_string()).collect(),
            category_scores: Some(scores),
            max_category: Some("toxic".to_string()),
        }
    }

    #[test]
    fn test_rule_block_skips_classifier() {
        let engine = DecisionEngine::default();
        let analysis = rules(Decision::Block, &["suspicious_link"]);
        assert!(engine.short_circuits(&analysis));
        assert!(!engine.should_invoke_classifier(&analysis, "hi"));

        let engine = DecisionEngine::new(DecisionConfig {
            require_classifier_for_block: true,
            ..Default::default()
        });
        assert!(!engine.short_circuits(&analysis));
        assert!(engine.should_invoke_classifier(&analysis, "hi"));
    }

    #[test]
    fn test_invocation_policy() {
        let engine = DecisionEngine::default();
        let long_text = "word ".repeat(40);

        assert!(engine.should_invoke_classifier(&rules(Decision::Flag, &["insecure_link"]), &long_text));
        assert!(engine.should_invoke_classifier(
            &rules(Decision::Allow, &["promotional_keywords"]),
            &long_text
        ));
        assert!(engine.should_invoke_classifier(&rules(Decision::Allow, &[]), "you are an idiot"));
        assert!(!engine.should_invoke_classifier(&rules(Decision::Allow, &[]), &long_text));
        assert!(!engine.should_invoke_classifier(&rules(Decision::Allow, &[]), "   "));
    }

    #[test]
    fn test_rules_only_merge() {
        let engine = DecisionEngine::default();

        let decision = engine.combine(&rules(Decision::Flag, &["url_shortener"]), None);
        assert_eq!(decision.decision, Decision::Flag);
        assert!(decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("Flagged by rule-based checks"));
        assert!(!decision.sources.ai);

        let decision = engine.combine(&rules(Decision::Allow, &[]), None);
        assert_eq!(decision.decision, Decision::Allow);
        assert!(decision.reason.is_none());
    }

    #[test]
    fn test_high_confidence_classifier_blocks() {
        let engine = DecisionEngine::default();
        let verdict = scored(Decision::Block, 0.923, &["toxic"]);
        let decision = engine.combine(&rules(Decision::Allow, &[]), Some(&verdict));

        assert_eq!(decision.decision, Decision::Block);
        assert!(!decision.allowed);
        assert!(decision.sources.ai);
        assert_eq!(decision.confidence, 0.923);
        assert_eq!(decision.flags, vec!["toxic"]);
        assert_eq!(
            decision.reason.as_deref(),
            Some("Blocked by AI toxicity detection: toxic (confidence: 92.3%)")
        );
    }

    #[test]
    fn test_medium_confidence_only_flags() {
        let engine = DecisionEngine::new(DecisionConfig {
            require_classifier_for_block: true,
            ..Default::default()
        });
        let verdict = scored(Decision::Block, 0.8, &["toxic"]);
        let decision = engine.combine(&rules(Decision::Block, &["word_repetition"]), Some(&verdict));
        assert_eq!(decision.decision, Decision::Flag);
        assert!(decision.allowed);
    }

    #[test]
    fn test_classifier_flag_escalates_allow() {
        let engine = DecisionEngine::default();
        let verdict = scored(Decision::Flag, 0.6, &["potentially_toxic"]);
        let decision = engine.combine(&rules(Decision::Allow, &[]), Some(&verdict));
        assert_eq!(decision.decision, Decision::Flag);
        assert_eq!(decision.reason.as_deref(), Some("Flagged by AI: toxic"));
    }

    #[test]
    fn test_legitimate_feedback_rescues_rule_block() {
        let engine = DecisionEngine::new(DecisionConfig {
            require_classifier_for_block: true,
            ..Default::default()
        });
        let verdict = scored(Decision::Allow, 0.2, &["negative_feedback"]);
        let decision = engine.combine(
            &rules(Decision::Block, &["promotional_keywords"]),
            Some(&verdict),
        );
        assert_eq!(decision.decision, Decision::Allow);
        assert!(decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("Allowed - legitimate feedback"));

        // No flag to read as legitimate: the rule block stands
        let verdict = scored(Decision::Allow, 0.2, &[]);
        let decision = engine.combine(
            &rules(Decision::Block, &["promotional_keywords"]),
            Some(&verdict),
        );
        assert_eq!(decision.decision, Decision::Block);
    }

    #[test]
    fn test_severe_flags_force_block() {
        let engine = DecisionEngine::new(DecisionConfig {
            require_classifier_for_block: true,
            ..Default::default()
        });
        let verdict = scored(Decision::Allow, 0.1, &["threat_language"]);
        let decision = engine.combine(&rules(Decision::Block, &["suspicious_link"]), Some(&verdict));
        assert_eq!(decision.decision, Decision::Block);
        assert!(!decision.allowed);
        assert_eq!(
            decision.reason.as_deref(),
            Some("Multiple severe violations detected")
        );
    }

    #[test]
    fn test_degraded_classifier_is_surfaced_not_merged() {
        let engine = DecisionEngine::default();
        let verdict = ClassifierVerdict::fail_open(Some("model_unavailable"));
        let decision =
            engine.combine(&rules(Decision::Flag, &["url_shortener"]), Some(&verdict));
        assert_eq!(decision.decision, Decision::Flag);
        assert_eq!(decision.flags, vec!["url_shortener", "model_unavailable"]);
        assert!(!decision.sources.ai);
        assert_eq!(decision.confidence, 0.0);
    }

    #[test]
    fn test_final_decision_serializes_camel_case() {
        let decision = FinalDecision::invalid_content();
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["decision"], "BLOCK");
        assert_eq!(json["allowed"], false);
        assert_eq!(json["sources"]["ruleBased"], true);
        assert_eq!(json["flags"][0], "invalid_content");
    }

    #[test]
    fn test_rule_only_result() {
        let analysis = RuleAnalysis::new(
            RuleVerdict::with_flag(Decision::Block, "suspicious_tld"),
            RuleVerdict::allow(),
            RuleVerdict::allow(),
            None,
        );
        let decision = FinalDecision::rule_only(&analysis, 1.0, "Blocked by rule-based checks");
        assert!(!decision.allowed);
        assert_eq!(decision.flags, vec!["suspicious_tld"]);
        assert_eq!(decision.confidence, 1.0);
    }
}
