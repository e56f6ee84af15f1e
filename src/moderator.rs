use crate::components::decision_engine::{DecisionConfig, DecisionEngine, FinalDecision};
use crate::components::RuleAnalysis;
use crate::config::ModerationConfig;
use crate::features::link_analyzer::LinkAnalyzer;
use crate::features::promotion_detector::PromotionDetector;
use crate::features::repetition_detector::RepetitionDetector;
use crate::features::spam_detector::SpamDetector;
use crate::features::{Decision, RuleDetector};
use crate::history::InMemoryHistoryStore;
use crate::machine_learning::{ClassifierVerdict, ToxicityAnalyzer, ToxicityClassifier};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Where the message is being posted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    #[default]
    City,
    Private,
}

impl fmt::Display for ChatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatKind::City => f.write_str("city"),
            ChatKind::Private => f.write_str("private"),
        }
    }
}

impl std::str::FromStr for ChatKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "city" => Ok(ChatKind::City),
            "private" => Ok(ChatKind::Private),
            other => Err(anyhow::anyhow!("Unknown chat kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationRequest {
    pub text: Option<String>,
    pub submitter_id: Option<String>,
    #[serde(default)]
    pub chat_kind: ChatKind,
}

/// Rule layer plus toxicity classifier behind a single entry point
pub struct ContentModerator {
    link_analyzer: LinkAnalyzer,
    spam_detector: SpamDetector,
    promotion_detector: PromotionDetector,
    repetition_detector: RepetitionDetector,
    classifier: Arc<dyn ToxicityAnalyzer>,
    engine: DecisionEngine,
    classifier_timeout: Duration,
}

impl ContentModerator {
    pub fn new(config: &ModerationConfig) -> Self {
        let classifier = Arc::new(ToxicityClassifier::from_config(&config.classifier));
        Self::with_analyzer(config, classifier)
    }

    pub fn with_analyzer(config: &ModerationConfig, classifier: Arc<dyn ToxicityAnalyzer>) -> Self {
        let store = InMemoryHistoryStore::new(
            config.repetition.window_capacity,
            Duration::from_secs(config.repetition.window_ttl_secs),
            config.repetition.max_tracked_submitters,
        );

        Self {
            link_analyzer: LinkAnalyzer::new(),
            spam_detector: SpamDetector::new(),
            promotion_detector: PromotionDetector::new(),
            repetition_detector: RepetitionDetector::new(Arc::new(store)),
            classifier,
            engine: DecisionEngine::new(DecisionConfig::from(&config.moderator)),
            classifier_timeout: Duration::from_millis(config.moderator.classifier_timeout_ms),
        }
    }

    /// Run every rule detector and aggregate worst-of. The repetition
    /// detector only runs, and only records the message, with a non-empty
    /// submitter id.
    pub fn run_rules(&self, text: &str, submitter: Option<&str>) -> RuleAnalysis {
        let link = self.link_analyzer.analyze(text);
        let spam = self.spam_detector.analyze(text);
        let promotion = self.promotion_detector.analyze(text);
        let repetition = submitter.filter(|id| !id.is_empty()).map(|id| {
            self.repetition_detector
                .analyze(id, text, &link.urls, SystemTime::now())
        });

        RuleAnalysis::new(link, spam, promotion, repetition)
    }

    pub async fn moderate(
        &self,
        text: Option<&str>,
        submitter: Option<&str>,
        chat_kind: ChatKind,
    ) -> FinalDecision {
        let text = match text {
            Some(text) => text,
            None => {
                log::warn!("Rejecting {} chat message without text", chat_kind);
                return FinalDecision::invalid_content();
            }
        };

        let analysis = self.run_rules(text, submitter);
        log::debug!(
            "Rule checks for {} chat message: {} {:?}",
            chat_kind,
            analysis.decision,
            analysis.flags
        );

        if self.engine.short_circuits(&analysis) {
            return FinalDecision::rule_only(&analysis, 1.0, "Blocked by rule-based checks");
        }

        let verdict = if self.engine.should_invoke_classifier(&analysis, text) {
            self.classify(text).await
        } else {
            None
        };

        let result = self.engine.combine(&analysis, verdict.as_ref());
        log::debug!(
            "Moderation result: {} (allowed: {}, flags: {:?})",
            result.decision,
            result.allowed,
            result.flags
        );
        result
    }

    pub async fn moderate_request(&self, request: &ModerationRequest) -> FinalDecision {
        self.moderate(
            request.text.as_deref(),
            request.submitter_id.as_deref(),
            request.chat_kind,
        )
        .await
    }

    /// Rule layer only, for high-volume callers
    pub fn quick_check(&self, text: &str, submitter: Option<&str>) -> FinalDecision {
        let analysis = self.run_rules(text, submitter);
        if analysis.decision == Decision::Block {
            FinalDecision::rule_only(&analysis, 1.0, "Blocked by rule-based checks")
        } else {
            FinalDecision::rule_only(&analysis, 0.5, "Passed rule-based checks")
        }
    }

    async fn classify(&self, text: &str) -> Option<ClassifierVerdict> {
        match tokio::time::timeout(self.classifier_timeout, self.classifier.analyze(text)).await {
            Ok(verdict) => Some(verdict),
            Err(_) => {
                log::warn!(
                    "Toxicity analysis timed out after {:?}, using rule-based result",
                    self.classifier_timeout
                );
                None
            }
        }
    }
}
