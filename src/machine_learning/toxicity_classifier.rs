use super::{
    ClassifierVerdict, LabelScore, LexiconModelLoader, ModelLoader, NegativeSentimentMapping,
    OffensivenessMapping, SentimentModel, ToxicityAnalyzer,
};
use crate::config::ClassifierConfig;
use crate::features::Decision;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, Semaphore};

const BLOCK_THRESHOLD: f64 = 0.85;
const FLAG_THRESHOLD: f64 = 0.70;
const POTENTIAL_THRESHOLD: f64 = 0.50;

const CATEGORIES: [&str; 6] = [
    "toxic",
    "severe_toxic",
    "obscene",
    "threat",
    "insult",
    "identity_hate",
];

/// Lazily loaded, fail-open toxicity classifier.
///
/// The model is loaded on first use by a detached task, so a caller that
/// stops waiting does not cancel the load. Concurrent first calls share a
/// single load, and a failed load is retried by the next call.
pub struct ToxicityClassifier {
    loader: Arc<dyn ModelLoader>,
    mapping: Arc<dyn OffensivenessMapping>,
    model: Arc<OnceCell<Arc<dyn SentimentModel>>>,
    inference_permits: Arc<Semaphore>,
    max_input_chars: usize,
    inference_timeout: Duration,
}

impl ToxicityClassifier {
    pub fn new(loader: Arc<dyn ModelLoader>, config: &ClassifierConfig) -> Self {
        Self {
            loader,
            mapping: Arc::new(NegativeSentimentMapping),
            model: Arc::new(OnceCell::new()),
            inference_permits: Arc::new(Semaphore::new(config.max_concurrent_inferences.max(1))),
            max_input_chars: config.max_input_chars.max(1),
            inference_timeout: Duration::from_millis(config.inference_timeout_ms),
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(Arc::new(LexiconModelLoader::from_config(config)), config)
    }

    pub fn with_mapping(mut self, mapping: Arc<dyn OffensivenessMapping>) -> Self {
        self.mapping = mapping;
        self
    }

    /// Load the model if it is not loaded yet
    pub async fn initialize(&self) -> Result<Arc<dyn SentimentModel>> {
        if let Some(model) = self.model.get() {
            return Ok(model.clone());
        }

        let cell = self.model.clone();
        let loader = self.loader.clone();
        let load = tokio::spawn(async move {
            cell.get_or_try_init(|| async {
                log::info!("Loading toxicity model");
                loader.load().await
            })
            .await
            .cloned()
        });

        load.await.context("Model load task failed")?
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    async fn infer(&self, model: Arc<dyn SentimentModel>, text: String) -> Result<Vec<LabelScore>> {
        let permits = self.inference_permits.clone();
        let run = async move {
            let permit = permits
                .acquire_owned()
                .await
                .context("Inference pool closed")?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                model.predict(&text)
            })
            .await
            .context("Inference task failed")?
        };

        tokio::time::timeout(self.inference_timeout, run)
            .await
            .map_err(|_| anyhow!("Inference timed out after {:?}", self.inference_timeout))?
    }

    fn truncate<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.max_input_chars) {
            Some((cut, _)) => {
                log::warn!(
                    "Truncating {} character message to {} characters for classification",
                    text.chars().count(),
                    self.max_input_chars
                );
                &text[..cut]
            }
            None => text,
        }
    }
}

fn verdict_for_score(score: f64) -> ClassifierVerdict {
    let (decision, flags) = if score > BLOCK_THRESHOLD {
        (Decision::Block, vec!["toxic".to_string()])
    } else if score > FLAG_THRESHOLD {
        (Decision::Flag, vec!["toxic".to_string()])
    } else if score > POTENTIAL_THRESHOLD {
        (Decision::Flag, vec!["potentially_toxic".to_string()])
    } else {
        (Decision::Allow, Vec::new())
    };

    let category_scores: BTreeMap<String, f64> = CATEGORIES
        .iter()
        .map(|c| (c.to_string(), if *c == "toxic" { score } else { 0.0 }))
        .collect();

    ClassifierVerdict {
        decision,
        confidence: score,
        flags,
        category_scores: Some(category_scores),
        max_category: Some("toxic".to_string()),
    }
}

#[async_trait]
impl ToxicityAnalyzer for ToxicityClassifier {
    async fn analyze(&self, text: &str) -> ClassifierVerdict {
        if text.trim().is_empty() {
            return ClassifierVerdict::fail_open(None);
        }

        let model = match self.initialize().await {
            Ok(model) => model,
            Err(e) => {
                log::error!("Toxicity model unavailable: {:#}", e);
                return ClassifierVerdict::fail_open(Some("model_unavailable"));
            }
        };

        let input = self.truncate(text).to_string();
        match self.infer(model, input).await {
            Ok(predictions) => {
                let score = self.mapping.offensiveness(&predictions);
                log::debug!("Toxicity predictions {:?} mapped to {:.3}", predictions, score);
                verdict_for_score(score)
            }
            Err(e) => {
                log::error!("Toxicity inference failed: {:#}", e);
                ClassifierVerdict::fail_open(Some("model_error"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModerationConfig;
    use crate::moderator::{ChatKind, ContentModerator};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedModel {
        label: &'static str,
        score: f64,
        delay: Duration,
        seen: Mutex<Vec<String>>,
    }

    impl FixedModel {
        fn new(label: &'static str, score: f64) -> Self {
            Self {
                label,
                score,
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl SentimentModel for FixedModel {
        fn predict(&self, text: &str) -> Result<Vec<LabelScore>> {
            std::thread::sleep(self.delay);
            self.seen.lock().unwrap().push(text.to_string());
            Ok(vec![LabelScore::new(self.label, self.score)])
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct CountingLoader {
        model: Arc<FixedModel>,
        loads: AtomicUsize,
        failures_left: AtomicUsize,
        delay: Duration,
    }

    impl CountingLoader {
        fn new(model: FixedModel) -> Self {
            Self {
                model: Arc::new(model),
                loads: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl ModelLoader for CountingLoader {
        async fn load(&self) -> Result<Arc<dyn SentimentModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(anyhow!("model file missing"));
            }
            Ok(self.model.clone())
        }
    }

    fn classifier(loader: Arc<CountingLoader>) -> ToxicityClassifier {
        ToxicityClassifier::new(loader, &ClassifierConfig::default())
    }

    #[test]
    fn test_score_thresholds() {
        let verdict = verdict_for_score(0.92);
        assert_eq!(verdict.decision, Decision::Block);
        assert_eq!(verdict.flags, vec!["toxic"]);
        assert_eq!(verdict.max_category.as_deref(), Some("toxic"));
        let scores = verdict.category_scores.unwrap();
        assert_eq!(scores.len(), 6);
        assert_eq!(scores["toxic"], 0.92);
        assert_eq!(scores["threat"], 0.0);

        assert_eq!(verdict_for_score(0.85).decision, Decision::Flag);
        assert_eq!(verdict_for_score(0.75).flags, vec!["toxic"]);
        let potential = verdict_for_score(0.6);
        assert_eq!(potential.decision, Decision::Flag);
        assert_eq!(potential.flags, vec!["potentially_toxic"]);
        let clean = verdict_for_score(0.5);
        assert_eq!(clean.decision, Decision::Allow);
        assert!(clean.flags.is_empty());
        assert!(clean.is_scored());
    }

    #[tokio::test]
    async fn test_negative_prediction_blocks() {
        let loader = Arc::new(CountingLoader::new(FixedModel::new("NEGATIVE", 0.95)));
        let verdict = classifier(loader).analyze("you are awful").await;
        assert_eq!(verdict.decision, Decision::Block);
        assert_eq!(verdict.confidence, 0.95);
    }

    #[tokio::test]
    async fn test_positive_prediction_allows() {
        let loader = Arc::new(CountingLoader::new(FixedModel::new("POSITIVE", 0.99)));
        let verdict = classifier(loader).analyze("what a lovely day").await;
        assert_eq!(verdict.decision, Decision::Allow);
        assert_eq!(verdict.confidence, 0.0);
        assert!(verdict.is_scored());
    }

    #[tokio::test]
    async fn test_empty_text_skips_model() {
        let loader = Arc::new(CountingLoader::new(FixedModel::new("NEGATIVE", 0.99)));
        let classifier = classifier(loader.clone());
        let verdict = classifier.analyze("   ").await;
        assert_eq!(verdict.decision, Decision::Allow);
        assert!(verdict.flags.is_empty());
        assert!(!classifier.is_loaded());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_load_fails_open_and_retries() {
        let loader = Arc::new(CountingLoader::new(FixedModel::new("NEGATIVE", 0.95)));
        loader.failures_left.store(1, Ordering::SeqCst);
        let classifier = classifier(loader.clone());

        let first = classifier.analyze("you are awful").await;
        assert_eq!(first.decision, Decision::Allow);
        assert_eq!(first.flags, vec!["model_unavailable"]);
        assert!(!first.is_scored());
        assert!(!classifier.is_loaded());

        let second = classifier.analyze("you are awful").await;
        assert_eq!(second.decision, Decision::Block);
        assert!(classifier.is_loaded());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_load_once() {
        let mut loader = CountingLoader::new(FixedModel::new("POSITIVE", 0.9));
        loader.delay = Duration::from_millis(50);
        let loader = Arc::new(loader);
        let classifier = Arc::new(classifier(loader.clone()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let classifier = classifier.clone();
            handles.push(tokio::spawn(async move {
                classifier.analyze(&format!("message {}", i)).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().decision, Decision::Allow);
        }
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abandoned_callers_do_not_cancel_load() {
        let mut loader = CountingLoader::new(FixedModel::new("NEGATIVE", 0.95));
        loader.delay = Duration::from_millis(150);
        let loader = Arc::new(loader);
        let classifier = Arc::new(classifier(loader.clone()));

        let mut config = ModerationConfig::default();
        config.moderator.classifier_timeout_ms = 50;
        let moderator = ContentModerator::with_analyzer(&config, classifier.clone());

        let first = moderator
            .moderate(Some("you are awful"), None, ChatKind::City)
            .await;
        assert!(!first.sources.ai);
        assert!(!classifier.is_loaded());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(classifier.is_loaded());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

        let later = moderator
            .moderate(Some("you are awful"), None, ChatKind::City)
            .await;
        assert!(later.sources.ai);
        assert_eq!(later.decision, Decision::Block);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_inference_times_out() {
        let mut model = FixedModel::new("NEGATIVE", 0.99);
        model.delay = Duration::from_millis(300);
        let loader = Arc::new(CountingLoader::new(model));
        let config = ClassifierConfig {
            inference_timeout_ms: 50,
            ..Default::default()
        };
        let classifier = ToxicityClassifier::new(loader, &config);

        let verdict = classifier.analyze("you are awful").await;
        assert_eq!(verdict.decision, Decision::Allow);
        assert_eq!(verdict.flags, vec!["model_error"]);
    }

    #[tokio::test]
    async fn test_long_input_is_truncated() {
        let loader = Arc::new(CountingLoader::new(FixedModel::new("POSITIVE", 0.9)));
        let model = loader.model.clone();
        let config = ClassifierConfig {
            max_input_chars: 10,
            ..Default::default()
        };
        let classifier = ToxicityClassifier::new(loader, &config);

        classifier.analyze("ééééééééééééééééééééé").await;
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].chars().count(), 10);
    }
}
