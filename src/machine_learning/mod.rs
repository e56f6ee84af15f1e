//! Toxicity classification.
//!
//! The classifier is built from three pluggable pieces: a [`ModelLoader`]
//! producing a [`SentimentModel`], and an [`OffensivenessMapping`] turning
//! the model's labels into an offensiveness score. The bundled model is a
//! general sentiment lexicon used as a toxicity proxy, so the mapping is
//! kept separate to allow a purpose-built model to be swapped in.

pub mod lexicon_model;
pub mod toxicity_classifier;

use crate::features::Decision;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use lexicon_model::{LexiconModelLoader, LexiconSentimentModel};
pub use toxicity_classifier::ToxicityClassifier;

/// One label emitted by a text classification model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// An in-process text classification model. Inference is CPU-bound and
/// runs on the blocking thread pool.
pub trait SentimentModel: Send + Sync {
    fn predict(&self, text: &str) -> anyhow::Result<Vec<LabelScore>>;
    fn name(&self) -> &str;
}

/// Produces the model on first use
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> anyhow::Result<Arc<dyn SentimentModel>>;
}

/// Maps model output onto an offensiveness score in [0, 1]
pub trait OffensivenessMapping: Send + Sync {
    fn offensiveness(&self, predictions: &[LabelScore]) -> f64;
}

/// Only a `NEGATIVE` label contributes; positive sentiment scores zero
#[derive(Debug, Default, Clone)]
pub struct NegativeSentimentMapping;

impl OffensivenessMapping for NegativeSentimentMapping {
    fn offensiveness(&self, predictions: &[LabelScore]) -> f64 {
        predictions
            .iter()
            .find(|p| p.label.eq_ignore_ascii_case("negative"))
            .map(|p| if p.score.is_finite() { p.score.clamp(0.0, 1.0) } else { 0.0 })
            .unwrap_or(0.0)
    }
}

/// Verdict returned by a toxicity analyzer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub decision: Decision,
    pub confidence: f64,
    pub flags: Vec<String>,
    /// Per-category scores; `None` when the model did not run
    pub category_scores: Option<BTreeMap<String, f64>>,
    pub max_category: Option<String>,
}

impl ClassifierVerdict {
    /// Allow without having consulted the model
    pub fn fail_open(flag: Option<&str>) -> Self {
        Self {
            flags: flag.map(|f| vec![f.to_string()]).unwrap_or_default(),
            ..Default::default()
        }
    }

    /// Whether the verdict carries real model output
    pub fn is_scored(&self) -> bool {
        self.category_scores.is_some()
    }
}

/// The seam the moderator depends on
#[async_trait]
pub trait ToxicityAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> ClassifierVerdict;
}
