use super::{LabelScore, ModelLoader, SentimentModel};
use crate::config::ClassifierConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const BUILTIN_LEXICON: &str = include_str!("../../models/sentiment-lexicon.yaml");

// Tokens after a negator that can still be flipped by it
const NEGATION_REACH: usize = 2;

#[derive(Debug, Deserialize)]
struct LexiconArtifact {
    name: String,
    #[serde(default)]
    bias: f64,
    #[serde(default = "default_scale")]
    scale: f64,
    #[serde(default)]
    negations: Vec<String>,
    terms: HashMap<String, f64>,
}

fn default_scale() -> f64 {
    1.0
}

/// Weighted-term sentiment model with a logistic output.
///
/// Emits only its top label, `NEGATIVE` or `POSITIVE`, with that label's
/// probability as the score.
#[derive(Debug, Clone)]
pub struct LexiconSentimentModel {
    name: String,
    bias: f64,
    scale: f64,
    negations: HashSet<String>,
    terms: HashMap<String, f64>,
}

impl LexiconSentimentModel {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let artifact: LexiconArtifact =
            serde_yaml::from_str(content).context("Failed to parse sentiment lexicon")?;

        if artifact.terms.is_empty() {
            return Err(anyhow!("Sentiment lexicon '{}' has no terms", artifact.name));
        }
        if !artifact.bias.is_finite() || !artifact.scale.is_finite() || artifact.scale <= 0.0 {
            return Err(anyhow!(
                "Sentiment lexicon '{}' has invalid bias/scale",
                artifact.name
            ));
        }
        if let Some((term, _)) = artifact.terms.iter().find(|(_, w)| !w.is_finite()) {
            return Err(anyhow!("Non-finite weight for term '{}'", term));
        }

        Ok(Self {
            name: artifact.name,
            bias: artifact.bias,
            scale: artifact.scale,
            negations: artifact
                .negations
                .into_iter()
                .map(|n| n.to_lowercase())
                .collect(),
            terms: artifact
                .terms
                .into_iter()
                .map(|(term, weight)| (term.to_lowercase(), weight))
                .collect(),
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_LEXICON).context("Bundled sentiment lexicon is invalid")
    }

    /// Summed term weights, with a negator flipping the next weighted term
    /// inside its reach
    pub fn polarity(&self, text: &str) -> f64 {
        let lowered = text.to_lowercase();
        let mut polarity = 0.0;
        let mut negation_left = 0;

        for token in lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|t| !t.is_empty())
        {
            if self.negations.contains(token) {
                negation_left = NEGATION_REACH;
                continue;
            }

            match self.terms.get(token) {
                Some(weight) => {
                    polarity += if negation_left > 0 { -weight } else { *weight };
                    negation_left = 0;
                }
                None => negation_left = negation_left.saturating_sub(1),
            }
        }

        polarity
    }

    pub fn negative_probability(&self, text: &str) -> f64 {
        let logit = self.bias - self.scale * self.polarity(text);
        1.0 / (1.0 + (-logit).exp())
    }
}

impl SentimentModel for LexiconSentimentModel {
    fn predict(&self, text: &str) -> Result<Vec<LabelScore>> {
        let negative = self.negative_probability(text);
        let top = if negative >= 0.5 {
            LabelScore::new("NEGATIVE", negative)
        } else {
            LabelScore::new("POSITIVE", 1.0 - negative)
        };
        Ok(vec![top])
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Resolves the lexicon from the configured path, then each fallback path,
/// then the bundled copy if allowed
#[derive(Debug, Clone)]
pub struct LexiconModelLoader {
    primary: Option<PathBuf>,
    fallbacks: Vec<PathBuf>,
    use_builtin: bool,
}

impl LexiconModelLoader {
    pub fn new(primary: Option<PathBuf>, fallbacks: Vec<PathBuf>, use_builtin: bool) -> Self {
        Self {
            primary,
            fallbacks,
            use_builtin,
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(
            config.model_path.as_ref().map(PathBuf::from),
            config.fallback_model_paths.iter().map(PathBuf::from).collect(),
            config.use_builtin_model,
        )
    }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.primary
            .iter()
            .chain(self.fallbacks.iter())
            .cloned()
            .collect()
    }

    async fn load_file(path: &Path) -> Result<LexiconSentimentModel> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read sentiment lexicon: {}", path.display()))?;
        LexiconSentimentModel::from_yaml(&content)
            .with_context(|| format!("Invalid sentiment lexicon: {}", path.display()))
    }
}

#[async_trait]
impl ModelLoader for LexiconModelLoader {
    async fn load(&self) -> Result<Arc<dyn SentimentModel>> {
        let search_paths = self.search_paths();

        for path in &search_paths {
            if !path.exists() {
                log::debug!("Sentiment lexicon not found at {}", path.display());
                continue;
            }
            let model = Self::load_file(path).await?;
            log::info!(
                "Loaded sentiment model '{}' from {} ({} terms)",
                model.name,
                path.display(),
                model.terms.len()
            );
            return Ok(Arc::new(model));
        }

        if self.use_builtin {
            let model = LexiconSentimentModel::builtin()?;
            log::info!(
                "Using bundled sentiment model '{}' ({} terms)",
                model.name,
                model.terms.len()
            );
            return Ok(Arc::new(model));
        }

        let searched: Vec<String> = search_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        Err(anyhow!(
            "No sentiment model found (searched: {})",
            searched.join(", ")
        ))
    }
}
