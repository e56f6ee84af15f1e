use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ModerationConfig {
    pub moderator: ModeratorConfig,
    pub classifier: ClassifierConfig,
    pub repetition: RepetitionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ModeratorConfig {
    /// Consult the classifier even when the rules already block
    pub require_classifier_for_block: bool,
    pub classifier_timeout_ms: u64,
    /// Messages shorter than this are sent to the classifier even when the
    /// rules allow them
    pub short_message_chars: usize,
}

impl Default for ModeratorConfig {
    fn default() -> Self {
        Self {
            require_classifier_for_block: false,
            classifier_timeout_ms: 2500,
            short_message_chars: 100,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_path: Option<String>,
    pub fallback_model_paths: Vec<String>,
    pub use_builtin_model: bool,
    pub max_input_chars: usize,
    pub inference_timeout_ms: u64,
    pub max_concurrent_inferences: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: Some("models/sentiment-lexicon.yaml".to_string()),
            fallback_model_paths: vec![
                "/usr/share/chat-moderation/sentiment-lexicon.yaml".to_string()
            ],
            use_builtin_model: true,
            max_input_chars: 500,
            inference_timeout_ms: 10_000,
            max_concurrent_inferences: 4,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RepetitionConfig {
    pub window_capacity: usize,
    pub window_ttl_secs: u64,
    pub max_tracked_submitters: usize,
}

impl Default for RepetitionConfig {
    fn default() -> Self {
        Self {
            window_capacity: 20,
            window_ttl_secs: 600,
            max_tracked_submitters: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ModerationConfig> {
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

    let config: ModerationConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML config: {}", path.as_ref().display()))?;

    Ok(config)
}

pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> ModerationConfig {
    match load_config(&path) {
        Ok(config) => {
            log::info!("Loaded configuration from: {}", path.as_ref().display());
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({:#}), using defaults", e);
            ModerationConfig::default()
        }
    }
}

pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let content = serde_yaml::to_string(&ModerationConfig::default())
        .context("Failed to serialize default config")?;
    fs::write(&path, content)
        .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;
    Ok(())
}
