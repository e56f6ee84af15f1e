pub mod components;
pub mod config;
pub mod features;
pub mod history;
pub mod machine_learning;
pub mod moderator;
pub mod normalization;
pub mod regression;

pub use components::decision_engine::{DecisionEngine, DecisionSources, FinalDecision};
pub use config::ModerationConfig;
pub use features::{Decision, RuleVerdict};
pub use machine_learning::{ClassifierVerdict, ToxicityAnalyzer, ToxicityClassifier};
pub use moderator::{ChatKind, ContentModerator, ModerationRequest};
