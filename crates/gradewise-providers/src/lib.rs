//! gradewise-providers: external criterion scorers.
//!
//! Implements the `CriterionScorer` trait for OpenAI-compatible and Anthropic
//! APIs, plus a scripted mock for offline grading and tests.

pub mod anthropic;
pub mod config;
mod http;
pub mod mock;
pub mod openai;
pub mod prompt;

pub use config::{
    create_scorer, load_config, load_config_from, scorer_from_config, GradewiseConfig,
    GradingSettings, ProviderConfig,
};
pub use mock::{MockResponse, MockScorer};
