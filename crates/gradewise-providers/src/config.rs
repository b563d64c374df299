//! Scorer configuration and factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use gradewise_core::fallback::{BaselineFallback, DEFAULT_BASELINE_SCORE};
use gradewise_core::lease::DEFAULT_LEASE_TTL;
use gradewise_core::orchestrator::GradingConfig;
use gradewise_core::rubric::DEFAULT_REFERENCE_SCALE_MAX;
use gradewise_core::traits::CriterionScorer;

use crate::anthropic::AnthropicScorer;
use crate::mock::MockScorer;
use crate::openai::OpenAiScorer;

/// Configuration for a single scoring provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    /// Offline scorer giving every criterion the same score.
    Mock {
        #[serde(default = "default_mock_score")]
        score: f64,
        #[serde(default = "default_mock_rationale")]
        rationale: String,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
                model,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .field("model", model)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
                model,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
            ProviderConfig::Mock { score, rationale } => f
                .debug_struct("Mock")
                .field("score", score)
                .field("rationale", rationale)
                .finish(),
        }
    }
}

fn default_mock_score() -> f64 {
    4.0
}
fn default_mock_rationale() -> String {
    "Meets the criterion.".to_string()
}

/// The `[grading]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingSettings {
    /// Max concurrent scorer calls per submission.
    pub concurrency: usize,
    pub criterion_timeout_secs: u64,
    /// Retries on transient scorer errors.
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds.
    pub retry_delay_ms: u64,
    pub reference_scale_max: f64,
    /// Score given to criteria the scorer could not grade.
    pub fallback_baseline: f64,
    pub lease_ttl_secs: u64,
}

impl Default for GradingSettings {
    fn default() -> Self {
        let defaults = GradingConfig::default();
        Self {
            concurrency: defaults.concurrency,
            criterion_timeout_secs: defaults.criterion_timeout.as_secs(),
            max_retries: defaults.max_retries,
            retry_delay_ms: defaults.retry_delay.as_millis() as u64,
            reference_scale_max: DEFAULT_REFERENCE_SCALE_MAX,
            fallback_baseline: DEFAULT_BASELINE_SCORE,
            lease_ttl_secs: DEFAULT_LEASE_TTL.as_secs(),
        }
    }
}

impl GradingSettings {
    pub fn grading_config(&self) -> GradingConfig {
        GradingConfig {
            concurrency: self.concurrency.max(1),
            criterion_timeout: Duration::from_secs(self.criterion_timeout_secs),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            reference_scale_max: self.reference_scale_max,
            lease_ttl: Duration::from_secs(self.lease_ttl_secs),
        }
    }

    pub fn fallback(&self) -> BaselineFallback {
        BaselineFallback::new(self.fallback_baseline)
    }

    fn check(&self) -> Result<()> {
        if !(self.reference_scale_max.is_finite() && self.reference_scale_max > 0.0) {
            anyhow::bail!(
                "grading.reference_scale_max must be positive, got {}",
                self.reference_scale_max
            );
        }
        if self.criterion_timeout_secs == 0 {
            anyhow::bail!("grading.criterion_timeout_secs must be at least 1");
        }
        Ok(())
    }
}

/// Top-level gradewise configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradewiseConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Default provider to use.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Model override applied to the default provider.
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub grading: GradingSettings,
}

fn default_provider() -> String {
    "openai".to_string()
}

impl Default for GradewiseConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: None,
            grading: GradingSettings::default(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    let resolve = |v: &Option<String>| v.as_deref().map(resolve_env_vars);
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
            model,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: resolve(base_url),
            org_id: resolve(org_id),
            model: model.clone(),
        },
        ProviderConfig::Anthropic {
            api_key,
            base_url,
            model,
        } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: resolve(base_url),
            model: model.clone(),
        },
        mock @ ProviderConfig::Mock { .. } => mock.clone(),
    }
}

/// Apply `GRADEWISE_OPENAI_KEY` / `GRADEWISE_ANTHROPIC_KEY` style overrides
/// read through `lookup`.
fn apply_env_overrides(config: &mut GradewiseConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(key) = lookup("GRADEWISE_ANTHROPIC_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
                model: None,
            });
        if let ProviderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Some(key) = lookup("GRADEWISE_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
                model: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `gradewise.toml` in the current directory
/// 2. `~/.config/gradewise/config.toml`
///
/// Environment variable overrides: `GRADEWISE_OPENAI_KEY`, `GRADEWISE_ANTHROPIC_KEY`.
pub fn load_config() -> Result<GradewiseConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<GradewiseConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("gradewise.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => GradewiseConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());

    // Resolve env vars in all provider configs
    let resolved: HashMap<String, ProviderConfig> = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    config.providers = resolved;

    Ok(config)
}

/// Parse and check a config file's contents.
pub fn parse_config_str(content: &str) -> Result<GradewiseConfig> {
    let config: GradewiseConfig = toml::from_str(content)?;
    config.grading.check()?;
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("gradewise"))
}

/// Create a scorer from its configuration. `model` overrides the configured
/// model; `timeout` bounds each HTTP request.
pub fn create_scorer(
    config: &ProviderConfig,
    model: Option<&str>,
    timeout: Duration,
) -> Result<Box<dyn CriterionScorer>> {
    let pick = |configured: &Option<String>| model.map(String::from).or_else(|| configured.clone());
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
            model: configured,
        } => {
            if api_key.is_empty() {
                anyhow::bail!("openai provider has no API key (set GRADEWISE_OPENAI_KEY)");
            }
            Ok(Box::new(
                OpenAiScorer::new(api_key, base_url.clone(), org_id.clone(), pick(configured))
                    .with_timeout(timeout),
            ))
        }
        ProviderConfig::Anthropic {
            api_key,
            base_url,
            model: configured,
        } => {
            if api_key.is_empty() {
                anyhow::bail!("anthropic provider has no API key (set GRADEWISE_ANTHROPIC_KEY)");
            }
            Ok(Box::new(
                AnthropicScorer::new(api_key, base_url.clone(), pick(configured))
                    .with_timeout(timeout),
            ))
        }
        ProviderConfig::Mock { score, rationale } => {
            Ok(Box::new(MockScorer::with_fixed_score(*score, rationale)))
        }
    }
}

/// Create the scorer named `name`, falling back to the config's default.
pub fn scorer_from_config(
    config: &GradewiseConfig,
    name: Option<&str>,
    model: Option<&str>,
) -> Result<Box<dyn CriterionScorer>> {
    let name = name.unwrap_or(&config.default_provider);
    let provider = config.providers.get(name).with_context(|| {
        format!("provider '{name}' is not configured (check gradewise.toml)")
    })?;
    let model = model.or(config.default_model.as_deref());
    let timeout = Duration::from_secs(config.grading.criterion_timeout_secs.max(1));
    create_scorer(provider, model, timeout)
}
