//! Configuration for the question pipeline.
//!
//! All runtime parameters live in a TOML file; API keys come from the
//! environment (or explicit config values with `${VAR}` expansion).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for quaestio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// LLM provider configuration
    pub provider: ProviderConfig,

    /// Generation settings
    pub generation: GenerationConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Which vendor backs the provider adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    /// Environment variable consulted when no `api_key_env` is configured.
    pub fn default_api_key_env(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Vendor backing the adapter (default: openai)
    #[serde(default)]
    pub kind: ProviderKind,

    /// API key; supports `${VAR}` expansion. Usually left unset in favour
    /// of the environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Override the vendor base URL (useful for proxies and tests)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Maximum concurrent API calls through this provider
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

fn default_concurrency() -> usize {
    5
}

fn default_timeout_secs() -> f64 {
    30.0
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            api_key: None,
            api_key_env: None,
            base_url: None,
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model ID for all agent calls (e.g. "gpt-4o", "claude-sonnet-4-5")
    pub model: String,

    /// Sampling temperature, 0.0 - 1.0
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Subtopics requested per focus
    #[serde(default = "default_subtopics_per_focus")]
    pub subtopics_per_focus: usize,

    /// Difficulty level 1-3 (Bloom taxonomy)
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,

    /// Maximum regeneration rounds when a question is rejected
    #[serde(default = "default_max_review_rounds")]
    pub max_review_rounds: u32,

    /// Directory holding prompt templates, one file per agent
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: PathBuf,

    /// Questions processed concurrently per batch
    #[serde(default = "default_concurrent_questions")]
    pub concurrent_questions: usize,

    /// Checkpoint summary interval, in focuses
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_subtopics_per_focus() -> usize {
    50
}

fn default_difficulty() -> u8 {
    2
}

fn default_max_review_rounds() -> u32 {
    3
}

fn default_prompts_dir() -> PathBuf {
    PathBuf::from("prompts")
}

fn default_concurrent_questions() -> usize {
    5
}

fn default_checkpoint_every() -> usize {
    10
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// SQLite database for pipeline state and metrics
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Default spreadsheet path for exports
    #[serde(default = "default_spreadsheet")]
    pub spreadsheet: PathBuf,

    /// Include rejected questions in exports
    #[serde(default)]
    pub include_rejected: bool,
}

fn default_database() -> PathBuf {
    PathBuf::from("output/pipeline.db")
}

fn default_spreadsheet() -> PathBuf {
    PathBuf::from("output/questions.xlsx")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            spreadsheet: default_spreadsheet(),
            include_rejected: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.provider.api_key {
            let expanded = expand_env_vars(key);
            if !expanded.trim().is_empty() {
                return Ok(expanded);
            }
        }

        let env_var = self
            .provider
            .api_key_env
            .clone()
            .unwrap_or_else(|| self.provider.kind.default_api_key_env().to_string());

        std::env::var(&env_var).map_err(|_| ConfigError::MissingApiKey { env_var })
    }

    /// Validate value ranges.
    ///
    /// Temperature is checked here, once, at the boundary; the provider
    /// adapters perform no internal range check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be in [0.0, 1.0], got {}",
                self.generation.temperature
            )));
        }
        if self.provider.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "provider.concurrency must be positive".to_string(),
            ));
        }
        if self.provider.timeout_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "provider.timeout_secs must be positive, got {}",
                self.provider.timeout_secs
            )));
        }
        if !(1..=3).contains(&self.generation.difficulty) {
            return Err(ConfigError::Invalid(format!(
                "generation.difficulty must be 1-3, got {}",
                self.generation.difficulty
            )));
        }
        if self.generation.subtopics_per_focus == 0 {
            return Err(ConfigError::Invalid(
                "generation.subtopics_per_focus must be positive".to_string(),
            ));
        }
        if self.generation.max_review_rounds == 0 {
            return Err(ConfigError::Invalid(
                "generation.max_review_rounds must be at least 1".to_string(),
            ));
        }
        if self.generation.model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "generation.model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR_NAME}` syntax. Unset variables are left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();

    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },

    #[error("missing API key: set the {env_var} env var or api_key in config")]
    MissingApiKey { env_var: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> Config {
        toml::from_str(
            r#"
            [provider]
            kind = "anthropic"

            [generation]
            model = "claude-sonnet-4-5"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn defaults_fill_in_for_minimal_config() {
        let config = minimal_config();
        assert_eq!(config.provider.kind, ProviderKind::Anthropic);
        assert_eq!(config.provider.concurrency, 5);
        assert_eq!(config.provider.timeout_secs, 30.0);
        assert_eq!(config.generation.temperature, 0.7);
        assert_eq!(config.generation.subtopics_per_focus, 50);
        assert_eq!(config.generation.max_review_rounds, 3);
        assert_eq!(config.output.database, PathBuf::from("output/pipeline.db"));
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        let mut config = minimal_config();
        config.generation.temperature = 1.5;
        assert!(config.validate().is_err());
        config.generation.temperature = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency_and_bad_difficulty() {
        let mut config = minimal_config();
        config.provider.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = minimal_config();
        config.generation.difficulty = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn api_key_env_defaults_follow_provider_kind() {
        assert_eq!(ProviderKind::OpenAi.default_api_key_env(), "OPENAI_API_KEY");
        assert_eq!(
            ProviderKind::Anthropic.default_api_key_env(),
            "ANTHROPIC_API_KEY"
        );
    }

    #[test]
    fn expand_env_vars_replaces_known_variables() {
        // SAFETY: test-local env mutation
        unsafe { std::env::set_var("QUAESTIO_TEST_VAR", "resolved") };
        assert_eq!(expand_env_vars("key-${QUAESTIO_TEST_VAR}"), "key-resolved");
        assert_eq!(expand_env_vars("${QUAESTIO_UNSET_VAR}"), "${QUAESTIO_UNSET_VAR}");
    }
}
