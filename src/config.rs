//! Layered configuration: file, then environment, then defaults

use crate::compress::CompressorConfig;
use crate::condense::{CondenserConfig, LlmSummarizerConfig, SummaryTreeConfig};
use crate::conversation::trigger::{MAX_CONDENSE_THRESHOLD, MIN_CONDENSE_THRESHOLD};
use crate::conversation::CondensationConfig;
use crate::error::{ContextError, Result};
use crate::prioritize::PrioritizerConfig;
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Token cache sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCacheConfig {
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// Model id mixed into cache keys
    #[serde(default = "default_model_id")]
    pub model_id: String,
}

fn default_cache_max_entries() -> usize {
    2000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_model_id() -> String {
    "cl100k_base".to_string()
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            ttl_secs: default_cache_ttl_secs(),
            model_id: default_model_id(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit one JSON object per line instead of human-readable lines
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Root configuration for the context engine
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub condensation: CondensationConfig,
    #[serde(default)]
    pub condenser: CondenserConfig,
    #[serde(default)]
    pub summarizer: LlmSummarizerConfig,
    #[serde(default)]
    pub summary_tree: SummaryTreeConfig,
    #[serde(default)]
    pub prioritizer: PrioritizerConfig,
    #[serde(default)]
    pub compressor: CompressorConfig,
    #[serde(default)]
    pub token_cache: TokenCacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load from `config.{toml,yaml,json}` and `CONDENSE__*` environment variables
    ///
    /// A `.env` file is honored when present. Missing config files are fine;
    /// every field has a default.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("CONDENSE").separator("__"))
            .build()
            .map_err(|error| ContextError::Configuration(error.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|error| ContextError::Configuration(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document, mostly useful in tests
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .map_err(|error| ContextError::Configuration(error.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|error| ContextError::Configuration(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        let percent = self.condensation.auto_condense_percent;
        if !(MIN_CONDENSE_THRESHOLD..=MAX_CONDENSE_THRESHOLD).contains(&percent) {
            return Err(ContextError::Configuration(format!(
                "auto_condense_percent must be between {} and {}, got {}",
                MIN_CONDENSE_THRESHOLD, MAX_CONDENSE_THRESHOLD, percent
            )));
        }
        if self.condenser.max_summary_tokens == 0 {
            return Err(ContextError::Configuration(
                "max_summary_tokens must be at least 1".to_string(),
            ));
        }
        if self.summary_tree.min_messages_for_summary < 2 {
            return Err(ContextError::Configuration(
                "min_messages_for_summary must be at least 2".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.compressor.stopword_ratio) {
            return Err(ContextError::Configuration(format!(
                "stopword_ratio must be within [0, 1], got {}",
                self.compressor.stopword_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.compressor.aggressive_keep_fraction) {
            return Err(ContextError::Configuration(format!(
                "aggressive_keep_fraction must be within [0, 1], got {}",
                self.compressor.aggressive_keep_fraction
            )));
        }
        if self.summarizer.max_retries == 0 {
            return Err(ContextError::Configuration(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.condensation.auto_condense_percent, 75.0);
        assert_eq!(config.token_cache.max_entries, 2000);
        assert_eq!(config.condenser.keep_recent_messages, 3);
    }

    #[test]
    fn test_from_toml_overrides_defaults() {
        let config = Config::from_toml_str(
            r#"
            [condensation]
            auto_condense = false
            auto_condense_percent = 60.0

            [token_cache]
            max_entries = 10
            model_id = "o200k_base"

            [compressor]
            cache_max_entries = 64

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();

        assert!(!config.condensation.auto_condense);
        assert_eq!(config.condensation.auto_condense_percent, 60.0);
        assert_eq!(config.token_cache.max_entries, 10);
        assert_eq!(config.token_cache.model_id, "o200k_base");
        assert_eq!(config.compressor.cache_max_entries, 64);
        assert_eq!(config.compressor.cache_ttl_secs, 300);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_out_of_range_percent_rejected() {
        let result = Config::from_toml_str(
            r#"
            [condensation]
            auto_condense_percent = 200.0
            "#,
        );
        assert!(matches!(result, Err(ContextError::Configuration(_))));
    }

    #[test]
    fn test_bad_compressor_fraction_rejected() {
        let result = Config::from_toml_str(
            r#"
            [compressor]
            stopword_ratio = 1.5
            "#,
        );
        assert!(matches!(result, Err(ContextError::Configuration(_))));
    }
}
