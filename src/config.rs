//! Configuration management for EstateWise
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.estatewise/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ChatError, Result};

/// Complete configuration for the chat pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub completion: CompletionConfig,
    pub search: SearchConfig,
    pub retrieval: RetrievalConfig,
    pub clustering: ClusteringConfig,
    pub router: RouterConfig,
    pub invoker: InvokerConfig,
    pub merger: MergerConfig,
    pub cache: CacheConfig,
    pub weights: WeightsConfig,
}

/// Text-completion service connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout_ms: u64,
}

/// Similarity search service connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
}

/// Retrieval gate and re-ranking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Retrieve when token-overlap drift is below this value
    pub drift_threshold: f64,
    /// Turns considered when measuring drift and prior retrieval
    pub topic_window: usize,
    /// Multiplicative boost per satisfied filter constraint
    pub constraint_boost: f64,
    /// Maximum multiplicative boost from description keyword hits
    pub keyword_boost: f64,
}

/// k-means similar-homes advisor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub k: usize,
    pub max_iterations: usize,
    pub epsilon: f64,
    pub max_hints: usize,
}

/// Expert routing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Weight mass the selected experts must cover
    pub coverage: f64,
    pub max_concurrency: usize,
    /// Multiplier applied to the keyword-hinted role
    pub topic_boost: f64,
    /// Multiplier applied to evidence-driven roles when retrieval is empty
    pub empty_retrieval_damping: f64,
}

/// Expert fan-out budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokerConfig {
    pub expert_timeout_ms: u64,
    pub turn_budget_ms: u64,
}

/// Merge scoring and output policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergerConfig {
    pub max_reply_chars: usize,
    pub max_auxiliary: usize,
    /// Score bonus per evidence token cited by a slice
    pub overlap_bonus: f64,
    /// Extra disallowed-content regexes on top of the built-in set
    pub redaction_patterns: Vec<String>,
    pub fallback_text: String,
}

/// Response cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub op_timeout_ms: u64,
}

/// Per-conversation weight adaptation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    /// Feedback step size
    pub epsilon: f64,
    /// Fraction of the distance to uniform removed per decay
    pub decay_rate: f64,
    /// Real time between lazy decays; zero disables lazy decay
    pub decay_interval_secs: u64,
    pub state_dir: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "qwen2.5:7b-instruct".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8600/search".to_string(),
            timeout_ms: 1_500,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 12,
            drift_threshold: 0.7,
            topic_window: 6,
            constraint_boost: 0.25,
            keyword_boost: 0.1,
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            k: 4,
            max_iterations: 25,
            epsilon: 1e-4,
            max_hints: 3,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            coverage: 0.8,
            max_concurrency: 3,
            topic_boost: 1.5,
            empty_retrieval_damping: 0.5,
        }
    }
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            expert_timeout_ms: 8_000,
            turn_budget_ms: 12_000,
        }
    }
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            max_reply_chars: 2_000,
            max_auxiliary: 3,
            overlap_bonus: 0.25,
            redaction_patterns: Vec::new(),
            fallback_text: "I couldn't put together an answer right now. Please try rephrasing \
                            your question or ask again in a moment."
                .to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 120,
            op_timeout_ms: 200,
        }
    }
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.05,
            decay_rate: 0.1,
            decay_interval_secs: 3_600,
            state_dir: "~/.estatewise/weights".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatError::ConfigError(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ChatError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".estatewise").join("config.toml");
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.completion.base_url.trim().is_empty() {
            return Err(ChatError::ConfigError(
                "completion.base_url is required".to_string(),
            ));
        }

        if self.completion.model.trim().is_empty() {
            return Err(ChatError::ConfigError("completion.model is required".to_string()));
        }

        if self.search.endpoint.trim().is_empty() {
            return Err(ChatError::ConfigError("search.endpoint is required".to_string()));
        }

        if !(8..=20).contains(&self.retrieval.top_k) {
            return Err(ChatError::ConfigError(
                "retrieval.top_k must be between 8 and 20".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.retrieval.drift_threshold) {
            return Err(ChatError::ConfigError(
                "retrieval.drift_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.retrieval.constraint_boost < 0.0 || self.retrieval.keyword_boost < 0.0 {
            return Err(ChatError::ConfigError(
                "retrieval boosts must be non-negative".to_string(),
            ));
        }

        if !(1..=6).contains(&self.clustering.k) || self.clustering.max_iterations == 0 {
            return Err(ChatError::ConfigError(
                "clustering.k must be between 1 and 6 with at least one iteration".to_string(),
            ));
        }

        if self.router.coverage <= 0.0 || self.router.coverage > 1.0 {
            return Err(ChatError::ConfigError(
                "router.coverage must be in (0.0, 1.0]".to_string(),
            ));
        }

        if !(2..=5).contains(&self.router.max_concurrency) {
            return Err(ChatError::ConfigError(
                "router.max_concurrency must be between 2 and 5".to_string(),
            ));
        }

        if self.router.topic_boost < 1.0 || !(0.0..=1.0).contains(&self.router.empty_retrieval_damping) {
            return Err(ChatError::ConfigError(
                "router.topic_boost must be >= 1.0 and empty_retrieval_damping in [0.0, 1.0]"
                    .to_string(),
            ));
        }

        if self.invoker.expert_timeout_ms == 0 || self.invoker.turn_budget_ms == 0 {
            return Err(ChatError::ConfigError(
                "invoker budgets must be greater than 0".to_string(),
            ));
        }

        if self.merger.max_reply_chars == 0 {
            return Err(ChatError::ConfigError(
                "merger.max_reply_chars must be greater than 0".to_string(),
            ));
        }

        for pattern in &self.merger.redaction_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                ChatError::ConfigError(format!("Invalid redaction pattern '{}': {}", pattern, e))
            })?;
        }

        if self.weights.epsilon <= 0.0 || self.weights.epsilon >= 1.0 {
            return Err(ChatError::ConfigError(
                "weights.epsilon must be in (0.0, 1.0)".to_string(),
            ));
        }

        if self.weights.decay_rate <= 0.0 || self.weights.decay_rate > 1.0 {
            return Err(ChatError::ConfigError(
                "weights.decay_rate must be in (0.0, 1.0]".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ChatError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ChatError::ConfigError(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| ChatError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Weight state directory path
    pub fn weights_dir(&self) -> PathBuf {
        Self::expand_path(&self.weights.state_dir)
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl InvokerConfig {
    pub fn expert_timeout(&self) -> Duration {
        Duration::from_millis(self.expert_timeout_ms)
    }

    pub fn turn_budget(&self) -> Duration {
        Duration::from_millis(self.turn_budget_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

impl WeightsConfig {
    /// `None` when lazy decay is disabled
    pub fn decay_interval(&self) -> Option<Duration> {
        if self.decay_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.decay_interval_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.retrieval.top_k, 12);
        assert_eq!(config.router.max_concurrency, 3);
        assert_eq!(config.weights.epsilon, 0.05);
        assert_eq!(config.clustering.max_iterations, 25);
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_missing_endpoint_is_fatal() {
        let mut config = Config::default();
        config.search.endpoint = "  ".to_string();
        assert!(matches!(config.validate(), Err(ChatError::ConfigError(_))));

        let mut config = Config::default();
        config.completion.base_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_top_k_range() {
        let mut config = Config::default();
        config.retrieval.top_k = 4;
        assert!(config.validate().is_err());
        config.retrieval.top_k = 21;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_concurrency() {
        let mut config = Config::default();
        config.router.max_concurrency = 1;
        assert!(config.validate().is_err());
        config.router.max_concurrency = 5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_bad_regex() {
        let mut config = Config::default();
        config.merger.redaction_patterns = vec!["([unclosed".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [router]
            max_concurrency = 4

            [weights]
            epsilon = 0.1
            "#,
        )
        .unwrap();
        assert_eq!(config.router.max_concurrency, 4);
        assert_eq!(config.router.coverage, 0.8);
        assert_eq!(config.weights.epsilon, 0.1);
        assert_eq!(config.retrieval.top_k, 12);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.cache.ttl_secs = 30;
        config.save(&path).unwrap();

        let loaded = Config::load(Some(path)).unwrap();
        assert_eq!(loaded.cache.ttl_secs, 30);
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let expanded = Config::expand_path("/absolute/path");
        assert_eq!(expanded.to_string_lossy(), "/absolute/path");
    }

    #[test]
    fn test_decay_interval_zero_disables() {
        let mut config = Config::default();
        config.weights.decay_interval_secs = 0;
        assert!(config.weights.decay_interval().is_none());
    }
}
