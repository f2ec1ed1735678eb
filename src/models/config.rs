use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::search::OutputFormat;
use crate::error::ConfigError;
use crate::utils::RetryConfig;

pub const DEFAULT_VECTORIZER_HOST: &str = "http://localhost";
pub const DEFAULT_VECTORIZER_PORT: u16 = 8080;
pub const DEFAULT_COLLECTION: &str = "documents";
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_WORKER_THREADS: usize = 10;
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub retry: RetrySettings,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ragstore").join("config.toml"))
    }

    /// Load the config file (if any), then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup("VECTORIZER_HOST") {
            self.embedding.host = host;
        }
        if let Some(port) = lookup("VECTORIZER_PORT") {
            self.embedding.port = parse_env("VECTORIZER_PORT", &port)?;
        }
        if let Some(top_k) = lookup("RAG_TOP_K") {
            self.search.top_k = parse_env("RAG_TOP_K", &top_k)?;
        }
        if let Some(path) = lookup("RAGSTORE_DB_PATH") {
            self.vector_store.path = PathBuf::from(path);
        }
        if let Some(threads) = lookup("RAGSTORE_WORKER_THREADS") {
            self.vector_store.worker_threads = parse_env("RAGSTORE_WORKER_THREADS", &threads)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("embedding.batch_size", self.embedding.batch_size),
            ("embedding.concurrency", self.embedding.concurrency),
            ("vector_store.parallelism", self.vector_store.parallelism),
            ("vector_store.worker_threads", self.vector_store.worker_threads),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be at least 1"
                )));
            }
        }
        if self.retry.min_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "retry.min_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("invalid value for {key}: {value}")))
}

/// How sub-batch requests are scheduled against the embedding server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Fixed windows: every request of window k completes before window k+1 starts.
    #[default]
    Windowed,
    /// Ordered sliding window: a new request starts as soon as one finishes.
    Pipelined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_vectorizer_host")]
    pub host: String,

    #[serde(default = "default_vectorizer_port")]
    pub port: u16,

    /// Texts per HTTP request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Requests in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub dispatch: DispatchMode,

    #[serde(default)]
    pub normalize: bool,

    #[serde(default)]
    pub truncate: bool,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl EmbeddingConfig {
    pub fn base_url(&self) -> String {
        format!("{}:{}", self.host.trim_end_matches('/'), self.port)
    }
}

fn default_vectorizer_host() -> String {
    DEFAULT_VECTORIZER_HOST.to_string()
}

fn default_vectorizer_port() -> u16 {
    DEFAULT_VECTORIZER_PORT
}

fn default_batch_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_timeout() -> u64 {
    120
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            host: default_vectorizer_host(),
            port: default_vectorizer_port(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            dispatch: DispatchMode::default(),
            normalize: false,
            truncate: false,
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// SQLite database file. `:memory:` keeps everything in process.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Documents per storage upsert.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Blocking storage calls allowed to run at once.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("ragstore").join("store.db"))
        .unwrap_or_else(|| PathBuf::from("ragstore.db"))
}

fn default_parallelism() -> usize {
    1000
}

fn default_worker_threads() -> usize {
    DEFAULT_WORKER_THREADS
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            parallelism: default_parallelism(),
            worker_threads: default_worker_threads(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_collection")]
    pub default_collection: String,

    #[serde(default)]
    pub default_format: OutputFormat,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            default_collection: default_collection(),
            default_format: OutputFormat::Text,
        }
    }
}

/// Retry knobs as they appear in the config file. `max_attempts = 0` means
/// retry forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_elapsed_secs: Option<u64>,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_min_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_elapsed_secs: None,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
            min_delay: Duration::from_millis(self.min_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            max_elapsed: self.max_elapsed_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.embedding.base_url(), "http://localhost:8080");
        assert_eq!(config.embedding.concurrency, 4);
        assert_eq!(config.vector_store.worker_threads, 10);
        assert_eq!(config.search.top_k, DEFAULT_TOP_K);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.is_some());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [embedding]
            port = 9000
            dispatch = "pipelined"
            "#,
        )
        .unwrap();
        assert_eq!(config.embedding.port, 9000);
        assert_eq!(config.embedding.dispatch, DispatchMode::Pipelined);
        assert_eq!(config.embedding.batch_size, 100);
        assert_eq!(config.vector_store.parallelism, 1000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("VECTORIZER_HOST", "http://embedder"),
            ("VECTORIZER_PORT", "7997"),
            ("RAG_TOP_K", "3"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.embedding.base_url(), "http://embedder:7997");
        assert_eq!(config.search.top_k, 3);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = Config::default();
        let err = config
            .apply_env(|key| (key == "VECTORIZER_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("VECTORIZER_PORT"));
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut config = Config::default();
        config.embedding.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_settings_zero_means_unbounded() {
        let settings = RetrySettings {
            max_attempts: 0,
            ..Default::default()
        };
        let retry = settings.to_retry_config();
        assert_eq!(retry.max_attempts, None);
        assert_eq!(retry.min_delay, Duration::from_millis(500));
        assert_eq!(retry.max_delay, Duration::from_secs(5));
    }
}
