use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub graphreader: GraphReaderConfig,
    pub embeddings: EmbeddingsConfig,
    pub chat: ChatConfig,
    #[serde(default)]
    pub traversal: TraversalConfig,
}

/// GraphReader-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GraphReaderConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Embeddings configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub batch_size: usize,
    pub dimensions: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_cache_capacity() -> usize {
    1000
}

/// Chat-completion model used as the decision oracle
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub model: String,
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    420
}

fn default_max_retries() -> usize {
    3
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Traversal tuning
#[derive(Debug, Clone, Deserialize)]
pub struct TraversalConfig {
    /// Candidates fetched by similarity search (seed and escalation).
    #[serde(default = "default_similar_nodes_k")]
    pub similar_nodes_k: usize,
    /// Key elements seeded into the first fact check.
    #[serde(default = "default_initial_nodes")]
    pub initial_nodes: usize,
    /// Minimum number of scored candidates requested from the oracle.
    #[serde(default = "default_min_seed_candidates")]
    pub min_seed_candidates: usize,
    /// Upper bound on neighbors offered after a fact check.
    #[serde(default = "default_neighbor_limit")]
    pub neighbor_limit: usize,
    /// Stage executions before the engine forces answer reasoning. 0 = unlimited.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            similar_nodes_k: default_similar_nodes_k(),
            initial_nodes: default_initial_nodes(),
            min_seed_candidates: default_min_seed_candidates(),
            neighbor_limit: default_neighbor_limit(),
            max_steps: default_max_steps(),
        }
    }
}

fn default_similar_nodes_k() -> usize {
    50
}

fn default_initial_nodes() -> usize {
    5
}

fn default_min_seed_candidates() -> usize {
    10
}

fn default_neighbor_limit() -> usize {
    50
}

fn default_max_steps() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in GRAPHREADER_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("GRAPHREADER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&config_str)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration text without touching the environment.
    pub fn from_toml(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).context("Failed to parse config.toml")
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        for key_env in [&self.embeddings.api_key_env, &self.chat.api_key_env] {
            std::env::var(key_env).with_context(|| {
                format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable with your API key.",
                    key_env
                )
            })?;
        }

        if self.embeddings.provider != "openai" {
            anyhow::bail!(
                "embeddings.provider {:?} is not supported; only \"openai\" (any OpenAI-compatible endpoint) is",
                self.embeddings.provider
            );
        }

        if self.embeddings.batch_size == 0 {
            anyhow::bail!("embeddings.batch_size must be greater than 0");
        }

        if self.embeddings.dimensions == 0 {
            anyhow::bail!("embeddings.dimensions must be greater than 0");
        }

        if !(0.0..=2.0).contains(&self.chat.temperature) {
            anyhow::bail!("chat.temperature must be between 0.0 and 2.0");
        }

        if self.traversal.similar_nodes_k == 0 {
            anyhow::bail!("traversal.similar_nodes_k must be greater than 0");
        }

        if self.traversal.initial_nodes == 0 {
            anyhow::bail!("traversal.initial_nodes must be greater than 0");
        }

        if self.traversal.neighbor_limit == 0 {
            anyhow::bail!("traversal.neighbor_limit must be greater than 0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.graphreader.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide cwd and env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const TEST_CONFIG: &str = r#"
[graphreader]
db_path = "./test.db"
log_level = "debug"

[embeddings]
provider = "openai"
model = "text-embedding-3-small"
api_key_env = "OPENAI_API_KEY"
batch_size = 100
dimensions = 1536

[chat]
model = "gpt-4o"
api_key_env = "OPENAI_API_KEY"

[traversal]
max_steps = 20
"#;

    /// Restores cwd when dropped (e.g. on panic).
    struct CwdGuard(std::path::PathBuf);
    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.0);
        }
    }

    fn with_config_env(config_path: &std::path::Path, api_key: Option<&str>, f: impl FnOnce()) {
        let original_config = std::env::var("GRAPHREADER_CONFIG").ok();
        let original_key = std::env::var("OPENAI_API_KEY").ok();
        std::env::set_var("GRAPHREADER_CONFIG", config_path.to_str().unwrap());
        match api_key {
            Some(k) => std::env::set_var("OPENAI_API_KEY", k),
            None => std::env::remove_var("OPENAI_API_KEY"),
        }
        f();
        std::env::remove_var("GRAPHREADER_CONFIG");
        std::env::remove_var("OPENAI_API_KEY");
        if let Some(val) = original_config {
            std::env::set_var("GRAPHREADER_CONFIG", val);
        }
        if let Some(val) = original_key {
            std::env::set_var("OPENAI_API_KEY", val);
        }
    }

    fn write_config(temp_dir: &TempDir, content: &str) -> std::path::PathBuf {
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, content).unwrap();
        config_path.canonicalize().unwrap()
    }

    #[test]
    fn test_config_load_success() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_config(&temp_dir, TEST_CONFIG);
        let _cwd = CwdGuard(std::env::current_dir().unwrap());
        std::env::set_current_dir(temp_dir.path()).unwrap();
        with_config_env(&config_path, Some("test-key"), || {
            let config = Config::load();
            assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.graphreader.log_level, "debug");
            assert_eq!(config.embeddings.batch_size, 100);
            assert_eq!(config.chat.model, "gpt-4o");
            assert_eq!(config.traversal.max_steps, 20);
        });
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_toml(TEST_CONFIG).unwrap();
        assert_eq!(config.embeddings.cache_capacity, 1000);
        assert_eq!(config.chat.max_tokens, 4096);
        assert_eq!(config.chat.timeout_secs, 420);
        assert!((config.chat.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.chat.base_url, "https://api.openai.com/v1");
        assert_eq!(config.traversal.similar_nodes_k, 50);
        assert_eq!(config.traversal.initial_nodes, 5);
        assert_eq!(config.traversal.min_seed_candidates, 10);
        assert_eq!(config.traversal.neighbor_limit, 50);
    }

    #[test]
    fn test_config_traversal_table_optional() {
        let without_traversal = TEST_CONFIG.replace("[traversal]\nmax_steps = 20\n", "");
        let config = Config::from_toml(&without_traversal).unwrap();
        assert_eq!(config.traversal.max_steps, 64);
    }

    #[test]
    fn test_config_missing_api_key() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_config(&temp_dir, TEST_CONFIG);
        let _cwd = CwdGuard(std::env::current_dir().unwrap());
        std::env::set_current_dir(temp_dir.path()).unwrap();
        with_config_env(&config_path, None, || {
            let config = Config::load();
            assert!(config.is_err(), "Expected missing API key error");
            assert!(config.unwrap_err().to_string().contains("OPENAI_API_KEY"));
        });
    }

    #[test]
    fn test_config_loads_from_env_file() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_config(&temp_dir, TEST_CONFIG);
        fs::write(
            temp_dir.path().join(".env"),
            "OPENAI_API_KEY=test-key-from-env-file\n",
        )
        .unwrap();
        let _cwd = CwdGuard(std::env::current_dir().unwrap());
        std::env::set_current_dir(temp_dir.path()).unwrap();
        with_config_env(&config_path, None, || {
            let config = Config::load();
            assert!(config.is_ok(), "Config should load with API key from .env file");
        });
    }

    #[test]
    fn test_config_rejects_zero_initial_nodes() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let content = TEST_CONFIG.replace("max_steps = 20", "max_steps = 20\ninitial_nodes = 0");
        let config_path = write_config(&temp_dir, &content);
        let _cwd = CwdGuard(std::env::current_dir().unwrap());
        std::env::set_current_dir(temp_dir.path()).unwrap();
        with_config_env(&config_path, Some("test-key"), || {
            let err = Config::load().unwrap_err();
            assert!(err.to_string().contains("initial_nodes"));
        });
    }

    #[test]
    fn test_config_rejects_unknown_provider() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let content = TEST_CONFIG.replace(r#"provider = "openai""#, r#"provider = "ollama""#);
        let config_path = write_config(&temp_dir, &content);
        let _cwd = CwdGuard(std::env::current_dir().unwrap());
        std::env::set_current_dir(temp_dir.path()).unwrap();
        with_config_env(&config_path, Some("test-key"), || {
            let err = Config::load().unwrap_err();
            assert!(err.to_string().contains("embeddings.provider"));
        });
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("GRAPHREADER_CONFIG").ok();
        std::env::set_var("GRAPHREADER_CONFIG", "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var("GRAPHREADER_CONFIG");
        if let Some(v) = original {
            std::env::set_var("GRAPHREADER_CONFIG", v);
        }
    }
}
