use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use cast_memory::{Pacing, DEFAULT_REACTION_LIMIT, DEFAULT_TARGET_LIMIT, PAGE_CAP};

/// Env var consulted when `neynar.api_key` is absent from the file.
pub const NEYNAR_API_KEY_ENV: &str = "NEYNAR_API_KEY";
/// Env var consulted when `embedding.api_key` is absent from the file.
pub const EMBEDDING_API_KEY_ENV: &str = "EMBEDDING_API_KEY";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub neynar: NeynarConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub reactions: ReactionsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NeynarConfig {
    #[serde(default = "default_neynar_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    /// User whose casts become long-term memory.
    pub target_fid: u64,
    /// Pipeline owner whose likes become short-term memory. Defaults to `target_fid`.
    pub viewer_fid: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_target_limit")]
    pub target_limit: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_true")]
    pub include_replies: bool,
    #[serde(default = "default_inter_request_delay_ms")]
    pub inter_request_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReactionsConfig {
    #[serde(default = "default_reaction_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    Hashing,
    Http,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_embedding_url")]
    pub api_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemoryConfig {
    /// SQLite file holding both tiers. In-memory when unset.
    pub db_path: Option<String>,
    /// Empty each tier before rebuilding it on every run.
    #[serde(default = "default_true")]
    pub reset_tiers: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalyticsConfig {
    #[serde(default = "default_analytics_path")]
    pub db_path: String,
    #[serde(default = "default_metric")]
    pub metric: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            target_limit: default_target_limit(),
            page_size: default_page_size(),
            include_replies: true,
            inter_request_delay_ms: default_inter_request_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for ReactionsConfig {
    fn default() -> Self {
        Self {
            limit: default_reaction_limit(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            dimensions: default_dimensions(),
            api_url: default_embedding_url(),
            api_key: None,
            model: default_embedding_model(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            reset_tiers: true,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            db_path: default_analytics_path(),
            metric: default_metric(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_neynar_url() -> String {
    "https://api.neynar.com/v2".to_string()
}

fn default_target_limit() -> usize {
    DEFAULT_TARGET_LIMIT
}

fn default_page_size() -> usize {
    PAGE_CAP
}

fn default_true() -> bool {
    true
}

fn default_inter_request_delay_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    1
}

fn default_reaction_limit() -> usize {
    DEFAULT_REACTION_LIMIT
}

fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::Hashing
}

fn default_dimensions() -> usize {
    cast_memory::embedding::DEFAULT_HASHING_DIMENSIONS
}

fn default_embedding_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_concurrency() -> usize {
    cast_memory::tier::DEFAULT_EMBED_CONCURRENCY
}

fn default_analytics_path() -> String {
    "castmind-analytics.db".to_string()
}

fn default_metric() -> String {
    "centroid_cosine".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(path);
        let content = fs::read_to_string(expanded_path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::from_toml(&content)
    }

    /// Parse a config and fill API keys from the environment where the file has none.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).with_context(|| "Failed to parse TOML config")?;

        if config.neynar.api_key.is_none() {
            if let Ok(key) = std::env::var(NEYNAR_API_KEY_ENV) {
                config.neynar.api_key = Some(key);
            }
        }
        if config.embedding.api_key.is_none() {
            if let Ok(key) = std::env::var(EMBEDDING_API_KEY_ENV) {
                config.embedding.api_key = Some(key);
            }
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.neynar.base_url.starts_with("http://") && !self.neynar.base_url.starts_with("https://") {
            anyhow::bail!("Neynar base URL must start with http:// or https://");
        }

        if self.feed.target_limit == 0 {
            anyhow::bail!("feed.target_limit must be at least 1");
        }

        if self.feed.page_size == 0 || self.feed.page_size > PAGE_CAP {
            anyhow::bail!("feed.page_size must be between 1 and {PAGE_CAP}");
        }

        if self.feed.max_attempts == 0 {
            anyhow::bail!("feed.max_attempts must be at least 1");
        }

        if self.reactions.limit == 0 {
            anyhow::bail!("reactions.limit must be at least 1");
        }

        if self.embedding.provider == EmbeddingProvider::Http {
            if !self.embedding.api_url.starts_with("http://") && !self.embedding.api_url.starts_with("https://") {
                anyhow::bail!("Embedding API URL must start with http:// or https://");
            }
            if self.embedding.api_key.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("Embedding API key missing: set embedding.api_key or {EMBEDDING_API_KEY_ENV}");
            }
        }

        if self.embedding.dimensions == 0 {
            anyhow::bail!("embedding.dimensions must be at least 1");
        }

        if cast_memory::metric_by_name(&self.analytics.metric).is_none() {
            anyhow::bail!("Unknown similarity metric: {}", self.analytics.metric);
        }

        Ok(())
    }

    pub fn expand_paths(&mut self) -> Result<()> {
        self.analytics.db_path = shellexpand::tilde(&self.analytics.db_path).to_string();

        if let Some(path) = &self.memory.db_path {
            self.memory.db_path = Some(shellexpand::tilde(path).to_string());
        }

        Ok(())
    }

    /// The Neynar key, required only by commands that call the API.
    pub fn neynar_api_key(&self) -> Result<&str> {
        match self.neynar.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => anyhow::bail!("Neynar API key missing: set neynar.api_key or {NEYNAR_API_KEY_ENV}"),
        }
    }

    pub fn viewer_fid(&self) -> u64 {
        self.neynar.viewer_fid.unwrap_or(self.neynar.target_fid)
    }

    pub fn pacing(&self) -> Pacing {
        Pacing::fixed(Duration::from_millis(self.feed.inter_request_delay_ms))
            .with_max_attempts(self.feed.max_attempts)
    }
}
