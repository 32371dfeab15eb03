use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for sonority.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (SONORITY_* prefix)
/// 3. Config file (~/.config/sonority/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URI of the Milvus (or Zilliz Cloud) REST endpoint.
    ///
    /// Can be set via:
    /// - CLI: --milvus-uri https://...
    /// - ENV: SONORITY_MILVUS_URI
    /// - Config: milvus_uri = "https://..."
    #[serde(default = "default_milvus_uri")]
    pub milvus_uri: String,

    /// Bearer token for the index service.
    ///
    /// Can be set via:
    /// - ENV: SONORITY_MILVUS_API_KEY
    /// - Config: milvus_api_key = "..."
    #[serde(default)]
    pub milvus_api_key: Option<String>,

    /// Collection holding the full embedding vectors.
    #[serde(default = "default_full_collection")]
    pub full_collection: String,

    /// Collection holding the per-window genre activations.
    #[serde(default = "default_activation_collection")]
    pub activation_collection: String,

    /// Dimensionality of the full embedding vectors.
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// IVF clusters probed per search. Higher improves recall and costs
    /// latency.
    #[serde(default = "default_nprobe")]
    pub nprobe: u32,

    /// Candidates fetched before diversity re-ranking. Must exceed
    /// `rerank_target`.
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: usize,

    /// Hits returned by the full-entity similarity lookups.
    #[serde(default = "default_full_result_count")]
    pub full_result_count: usize,

    /// Entities returned by the diverse short lookup.
    #[serde(default = "default_rerank_target")]
    pub rerank_target: usize,

    /// Classes kept in a genre summary.
    #[serde(default = "default_genre_top_k")]
    pub genre_top_k: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Retries after the first failed attempt of an index call.
    #[serde(default = "default_retry_max_times")]
    pub retry_max_times: usize,

    #[serde(default = "default_retry_min_delay_ms")]
    pub retry_min_delay_ms: u64,

    /// Interval between keep-alive pings.
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,

    /// Genre model metadata with the ordered `classes` list.
    ///
    /// Can be set via:
    /// - CLI: --taxonomy /path/to/mtg_jamendo_genre.json
    /// - ENV: SONORITY_TAXONOMY_PATH
    /// - Default: ~/.config/sonority/mtg_jamendo_genre.json
    #[serde(default = "default_taxonomy_path")]
    pub taxonomy_path: PathBuf,

    /// SQLite catalog used to resolve file paths to ids.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            milvus_uri: default_milvus_uri(),
            milvus_api_key: None,
            full_collection: default_full_collection(),
            activation_collection: default_activation_collection(),
            embedding_dim: default_embedding_dim(),
            nprobe: default_nprobe(),
            candidate_pool: default_candidate_pool(),
            full_result_count: default_full_result_count(),
            rerank_target: default_rerank_target(),
            genre_top_k: default_genre_top_k(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            retry_max_times: default_retry_max_times(),
            retry_min_delay_ms: default_retry_min_delay_ms(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            taxonomy_path: default_taxonomy_path(),
            catalog_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/sonority/config.toml
    /// Reads environment variables with SONORITY_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("sonority");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;

        Ok(config)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub const fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}

fn default_milvus_uri() -> String {
    "http://localhost:19530".to_string()
}

fn default_full_collection() -> String {
    "embeddings_512".to_string()
}

fn default_activation_collection() -> String {
    "predictions_87".to_string()
}

const fn default_embedding_dim() -> usize {
    512
}

const fn default_nprobe() -> u32 {
    16
}

const fn default_candidate_pool() -> usize {
    27
}

const fn default_full_result_count() -> usize {
    3
}

const fn default_rerank_target() -> usize {
    crate::rerank::DEFAULT_TARGET
}

const fn default_genre_top_k() -> usize {
    crate::genre::DEFAULT_TOP_K
}

const fn default_request_timeout_secs() -> u64 {
    10
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

const fn default_retry_max_times() -> usize {
    3
}

const fn default_retry_min_delay_ms() -> u64 {
    200
}

const fn default_keepalive_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_taxonomy_path() -> PathBuf {
    config_dir().join("mtg_jamendo_genre.json")
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sonority")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/sonority/config.toml
/// - macOS: ~/Library/Application Support/sonority/config.toml
/// - Windows: %APPDATA%\sonority\config.toml
#[must_use]
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the example config file content.
#[must_use]
pub fn example_config() -> &'static str {
    r#"# Sonority Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (SONORITY_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Milvus / Zilliz Cloud REST endpoint
#
# Can also be set via:
# - CLI: sonority --milvus-uri https://... ping
# - Environment: SONORITY_MILVUS_URI=https://...
milvus_uri = "http://localhost:19530"

# API key (bearer token) for the index service
#
# Can also be set via:
# - Environment: SONORITY_MILVUS_API_KEY=your-key-here
#milvus_api_key = "your-api-key-here"

# Collections
full_collection = "embeddings_512"
activation_collection = "predictions_87"
embedding_dim = 512

# Search tuning
#
# nprobe: clusters probed per search; raise for recall, lower for latency
# candidate_pool: hits fetched before artist-diversity re-ranking; must be
#                 larger than rerank_target
nprobe = 16
candidate_pool = 27
full_result_count = 3
rerank_target = 9
genre_top_k = 5

# Network
request_timeout_secs = 10
connect_timeout_secs = 5
retry_max_times = 3
retry_min_delay_ms = 200

# Ping the index once a day so a serverless instance does not suspend
keepalive_interval_secs = 86400

# Genre model metadata (JSON with a "classes" array)
#taxonomy_path = "/path/to/mtg_jamendo_genre.json"

# SQLite catalog used by `sonority similar-catalog`
#catalog_path = "/path/to/music.db"
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}
