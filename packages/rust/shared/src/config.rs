//! Application configuration for ingestkit.
//!
//! User config lives at `~/.ingestkit/ingestkit.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ingestkit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ingestkit";

// ---------------------------------------------------------------------------
// Config structs (matching ingestkit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fetch/pipeline defaults.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Crawl frontier limits.
    #[serde(default)]
    pub crawl: CrawlLimitsConfig,

    /// Chunking and tagging.
    #[serde(default)]
    pub chunking: ChunkConfig,

    /// PDF heading detection.
    #[serde(default)]
    pub pdf: PdfConfig,

    /// LLM author-extraction settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Webhook delivery policy.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum concurrent in-flight items per batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-request fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Overall per-item timeout in seconds (fetch + extract + LLM).
    #[serde(default = "default_item_timeout")]
    pub item_timeout_secs: u64,

    /// Maximum accepted payload size in bytes.
    #[serde(default = "default_max_fetch_bytes")]
    pub max_fetch_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            fetch_timeout_secs: default_fetch_timeout(),
            item_timeout_secs: default_item_timeout(),
            max_fetch_bytes: default_max_fetch_bytes(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_fetch_timeout() -> u64 {
    15
}
fn default_item_timeout() -> u64 {
    60
}
fn default_max_fetch_bytes() -> usize {
    8 * 1024 * 1024
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlLimitsConfig {
    /// Hard ceiling on caller-requested crawl depth.
    #[serde(default = "default_depth_ceiling")]
    pub depth_ceiling: u32,
}

impl Default for CrawlLimitsConfig {
    fn default() -> Self {
        Self {
            depth_ceiling: default_depth_ceiling(),
        }
    }
}

fn default_depth_ceiling() -> u32 {
    3
}

/// `[chunking]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Max characters per chunk in the paragraph-grouping fallback.
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Trailing chunks below this size merge into their predecessor.
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,

    /// Number of tags retained per chunk.
    #[serde(default = "default_top_k_tags")]
    pub top_k_tags: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            min_chunk_chars: default_min_chunk_chars(),
            top_k_tags: default_top_k_tags(),
        }
    }
}

fn default_max_chunk_chars() -> usize {
    2800
}
fn default_min_chunk_chars() -> usize {
    300
}
fn default_top_k_tags() -> usize {
    5
}

/// `[pdf]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    /// A run is a heading when its font size ≥ body mode × this ratio.
    #[serde(default = "default_heading_ratio")]
    pub heading_ratio: f64,

    /// All-caps runs up to this many words also count as headings.
    #[serde(default = "default_caps_word_ceiling")]
    pub caps_word_ceiling: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            heading_ratio: default_heading_ratio(),
            caps_word_ceiling: default_caps_word_ceiling(),
        }
    }
}

fn default_heading_ratio() -> f64 {
    1.2
}
fn default_caps_word_ceiling() -> usize {
    8
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Chat-completions endpoint (OpenAI-compatible).
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Model used for author extraction.
    #[serde(default = "default_llm_model")]
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}

/// `[webhook]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Delivery attempts before the result is abandoned.
    #[serde(default = "default_webhook_retries")]
    pub max_retries: u32,

    /// Initial backoff in ms; doubles per attempt.
    #[serde(default = "default_webhook_backoff")]
    pub backoff_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_retries: default_webhook_retries(),
            backoff_ms: default_webhook_backoff(),
        }
    }
}

fn default_webhook_retries() -> u32 {
    3
}
fn default_webhook_backoff() -> u64 {
    500
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ingestkit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| IngestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ingestkit/ingestkit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| IngestError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| IngestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| IngestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| IngestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the LLM API key from the configured env var, if present and non-empty.
pub fn llm_api_key(config: &AppConfig) -> Option<String> {
    std::env::var(&config.llm.api_key_env)
        .ok()
        .filter(|v| !v.is_empty())
}
