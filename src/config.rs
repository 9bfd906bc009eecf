use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Maximum records per page the feed will serve.
pub const FEED_MAX_PAGE_SIZE: u64 = 2000;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CheckpointConfig {
    #[serde(default = "default_checkpoint_path")]
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: default_checkpoint_path(),
        }
    }
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("./data/last_update.txt")
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub base_url: String,
    /// Records requested per page; capped at the feed's hard maximum.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Environment variable holding the feed credential.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Inter-page sleep when a credential is present.
    #[serde(default = "default_key_delay_ms")]
    pub key_delay_ms: u64,
    /// Inter-page sleep without a credential.
    #[serde(default = "default_public_delay_ms")]
    pub public_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_url(),
            page_size: default_page_size(),
            api_key_env: default_api_key_env(),
            key_delay_ms: default_key_delay_ms(),
            public_delay_ms: default_public_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_feed_url() -> String {
    "https://services.nvd.nist.gov/rest/json/cves/2.0".to_string()
}
fn default_page_size() -> u64 {
    FEED_MAX_PAGE_SIZE
}
fn default_api_key_env() -> String {
    "NVD_API_KEY".to_string()
}
fn default_key_delay_ms() -> u64 {
    600
}
fn default_public_delay_ms() -> u64 {
    6000
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the generation API key (OpenAI only).
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            api_key_env: default_llm_key_env(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate feed
    if config.feed.page_size == 0 || config.feed.page_size > FEED_MAX_PAGE_SIZE {
        anyhow::bail!(
            "feed.page_size must be in 1..={}",
            FEED_MAX_PAGE_SIZE
        );
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    // Validate llm
    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("cverag.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    const MINIMAL: &str = r#"
[db]
path = "./data/cverag.sqlite"

[server]
bind = "127.0.0.1:5001"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = load_config(&write_config(&tmp, MINIMAL)).unwrap();

        assert_eq!(cfg.feed.page_size, FEED_MAX_PAGE_SIZE);
        assert_eq!(cfg.feed.key_delay_ms, 600);
        assert_eq!(cfg.feed.public_delay_ms, 6000);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert!(!cfg.embedding.is_enabled());
        assert!(!cfg.llm.is_enabled());
    }

    #[test]
    fn test_page_size_over_cap_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let body = format!("{}\n[feed]\npage_size = 5000\n", MINIMAL);
        assert!(load_config(&write_config(&tmp, &body)).is_err());
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let tmp = tempfile::TempDir::new().unwrap();
        let body = format!("{}\n[embedding]\nprovider = \"ollama\"\n", MINIMAL);
        assert!(load_config(&write_config(&tmp, &body)).is_err());
    }

    #[test]
    fn test_unknown_llm_provider_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let body = format!(
            "{}\n[llm]\nprovider = \"bard\"\nmodel = \"x\"\n",
            MINIMAL
        );
        assert!(load_config(&write_config(&tmp, &body)).is_err());
    }
}
