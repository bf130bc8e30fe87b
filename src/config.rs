//! TOML configuration for the Docent service.
//!
//! Every section except `[db]` is optional. API keys may be written into the
//! `[apis]` section, but are normally supplied through environment variables;
//! an empty or absent value in the file falls back to the environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub papers: PapersConfig,
    #[serde(default)]
    pub apis: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_daily_cap")]
    pub daily_cap: i64,
    #[serde(default = "default_annual_cap")]
    pub annual_cap: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            daily_cap: default_daily_cap(),
            annual_cap: default_annual_cap(),
        }
    }
}

fn default_daily_cap() -> i64 {
    10
}
fn default_annual_cap() -> i64 {
    3650
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_daily_limit")]
    pub daily_limit: i64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_chat_timeout")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            history_limit: default_history_limit(),
            anthropic_model: default_anthropic_model(),
            openai_model: default_openai_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_chat_timeout(),
        }
    }
}

fn default_daily_limit() -> i64 {
    10
}
fn default_history_limit() -> usize {
    20
}
fn default_anthropic_model() -> String {
    "claude-3-haiku-20240307".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_chat_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
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
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Literature retrieval and feeding parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct PapersConfig {
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_cache_threshold")]
    pub cache_threshold: f32,
    #[serde(default = "default_min_citations")]
    pub min_citations: i64,
    #[serde(default = "default_max_papers")]
    pub max_papers: usize,
    #[serde(default = "default_pubmed_retmax")]
    pub pubmed_retmax: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_feed_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for PapersConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            top_k: default_top_k(),
            cache_threshold: default_cache_threshold(),
            min_citations: default_min_citations(),
            max_papers: default_max_papers(),
            pubmed_retmax: default_pubmed_retmax(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_retries: default_feed_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

fn default_match_threshold() -> f32 {
    0.5
}
fn default_top_k() -> usize {
    5
}
fn default_cache_threshold() -> f32 {
    0.6
}
fn default_min_citations() -> i64 {
    3
}
fn default_max_papers() -> usize {
    10
}
fn default_pubmed_retmax() -> usize {
    30
}
fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    80
}
fn default_feed_retries() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    1000
}

/// Base URLs and credentials for the external services.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_usda_base")]
    pub usda_base_url: String,
    #[serde(default = "default_mfds_base")]
    pub mfds_base_url: String,
    #[serde(default = "default_pubmed_base")]
    pub pubmed_base_url: String,
    #[serde(default = "default_scholar_base")]
    pub semantic_scholar_base_url: String,
    #[serde(default = "default_anthropic_base")]
    pub anthropic_base_url: String,
    #[serde(default = "default_openai_base")]
    pub openai_base_url: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub usda_api_key: Option<String>,
    #[serde(default)]
    pub mfds_api_key: Option<String>,
    #[serde(default)]
    pub pubmed_api_key: Option<String>,
    #[serde(default)]
    pub semantic_scholar_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            usda_base_url: default_usda_base(),
            mfds_base_url: default_mfds_base(),
            pubmed_base_url: default_pubmed_base(),
            semantic_scholar_base_url: default_scholar_base(),
            anthropic_base_url: default_anthropic_base(),
            openai_base_url: default_openai_base(),
            timeout_secs: default_http_timeout(),
            usda_api_key: None,
            mfds_api_key: None,
            pubmed_api_key: None,
            semantic_scholar_api_key: None,
            anthropic_api_key: None,
            openai_api_key: None,
        }
    }
}

fn default_usda_base() -> String {
    "https://api.nal.usda.gov/fdc/v1".to_string()
}
fn default_mfds_base() -> String {
    "https://apis.data.go.kr/1471000".to_string()
}
fn default_pubmed_base() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string()
}
fn default_scholar_base() -> String {
    "https://api.semanticscholar.org/graph/v1".to_string()
}
fn default_anthropic_base() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_openai_base() -> String {
    "https://api.openai.com".to_string()
}
fn default_http_timeout() -> u64 {
    20
}

/// Resolve a credential: a non-empty file value wins, otherwise the
/// environment variable is consulted.
fn resolve_key(configured: &Option<String>, env_var: &str) -> Option<String> {
    configured
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var(env_var)
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
        })
}

impl ApiConfig {
    pub fn usda_key(&self) -> Option<String> {
        resolve_key(&self.usda_api_key, "USDA_API_KEY")
    }

    pub fn mfds_key(&self) -> Option<String> {
        resolve_key(&self.mfds_api_key, "MFDS_API_KEY")
    }

    pub fn pubmed_key(&self) -> Option<String> {
        resolve_key(&self.pubmed_api_key, "PUBMED_API_KEY")
    }

    pub fn semantic_scholar_key(&self) -> Option<String> {
        resolve_key(&self.semantic_scholar_api_key, "SEMANTIC_SCHOLAR_API_KEY")
    }

    pub fn anthropic_key(&self) -> Option<String> {
        resolve_key(&self.anthropic_api_key, "ANTHROPIC_API_KEY")
    }

    pub fn openai_key(&self) -> Option<String> {
        resolve_key(&self.openai_api_key, "OPENAI_API_KEY")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Checks cross-field constraints that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if config.scoring.daily_cap <= 0 {
        anyhow::bail!("scoring.daily_cap must be > 0");
    }
    if config.scoring.annual_cap < config.scoring.daily_cap {
        anyhow::bail!("scoring.annual_cap must be >= scoring.daily_cap");
    }

    if config.chat.daily_limit <= 0 {
        anyhow::bail!("chat.daily_limit must be > 0");
    }

    if config.papers.chunk_size == 0 {
        anyhow::bail!("papers.chunk_size must be > 0");
    }
    if config.papers.chunk_overlap >= config.papers.chunk_size {
        anyhow::bail!("papers.chunk_overlap must be smaller than papers.chunk_size");
    }
    if !(0.0..=1.0).contains(&config.papers.match_threshold) {
        anyhow::bail!("papers.match_threshold must be in [0.0, 1.0]");
    }
    if config.papers.top_k == 0 {
        anyhow::bail!("papers.top_k must be >= 1");
    }

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
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let text = format!("[db]\npath = \"/tmp/docent.sqlite\"\n{}", extra);
        let config: Config = toml::from_str(&text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8787");
        assert_eq!(config.scoring.daily_cap, 10);
        assert_eq!(config.scoring.annual_cap, 3650);
        assert_eq!(config.chat.daily_limit, 10);
        assert_eq!(config.chat.history_limit, 20);
        assert_eq!(config.papers.top_k, 5);
        assert_eq!(config.papers.chunk_size, 500);
        assert_eq!(config.papers.chunk_overlap, 80);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let err = parse("[papers]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let err = parse("[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let ok = parse(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse("[embedding]\nprovider = \"magic\"\nmodel = \"m\"\ndims = 3\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_file_key_wins_over_env() {
        let config = parse("[apis]\nusda_api_key = \"from-file\"\n").unwrap();
        assert_eq!(config.apis.usda_key().as_deref(), Some("from-file"));
    }

    #[test]
    fn test_blank_file_key_is_ignored() {
        let key = resolve_key(&Some("   ".to_string()), "DOCENT_TEST_UNSET_VARIABLE");
        assert!(key.is_none());
    }
}
