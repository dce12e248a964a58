use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::error::Error;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub wikipedia: WikipediaConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Candidates fetched by vector similarity.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Passages kept after reranking.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            top_n: default_top_n(),
        }
    }
}

fn default_top_k() -> usize {
    6
}
fn default_top_n() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
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
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
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

#[derive(Debug, Deserialize, Clone)]
pub struct RerankConfig {
    #[serde(default = "default_rerank_provider")]
    pub provider: String,
    /// Defaults per provider: `rerank-english-v3.0` (cohere), `bge-reranker-base` (local).
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_cohere_url")]
    pub base_url: String,
    #[serde(default = "default_cohere_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Rerank calls cost quota, so retries are off unless set here.
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: default_rerank_provider(),
            model: None,
            base_url: default_cohere_url(),
            api_key_env: default_cohere_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_rerank_provider() -> String {
    "cohere".to_string()
}
fn default_cohere_url() -> String {
    "https://api.cohere.com".to_string()
}
fn default_cohere_key_env() -> String {
    "COHERE_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// OpenAI-compatible API root; `/chat/completions` is appended.
    #[serde(default = "default_generation_url")]
    pub base_url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_groq_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_url(),
            model: default_generation_model(),
            temperature: default_temperature(),
            max_tokens: None,
            api_key_env: default_groq_key_env(),
            timeout_secs: default_generation_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_generation_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_generation_model() -> String {
    "llama3-8b-8192".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_groq_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Upper bound on characters kept from one page.
    #[serde(default = "default_fetch_max_chars")]
    pub max_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            max_chars: default_fetch_max_chars(),
        }
    }
}

fn default_user_agent() -> String {
    concat!("docqa/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_fetch_max_chars() -> usize {
    200_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct WikipediaConfig {
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_max_docs")]
    pub max_docs: usize,
    #[serde(default = "default_article_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Overrides `https://{lang}.wikipedia.org`; used to point at a mirror.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            max_docs: default_max_docs(),
            max_chars: default_article_max_chars(),
            timeout_secs: default_timeout_secs(),
            base_url: None,
        }
    }
}

fn default_lang() -> String {
    "en".to_string()
}
fn default_max_docs() -> usize {
    25
}
fn default_article_max_chars() -> usize {
    4000
}

impl RerankConfig {
    pub fn model_name(&self) -> String {
        match (&self.model, self.provider.as_str()) {
            (Some(m), _) => m.clone(),
            (None, "local") => "bge-reranker-base".to_string(),
            (None, "lexical") => "bm25".to_string(),
            (None, _) => "rerank-english-v3.0".to_string(),
        }
    }
}

impl WikipediaConfig {
    pub fn api_root(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.wikipedia.org", self.lang))
            .trim_end_matches('/')
            .to_string()
    }
}

impl ChunkingConfig {
    /// Checks the `overlap < size` invariant the chunker relies on to terminate.
    pub fn validate(&self) -> crate::Result<()> {
        if self.size == 0 {
            return Err(Error::InvalidConfig("chunking.size must be > 0".into()));
        }
        if self.overlap >= self.size {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap ({}) must be smaller than chunking.size ({})",
                self.overlap, self.size
            )));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    config.chunking.validate()?;

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.top_n == 0 {
        anyhow::bail!("retrieval.top_n must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "local" | "openai" | "ollama" | "hash" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, ollama, or hash.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
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

    match config.rerank.provider.as_str() {
        "cohere" | "local" | "lexical" => {}
        other => anyhow::bail!(
            "Unknown rerank provider: '{}'. Must be cohere, local, or lexical.",
            other
        ),
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }

    if config.wikipedia.max_docs == 0 {
        anyhow::bail!("wikipedia.max_docs must be >= 1");
    }

    Ok(())
}
