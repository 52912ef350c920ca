use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use academic_rag_core::chunk::ChunkingParams;
use academic_rag_core::query::PrecedencePolicy;
use academic_rag_core::rerank::RerankParams;
use academic_rag_core::retrieve::RetrievalParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: default_documents_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("./documents")
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Characters per chunk, before overlap.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Characters inspected when classifying a document.
    #[serde(default = "default_sample_chars")]
    pub sample_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            overlap: default_overlap(),
            sample_chars: default_sample_chars(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkingParams {
        ChunkingParams {
            max_chunk_size: self.max_chunk_size,
            overlap: self.overlap,
            sample_chars: self.sample_chars,
        }
    }
}

fn default_max_chunk_size() -> usize {
    2000
}
fn default_overlap() -> usize {
    200
}
fn default_sample_chars() -> usize {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: usize,
    #[serde(default = "default_per_filter_limit")]
    pub per_filter_limit: usize,
    /// Which intent wins when a question names both an article and a month.
    #[serde(default)]
    pub precedence: PrecedencePolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_pool: default_candidate_pool(),
            per_filter_limit: default_per_filter_limit(),
            precedence: PrecedencePolicy::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            candidate_pool: self.candidate_pool,
            per_filter_limit: self.per_filter_limit,
        }
    }
}

fn default_candidate_pool() -> usize {
    10
}
fn default_per_filter_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,
    #[serde(default = "default_filter_match_bonus")]
    pub filter_match_bonus: f32,
    #[serde(default = "default_duplicate_penalty")]
    pub duplicate_penalty: f32,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            semantic_weight: default_semantic_weight(),
            filter_match_bonus: default_filter_match_bonus(),
            duplicate_penalty: default_duplicate_penalty(),
        }
    }
}

impl RerankConfig {
    pub fn params(&self) -> RerankParams {
        RerankParams {
            top_k: self.top_k,
            semantic_weight: self.semantic_weight,
            filter_match_bonus: self.filter_match_bonus,
            duplicate_penalty: self.duplicate_penalty,
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_semantic_weight() -> f32 {
    1.0
}
fn default_filter_match_bonus() -> f32 {
    0.5
}
fn default_duplicate_penalty() -> f32 {
    0.15
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default = "default_ollama_url")]
    pub url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: default_ollama_url(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Model context size in tokens; the prompt budget is derived from it.
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            url: default_ollama_url(),
            timeout_secs: default_llm_timeout_secs(),
            temperature: default_temperature(),
            max_input_tokens: default_max_input_tokens(),
        }
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}
fn default_llm_model() -> String {
    "mistral".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_input_tokens() -> usize {
    4096
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_request_timeout_secs() -> u64 {
    300
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a TOML configuration string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_chunk_size == 0 {
        anyhow::bail!("chunking.max_chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.max_chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.max_chunk_size");
    }
    if config.chunking.sample_chars == 0 {
        anyhow::bail!("chunking.sample_chars must be > 0");
    }

    // Validate retrieval and rerank
    if config.rerank.top_k < 1 {
        anyhow::bail!("rerank.top_k must be >= 1");
    }
    if config.retrieval.candidate_pool < config.rerank.top_k {
        anyhow::bail!("retrieval.candidate_pool must be >= rerank.top_k");
    }
    if config.retrieval.per_filter_limit < 1 {
        anyhow::bail!("retrieval.per_filter_limit must be >= 1");
    }
    for (name, value) in [
        ("rerank.semantic_weight", config.rerank.semantic_weight),
        ("rerank.filter_match_bonus", config.rerank.filter_match_bonus),
        ("rerank.duplicate_penalty", config.rerank.duplicate_penalty),
    ] {
        if !value.is_finite() || value < 0.0 {
            anyhow::bail!("{} must be a finite, non-negative number", name);
        }
    }

    // Validate embedding
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    match config.embedding.provider.as_str() {
        "hash" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, or ollama.",
            other
        ),
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be ollama or openai.",
            other
        ),
    }
    if config.llm.max_input_tokens == 0 {
        anyhow::bail!("llm.max_input_tokens must be > 0");
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    if config.ingest.workers == 0 {
        anyhow::bail!("ingest.workers must be > 0");
    }

    // A chat request may make two generation calls, each bounded by
    // llm.timeout_secs.
    if config.server.request_timeout_secs < config.llm.timeout_secs.saturating_mul(2) {
        anyhow::bail!(
            "server.request_timeout_secs ({}) must be at least twice llm.timeout_secs ({})",
            config.server.request_timeout_secs,
            config.llm.timeout_secs
        );
    }

    Ok(config)
}

#[cfg(test)]
impl Config {
    /// Defaults with a throwaway database path.
    pub fn default_for_tests() -> Self {
        parse_config("[db]\npath = \"./data/test.sqlite\"\n").unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"./data/arag.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.max_chunk_size, 2000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.candidate_pool, 10);
        assert_eq!(config.rerank.top_k, 5);
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.llm.model, "mistral");
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.retrieval.precedence, PrecedencePolicy::ArticleFirst);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let err = parse_config("[db]\npath = \"x\"\n[chunking]\nmax_chunk_size = 100\noverlap = 100\n")
            .unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_remote_embedding_requires_model() {
        let err = parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[db]\npath = \"x\"\n[llm]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_request_timeout_covers_retry() {
        let config = parse_config("[db]\npath = \"x\"\n").unwrap();
        assert!(config.server.request_timeout_secs >= 2 * config.llm.timeout_secs);

        let short = "[db]\npath = \"x\"\n[llm]\ntimeout_secs = 120\n[server]\nrequest_timeout_secs = 180\n";
        let err = parse_config(short).unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));

        let ok = "[db]\npath = \"x\"\n[llm]\ntimeout_secs = 60\n[server]\nrequest_timeout_secs = 120\n";
        assert!(parse_config(ok).is_ok());
    }

    #[test]
    fn test_pool_must_cover_top_k() {
        let err = parse_config("[db]\npath = \"x\"\n[retrieval]\ncandidate_pool = 3\n").unwrap_err();
        assert!(err.to_string().contains("candidate_pool"));
    }

    #[test]
    fn test_precedence_setting() {
        let config =
            parse_config("[db]\npath = \"x\"\n[retrieval]\nprecedence = \"calendar_first\"\n").unwrap();
        assert_eq!(config.retrieval.precedence, PrecedencePolicy::CalendarFirst);
    }
}
