//! Configuration parsing and validation.
//!
//! rag-chat is configured with a TOML file (default `./config/ragchat.toml`).
//! Every section except `[store]` has defaults, so a minimal file is:
//!
//! ```toml
//! [store]
//! dir = "./data/index"
//!
//! [loader]
//! root = "./docs"
//! ```
//!
//! API keys are never stored in the file. Each provider section names the
//! environment variable that holds its key, and [`Credentials::from_env`]
//! reads them once at process start.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use rag_chat_core::markdown::HeaderMarker;
use rag_chat_core::prompt::PromptTemplate;
use rag_chat_core::splitter::{SplitOptions, SplitStrategy};
use rag_chat_core::tagging::PathTag;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub tagging: TaggingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory holding `index.sqlite`. Created on first build.
    pub dir: PathBuf,
}

impl StoreConfig {
    pub fn db_path(&self) -> PathBuf {
        self.dir.join("index.sqlite")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoaderConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Web pages to ingest in addition to (or instead of) `root`.
    #[serde(default)]
    pub urls: Vec<String>,
    /// Only text inside elements carrying one of these classes is kept.
    /// Empty keeps the whole body.
    #[serde(default)]
    pub html_classes: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            root: None,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            urls: Vec::new(),
            html_classes: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    #[default]
    Fixed,
    Markdown,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HeaderConfig {
    pub marker: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub strategy: ChunkStrategy,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub chunk_overlap: usize,
    #[serde(default = "default_headers")]
    pub headers: Vec<HeaderConfig>,
    #[serde(default)]
    pub strip_headers: bool,
    #[serde(default)]
    pub front_matter_keys: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::default(),
            chunk_size: default_chunk_size(),
            chunk_overlap: 0,
            headers: default_headers(),
            strip_headers: false,
            front_matter_keys: Vec::new(),
        }
    }
}

fn default_chunk_size() -> usize {
    400
}

fn default_headers() -> Vec<HeaderConfig> {
    rag_chat_core::markdown::default_headers()
        .into_iter()
        .map(|h| HeaderConfig {
            marker: h.marker,
            name: h.name,
        })
        .collect()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TaggingConfig {
    #[serde(default)]
    pub path_tags: Vec<PathTag>,
    /// Prefix stripped from file stems to derive `topic`. Unset disables
    /// topic derivation.
    #[serde(default)]
    pub topic_prefix: Option<String>,
    #[serde(default)]
    pub label_chunks: bool,
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
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the API key; defaults per provider.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
            api_key_env: None,
            base_url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn api_key_env(&self) -> &str {
        match (&self.api_key_env, self.provider.as_str()) {
            (Some(var), _) => var,
            (None, "cohere") => "CO_API_KEY",
            (None, _) => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_anthropic_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            model: default_model_name(),
            max_tokens: default_max_tokens(),
            temperature: None,
            system_prompt: None,
            timeout_secs: default_model_timeout_secs(),
            api_key_env: default_anthropic_key_env(),
            base_url: None,
        }
    }
}

fn default_model_provider() -> String {
    "anthropic".to_string()
}
fn default_model_name() -> String {
    "claude-haiku-4-5-20251001".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_model_timeout_secs() -> u64 {
    120
}
fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub prompt_template: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            prompt_template: None,
        }
    }
}

fn default_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    /// Answer `/api/chat` with an event stream unless the request says
    /// otherwise.
    #[serde(default = "default_stream")]
    pub stream: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
            stream: default_stream(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
    ]
}
fn default_stream() -> bool {
    true
}

impl Config {
    /// Splitter options for the configured strategy and tagging rules.
    pub fn split_options(&self) -> SplitOptions {
        let strategy = match self.chunking.strategy {
            ChunkStrategy::Fixed => SplitStrategy::FixedWindow {
                chunk_size: self.chunking.chunk_size,
                chunk_overlap: self.chunking.chunk_overlap,
            },
            ChunkStrategy::Markdown => SplitStrategy::MarkdownHeaders {
                headers: self
                    .chunking
                    .headers
                    .iter()
                    .map(|h| HeaderMarker::new(h.marker.clone(), h.name.clone()))
                    .collect(),
                strip_headers: self.chunking.strip_headers,
            },
        };
        SplitOptions {
            strategy,
            front_matter_keys: self.chunking.front_matter_keys.clone(),
            path_tags: self.tagging.path_tags.clone(),
            topic_prefix: self.tagging.topic_prefix.clone(),
            label_chunks: self.tagging.label_chunks,
        }
    }

    pub fn prompt_template(&self) -> Result<PromptTemplate> {
        match &self.retrieval.prompt_template {
            Some(t) => PromptTemplate::new(t.clone()).context("invalid retrieval.prompt_template"),
            None => Ok(PromptTemplate::default()),
        }
    }
}

/// API keys read from the environment once at process start.
#[derive(Clone, Default)]
pub struct Credentials {
    pub embedding_api_key: Option<String>,
    pub model_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("embedding_api_key", &self.embedding_api_key.as_ref().map(|_| "***"))
            .field("model_api_key", &self.model_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Credentials {
    pub fn from_env(config: &Config) -> Self {
        let read = |var: &str| std::env::var(var).ok().filter(|v| !v.trim().is_empty());
        Self {
            embedding_api_key: if config.embedding.is_enabled() {
                read(config.embedding.api_key_env())
            } else {
                None
            },
            model_api_key: read(&config.model.api_key_env),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be less than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }
    if config.chunking.strategy == ChunkStrategy::Markdown {
        if config.chunking.headers.is_empty() {
            bail!("chunking.headers must not be empty when strategy is 'markdown'");
        }
        for h in &config.chunking.headers {
            if h.marker.is_empty() || !h.marker.chars().all(|c| c == '#') {
                bail!("chunking.headers marker '{}' must consist only of '#'", h.marker);
            }
        }
    }

    // Tagging
    for tag in &config.tagging.path_tags {
        if tag.key.trim().is_empty() {
            bail!("tagging.path_tags.key must not be empty");
        }
    }

    // Loader
    if config.loader.include_globs.is_empty() {
        bail!("loader.include_globs must not be empty");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "cohere" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or cohere.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
    }

    // Model
    match config.model.provider.as_str() {
        "disabled" | "anthropic" => {}
        other => bail!(
            "Unknown model provider: '{}'. Must be disabled or anthropic.",
            other
        ),
    }
    if config.model.max_tokens == 0 {
        bail!("model.max_tokens must be > 0");
    }

    // Retrieval
    if config.retrieval.k == 0 {
        bail!("retrieval.k must be >= 1");
    }
    config.prompt_template()?;

    Ok(())
}
