//! TOML configuration.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working configuration. Secrets never live in the file; they
//! are read from the environment by [`Secrets::from_env`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::BinaryThresholds;

/// Smallest accepted `retrieval.context_budget`: enough for the header, one
/// snippet frame, and the omission marker.
pub const MIN_CONTEXT_BUDGET: usize = 200;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
        }
    }
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("./workspace")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            base_url: default_llm_base_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
            system_prompt: None,
        }
    }
}

fn default_llm_model() -> String {
    "claude-3-7-sonnet-latest".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_llm_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    /// `qdrant`, `sqlite`, `memory`, or `disabled`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Database file for the `sqlite` backend.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_qdrant_url(),
            collection: default_collection(),
            path: default_store_path(),
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

impl VectorStoreConfig {
    pub fn is_enabled(&self) -> bool {
        self.backend != "disabled"
    }
}

fn default_backend() -> String {
    "qdrant".to_string()
}
fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}
fn default_collection() -> String {
    "code_snippets".to_string()
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./data/vectors.sqlite")
}
fn default_store_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum characters of retrieved context injected into one user turn.
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_top_k(),
            context_budget: default_context_budget(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_top_k() -> usize {
    3
}
fn default_context_budget() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default)]
    pub binary: BinaryThresholds,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_snippet_chars: default_max_snippet_chars(),
            max_file_bytes: default_max_file_bytes(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            binary: BinaryThresholds::default(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}
fn default_max_snippet_chars() -> usize {
    10_000
}
fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    #[serde(default = "default_tool_embed_timeout")]
    pub embed_timeout_secs: u64,
    #[serde(default = "default_tool_upsert_timeout")]
    pub upsert_timeout_secs: u64,
    #[serde(default = "default_tool_query_timeout")]
    pub query_timeout_secs: u64,
    /// `k` used by `vector_search` when the model omits it.
    #[serde(default = "default_search_k")]
    pub default_k: usize,
    #[serde(default = "default_fallback_results")]
    pub fallback_results: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            embed_timeout_secs: default_tool_embed_timeout(),
            upsert_timeout_secs: default_tool_upsert_timeout(),
            query_timeout_secs: default_tool_query_timeout(),
            default_k: default_search_k(),
            fallback_results: default_fallback_results(),
        }
    }
}

fn default_tool_embed_timeout() -> u64 {
    30
}
fn default_tool_upsert_timeout() -> u64 {
    10
}
fn default_tool_query_timeout() -> u64 {
    5
}
fn default_search_k() -> usize {
    5
}
fn default_fallback_results() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSearchConfig {
    /// `brave` or `disabled`.
    #[serde(default = "default_web_provider")]
    pub provider: String,
    #[serde(default = "default_web_url")]
    pub url: String,
    #[serde(default = "default_web_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            provider: default_web_provider(),
            url: default_web_url(),
            timeout_secs: default_web_timeout_secs(),
        }
    }
}

fn default_web_provider() -> String {
    "brave".to_string()
}
fn default_web_url() -> String {
    "https://api.search.brave.com/res/v1/web/search".to_string()
}
fn default_web_timeout_secs() -> u64 {
    30
}

/// Credentials read from the environment (after `.env.local` is loaded).
#[derive(Clone, Default)]
pub struct Secrets {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub brave_api_key: Option<String>,
    pub qdrant_api_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: non_empty_env("ANTHROPIC_API_KEY"),
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            brave_api_key: non_empty_env("BRAVE_API_KEY"),
            qdrant_api_key: non_empty_env("QDRANT_API_KEY"),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "set" } else { "unset" };
        f.debug_struct("Secrets")
            .field("anthropic_api_key", &mask(&self.anthropic_api_key))
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("brave_api_key", &mask(&self.brave_api_key))
            .field("qdrant_api_key", &mask(&self.qdrant_api_key))
            .finish()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Apply `QDRANT_URL` and `QDRANT_COLLECTION_NAME` if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = non_empty_env("QDRANT_URL") {
            self.vector_store.url = url;
        }
        if let Some(collection) = non_empty_env("QDRANT_COLLECTION_NAME") {
            self.vector_store.collection = collection;
        }
        self
    }
}

/// Load and validate a configuration file. A missing file yields defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.llm.max_tokens == 0 {
        anyhow::bail!("llm.max_tokens must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        anyhow::bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.vector_store.backend.as_str() {
        "disabled" | "qdrant" | "sqlite" | "memory" => {}
        other => anyhow::bail!(
            "Unknown vector store backend: '{}'. Must be disabled, qdrant, sqlite, or memory.",
            other
        ),
    }
    if config.vector_store.collection.trim().is_empty() {
        anyhow::bail!("vector_store.collection must not be empty");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.context_budget < MIN_CONTEXT_BUDGET {
        anyhow::bail!("retrieval.context_budget must be >= {}", MIN_CONTEXT_BUDGET);
    }

    if config.indexing.batch_size == 0 {
        anyhow::bail!("indexing.batch_size must be > 0");
    }
    if config.indexing.max_snippet_chars == 0 {
        anyhow::bail!("indexing.max_snippet_chars must be > 0");
    }

    if config.tools.default_k == 0 {
        anyhow::bail!("tools.default_k must be > 0");
    }

    match config.web_search.provider.as_str() {
        "disabled" | "brave" => {}
        other => anyhow::bail!(
            "Unknown web search provider: '{}'. Must be disabled or brave.",
            other
        ),
    }

    Ok(())
}
