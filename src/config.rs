use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default = "default_apps")]
    pub apps: Vec<AppPage>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub credentials_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            max_bytes: default_max_bytes(),
        }
    }
}

impl UploadConfig {
    /// Directory uploads are written to, falling back to the system temp dir.
    pub fn dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn default_max_bytes() -> usize {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Mmr,
    Similarity,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_search_type")]
    pub search_type: SearchType,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    #[serde(default = "default_lambda_mult")]
    pub lambda_mult: f32,
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_type: default_search_type(),
            k: default_k(),
            fetch_k: default_fetch_k(),
            lambda_mult: default_lambda_mult(),
            snippet_max_chars: default_snippet_max_chars(),
        }
    }
}

fn default_search_type() -> SearchType {
    SearchType::Mmr
}
fn default_k() -> usize {
    5
}
fn default_fetch_k() -> usize {
    20
}
fn default_lambda_mult() -> f32 {
    0.5
}
fn default_snippet_max_chars() -> usize {
    1000
}

/// An external model provider. Each one is reached with its own API key.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Gemini,
}

impl Provider {
    /// Environment variable holding this provider's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    OpenAi,
    Gemini,
    Disabled,
}

impl EmbeddingBackend {
    pub fn provider(&self) -> Option<Provider> {
        match self {
            EmbeddingBackend::OpenAi => Some(Provider::OpenAi),
            EmbeddingBackend::Gemini => Some(Provider::Gemini),
            EmbeddingBackend::Disabled => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_backend")]
    pub provider: EmbeddingBackend,
    #[serde(default)]
    pub model: Option<String>,
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
            provider: default_embedding_backend(),
            model: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != EmbeddingBackend::Disabled
    }

    /// Model name to use for `provider`; a page that overrides the provider
    /// gets that provider's default model.
    pub fn model_for(&self, provider: Provider) -> &str {
        match (self.provider.provider(), self.model.as_deref()) {
            (Some(p), Some(model)) if p == provider => model,
            _ => match provider {
                Provider::OpenAi => "text-embedding-3-small",
                Provider::Gemini => "text-embedding-004",
            },
        }
    }
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::Disabled
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
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: Provider,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            max_retries: default_llm_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Model name to use for `provider`; a page that overrides the provider
    /// gets that provider's default model.
    pub fn model_for(&self, provider: Provider) -> &str {
        if provider == self.provider {
            &self.model
        } else {
            match provider {
                Provider::OpenAi => "gpt-4o-mini",
                Provider::Gemini => "gemini-1.5-flash",
            }
        }
    }
}

fn default_llm_provider() -> Provider {
    Provider::OpenAi
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_retries() -> u32 {
    3
}
fn default_llm_timeout_secs() -> u64 {
    120
}

/// How retrieved passages reach the agent.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// Context block is embedded in the task description.
    #[default]
    Task,
    /// Raw question is the task; passages arrive as a preceding message.
    Messages,
}

/// An application page users can navigate to, gated by role.
#[derive(Debug, Deserialize, Clone)]
pub struct AppPage {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// URL slug, e.g. `"assistant"` for `/pages/assistant`.
    pub page: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub access_privilege_role: Vec<String>,
    #[serde(default)]
    pub context_mode: ContextMode,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub llm_provider: Option<Provider>,
    #[serde(default)]
    pub embedding_provider: Option<Provider>,
}

fn default_apps() -> Vec<AppPage> {
    vec![AppPage {
        name: "Personal ChatBot".to_string(),
        description: "Personal ChatBot".to_string(),
        page: "assistant".to_string(),
        icon: ":material/description:".to_string(),
        access_privilege_role: vec!["user".to_string()],
        context_mode: ContextMode::Task,
        temperature: 0.0,
        llm_provider: None,
        embedding_provider: None,
    }]
}

impl Config {
    /// Defaults for commands and tests that run without a config file.
    pub fn minimal() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:8501".to_string(),
            },
            auth: AuthConfig {
                credentials_path: PathBuf::from("./config/creds.yaml"),
            },
            upload: UploadConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            apps: default_apps(),
        }
    }

    pub fn find_page(&self, slug: &str) -> Option<&AppPage> {
        self.apps.iter().find(|p| p.page == slug)
    }

    /// Embedding provider for a page, or `None` when embeddings are disabled.
    pub fn embedding_provider_for(&self, page: &AppPage) -> Option<Provider> {
        if !self.embedding.is_enabled() {
            return None;
        }
        page.embedding_provider.or(self.embedding.provider.provider())
    }

    pub fn llm_provider_for(&self, page: &AppPage) -> Provider {
        page.llm_provider.unwrap_or(self.llm.provider)
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
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    let r = &config.retrieval;
    if r.k < 1 {
        bail!("retrieval.k must be >= 1");
    }
    if r.fetch_k < r.k {
        bail!("retrieval.fetch_k must be >= retrieval.k");
    }
    if !(0.0..=1.0).contains(&r.lambda_mult) {
        bail!("retrieval.lambda_mult must be in [0.0, 1.0]");
    }
    if r.snippet_max_chars == 0 {
        bail!("retrieval.snippet_max_chars must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            bail!("embedding.model must be specified when an embedding provider is enabled");
        }
        if config.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
    }

    if config.upload.max_bytes == 0 {
        bail!("upload.max_bytes must be > 0");
    }

    let mut seen = HashSet::new();
    for app in &config.apps {
        if app.page.is_empty()
            || !app
                .page
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            bail!(
                "apps.page '{}' must be a non-empty slug of [A-Za-z0-9_-]",
                app.page
            );
        }
        if !seen.insert(app.page.as_str()) {
            bail!("apps.page '{}' is declared more than once", app.page);
        }
        if !(0.0..=2.0).contains(&app.temperature) {
            bail!("apps.temperature for '{}' must be in [0.0, 2.0]", app.page);
        }
    }

    Ok(())
}
