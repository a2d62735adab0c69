//! Provider API keys.
//!
//! Keys are read once at process start. Every page operation that can reach
//! a provider calls [`ApiKeys::require`] before doing anything else, so a
//! missing key halts the request without an external call.

use std::collections::HashMap;

use crate::config::{AppPage, Config, Provider};
use crate::error::PipelineError;

/// The providers a page talks to, each paired with its key.
#[derive(Debug, Clone, Copy)]
pub struct PageKeys<'a> {
    pub embedding: (Provider, &'a str),
    pub llm: (Provider, &'a str),
}

#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    keys: HashMap<Provider, String>,
}

impl ApiKeys {
    /// Load `.env` (if present) and read every provider's key variable.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded environment file");
        }
        let mut keys = HashMap::new();
        for provider in [Provider::OpenAi, Provider::Gemini] {
            match std::env::var(provider.env_var()) {
                Ok(value) if !value.trim().is_empty() => {
                    keys.insert(provider, value);
                }
                _ => tracing::debug!(var = provider.env_var(), "API key not set"),
            }
        }
        Self { keys }
    }

    /// No keys at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Provider, key: impl Into<String>) -> Self {
        self.keys.insert(provider, key.into());
        self
    }

    pub fn has(&self, provider: Provider) -> bool {
        self.keys.contains_key(&provider)
    }

    pub fn require(&self, provider: Provider) -> Result<&str, PipelineError> {
        self.keys
            .get(&provider)
            .map(String::as_str)
            .ok_or(PipelineError::MissingApiKey {
                provider,
                var: provider.env_var(),
            })
    }

    /// Keys for every provider `page` needs, chat model first.
    pub fn for_page(&self, config: &Config, page: &AppPage) -> Result<PageKeys<'_>, PipelineError> {
        let llm = config.llm_provider_for(page);
        let llm_key = self.require(llm)?;
        let embedding = config
            .embedding_provider_for(page)
            .ok_or(PipelineError::EmbeddingsDisabled)?;
        let embedding_key = self.require(embedding)?;
        Ok(PageKeys {
            embedding: (embedding, embedding_key),
            llm: (llm, llm_key),
        })
    }
}
