//! Chat model providers.
//!
//! [`ChatModel`] is the seam the agent runner calls through. Two
//! implementations talk to hosted APIs:
//!
//! | Provider | Endpoint |
//! |----------|----------|
//! | [`OpenAiChat`] | `POST /v1/chat/completions` |
//! | [`GeminiChat`] | `POST /v1beta/models/{model}:generateContent` |

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{LlmConfig, Provider};
use crate::models::{ChatMessage, MessageRole};
use crate::transport;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A single chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Return the assistant's reply text.
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

pub fn create_chat_model(
    config: &LlmConfig,
    provider: Provider,
    api_key: &str,
) -> Result<Arc<dyn ChatModel>> {
    let model = config.model_for(provider).to_string();
    Ok(match provider {
        Provider::OpenAi => Arc::new(OpenAiChat::new(config, model, api_key)?),
        Provider::Gemini => Arc::new(GeminiChat::new(config, model, api_key)?),
    })
}

// ============ OpenAI ============

pub struct OpenAiChat {
    client: reqwest::Client,
    model: String,
    api_key: String,
    url: String,
    max_retries: u32,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig, model: String, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: transport::client(config.timeout_secs)?,
            model,
            api_key: api_key.to_string(),
            url: OPENAI_CHAT_URL.to_string(),
            max_retries: config.max_retries,
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
        });
        let auth = format!("Bearer {}", self.api_key);
        let json = transport::post_json(
            &self.client,
            "OpenAI",
            &self.url,
            &[("Authorization", auth.as_str())],
            &body,
            self.max_retries,
        )
        .await?;
        parse_openai_reply(&json)
    }
}

fn parse_openai_reply(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

// ============ Gemini ============

pub struct GeminiChat {
    client: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
    max_retries: u32,
}

impl GeminiChat {
    pub fn new(config: &LlmConfig, model: String, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: transport::client(config.timeout_secs)?,
            model: model.trim_start_matches("models/").to_string(),
            api_key: api_key.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
            max_retries: config.max_retries,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Gemini takes system text separately and calls the assistant `model`.
fn gemini_body(request: &ChatRequest) -> serde_json::Value {
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .collect();
    let contents: Vec<serde_json::Value> = request
        .messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| {
            let role = if m.role == MessageRole::Assistant { "model" } else { "user" };
            serde_json::json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    let mut body = serde_json::json!({
        "contents": contents,
        "generationConfig": { "temperature": request.temperature },
    });
    if !system.is_empty() {
        body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system.join("\n\n") }] });
    }
    body
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let json = transport::post_json(
            &self.client,
            "Gemini",
            &url,
            &[("x-goog-api-key", self.api_key.as_str())],
            &gemini_body(request),
            self.max_retries,
        )
        .await?;
        parse_gemini_reply(&json)
    }
}

fn parse_gemini_reply(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing candidates[0].content.parts"))?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    Ok(text.trim().to_string())
}
