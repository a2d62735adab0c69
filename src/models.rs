//! Core data models used throughout PDF Assistant.
//!
//! These types represent the pages, chunks, retrieved passages, and chat
//! messages that flow through the ingest and question-answering pipeline.

use serde::{Deserialize, Serialize};

/// Text extracted from a single PDF page.
#[derive(Debug, Clone)]
pub struct PageText {
    /// 1-based page number.
    pub page: usize,
    pub text: String,
}

/// A chunk of a document's text, the unit of retrieval.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Contiguous index within the document, starting at 0.
    pub chunk_index: usize,
    /// Page the chunk was cut from, if known.
    pub page: Option<usize>,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk returned by the retriever, with its similarity to the query.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// One entry in a page's chat history, or in an LLM request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A source passage cited in an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    /// Label used in the context block (`"3"` or `"chunk-2"`).
    pub label: String,
    pub page: Option<usize>,
    pub chunk_index: usize,
    pub score: f32,
}

/// The result of asking a question about an indexed document.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}
