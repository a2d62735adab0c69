//! User-facing failure classes of the ingest and ask pipeline.
//!
//! Configuration and I/O plumbing uses `anyhow`; the variants here are the
//! failures a user can act on, and the HTTP layer maps each to a status code.

use thiserror::Error;

use crate::config::Provider;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{var} not set. Add it to your .env file ({var}=...) or environment and restart.")]
    MissingApiKey { provider: Provider, var: &'static str },

    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("Please upload a PDF file to start the conversation.")]
    NoDocument,

    #[error("only PDF uploads are accepted (got '{0}')")]
    NotPdf(String),

    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("failed to read PDF: {0}")]
    Pdf(String),

    #[error("no extractable text was found in the PDF")]
    EmptyDocument,

    #[error("embedding provider is disabled")]
    EmbeddingsDisabled,

    #[error("{provider} API error {status}: {body}")]
    Upstream {
        provider: &'static str,
        status: u16,
        body: String,
    },
}
