//! Ingest and ask: the two operations a page performs.
//!
//! ```text
//! ingest:  TempUpload ─▶ load_pdf ─▶ TextSplitter ─▶ VectorIndex::build
//! ask:     question ─▶ embed_query ─▶ Retriever ─▶ build_context ─▶ Crew
//! ```
//!
//! Neither function looks up API keys; callers resolve providers and keys
//! first so that a missing key stops the request before anything here runs.

use anyhow::Result;
use std::time::Instant;

use crate::agent::{Agent, Crew, Task};
use crate::chunk::TextSplitter;
use crate::config::{AppPage, Config, ContextMode};
use crate::embedding::{embed_query, Embedder};
use crate::error::PipelineError;
use crate::extract::load_pdf;
use crate::index::{IndexedDocument, Retriever, VectorIndex};
use crate::llm::ChatModel;
use crate::models::{Answer, ChatMessage};
use crate::prompt;
use crate::upload::TempUpload;

/// Extract, chunk, and index an uploaded PDF.
pub async fn ingest(
    config: &Config,
    upload: &TempUpload,
    embedder: &dyn Embedder,
) -> Result<IndexedDocument> {
    let started = Instant::now();
    let pages = load_pdf(upload.path())?;

    let splitter = TextSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap);
    let chunks = splitter.split_pages(&pages);
    let chunk_count = chunks.len();

    let index = VectorIndex::build(chunks, embedder).await?;
    tracing::info!(
        file = upload.original_name(),
        pages = pages.len(),
        chunks = chunk_count,
        model = embedder.model_name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "indexed document"
    );

    Ok(IndexedDocument {
        file_name: upload.original_name().to_string(),
        pages: pages.len(),
        index,
    })
}

/// Answer `question` from `doc` using the page's agent.
pub async fn ask(
    config: &Config,
    page: &AppPage,
    doc: &IndexedDocument,
    question: &str,
    embedder: &dyn Embedder,
    chat: &dyn ChatModel,
) -> Result<Answer> {
    let question = question.trim();
    if question.is_empty() {
        return Err(PipelineError::EmptyQuestion.into());
    }

    let started = Instant::now();
    let query = embed_query(embedder, question).await?;
    let hits = Retriever::from_config(&config.retrieval).retrieve(&doc.index, &query);
    let (context, sources) = prompt::build_context(&hits, config.retrieval.snippet_max_chars);
    tracing::debug!(
        page = %page.page,
        hits = hits.len(),
        context_chars = context.chars().count(),
        "retrieved context"
    );

    let expected = prompt::expected_output(&doc.file_name);
    let task = match page.context_mode {
        ContextMode::Task => Task::new(prompt::task_description(&context, question), expected),
        ContextMode::Messages => Task::new(question, expected).with_context(ChatMessage::user(
            prompt::context_message(&context, &doc.file_name),
        )),
    };

    let crew = Crew::new(Agent::pdf_analyst(page.temperature), vec![task]);
    let output = crew.kickoff(chat).await?;
    tracing::info!(
        page = %page.page,
        sources = sources.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "answered question"
    );

    Ok(Answer {
        answer: output.raw,
        sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatRequest;
    use crate::models::Chunk;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Maps text to a 2-d vector by whether it mentions "cats".
    struct TopicEmbedder;

    #[async_trait]
    impl Embedder for TopicEmbedder {
        fn model_name(&self) -> &str {
            "topic"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.to_lowercase().contains("cats") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    struct CapturingChat {
        last: Mutex<Option<ChatRequest>>,
    }

    #[async_trait]
    impl ChatModel for CapturingChat {
        fn model_name(&self) -> &str {
            "capture"
        }
        async fn complete(&self, request: &ChatRequest) -> Result<String> {
            *self.last.lock().unwrap() = Some(request.clone());
            Ok("Cats sleep a lot [Source: 2]".to_string())
        }
    }

    fn doc() -> IndexedDocument {
        let chunks = vec![
            Chunk {
                chunk_index: 0,
                page: Some(1),
                text: "Dogs bark.".to_string(),
                hash: String::new(),
            },
            Chunk {
                chunk_index: 1,
                page: Some(2),
                text: "Cats sleep\nmost of the day.".to_string(),
                hash: String::new(),
            },
        ];
        let vectors = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        IndexedDocument {
            file_name: "pets.pdf".to_string(),
            pages: 2,
            index: VectorIndex::from_vectors(chunks, vectors, "topic"),
        }
    }

    fn config_with_k(k: usize) -> Config {
        let mut config = Config::minimal();
        config.retrieval.k = k;
        config
    }

    #[tokio::test]
    async fn test_ask_task_mode_embeds_context() {
        let config = config_with_k(1);
        let page = config.apps[0].clone();
        let chat = CapturingChat {
            last: Mutex::new(None),
        };
        let answer = ask(&config, &page, &doc(), "  What do cats do? ", &TopicEmbedder, &chat)
            .await
            .unwrap();

        assert_eq!(answer.answer, "Cats sleep a lot [Source: 2]");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].label, "2");

        let request = chat.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.messages.len(), 2);
        let task = &request.messages[1].content;
        assert!(task.contains("[Source: 2]\nCats sleep most of the day."));
        assert!(task.contains("QUESTION:\nWhat do cats do?"));
        assert!(task.contains("Answer and cite sources (from pets.pdf)"));
    }

    #[tokio::test]
    async fn test_ask_messages_mode_keeps_raw_question() {
        let config = config_with_k(1);
        let mut page = config.apps[0].clone();
        page.context_mode = ContextMode::Messages;
        let chat = CapturingChat {
            last: Mutex::new(None),
        };
        ask(&config, &page, &doc(), "What do cats do?", &TopicEmbedder, &chat)
            .await
            .unwrap();

        let request = chat.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.messages.len(), 3);
        assert!(request.messages[1].content.starts_with("Relevant passages retrieved from pets.pdf"));
        assert!(request.messages[2]
            .content
            .starts_with("Current Task: What do cats do?"));
    }

    #[tokio::test]
    async fn test_empty_question_rejected_before_embedding() {
        let config = Config::minimal();
        let page = config.apps[0].clone();
        let chat = CapturingChat {
            last: Mutex::new(None),
        };
        let err = ask(&config, &page, &doc(), "   ", &TopicEmbedder, &chat)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EmptyQuestion)
        ));
        assert!(chat.last.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ingest_rejects_non_pdf_and_cleans_up() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::minimal();
        {
            let upload = TempUpload::write(dir.path(), "broken.pdf", b"not a pdf").unwrap();
            let err = ingest(&config, &upload, &TopicEmbedder).await.unwrap_err();
            assert!(err.downcast_ref::<PipelineError>().is_some());
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
