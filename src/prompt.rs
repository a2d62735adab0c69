//! Context block and task prompt assembly.
//!
//! Retrieved chunks become labelled snippets (`[Source: 3]` for page 3,
//! `[Source: chunk-2]` when the page is unknown), joined by `---` rules.
//! The task description wraps that block and the user's question with
//! instructions to answer only from the context and cite the labels.

use crate::models::{RetrievedChunk, SourceRef};

pub const NO_CONTEXT: &str = "No relevant text was found in the document.";
const PART_SEPARATOR: &str = "\n\n---\n\n";
const ELLIPSIS: char = '…';

/// Label a retrieved chunk at 1-based position `position`.
pub fn source_label(hit: &RetrievedChunk, position: usize) -> String {
    match hit.chunk.page {
        Some(page) => page.to_string(),
        None => format!("chunk-{}", position),
    }
}

/// Flatten newlines and cut long snippets back to a word boundary.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    let head = match cut.rfind(' ') {
        Some(pos) => &cut[..pos],
        None => cut.as_str(),
    };
    format!("{}{}", head, ELLIPSIS)
}

/// The context block placed before the question, plus the sources it cites.
pub fn build_context(hits: &[RetrievedChunk], max_chars: usize) -> (String, Vec<SourceRef>) {
    let mut parts = Vec::with_capacity(hits.len());
    let mut sources = Vec::with_capacity(hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let label = source_label(hit, i + 1);
        parts.push(format!("[Source: {}]\n{}", label, snippet(&hit.chunk.text, max_chars)));
        sources.push(SourceRef {
            label,
            page: hit.chunk.page,
            chunk_index: hit.chunk.chunk_index,
            score: hit.score,
        });
    }

    let context = parts.join(PART_SEPARATOR).trim().to_string();
    if context.is_empty() {
        (NO_CONTEXT.to_string(), sources)
    } else {
        (context, sources)
    }
}

/// Task description that pins the agent to the supplied context.
pub fn task_description(context: &str, question: &str) -> String {
    format!(
        "You are provided with context extracted from a PDF (below). Use ONLY this context to answer the question. \
         If the answer is not contained in the context, say you don't know. Cite the source labels in your answer.\n\n\
         CONTEXT:\n{}\n\nQUESTION:\n{}\n\n\
         Answer concisely and include source citations like [Source: page_number] or [Source: chunk-1].",
        context, question
    )
}

pub fn expected_output(file_name: &str) -> String {
    format!("Answer and cite sources (from {})", file_name)
}

/// Passages message used when context travels beside the task rather than
/// inside it.
pub fn context_message(context: &str, file_name: &str) -> String {
    format!(
        "Relevant passages retrieved from {}:\n\n{}",
        file_name, context
    )
}
