//! PDF text extraction.
//!
//! Produces one [`PageText`] per page so retrieved chunks can cite the page
//! they came from. Extraction failures are reported, never panicked on.

use std::path::Path;

use crate::error::PipelineError;
use crate::models::PageText;

/// Extract per-page text from the PDF at `path`. Page numbers are 1-based.
///
/// Pages without any text are skipped; a document where every page is
/// empty is [`PipelineError::EmptyDocument`].
pub fn load_pdf(path: &Path) -> Result<Vec<PageText>, PipelineError> {
    let raw = pdf_extract::extract_text_by_pages(path).map_err(|e| PipelineError::Pdf(e.to_string()))?;
    pages_from_text(raw)
}

fn pages_from_text(raw: Vec<String>) -> Result<Vec<PageText>, PipelineError> {
    let pages: Vec<PageText> = raw
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| PageText { page: i + 1, text })
        .collect();

    if pages.is_empty() {
        return Err(PipelineError::EmptyDocument);
    }
    Ok(pages)
}
