//! Recursive character text splitter.
//!
//! Splits page text into [`Chunk`]s of at most `chunk_size` characters,
//! carrying up to `chunk_overlap` characters of trailing context from one
//! chunk into the next. Splitting tries coarse boundaries first (blank
//! lines), then line breaks, then spaces, and only cuts between arbitrary
//! characters when nothing else fits.
//!
//! Lengths are measured in `char`s, so multi-byte text is never cut inside
//! a scalar value. Each chunk keeps its source page and a SHA-256 hash of
//! its text.

use sha2::{Digest, Sha256};

use crate::models::{Chunk, PageText};

/// Boundaries tried in order. The empty separator splits between characters.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Split one text into trimmed, non-empty pieces.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let seps: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.split_recursive(text, &seps)
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Split every page, numbering chunks contiguously across the document.
    pub fn split_pages(&self, pages: &[PageText]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in pages {
            for text in self.split_text(&page.text) {
                chunks.push(make_chunk(chunks.len(), Some(page.page), text));
            }
        }
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits = split_keep_separator(text, separator);
        let mut out = Vec::new();
        let mut good: Vec<&str> = Vec::new();

        for piece in splits {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                out.extend(self.merge_splits(&good));
                good.clear();
            }
            if remaining.is_empty() {
                out.push(piece.to_string());
            } else {
                out.extend(self.split_recursive(piece, remaining));
            }
        }
        if !good.is_empty() {
            out.extend(self.merge_splits(&good));
        }
        out
    }

    /// Greedily join small pieces into chunks, keeping an overlap window.
    /// Pieces already carry their leading separator, so they are joined
    /// without one.
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);
            if total + len > self.chunk_size {
                if !window.is_empty() {
                    push_trimmed(&mut docs, &window.concat());
                    while !window.is_empty()
                        && (total > self.chunk_overlap || total + len > self.chunk_size)
                    {
                        total -= char_len(window[0]);
                        window.remove(0);
                    }
                }
            }
            window.push(piece);
            total += len;
        }
        if !window.is_empty() {
            push_trimmed(&mut docs, &window.concat());
        }
        docs
    }
}

fn push_trimmed(docs: &mut Vec<String>, doc: &str) {
    let trimmed = doc.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` before each occurrence of `sep`, so every piece after the
/// first starts with the separator. The empty separator yields characters.
fn split_keep_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    if sep.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(sep) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn make_chunk(index: usize, page: Option<usize>, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        chunk_index: index,
        page,
        text,
        hash,
    }
}
