//! In-memory vector index over one document's chunks.
//!
//! Vector search is brute-force cosine similarity over every stored
//! vector, which is plenty for a single uploaded PDF. Two retrieval modes
//! are offered:
//!
//! - **similarity** — the `k` nearest chunks.
//! - **mmr** (maximal marginal relevance) — fetch the `fetch_k` nearest,
//!   then greedily pick `k` that balance relevance against redundancy:
//!
//! ```text
//! score(d) = λ · sim(q, d) − (1 − λ) · max_{s ∈ selected} sim(d, s)
//! ```

use anyhow::{bail, Result};
use std::cmp::Ordering;

use crate::config::{RetrievalConfig, SearchType};
use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{Chunk, RetrievedChunk};

#[derive(Debug, Clone)]
struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Vec<Entry>,
    model: String,
}

impl VectorIndex {
    /// Embed every chunk and index the results.
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<Self> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            embedder.embed(&texts).await?
        };
        if vectors.len() != chunks.len() {
            bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }
        Ok(Self::from_vectors(chunks, vectors, embedder.model_name()))
    }

    pub fn from_vectors(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>, model: &str) -> Self {
        Self {
            entries: chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| Entry { chunk, vector })
                .collect(),
            model: model.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Indices of entries ranked by similarity to `query`, best first.
    /// Ties keep document order.
    fn ranked(&self, query: &[f32]) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored
    }

    pub fn similarity_search(&self, query: &[f32], k: usize) -> Vec<RetrievedChunk> {
        self.ranked(query)
            .into_iter()
            .take(k)
            .map(|(i, score)| self.retrieved(i, score))
            .collect()
    }

    pub fn mmr_search(
        &self,
        query: &[f32],
        k: usize,
        fetch_k: usize,
        lambda_mult: f32,
    ) -> Vec<RetrievedChunk> {
        let candidates: Vec<(usize, f32)> =
            self.ranked(query).into_iter().take(fetch_k.max(k)).collect();
        let mut selected: Vec<(usize, f32)> = Vec::with_capacity(k);
        let mut remaining = candidates;

        while selected.len() < k && !remaining.is_empty() {
            let mut best_pos = 0;
            let mut best_score = f32::NEG_INFINITY;
            for (pos, &(idx, relevance)) in remaining.iter().enumerate() {
                let redundancy = selected
                    .iter()
                    .map(|&(s, _)| {
                        cosine_similarity(&self.entries[idx].vector, &self.entries[s].vector)
                    })
                    .fold(f32::NEG_INFINITY, f32::max);
                let redundancy = if selected.is_empty() { 0.0 } else { redundancy };
                let score = lambda_mult * relevance - (1.0 - lambda_mult) * redundancy;
                if score > best_score {
                    best_score = score;
                    best_pos = pos;
                }
            }
            selected.push(remaining.remove(best_pos));
        }

        selected
            .into_iter()
            .map(|(i, score)| self.retrieved(i, score))
            .collect()
    }

    fn retrieved(&self, i: usize, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk: self.entries[i].chunk.clone(),
            score,
        }
    }
}

/// Retrieval settings applied to an index.
#[derive(Debug, Clone, Copy)]
pub struct Retriever {
    pub search_type: SearchType,
    pub k: usize,
    pub fetch_k: usize,
    pub lambda_mult: f32,
}

impl Retriever {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            search_type: config.search_type,
            k: config.k,
            fetch_k: config.fetch_k,
            lambda_mult: config.lambda_mult,
        }
    }

    /// At most `k` chunks for the query vector.
    pub fn retrieve(&self, index: &VectorIndex, query: &[f32]) -> Vec<RetrievedChunk> {
        let mut hits = match self.search_type {
            SearchType::Similarity => index.similarity_search(query, self.k),
            SearchType::Mmr => index.mmr_search(query, self.k, self.fetch_k, self.lambda_mult),
        };
        hits.truncate(self.k);
        hits
    }
}

/// An uploaded PDF, chunked and indexed, held in a page session.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub file_name: String,
    pub pages: usize,
    pub index: VectorIndex,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn chunk(i: usize, text: &str) -> Chunk {
        Chunk {
            chunk_index: i,
            page: Some(i + 1),
            text: text.to_string(),
            hash: String::new(),
        }
    }

    fn index(vectors: Vec<Vec<f32>>) -> VectorIndex {
        let chunks = (0..vectors.len()).map(|i| chunk(i, &format!("c{}", i))).collect();
        VectorIndex::from_vectors(chunks, vectors, "test")
    }

    #[test]
    fn test_similarity_orders_by_score() {
        let idx = index(vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]]);
        let hits = idx.similarity_search(&[1.0, 0.0], 2);
        let order: Vec<usize> = hits.iter().map(|h| h.chunk.chunk_index).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn test_k_larger_than_index() {
        let idx = index(vec![vec![1.0, 0.0]]);
        assert_eq!(idx.similarity_search(&[1.0, 0.0], 5).len(), 1);
        assert_eq!(idx.mmr_search(&[1.0, 0.0], 5, 20, 0.5).len(), 1);
    }

    #[test]
    fn test_mmr_prefers_diverse_results() {
        // Two near-duplicates close to the query and one distinct chunk.
        let idx = index(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.99, 0.01, 0.0],
            vec![0.6, 0.0, 0.8],
        ]);
        let query = [1.0, 0.0, 0.1];

        let plain: Vec<usize> = idx
            .similarity_search(&query, 2)
            .iter()
            .map(|h| h.chunk.chunk_index)
            .collect();
        assert_eq!(plain, vec![0, 1]);

        let diverse: Vec<usize> = idx
            .mmr_search(&query, 2, 3, 0.5)
            .iter()
            .map(|h| h.chunk.chunk_index)
            .collect();
        assert_eq!(diverse, vec![0, 2]);
    }

    #[test]
    fn test_mmr_lambda_one_is_similarity() {
        let idx = index(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.99, 0.01, 0.0],
            vec![0.6, 0.0, 0.8],
        ]);
        let query = [1.0, 0.0, 0.1];
        let a: Vec<usize> = idx.mmr_search(&query, 2, 3, 1.0).iter().map(|h| h.chunk.chunk_index).collect();
        let b: Vec<usize> = idx.similarity_search(&query, 2).iter().map(|h| h.chunk.chunk_index).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_retriever_caps_at_k() {
        let idx = index((0..10).map(|i| vec![1.0, i as f32]).collect());
        let retriever = Retriever {
            search_type: SearchType::Mmr,
            k: 3,
            fetch_k: 8,
            lambda_mult: 0.5,
        };
        assert_eq!(retriever.retrieve(&idx, &[1.0, 0.0]).len(), 3);
    }

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0]])
        }
    }

    #[tokio::test]
    async fn test_build_rejects_vector_count_mismatch() {
        let chunks = vec![chunk(0, "a"), chunk(1, "b")];
        let err = VectorIndex::build(chunks, &ShortEmbedder).await.unwrap_err();
        assert!(err.to_string().contains("1 vectors for 2 chunks"));
    }
}
