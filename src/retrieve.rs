//! Top-K similarity retrieval over the in-memory index.
//!
//! The query is embedded with the same provider that built the index —
//! that invariant is enforced twice: the snapshot refuses to load under a
//! different model, and the query vector's dimensionality is checked here
//! before scoring.
//!
//! Scoring is cosine similarity over every record, sorted descending with a
//! stable sort, so equal scores keep the index's insertion order.

use std::sync::Arc;

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::index::{Index, IndexError};
use crate::models::ScoredChunk;

pub struct Retriever {
    index: Arc<Index>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(index: Arc<Index>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { index, provider }
    }

    /// Return the `k` most similar chunks, most similar first.
    ///
    /// `k` greater than the index size returns everything; an empty index
    /// returns an empty list (never an error).
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if self.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self
            .provider
            .embed_query(query)
            .await
            .map_err(|e| IndexError::Embedding(e.to_string()))?;

        if query_vec.len() != self.index.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.index.dims,
                actual: query_vec.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .index
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| (i, cosine_similarity(&query_vec, &record.vector)))
            .collect();

        // Stable sort: ties keep insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(rank, (i, score))| ScoredChunk {
                chunk: self.index.records[i].chunk.clone(),
                score,
                rank: rank + 1,
            })
            .collect())
    }
}
