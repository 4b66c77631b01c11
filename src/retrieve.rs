//! Query-time retrieval: embed, search, filter, rank

use crate::embed::Embedder;
use crate::index::VectorIndex;
use crate::{Chunk, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A relevance-ranked chunk returned by retrieval; a transient projection
/// over the index, never stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk
    pub chunk: Chunk,
    /// Similarity score against the query
    pub score: f32,
}

/// Configuration for retrieval filtering.
///
/// Defaults: `top_k` 5, `score_threshold` 0.25, at most 2 chunks per
/// section, 4x candidate over-fetch. The threshold and section cap
/// materially affect retrieval quality; tune them per corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Default number of results when the caller does not specify `k`
    pub top_k: usize,
    /// Minimum similarity a result must reach to be returned
    pub score_threshold: f32,
    /// Cap on chunks returned from a single section; `None` disables
    /// deduplication
    pub max_per_section: Option<usize>,
    /// Over-fetch multiplier applied before filtering, so thresholding
    /// and section capping still leave `k` candidates
    pub candidate_factor: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            score_threshold: 0.25,
            max_per_section: Some(2),
            candidate_factor: 4,
        }
    }
}

/// Counts of candidates dropped during retrieval filtering.
///
/// A diagnostic side channel, kept separate from the primary result
/// contract.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RetrievalDiagnostics {
    /// Candidates returned by the index before filtering
    pub candidates: usize,
    /// Candidates dropped for scoring below the threshold
    pub below_threshold: usize,
    /// Candidates dropped by the per-section cap
    pub section_capped: usize,
}

/// Retriever: orchestrates embedder and vector index for a query.
///
/// Holds the index behind an `Arc`, read-only; a retriever is `Send +
/// Sync` and serves concurrent queries without locking.
pub struct Retriever<E: Embedder> {
    index: Arc<VectorIndex>,
    embedder: E,
    config: RetrieverConfig,
}

impl<E: Embedder> Retriever<E> {
    /// Create a retriever over a built index
    #[must_use]
    pub fn new(index: Arc<VectorIndex>, embedder: E) -> Self {
        Self {
            index,
            embedder,
            config: RetrieverConfig::default(),
        }
    }

    /// Set the configuration
    #[must_use]
    pub fn with_config(mut self, config: RetrieverConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// The index this retriever searches
    #[must_use]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// The embedder used for queries
    #[must_use]
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Retrieve the most relevant chunks for a query.
    ///
    /// Returns at most `k` results ordered by descending score, none of
    /// them below the configured threshold. An empty result is a valid
    /// outcome, not an error: it means no chunk cleared the threshold.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let (results, _) = self.retrieve_with_diagnostics(query, k)?;
        Ok(results)
    }

    /// Retrieve with filtering diagnostics alongside the results
    pub fn retrieve_with_diagnostics(
        &self,
        query: &str,
        k: usize,
    ) -> Result<(Vec<SearchResult>, RetrievalDiagnostics)> {
        let query_vector = self.embedder.embed_query(query)?;

        let fetch = k.saturating_mul(self.config.candidate_factor).max(k);
        let hits = self.index.search(&query_vector, fetch)?;

        let mut diagnostics = RetrievalDiagnostics {
            candidates: hits.len(),
            ..Default::default()
        };

        let mut per_section: HashMap<String, usize> = HashMap::new();
        let mut results = Vec::with_capacity(k.min(hits.len()));

        for (chunk_id, score) in hits {
            if results.len() == k {
                break;
            }

            if score < self.config.score_threshold {
                diagnostics.below_threshold += 1;
                continue;
            }

            let Some(chunk) = self.index.get(chunk_id) else {
                continue;
            };

            if let Some(cap) = self.config.max_per_section {
                let count = per_section.entry(chunk.section_id.clone()).or_insert(0);
                if *count >= cap {
                    diagnostics.section_capped += 1;
                    continue;
                }
                *count += 1;
            }

            results.push(SearchResult {
                chunk: chunk.clone(),
                score,
            });
        }

        tracing::debug!(
            query_len = query.len(),
            returned = results.len(),
            below_threshold = diagnostics.below_threshold,
            section_capped = diagnostics.section_capped,
            "retrieval complete"
        );

        Ok((results, diagnostics))
    }
}
