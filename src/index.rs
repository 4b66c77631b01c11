//! Vector index: build-once, query-many nearest-neighbour search

use crate::embed::{cosine_similarity, dot_product, Embedder};
use crate::{Chunk, ChunkId, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Similarity metric for vector search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Cosine similarity
    #[default]
    Cosine,
    /// Inner product
    DotProduct,
}

/// Vector index configuration.
///
/// `embedder_id` binds the index to a single embedder identity; mixing
/// embedding spaces would silently corrupt similarity scores, so identity
/// and dimensionality are enforced at build and load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    /// Embedding dimension every stored vector must match
    pub dimension: usize,
    /// Similarity metric
    pub metric: DistanceMetric,
    /// Identity of the embedder that produced the stored vectors
    pub embedder_id: String,
}

impl VectorIndexConfig {
    /// Create a configuration for the given dimension and embedder identity
    #[must_use]
    pub fn new(dimension: usize, embedder_id: impl Into<String>) -> Self {
        Self {
            dimension,
            metric: DistanceMetric::default(),
            embedder_id: embedder_id.into(),
        }
    }

    /// Derive a configuration from an embedder
    #[must_use]
    pub fn for_embedder<E: Embedder + ?Sized>(embedder: &E) -> Self {
        Self::new(embedder.dimension(), embedder.model_id())
    }

    /// Set the similarity metric
    #[must_use]
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }
}

/// Index lifecycle: `Empty` until a successful build, `Ready` afterwards.
/// A failed build poisons the instance; a fresh instance is required to
/// rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexState {
    Empty,
    Ready,
    Poisoned,
}

/// Serialized form of a built index
#[derive(Serialize, Deserialize)]
struct IndexSnapshot {
    dimension: usize,
    metric: DistanceMetric,
    embedder_id: String,
    chunks: Vec<Chunk>,
}

/// Dense vector index over embedded chunks.
///
/// Append-only during `build`, frozen afterwards: `search` takes `&self`
/// and never mutates stored data, so a built index is safe to share
/// read-only across threads.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    config: VectorIndexConfig,
    /// Chunks in insertion order; order is the deterministic tie-break
    chunks: Vec<Chunk>,
    ids: HashMap<ChunkId, usize>,
    state: IndexState,
}

impl VectorIndex {
    /// Create an empty index
    #[must_use]
    pub fn new(config: VectorIndexConfig) -> Self {
        Self {
            config,
            chunks: Vec::new(),
            ids: HashMap::new(),
            state: IndexState::Empty,
        }
    }

    /// Create an empty index bound to the given embedder's identity
    #[must_use]
    pub fn for_embedder<E: Embedder + ?Sized>(embedder: &E) -> Self {
        Self::new(VectorIndexConfig::for_embedder(embedder))
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &VectorIndexConfig {
        &self.config
    }

    /// Identity of the embedder this index is bound to
    #[must_use]
    pub fn embedder_id(&self) -> &str {
        &self.config.embedder_id
    }

    /// Whether the index has completed its build and is serving queries
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == IndexState::Ready
    }

    /// Consume all chunks and construct the searchable structure.
    ///
    /// Callable exactly once per instance. Every chunk must carry an
    /// embedding of the configured dimension and a unique id; any
    /// violation aborts the build and leaves the instance unusable - a
    /// build either fully succeeds or yields no queryable index.
    pub fn build(&mut self, chunks: Vec<Chunk>) -> Result<()> {
        match self.state {
            IndexState::Empty => {}
            IndexState::Ready => {
                return Err(Error::Configuration(
                    "index already built; rebuilding requires a fresh instance".to_string(),
                ))
            }
            IndexState::Poisoned => {
                return Err(Error::Configuration(
                    "index build previously failed; construct a fresh instance".to_string(),
                ))
            }
        }

        if let Err(e) = self.validate_chunks(&chunks) {
            self.state = IndexState::Poisoned;
            return Err(e);
        }

        self.ids = chunks
            .iter()
            .enumerate()
            .map(|(idx, chunk)| (chunk.id, idx))
            .collect();
        self.chunks = chunks;
        self.state = IndexState::Ready;

        tracing::info!(
            chunks = self.chunks.len(),
            dimension = self.config.dimension,
            embedder = %self.config.embedder_id,
            "vector index built"
        );

        Ok(())
    }

    fn validate_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut seen = std::collections::HashSet::with_capacity(chunks.len());

        for chunk in chunks {
            let embedding = chunk.embedding.as_ref().ok_or_else(|| {
                Error::Configuration(format!("chunk {} has no embedding", chunk.id))
            })?;

            if embedding.len() != self.config.dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.config.dimension,
                    actual: embedding.len(),
                });
            }

            if !seen.insert(chunk.id) {
                return Err(Error::Configuration(format!(
                    "duplicate chunk id {} in build input",
                    chunk.id
                )));
            }
        }

        Ok(())
    }

    /// Return at most `k` chunks ordered by descending similarity.
    ///
    /// Equal scores resolve by chunk insertion order, deterministically
    /// across repeated identical queries. `k` larger than the corpus
    /// returns all chunks.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<(ChunkId, f32)>> {
        if self.state != IndexState::Ready {
            return Err(Error::NotBuilt);
        }

        if k == 0 {
            return Err(Error::InvalidInput("k must be a positive integer".to_string()));
        }

        if query_vector.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                actual: query_vector.len(),
            });
        }

        let mut scores: Vec<(ChunkId, f32)> = self
            .chunks
            .iter()
            .map(|chunk| {
                let embedding = chunk.embedding.as_deref().unwrap_or(&[]);
                let score = match self.config.metric {
                    DistanceMetric::Cosine => cosine_similarity(query_vector, embedding),
                    DistanceMetric::DotProduct => dot_product(query_vector, embedding),
                };
                (chunk.id, score)
            })
            .collect();

        // Stable sort keeps insertion order for equal scores
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(k);

        Ok(scores)
    }

    /// Get a chunk by ID
    #[must_use]
    pub fn get(&self, chunk_id: ChunkId) -> Option<&Chunk> {
        self.ids.get(&chunk_id).map(|&idx| &self.chunks[idx])
    }

    /// Chunks in insertion order
    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of indexed chunks
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of distinct sections represented in the index
    #[must_use]
    pub fn section_count(&self) -> usize {
        self.chunks
            .iter()
            .map(|c| c.section_id.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len()
    }

    /// Persist the built index as a JSON snapshot
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if self.state != IndexState::Ready {
            return Err(Error::NotBuilt);
        }

        let snapshot = IndexSnapshot {
            dimension: self.config.dimension,
            metric: self.config.metric,
            embedder_id: self.config.embedder_id.clone(),
            chunks: self.chunks.clone(),
        };

        let json = serde_json::to_string(&snapshot)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a persisted index snapshot; the result is `Ready`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let snapshot: IndexSnapshot = serde_json::from_str(&json)?;

        let config = VectorIndexConfig {
            dimension: snapshot.dimension,
            metric: snapshot.metric,
            embedder_id: snapshot.embedder_id,
        };

        let mut index = Self::new(config);
        index.build(snapshot.chunks)?;
        Ok(index)
    }

    /// Load a persisted index and validate it against the active embedder.
    ///
    /// Fails with a configuration error before any query is served when
    /// the snapshot was produced by a different embedder identity or
    /// dimensionality.
    pub fn load_validated<E: Embedder + ?Sized>(
        path: impl AsRef<Path>,
        embedder: &E,
    ) -> Result<Self> {
        let index = Self::load(path)?;

        if index.config.embedder_id != embedder.model_id() {
            return Err(Error::Configuration(format!(
                "persisted index was built with embedder '{}', active embedder is '{}'",
                index.config.embedder_id,
                embedder.model_id()
            )));
        }

        if index.config.dimension != embedder.dimension() {
            return Err(Error::DimensionMismatch {
                expected: index.config.dimension,
                actual: embedder.dimension(),
            });
        }

        Ok(index)
    }
}
