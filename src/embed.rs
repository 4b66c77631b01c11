//! Embedding generation for corpus indexing and query matching

use crate::{Chunk, Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration shared by embedder implementations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Normalize embeddings to unit length
    pub normalize: bool,
    /// Instruction prefix for queries (asymmetric retrieval)
    pub query_prefix: Option<String>,
    /// Instruction prefix for documents
    pub document_prefix: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            normalize: true,
            query_prefix: None,
            document_prefix: None,
        }
    }
}

/// Trait for embedding generation.
///
/// Implementations must be deterministic for a fixed model: the same text
/// always maps to the same vector, which keeps a built index reproducible.
pub trait Embedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch embed multiple texts
    fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Embedding dimension, fixed per model
    fn dimension(&self) -> usize;

    /// Model identifier; an index is bound to this identity
    fn model_id(&self) -> &str;

    /// Embed a query (may apply a query prefix)
    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(query)
    }

    /// Embed chunks and update them in place
    fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<()> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embed_many(&texts)?;

        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.set_embedding(embedding);
        }

        Ok(())
    }
}

fn reject_blank(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::InvalidInput(
            "cannot embed empty or whitespace-only text".to_string(),
        ));
    }
    Ok(())
}

/// Deterministic hash-projection embedder for tests and offline demos
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    model_id: String,
    config: EmbeddingConfig,
}

impl HashEmbedder {
    /// Create a new hash embedder with the given dimension
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: "hash-embedder".to_string(),
            config: EmbeddingConfig::default(),
        }
    }

    /// Set the model ID
    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Set configuration
    #[must_use]
    pub fn with_config(mut self, config: EmbeddingConfig) -> Self {
        self.config = config;
        self
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vector = Vec::with_capacity(self.dimension);
        let mut hasher = DefaultHasher::new();

        for i in 0..self.dimension {
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let hash = hasher.finish();
            // Map hash to [-1, 1]
            let value = (hash as f32 / u64::MAX as f32) * 2.0 - 1.0;
            vector.push(value);
        }

        if self.config.normalize {
            normalize_in_place(&mut vector);
        }

        vector
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        reject_blank(text)?;

        let prefixed = match &self.config.document_prefix {
            Some(prefix) => format!("{prefix}{text}"),
            None => text.to_string(),
        };

        Ok(self.hash_to_vector(&prefixed))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        reject_blank(query)?;

        let prefixed = match &self.config.query_prefix {
            Some(prefix) => format!("{prefix}{query}"),
            None => query.to_string(),
        };

        Ok(self.hash_to_vector(&prefixed))
    }
}

/// TF-IDF embedder trained on the corpus; no model downloads required
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfIdfEmbedder {
    dimension: usize,
    vocabulary: std::collections::HashMap<String, usize>,
    idf: Vec<f32>,
}

impl TfIdfEmbedder {
    /// Create an untrained TF-IDF embedder
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vocabulary: std::collections::HashMap::new(),
            idf: Vec::new(),
        }
    }

    /// Train the vocabulary and IDF weights on a corpus
    pub fn fit(&mut self, documents: &[&str]) {
        use std::collections::{HashMap, HashSet};

        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let terms: HashSet<String> = doc.split_whitespace().map(str::to_lowercase).collect();
            for term in terms {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        // Vocabulary: top terms by document frequency, ties broken
        // alphabetically so training is order-independent
        let mut terms: Vec<String> = doc_freq.keys().cloned().collect();
        terms.sort_by(|a, b| {
            doc_freq[b]
                .cmp(&doc_freq[a])
                .then_with(|| a.cmp(b))
        });
        terms.truncate(self.dimension);

        self.vocabulary = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();

        let n = documents.len() as f32;
        self.idf = terms
            .iter()
            .map(|t| {
                let df = doc_freq.get(t).copied().unwrap_or(1) as f32;
                (n / df).ln() + 1.0
            })
            .collect();
    }

    /// Whether the embedder has been trained
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        !self.vocabulary.is_empty()
    }

    fn compute_tf(&self, text: &str) -> Vec<f32> {
        let mut tf = vec![0.0f32; self.dimension];
        let terms: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
        let total = terms.len() as f32;

        for term in terms {
            if let Some(&idx) = self.vocabulary.get(&term) {
                tf[idx] += 1.0 / total;
            }
        }

        tf
    }
}

impl Embedder for TfIdfEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        reject_blank(text)?;

        if self.vocabulary.is_empty() {
            return Err(Error::Configuration(
                "tf-idf embedder has not been fitted".to_string(),
            ));
        }

        let tf = self.compute_tf(text);
        let mut tfidf: Vec<f32> = tf.iter().zip(self.idf.iter()).map(|(t, i)| t * i).collect();
        tfidf.resize(self.dimension, 0.0);
        normalize_in_place(&mut tfidf);

        Ok(tfidf)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "tfidf"
    }
}

fn normalize_in_place(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Compute cosine similarity between two vectors
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Compute dot product between two vectors
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

// ============================================================================
// Semantic embedder (sentence-transformer models via fastembed)
// ============================================================================

/// Available sentence-embedding models when the `embeddings` feature is enabled
#[cfg(feature = "embeddings")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticModelType {
    /// all-MiniLM-L6-v2: fast, good quality (384 dims)
    AllMiniLmL6V2,
    /// BGE-small-en-v1.5: balanced (384 dims)
    BgeSmallEnV15,
    /// BGE-base-en-v1.5: higher quality (768 dims)
    BgeBaseEnV15,
}

#[cfg(feature = "embeddings")]
impl Default for SemanticModelType {
    fn default() -> Self {
        Self::AllMiniLmL6V2
    }
}

#[cfg(feature = "embeddings")]
impl SemanticModelType {
    fn to_fastembed_model(self) -> fastembed::EmbeddingModel {
        match self {
            Self::AllMiniLmL6V2 => fastembed::EmbeddingModel::AllMiniLML6V2,
            Self::BgeSmallEnV15 => fastembed::EmbeddingModel::BGESmallENV15,
            Self::BgeBaseEnV15 => fastembed::EmbeddingModel::BGEBaseENV15,
        }
    }

    /// Embedding dimension for this model
    #[must_use]
    pub const fn dimension(self) -> usize {
        match self {
            Self::AllMiniLmL6V2 | Self::BgeSmallEnV15 => 384,
            Self::BgeBaseEnV15 => 768,
        }
    }

    /// Canonical model name, used as the embedder identity
    #[must_use]
    pub const fn model_name(self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "sentence-transformers/all-MiniLM-L6-v2",
            Self::BgeSmallEnV15 => "BAAI/bge-small-en-v1.5",
            Self::BgeBaseEnV15 => "BAAI/bge-base-en-v1.5",
        }
    }
}

/// Semantic embedder backed by fastembed (ONNX Runtime).
///
/// Requires the `embeddings` feature. Downloads the model on first use if
/// not cached.
#[cfg(feature = "embeddings")]
pub struct SemanticEmbedder {
    model: fastembed::TextEmbedding,
    model_type: SemanticModelType,
}

#[cfg(feature = "embeddings")]
impl std::fmt::Debug for SemanticEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticEmbedder")
            .field("model_type", &self.model_type)
            .field("dimension", &self.model_type.dimension())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "embeddings")]
impl SemanticEmbedder {
    /// Create a new semantic embedder with the specified model
    ///
    /// # Errors
    /// Returns an error if model initialization fails.
    pub fn new(model_type: SemanticModelType) -> Result<Self> {
        let options = fastembed::InitOptions::new(model_type.to_fastembed_model())
            .with_show_download_progress(true);

        let model = fastembed::TextEmbedding::try_new(options).map_err(|e| {
            Error::Configuration(format!("failed to initialize embedding model: {e}"))
        })?;

        Ok(Self { model, model_type })
    }

    /// Create with the default model (all-MiniLM-L6-v2)
    ///
    /// # Errors
    /// Returns an error if model initialization fails.
    pub fn default_model() -> Result<Self> {
        Self::new(SemanticModelType::default())
    }

    /// Get the model type
    #[must_use]
    pub fn model_type(&self) -> SemanticModelType {
        self.model_type
    }
}

#[cfg(feature = "embeddings")]
impl Embedder for SemanticEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        reject_blank(text)?;

        let embeddings = self
            .model
            .embed(vec![text], None)
            .map_err(|e| Error::Configuration(format!("embedding failed: {e}")))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Configuration("no embedding returned".to_string()))
    }

    fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            reject_blank(text)?;
        }

        self.model
            .embed(texts.to_vec(), None)
            .map_err(|e| Error::Configuration(format!("batch embedding failed: {e}")))
    }

    fn dimension(&self) -> usize {
        self.model_type.dimension()
    }

    fn model_id(&self) -> &str {
        self.model_type.model_name()
    }
}
