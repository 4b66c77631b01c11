//! Corpus-QA: Retrieval-Augmented Question Answering over a Fixed Corpus
//!
//! This crate answers natural-language questions about a document corpus
//! by combining semantic retrieval with grounded answer generation. The
//! entire public contract is one call: `ask(query)` returns an answer and
//! the citation records it was grounded on.
//!
//! # Quick Start
//!
//! ```rust
//! use corpus_qa::{
//!     embed::HashEmbedder,
//!     generate::MockGenerator,
//!     pipeline::RagPipelineBuilder,
//!     retrieve::RetrieverConfig,
//!     SourceDocument,
//! };
//!
//! # fn main() -> corpus_qa::Result<()> {
//! let corpus = vec![SourceDocument::new(
//!     "S1",
//!     "Policy",
//!     "Employees must disclose conflicts of interest annually.",
//! )];
//!
//! // Build once: chunk, embed, index
//! let pipeline = RagPipelineBuilder::new()
//!     .embedder(HashEmbedder::new(64))
//!     .generator(MockGenerator::default())
//!     .retriever_config(RetrieverConfig {
//!         score_threshold: 0.0,
//!         ..Default::default()
//!     })
//!     .build(&corpus)?;
//!
//! // Query many times, read-only
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .enable_time()
//!     .build()?;
//! let answer = runtime.block_on(
//!     pipeline.ask("Employees must disclose conflicts of interest annually."),
//! )?;
//!
//! assert!(!answer.text.is_empty());
//! assert_eq!(answer.sources[0].section_id, "S1");
//! # Ok(())
//! # }
//! ```
//!
//! # Components
//!
//! - [`TextChunker`] - splits documents into bounded, overlapping segments
//!   with deterministic ids
//! - [`Embedder`] implementations - [`HashEmbedder`] (tests),
//!   [`TfIdfEmbedder`] (no downloads), `SemanticEmbedder` (feature
//!   `embeddings`)
//! - [`VectorIndex`] - build-once, query-many nearest-neighbour search
//! - [`Retriever`] - thresholded, section-deduplicated top-k retrieval
//! - [`PromptAssembler`] - bounded, source-tagged grounding prompt
//! - [`AnswerGenerator`] implementations - [`GeminiGenerator`] (HTTP),
//!   [`MockGenerator`] (offline)
//! - [`RagPipeline`] - the orchestrator exposing `ask`

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]

pub mod chunk;
pub mod embed;
pub mod error;
pub mod generate;
pub mod index;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;

pub use chunk::{Chunk, ChunkId, Chunker, TextChunker};
pub use embed::{cosine_similarity, Embedder, EmbeddingConfig, HashEmbedder, TfIdfEmbedder};
#[cfg(feature = "embeddings")]
pub use embed::{SemanticEmbedder, SemanticModelType};
pub use error::{Error, GenerationError, Result};
pub use generate::{AnswerGenerator, GeminiGenerator, MockGenerator, RetryPolicy};
pub use index::{DistanceMetric, VectorIndex, VectorIndexConfig};
pub use pipeline::{Answer, RagPipeline, RagPipelineBuilder, Source};
pub use prompt::{PromptAssembler, PromptConfig};
pub use retrieve::{RetrievalDiagnostics, Retriever, RetrieverConfig, SearchResult};

use serde::{Deserialize, Serialize};

/// A document supplied for ingestion: a titled section of raw text.
///
/// Queries themselves are ephemeral `&str` values; only documents (and
/// the chunks derived from them) have persistent identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Identifier of the section this document belongs to
    pub section_id: String,
    /// Document title
    pub title: String,
    /// Raw document text
    pub raw_text: String,
}

impl SourceDocument {
    /// Create a new source document
    #[must_use]
    pub fn new(
        section_id: impl Into<String>,
        title: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            section_id: section_id.into(),
            title: title.into(),
            raw_text: raw_text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_document_creation() {
        let doc = SourceDocument::new("S1", "Policy", "Document text.");
        assert_eq!(doc.section_id, "S1");
        assert_eq!(doc.title, "Policy");
        assert_eq!(doc.raw_text, "Document text.");
    }

    #[test]
    fn test_source_document_serialization() {
        let doc = SourceDocument::new("S1", "Policy", "Document text.");
        let json = serde_json::to_string(&doc).unwrap();
        let deserialized: SourceDocument = serde_json::from_str(&json).unwrap();

        assert_eq!(doc.section_id, deserialized.section_id);
        assert_eq!(doc.title, deserialized.title);
        assert_eq!(doc.raw_text, deserialized.raw_text);
    }
}
