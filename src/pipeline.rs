//! RAG pipeline orchestration: the public `ask` contract

use crate::chunk::{ChunkId, Chunker, TextChunker};
use crate::embed::Embedder;
use crate::generate::{generate_with_retry, AnswerGenerator, RetryPolicy};
use crate::index::VectorIndex;
use crate::prompt::{PromptAssembler, PromptConfig};
use crate::retrieve::{RetrievalDiagnostics, Retriever, RetrieverConfig, SearchResult};
use crate::{Error, Result, SourceDocument};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Citation record for a chunk used to produce an answer; stripped of
/// embedding and full text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Identifier of the source section
    pub section_id: String,
    /// Title of the source document
    pub title: String,
    /// Identifier of the retrieved chunk
    pub chunk_id: ChunkId,
}

impl Source {
    /// Derive a citation record from a retrieval result
    #[must_use]
    pub fn from_result(result: &SearchResult) -> Self {
        Self {
            section_id: result.chunk.section_id.clone(),
            title: result.chunk.title.clone(),
            chunk_id: result.chunk.id,
        }
    }
}

/// A generated answer paired with the sources used to produce it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// Natural-language answer text
    pub text: String,
    /// Citation records in retrieval order
    pub sources: Vec<Source>,
}

/// Complete retrieval-augmented generation pipeline.
///
/// Built once over a corpus, then immutable: `ask` takes `&self`, shares
/// the frozen index read-only, and is safe to call concurrently from
/// multiple threads behind an `Arc`.
pub struct RagPipeline<E: Embedder, G: AnswerGenerator> {
    index: Arc<VectorIndex>,
    retriever: Retriever<E>,
    assembler: PromptAssembler,
    generator: G,
    retry_policy: RetryPolicy,
}

impl<E: Embedder, G: AnswerGenerator> RagPipeline<E, G> {
    /// Answer a question about the corpus.
    ///
    /// Sequences retrieval, prompt assembly, and generation, returning
    /// the answer text with citation records in retrieval order. A query
    /// with no relevant corpus content still yields an answer (stating
    /// that nothing relevant was found) with an empty source list.
    ///
    /// Retrieval is deterministic: identical queries against an unchanged
    /// index yield identical `sources`. The answer text itself may vary
    /// between calls when the backing model samples stochastically.
    ///
    /// Fails with `GenerationUnavailable` when the generation boundary
    /// exhausts its retry budget; no partial answer is returned.
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        let (answer, _) = self.ask_with_diagnostics(query).await?;
        Ok(answer)
    }

    /// Answer a question, also returning retrieval-filtering diagnostics.
    ///
    /// The diagnostics are a debugging side channel; the `sources`
    /// contract is unchanged.
    pub async fn ask_with_diagnostics(
        &self,
        query: &str,
    ) -> Result<(Answer, RetrievalDiagnostics)> {
        let top_k = self.retriever.config().top_k;
        let (results, diagnostics) = self.retriever.retrieve_with_diagnostics(query, top_k)?;

        let prompt = self.assembler.assemble(query, &results);
        let text = generate_with_retry(&self.generator, &prompt, &self.retry_policy).await?;

        let sources = results.iter().map(Source::from_result).collect();

        tracing::info!(
            sources = results.len(),
            answer_len = text.len(),
            "answered query"
        );

        Ok((Answer { text, sources }, diagnostics))
    }

    /// Retrieve without generating; useful for inspecting ranking
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.retriever.retrieve(query, k)
    }

    /// The frozen index served by this pipeline
    #[must_use]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Number of indexed chunks
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    /// Number of distinct sections in the corpus
    #[must_use]
    pub fn section_count(&self) -> usize {
        self.index.section_count()
    }

    /// The embedder used for queries
    #[must_use]
    pub fn embedder(&self) -> &E {
        self.retriever.embedder()
    }

    /// The generator answering queries
    #[must_use]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Persist the pipeline's index for later reuse
    pub fn save_index(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        self.index.save(path)
    }
}

/// Builder for [`RagPipeline`].
///
/// The corpus build happens inside [`build`](RagPipelineBuilder::build):
/// chunking, embedding, and index construction either fully succeed and
/// yield a query-ready pipeline, or fail and yield nothing - there is no
/// partially-built pipeline.
pub struct RagPipelineBuilder<E: Embedder, G: AnswerGenerator> {
    chunker: Option<Box<dyn Chunker>>,
    embedder: Option<E>,
    generator: Option<G>,
    retriever_config: RetrieverConfig,
    prompt_config: PromptConfig,
    retry_policy: RetryPolicy,
}

impl<E: Embedder, G: AnswerGenerator> RagPipelineBuilder<E, G> {
    /// Create a new pipeline builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunker: None,
            embedder: None,
            generator: None,
            retriever_config: RetrieverConfig::default(),
            prompt_config: PromptConfig::default(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Set the chunker (defaults to `TextChunker::default()`)
    #[must_use]
    pub fn chunker(mut self, chunker: impl Chunker + 'static) -> Self {
        self.chunker = Some(Box::new(chunker));
        self
    }

    /// Set the embedder (required)
    #[must_use]
    pub fn embedder(mut self, embedder: E) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the answer generator (required)
    #[must_use]
    pub fn generator(mut self, generator: G) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the retrieval configuration
    #[must_use]
    pub fn retriever_config(mut self, config: RetrieverConfig) -> Self {
        self.retriever_config = config;
        self
    }

    /// Set the prompt assembly configuration
    #[must_use]
    pub fn prompt_config(mut self, config: PromptConfig) -> Self {
        self.prompt_config = config;
        self
    }

    /// Set the generation retry policy
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Build the pipeline over a corpus: chunk, embed, and index every
    /// document, then freeze the index for serving.
    pub fn build(self, documents: &[SourceDocument]) -> Result<RagPipeline<E, G>> {
        let embedder = self
            .embedder
            .ok_or_else(|| Error::Configuration("embedder required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| Error::Configuration("generator required".to_string()))?;

        let chunker = self
            .chunker
            .unwrap_or_else(|| Box::new(TextChunker::default()));

        let mut chunks = chunker.chunk_corpus(documents)?;
        embedder.embed_chunks(&mut chunks)?;

        let mut index = VectorIndex::for_embedder(&embedder);
        index.build(chunks)?;

        tracing::info!(
            documents = documents.len(),
            chunks = index.len(),
            embedder = embedder.model_id(),
            "pipeline built"
        );

        let index = Arc::new(index);
        let retriever =
            Retriever::new(Arc::clone(&index), embedder).with_config(self.retriever_config);

        Ok(RagPipeline {
            index,
            retriever,
            assembler: PromptAssembler::new(self.prompt_config),
            generator,
            retry_policy: self.retry_policy,
        })
    }

    /// Build the pipeline over an already-built (e.g. loaded) index.
    ///
    /// The index must be ready and must match the active embedder's
    /// identity and dimensionality; a persisted index produced by a
    /// different embedder is rejected before any query is served.
    pub fn build_with_index(self, index: VectorIndex) -> Result<RagPipeline<E, G>> {
        let embedder = self
            .embedder
            .ok_or_else(|| Error::Configuration("embedder required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| Error::Configuration("generator required".to_string()))?;

        if !index.is_ready() {
            return Err(Error::NotBuilt);
        }

        if index.embedder_id() != embedder.model_id() {
            return Err(Error::Configuration(format!(
                "index was built with embedder '{}', active embedder is '{}'",
                index.embedder_id(),
                embedder.model_id()
            )));
        }

        if index.config().dimension != embedder.dimension() {
            return Err(Error::DimensionMismatch {
                expected: index.config().dimension,
                actual: embedder.dimension(),
            });
        }

        let index = Arc::new(index);
        let retriever =
            Retriever::new(Arc::clone(&index), embedder).with_config(self.retriever_config);

        Ok(RagPipeline {
            index,
            retriever,
            assembler: PromptAssembler::new(self.prompt_config),
            generator,
            retry_policy: self.retry_policy,
        })
    }
}

impl<E: Embedder, G: AnswerGenerator> Default for RagPipelineBuilder<E, G> {
    fn default() -> Self {
        Self::new()
    }
}
