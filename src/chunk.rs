//! Document chunking for the retrieval pipeline

use crate::{Error, Result, SourceDocument};
use serde::{Deserialize, Serialize};

/// Namespace for deriving deterministic chunk ids
const CHUNK_ID_NAMESPACE: uuid::Uuid = uuid::Uuid::from_bytes([
    0x6b, 0xa7, 0xb8, 0x14, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30,
    0xc8,
]);

/// Unique chunk identifier, derived deterministically from the chunk's
/// position in its source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub uuid::Uuid);

impl ChunkId {
    /// Derive a chunk id from section identity and chunk position.
    ///
    /// Re-ingesting unchanged text yields identical ids.
    #[must_use]
    pub fn derive(section_id: &str, ordinal: usize, start_offset: usize) -> Self {
        let name = format!("{section_id}\u{1f}{ordinal}\u{1f}{start_offset}");
        Self(uuid::Uuid::new_v5(&CHUNK_ID_NAMESPACE, name.as_bytes()))
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bounded segment of source text, the unit of retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identifier
    pub id: ChunkId,
    /// Identifier of the source section
    pub section_id: String,
    /// Title of the source document
    pub title: String,
    /// Chunk text content
    pub text: String,
    /// Character offset in the source document (start)
    pub start_offset: usize,
    /// Character offset in the source document (end)
    pub end_offset: usize,
    /// Embedding vector (populated by the embedder before indexing)
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// Create a new chunk with a derived id
    #[must_use]
    pub fn new(
        document: &SourceDocument,
        ordinal: usize,
        text: String,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Self {
            id: ChunkId::derive(&document.section_id, ordinal, start_offset),
            section_id: document.section_id.clone(),
            title: document.title.clone(),
            text,
            start_offset,
            end_offset,
            embedding: None,
        }
    }

    /// Length of the chunk text in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the chunk text is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Set the embedding vector
    pub fn set_embedding(&mut self, embedding: Vec<f32>) {
        self.embedding = Some(embedding);
    }
}

/// Trait for document chunkers
pub trait Chunker: Send + Sync {
    /// Split a document into chunks
    fn chunk(&self, document: &SourceDocument) -> Result<Vec<Chunk>>;

    /// Chunk an entire corpus, preserving per-document section identity
    fn chunk_corpus(&self, documents: &[SourceDocument]) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        for document in documents {
            chunks.extend(self.chunk(document)?);
        }
        Ok(chunks)
    }
}

/// Recursive text chunker: splits on paragraph, line, sentence, then word
/// boundaries until every segment fits the configured size, with optional
/// character overlap carried between consecutive segments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunker {
    separators: Vec<String>,
    chunk_size: usize,
    overlap: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(512, 64)
    }
}

impl TextChunker {
    /// Create a chunker with the given segment size and overlap, in characters
    #[must_use]
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                ". ".to_string(),
                " ".to_string(),
            ],
            chunk_size,
            overlap,
        }
    }

    /// Replace the separator hierarchy
    #[must_use]
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    /// Configured chunk size in characters
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Configured overlap in characters
    #[must_use]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn split_text(&self, text: &str, separator_idx: usize) -> Vec<String> {
        if text.chars().count() <= self.chunk_size {
            return vec![text.to_string()];
        }

        if separator_idx >= self.separators.len() {
            return self.split_by_chars(text);
        }

        let separator = &self.separators[separator_idx];
        let parts: Vec<&str> = text.split(separator.as_str()).collect();

        if parts.len() == 1 {
            // Separator not found, try the next one
            return self.split_text(text, separator_idx + 1);
        }

        self.merge_splits(&parts, separator, separator_idx)
    }

    fn merge_splits(&self, parts: &[&str], separator: &str, separator_idx: usize) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = String::new();

        for part in parts {
            let candidate = if current.is_empty() {
                (*part).to_string()
            } else {
                format!("{current}{separator}{part}")
            };

            if candidate.chars().count() <= self.chunk_size {
                current = candidate;
            } else if current.is_empty() {
                // Single part too large for the budget, recurse deeper
                segments.extend(self.split_text(part, separator_idx + 1));
            } else {
                segments.push(current);
                current = (*part).to_string();
            }
        }

        if !current.is_empty() {
            if current.chars().count() <= self.chunk_size {
                segments.push(current);
            } else {
                segments.extend(self.split_text(&current, separator_idx + 1));
            }
        }

        segments
    }

    fn split_by_chars(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut segments = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            segments.push(chars[start..end].iter().collect());

            if end >= chars.len() {
                break;
            }

            let step = self.chunk_size.saturating_sub(self.overlap);
            start += if step == 0 { 1 } else { step };
        }

        segments
    }

    /// Tail of `text` up to `n` characters, on char boundaries
    fn char_tail(text: &str, n: usize) -> &str {
        let count = text.chars().count();
        if count <= n {
            return text;
        }
        let skip = count - n;
        let byte_start = text
            .char_indices()
            .nth(skip)
            .map_or(0, |(idx, _)| idx);
        &text[byte_start..]
    }
}

impl Chunker for TextChunker {
    fn chunk(&self, document: &SourceDocument) -> Result<Vec<Chunk>> {
        if document.raw_text.trim().is_empty() {
            return Err(Error::Ingestion(format!(
                "document '{}' is empty",
                document.section_id
            )));
        }

        let segments = self.split_text(document.raw_text.trim(), 0);

        let mut chunks = Vec::with_capacity(segments.len());
        let mut cursor = 0usize;
        let mut previous: Option<&String> = None;

        for segment in &segments {
            if segment.trim().is_empty() {
                continue;
            }

            // Locate the segment in the source for stable offsets
            let start = document.raw_text[cursor..]
                .find(segment.as_str())
                .map_or(cursor, |pos| cursor + pos);
            let end = start + segment.len();

            let ordinal = chunks.len();
            let text = match previous {
                Some(prev) if self.overlap > 0 => {
                    let carry = Self::char_tail(prev, self.overlap);
                    format!("{carry} {segment}")
                }
                _ => segment.clone(),
            };

            chunks.push(Chunk::new(document, ordinal, text, start, end));
            // Advance one char past the segment start so overlapping
            // fallback segments remain findable
            cursor = (start
                + document.raw_text[start..]
                    .chars()
                    .next()
                    .map_or(1, char::len_utf8))
            .min(document.raw_text.len());
            previous = Some(segment);
        }

        if chunks.is_empty() {
            return Err(Error::Ingestion(format!(
                "document '{}' produced no chunks",
                document.section_id
            )));
        }

        Ok(chunks)
    }
}
