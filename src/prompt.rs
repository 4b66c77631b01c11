//! Prompt assembly: bounded, source-tagged context for grounded generation

use crate::retrieve::SearchResult;
use serde::{Deserialize, Serialize};

/// Prompt assembly configuration.
///
/// Default context budget is 6000 characters, roughly 1500 tokens of
/// retrieved context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Maximum total characters of retrieved context included in a prompt
    pub max_context_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 6000,
        }
    }
}

/// Builds a generation prompt from a query and retrieved chunks.
///
/// Every context block carries an explicit source tag so the generated
/// answer can reference section, title, and chunk identity. When the
/// budget would be exceeded, the lowest-scored chunks are dropped first.
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    config: PromptConfig,
}

impl PromptAssembler {
    /// Create an assembler with the given configuration
    #[must_use]
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    /// Create an assembler with a specific context budget
    #[must_use]
    pub fn with_max_context_chars(max_context_chars: usize) -> Self {
        Self::new(PromptConfig { max_context_chars })
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &PromptConfig {
        &self.config
    }

    /// Format the source tag for a retrieved chunk
    #[must_use]
    pub fn source_tag(result: &SearchResult) -> String {
        format!(
            "[source: {} | {} | {}]",
            result.chunk.section_id, result.chunk.title, result.chunk.id
        )
    }

    /// Assemble the generation prompt.
    ///
    /// `results` must be in retrieval order (descending score). With no
    /// results, the prompt explicitly states that no relevant context was
    /// found and instructs the model to say so instead of inventing an
    /// answer.
    #[must_use]
    pub fn assemble(&self, query: &str, results: &[SearchResult]) -> String {
        if results.is_empty() {
            return self.assemble_empty(query);
        }

        let blocks = self.select_within_budget(results);
        let context = blocks.join("\n\n");

        format!(
            "You are a question-answering assistant for a document corpus. \
             Answer the question using only the context passages below. \
             Each passage is preceded by a source tag of the form \
             [source: section | title | chunk]; cite the tags of the \
             passages you rely on. If the context does not contain the \
             answer, say so plainly.\n\n\
             Context:\n{context}\n\n\
             Question: {query}\n\n\
             Answer:"
        )
    }

    fn assemble_empty(&self, query: &str) -> String {
        format!(
            "You are a question-answering assistant for a document corpus. \
             No relevant context was found in the corpus for this question. \
             State that the corpus does not contain the information needed \
             to answer; do not invent an answer or draw on outside \
             knowledge.\n\n\
             Question: {query}\n\n\
             Answer:"
        )
    }

    /// Keep the highest-scored blocks that fit the character budget,
    /// dropping lowest-scored chunks first, preserving retrieval order
    /// among the survivors
    fn select_within_budget(&self, results: &[SearchResult]) -> Vec<String> {
        let blocks: Vec<String> = results
            .iter()
            .map(|r| format!("{}\n{}", Self::source_tag(r), r.chunk.text))
            .collect();

        let mut keep = vec![true; blocks.len()];
        let mut total: usize = blocks.iter().map(String::len).sum();

        // Results arrive ranked descending, so the drop order is back to
        // front
        let mut drop_idx = blocks.len();
        while total > self.config.max_context_chars && drop_idx > 1 {
            drop_idx -= 1;
            keep[drop_idx] = false;
            total -= blocks[drop_idx].len();
        }

        let mut kept: Vec<String> = blocks
            .into_iter()
            .zip(keep)
            .filter_map(|(block, keep)| keep.then_some(block))
            .collect();

        // A lone surviving block may still exceed the budget; truncate on
        // a char boundary rather than overflow the window
        if let [only] = kept.as_mut_slice() {
            if only.len() > self.config.max_context_chars {
                let truncated: String = only.chars().take(self.config.max_context_chars).collect();
                *only = truncated;
            }
        }

        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Chunk, SourceDocument};

    fn result(section_id: &str, title: &str, text: &str, score: f32) -> SearchResult {
        let document = SourceDocument::new(section_id, title, text);
        let chunk = Chunk::new(&document, 0, text.to_string(), 0, text.len());
        SearchResult { chunk, score }
    }

    // ============ Config Tests ============

    #[test]
    fn test_prompt_config_default() {
        let config = PromptConfig::default();
        assert_eq!(config.max_context_chars, 6000);
    }

    #[test]
    fn test_assembler_with_budget() {
        let assembler = PromptAssembler::with_max_context_chars(1000);
        assert_eq!(assembler.config().max_context_chars, 1000);
    }

    // ============ Assembly Tests ============

    #[test]
    fn test_assemble_includes_source_tags() {
        let assembler = PromptAssembler::default();
        let results = vec![result(
            "S1",
            "Policy",
            "Employees must disclose conflicts of interest annually.",
            0.9,
        )];

        let prompt = assembler.assemble("What is the conflict of interest policy?", &results);

        assert!(prompt.contains("[source: S1 | Policy |"));
        assert!(prompt.contains("Employees must disclose conflicts of interest annually."));
        assert!(prompt.contains("What is the conflict of interest policy?"));
    }

    #[test]
    fn test_assemble_preserves_retrieval_order() {
        let assembler = PromptAssembler::default();
        let results = vec![
            result("S1", "First", "Top ranked passage.", 0.9),
            result("S2", "Second", "Second ranked passage.", 0.7),
        ];

        let prompt = assembler.assemble("question", &results);
        let first = prompt.find("Top ranked passage").unwrap();
        let second = prompt.find("Second ranked passage").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_assemble_drops_lowest_scored_first() {
        let assembler = PromptAssembler::with_max_context_chars(150);
        let results = vec![
            result("S1", "Keep", &"a".repeat(80), 0.9),
            result("S2", "Drop", &"b".repeat(80), 0.4),
        ];

        let prompt = assembler.assemble("question", &results);

        assert!(prompt.contains(&"a".repeat(80)));
        assert!(!prompt.contains(&"b".repeat(80)));
    }

    #[test]
    fn test_assemble_keeps_all_within_budget() {
        let assembler = PromptAssembler::with_max_context_chars(10_000);
        let results = vec![
            result("S1", "A", "First passage.", 0.9),
            result("S2", "B", "Second passage.", 0.8),
            result("S3", "C", "Third passage.", 0.7),
        ];

        let prompt = assembler.assemble("question", &results);
        assert!(prompt.contains("First passage."));
        assert!(prompt.contains("Second passage."));
        assert!(prompt.contains("Third passage."));
    }

    #[test]
    fn test_assemble_truncates_single_oversized_block() {
        let assembler = PromptAssembler::with_max_context_chars(100);
        let results = vec![result("S1", "Huge", &"x".repeat(500), 0.9)];

        let prompt = assembler.assemble("question", &results);

        // The block was truncated to the budget, not included whole
        assert!(!prompt.contains(&"x".repeat(200)));
        assert!(prompt.contains("Question: question"));
    }

    #[test]
    fn test_assemble_empty_results_prompt() {
        let assembler = PromptAssembler::default();
        let prompt = assembler.assemble("What about unicorns?", &[]);

        assert!(prompt.contains("No relevant context was found"));
        assert!(prompt.contains("do not invent an answer"));
        assert!(prompt.contains("What about unicorns?"));
        assert!(!prompt.contains("[source:"));
    }

    #[test]
    fn test_empty_prompt_differs_from_grounded_prompt() {
        let assembler = PromptAssembler::default();
        let grounded = assembler.assemble("q", &[result("S1", "T", "Some context.", 0.9)]);
        let empty = assembler.assemble("q", &[]);
        assert_ne!(grounded, empty);
    }

    #[test]
    fn test_source_tag_format() {
        let r = result("HR-2", "Handbook", "text", 0.5);
        let tag = PromptAssembler::source_tag(&r);

        assert!(tag.starts_with("[source: HR-2 | Handbook | "));
        assert!(tag.ends_with(']'));
    }

    // ============ Property-Based Tests ============

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_context_within_budget(
            n_results in 1usize..8,
            budget in 200usize..2000
        ) {
            let assembler = PromptAssembler::with_max_context_chars(budget);
            let results: Vec<SearchResult> = (0..n_results)
                .map(|i| {
                    result(
                        &format!("S{i}"),
                        "Title",
                        &"word ".repeat(30 + i * 10),
                        1.0 - i as f32 * 0.1,
                    )
                })
                .collect();

            let prompt = assembler.assemble("question", &results);

            // Context portion is bounded: the whole prompt minus the fixed
            // instruction scaffolding stays near the budget
            let scaffolding = assembler.assemble("question", &results[..1])
                .len()
                .saturating_sub(results[0].chunk.text.len());
            prop_assert!(prompt.len() <= budget + scaffolding + 200);
        }

        #[test]
        fn prop_query_always_present(query in "[a-zA-Z ?]{1,60}") {
            let assembler = PromptAssembler::default();
            let with_context = assembler.assemble(&query, &[result("S1", "T", "ctx", 0.9)]);
            let without_context = assembler.assemble(&query, &[]);

            prop_assert!(with_context.contains(query.as_str()));
            prop_assert!(without_context.contains(query.as_str()));
        }
    }
}
