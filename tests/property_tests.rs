//! Property-based tests for corpus-qa

use proptest::prelude::*;
use corpus_qa::{
    embed::{cosine_similarity, Embedder, HashEmbedder},
    Chunker, SourceDocument, TextChunker, VectorIndex,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_chunker_produces_valid_chunks(
        content in "[a-zA-Z ]{100,1000}",
        chunk_size in 50usize..200,
        overlap in 0usize..50
    ) {
        let overlap = overlap.min(chunk_size / 2);
        let chunker = TextChunker::new(chunk_size, overlap);
        let doc = SourceDocument::new("S1", "Title", &content);

        if let Ok(chunks) = chunker.chunk(&doc) {
            for chunk in &chunks {
                prop_assert!(!chunk.text.trim().is_empty());
                prop_assert_eq!(&chunk.section_id, "S1");
            }

            let ids: std::collections::HashSet<_> = chunks.iter().map(|c| c.id).collect();
            prop_assert_eq!(ids.len(), chunks.len());
        }
    }

    #[test]
    fn prop_reingestion_yields_identical_ids(
        content in "[a-zA-Z .]{50,400}"
    ) {
        let chunker = TextChunker::new(60, 10);
        let doc = SourceDocument::new("S1", "Title", &content);

        let first = chunker.chunk(&doc);
        let second = chunker.chunk(&doc);

        if let (Ok(a), Ok(b)) = (first, second) {
            prop_assert_eq!(a.len(), b.len());
            for (x, y) in a.iter().zip(b.iter()) {
                prop_assert_eq!(x.id, y.id);
            }
        }
    }

    #[test]
    fn prop_embedder_consistent_dimension(
        text in "[a-zA-Z ]{10,100}",
        dimension in 8usize..256
    ) {
        prop_assume!(!text.trim().is_empty());
        let embedder = HashEmbedder::new(dimension);
        let embedding = embedder.embed(&text).unwrap();
        prop_assert_eq!(embedding.len(), dimension);
    }

    #[test]
    fn prop_cosine_similarity_bounded(
        v1 in prop::collection::vec(-1.0f32..1.0, 16),
        v2 in prop::collection::vec(-1.0f32..1.0, 16)
    ) {
        let sim = cosine_similarity(&v1, &v2);
        prop_assert!((-1.1..=1.1).contains(&sim));
    }

    #[test]
    fn prop_index_search_bounded_and_sorted(
        texts in prop::collection::vec("[a-z]{5,30}", 1..15),
        k in 1usize..10
    ) {
        let embedder = HashEmbedder::new(16);
        let doc_texts: Vec<SourceDocument> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| SourceDocument::new(format!("S{i}"), "Title", t.clone()))
            .collect();

        let chunker = TextChunker::new(100, 0);
        let mut chunks = chunker.chunk_corpus(&doc_texts).unwrap();
        embedder.embed_chunks(&mut chunks).unwrap();
        let n = chunks.len();

        let mut index = VectorIndex::for_embedder(&embedder);
        index.build(chunks).unwrap();

        let query = embedder.embed("probe").unwrap();
        let results = index.search(&query, k).unwrap();

        prop_assert!(results.len() <= k.min(n));
        for window in results.windows(2) {
            prop_assert!(window[0].1 >= window[1].1);
        }
    }

    #[test]
    fn prop_document_preserves_content(content in "[a-zA-Z0-9 ]{1,500}") {
        let doc = SourceDocument::new("S1", "Title", &content);
        prop_assert_eq!(doc.raw_text, content);
    }
}

#[test]
fn test_identical_queries_identical_rankings() {
    let embedder = HashEmbedder::new(32);
    let corpus = vec![
        SourceDocument::new("S1", "A", "alpha beta gamma delta"),
        SourceDocument::new("S2", "B", "epsilon zeta eta theta"),
        SourceDocument::new("S3", "C", "iota kappa lambda mu"),
    ];

    let chunker = TextChunker::new(100, 0);
    let mut chunks = chunker.chunk_corpus(&corpus).unwrap();
    embedder.embed_chunks(&mut chunks).unwrap();

    let mut index = VectorIndex::for_embedder(&embedder);
    index.build(chunks).unwrap();

    let query = embedder.embed("alpha beta").unwrap();
    let first = index.search(&query, 3).unwrap();

    for _ in 0..10 {
        let again = index.search(&query, 3).unwrap();
        assert_eq!(first, again);
    }
}
