//! Benchmarks for indexing and retrieval operations

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::sync::Arc;

use corpus_qa::{
    embed::{Embedder, HashEmbedder},
    prompt::PromptAssembler,
    retrieve::{Retriever, RetrieverConfig},
    Chunker, SourceDocument, TextChunker, VectorIndex,
};

fn corpus(n: usize) -> Vec<SourceDocument> {
    (0..n)
        .map(|i| {
            SourceDocument::new(
                format!("S{i}"),
                format!("Document {i}"),
                format!(
                    "Document {i} covers retrieval topic {} with additional filler \
                     sentences about indexing and ranking quality.",
                    i % 100
                ),
            )
        })
        .collect()
}

fn embedded_chunks(n: usize, dimension: usize) -> Vec<corpus_qa::Chunk> {
    let embedder = HashEmbedder::new(dimension);
    let chunker = TextChunker::new(256, 0);
    let mut chunks = chunker.chunk_corpus(&corpus(n)).unwrap();
    embedder.embed_chunks(&mut chunks).unwrap();
    chunks
}

fn bench_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunking");

    let long_doc = SourceDocument::new(
        "S1",
        "Long Document",
        "Lorem ipsum dolor sit amet. ".repeat(1000),
    );
    let chunker = TextChunker::new(512, 64);

    group.bench_function("chunk_large_doc", |b| {
        b.iter(|| chunker.chunk(black_box(&long_doc)));
    });

    group.finish();
}

fn bench_embedding(c: &mut Criterion) {
    let mut group = c.benchmark_group("embedding");

    let embedder = HashEmbedder::new(384);
    let texts: Vec<&str> = (0..100)
        .map(|_| "This is a test sentence for embedding")
        .collect();

    group.bench_function("embed_100_texts", |b| {
        b.iter(|| embedder.embed_many(black_box(&texts)));
    });

    group.finish();
}

fn bench_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");

    let chunks = embedded_chunks(1000, 128);
    let embedder = HashEmbedder::new(128);

    group.bench_function("build_1000_chunks", |b| {
        b.iter(|| {
            let mut index = VectorIndex::for_embedder(&embedder);
            index.build(black_box(chunks.clone())).unwrap();
            index
        });
    });

    group.finish();
}

fn bench_index_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_search");

    let embedder = HashEmbedder::new(128);
    let mut index = VectorIndex::for_embedder(&embedder);
    index.build(embedded_chunks(1000, 128)).unwrap();

    let query = embedder.embed("retrieval topic ranking").unwrap();

    group.bench_function("search_top_10", |b| {
        b.iter(|| index.search(black_box(&query), 10));
    });

    group.bench_function("search_top_100", |b| {
        b.iter(|| index.search(black_box(&query), 100));
    });

    group.finish();
}

fn bench_retrieval(c: &mut Criterion) {
    let mut group = c.benchmark_group("retrieval");

    let embedder = HashEmbedder::new(128);
    let mut index = VectorIndex::for_embedder(&embedder);
    index.build(embedded_chunks(1000, 128)).unwrap();

    let retriever = Retriever::new(Arc::new(index), embedder).with_config(RetrieverConfig {
        score_threshold: -1.0,
        ..Default::default()
    });

    group.bench_function("retrieve_top_5", |b| {
        b.iter(|| retriever.retrieve(black_box("retrieval topic ranking"), 5));
    });

    group.finish();
}

fn bench_prompt_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("prompt_assembly");

    let embedder = HashEmbedder::new(128);
    let mut index = VectorIndex::for_embedder(&embedder);
    index.build(embedded_chunks(200, 128)).unwrap();

    let retriever = Retriever::new(Arc::new(index), embedder).with_config(RetrieverConfig {
        score_threshold: -1.0,
        max_per_section: None,
        ..Default::default()
    });
    let results = retriever.retrieve("retrieval topic ranking", 10).unwrap();
    let assembler = PromptAssembler::default();

    group.bench_function("assemble_10_results", |b| {
        b.iter(|| assembler.assemble(black_box("retrieval topic ranking"), black_box(&results)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_chunking,
    bench_embedding,
    bench_index_build,
    bench_index_search,
    bench_retrieval,
    bench_prompt_assembly,
);

criterion_main!(benches);
