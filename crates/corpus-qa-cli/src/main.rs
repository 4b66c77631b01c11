//! Corpus-QA CLI
//!
//! Command-line interface for the corpus-qa pipeline.
//!
//! ```bash
//! # Index a directory of .txt/.md documents
//! corpus-qa index --path docs/ --output index/
//!
//! # Ask a single question against a persisted index
//! GEMINI_API_KEY=... corpus-qa ask "What is the leave policy?" --index index/
//!
//! # Interactive session (one pipeline, many questions)
//! GEMINI_API_KEY=... corpus-qa chat --index index/
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use corpus_qa::{
    Answer, AnswerGenerator, Chunker, Embedder, GeminiGenerator, MockGenerator, RagPipeline,
    RagPipelineBuilder, RetrieverConfig, SourceDocument, TextChunker, TfIdfEmbedder, VectorIndex,
};
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;

/// Answer generator selection
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum GeneratorKind {
    /// Gemini API (requires GEMINI_API_KEY)
    #[default]
    Gemini,
    /// Offline canned generator (retrieval only; no model call)
    Mock,
}

/// Output format selection
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON answer record
    Json,
}

#[derive(Parser)]
#[command(name = "corpus-qa")]
#[command(version)]
#[command(about = "Grounded question answering over a document corpus", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an offline demo against a built-in sample corpus
    Demo {
        /// Query string
        #[arg(short, long, default_value = "What is the conflict of interest policy?")]
        query: String,

        /// Number of results to retrieve
        #[arg(short, long, default_value = "3")]
        top_k: usize,
    },

    /// Index documents from a file or directory
    Index {
        /// Path to document(s): a .txt/.md file, a directory of them, or
        /// a .json corpus file
        #[arg(short, long)]
        path: String,

        /// Output directory for the persisted index
        #[arg(short, long)]
        output: String,

        /// Chunk size in characters
        #[arg(long, default_value = "512")]
        chunk_size: usize,

        /// Chunk overlap in characters
        #[arg(long, default_value = "64")]
        chunk_overlap: usize,

        /// Embedding dimension for the TF-IDF embedder
        #[arg(long, default_value = "256")]
        dimension: usize,
    },

    /// Ask a single question against a persisted index
    Ask {
        /// Query string
        query: String,

        /// Path to the index directory
        #[arg(short, long)]
        index: String,

        /// Number of chunks to retrieve
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,

        /// Minimum similarity for a retrieved chunk
        #[arg(long, default_value = "0.25")]
        score_threshold: f32,

        /// Answer generator
        #[arg(short, long, value_enum, default_value = "gemini")]
        generator: GeneratorKind,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Interactive question-answering session against a persisted index
    Chat {
        /// Path to the index directory
        #[arg(short, long)]
        index: String,

        /// Answer generator
        #[arg(short, long, value_enum, default_value = "gemini")]
        generator: GeneratorKind,
    },

    /// Show pipeline info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { query, top_k } => run_demo(&query, top_k).await?,
        Commands::Index {
            path,
            output,
            chunk_size,
            chunk_overlap,
            dimension,
        } => run_index(&path, &output, chunk_size, chunk_overlap, dimension)?,
        Commands::Ask {
            query,
            index,
            top_k,
            score_threshold,
            generator,
            format,
        } => run_ask(&query, &index, top_k, score_threshold, generator, format).await?,
        Commands::Chat { index, generator } => run_chat(&index, generator).await?,
        Commands::Info => run_info(),
    }

    Ok(())
}

fn run_info() {
    println!("Corpus-QA Pipeline");
    println!("==================");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Components:");
    println!("  - Chunker: recursive text splitter with overlap");
    #[cfg(feature = "embeddings")]
    println!("  - Embedders: TF-IDF (trainable), semantic (fastembed) ✓");
    #[cfg(not(feature = "embeddings"))]
    println!("  - Embedders: TF-IDF (trainable), hash (testing)");
    println!("  - Index: exact nearest-neighbour, build-once / query-many");
    println!("  - Retrieval: score threshold + per-section dedup");
    println!("  - Generators: Gemini API, mock (offline)");
    #[cfg(not(feature = "embeddings"))]
    println!();
    #[cfg(not(feature = "embeddings"))]
    println!("Note: build with --features embeddings for semantic search");
}

fn sample_corpus() -> Vec<SourceDocument> {
    vec![
        SourceDocument::new(
            "S1",
            "Policy",
            "Employees must disclose conflicts of interest annually. Disclosure forms go \
             to compliance within ten business days of a new engagement.",
        ),
        SourceDocument::new(
            "S2",
            "Benefits",
            "Health insurance enrollment opens every November. Coverage changes take \
             effect on January first.",
        ),
        SourceDocument::new(
            "S3",
            "Vacation",
            "Vacation requests require manager approval two weeks in advance. Unused \
             vacation days expire at year end.",
        ),
    ]
}

async fn run_demo(query: &str, top_k: usize) -> Result<()> {
    println!("=== Corpus-QA Demo ===\n");

    let corpus = sample_corpus();

    let mut embedder = TfIdfEmbedder::new(128);
    let texts: Vec<&str> = corpus.iter().map(|d| d.raw_text.as_str()).collect();
    embedder.fit(&texts);

    let pipeline = RagPipelineBuilder::new()
        .chunker(TextChunker::new(256, 32))
        .embedder(embedder)
        .generator(MockGenerator::new(
            "Generated offline: see the retrieved passages below for the grounded answer.",
        ))
        .retriever_config(RetrieverConfig {
            top_k,
            ..Default::default()
        })
        .build(&corpus)
        .context("failed to build demo pipeline")?;

    println!(
        "Indexed {} documents ({} chunks)\n",
        corpus.len(),
        pipeline.chunk_count()
    );
    println!("Query: \"{query}\"\n");

    let results = pipeline.retrieve(query, top_k)?;
    println!("Results ({}):", results.len());
    println!("{}", "-".repeat(50));
    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [Score: {:.3}] {} ({})",
            i + 1,
            result.score,
            result.chunk.title,
            result.chunk.section_id
        );
        let preview: String = result.chunk.text.chars().take(80).collect();
        println!("   {preview}...\n");
    }

    let answer = pipeline.ask(query).await?;
    print_answer_text(&answer);

    Ok(())
}

fn run_index(
    path: &str,
    output: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    dimension: usize,
) -> Result<()> {
    let documents = load_corpus(Path::new(path))?;
    if documents.is_empty() {
        anyhow::bail!("no documents found at path: {path}");
    }
    println!("Found {} documents", documents.len());

    let mut embedder = TfIdfEmbedder::new(dimension);
    let texts: Vec<&str> = documents.iter().map(|d| d.raw_text.as_str()).collect();
    embedder.fit(&texts);

    let chunker = TextChunker::new(chunk_size, chunk_overlap);
    let mut chunks = chunker.chunk_corpus(&documents)?;
    embedder.embed_chunks(&mut chunks)?;

    let mut index = VectorIndex::for_embedder(&embedder);
    index.build(chunks).context("index build failed")?;

    let output_path = Path::new(output);
    fs::create_dir_all(output_path)?;
    index.save(output_path.join("index.json"))?;

    // The TF-IDF vocabulary is refit from the corpus at query time, so
    // the corpus is persisted next to the index
    let corpus_json = serde_json::to_string(&documents)?;
    fs::write(output_path.join("corpus.json"), corpus_json)?;

    println!(
        "Indexed {} documents ({} chunks) -> {}",
        documents.len(),
        index.len(),
        output_path.display()
    );

    Ok(())
}

fn load_corpus(path: &Path) -> Result<Vec<SourceDocument>> {
    if !path.exists() {
        anyhow::bail!("path not found: {}", path.display());
    }

    let mut documents = Vec::new();

    if path.is_file() {
        if path.extension().is_some_and(|ext| ext == "json") {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read corpus file: {}", path.display()))?;
            documents = serde_json::from_str(&json)
                .with_context(|| format!("invalid corpus JSON: {}", path.display()))?;
        } else {
            documents.push(document_from_file(path)?);
        }
    } else if path.is_dir() {
        let mut entries: Vec<_> = fs::read_dir(path)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .is_some_and(|ext| ext == "txt" || ext == "md")
            })
            .collect();
        entries.sort();

        for file_path in entries {
            documents.push(document_from_file(&file_path)?);
        }
    }

    Ok(documents)
}

fn document_from_file(path: &Path) -> Result<SourceDocument> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read file: {}", path.display()))?;
    let stem = path
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("untitled");

    Ok(SourceDocument::new(stem, stem, content))
}

/// Load a persisted index and its corpus, refit the embedder, and
/// validate identity before serving
fn load_pipeline<G: AnswerGenerator>(
    index_dir: &str,
    generator: G,
    retriever_config: RetrieverConfig,
) -> Result<RagPipeline<TfIdfEmbedder, G>> {
    let dir = Path::new(index_dir);

    let corpus_json = fs::read_to_string(dir.join("corpus.json"))
        .with_context(|| format!("failed to read corpus from {index_dir}"))?;
    let documents: Vec<SourceDocument> =
        serde_json::from_str(&corpus_json).context("invalid corpus.json")?;

    let index = VectorIndex::load(dir.join("index.json"))
        .with_context(|| format!("failed to load index from {index_dir}"))?;

    let mut embedder = TfIdfEmbedder::new(index.config().dimension);
    let texts: Vec<&str> = documents.iter().map(|d| d.raw_text.as_str()).collect();
    embedder.fit(&texts);

    RagPipelineBuilder::new()
        .embedder(embedder)
        .generator(generator)
        .retriever_config(retriever_config)
        .build_with_index(index)
        .context("persisted index is incompatible with the active embedder")
}

async fn ask_pipeline(
    index_dir: &str,
    generator: GeneratorKind,
    retriever_config: RetrieverConfig,
    query: &str,
) -> Result<Answer> {
    match generator {
        GeneratorKind::Gemini => {
            let generator = GeminiGenerator::from_env()
                .context("Gemini generator unavailable; set GEMINI_API_KEY or use --generator mock")?;
            let pipeline = load_pipeline(index_dir, generator, retriever_config)?;
            Ok(pipeline.ask(query).await?)
        }
        GeneratorKind::Mock => {
            let generator = MockGenerator::new(
                "Generated offline: see the cited sources for the relevant passages.",
            );
            let pipeline = load_pipeline(index_dir, generator, retriever_config)?;
            Ok(pipeline.ask(query).await?)
        }
    }
}

async fn run_ask(
    query: &str,
    index_dir: &str,
    top_k: usize,
    score_threshold: f32,
    generator: GeneratorKind,
    format: OutputFormat,
) -> Result<()> {
    let retriever_config = RetrieverConfig {
        top_k,
        score_threshold,
        ..Default::default()
    };

    let answer = ask_pipeline(index_dir, generator, retriever_config, query).await?;

    match format {
        OutputFormat::Text => print_answer_text(&answer),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&answer)?),
    }

    Ok(())
}

async fn run_chat(index_dir: &str, generator: GeneratorKind) -> Result<()> {
    // One pipeline per session: built once, then shared read-only across
    // every question
    println!("Loading pipeline from {index_dir}...");

    let retriever_config = RetrieverConfig::default();

    match generator {
        GeneratorKind::Gemini => {
            let generator = GeminiGenerator::from_env()
                .context("Gemini generator unavailable; set GEMINI_API_KEY or use --generator mock")?;
            let pipeline = load_pipeline(index_dir, generator, retriever_config)?;
            chat_loop(&pipeline).await
        }
        GeneratorKind::Mock => {
            let generator = MockGenerator::new(
                "Generated offline: see the cited sources for the relevant passages.",
            );
            let pipeline = load_pipeline(index_dir, generator, retriever_config)?;
            chat_loop(&pipeline).await
        }
    }
}

async fn chat_loop<G: AnswerGenerator>(pipeline: &RagPipeline<TfIdfEmbedder, G>) -> Result<()> {
    println!(
        "Ready: {} chunks across {} sections. Empty line or 'exit' to quit.\n",
        pipeline.chunk_count(),
        pipeline.section_count()
    );

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();
        if query.is_empty() || query == "exit" || query == "quit" {
            break;
        }

        match pipeline.ask(query).await {
            Ok(answer) => {
                print_answer_text(&answer);
                println!();
            }
            Err(e) => eprintln!("couldn't generate an answer: {e}"),
        }
    }

    Ok(())
}

fn print_answer_text(answer: &Answer) {
    println!("{}", "=".repeat(50));
    println!("Answer:\n");
    println!("{}", answer.text);
    println!();
    println!("Sources:");
    if answer.sources.is_empty() {
        println!("  (none: no relevant passages found)");
    }
    for source in &answer.sources {
        println!(
            "  - section {} | {} | chunk {}",
            source.section_id, source.title, source.chunk_id
        );
    }
}
