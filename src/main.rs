//! PolyRAG CLI - main entry point
//!
//! Ingest documents, search them with any retrieval strategy, and answer
//! questions through the configured language model.

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use polyrag::adapters::AdapterFactory;
use polyrag::config::StrategyKind;
use polyrag::ports::{RetrieveOptions, Retriever, TextEmbedder, VectorStore};
use polyrag::retrieval::GraphRetrieverOptions;
use polyrag::{
    metrics, Config, GraphRetriever, HybridRetriever, LateInteractionRetriever, Pipeline,
    PromptTemplate, VectorRetriever,
};

#[derive(Parser)]
#[command(name = "polyrag")]
#[command(about = "Multi-strategy retrieval and fusion for RAG", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to polyrag.yml (defaults to ./polyrag.yml or ../polyrag.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Retrieval strategy: vector | late | graph | hybrid
    #[arg(long, global = true)]
    strategy: Option<StrategyKind>,

    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR", global = true)]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, chunk, embed and store a file or directory
    Ingest {
        /// File or directory to ingest
        path: PathBuf,
    },

    /// Show the top-ranked chunks for a query
    Search {
        query: String,

        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Answer a question from retrieved context
    Query {
        question: String,

        /// Number of context chunks
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the answer as it is generated
        #[arg(long, default_value_t = false)]
        stream: bool,

        /// System prompt template file (must contain {context})
        #[arg(long)]
        system_prompt: Option<PathBuf>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ingest { .. } => "ingest",
            Commands::Search { .. } => "search",
            Commands::Query { .. } => "query",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("polyrag=info".parse()?))
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let timer = metrics::CommandTimer::start(cli.command.name());
    let result = execute_command(cli).await;
    timer.finish(result.is_ok());

    result
}

async fn execute_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(strategy) = cli.strategy {
        config.retrieval.strategy = strategy;
    }

    match cli.command {
        Commands::Ingest { path } => {
            let pipeline = build_pipeline(&config).await?;
            ingest(&pipeline, &path).await?;
        }
        Commands::Search { query, top_k } => {
            let pipeline = build_pipeline(&config).await?;
            let top_k = top_k.unwrap_or(config.pipeline.top_k);
            let results = pipeline
                .retrieve(&query, top_k, &RetrieveOptions::default())
                .await?;

            if results.is_empty() {
                println!("No results.");
            }
            for (rank, result) in results.iter().enumerate() {
                println!(
                    "{}. [{}] score={:.4} id={}",
                    rank + 1,
                    result.source,
                    result.score,
                    result.chunk.id
                );
                println!("   {}", preview(&result.chunk.content, 200));
            }
        }
        Commands::Query {
            question,
            top_k,
            stream,
            system_prompt,
        } => {
            let prompt = match system_prompt {
                Some(path) => Some(PromptTemplate::from_file(&path)?),
                None => None,
            };
            let pipeline = build_pipeline(&config).await?;
            let top_k = top_k.unwrap_or(config.pipeline.top_k);

            if stream {
                let mut answer = pipeline
                    .query_stream(&question, top_k, prompt.as_ref())
                    .await?;
                let mut stdout = std::io::stdout();
                while let Some(piece) = answer.next().await {
                    write!(stdout, "{}", piece?)?;
                    stdout.flush()?;
                }
                writeln!(stdout)?;
            } else {
                let answer = pipeline.query(&question, top_k, prompt.as_ref()).await?;
                println!("{}", answer);
            }
        }
    }

    Ok(())
}

async fn ingest(pipeline: &Pipeline, path: &Path) -> anyhow::Result<()> {
    let report = pipeline.ingest_with_report(path).await?;
    metrics::record_ingestion(report.documents, report.chunks, report.failures.len());
    println!(
        "Ingested {} chunks from {} documents into '{}'",
        report.chunks,
        report.documents,
        pipeline.collection()
    );
    if !report.failures.is_empty() {
        println!("Skipped {} files:", report.failures.len());
        for failure in &report.failures {
            println!("  - {}", failure);
        }
    }
    Ok(())
}

async fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    let embedder = AdapterFactory::create_embedding(&config.embedding)?;
    let store = AdapterFactory::create_vector_store(&config.vector_store)?;
    let retriever = build_retriever(
        config,
        config.retrieval.strategy,
        embedder.clone(),
        store.clone(),
    )
    .await?;

    let prompt = config.system_prompt()?.unwrap_or_default();

    info!(
        "Using {} retrieval over '{}'",
        retriever.name(),
        config.pipeline.collection
    );

    let pipeline = Pipeline::builder()
        .loader(AdapterFactory::create_document_loader("text")?)
        .chunker(AdapterFactory::create_chunker(&config.chunking)?)
        .embedder(embedder)
        .vector_store(store)
        .retriever(retriever)
        .generator(AdapterFactory::create_llm(&config.llm)?)
        .collection(config.pipeline.collection.clone())
        .quantization(config.vector_store.quantization)
        .prompt(prompt)
        .build()?;
    Ok(pipeline)
}

async fn build_retriever(
    config: &Config,
    strategy: StrategyKind,
    embedder: Arc<dyn TextEmbedder>,
    store: Arc<dyn VectorStore>,
) -> anyhow::Result<Arc<dyn Retriever>> {
    if strategy != StrategyKind::Hybrid {
        return build_single(config, strategy, embedder, store).await;
    }

    let mut strategies = Vec::with_capacity(config.retrieval.hybrid_strategies.len());
    for kind in &config.retrieval.hybrid_strategies {
        strategies.push(build_single(config, *kind, embedder.clone(), store.clone()).await?);
    }

    let mut hybrid = HybridRetriever::new(strategies, config.retrieval.weights.clone())?
        .with_fusion_factor(config.retrieval.fusion_factor);
    if let Some(secs) = config.retrieval.timeout_secs {
        hybrid = hybrid.with_timeout(Duration::from_secs(secs));
    }
    Ok(Arc::new(hybrid))
}

async fn build_single(
    config: &Config,
    strategy: StrategyKind,
    embedder: Arc<dyn TextEmbedder>,
    store: Arc<dyn VectorStore>,
) -> anyhow::Result<Arc<dyn Retriever>> {
    let vector = VectorRetriever::new(embedder, store, config.pipeline.collection.clone());

    let retriever: Arc<dyn Retriever> = match strategy {
        StrategyKind::Vector => Arc::new(vector),
        StrategyKind::Late => Arc::new(
            LateInteractionRetriever::new(
                Arc::new(vector),
                AdapterFactory::create_token_embedding(&config.embedding),
            )
            .with_rerank_factor(config.retrieval.rerank_factor),
        ),
        StrategyKind::Graph => {
            let graph_store = AdapterFactory::create_graph_store(&config.graph_store).await?;
            Arc::new(GraphRetriever::with_options(
                graph_store,
                GraphRetrieverOptions::from(&config.retrieval.graph),
            ))
        }
        StrategyKind::Hybrid => anyhow::bail!("hybrid retrieval cannot be nested"),
    };
    Ok(retriever)
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}
