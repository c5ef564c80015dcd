//! kb CLI - Command-line interface for the hybrid knowledge retriever.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use kb_backend::MemoryBackend;
use kb_core::{KbConfig, RetrievalResults};
use kb_server::{KnowledgeService, SearchParams, SynthesisParams};
use kb_text::Normalizer;

/// kb - Hybrid lexical/vector knowledge retrieval
#[derive(Parser)]
#[command(name = "kb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: <config dir>/kb/config.toml, then ./kb.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serve queries from a JSON array of chunks instead of the HTTP backends
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the knowledge base
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Candidates requested from each signal
        #[arg(long)]
        candidates: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stream the retrieval pipeline as SSE frames
    Stream {
        /// Question to gather knowledge for
        query: String,
    },

    /// Stream the knowledge synthesis pipeline as SSE frames
    Synthesize {
        /// Subject to gather knowledge about
        subject: String,

        /// Search query (repeatable; a fallback set is used when omitted)
        #[arg(short, long = "query")]
        queries: Vec<String>,
    },

    /// Print the normalized form of a text
    Normalize {
        /// Text to normalize
        text: String,
    },

    /// Print the effective configuration
    Config,
}

fn setup_logging(verbose: bool) {
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
        return;
    }

    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(path: Option<&PathBuf>) -> Result<KbConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => KbConfig::load(path)?,
        None => KbConfig::load_default()?,
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn get_service(
    config: &KbConfig,
    corpus: Option<&PathBuf>,
) -> Result<KnowledgeService, Box<dyn std::error::Error>> {
    let service = match corpus {
        Some(path) => {
            let backend = MemoryBackend::from_json_file(path)?;
            KnowledgeService::with_memory_backend(Arc::new(backend), config)?
        }
        None => KnowledgeService::from_config(config)?,
    };
    Ok(service)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Search {
            query,
            top_k,
            candidates,
            json,
        } => {
            let service = get_service(&config, cli.corpus.as_ref())?;
            let params = SearchParams {
                query,
                top_k,
                candidates,
            };
            let results = service.search(params).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results);
            }
        }
        Commands::Stream { query } => {
            let service = get_service(&config, cli.corpus.as_ref())?;
            let frames = service.stream_retrieval(SearchParams::new(query))?;
            print_frames(frames).await?;
        }
        Commands::Synthesize { subject, queries } => {
            let service = get_service(&config, cli.corpus.as_ref())?;
            let frames = service.stream_synthesis(SynthesisParams { subject, queries })?;
            print_frames(frames).await?;
        }
        Commands::Normalize { text } => {
            let normalizer = Normalizer::from_config(&config.normalizer)?;
            println!("{}", normalizer.normalize(&text));
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn print_results(results: &RetrievalResults) {
    if let Some(lost) = results.degraded {
        eprintln!("Warning: {} search unavailable, results are partial", lost);
    }

    println!(
        "Found {} results in {}ms (lexical query: {:?}):\n",
        results.results.len(),
        results.latency_ms,
        results.normalized_query
    );

    for result in &results.results {
        let metadata = &result.chunk.metadata;
        println!(
            "---\n[{}] {} (score: {:.5})",
            result.rank,
            metadata.title.as_deref().unwrap_or("Untitled document"),
            result.fused_score
        );
        if !metadata.source_url.is_empty() {
            println!("{}", metadata.source_url);
        }
        println!("```\n{}\n```\n", result.chunk.text.trim());
    }
}

async fn print_frames(mut frames: BoxStream<'static, String>) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    while let Some(frame) = frames.next().await {
        stdout.write_all(frame.as_bytes())?;
        stdout.flush()?;
    }
    Ok(())
}
