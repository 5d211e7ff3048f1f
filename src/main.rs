//! # RAG Chat CLI (`ragchat`)
//!
//! ## Usage
//!
//! ```bash
//! ragchat --config ./config/ragchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat ingest` | Load the index, or build it from the configured sources |
//! | `ragchat search "<query>"` | Print the nearest chunks |
//! | `ragchat ask "<question>"` | Answer one question |
//! | `ragchat chat` | Interactive conversation with streamed answers |
//! | `ragchat inspect` | Summarize the persisted index |
//! | `ragchat serve` | Start the HTTP chat server |
//!
//! Diagnostics go to stderr through `tracing`; set `RUST_LOG` to adjust.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rag_chat::config::{self, Credentials};
use rag_chat::context::AppContext;
use rag_chat::responder::RetrievalOptions;
use rag_chat::{ask, ingest, inspect, search, server};
use rag_chat_core::search::MetadataFilter;

/// RAG Chat: a retrieval-augmented chatbot over your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ragchat.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "ragchat", version, about = "Retrieval-augmented chat over a document collection")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the index if it is complete, otherwise build it.
    ///
    /// Loads documents, splits and tags them, embeds every chunk and writes
    /// the records. A complete index is reused untouched.
    Ingest {
        /// Clear the store and rebuild from the sources.
        #[arg(long)]
        rebuild: bool,

        /// Load and split only; print document and chunk counts.
        #[arg(long)]
        dry_run: bool,
    },

    /// Retrieve the nearest chunks for a query.
    Search {
        query: String,

        /// Number of results (defaults to `[retrieval].k`).
        #[arg(long)]
        k: Option<usize>,

        /// Exact-match metadata filter, e.g. `semester=1st`. Repeatable.
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<String>,
    },

    /// Answer a single question.
    Ask {
        question: String,

        /// Print the answer as it is generated.
        #[arg(long)]
        stream: bool,

        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<String>,
    },

    /// Start an interactive conversation.
    Chat {
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<String>,
    },

    /// Show record count, build info and sample records.
    Inspect {
        /// Number of sample records to print.
        #[arg(long, default_value_t = 3)]
        limit: usize,
    },

    /// Start the HTTP chat server on `[server].bind`.
    Serve,
}

/// Validate a `key=value` pair for `--filter`.
fn parse_key_val(s: &str) -> Result<String, String> {
    match s.split_once('=') {
        Some((key, _)) if !key.trim().is_empty() => Ok(s.to_string()),
        _ => Err(format!("invalid KEY=VALUE: '{}'", s)),
    }
}

fn retrieval_options(filters: &[String], k: Option<usize>) -> RetrievalOptions {
    RetrievalOptions {
        filter: MetadataFilter::from_pairs(filters).filter(|f| !f.is_empty()),
        k,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;
    let credentials = Credentials::from_env(&cfg);

    match cli.command {
        Commands::Ingest { rebuild, dry_run } => {
            ingest::run_ingest(&cfg, &credentials, rebuild, dry_run).await?;
        }
        Commands::Search { query, k, filters } => {
            let ctx = AppContext::ready(cfg, &credentials).await?;
            search::run_search(&ctx, &query, &retrieval_options(&filters, k)).await?;
        }
        Commands::Ask {
            question,
            stream,
            filters,
        } => {
            let ctx = AppContext::ready(cfg, &credentials).await?;
            ask::run_ask(&ctx, &question, &retrieval_options(&filters, None), stream).await?;
        }
        Commands::Chat { filters } => {
            let ctx = AppContext::ready(cfg, &credentials).await?;
            ask::run_chat(&ctx, &retrieval_options(&filters, None)).await?;
        }
        Commands::Inspect { limit } => {
            inspect::run_inspect(&cfg, limit).await?;
        }
        Commands::Serve => {
            let ctx = AppContext::ready(cfg, &credentials).await?;
            server::run_server(Arc::new(ctx)).await?;
        }
    }

    Ok(())
}
