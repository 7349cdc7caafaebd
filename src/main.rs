//! # manual-qa CLI (`mqa`)
//!
//! The `mqa` binary drives the manual question-answering engine: building
//! the embedding index from configured manuals and answering questions
//! against it.
//!
//! ## Usage
//!
//! ```bash
//! mqa --config ./config/mqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mqa init` | Create the SQLite snapshot and run schema migrations |
//! | `mqa ingest` | Segment, chunk, and embed the configured manuals |
//! | `mqa ask "<question>"` | Answer one question against the index |
//! | `mqa chat` | Interactive question loop with in-session history |
//! | `mqa status` | Show what the snapshot currently holds |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the snapshot database
//! mqa init --config ./config/mqa.toml
//!
//! # Build the index (skipped if a non-empty snapshot exists)
//! mqa ingest --config ./config/mqa.toml
//!
//! # Force a rebuild after changing the manuals
//! mqa ingest --force --config ./config/mqa.toml
//!
//! # Ask a question, showing which chunks backed the answer
//! mqa ask "What are the routing options?" --show-sources
//! ```

mod ask;
mod chunk;
mod config;
mod db;
mod embedding;
mod extract;
mod generate;
mod history;
mod index;
mod ingest;
mod migrate;
mod models;
mod pipeline;
mod prompt;
mod retrieve;
mod segment;
mod status;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// manual-qa CLI — retrieval-augmented question answering over product
/// manuals.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file listing the manuals, chunking parameters, and the embedding and
/// generation providers.
#[derive(Parser)]
#[command(
    name = "mqa",
    about = "manual-qa — retrieval-augmented question answering over product manuals",
    version,
    long_about = "manual-qa ingests manuals (PDF, DOCX, plain text), segments them into \
    chapters and bounded chunks, embeds the chunks into a SQLite snapshot, and answers \
    natural-language questions by retrieving the most similar chunks and conditioning a \
    language model on them."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the snapshot database schema.
    ///
    /// Creates the SQLite file and all required tables. Idempotent —
    /// running it multiple times is safe.
    Init,

    /// Build the embedding index from the configured manuals.
    ///
    /// Extracts, segments, chunks, and embeds every configured document,
    /// then replaces the snapshot in one transaction. A non-empty snapshot
    /// is left untouched unless `--force` is given.
    Ingest {
        /// Clear the snapshot first and rebuild from scratch.
        #[arg(long)]
        force: bool,

        /// Show chapter and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a single question against the index.
    Ask {
        /// The question to answer.
        question: String,

        /// Override the configured number of retrieved chunks.
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the retrieved chunks behind the answer.
        #[arg(long)]
        show_sources: bool,
    },

    /// Interactive question loop. History stays in memory for the session
    /// and reaches the prompt only when `generation.include_history` is on.
    Chat {
        /// Override the configured number of retrieved chunks.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Show snapshot contents: document, chunk, and embedding counts.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("manual_qa=info,mqa=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = index::IndexStore::open(&cfg.index.path).await?;
            store.close().await;
            println!("Snapshot database initialized successfully.");
        }
        Commands::Ingest { force, dry_run } => {
            ingest::run_ingest(&cfg, force, dry_run).await?;
        }
        Commands::Ask {
            question,
            top_k,
            show_sources,
        } => {
            ask::run_ask(cfg, &question, top_k, show_sources).await?;
        }
        Commands::Chat { top_k } => {
            ask::run_chat(cfg, top_k).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
    }

    Ok(())
}
