//! # Academic RAG CLI (`arag`)
//!
//! Ingests a directory of academic regulations and calendars into a local
//! SQLite index and answers questions over it, from the command line or
//! over HTTP.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `arag init` | Create the SQLite index schema |
//! | `arag ingest` | Chunk, embed and index the documents directory |
//! | `arag classify <file>` | Show a file's detected type and chunk counts |
//! | `arag parse "<question>"` | Print the parsed query intent |
//! | `arag retrieve "<question>"` | Show the ranked context for a question |
//! | `arag ask "<question>"` | Answer a question |
//! | `arag serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! arag init --config ./config/arag.toml
//! arag ingest --dir ./documents
//! arag ask "Apa isi Pasal 13?"
//! RUST_LOG=academic_rag=debug arag retrieve "Kapan UTS bulan Maret?"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use academic_rag::{config, ingest, inspect, migrate, server};

/// Question answering over academic regulations and calendars.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/arag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "arag",
    about = "Question answering over academic regulations and calendars",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/arag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index schema. Safe to run repeatedly.
    Init,

    /// Ingest the documents directory.
    ///
    /// Unchanged documents (same content hash) are skipped.
    Ingest {
        /// Documents directory; overrides `documents.dir`.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Clear the index and reingest every document.
        #[arg(long)]
        full: bool,

        /// Show document and chunk counts without writing to the index.
        #[arg(long)]
        dry_run: bool,
    },

    /// Detect a document's type and show how it would be chunked.
    Classify {
        /// PDF, text or Markdown file.
        file: PathBuf,
    },

    /// Print the parsed intent of a question as JSON.
    Parse { question: String },

    /// Show the ranked context for a question, without generation.
    Retrieve { question: String },

    /// Answer a question.
    Ask { question: String },

    /// Start the HTTP server (`POST /chat`, `GET /health`).
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Index initialized successfully.");
        }
        Commands::Ingest { dir, full, dry_run } => {
            let opts = ingest::IngestOptions { dir, full, dry_run };
            ingest::run_ingest(&cfg, &opts).await?;
        }
        Commands::Classify { file } => {
            inspect::run_classify(&cfg, &file)?;
        }
        Commands::Parse { question } => {
            inspect::run_parse(&cfg, &question)?;
        }
        Commands::Retrieve { question } => {
            inspect::run_retrieve(&cfg, &question).await?;
        }
        Commands::Ask { question } => {
            inspect::run_ask(&cfg, &question).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
