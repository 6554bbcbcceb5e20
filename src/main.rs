//! # askdocs CLI
//!
//! The `askdocs` binary is the primary interface to the document Q&A
//! pipeline. It provides commands for database initialization, document
//! ingestion, question answering, record inspection, and starting the HTTP
//! query server.
//!
//! ## Usage
//!
//! ```bash
//! askdocs --config ./config/askdocs.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdocs init` | Create the SQLite database and run schema migrations |
//! | `askdocs ingest <path>` | Extract, chunk, embed, and index a document |
//! | `askdocs ask "<question>"` | Answer a question from the indexed documents |
//! | `askdocs docs` | List indexed documents |
//! | `askdocs queries` | List answered questions and their tickets |
//! | `askdocs serve` | Start the HTTP query server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! askdocs init --config ./config/askdocs.toml
//!
//! # Ingest the employee handbook
//! askdocs ingest ./handbook.pdf --name "Employee Handbook"
//!
//! # Ask a question
//! askdocs ask "how many vacation days do new hires get?"
//!
//! # Start the query server
//! askdocs serve --config ./config/askdocs.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use askdocs::{ask, config, db, ingest, migrate, server, store};

/// askdocs CLI — retrieval-augmented question answering over internal
/// documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/askdocs.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "askdocs",
    about = "askdocs — retrieval-augmented question answering over internal documents",
    version,
    long_about = "askdocs ingests internal documents (text, Markdown, PDF, DOCX), chunks and \
    embeds them into a local SQLite vector store, and answers natural-language questions with \
    citations. Low-confidence answers open escalation tickets for human review."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/askdocs.toml`. All database, embedding,
    /// retrieval, generation, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/askdocs.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, queries, tickets). This command is idempotent —
    /// running it multiple times is safe.
    Init,

    /// Ingest a document into the index.
    ///
    /// Extracts text from the source file, normalizes and chunks it, embeds
    /// every chunk with the configured backend, and persists the result.
    /// Re-ingesting the same file creates a new document.
    Ingest {
        /// Path to the source file (.txt, .md, .pdf, .docx).
        path: PathBuf,

        /// Display name for the document. Defaults to the file name.
        #[arg(long)]
        name: Option<String>,

        /// Source URL to attach to citations (e.g., the wiki page this file
        /// was exported from).
        #[arg(long)]
        source_url: Option<String>,

        /// Who uploaded this document.
        #[arg(long, default_value = "cli")]
        uploaded_by: String,

        /// Override the configured chunk size (characters).
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Override the configured chunk overlap (characters).
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Ask a question against the indexed documents.
    ///
    /// Embeds the question, retrieves the most similar chunks, composes an
    /// answer with citations, and records the query. Low-confidence answers
    /// open an escalation ticket.
    Ask {
        /// The question to answer.
        question: String,

        /// Override the configured number of chunks to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// List indexed documents with their chunk counts.
    Docs,

    /// List answered questions with confidence and ticket status.
    Queries {
        /// Maximum number of queries to show, newest first.
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Start the HTTP query server.
    ///
    /// Binds to the address configured in `[server].bind` and exposes
    /// `POST /query` and `GET /health`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("askdocs=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            name,
            source_url,
            uploaded_by,
            chunk_size,
            overlap,
        } => {
            let name = name.unwrap_or_else(|| {
                path.file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "untitled".to_string())
            });
            ingest::run_ingest(
                &cfg,
                &path,
                &name,
                source_url.as_deref(),
                &uploaded_by,
                chunk_size,
                overlap,
            )
            .await?;
        }
        Commands::Ask { question, top_k } => {
            ask::run_ask(&cfg, &question, top_k).await?;
        }
        Commands::Docs => {
            run_docs(&cfg).await?;
        }
        Commands::Queries { limit } => {
            run_queries(&cfg, limit).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_docs(cfg: &config::Config) -> anyhow::Result<()> {
    let pool = db::open_pool(&cfg.db.path).await?;
    let docs = store::list_documents(&pool).await?;
    pool.close().await;

    if docs.is_empty() {
        println!("No documents indexed yet. Run `askdocs ingest <path>` first.");
        return Ok(());
    }

    println!("{} document(s):", docs.len());
    for doc in docs {
        let when = chrono::DateTime::from_timestamp(doc.created_at, 0)
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| doc.created_at.to_string());
        println!(
            "  {}  {} ({} chunks, by {}, {})",
            doc.id, doc.name, doc.chunk_count, doc.uploaded_by, when
        );
        if let Some(url) = doc.source_url {
            println!("      {}", url);
        }
    }
    Ok(())
}

async fn run_queries(cfg: &config::Config, limit: i64) -> anyhow::Result<()> {
    let pool = db::open_pool(&cfg.db.path).await?;
    let queries = store::list_queries(&pool, limit).await?;
    pool.close().await;

    if queries.is_empty() {
        println!("No queries recorded yet.");
        return Ok(());
    }

    println!("{} quer(ies), newest first:", queries.len());
    for q in queries {
        let ticket = match q.ticket_status.as_deref() {
            Some(status) => format!(", ticket: {}", status),
            None => String::new(),
        };
        println!(
            "  [{:.2}{}] {}",
            q.confidence,
            ticket,
            q.question.lines().next().unwrap_or("")
        );
    }
    Ok(())
}
