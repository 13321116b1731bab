//! # Search Gateway CLI (`sgw`)
//!
//! Runs the HTTP gateway and a handful of operator commands against the
//! configured Elasticsearch cluster.
//!
//! ## Usage
//!
//! ```bash
//! sgw --config ./config/sgw.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sgw serve` | Start the HTTP gateway |
//! | `sgw ping` | Check that the cluster answers |
//! | `sgw index create\|delete\|refresh\|clean` | Administer an index |
//! | `sgw ingest <files..>` | Bulk-index local files |
//! | `sgw search "<query>"` | Search indexed documents |
//! | `sgw get <id>` | Print a stored document |
//! | `sgw hash-password` | Print a password hash for `[[auth.users]]` |
//!
//! ## Examples
//!
//! ```bash
//! # Generate a user entry
//! sgw hash-password 's3cret'
//!
//! # Index a folder of reports
//! sgw ingest reports/*.pdf --config ./config/sgw.toml
//!
//! # Wildcard search
//! sgw search "rout" --mode wildcard
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use search_gateway::es::ElasticsearchStore;
use search_gateway::{auth, config, indices, ingest, logging, search, server};

/// Search Gateway: document ingestion, search and inventory aggregation
/// over Elasticsearch.
#[derive(Parser)]
#[command(name = "sgw", version, about = "REST gateway for document search and inventory aggregation over Elasticsearch")]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/sgw.toml`. See `config/sgw.example.toml`.
    #[arg(long, global = true, default_value = "./config/sgw.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway on `[server].bind`.
    Serve,

    /// Check that the cluster is reachable.
    Ping,

    /// Administer an index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Extract and bulk-index local files into the documents index.
    ///
    /// Accepts .txt, .csv, .docx and .pdf files; anything else is skipped.
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Search indexed documents and print matching file names.
    Search {
        query: String,

        /// `match`, `match_all` or `wildcard`.
        #[arg(long, default_value = search::DEFAULT_MODE)]
        mode: String,
    },

    /// Print a stored document as JSON.
    Get {
        id: String,

        /// Index to read from. Defaults to the documents index.
        #[arg(long)]
        index: Option<String>,
    },

    /// Print a password hash for an `[[auth.users]]` entry.
    ///
    /// Reads the password from stdin when it is not given as an argument.
    HashPassword { password: Option<String> },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Create the documents index with its mappings (no-op when present).
    Create,
    /// Drop an index.
    Delete {
        /// Defaults to the documents index.
        index: Option<String>,
    },
    /// Make recent writes searchable.
    Refresh { index: Option<String> },
    /// Delete every document but keep the index.
    Clean { index: Option<String> },
}

fn read_password_from_stdin() -> anyhow::Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    Ok(password)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::HashPassword { password } = &cli.command {
        let password = match password {
            Some(p) => p.clone(),
            None => read_password_from_stdin()?,
        };
        println!("{}", auth::hash_password(&password));
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging)?;

    let store = ElasticsearchStore::new(&cfg.store)?;
    let documents = cfg.indices.documents.clone();

    match cli.command {
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Ping => indices::run_ping(&store, &cfg).await?,
        Commands::Index { action } => match action {
            IndexAction::Create => indices::run_create(&store, &cfg).await?,
            IndexAction::Delete { index } => {
                indices::run_delete(&store, index.as_deref().unwrap_or(&documents)).await?
            }
            IndexAction::Refresh { index } => {
                indices::run_refresh(&store, index.as_deref().unwrap_or(&documents)).await?
            }
            IndexAction::Clean { index } => {
                indices::run_clean(&store, index.as_deref().unwrap_or(&documents)).await?
            }
        },
        Commands::Ingest { files } => ingest::run_ingest(&store, &cfg, &files).await?,
        Commands::Search { query, mode } => search::run_search(&store, &cfg, &query, &mode).await?,
        Commands::Get { id, index } => {
            indices::run_get(&store, index.as_deref().unwrap_or(&documents), &id).await?
        }
        // Handled before the config is loaded.
        Commands::HashPassword { .. } => {}
    }

    Ok(())
}
