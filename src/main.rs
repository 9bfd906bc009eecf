//! # cverag CLI
//!
//! The `cverag` binary is the primary interface for the service. It provides
//! commands for database initialization, feed ingestion, question answering,
//! search, record retrieval, and starting the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! cverag --config ./config/cverag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cverag init` | Create the SQLite database and run schema migrations |
//! | `cverag seed` | Rebuild the index from the entire feed |
//! | `cverag sync` | Incremental update since the last checkpoint |
//! | `cverag query "<question>"` | Ask a question grounded in indexed records |
//! | `cverag search "<query>"` | Semantic search over indexed records |
//! | `cverag get <cve_id>` | Retrieve a record by identifier |
//! | `cverag stats` | Show index statistics |
//! | `cverag serve api` | Start the HTTP API server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cverag::answer;
use cverag::app::AppContext;
use cverag::config;
use cverag::index;
use cverag::migrate;
use cverag::seed;
use cverag::server;
use cverag::stats;
use cverag::sync;

/// cverag — a local-first CVE ingestion and retrieval-augmented answering
/// service.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cverag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cverag",
    about = "cverag — a local-first CVE ingestion and retrieval-augmented answering service",
    version,
    long_about = "cverag keeps a SQLite-backed semantic index of vulnerability records in sync \
    with the remote NVD feed and answers natural-language questions by retrieving the most \
    relevant records and conditioning a language model on them."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cverag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Rebuild the index from the entire feed.
    ///
    /// Fetches every record (no date filter), normalizes, embeds, and writes
    /// in fixed-size batches. The first batch replaces any existing index
    /// content.
    Seed {
        /// Documents per bulk write.
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Incrementally sync records modified since the last checkpoint.
    ///
    /// Covers the window from the persisted watermark (or the default
    /// look-back on first run) to now, then advances the watermark.
    Sync,

    /// Ask a question grounded in the indexed records.
    Query {
        /// The question to answer.
        question: String,

        /// Number of records to retrieve as context.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Semantic search over indexed records.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Retrieve a record by its identifier (e.g. CVE-2024-12345).
    Get {
        /// Record identifier; matched case-insensitively.
        cve_id: String,
    },

    /// Show index statistics.
    Stats,

    /// Start the HTTP API server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the JSON API consumed by the web front end.
    Api,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    // init runs before any context exists (and without llm credentials)
    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let ctx = AppContext::new(cfg).await?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Seed { batch_size } => {
            seed::run_seed(&ctx, batch_size).await?;
        }
        Commands::Sync => {
            sync::run_update(&ctx).await?;
        }
        Commands::Query { question, k } => {
            let k = k.unwrap_or(ctx.config.retrieval.top_k);
            run_query(&ctx, &question, k).await;
        }
        Commands::Search { query, limit } => {
            run_search(&ctx, &query, limit.unwrap_or(10)).await?;
        }
        Commands::Get { cve_id } => {
            run_get(&ctx, &cve_id).await;
        }
        Commands::Stats => {
            stats::run_stats(&ctx).await?;
        }
        Commands::Serve { service } => match service {
            ServeService::Api => {
                server::run_server(ctx).await?;
                return Ok(());
            }
        },
    }

    ctx.close().await;
    Ok(())
}

async fn run_query(ctx: &AppContext, question: &str, k: usize) {
    match answer::answer(ctx, question, &[], k).await {
        Ok(result) => {
            println!("ANSWER:");
            println!("{}", "-".repeat(70));
            println!("{}", result.answer);
            println!();
            println!("SOURCE CVEs (Most Relevant):");
            println!("{}", "=".repeat(70));
            for (i, source) in result.sources.iter().enumerate() {
                println!("[{}] {}", i + 1, source.cve_id);
                println!("    Severity: {} (Score: {})", source.severity, source.score);
                println!("    Status: {}", source.status);
                println!("    Published: {}", source.published);
            }
        }
        Err(e) => {
            eprintln!("Error ({} stage): {}", e.stage(), e);
            std::process::exit(1);
        }
    }
}

async fn run_search(ctx: &AppContext, query: &str, limit: usize) -> anyhow::Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let results = answer::retrieve(ctx, query, limit).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, scored) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} — {} (Score: {})",
            i + 1,
            scored.similarity,
            scored.doc.cve_id,
            scored.doc.severity,
            scored.doc.score
        );
        println!("    status: {}", scored.doc.status);
        println!("    published: {}", answer::date_portion(&scored.doc.published));
        println!(
            "    excerpt: \"{}\"",
            scored
                .doc
                .body
                .replace('\n', " ")
                .chars()
                .take(120)
                .collect::<String>()
                .trim()
        );
        println!();
    }

    Ok(())
}

async fn run_get(ctx: &AppContext, cve_id: &str) {
    let stored = match index::get_by_cve_id(&ctx.pool, &cve_id.to_uppercase()).await {
        Ok(Some(stored)) => stored,
        Ok(None) => {
            eprintln!("Error: record not found: {}", cve_id.to_uppercase());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let doc = stored.doc;
    println!("--- Record ---");
    println!("cve_id:        {}", doc.cve_id);
    println!("severity:      {} (Score: {})", doc.severity, doc.score);
    println!("status:        {}", doc.status);
    println!("published:     {}", doc.published);
    println!("last_modified: {}", doc.last_modified);
    println!("source:        {}", doc.source);
    println!("year:          {}", doc.year);
    println!();
    println!("--- Body ---");
    println!("{}", doc.body);
}
