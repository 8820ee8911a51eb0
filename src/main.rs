//! # Groundwork CLI (`gw`)
//!
//! ## Usage
//!
//! ```bash
//! gw --config ./config/gw.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gw init` | Create the SQLite database and run schema setup |
//! | `gw ingest [path]` | Chunk, embed and index text files |
//! | `gw retrieve "<query>"` | Print ranked passages without generation |
//! | `gw ask "<query>"` | Answer a question from indexed passages |
//! | `gw stats` | Show index statistics |
//! | `gw completions <shell>` | Print shell completions |
//!
//! Logs go to stderr and are controlled with `RUST_LOG`.

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use groundwork::ask::{self, QueryOverrides};
use groundwork::{config, ingest, migrate, stats};

/// Groundwork: answer questions from your own documents.
///
/// All commands except `completions` read a TOML configuration file. See
/// `config/gw.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "gw",
    about = "Groundwork: retrieval-augmented answers over local documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gw.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest text files into the index.
    ///
    /// Unchanged files are skipped. Changed files have their chunks replaced.
    Ingest {
        /// File or directory to ingest. Defaults to `[ingest].root`.
        path: Option<PathBuf>,

        /// Show file and chunk counts without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Retrieve and rank passages for a query, without generation.
    Retrieve {
        query: String,

        #[command(flatten)]
        retrieval: RetrievalArgs,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a query from the indexed documents.
    Ask {
        query: String,

        /// Split the query into sub-queries and merge their answers.
        #[arg(long)]
        decompose: bool,

        #[command(flatten)]
        retrieval: RetrievalArgs,

        /// Maximum tokens in the generated answer.
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Sampling temperature (0.0 to 2.0).
        #[arg(long)]
        temperature: Option<f32>,

        /// Print the answer as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats,

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

/// Retrieval overrides shared by `retrieve` and `ask`.
#[derive(Args, Clone, Copy)]
struct RetrievalArgs {
    /// Number of first-pass search hits.
    #[arg(long)]
    top_k: Option<usize>,

    /// Minimum rerank score a passage needs to be kept.
    #[arg(long)]
    min_score: Option<f32>,

    /// Neighboring chunks added around each hit.
    #[arg(long)]
    context_window: Option<usize>,
}

impl RetrievalArgs {
    fn overrides(self) -> QueryOverrides {
        QueryOverrides {
            top_k: self.top_k,
            min_score: self.min_score,
            context_window: self.context_window,
            ..Default::default()
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gw=info,groundwork=info,groundwork_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(shell, &mut cmd, name, &mut std::io::stdout());
        return Ok(());
    }

    init_tracing();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path, dry_run } => {
            ingest::run_ingest(&cfg, path, dry_run).await?;
        }
        Commands::Retrieve {
            query,
            retrieval,
            json,
        } => {
            ask::run_retrieve(&cfg, &query, retrieval.overrides(), json).await?;
        }
        Commands::Ask {
            query,
            decompose,
            retrieval,
            max_tokens,
            temperature,
            json,
        } => {
            let overrides = QueryOverrides {
                max_output_tokens: max_tokens,
                temperature,
                ..retrieval.overrides()
            };
            ask::run_ask(&cfg, &query, decompose, overrides, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
