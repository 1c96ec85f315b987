//! # Raia Assist CLI (`raia`)
//!
//! The `raia` binary drives the whole pipeline: robots compliance checks,
//! crawling, chunking, PDF ingestion, index builds, one-shot questions,
//! job inspection, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! raia --config ./config/raia.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `raia init` | Write a starter config, create directories, run migrations |
//! | `raia robots --urls <file>` | robots.txt compliance report (JSON + CSV) |
//! | `raia fetch --urls <file>` | Crawl URLs into raw artifacts + manifest |
//! | `raia chunk` | Turn fetched pages into corpus documents |
//! | `raia pdf <path>` | Ingest a PDF (or every PDF in a directory) |
//! | `raia index build` | Embed the corpus and build the vector index |
//! | `raia ask "<question>"` | Answer one question with citations |
//! | `raia jobs list` | Inspect ingestion job history |
//! | `raia serve` | Start the HTTP API |
//! | `raia stats` | Corpus and index summary |
//!
//! ## Examples
//!
//! ```bash
//! # First run: config, directories, jobs database
//! raia init
//!
//! # Check crawling permissions before fetching anything
//! raia robots --urls seeds/gov_urls.txt
//!
//! # Crawl politely, skipping disallowed URLs from the report
//! raia fetch --urls seeds/gov_urls.txt --skip-disallowed
//!
//! # Build the corpus and the index
//! raia chunk
//! raia pdf docs/sha_handbook.pdf
//! raia index build
//!
//! # Ask a question from the terminal
//! raia ask "how do I register for NHIF?" --k 3
//!
//! # Serve the chat and ingestion API
//! raia serve --port 8080
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use raia_assist::config;
use raia_assist::models::Category;
use raia_assist::pdf::PdfOptions;
use raia_assist::progress::ProgressMode;
use raia_assist::{answer, corpus, fetch, index, jobs, migrate, pdf, robots, server, stats};

/// Raia Assist CLI — a retrieval-backed assistant for Kenyan government
/// services.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; `raia init` writes a starter file to that path.
#[derive(Parser)]
#[command(
    name = "raia",
    about = "Raia Assist — crawl, index, and answer questions about government services",
    version,
    long_about = "Raia Assist ingests government-service documents (web pages and PDFs), \
    chunks and classifies them into a citable corpus, embeds the corpus into a vector \
    index, and answers citizen questions with cited excerpts via a CLI and an HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/raia.toml`. Workspace layout, crawling
    /// politeness, embedding backend, and server settings are read from
    /// this file.
    #[arg(long, global = true, default_value = "./config/raia.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Write a starter config and initialize the workspace.
    ///
    /// Creates the config file (unless one already exists), the workspace
    /// directories, and the jobs database schema. Idempotent.
    Init,

    /// Generate a robots.txt compliance report for a URL list.
    ///
    /// Fetches robots.txt once per unique domain, resolves an
    /// allowed/disallowed/unknown verdict per URL, and writes the report
    /// as pretty JSON and CSV. `raia fetch --skip-disallowed` consumes the
    /// JSON form.
    Robots {
        /// URL list file: one URL per line, `#` comments allowed.
        #[arg(long)]
        urls: PathBuf,

        /// JSON report path (default: `<workspace>/robots_report.json`).
        #[arg(long)]
        json: Option<PathBuf>,

        /// CSV report path (default: `<workspace>/robots_report.csv`).
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Crawl a URL list into raw artifacts and a fetch manifest.
    ///
    /// Honors robots.txt, rate-limits between requests, and skips URLs
    /// whose artifacts already exist, so re-runs are idempotent. Per-URL
    /// failures are logged and never abort the run.
    Fetch {
        /// URL list file: one URL per line, `#` comments allowed.
        #[arg(long)]
        urls: PathBuf,

        /// Stop after this many URLs from the list.
        #[arg(long)]
        max_pages: Option<usize>,

        /// Re-fetch pages whose artifacts already exist.
        #[arg(long)]
        force: bool,

        /// Skip URLs marked disallowed in the robots report; URLs the
        /// report does not cover are checked live.
        #[arg(long)]
        skip_disallowed: bool,

        /// Progress output: `auto`, `json`, or `none`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Turn fetched pages into front-matter corpus documents.
    ///
    /// Reads the fetch manifest, cleans and chunks each page's text,
    /// classifies and tags it, and writes one corpus file per chunk.
    /// Existing files are skipped unless `--force` is set.
    Chunk {
        /// Rewrite corpus files that already exist.
        #[arg(long)]
        force: bool,

        /// Progress output: `auto`, `json`, or `none`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Ingest a PDF (or every PDF in a directory) into the corpus.
    ///
    /// Extracts and cleans the text, chunks it like a scraped page, and
    /// writes corpus documents. Title, category, and tags are derived from
    /// the file name and content unless overridden.
    Pdf {
        /// PDF file, or a directory to convert in bulk.
        path: PathBuf,

        /// Document title (default: derived from the file name).
        #[arg(long)]
        title: Option<String>,

        /// Category, e.g. `service_workflow` or `ministry_faq`
        /// (default: detected from the file name).
        #[arg(long)]
        category: Option<String>,

        /// Source attribution (default: `PDF: <file name>`).
        #[arg(long)]
        source: Option<String>,

        /// Rewrite corpus files that already exist.
        #[arg(long)]
        force: bool,

        /// Progress output: `auto`, `json`, or `none`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Manage the vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Answer one question from the index, with citations.
    Ask {
        /// The question to answer.
        question: String,

        /// Number of documents to retrieve.
        #[arg(long)]
        k: Option<usize>,

        /// Print per-hit rank, distance, and category.
        #[arg(long)]
        debug: bool,
    },

    /// Inspect ingestion jobs.
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Start the HTTP API server.
    ///
    /// Serves the chat endpoint, job queries, and background ingestion.
    /// Binds to `[server].bind` unless overridden here.
    Serve {
        /// Bind host (overrides the host part of `[server].bind`).
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides the port part of `[server].bind`).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print corpus, index, and job statistics.
    Stats,
}

/// Index subcommands.
#[derive(Subcommand)]
enum IndexAction {
    /// Embed the corpus and build the index artifacts.
    ///
    /// Scans the corpus in filename order, embeds each document, and
    /// writes the index artifact (`[index].backend` picks the format)
    /// plus the ordinal doc map. A rebuild replaces both wholesale.
    Build {
        /// Progress output: `auto`, `json`, or `none`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },
}

/// Job subcommands.
#[derive(Subcommand)]
enum JobsAction {
    /// List jobs, newest first.
    List {
        /// Maximum number of jobs to list.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show one job's status, error, and result payload.
    Show {
        /// Job id.
        id: String,
    },
    /// Re-run a failed job's source as a fresh job.
    ///
    /// The failed row stays in place as failure history.
    Retry {
        /// Job id of the failed job.
        id: String,
    },
}

/// Override the host and/or port of a `host:port` bind address.
fn override_bind(bind: &str, host: Option<&str>, port: Option<u16>) -> String {
    let (cfg_host, cfg_port) = bind.rsplit_once(':').unwrap_or((bind, "8080"));
    format!(
        "{}:{}",
        host.unwrap_or(cfg_host),
        port.map(|p| p.to_string())
            .unwrap_or_else(|| cfg_port.to_string())
    )
}

async fn run_init(config_path: &PathBuf) -> anyhow::Result<()> {
    if config_path.exists() {
        println!("Config already exists: {}", config_path.display());
    } else {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(config_path, config::starter_config_toml())?;
        println!("Wrote starter config: {}", config_path.display());
    }

    let cfg = config::load_config(config_path)?;
    for dir in [cfg.raw_dir(), cfg.corpus_dir(), cfg.index_dir()] {
        std::fs::create_dir_all(&dir)?;
    }
    migrate::run_migrations(&cfg).await?;
    println!("Workspace ready: {}", cfg.workspace.dir.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // init runs before config loading: the config file may not exist yet.
    if let Commands::Init = cli.command {
        return run_init(&cli.config).await;
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Robots { urls, json, csv } => {
            robots::run_robots_report(&cfg, &urls, json.as_deref(), csv.as_deref()).await?;
        }
        Commands::Fetch {
            urls,
            max_pages,
            force,
            skip_disallowed,
            progress,
        } => {
            let reporter = ProgressMode::from_flag(&progress).reporter();
            fetch::run_fetch(
                &cfg,
                &urls,
                max_pages,
                force,
                skip_disallowed,
                reporter.as_ref(),
            )
            .await?;
        }
        Commands::Chunk { force, progress } => {
            let reporter = ProgressMode::from_flag(&progress).reporter();
            corpus::run_chunk(&cfg, force, reporter.as_ref()).await?;
        }
        Commands::Pdf {
            path,
            title,
            category,
            source,
            force,
            progress,
        } => {
            let category = match category.as_deref() {
                Some(raw) => Some(Category::parse(raw).ok_or_else(|| {
                    anyhow::anyhow!(
                        "unknown category: {} (see `raia pdf --help` for examples)",
                        raw
                    )
                })?),
                None => None,
            };
            let opts = PdfOptions {
                title,
                category,
                source,
                tags: None,
            };
            let reporter = ProgressMode::from_flag(&progress).reporter();
            pdf::run_pdf(&cfg, &path, &opts, force, reporter.as_ref())?;
        }
        Commands::Index { action } => match action {
            IndexAction::Build { progress } => {
                let reporter = ProgressMode::from_flag(&progress).reporter();
                index::run_index_build(&cfg, reporter.as_ref()).await?;
            }
        },
        Commands::Ask { question, k, debug } => {
            answer::run_ask(&cfg, &question, k, debug).await?;
        }
        Commands::Jobs { action } => match action {
            JobsAction::List { limit } => {
                jobs::run_jobs_list(&cfg, limit).await?;
            }
            JobsAction::Show { id } => {
                jobs::run_jobs_show(&cfg, &id).await?;
            }
            JobsAction::Retry { id } => {
                jobs::run_jobs_retry(&cfg, &id).await?;
            }
        },
        Commands::Serve { host, port } => {
            let mut cfg = cfg;
            cfg.server.bind = override_bind(&cfg.server.bind, host.as_deref(), port);
            server::run_server(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
