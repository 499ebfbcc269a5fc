//! # Docsift CLI (`docsift`)
//!
//! The `docsift` binary drives the document pipeline: database setup, batch
//! and watched ingestion, question answering over the sorted corpus, and the
//! repair commands.
//!
//! ## Usage
//!
//! ```bash
//! docsift --config ./config/docsift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsift init` | Create the SQLite database and run schema migrations |
//! | `docsift process [path]` | Ingest one file, or everything in the incoming directory |
//! | `docsift watch` | Watch the incoming directory and ingest as files arrive |
//! | `docsift ask "<question>"` | Answer a question from the indexed documents |
//! | `docsift reconcile` | Repair drift between the filesystem and the stores |
//! | `docsift rebuild` | Re-derive the database from the sorted tree |
//! | `docsift stats` | Show corpus statistics |

use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use std::path::PathBuf;

use docsift::classify::{self, Classifier};
use docsift::ingest::Coordinator;
use docsift::llm::LlmClient;
use docsift::metadata::MetadataStore;
use docsift::models::IngestOutcome;
use docsift::spell::SpellCorrector;
use docsift::store::SqliteVectorIndex;
use docsift::{answer, config, db, migrate, stats, watch};

/// Docsift CLI — a local-first document ingestion, classification, and
/// retrieval pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docsift.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docsift",
    about = "Docsift — a local-first document ingestion, classification, and retrieval pipeline",
    version,
    long_about = "Docsift watches a drop directory, classifies each arriving document into a \
    category tree, files it away atomically, and indexes its text for semantic question \
    answering over the sorted corpus."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docsift.toml`. All path, classifier, embedding,
    /// and retrieval settings are read from this file.
    #[arg(long, global = true, default_value = "./config/docsift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (files,
    /// vectors). This command is idempotent — running it multiple times
    /// is safe.
    Init,

    /// Ingest documents.
    ///
    /// With a path, ingests that single file. Without one, ingests every
    /// file currently in the incoming directory. Each file is hashed,
    /// deduplicated, classified, moved into the sorted tree, chunked, and
    /// indexed.
    Process {
        /// A single file to ingest instead of scanning the incoming directory.
        path: Option<PathBuf>,
    },

    /// Watch the incoming directory and ingest files as they arrive.
    ///
    /// Performs a startup scan of the incoming directory first, then watches
    /// both trees: new files in incoming are ingested after a debounce
    /// window, and files removed from the sorted tree have their records
    /// purged. Runs until interrupted.
    Watch,

    /// Answer a question from the indexed documents.
    ///
    /// Spell-corrects the question, retrieves the closest chunks, and asks
    /// the configured generative model to answer strictly from them. Without
    /// a generative model the matching passages are shown instead.
    Ask {
        /// The question to answer.
        query: String,

        /// Number of chunks to retrieve (defaults to `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Skip query spell correction.
        #[arg(long)]
        no_spell: bool,
    },

    /// Repair drift between the filesystem and the stores.
    ///
    /// Purges records whose file vanished, re-indexes files whose chunks are
    /// missing, and drops vectors with no backing record.
    Reconcile,

    /// Re-derive the database from the sorted tree.
    ///
    /// Walks the sorted directory and registers any file not already known
    /// by checksum, taking the category from its directory. Useful after
    /// restoring the sorted tree from a backup.
    Rebuild,

    /// Show corpus statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docsift=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let pool = db::connect(&cfg).await?;
    migrate::run_migrations(&pool).await?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized successfully.");
        }
        Commands::Process { path } => {
            let ctx = PipelineContext::new(&cfg, &pool)?;
            let coordinator = ctx.coordinator(&cfg);
            match path {
                Some(path) => match coordinator.process_one(&path).await? {
                    IngestOutcome::Ingested {
                        category,
                        stored_path,
                        chunks,
                        ..
                    } => {
                        println!(
                            "Ingested into {} ({} chunks): {}",
                            category,
                            chunks,
                            stored_path.display()
                        );
                    }
                    IngestOutcome::Duplicate { existing_id } => {
                        println!("Duplicate of existing record {} — removed.", existing_id);
                    }
                    IngestOutcome::Skipped { reason } => {
                        println!("Skipped: {}", reason);
                    }
                },
                None => {
                    let summary = coordinator.process_pending().await?;
                    println!(
                        "Processed: {} ingested, {} duplicates, {} skipped, {} failed.",
                        summary.ingested, summary.duplicates, summary.skipped, summary.failed
                    );
                }
            }
        }
        Commands::Watch => {
            let ctx = PipelineContext::new(&cfg, &pool)?;
            let coordinator = ctx.coordinator(&cfg);
            watch::run(&cfg, &coordinator).await?;
        }
        Commands::Ask {
            query,
            top_k,
            no_spell,
        } => {
            let ctx = PipelineContext::new(&cfg, &pool)?;
            let spell = (cfg.spell.enabled && !no_spell)
                .then(|| build_spell_corrector(&cfg));
            let engine = answer::AnswerEngine::new(&cfg, &ctx.index, &ctx.llm, spell.as_ref());
            let response = engine
                .ask(&query, top_k.unwrap_or(cfg.retrieval.top_k))
                .await?;

            println!("{}\n", response.answer);
            println!("Confidence: {}%", response.confidence);
            if !response.sources.is_empty() {
                println!("Sources: {}", response.sources.join(", "));
            }
            for snippet in &response.snippets {
                println!(
                    "\n[{} | {} | {}%]\n{}",
                    snippet.filename, snippet.category, snippet.relevance_pct, snippet.text
                );
            }
        }
        Commands::Reconcile => {
            let ctx = PipelineContext::new(&cfg, &pool)?;
            let coordinator = ctx.coordinator(&cfg);
            let report = coordinator.reconcile().await?;
            println!(
                "Reconciled: {} missing files purged, {} re-indexed, {} orphan vectors removed.",
                report.missing_files_purged, report.reindexed, report.orphan_vectors_removed
            );
        }
        Commands::Rebuild => {
            let ctx = PipelineContext::new(&cfg, &pool)?;
            let coordinator = ctx.coordinator(&cfg);
            let summary = coordinator.rebuild_from(&cfg.paths.sorted).await?;
            println!(
                "Rebuilt: {} registered, {} already known, {} failed.",
                summary.ingested, summary.duplicates, summary.failed
            );
        }
        Commands::Stats => {
            let ctx = PipelineContext::new(&cfg, &pool)?;
            let stats = stats::gather(&cfg, &ctx.metadata, &ctx.index).await?;
            stats::print(&stats);
        }
    }

    Ok(())
}

/// The long-lived collaborators every pipeline command needs.
struct PipelineContext {
    metadata: MetadataStore,
    index: SqliteVectorIndex,
    classifier: Classifier,
    llm: LlmClient,
}

impl PipelineContext {
    fn new(cfg: &config::Config, pool: &SqlitePool) -> Result<Self> {
        Ok(Self {
            metadata: MetadataStore::new(pool.clone()),
            index: SqliteVectorIndex::new(
                pool.clone(),
                cfg.embedding.clone(),
                cfg.retrieval.clone(),
            ),
            classifier: Classifier::new(
                classify::default_taxonomy(),
                cfg.classifier.confidence_threshold,
            ),
            llm: LlmClient::new(&cfg.llm)?,
        })
    }

    fn coordinator<'a>(&'a self, cfg: &'a config::Config) -> Coordinator<'a> {
        Coordinator::new(cfg, &self.metadata, &self.index, &self.classifier, &self.llm)
    }
}

fn build_spell_corrector(cfg: &config::Config) -> SpellCorrector {
    let mut corrector = SpellCorrector::new(cfg.spell.threshold);
    corrector.add_terms(
        classify::default_taxonomy()
            .into_iter()
            .map(|rule| rule.name),
    );
    corrector
}
