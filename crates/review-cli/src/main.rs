//! Chess Review - Engine-backed review of PGN games.
//!
//! Analyzes every position of a game with a UCI engine, prints the move
//! labels and critical moments, and keeps finished reviews in SQLite.

mod report;

use std::path::{Path, PathBuf};

use anyhow::Context;
use chess_review::journal::patterns;
use chess_review::{
    build_positions, EngineSession, GameRecord, Journal, JournalEntry, Orchestrator,
    ReviewArchive, ReviewConfig, RunOutcome, SavedReview, ShakmatyRules, SqliteBlobStore,
};
use clap::{Parser, Subcommand};
use tokio::signal;

/// Chess Review - Engine-backed review of PGN games.
#[derive(Parser, Debug)]
#[command(name = "chess-review")]
#[command(about = "Engine-backed chess game review")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "review.toml")]
    config: PathBuf,

    /// Path to the SQLite database (overrides the config file)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a PGN game
    Analyze {
        /// PGN file containing the game
        pgn: PathBuf,
        /// Engine executable
        #[arg(long)]
        engine: Option<PathBuf>,
        /// Search depth per position
        #[arg(short, long)]
        depth: Option<u32>,
        /// Number of engine lines per position
        #[arg(long)]
        multipv: Option<u32>,
        /// Do not store the review
        #[arg(long)]
        no_save: bool,
        /// Also add the review to the journal
        #[arg(long)]
        journal: bool,
    },
    /// Manage stored reviews
    Reviews {
        #[command(subcommand)]
        command: ReviewsCommand,
    },
    /// Show the training journal
    Journal {
        #[command(subcommand)]
        command: JournalCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ReviewsCommand {
    /// List stored reviews, newest first
    List,
    /// Print a stored review
    Show { id: String },
    /// Delete a stored review
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum JournalCommand {
    /// List journal entries with their takeaways
    List,
    /// Trends across journal entries
    Patterns,
    /// Replace the notes of an entry
    Note { id: String, text: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut config = ReviewConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(db) = cli.db {
        config.storage.database = db;
    }

    match cli.command {
        Commands::Analyze {
            pgn,
            engine,
            depth,
            multipv,
            no_save,
            journal,
        } => {
            if let Some(engine) = engine {
                config.engine.path = engine;
            }
            if let Some(depth) = depth {
                config.analysis.depth = depth;
            }
            if let Some(multipv) = multipv {
                config.analysis.multipv = multipv;
            }
            config.validate()?;
            analyze(&config, &pgn, !no_save, journal).await
        }
        Commands::Reviews { command } => {
            let db = open_db(&config)?;
            let archive = ReviewArchive::new(&db);
            match command {
                ReviewsCommand::List => {
                    for review in archive.list()? {
                        println!("{}", report::review_line(&review));
                    }
                }
                ReviewsCommand::Show { id } => {
                    let review = archive
                        .get(&id)?
                        .with_context(|| format!("no review with id {}", id))?;
                    print_review(&review);
                }
                ReviewsCommand::Delete { id } => {
                    if archive.delete(&id)? {
                        println!("Deleted review {}", id);
                    } else {
                        println!("No review with id {}", id);
                    }
                }
            }
            Ok(())
        }
        Commands::Journal { command } => {
            let db = open_db(&config)?;
            let journal = Journal::new(&db);
            match command {
                JournalCommand::List => {
                    for entry in journal.entries()? {
                        for line in report::journal_lines(&entry) {
                            println!("{}", line);
                        }
                    }
                }
                JournalCommand::Patterns => {
                    let found = patterns(&journal.entries()?);
                    if found.is_empty() {
                        println!("Not enough journal entries to find patterns");
                    }
                    for pattern in &found {
                        println!("{}", report::pattern_line(pattern));
                    }
                }
                JournalCommand::Note { id, text } => {
                    if !journal.update_notes(&id, &text)? {
                        anyhow::bail!("no journal entry with id {}", id);
                    }
                }
            }
            Ok(())
        }
    }
}

fn open_db(config: &ReviewConfig) -> anyhow::Result<SqliteBlobStore> {
    let path = &config.storage.database;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    SqliteBlobStore::open(path).with_context(|| format!("opening {}", path.display()))
}

async fn analyze(
    config: &ReviewConfig,
    pgn: &Path,
    save: bool,
    add_to_journal: bool,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(pgn)
        .with_context(|| format!("reading {}", pgn.display()))?;
    let record = GameRecord::parse(&text)?;
    let positions = build_positions(&ShakmatyRules, &record)?;

    tracing::info!("Engine: {}", config.engine.path.display());
    let mut session = EngineSession::spawn(&config.engine.path, config.engine.session_options())?;
    session.start().await?;

    let orchestrator = Orchestrator::new(
        ShakmatyRules,
        config.analysis.clone(),
        config.classification.classifier()?,
        config.critical.clone(),
    );

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("Cancellation requested");
            cancel.cancel();
        }
    });

    let mut progress = orchestrator.progress();
    let progress_task = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let current = *progress.borrow_and_update();
            eprint!("\rAnalyzing {}/{}", current.completed, current.total);
        }
        eprintln!();
    });

    let mut result = orchestrator.run(&mut session, &positions).await?;
    if result.outcome == RunOutcome::Completed && !result.store.is_complete() {
        tracing::info!("Retrying {} positions", result.store.unanalyzed().len());
        result.outcome = orchestrator
            .retry_unanalyzed(&mut session, &positions, &mut result.store)
            .await?;
    }
    if result.outcome == RunOutcome::Completed && !result.store.is_complete() {
        tracing::warn!(
            "Giving up on {} positions",
            result.store.unanalyzed().len()
        );
        orchestrator.detect_critical(&mut result.store);
    }
    session.terminate().await;
    drop(orchestrator);
    let _ = progress_task.await;

    if result.outcome == RunOutcome::Cancelled {
        println!(
            "Analysis cancelled after {} of {} positions",
            result.store.analyzed_count(),
            result.store.len()
        );
        return Ok(());
    }

    let review = SavedReview::new(&record, result.store);
    print_review(&review);

    if save {
        let db = open_db(config)?;
        ReviewArchive::new(&db).save(&review)?;
        println!("Saved review {}", review.id);
        if add_to_journal {
            let entry = JournalEntry::from_review(&review);
            Journal::new(&db).record(&entry)?;
            println!("Added journal entry {}", entry.id);
        }
    }
    Ok(())
}

fn print_review(review: &SavedReview) {
    println!("{}", review.title());
    for line in report::move_table(&review.analysis) {
        println!("{}", line);
    }
    println!();
    for line in report::summary(
        &review.stats,
        review.headers.white_name(),
        review.headers.black_name(),
    ) {
        println!("{}", line);
    }
}
