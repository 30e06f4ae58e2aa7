//! Engine-backed review of chess games.
//!
//! This crate drives a UCI engine over every position of a game, labels each
//! move by how much evaluation it gave away, and flags the critical moments
//! worth revisiting.
//!
//! # Overview
//!
//! - [`EngineSession`] - One long-lived UCI engine process
//! - [`MoveClassifier`] - Maps evaluation loss to a [`Classification`]
//! - [`Orchestrator`] - Sequential analysis of a whole game into an [`AnalysisStore`]
//! - [`critical::detect`] - Critical-moment detection over a finished store
//! - [`ReviewArchive`] / [`Journal`] - SQLite persistence of finished reviews
//!
//! # Example
//!
//! ```ignore
//! use chess_review::{build_positions, EngineSession, GameRecord, Orchestrator, ShakmatyRules};
//!
//! let record = GameRecord::parse(&pgn)?;
//! let positions = build_positions(&ShakmatyRules, &record)?;
//! let mut session = EngineSession::spawn("stockfish", SessionOptions::default())?;
//! session.start().await?;
//! let orchestrator = Orchestrator::new(ShakmatyRules, settings, classifier, detector);
//! let report = orchestrator.run(&mut session, &positions).await?;
//! println!("{} critical moments", report.store.critical_moments().map_or(0, |m| m.len()));
//! ```

pub mod analysis;
pub mod color;
pub mod config;
pub mod critical;
pub mod decoder;
pub mod evaluation;
pub mod game_record;
pub mod journal;
pub mod orchestrator;
pub mod persistence;
pub mod position;
pub mod quality;
pub mod rules;
pub mod session;
pub mod stats;
pub mod store;

pub use analysis::{PositionAnalysis, PrincipalVariation, SuggestedMove};
pub use color::Color;
pub use config::{ConfigError, ReviewConfig};
pub use critical::{CriticalMoments, DetectorConfig, MomentType};
pub use evaluation::{ScoreValue, MATE_CENTIPAWNS};
pub use game_record::{build_positions, GameHeaders, GameRecord, GameRecordError};
pub use journal::{Journal, JournalEntry};
pub use orchestrator::{
    AnalysisSettings, CancelHandle, Orchestrator, OrchestratorError, Progress, RunOutcome,
    RunReport,
};
pub use persistence::{
    BlobStore, PersistenceError, ReviewArchive, SavedReview, SqliteBlobStore,
};
pub use position::{NotatedMove, Position};
pub use quality::{Classification, LossLadder, MoveClassifier, Rung};
pub use rules::{Rules, RulesError, ShakmatyRules};
pub use session::{EngineError, EngineSession, SessionOptions, SessionState};
pub use stats::{GameStats, PlayerStats};
pub use store::{AnalysisStore, StoreError};
