//! Drives an engine session across every position of a game.
//!
//! Plies are submitted strictly one after another. A ply the engine could
//! not analyze is logged and left empty; the run always carries on. Each
//! stored ply is classified against the previous ply's evaluation. Critical
//! moments are detected once, as soon as every ply has an evaluation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Notify};

use crate::critical::{detect, DetectorConfig};
use crate::decoder::translate_continuation;
use crate::rules::{Outcome, Rules};
use crate::session::{EngineSession, RawAnalysis, SessionState};
use crate::{
    AnalysisStore, Classification, Color, MoveClassifier, Position, PositionAnalysis,
    PrincipalVariation, ScoreValue, SuggestedMove,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// There are no positions to analyze.
    #[error("Game has no positions to analyze")]
    EmptyGame,
    #[error("Position sequence has {positions} positions but the store holds {store}")]
    StoreMismatch { positions: usize, store: usize },
}

/// Search parameters for a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default = "default_depth")]
    pub depth: u32,
    #[serde(default = "default_multipv")]
    pub multipv: u32,
    /// Plies up to and including this index are labelled [`Classification::Book`].
    #[serde(default)]
    pub book_plies: usize,
    /// Relaunch the engine after it crashes mid-run.
    #[serde(default = "default_restart_on_crash")]
    pub restart_on_crash: bool,
}

fn default_depth() -> u32 {
    18
}

fn default_multipv() -> u32 {
    3
}

fn default_restart_on_crash() -> bool {
    true
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            multipv: default_multipv(),
            book_plies: 0,
            restart_on_crash: default_restart_on_crash(),
        }
    }
}

/// Plies of the review analyzed so far, across retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }
}

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Shared cancellation flag for a running review.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Result of a full pass over a game.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub store: AnalysisStore,
    pub outcome: RunOutcome,
}

/// Sequential analysis driver.
pub struct Orchestrator<R: Rules> {
    rules: R,
    classifier: MoveClassifier,
    settings: AnalysisSettings,
    detector: DetectorConfig,
    progress: watch::Sender<Progress>,
    cancel: CancelHandle,
}

impl<R: Rules> Orchestrator<R> {
    pub fn new(
        rules: R,
        settings: AnalysisSettings,
        classifier: MoveClassifier,
        detector: DetectorConfig,
    ) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self {
            rules,
            classifier,
            settings,
            detector,
            progress,
            cancel: CancelHandle::default(),
        }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Observes review progress.
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Analyzes every position in order.
    ///
    /// Critical moments are detected only when the run was not cancelled
    /// and left no gaps; otherwise see [`retry_unanalyzed`](Self::retry_unanalyzed)
    /// and [`detect_critical`](Self::detect_critical).
    pub async fn run(
        &self,
        session: &mut EngineSession,
        positions: &[Position],
    ) -> Result<RunReport, OrchestratorError> {
        if positions.is_empty() {
            return Err(OrchestratorError::EmptyGame);
        }
        let mut store = AnalysisStore::new(positions.len());
        let plies: Vec<usize> = (0..positions.len()).collect();
        tracing::info!("Analyzing {} positions", positions.len());

        let outcome = self.pass(session, positions, &plies, &mut store).await;
        self.detect_if_complete(outcome, &mut store);
        tracing::info!(
            "Analysis {:?}: {}/{} positions analyzed",
            outcome,
            store.analyzed_count(),
            store.len()
        );
        Ok(RunReport { store, outcome })
    }

    /// Re-submits the plies that have no analysis yet.
    ///
    /// Plies whose classification was blocked by a gap get it attached once
    /// the gap is filled.
    pub async fn retry_unanalyzed(
        &self,
        session: &mut EngineSession,
        positions: &[Position],
        store: &mut AnalysisStore,
    ) -> Result<RunOutcome, OrchestratorError> {
        if positions.is_empty() {
            return Err(OrchestratorError::EmptyGame);
        }
        if positions.len() != store.len() {
            return Err(OrchestratorError::StoreMismatch {
                positions: positions.len(),
                store: store.len(),
            });
        }
        let gaps = store.unanalyzed();
        tracing::info!("Retrying {} unanalyzed positions", gaps.len());

        let outcome = self.pass(session, positions, &gaps, store).await;
        self.detect_if_complete(outcome, store);
        Ok(outcome)
    }

    fn detect_if_complete(&self, outcome: RunOutcome, store: &mut AnalysisStore) {
        if outcome == RunOutcome::Cancelled {
            return;
        }
        if store.is_complete() {
            self.detect_critical(store);
        } else {
            tracing::info!(
                "Deferring critical moments: {} positions unanalyzed",
                store.unanalyzed().len()
            );
        }
    }

    /// Runs critical-moment detection once; later calls are no-ops.
    ///
    /// Callers that give up on remaining gaps call this directly; unanalyzed
    /// plies are then never flagged.
    pub fn detect_critical(&self, store: &mut AnalysisStore) -> bool {
        if store.critical_moments().is_some() {
            return false;
        }
        let moments = detect(store.slots(), &self.detector);
        tracing::info!("Found {} critical moments", moments.len());
        store.set_critical_moments(moments)
    }

    async fn pass(
        &self,
        session: &mut EngineSession,
        positions: &[Position],
        plies: &[usize],
        store: &mut AnalysisStore,
    ) -> RunOutcome {
        self.publish_progress(store);

        for &ply in plies {
            if self.cancel.is_cancelled() {
                tracing::info!("Analysis cancelled before ply {}", ply);
                return RunOutcome::Cancelled;
            }
            let position = &positions[ply];

            let searched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                raw = session.analyze(&position.fen, self.settings.depth, self.settings.multipv) => Some(raw),
            };
            let Some(raw) = searched else {
                tracing::info!("Analysis cancelled during ply {}", ply);
                session.stop().await;
                return RunOutcome::Cancelled;
            };

            match raw {
                Some(raw) => {
                    if !self.record(position, raw, store) {
                        tracing::warn!("Ply {}: nothing stored, skipping", ply);
                    }
                }
                None => {
                    tracing::warn!("Ply {}: no analysis ({:?}), skipping", ply, session.state());
                    self.recover(session).await;
                }
            }

            self.publish_progress(store);
        }
        RunOutcome::Completed
    }

    fn publish_progress(&self, store: &AnalysisStore) {
        self.progress.send_replace(Progress {
            completed: store.analyzed_count(),
            total: store.len(),
        });
    }

    async fn recover(&self, session: &mut EngineSession) {
        if session.state() != SessionState::Terminated || !self.settings.restart_on_crash {
            return;
        }
        if let Err(e) = session.restart().await {
            tracing::warn!("Engine restart failed: {}", e);
        }
    }

    /// Stores the analysis of one ply. Returns false when it had no usable
    /// evaluation or the store refused it.
    fn record(&self, position: &Position, raw: RawAnalysis, store: &mut AnalysisStore) -> bool {
        let board = match self.rules.board_from_fen(&position.fen) {
            Ok(board) => Some(board),
            Err(e) => {
                tracing::warn!("Ply {}: {}", position.ply, e);
                None
            }
        };

        let lines: Vec<PrincipalVariation> = raw
            .lines
            .into_iter()
            .map(|line| {
                let moves = board
                    .as_ref()
                    .map(|b| translate_continuation(&self.rules, b, &line.moves))
                    .unwrap_or_default()
                    .into_iter()
                    .map(|mv| mv.san)
                    .collect();
                PrincipalVariation {
                    rank: line.rank,
                    depth: line.depth,
                    score: line.score,
                    moves,
                    native: line.moves,
                }
            })
            .collect();

        let best_move = raw.best_move.token().map(|token| SuggestedMove {
            uci: token.to_string(),
            san: board
                .as_ref()
                .and_then(|b| self.rules.play_uci(b, token).ok())
                .map(|(_, mv)| mv.san),
        });

        let side_to_move = position.side_to_move;
        let evaluation = match lines.first() {
            Some(top) => top.score.white_relative(side_to_move),
            None => match board.as_ref().and_then(|b| self.rules.outcome(b)) {
                Some(Outcome::Checkmate) => ScoreValue::MateIn(0).white_relative(side_to_move),
                Some(Outcome::Stalemate) => ScoreValue::Centipawns(0),
                None => return false,
            },
        };

        let previous_evaluation = position
            .ply
            .checked_sub(1)
            .and_then(|previous| store.evaluation(previous));
        let classification = match (position.mover(), previous_evaluation) {
            (Some(mover), Some(before)) => Some(self.classify(position.ply, before, evaluation, mover)),
            _ => None,
        };

        tracing::debug!(
            "Ply {}: {} {:?}",
            position.ply,
            evaluation,
            classification
        );
        let inserted = store.insert(PositionAnalysis {
            ply: position.ply,
            fen: position.fen.clone(),
            mover: position.mover(),
            played: position.played.clone(),
            best_move,
            lines,
            evaluation,
            classification,
            previous_evaluation,
        });
        if let Err(e) = inserted {
            tracing::warn!("Ply {}: {}", position.ply, e);
            return false;
        }

        self.attach_lagging(store, position.ply + 1);
        true
    }

    /// Classifies `ply` if it was stored before its predecessor was known.
    fn attach_lagging(&self, store: &mut AnalysisStore, ply: usize) {
        let (Some(current), Some(before)) = (store.get(ply), store.evaluation(ply - 1)) else {
            return;
        };
        let Some(mover) = current.mover else {
            return;
        };
        if current.classification.is_some() {
            return;
        }
        let classification = self.classify(ply, before, current.evaluation, mover);
        if let Err(e) = store.attach_classification(ply, classification, before) {
            tracing::warn!("Ply {}: {}", ply, e);
        }
    }

    fn classify(
        &self,
        ply: usize,
        before: ScoreValue,
        after: ScoreValue,
        mover: Color,
    ) -> Classification {
        if ply <= self.settings.book_plies {
            Classification::Book
        } else {
            self.classifier.classify(before, after, mover)
        }
    }
}
