//! Per-ply analysis records.

use serde::{Deserialize, Serialize};

use crate::{Classification, Color, NotatedMove, ScoreValue};

/// One engine line, translated for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalVariation {
    /// MultiPV rank, 1 = best.
    pub rank: u32,
    pub depth: u32,
    /// Score from the side to move's point of view, as the engine reported it.
    pub score: ScoreValue,
    /// Continuation in SAN; truncated at the first move the rules rejected.
    pub moves: Vec<String>,
    /// Continuation as the engine sent it.
    pub native: Vec<String>,
}

/// The engine's recommended move for a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedMove {
    pub uci: String,
    /// SAN, when the token was legal in the analyzed position.
    pub san: Option<String>,
}

impl SuggestedMove {
    /// SAN when known, engine notation otherwise.
    pub fn display(&self) -> &str {
        self.san.as_deref().unwrap_or(&self.uci)
    }
}

/// Result of analyzing one position of the game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionAnalysis {
    pub ply: usize,
    pub fen: String,
    /// Color that played into this position; `None` at ply 0.
    pub mover: Option<Color>,
    /// The move that produced this position; `None` at ply 0.
    pub played: Option<NotatedMove>,
    /// `None` when the position has no legal moves.
    pub best_move: Option<SuggestedMove>,
    /// Engine lines ordered by rank.
    pub lines: Vec<PrincipalVariation>,
    /// Canonical evaluation, positive favoring White.
    pub evaluation: ScoreValue,
    pub classification: Option<Classification>,
    /// Canonical evaluation of the previous ply, when it was analyzed.
    pub previous_evaluation: Option<ScoreValue>,
}

impl PositionAnalysis {
    /// Rank-1 line, if the engine produced any.
    pub fn top_line(&self) -> Option<&PrincipalVariation> {
        self.lines.first()
    }
}
