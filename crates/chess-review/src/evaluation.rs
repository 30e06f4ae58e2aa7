//! Chess position evaluation types.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Color;

/// Magnitude a forced mate collapses to in centipawn comparisons.
pub const MATE_CENTIPAWNS: i32 = 9999;

/// Represents a chess position evaluation.
///
/// Evaluations can be either centipawn scores (for normal positions)
/// or mate scores (when a forced mate is found). Which side a positive
/// value favors depends on where the score came from: engine lines use the
/// side to move, the canonical evaluation of a [`PositionAnalysis`] uses
/// White.
///
/// [`PositionAnalysis`]: crate::PositionAnalysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreValue {
    /// Centipawn evaluation.
    Centipawns(i32),
    /// Forced mate in N plies; the sign tells which side delivers it.
    /// `MateIn(0)` is the engine's "side to move is already mated".
    MateIn(i32),
}

impl ScoreValue {
    /// Converts an engine-reported score.
    pub fn from_uci(score: uci::Score) -> Self {
        match score {
            uci::Score::Cp(cp) => ScoreValue::Centipawns(cp),
            uci::Score::Mate(n) => ScoreValue::MateIn(n),
        }
    }

    /// Collapses the score to a single comparable number.
    pub fn to_centipawn_equivalent(self) -> i32 {
        match self {
            ScoreValue::Centipawns(cp) => cp,
            ScoreValue::MateIn(n) if n > 0 => MATE_CENTIPAWNS,
            ScoreValue::MateIn(_) => -MATE_CENTIPAWNS,
        }
    }

    /// Returns true for mate scores.
    pub fn is_mate(self) -> bool {
        matches!(self, ScoreValue::MateIn(_))
    }

    /// Mate distance, if this is a mate score.
    pub fn mate(self) -> Option<i32> {
        match self {
            ScoreValue::MateIn(n) => Some(n),
            ScoreValue::Centipawns(_) => None,
        }
    }

    /// Returns the score from the other side's point of view.
    pub fn flip(self) -> Self {
        match self {
            ScoreValue::Centipawns(cp) => ScoreValue::Centipawns(-cp),
            ScoreValue::MateIn(n) => ScoreValue::MateIn(-n),
        }
    }

    /// Re-expresses a side-to-move score so that positive favors White.
    ///
    /// `MateIn(0)` has no sign to flip; it becomes a one-ply mate for the
    /// side that delivered it.
    pub fn white_relative(self, side_to_move: Color) -> Self {
        match self {
            ScoreValue::MateIn(0) => ScoreValue::MateIn(-side_to_move.sign()),
            other if side_to_move == Color::White => other,
            other => other.flip(),
        }
    }

    /// Evaluation-bar fill for White, in percent (clamped to 2..=98).
    ///
    /// Expects a White-relative score.
    pub fn bar_percent(self) -> f64 {
        let cp = self.to_centipawn_equivalent() as f64;
        let percent = 50.0 + 50.0 * (2.0 / (1.0 + (-0.004 * cp).exp()) - 1.0);
        percent.clamp(2.0, 98.0)
    }

    fn rank_key(self) -> (u8, i32) {
        match self {
            // shorter mates against are worse, mated-now worst of all
            ScoreValue::MateIn(n) if n <= 0 => (0, -n),
            ScoreValue::Centipawns(cp) => (1, cp),
            // shorter mates for are better
            ScoreValue::MateIn(n) => (2, -n),
        }
    }
}

impl Ord for ScoreValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_key().cmp(&other.rank_key())
    }
}

impl PartialOrd for ScoreValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ScoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreValue::Centipawns(cp) => {
                let pawns = *cp as f64 / 100.0;
                if pawns > 0.0 {
                    write!(f, "+{:.1}", pawns)
                } else {
                    write!(f, "{:.1}", pawns)
                }
            }
            ScoreValue::MateIn(n) => write!(f, "M{}", n.abs()),
        }
    }
}
