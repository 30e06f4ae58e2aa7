//! Move quality classification.
//!
//! Both evaluations handed to the classifier use the White-positive
//! convention of [`PositionAnalysis::evaluation`](crate::PositionAnalysis).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Color, ScoreValue};

/// Quality label of a played move, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Brilliant,
    Great,
    Best,
    Excellent,
    Good,
    /// Known opening theory.
    Book,
    Inaccuracy,
    Mistake,
    /// A missed win.
    Miss,
    Blunder,
}

impl Classification {
    pub const ALL: [Classification; 10] = [
        Classification::Brilliant,
        Classification::Great,
        Classification::Best,
        Classification::Excellent,
        Classification::Good,
        Classification::Book,
        Classification::Inaccuracy,
        Classification::Mistake,
        Classification::Miss,
        Classification::Blunder,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Classification::Brilliant => "Brilliant",
            Classification::Great => "Great",
            Classification::Best => "Best",
            Classification::Excellent => "Excellent",
            Classification::Good => "Good",
            Classification::Book => "Book",
            Classification::Inaccuracy => "Inaccuracy",
            Classification::Mistake => "Mistake",
            Classification::Miss => "Missed Win",
            Classification::Blunder => "Blunder",
        }
    }

    /// Annotation glyph appended to the move in listings.
    pub fn symbol(self) -> &'static str {
        match self {
            Classification::Brilliant => "!!",
            Classification::Great => "!",
            Classification::Inaccuracy => "?!",
            Classification::Mistake => "?",
            Classification::Miss | Classification::Blunder => "??",
            _ => "",
        }
    }

    /// Blunder, miss or mistake.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Classification::Mistake | Classification::Miss | Classification::Blunder
        )
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One step of a [`LossLadder`]: losses up to and including `max_loss` get `label`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rung {
    pub max_loss: i32,
    pub label: Classification,
}

impl Rung {
    pub const fn new(max_loss: i32, label: Classification) -> Self {
        Self { max_loss, label }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LadderError {
    #[error("Ladder rungs must be strictly ascending ({previous} then {next})")]
    NotAscending { previous: i32, next: i32 },
}

/// Ordered centipawn-loss thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossLadder {
    rungs: Vec<Rung>,
    above: Classification,
}

impl LossLadder {
    /// Builds a ladder; `above` applies to losses beyond the last rung.
    pub fn new(rungs: Vec<Rung>, above: Classification) -> Result<Self, LadderError> {
        for pair in rungs.windows(2) {
            if pair[1].max_loss <= pair[0].max_loss {
                return Err(LadderError::NotAscending {
                    previous: pair[0].max_loss,
                    next: pair[1].max_loss,
                });
            }
        }
        Ok(Self { rungs, above })
    }

    pub fn rungs(&self) -> &[Rung] {
        &self.rungs
    }

    pub fn above(&self) -> Classification {
        self.above
    }

    /// Label for a loss measured from the mover's point of view.
    pub fn label_for(&self, loss: i32) -> Classification {
        self.rungs
            .iter()
            .find(|rung| loss <= rung.max_loss)
            .map(|rung| rung.label)
            .unwrap_or(self.above)
    }
}

impl Default for LossLadder {
    fn default() -> Self {
        Self {
            rungs: vec![
                Rung::new(-51, Classification::Brilliant),
                Rung::new(0, Classification::Great),
                Rung::new(10, Classification::Best),
                Rung::new(25, Classification::Excellent),
                Rung::new(50, Classification::Good),
                Rung::new(100, Classification::Inaccuracy),
                Rung::new(299, Classification::Mistake),
            ],
            above: Classification::Blunder,
        }
    }
}

/// Evaluation lost by `mover` between two White-positive evaluations.
///
/// Negative when the mover improved on the earlier assessment.
pub fn mover_loss(before: ScoreValue, after: ScoreValue, mover: Color) -> i32 {
    let before = before.to_centipawn_equivalent();
    let after = after.to_centipawn_equivalent();
    before.saturating_sub(after).saturating_mul(mover.sign())
}

/// Maps consecutive evaluations to a [`Classification`].
#[derive(Debug, Clone, Default)]
pub struct MoveClassifier {
    ladder: LossLadder,
}

impl MoveClassifier {
    pub fn new(ladder: LossLadder) -> Self {
        Self { ladder }
    }

    pub fn ladder(&self) -> &LossLadder {
        &self.ladder
    }

    /// Classifies the move `mover` played between `before` and `after`.
    pub fn classify(&self, before: ScoreValue, after: ScoreValue, mover: Color) -> Classification {
        if before.is_mate() || after.is_mate() {
            return classify_mate(before.mate(), after.mate(), mover);
        }
        self.ladder.label_for(mover_loss(before, after, mover))
    }
}

fn classify_mate(before: Option<i32>, after: Option<i32>, mover: Color) -> Classification {
    // positive: mate in the mover's favor
    let sign = mover.sign();
    match (before.map(|n| n * sign), after.map(|n| n * sign)) {
        (Some(b), Some(a)) if b > 0 && a > 0 && a <= b => Classification::Best,
        (Some(b), Some(a)) if b > 0 && a > 0 => Classification::Good,
        (Some(b), Some(a)) if b > 0 && a < 0 => Classification::Blunder,
        (None, Some(a)) if a > 0 => Classification::Brilliant,
        (None, Some(_)) => Classification::Blunder,
        (Some(b), None) if b > 0 => Classification::Mistake,
        _ => Classification::Good,
    }
}
