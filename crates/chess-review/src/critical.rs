//! Critical-moment detection over a completed analysis.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::quality::mover_loss;
use crate::{Classification, Color, PositionAnalysis, ScoreValue};

/// Evaluation beyond which one side is considered better.
const STANCE_MARGIN: i32 = 50;

/// Why a ply was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentType {
    /// A blunder, miss or mistake.
    Blunder,
    /// A strong tactical shot (brilliant or great move).
    MissedTactic,
    /// A costly inaccuracy.
    Positional,
    /// The advantage changed hands.
    TurningPoint,
}

impl MomentType {
    pub fn label(self) -> &'static str {
        match self {
            MomentType::Blunder => "Significant Error",
            MomentType::MissedTactic => "Missed Tactical Opportunity",
            MomentType::Positional => "Positional Decision Point",
            MomentType::TurningPoint => "Game Turning Point",
        }
    }
}

impl fmt::Display for MomentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Flagged plies in ascending order, at most one tag each.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalMoments {
    moments: BTreeMap<usize, MomentType>,
}

impl CriticalMoments {
    pub fn get(&self, ply: usize) -> Option<MomentType> {
        self.moments.get(&ply).copied()
    }

    pub fn contains(&self, ply: usize) -> bool {
        self.moments.contains_key(&ply)
    }

    pub fn len(&self) -> usize {
        self.moments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moments.is_empty()
    }

    pub fn plies(&self) -> impl Iterator<Item = usize> + '_ {
        self.moments.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, MomentType)> + '_ {
        self.moments.iter().map(|(&ply, &kind)| (ply, kind))
    }

    /// First flagged ply after `ply`.
    pub fn next_after(&self, ply: usize) -> Option<usize> {
        self.moments.range(ply + 1..).next().map(|(&p, _)| p)
    }

    /// Last flagged ply before `ply`.
    pub fn previous_before(&self, ply: usize) -> Option<usize> {
        self.moments.range(..ply).next_back().map(|(&p, _)| p)
    }
}

/// Tuning of the detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Plies up to and including this index are never flagged.
    #[serde(default = "default_opening_phase")]
    pub opening_phase_half_moves: usize,
    /// Mover loss at which an inaccuracy becomes a positional moment.
    #[serde(default = "default_positional_loss")]
    pub positional_loss_threshold: i32,
}

fn default_opening_phase() -> usize {
    16
}

fn default_positional_loss() -> i32 {
    80
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            opening_phase_half_moves: default_opening_phase(),
            positional_loss_threshold: default_positional_loss(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stance {
    White,
    Black,
    Even,
}

fn stance(score: ScoreValue) -> Stance {
    let cp = score.to_centipawn_equivalent();
    if cp > STANCE_MARGIN {
        Stance::White
    } else if cp < -STANCE_MARGIN {
        Stance::Black
    } else {
        Stance::Even
    }
}

/// Scans per-ply analyses (indexed by ply) and flags critical moments.
pub fn detect(plies: &[Option<PositionAnalysis>], config: &DetectorConfig) -> CriticalMoments {
    let mut moments = BTreeMap::new();
    for ply in 1..plies.len() {
        if ply <= config.opening_phase_half_moves {
            continue;
        }
        let (Some(previous), Some(current)) = (&plies[ply - 1], &plies[ply]) else {
            continue;
        };
        let Some(classification) = current.classification else {
            continue;
        };
        if let Some(kind) = judge(previous, current, classification, config) {
            moments.insert(ply, kind);
        }
    }
    CriticalMoments { moments }
}

fn judge(
    previous: &PositionAnalysis,
    current: &PositionAnalysis,
    classification: Classification,
    config: &DetectorConfig,
) -> Option<MomentType> {
    match classification {
        Classification::Blunder | Classification::Miss | Classification::Mistake => {
            return Some(MomentType::Blunder)
        }
        _ => {}
    }

    let before = stance(previous.evaluation);
    let after = stance(current.evaluation);
    if before != after && before != Stance::Even && after != Stance::Even {
        return Some(MomentType::TurningPoint);
    }

    let mover = current.mover.unwrap_or(if current.ply % 2 == 1 {
        Color::White
    } else {
        Color::Black
    });
    let loss = mover_loss(previous.evaluation, current.evaluation, mover);
    match classification {
        Classification::Inaccuracy if loss >= config.positional_loss_threshold => {
            Some(MomentType::Positional)
        }
        Classification::Brilliant | Classification::Great => Some(MomentType::MissedTactic),
        _ => None,
    }
}
