//! Ply-indexed analysis store.
//!
//! The orchestrator is the only writer. Records are append-only: a ply is
//! recorded once, and its classification may be attached once afterwards
//! when it could not be computed at insertion time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Classification, CriticalMoments, PositionAnalysis, ScoreValue, SuggestedMove};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Ply {ply} is outside the game (0..{len})")]
    PlyOutOfRange { ply: usize, len: usize },
    #[error("Ply {0} is already recorded")]
    AlreadyRecorded(usize),
    #[error("Ply {0} has not been analyzed")]
    NotRecorded(usize),
    #[error("The initial position cannot be classified")]
    InitialPosition,
}

/// Analyses for every ply of one game, indexed by ply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStore {
    plies: Vec<Option<PositionAnalysis>>,
    critical: Option<CriticalMoments>,
}

impl AnalysisStore {
    /// An empty store for a game with `positions` positions (plies `0..positions`).
    pub fn new(positions: usize) -> Self {
        Self {
            plies: vec![None; positions],
            critical: None,
        }
    }

    /// Number of positions, analyzed or not.
    pub fn len(&self) -> usize {
        self.plies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plies.is_empty()
    }

    pub fn get(&self, ply: usize) -> Option<&PositionAnalysis> {
        self.plies.get(ply).and_then(Option::as_ref)
    }

    pub fn evaluation(&self, ply: usize) -> Option<ScoreValue> {
        self.get(ply).map(|a| a.evaluation)
    }

    /// Raw slots, one per ply.
    pub fn slots(&self) -> &[Option<PositionAnalysis>] {
        &self.plies
    }

    /// Recorded analyses in ply order.
    pub fn iter(&self) -> impl Iterator<Item = &PositionAnalysis> {
        self.plies.iter().flatten()
    }

    pub fn analyzed_count(&self) -> usize {
        self.iter().count()
    }

    /// Plies that have no analysis yet.
    pub fn unanalyzed(&self) -> Vec<usize> {
        self.plies
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(ply, _)| ply)
            .collect()
    }

    /// True when every ply has been analyzed.
    pub fn is_complete(&self) -> bool {
        self.plies.iter().all(Option::is_some)
    }

    /// Records the analysis of `analysis.ply`.
    pub fn insert(&mut self, analysis: PositionAnalysis) -> Result<(), StoreError> {
        let ply = analysis.ply;
        if ply == 0 && analysis.classification.is_some() {
            return Err(StoreError::InitialPosition);
        }
        let len = self.plies.len();
        let slot = self
            .plies
            .get_mut(ply)
            .ok_or(StoreError::PlyOutOfRange { ply, len })?;
        if slot.is_some() {
            return Err(StoreError::AlreadyRecorded(ply));
        }
        *slot = Some(analysis);
        Ok(())
    }

    /// Attaches a classification computed after the fact.
    ///
    /// Returns `Ok(false)` when the ply is already classified; stored
    /// classifications are never replaced.
    pub fn attach_classification(
        &mut self,
        ply: usize,
        classification: Classification,
        previous_evaluation: ScoreValue,
    ) -> Result<bool, StoreError> {
        if ply == 0 {
            return Err(StoreError::InitialPosition);
        }
        let len = self.plies.len();
        let analysis = self
            .plies
            .get_mut(ply)
            .ok_or(StoreError::PlyOutOfRange { ply, len })?
            .as_mut()
            .ok_or(StoreError::NotRecorded(ply))?;
        if analysis.classification.is_some() {
            return Ok(false);
        }
        analysis.classification = Some(classification);
        analysis.previous_evaluation = Some(previous_evaluation);
        Ok(true)
    }

    /// The engine's choice in the position before `ply`, i.e. the move the
    /// player at `ply` could have made instead.
    pub fn preferred_move(&self, ply: usize) -> Option<&SuggestedMove> {
        let previous = ply.checked_sub(1)?;
        self.get(previous)?.best_move.as_ref()
    }

    /// True when the move played into `ply` was the engine's first choice.
    pub fn played_best(&self, ply: usize) -> bool {
        match (self.get(ply).and_then(|a| a.played.as_ref()), self.preferred_move(ply)) {
            (Some(played), Some(best)) => played.uci == best.uci,
            _ => false,
        }
    }

    pub fn critical_moments(&self) -> Option<&CriticalMoments> {
        self.critical.as_ref()
    }

    /// Stores the critical-moment result; a second call is ignored.
    pub fn set_critical_moments(&mut self, moments: CriticalMoments) -> bool {
        if self.critical.is_some() {
            return false;
        }
        self.critical = Some(moments);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(ply: usize, cp: i32) -> PositionAnalysis {
        PositionAnalysis {
            ply,
            fen: String::new(),
            mover: None,
            played: None,
            best_move: None,
            lines: Vec::new(),
            evaluation: ScoreValue::Centipawns(cp),
            classification: None,
            previous_evaluation: None,
        }
    }

    #[test]
    fn insert_is_append_only() {
        let mut store = AnalysisStore::new(3);
        store.insert(analysis(1, 20)).unwrap();
        assert_eq!(store.insert(analysis(1, 30)), Err(StoreError::AlreadyRecorded(1)));
        assert_eq!(store.evaluation(1), Some(ScoreValue::Centipawns(20)));
        assert_eq!(
            store.insert(analysis(3, 0)),
            Err(StoreError::PlyOutOfRange { ply: 3, len: 3 })
        );
    }

    #[test]
    fn tracks_gaps() {
        let mut store = AnalysisStore::new(4);
        store.insert(analysis(0, 0)).unwrap();
        store.insert(analysis(2, 0)).unwrap();
        assert_eq!(store.unanalyzed(), vec![1, 3]);
        assert_eq!(store.analyzed_count(), 2);
        assert!(!store.is_complete());
    }

    #[test]
    fn classification_is_set_once() {
        let mut store = AnalysisStore::new(2);
        store.insert(analysis(1, -10)).unwrap();
        let prev = ScoreValue::Centipawns(0);
        assert_eq!(store.attach_classification(1, Classification::Best, prev), Ok(true));
        assert_eq!(
            store.attach_classification(1, Classification::Blunder, prev),
            Ok(false)
        );
        assert_eq!(store.get(1).unwrap().classification, Some(Classification::Best));
        assert_eq!(store.get(1).unwrap().previous_evaluation, Some(prev));
    }

    #[test]
    fn initial_position_is_never_classified() {
        let mut store = AnalysisStore::new(2);
        let mut first = analysis(0, 0);
        first.classification = Some(Classification::Good);
        assert_eq!(store.insert(first), Err(StoreError::InitialPosition));
        assert_eq!(
            store.attach_classification(0, Classification::Good, ScoreValue::Centipawns(0)),
            Err(StoreError::InitialPosition)
        );
    }

    #[test]
    fn classification_needs_a_record() {
        let mut store = AnalysisStore::new(2);
        assert_eq!(
            store.attach_classification(1, Classification::Good, ScoreValue::Centipawns(0)),
            Err(StoreError::NotRecorded(1))
        );
    }

    #[test]
    fn preferred_move_comes_from_the_previous_ply() {
        let mut store = AnalysisStore::new(3);
        let mut start = analysis(0, 0);
        start.best_move = Some(SuggestedMove {
            uci: "e2e4".to_string(),
            san: Some("e4".to_string()),
        });
        store.insert(start).unwrap();
        let mut reply = analysis(1, 0);
        reply.played = Some(crate::NotatedMove {
            san: "e4".to_string(),
            uci: "e2e4".to_string(),
            from: "e2".to_string(),
            to: "e4".to_string(),
        });
        store.insert(reply).unwrap();

        assert_eq!(store.preferred_move(0), None);
        assert_eq!(store.preferred_move(1).unwrap().display(), "e4");
        assert!(store.played_best(1));
        assert!(!store.played_best(2));
    }

    #[test]
    fn critical_moments_are_stored_once() {
        let mut store = AnalysisStore::new(1);
        assert!(store.set_critical_moments(CriticalMoments::default()));
        assert!(!store.set_critical_moments(CriticalMoments::default()));
    }
}
