//! Game statistics derived from a finished analysis.

use serde::{Deserialize, Serialize};

use crate::{AnalysisStore, Classification, Color};

/// Weight of a label in the accuracy score, out of 100.
fn accuracy_weight(classification: Classification) -> u32 {
    match classification {
        Classification::Brilliant
        | Classification::Great
        | Classification::Best
        | Classification::Book => 100,
        Classification::Excellent => 90,
        Classification::Good => 72,
        Classification::Inaccuracy => 40,
        Classification::Mistake => 14,
        Classification::Miss | Classification::Blunder => 0,
    }
}

/// Weighted accuracy of a set of labels, rounded to a whole percent.
///
/// An empty set scores 0.
pub fn accuracy<I>(classifications: I) -> u32
where
    I: IntoIterator<Item = Classification>,
{
    let (total, count) = classifications
        .into_iter()
        .fold((0u32, 0u32), |(total, count), c| {
            (total + accuracy_weight(c), count + 1)
        });
    if count == 0 {
        return 0;
    }
    (total as f64 / count as f64).round() as u32
}

/// Label counts for one side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    /// Indexed like [`Classification::ALL`].
    counts: [u32; 10],
}

impl PlayerStats {
    fn record(&mut self, classification: Classification) {
        if let Some(index) = Classification::ALL.iter().position(|&c| c == classification) {
            self.counts[index] += 1;
        }
    }

    pub fn count(&self, classification: Classification) -> u32 {
        Classification::ALL
            .iter()
            .position(|&c| c == classification)
            .map(|index| self.counts[index])
            .unwrap_or(0)
    }

    /// Number of classified moves.
    pub fn total_moves(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Labels with their counts, best first.
    pub fn counts(&self) -> impl Iterator<Item = (Classification, u32)> + '_ {
        Classification::ALL.iter().copied().zip(self.counts.iter().copied())
    }

    pub fn accuracy(&self) -> u32 {
        accuracy(
            self.counts()
                .flat_map(|(c, n)| std::iter::repeat(c).take(n as usize)),
        )
    }
}

/// Summary of a reviewed game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStats {
    pub white: PlayerStats,
    pub black: PlayerStats,
    /// Plies with an analysis, including the initial position.
    pub analyzed: usize,
    /// Plies the engine never produced an analysis for.
    pub unanalyzed: usize,
}

impl GameStats {
    pub fn from_store(store: &AnalysisStore) -> Self {
        let mut stats = GameStats {
            analyzed: store.analyzed_count(),
            unanalyzed: store.len() - store.analyzed_count(),
            ..GameStats::default()
        };
        for analysis in store.iter() {
            let (Some(mover), Some(classification)) = (analysis.mover, analysis.classification)
            else {
                continue;
            };
            stats.player_mut(mover).record(classification);
        }
        stats
    }

    pub fn player(&self, color: Color) -> &PlayerStats {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    fn player_mut(&mut self, color: Color) -> &mut PlayerStats {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    pub fn count(&self, classification: Classification) -> u32 {
        self.white.count(classification) + self.black.count(classification)
    }

    /// Accuracy over both sides' classified moves.
    pub fn accuracy(&self) -> u32 {
        let both = self
            .white
            .counts()
            .chain(self.black.counts())
            .flat_map(|(c, n)| std::iter::repeat(c).take(n as usize));
        accuracy(both)
    }

    /// Short remarks on recurring problems in the game.
    pub fn observations(&self) -> Vec<String> {
        let mut notes = Vec::new();
        let blunders = self.count(Classification::Blunder);
        let mistakes = self.count(Classification::Mistake);
        let inaccuracies = self.count(Classification::Inaccuracy);

        if blunders >= 2 {
            notes.push(format!(
                "{} blunders detected. Check for opponent threats before each move.",
                blunders
            ));
        }
        if mistakes >= 3 {
            notes.push(format!(
                "{} mistakes across the game. Calculate one move deeper before committing.",
                mistakes
            ));
        }
        if inaccuracies >= 4 {
            notes.push(format!(
                "{} inaccuracies suggest room for positional improvement.",
                inaccuracies
            ));
        }
        if self.accuracy() >= 85 {
            notes.push("Strong overall accuracy.".to_string());
        }
        notes
    }
}
