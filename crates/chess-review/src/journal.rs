//! Training journal built from saved reviews.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::persistence::{BlobStore, PersistenceError, SavedReview};
use crate::{AnalysisStore, Classification};

/// Entries kept in the journal.
pub const MAX_ENTRIES: usize = 100;

/// Takeaways extracted per game.
pub const MAX_TAKEAWAYS: usize = 8;

const JOURNAL: &str = "journal";

/// One reviewed game in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub review_id: String,
    pub date: DateTime<Utc>,
    pub white: String,
    pub black: String,
    pub result: String,
    pub accuracy: u32,
    pub takeaways: Vec<String>,
    pub observations: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl JournalEntry {
    pub fn from_review(review: &SavedReview) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            review_id: review.id.clone(),
            date: Utc::now(),
            white: review.headers.white_name().to_string(),
            black: review.headers.black_name().to_string(),
            result: review.headers.result_or_unknown().to_string(),
            accuracy: review.stats.accuracy(),
            takeaways: takeaways(&review.analysis),
            observations: review.stats.observations(),
            notes: String::new(),
        }
    }
}

/// Up to [`MAX_TAKEAWAYS`] one-line lessons, in game order.
pub fn takeaways(store: &AnalysisStore) -> Vec<String> {
    let mut lines = Vec::new();
    for analysis in store.iter().filter(|a| a.ply > 0) {
        let Some(classification) = analysis.classification else {
            continue;
        };
        let label = format!("Move {}", analysis.ply.div_ceil(2));
        let played = analysis.played.as_ref().map_or("?", |m| m.san.as_str());
        let preferred = store.preferred_move(analysis.ply).map_or("?", |m| m.display());

        let line = match classification {
            Classification::Blunder => {
                format!("{}: blunder - played {}, engine preferred {}", label, played, preferred)
            }
            Classification::Miss => {
                format!("{}: miss - played {}, engine preferred {}", label, played, preferred)
            }
            Classification::Mistake => {
                format!("{}: mistake - played {}, better was {}", label, played, preferred)
            }
            Classification::Brilliant => format!("{}: brilliant move {}", label, played),
            Classification::Great => format!("{}: great move {}", label, played),
            _ => continue,
        };
        lines.push(line);
        if lines.len() == MAX_TAKEAWAYS {
            break;
        }
    }
    lines
}

/// Tone of a [`Pattern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Strength,
    Concern,
}

/// A trend across several journal entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub text: String,
}

impl Pattern {
    fn strength(text: String) -> Self {
        Self {
            kind: PatternKind::Strength,
            text,
        }
    }

    fn concern(text: String) -> Self {
        Self {
            kind: PatternKind::Concern,
            text,
        }
    }
}

fn mean_accuracy(entries: &[JournalEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    entries.iter().map(|e| e.accuracy as f64).sum::<f64>() / entries.len() as f64
}

/// Recurring patterns across `entries` (newest first). Needs two entries.
pub fn patterns(entries: &[JournalEntry]) -> Vec<Pattern> {
    let mut found = Vec::new();
    let games = entries.len();
    if games < 2 {
        return found;
    }

    let average = mean_accuracy(entries).round() as u32;
    if average >= 80 {
        found.push(Pattern::strength(format!(
            "Strong {}% average accuracy across {} games.",
            average, games
        )));
    } else if average < 60 {
        found.push(Pattern::concern(format!(
            "Average accuracy {}% across {} games. Focus on reducing errors.",
            average, games
        )));
    }

    let mentions = |word: &str| {
        entries
            .iter()
            .flat_map(|e| e.takeaways.iter())
            .filter(|t| t.contains(word))
            .count()
    };
    if mentions("blunder") > games {
        found.push(Pattern::concern(
            "Averaging more than one blunder per game. Consider a blunder check routine.".to_string(),
        ));
    }
    if mentions("mistake") > games * 2 {
        found.push(Pattern::concern(
            "High mistake rate across games. Calculate one move deeper.".to_string(),
        ));
    }
    if mentions("brilliant") >= games {
        found.push(Pattern::strength(
            "Finding brilliant moves regularly.".to_string(),
        ));
    }

    if games >= 5 {
        let recent = mean_accuracy(&entries[..3]);
        let earlier = mean_accuracy(&entries[games - 3..]);
        if recent > earlier + 5.0 {
            found.push(Pattern::strength(format!(
                "Accuracy trending upward (+{}% in recent games).",
                (recent - earlier).round()
            )));
        } else if recent < earlier - 5.0 {
            found.push(Pattern::concern(format!(
                "Accuracy declining ({}% drop in recent games).",
                (earlier - recent).round()
            )));
        }
    }
    found
}

/// Journal entries, newest first.
pub struct Journal<S: BlobStore> {
    store: S,
}

impl<S: BlobStore> Journal<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Saves `entry`, keeping at most [`MAX_ENTRIES`].
    pub fn record(&self, entry: &JournalEntry) -> Result<(), PersistenceError> {
        self.store
            .save(JOURNAL, &entry.id, &serde_json::to_string(entry)?)?;
        for old in self.store.load_all(JOURNAL)?.iter().skip(MAX_ENTRIES) {
            self.store.delete(JOURNAL, &old.id)?;
        }
        Ok(())
    }

    pub fn entries(&self) -> Result<Vec<JournalEntry>, PersistenceError> {
        self.store
            .load_all(JOURNAL)?
            .iter()
            .map(|blob| serde_json::from_str(&blob.data).map_err(PersistenceError::from))
            .collect()
    }

    /// Replaces the free-form notes of an entry. Returns false if it does not exist.
    pub fn update_notes(&self, id: &str, notes: &str) -> Result<bool, PersistenceError> {
        let Some(data) = self.store.load(JOURNAL, id)? else {
            return Ok(false);
        };
        let mut entry: JournalEntry = serde_json::from_str(&data)?;
        entry.notes = notes.to_string();
        self.store.save(JOURNAL, id, &serde_json::to_string(&entry)?)?;
        Ok(true)
    }

    pub fn delete(&self, id: &str) -> Result<bool, PersistenceError> {
        self.store.delete(JOURNAL, id)
    }
}
