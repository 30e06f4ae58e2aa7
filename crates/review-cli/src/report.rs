//! Plain-text rendering of reviews.

use chess_review::journal::Pattern;
use chess_review::{
    AnalysisStore, Classification, Color, GameStats, JournalEntry, SavedReview,
};

/// One line per analyzed move: number, move, label, evaluation.
pub fn move_table(store: &AnalysisStore) -> Vec<String> {
    let critical = store.critical_moments();
    store
        .iter()
        .filter(|analysis| analysis.ply > 0)
        .map(|analysis| {
            let number = analysis.ply.div_ceil(2);
            let prefix = if analysis.ply % 2 == 1 {
                format!("{}.", number)
            } else {
                format!("{}...", number)
            };
            let played = analysis
                .played
                .as_ref()
                .map(|m| m.san.as_str())
                .unwrap_or("?");
            let label = analysis
                .classification
                .map(|c| format!("{}{}", c.label(), annotation(c)))
                .unwrap_or_else(|| "-".to_string());
            let mut line = format!(
                "{:<7} {:<8} {:<14} {:>6}",
                prefix,
                played,
                label,
                analysis.evaluation.to_string()
            );
            if analysis.classification.is_some_and(|c| c.is_error()) {
                if let Some(best) = store.preferred_move(analysis.ply) {
                    line.push_str(&format!("  best: {}", best.display()));
                }
            }
            if let Some(kind) = critical.and_then(|m| m.get(analysis.ply)) {
                line.push_str(&format!("  [{}]", kind));
            }
            line
        })
        .collect()
}

fn annotation(c: Classification) -> String {
    let symbol = c.symbol();
    if symbol.is_empty() {
        String::new()
    } else {
        format!(" {}", symbol)
    }
}

/// Per-side label counts and accuracy.
pub fn summary(stats: &GameStats, white: &str, black: &str) -> Vec<String> {
    let mut lines = vec![format!(
        "Accuracy: {}% ({} {}%, {} {}%)",
        stats.accuracy(),
        white,
        stats.player(Color::White).accuracy(),
        black,
        stats.player(Color::Black).accuracy()
    )];
    for (classification, white_count) in stats.white.counts() {
        let black_count = stats.black.count(classification);
        if white_count == 0 && black_count == 0 {
            continue;
        }
        lines.push(format!(
            "  {:<12} {:>3} {:>3}",
            classification.label(),
            white_count,
            black_count
        ));
    }
    if stats.unanalyzed > 0 {
        lines.push(format!("{} positions could not be analyzed", stats.unanalyzed));
    }
    lines.extend(stats.observations());
    lines
}

pub fn review_line(review: &SavedReview) -> String {
    format!(
        "{}  {}  {}  {}%",
        review.id,
        review.created_at.format("%Y-%m-%d %H:%M"),
        review.title(),
        review.stats.accuracy()
    )
}

pub fn journal_lines(entry: &JournalEntry) -> Vec<String> {
    let mut lines = vec![format!(
        "{}  {} vs {} ({})  accuracy {}%",
        entry.date.format("%Y-%m-%d"),
        entry.white,
        entry.black,
        entry.result,
        entry.accuracy
    )];
    lines.extend(entry.takeaways.iter().map(|t| format!("  - {}", t)));
    if !entry.notes.is_empty() {
        lines.push(format!("  notes: {}", entry.notes));
    }
    lines
}

pub fn pattern_line(pattern: &Pattern) -> String {
    format!("[{:?}] {}", pattern.kind, pattern.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_review::{
        CriticalMoments, NotatedMove, PositionAnalysis, ScoreValue, SuggestedMove,
    };

    fn analysis(ply: usize, san: &str, cp: i32, classification: Option<Classification>) -> PositionAnalysis {
        PositionAnalysis {
            ply,
            fen: String::new(),
            mover: None,
            played: (ply > 0).then(|| NotatedMove {
                san: san.to_string(),
                uci: String::new(),
                from: String::new(),
                to: String::new(),
            }),
            best_move: Some(SuggestedMove {
                uci: "d2d4".to_string(),
                san: Some("d4".to_string()),
            }),
            lines: Vec::new(),
            evaluation: ScoreValue::Centipawns(cp),
            classification,
            previous_evaluation: None,
        }
    }

    #[test]
    fn move_table_marks_errors_and_moments() {
        let mut store = AnalysisStore::new(3);
        store.insert(analysis(0, "", 20, None)).unwrap();
        store
            .insert(analysis(1, "a4", -300, Some(Classification::Blunder)))
            .unwrap();
        store.insert(analysis(2, "e5", -290, Some(Classification::Best))).unwrap();
        store.set_critical_moments(CriticalMoments::default());

        let table = move_table(&store);
        assert_eq!(table.len(), 2);
        assert!(table[0].starts_with("1."));
        assert!(table[0].contains("Blunder ??"));
        assert!(table[0].contains("-3.0"));
        assert!(table[0].ends_with("best: d4"));
        assert!(table[1].starts_with("1..."));
        assert!(!table[1].contains("best:"));
    }

    #[test]
    fn summary_skips_empty_labels() {
        let stats = GameStats::default();
        let lines = summary(&stats, "A", "B");
        assert_eq!(lines, vec!["Accuracy: 0% (A 0%, B 0%)"]);
    }
}
