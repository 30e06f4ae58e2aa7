//! Decoding of streamed engine output into principal variations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uci::{EngineInfo, EngineMessage};

use crate::rules::Rules;
use crate::{NotatedMove, ScoreValue};

/// Tokens an engine sends in place of a move when it has none to play.
const NO_MOVE_SENTINELS: [&str; 2] = ["(none)", "0000"];

/// One ranked line from a progress report, still in engine notation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialLine {
    /// MultiPV rank, 1 = best.
    pub rank: u32,
    pub depth: u32,
    /// Score from the side to move's point of view.
    pub score: ScoreValue,
    /// Continuation in engine notation, best move first.
    pub moves: Vec<String>,
}

/// Terminal `bestmove` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestMove {
    pub token: String,
    pub ponder: Option<String>,
}

impl BestMove {
    /// True when the engine reported that no legal move exists.
    pub fn is_sentinel(&self) -> bool {
        self.token.is_empty() || NO_MOVE_SENTINELS.contains(&self.token.as_str())
    }

    /// The move token, unless it is the no-move sentinel.
    pub fn token(&self) -> Option<&str> {
        if self.is_sentinel() {
            None
        } else {
            Some(&self.token)
        }
    }
}

/// Extracts a ranked line from an `info` progress report.
///
/// Requires depth, multipv rank, score and a non-empty `pv`. Statistics-only
/// chatter and anything that is not an `info` line yield `None`.
pub fn parse_progress_line(line: &str) -> Option<PartialLine> {
    let info = EngineInfo::parse(line)?;
    partial_line(info)
}

fn partial_line(info: EngineInfo) -> Option<PartialLine> {
    let depth = info.depth?;
    let rank = info.multipv.filter(|&r| r >= 1)?;
    let score = ScoreValue::from_uci(info.score?);
    if info.pv.is_empty() {
        return None;
    }
    Some(PartialLine {
        rank,
        depth,
        score,
        moves: info.pv,
    })
}

/// Extracts the move token from a `bestmove` report.
pub fn parse_terminal_line(line: &str) -> Option<BestMove> {
    match EngineMessage::parse(line) {
        EngineMessage::BestMove { mv, ponder } => Some(BestMove { token: mv, ponder }),
        _ => None,
    }
}

/// Latest line per rank for one analysis cycle.
#[derive(Debug, Clone)]
pub struct LineBook {
    multipv: u32,
    lines: BTreeMap<u32, PartialLine>,
}

impl LineBook {
    pub fn new(multipv: u32) -> Self {
        Self {
            multipv: multipv.max(1),
            lines: BTreeMap::new(),
        }
    }

    /// Records a line, superseding any earlier line of the same rank.
    ///
    /// Returns false when the rank exceeds the requested MultiPV.
    pub fn record(&mut self, line: PartialLine) -> bool {
        if line.rank == 0 || line.rank > self.multipv {
            return false;
        }
        self.lines.insert(line.rank, line);
        true
    }

    /// Feeds one raw engine line; non-progress lines are ignored.
    pub fn observe(&mut self, raw: &str) -> bool {
        match parse_progress_line(raw) {
            Some(line) => self.record(line),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The finished set, ordered by rank.
    pub fn finish(self) -> Vec<PartialLine> {
        self.lines.into_values().collect()
    }
}

/// Replays engine move tokens from `board`, stopping at the first move the
/// rules reject.
pub fn translate_continuation<R: Rules>(
    rules: &R,
    board: &R::Board,
    tokens: &[String],
) -> Vec<NotatedMove> {
    let mut current = board.clone();
    let mut notated = Vec::with_capacity(tokens.len());
    for token in tokens {
        match rules.play_uci(&current, token) {
            Ok((next, mv)) => {
                notated.push(mv);
                current = next;
            }
            Err(e) => {
                tracing::debug!("continuation truncated at {}: {}", token, e);
                break;
            }
        }
    }
    notated
}
