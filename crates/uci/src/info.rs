//! UCI info line types.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// Score in centipawns or mate distance, from the side to move's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Score {
    /// Centipawn score (100 = 1 pawn advantage).
    Cp(i32),
    /// Mate in N moves (positive = side to move mates, negative = gets mated).
    Mate(i32),
}

/// Whether a reported score is exact or only a search bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    Lower,
    Upper,
}

/// One `info` line as reported during a search.
///
/// Only the fields an analysis client consumes are kept; other tokens are
/// skipped when parsing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineInfo {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    /// Rank of this line when MultiPV > 1 (1 = best).
    pub multipv: Option<u32>,
    pub score: Option<Score>,
    /// Set when the score is a `lowerbound`/`upperbound`.
    pub bound: Option<ScoreBound>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    /// Milliseconds searched.
    pub time: Option<u64>,
    /// Principal variation in engine notation.
    pub pv: Vec<String>,
    /// Free text after `string`.
    pub string: Option<String>,
}

/// Tokens that end a `pv` run.
const KEYWORDS: &[&str] = &[
    "depth",
    "seldepth",
    "multipv",
    "score",
    "nodes",
    "nps",
    "time",
    "pv",
    "currmove",
    "currmovenumber",
    "hashfull",
    "tbhits",
    "cpuload",
    "refutation",
    "currline",
    "string",
];

impl EngineInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Formats the line as an engine would send it.
    pub fn to_uci(&self) -> String {
        let mut out = String::from("info");
        let numbers = [
            ("depth", self.depth.map(u64::from)),
            ("seldepth", self.seldepth.map(u64::from)),
            ("multipv", self.multipv.map(u64::from)),
        ];
        for (key, value) in numbers {
            if let Some(value) = value {
                let _ = write!(out, " {} {}", key, value);
            }
        }
        if let Some(score) = self.score {
            let _ = match score {
                Score::Cp(cp) => write!(out, " score cp {}", cp),
                Score::Mate(n) => write!(out, " score mate {}", n),
            };
            match self.bound {
                Some(ScoreBound::Lower) => out.push_str(" lowerbound"),
                Some(ScoreBound::Upper) => out.push_str(" upperbound"),
                None => {}
            }
        }
        for (key, value) in [("nodes", self.nodes), ("nps", self.nps), ("time", self.time)] {
            if let Some(value) = value {
                let _ = write!(out, " {} {}", key, value);
            }
        }
        if !self.pv.is_empty() {
            let _ = write!(out, " pv {}", self.pv.join(" "));
        }
        if let Some(text) = &self.string {
            let _ = write!(out, " string {}", text);
        }
        out
    }

    /// Parses an `info` line.
    ///
    /// Returns `None` only when the line is not an `info` line at all;
    /// unknown tokens and malformed values are skipped.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace().peekable();
        if tokens.next() != Some("info") {
            return None;
        }

        let mut info = EngineInfo::new();
        while let Some(token) = tokens.next() {
            match token {
                "depth" => info.depth = tokens.next().and_then(|v| v.parse().ok()),
                "seldepth" => info.seldepth = tokens.next().and_then(|v| v.parse().ok()),
                "multipv" => info.multipv = tokens.next().and_then(|v| v.parse().ok()),
                "nodes" => info.nodes = tokens.next().and_then(|v| v.parse().ok()),
                "nps" => info.nps = tokens.next().and_then(|v| v.parse().ok()),
                "time" => info.time = tokens.next().and_then(|v| v.parse().ok()),
                "score" => {
                    let kind = tokens.next();
                    let value = tokens.next().and_then(|v| v.parse().ok());
                    info.score = match (kind, value) {
                        (Some("cp"), Some(cp)) => Some(Score::Cp(cp)),
                        (Some("mate"), Some(n)) => Some(Score::Mate(n)),
                        _ => info.score,
                    };
                }
                "lowerbound" => info.bound = Some(ScoreBound::Lower),
                "upperbound" => info.bound = Some(ScoreBound::Upper),
                "pv" => {
                    while let Some(mv) = tokens.next_if(|t| !KEYWORDS.contains(t)) {
                        info.pv.push(mv.to_string());
                    }
                }
                "string" => {
                    info.string = Some(tokens.by_ref().collect::<Vec<_>>().join(" "));
                }
                _ => {}
            }
        }
        Some(info)
    }
}

/// Builder for constructing EngineInfo.
#[derive(Default)]
pub struct InfoBuilder {
    info: EngineInfo,
}

impl InfoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(mut self, d: u32) -> Self {
        self.info.depth = Some(d);
        self
    }

    pub fn seldepth(mut self, d: u32) -> Self {
        self.info.seldepth = Some(d);
        self
    }

    pub fn multipv(mut self, rank: u32) -> Self {
        self.info.multipv = Some(rank);
        self
    }

    pub fn score_cp(mut self, cp: i32) -> Self {
        self.info.score = Some(Score::Cp(cp));
        self
    }

    pub fn score_mate(mut self, moves: i32) -> Self {
        self.info.score = Some(Score::Mate(moves));
        self
    }

    pub fn nodes(mut self, n: u64) -> Self {
        self.info.nodes = Some(n);
        self
    }

    pub fn nps(mut self, n: u64) -> Self {
        self.info.nps = Some(n);
        self
    }

    pub fn pv<S: Into<String>>(mut self, moves: impl IntoIterator<Item = S>) -> Self {
        self.info.pv = moves.into_iter().map(Into::into).collect();
        self
    }

    pub fn string(mut self, s: &str) -> Self {
        self.info.string = Some(s.to_string());
        self
    }

    pub fn build(self) -> EngineInfo {
        self.info
    }
}
