//! PGN game records and the position sequence built from them.

use std::ops::ControlFlow;

use pgn_reader::{RawTag, Reader, SanPlus, Visitor};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::Rules;
use crate::Position;

/// Decorations some sites sprinkle into exported movetext.
const DECORATIONS: &[char] = &[
    '☒', '☑', '⬜', '⬛', '▶', '◀', '⭐', '💎', '✅', '❌', '🔵', '🟢', '🟡', '🟠', '🔴',
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameRecordError {
    #[error("Invalid game record: {0}")]
    InvalidGameRecord(String),
    #[error("No moves found in game record")]
    NoMoves,
    #[error("Illegal move {san} at ply {ply}")]
    IllegalMove { ply: usize, san: String },
}

/// Tag pairs the review cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameHeaders {
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>,
    pub event: Option<String>,
    pub date: Option<String>,
    /// Custom starting position.
    pub fen: Option<String>,
}

impl GameHeaders {
    pub fn white_name(&self) -> &str {
        self.white.as_deref().unwrap_or("White")
    }

    pub fn black_name(&self) -> &str {
        self.black.as_deref().unwrap_or("Black")
    }

    pub fn result_or_unknown(&self) -> &str {
        self.result.as_deref().unwrap_or("*")
    }
}

/// A parsed game: headers plus the mainline in SAN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub headers: GameHeaders,
    pub moves: Vec<String>,
}

impl GameRecord {
    /// Parses the first game of `pgn`. Comments, variations and NAGs are dropped.
    pub fn parse(pgn: &str) -> Result<Self, GameRecordError> {
        let cleaned: String = pgn.chars().filter(|c| !DECORATIONS.contains(c)).collect();
        let mut reader = Reader::new(cleaned.as_bytes());
        let (headers, moves) = reader
            .read_game(&mut MainlineCollector)
            .map_err(|e| GameRecordError::InvalidGameRecord(e.to_string()))?
            .ok_or_else(|| GameRecordError::InvalidGameRecord("empty input".to_string()))?;

        if moves.is_empty() {
            return Err(GameRecordError::NoMoves);
        }
        Ok(Self { headers, moves })
    }

    /// Number of positions including the initial one.
    pub fn position_count(&self) -> usize {
        self.moves.len() + 1
    }
}

struct MainlineCollector;

impl Visitor for MainlineCollector {
    type Tags = GameHeaders;
    type Movetext = (GameHeaders, Vec<String>);
    type Output = (GameHeaders, Vec<String>);

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, GameHeaders> {
        ControlFlow::Continue(GameHeaders::default())
    }

    fn tag(
        &mut self,
        tags: &mut GameHeaders,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let slot = match name {
            b"White" => &mut tags.white,
            b"Black" => &mut tags.black,
            b"Result" => &mut tags.result,
            b"Event" => &mut tags.event,
            b"Date" => &mut tags.date,
            b"FEN" => &mut tags.fen,
            _ => return ControlFlow::Continue(()),
        };
        *slot = Some(value.decode_utf8_lossy().into_owned());
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: GameHeaders) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue((tags, Vec::new()))
    }

    fn san(&mut self, movetext: &mut Self::Movetext, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        movetext.1.push(san_plus.san.to_string());
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, movetext: Self::Movetext) -> Self::Output {
        movetext
    }
}

/// Replays `record` and returns one [`Position`] per ply, starting at ply 0.
pub fn build_positions<R: Rules>(
    rules: &R,
    record: &GameRecord,
) -> Result<Vec<Position>, GameRecordError> {
    let mut board = match &record.headers.fen {
        Some(fen) => rules
            .board_from_fen(fen)
            .map_err(|e| GameRecordError::InvalidGameRecord(e.to_string()))?,
        None => rules.initial_board(),
    };

    let mut positions = Vec::with_capacity(record.position_count());
    positions.push(Position {
        ply: 0,
        fen: rules.fen(&board),
        side_to_move: rules.side_to_move(&board),
        played: None,
    });

    for (index, san) in record.moves.iter().enumerate() {
        let ply = index + 1;
        let (next, played) = rules
            .play_san(&board, san)
            .map_err(|_| GameRecordError::IllegalMove {
                ply,
                san: san.clone(),
            })?;
        board = next;
        positions.push(Position {
            ply,
            fen: rules.fen(&board),
            side_to_move: rules.side_to_move(&board),
            played: Some(played),
        });
    }
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ShakmatyRules;
    use crate::Color;

    const OPERA: &str = r#"[Event "Paris Opera"]
[Site "Paris"]
[Date "1858.??.??"]
[White "Paul Morphy"]
[Black "Duke of Brunswick and Count Isouard"]
[Result "1-0"]

1. e4 e5 2. Nf3 d6 3. d4 Bg4 4. dxe5 Bxf3 5. Qxf3 dxe5 6. Bc4 Nf6 7. Qb3 Qe7
8. Nc3 c6 9. Bg5 b5 10. Nxb5 cxb5 11. Bxb5+ Nbd7 12. O-O-O Rd8 13. Rxd7 Rxd7
14. Rd1 Qe6 15. Bxd7+ Nxd7 16. Qb8+ Nxb8 17. Rd8# 1-0"#;

    #[test]
    fn parses_headers_and_mainline() {
        let record = GameRecord::parse(OPERA).unwrap();
        assert_eq!(record.headers.white_name(), "Paul Morphy");
        assert_eq!(record.headers.result.as_deref(), Some("1-0"));
        assert_eq!(record.headers.event.as_deref(), Some("Paris Opera"));
        assert_eq!(record.moves.len(), 33);
        assert_eq!(record.moves[0], "e4");
        assert_eq!(record.moves[32], "Rd8");
    }

    #[test]
    fn comments_variations_and_decorations_are_dropped() {
        let pgn = "1. e4 {best by test} e5 (1... c5 2. Nf3) 2. Nf3 $1 ⭐ Nc6 💎 *";
        let record = GameRecord::parse(pgn).unwrap();
        assert_eq!(record.moves, vec!["e4", "e5", "Nf3", "Nc6"]);
        assert_eq!(record.headers.black_name(), "Black");
        assert_eq!(record.headers.result_or_unknown(), "*");
    }

    #[test]
    fn record_without_moves_is_rejected() {
        let pgn = "[White \"Nobody\"]\n\n*";
        assert_eq!(GameRecord::parse(pgn), Err(GameRecordError::NoMoves));
    }

    #[test]
    fn builds_positions_from_the_start() {
        let rules = ShakmatyRules;
        let record = GameRecord::parse(OPERA).unwrap();
        let positions = build_positions(&rules, &record).unwrap();
        assert_eq!(positions.len(), 34);
        assert_eq!(positions[0].played, None);
        assert_eq!(positions[0].side_to_move, Color::White);

        let first = positions[1].played.as_ref().unwrap();
        assert_eq!(first.uci, "e2e4");
        assert_eq!(positions[1].mover(), Some(Color::White));

        let castle = positions[23].played.as_ref().unwrap();
        assert_eq!(castle.san, "O-O-O");
        assert_eq!(castle.uci, "e1c1");

        let last = positions[33].played.as_ref().unwrap();
        assert_eq!(last.san, "Rd8#");
    }

    #[test]
    fn honors_fen_header() {
        let pgn = r#"[FEN "4k3/8/8/8/8/8/4P3/4K3 b - - 0 1"]
[SetUp "1"]

1... Kd7 2. e4 *"#;
        let rules = ShakmatyRules;
        let record = GameRecord::parse(pgn).unwrap();
        let positions = build_positions(&rules, &record).unwrap();
        assert_eq!(positions[0].side_to_move, Color::Black);
        assert_eq!(positions[1].mover(), Some(Color::Black));
        assert_eq!(positions[2].played.as_ref().unwrap().uci, "e2e4");
    }

    #[test]
    fn illegal_move_reports_its_ply() {
        let rules = ShakmatyRules;
        let record = GameRecord {
            headers: GameHeaders::default(),
            moves: vec!["e4".to_string(), "e5".to_string(), "Ke3".to_string()],
        };
        assert_eq!(
            build_positions(&rules, &record),
            Err(GameRecordError::IllegalMove {
                ply: 3,
                san: "Ke3".to_string()
            })
        );
    }
}
