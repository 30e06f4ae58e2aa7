//! Positions of a game as seen by the analysis pipeline.

use serde::{Deserialize, Serialize};

use crate::Color;

/// A move in both notations, with its origin and destination squares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotatedMove {
    /// Standard algebraic notation, including check/mate suffix.
    pub san: String,
    /// Engine (UCI) notation, e.g. `e2e4` or `e7e8q`.
    pub uci: String,
    /// Origin square, e.g. `e2`.
    pub from: String,
    /// Destination square, e.g. `e4`.
    pub to: String,
}

/// One position in the game sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Half-move index, 0 for the starting position.
    pub ply: usize,
    /// Board-state identifier (FEN).
    pub fen: String,
    /// Side to move in this position.
    pub side_to_move: Color,
    /// The move that produced this position; `None` only at ply 0.
    pub played: Option<NotatedMove>,
}

impl Position {
    /// The color that played into this position, if any.
    pub fn mover(&self) -> Option<Color> {
        self.played.as_ref().map(|_| self.side_to_move.opposite())
    }

    /// Full-move number of the move that led here (1 for `1. e4` and `1... e5`).
    pub fn move_number(&self) -> usize {
        self.ply.div_ceil(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn after_e4() -> Position {
        Position {
            ply: 1,
            fen: "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1".to_string(),
            side_to_move: Color::Black,
            played: Some(NotatedMove {
                san: "e4".to_string(),
                uci: "e2e4".to_string(),
                from: "e2".to_string(),
                to: "e4".to_string(),
            }),
        }
    }

    #[test]
    fn mover_is_opposite_of_side_to_move() {
        assert_eq!(after_e4().mover(), Some(Color::White));
    }

    #[test]
    fn initial_position_has_no_mover() {
        let start = Position {
            ply: 0,
            fen: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(),
            side_to_move: Color::White,
            played: None,
        };
        assert_eq!(start.mover(), None);
    }

    #[test]
    fn move_numbers() {
        let mut pos = after_e4();
        assert_eq!(pos.move_number(), 1);
        pos.ply = 2;
        assert_eq!(pos.move_number(), 1);
        pos.ply = 17;
        assert_eq!(pos.move_number(), 9);
    }
}
