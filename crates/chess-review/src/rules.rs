//! Chess rules collaborator.
//!
//! The pipeline never generates moves itself. Everything that needs legal
//! move knowledge (replaying a game record, translating engine continuations
//! into SAN) goes through the [`Rules`] trait. [`ShakmatyRules`] is the
//! production implementation.

use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position as _};
use thiserror::Error;

use crate::{Color, NotatedMove};

/// FEN of the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Errors reported by the rules collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    /// The move is malformed or not legal in the given position.
    #[error("Illegal move {mv} in position {fen}")]
    IllegalMove { mv: String, fen: String },
    /// The board-state identifier could not be parsed.
    #[error("Invalid position: {0}")]
    InvalidPosition(String),
}

/// How a position with no legal moves ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The side to move is checkmated.
    Checkmate,
    /// The side to move has no legal move and is not in check.
    Stalemate,
}

/// Capability interface over a chess rules library.
pub trait Rules {
    /// Library-specific board representation.
    type Board: Clone;

    /// The standard starting position.
    fn initial_board(&self) -> Self::Board;

    /// Parses a board-state identifier.
    fn board_from_fen(&self, fen: &str) -> Result<Self::Board, RulesError>;

    /// Canonical board-state identifier of `board`.
    fn fen(&self, board: &Self::Board) -> String;

    fn side_to_move(&self, board: &Self::Board) -> Color;

    /// Plays a move given in engine notation (`e2e4`, `e7e8q`).
    fn play_uci(
        &self,
        board: &Self::Board,
        token: &str,
    ) -> Result<(Self::Board, NotatedMove), RulesError>;

    /// Plays a move given in SAN (`Nf3`, `exd5`, `O-O`).
    fn play_san(
        &self,
        board: &Self::Board,
        san: &str,
    ) -> Result<(Self::Board, NotatedMove), RulesError>;

    /// `Some` when the side to move has no legal moves.
    fn outcome(&self, board: &Self::Board) -> Option<Outcome>;
}

/// [`Rules`] backed by the `shakmaty` crate (standard chess).
#[derive(Debug, Clone, Copy, Default)]
pub struct ShakmatyRules;

impl ShakmatyRules {
    fn illegal(&self, board: &Chess, mv: &str) -> RulesError {
        RulesError::IllegalMove {
            mv: mv.to_string(),
            fen: self.fen(board),
        }
    }

    fn apply(&self, board: &Chess, mv: Move) -> (Chess, NotatedMove) {
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        let mut next = board.clone();
        let san = SanPlus::from_move_and_play_unchecked(&mut next, mv).to_string();

        let from = uci.get(0..2).unwrap_or_default().to_string();
        let to = uci.get(2..4).unwrap_or_default().to_string();
        (next, NotatedMove { san, uci, from, to })
    }
}

impl Rules for ShakmatyRules {
    type Board = Chess;

    fn initial_board(&self) -> Chess {
        Chess::default()
    }

    fn board_from_fen(&self, fen: &str) -> Result<Chess, RulesError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|e| RulesError::InvalidPosition(format!("{}: {}", fen, e)))?;
        parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| RulesError::InvalidPosition(format!("{}: {}", fen, e)))
    }

    fn fen(&self, board: &Chess) -> String {
        Fen::from_position(board, EnPassantMode::Legal).to_string()
    }

    fn side_to_move(&self, board: &Chess) -> Color {
        match board.turn() {
            shakmaty::Color::White => Color::White,
            shakmaty::Color::Black => Color::Black,
        }
    }

    fn play_uci(&self, board: &Chess, token: &str) -> Result<(Chess, NotatedMove), RulesError> {
        let uci: UciMove = token.parse().map_err(|_| self.illegal(board, token))?;
        let mv = uci.to_move(board).map_err(|_| self.illegal(board, token))?;
        Ok(self.apply(board, mv))
    }

    fn play_san(&self, board: &Chess, san: &str) -> Result<(Chess, NotatedMove), RulesError> {
        // pgn-style suffixes ("+", "#", "!?") are not part of the move itself
        let bare = san.trim_end_matches(['+', '#', '!', '?']);
        let parsed: San = bare.parse().map_err(|_| self.illegal(board, san))?;
        let mv = parsed.to_move(board).map_err(|_| self.illegal(board, san))?;
        Ok(self.apply(board, mv))
    }

    fn outcome(&self, board: &Chess) -> Option<Outcome> {
        if board.is_checkmate() {
            Some(Outcome::Checkmate)
        } else if board.is_stalemate() {
            Some(Outcome::Stalemate)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_position_round_trips() {
        let rules = ShakmatyRules;
        let board = rules.board_from_fen(STARTING_FEN).unwrap();
        assert_eq!(rules.fen(&board), STARTING_FEN);
        assert_eq!(rules.fen(&rules.initial_board()), STARTING_FEN);
        assert_eq!(rules.side_to_move(&board), Color::White);
    }

    #[test]
    fn play_uci_produces_san_and_squares() {
        let rules = ShakmatyRules;
        let board = rules.initial_board();
        let (next, mv) = rules.play_uci(&board, "g1f3").unwrap();
        assert_eq!(mv.san, "Nf3");
        assert_eq!(mv.uci, "g1f3");
        assert_eq!(mv.from, "g1");
        assert_eq!(mv.to, "f3");
        assert_eq!(rules.side_to_move(&next), Color::Black);
    }

    #[test]
    fn play_san_accepts_annotated_moves() {
        let rules = ShakmatyRules;
        let board = rules.initial_board();
        let (_, mv) = rules.play_san(&board, "e4!?").unwrap();
        assert_eq!(mv.uci, "e2e4");
    }

    #[test]
    fn illegal_uci_move_is_rejected() {
        let rules = ShakmatyRules;
        let board = rules.initial_board();
        let err = rules.play_uci(&board, "e2e5").unwrap_err();
        assert!(matches!(err, RulesError::IllegalMove { ref mv, .. } if mv == "e2e5"));
        assert!(rules.play_uci(&board, "garbage").is_err());
    }

    #[test]
    fn check_and_mate_suffixes() {
        let rules = ShakmatyRules;
        let mut board = rules.initial_board();
        let mut last = None;
        for token in ["f2f3", "e7e5", "g2g4", "d8h4"] {
            let (next, mv) = rules.play_uci(&board, token).unwrap();
            board = next;
            last = Some(mv);
        }
        assert_eq!(last.unwrap().san, "Qh4#");
        assert_eq!(rules.outcome(&board), Some(Outcome::Checkmate));
    }

    #[test]
    fn stalemate_outcome() {
        let rules = ShakmatyRules;
        let board = rules.board_from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(rules.outcome(&board), Some(Outcome::Stalemate));
    }

    #[test]
    fn invalid_fen_is_reported() {
        let rules = ShakmatyRules;
        assert!(matches!(
            rules.board_from_fen("not a fen"),
            Err(RulesError::InvalidPosition(_))
        ));
    }
}
