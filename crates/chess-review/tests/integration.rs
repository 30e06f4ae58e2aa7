//! Integration tests for the chess-review crate.
//!
//! These tests require Stockfish to be installed and available in PATH.
//! Run with: `cargo test -p chess-review --test integration -- --ignored`

use chess_review::{
    build_positions, AnalysisSettings, Classification, DetectorConfig, EngineSession, GameRecord,
    MoveClassifier, Orchestrator, RunOutcome, ScoreValue, SessionOptions, SessionState,
    ShakmatyRules,
};

/// Check if Stockfish is available in PATH.
fn stockfish_available() -> bool {
    std::process::Command::new("stockfish")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok()
}

async fn stockfish() -> EngineSession {
    let mut session = EngineSession::spawn("stockfish", SessionOptions::default())
        .expect("Failed to spawn Stockfish");
    session.start().await.expect("Handshake failed");
    session
}

#[tokio::test]
#[ignore = "requires Stockfish"]
async fn test_session_analyzes_starting_position() {
    if !stockfish_available() {
        eprintln!("Skipping test: Stockfish not available");
        return;
    }

    let mut session = stockfish().await;
    let name = session.name().unwrap_or_default().to_lowercase();
    assert!(name.contains("stockfish"), "unexpected engine name: {}", name);

    let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    let raw = session.analyze(fen, 10, 3).await.expect("No analysis");
    assert!(raw.best_move.token().is_some());
    assert_eq!(raw.lines.len(), 3);
    assert!(raw.lines.iter().all(|line| line.depth >= 1 && !line.moves.is_empty()));
    assert_eq!(session.state(), SessionState::Ready);

    session.terminate().await;
    assert_eq!(session.state(), SessionState::Terminated);
}

#[tokio::test]
#[ignore = "requires Stockfish"]
async fn test_scholars_mate_review() {
    if !stockfish_available() {
        eprintln!("Skipping test: Stockfish not available");
        return;
    }

    // 3... Nf6?? allows Qxf7#
    let record = GameRecord::parse("1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6 4. Qxf7# 1-0").unwrap();
    let positions = build_positions(&ShakmatyRules, &record).unwrap();
    let settings = AnalysisSettings {
        depth: 12,
        multipv: 2,
        ..AnalysisSettings::default()
    };
    let orchestrator = Orchestrator::new(
        ShakmatyRules,
        settings,
        MoveClassifier::default(),
        DetectorConfig {
            opening_phase_half_moves: 0,
            ..DetectorConfig::default()
        },
    );

    let mut session = stockfish().await;
    let report = orchestrator.run(&mut session, &positions).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(report.store.is_complete());

    let blunder = report.store.get(6).unwrap();
    assert_eq!(blunder.classification, Some(Classification::Blunder));
    assert_eq!(report.store.preferred_move(6).map(|m| m.display() != "Nf6"), Some(true));

    let mate = report.store.get(7).unwrap();
    assert_eq!(mate.evaluation, ScoreValue::MateIn(1));
    assert!(report.store.critical_moments().unwrap().contains(6));

    session.terminate().await;
}
