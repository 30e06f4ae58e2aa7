//! Long-lived UCI engine session.
//!
//! One [`EngineSession`] owns one engine process (or any pair of async
//! streams speaking UCI). Engine output is pumped line by line into a channel
//! by a background task; requests are written directly.
//!
//! `analyze` takes `&mut self`, so at most one search is in flight per
//! session. A search that is abandoned (timeout, or the caller dropping the
//! future and calling [`EngineSession::stop`]) leaves a stale `bestmove` in
//! the pipe; the next request drains it and re-synchronizes with
//! `isready`/`readyok` before issuing its own search.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, timeout_at, Instant};
use uci::{EngineMessage, GoOptions, GuiCommand};

use crate::decoder::{parse_terminal_line, BestMove, LineBook, PartialLine};

/// Buffered engine output lines before the reader task waits.
const LINE_BUFFER: usize = 1024;

/// Time an engine gets to exit after `quit` before it is killed.
const QUIT_GRACE: Duration = Duration::from_millis(100);

/// Errors that can occur when starting or relaunching an engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine executable could not be launched.
    #[error("Failed to spawn engine {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The UCI handshake did not complete.
    #[error("Engine startup failed: {0}")]
    Startup(String),
    /// The session was built from raw streams and has no executable to relaunch.
    #[error("Session has no engine path and cannot be restarted")]
    NotRestartable,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Launched, handshake not yet complete.
    Starting,
    /// Idle and accepting requests.
    Ready,
    /// A search is in flight.
    Busy,
    /// The engine is gone; only [`EngineSession::restart`] can revive it.
    Terminated,
}

/// Engine options negotiated during the handshake, plus timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub threads: u32,
    pub hash_mb: u32,
    pub handshake_timeout: Duration,
    /// Upper bound for one `analyze` call.
    pub search_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            hash_mb: 32,
            handshake_timeout: Duration::from_secs(10),
            search_timeout: Duration::from_secs(60),
        }
    }
}

/// What one completed search produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAnalysis {
    pub best_move: BestMove,
    /// Latest line per rank, ordered by rank.
    pub lines: Vec<PartialLine>,
}

type EngineWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A UCI engine driven through one request at a time.
pub struct EngineSession {
    name: Option<String>,
    options: SessionOptions,
    writer: EngineWriter,
    lines: mpsc::Receiver<String>,
    child: Option<Child>,
    path: Option<PathBuf>,
    state: watch::Sender<SessionState>,
    /// A `go` was sent and its `bestmove` has not been read yet.
    awaiting_bestmove: bool,
    needs_resync: bool,
}

impl EngineSession {
    /// Launches the engine executable. Call [`start`](Self::start) next.
    pub fn spawn(path: impl AsRef<Path>, options: SessionOptions) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let spawn_error = |source: std::io::Error| EngineError::Spawn {
            path: path.display().to_string(),
            source,
        };

        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            spawn_error(std::io::Error::other("engine stdin was not captured"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            spawn_error(std::io::Error::other("engine stdout was not captured"))
        })?;

        let mut session = Self::from_io(stdout, stdin, options);
        session.child = Some(child);
        session.path = Some(path.to_path_buf());
        Ok(session)
    }

    /// Wraps an already-connected engine. Such a session cannot be restarted.
    pub fn from_io<R, W>(reader: R, writer: W, options: SessionOptions) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (state, _) = watch::channel(SessionState::Starting);
        Self {
            name: None,
            options,
            writer: Box::new(writer),
            lines: pump_lines(reader),
            child: None,
            path: None,
            state,
            awaiting_bestmove: false,
            needs_resync: false,
        }
    }

    /// Engine name from `id name`, once the handshake has run.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watches state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Runs the UCI handshake and negotiates options.
    ///
    /// The session is `Ready` only after the engine answered `readyok`. On
    /// failure the session is terminated.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        match self.state() {
            SessionState::Ready | SessionState::Busy => return Ok(()),
            SessionState::Terminated => {
                return Err(EngineError::Startup("session is terminated".to_string()))
            }
            SessionState::Starting => {}
        }

        let limit = self.options.handshake_timeout;
        let outcome = match timeout(limit, self.handshake()).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Startup(format!(
                "no readyok within {}ms",
                limit.as_millis()
            ))),
        };

        match outcome {
            Ok(()) => {
                tracing::info!(
                    "Engine ready: {}",
                    self.name.as_deref().unwrap_or("unknown engine")
                );
                self.set_state(SessionState::Ready);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Engine handshake failed: {}", e);
                self.terminate().await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), EngineError> {
        self.send(GuiCommand::Uci).await.map_err(startup_error)?;
        loop {
            match self.recv_message().await {
                Some(EngineMessage::Id {
                    name: Some(name), ..
                }) => self.name = Some(name),
                Some(EngineMessage::UciOk) => break,
                Some(_) => {}
                None => return Err(closed_during_handshake()),
            }
        }

        let threads = self.options.threads;
        let hash = self.options.hash_mb;
        self.send(GuiCommand::set_option("Threads", threads))
            .await
            .map_err(startup_error)?;
        self.send(GuiCommand::set_option("Hash", hash))
            .await
            .map_err(startup_error)?;
        self.send(GuiCommand::IsReady).await.map_err(startup_error)?;
        loop {
            match self.recv_message().await {
                Some(EngineMessage::ReadyOk) => return Ok(()),
                Some(_) => {}
                None => return Err(closed_during_handshake()),
            }
        }
    }

    /// Searches `fen` to `depth` with `multipv` ranked lines.
    ///
    /// Returns `None` when the session is not ready, when the engine dies, or
    /// when no `bestmove` arrives within the search timeout. A crash leaves
    /// the session `Terminated`; a timeout leaves it `Ready`, unless the
    /// engine never finished the previously abandoned search, in which case
    /// the session is torn down.
    pub async fn analyze(&mut self, fen: &str, depth: u32, multipv: u32) -> Option<RawAnalysis> {
        if self.state() != SessionState::Ready {
            tracing::debug!("Analysis requested while {:?}", self.state());
            return None;
        }
        self.set_state(SessionState::Busy);

        let deadline = Instant::now() + self.options.search_timeout;
        match timeout_at(deadline, self.search(fen, depth, multipv)).await {
            Ok(Some(raw)) => {
                self.set_state(SessionState::Ready);
                Some(raw)
            }
            Ok(None) => {
                tracing::warn!("Engine stopped responding during search of {}", fen);
                self.mark_terminated();
                None
            }
            Err(_) if self.needs_resync => {
                tracing::warn!("Engine ignored stop; giving up on the session");
                self.terminate().await;
                None
            }
            Err(_) => {
                tracing::warn!(
                    "No bestmove within {}ms for {}",
                    self.options.search_timeout.as_millis(),
                    fen
                );
                self.abandon_search().await;
                None
            }
        }
    }

    async fn search(&mut self, fen: &str, depth: u32, multipv: u32) -> Option<RawAnalysis> {
        self.send(GuiCommand::Stop).await.ok()?;
        if self.needs_resync {
            self.resync().await?;
        }

        let multipv = multipv.max(1);
        self.send(GuiCommand::set_option("MultiPV", multipv))
            .await
            .ok()?;
        self.send(GuiCommand::position_fen(fen)).await.ok()?;
        self.send(GuiCommand::Go(GoOptions::depth(depth))).await.ok()?;
        self.awaiting_bestmove = true;

        let mut book = LineBook::new(multipv);
        loop {
            let line = self.lines.recv().await?;
            if let Some(best_move) = parse_terminal_line(&line) {
                self.awaiting_bestmove = false;
                return Some(RawAnalysis {
                    best_move,
                    lines: book.finish(),
                });
            }
            book.observe(&line);
        }
    }

    /// Discards the output of an abandoned search.
    async fn resync(&mut self) -> Option<()> {
        while self.awaiting_bestmove {
            let line = self.lines.recv().await?;
            if parse_terminal_line(&line).is_some() {
                self.awaiting_bestmove = false;
            }
        }
        self.send(GuiCommand::IsReady).await.ok()?;
        while self.recv_message().await? != EngineMessage::ReadyOk {}
        self.needs_resync = false;
        Some(())
    }

    async fn abandon_search(&mut self) {
        if self.send(GuiCommand::Stop).await.is_err() {
            self.mark_terminated();
            return;
        }
        self.needs_resync = true;
        self.set_state(SessionState::Ready);
    }

    /// Best-effort cancellation of the current search; harmless when idle.
    pub async fn stop(&mut self) {
        match self.state() {
            SessionState::Busy => self.abandon_search().await,
            SessionState::Ready => {
                if let Err(e) = self.send(GuiCommand::Stop).await {
                    tracing::debug!("stop not delivered: {}", e);
                }
            }
            SessionState::Starting | SessionState::Terminated => {}
        }
    }

    /// Sends `quit` and releases the engine. Safe to call repeatedly.
    pub async fn terminate(&mut self) {
        if self.state() == SessionState::Terminated {
            return;
        }
        let _ = self.send(GuiCommand::Quit).await;
        if let Some(mut child) = self.child.take() {
            if timeout(QUIT_GRACE, child.wait()).await.is_err() {
                let _ = child.kill().await;
            }
        }
        self.mark_terminated();
    }

    /// Relaunches the engine from its original path and redoes the handshake.
    pub async fn restart(&mut self) -> Result<(), EngineError> {
        let path = self.path.clone().ok_or(EngineError::NotRestartable)?;
        self.terminate().await;
        tracing::info!("Restarting engine {}", path.display());
        let mut fresh = Self::spawn(&path, self.options.clone())?;
        // subscribers keep watching the same channel
        std::mem::swap(&mut fresh.state, &mut self.state);
        *self = fresh;
        self.set_state(SessionState::Starting);
        self.start().await
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    fn mark_terminated(&mut self) {
        self.awaiting_bestmove = false;
        self.needs_resync = false;
        self.set_state(SessionState::Terminated);
    }

    async fn send(&mut self, command: GuiCommand) -> std::io::Result<()> {
        let line = command.to_uci();
        tracing::trace!(">> {}", line);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    async fn recv_message(&mut self) -> Option<EngineMessage> {
        self.lines.recv().await.map(|line| EngineMessage::parse(&line))
    }
}

/// Forwards engine output lines into a channel until EOF.
fn pump_lines<R>(reader: R) -> mpsc::Receiver<String>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::trace!("<< {}", line);
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
    rx
}

fn startup_error(e: std::io::Error) -> EngineError {
    EngineError::Startup(e.to_string())
}

fn closed_during_handshake() -> EngineError {
    EngineError::Startup("engine closed its output during the handshake".to_string())
}


#[cfg(test)]
mod tests {
    use super::fake::{session, Script};
    use super::*;
    use crate::ScoreValue;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[tokio::test]
    async fn handshake_negotiates_options() {
        let (mut engine, transcript) = session(Script::Normal);
        assert_eq!(engine.state(), SessionState::Starting);
        engine.start().await.unwrap();
        assert_eq!(engine.state(), SessionState::Ready);
        assert_eq!(engine.name(), Some("Fakefish 1.0"));

        let sent = transcript.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                "uci",
                "setoption name Threads value 1",
                "setoption name Hash value 32",
                "isready",
            ]
        );
    }

    #[tokio::test]
    async fn silent_engine_fails_startup() {
        let (mut engine, _) = session(Script::SilentHandshake);
        let err = engine.start().await.unwrap_err();
        assert!(matches!(err, EngineError::Startup(_)));
        assert_eq!(engine.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn analyze_before_start_is_refused() {
        let (mut engine, _) = session(Script::Normal);
        assert_eq!(engine.analyze(START, 10, 1).await, None);
    }

    #[tokio::test]
    async fn analyze_collects_latest_line_per_rank() {
        let (mut engine, transcript) = session(Script::Normal);
        engine.start().await.unwrap();

        let raw = engine.analyze(START, 12, 2).await.unwrap();
        assert_eq!(raw.best_move.token(), Some("e2e4"));
        assert_eq!(raw.best_move.ponder.as_deref(), Some("e7e5"));
        assert_eq!(raw.lines.len(), 2);
        assert_eq!(raw.lines[0].score, ScoreValue::Centipawns(20));
        assert_eq!(raw.lines[0].moves, vec!["e2e4", "e7e5"]);
        assert_eq!(raw.lines[1].depth, 2);
        assert_eq!(engine.state(), SessionState::Ready);

        let position = format!("position fen {}", START);
        let sent = transcript.lock().unwrap().clone();
        let tail: Vec<&str> = sent[sent.len() - 4..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "stop",
                "setoption name MultiPV value 2",
                position.as_str(),
                "go depth 12",
            ]
        );
    }

    #[tokio::test]
    async fn ranks_beyond_multipv_are_dropped() {
        let (mut engine, _) = session(Script::Normal);
        engine.start().await.unwrap();
        let raw = engine.analyze(START, 12, 1).await.unwrap();
        assert_eq!(raw.lines.len(), 1);
        assert_eq!(raw.lines[0].rank, 1);
    }

    #[tokio::test]
    async fn crash_mid_search_resolves_to_none() {
        let (mut engine, _) = session(Script::CrashOnGo);
        engine.start().await.unwrap();
        assert_eq!(engine.analyze(START, 12, 1).await, None);
        assert_eq!(engine.state(), SessionState::Terminated);
        assert_eq!(engine.analyze(START, 12, 1).await, None);
    }

    #[tokio::test]
    async fn hung_search_times_out_and_session_recovers() {
        let (mut engine, transcript) = session(Script::HangOnce);
        engine.start().await.unwrap();

        let started = std::time::Instant::now();
        assert_eq!(engine.analyze(START, 12, 1).await, None);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(engine.state(), SessionState::Ready);

        // the stale "bestmove a2a3" must not be attributed to this request
        let raw = engine.analyze(START, 12, 1).await.unwrap();
        assert_eq!(raw.best_move.token(), Some("e2e4"));
        let sent = transcript.lock().unwrap().clone();
        assert_eq!(sent.iter().filter(|c| c.as_str() == "isready").count(), 2);
    }

    #[tokio::test]
    async fn engine_ignoring_stop_is_terminated() {
        let (mut engine, _) = session(Script::DeafOnce);
        engine.start().await.unwrap();

        assert_eq!(engine.analyze(START, 12, 1).await, None);
        assert_eq!(engine.state(), SessionState::Ready);

        // the abandoned search never ends, so the resync cannot complete
        assert_eq!(engine.analyze(START, 12, 1).await, None);
        assert_eq!(engine.state(), SessionState::Terminated);
        assert_eq!(engine.analyze(START, 12, 1).await, None);
    }

    #[tokio::test]
    async fn stop_is_safe_when_idle() {
        let (mut engine, _) = session(Script::Normal);
        engine.stop().await;
        engine.start().await.unwrap();
        engine.stop().await;
        assert_eq!(engine.state(), SessionState::Ready);
        assert!(engine.analyze(START, 5, 1).await.is_some());
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let (mut engine, _) = session(Script::Normal);
        engine.start().await.unwrap();
        let mut states = engine.subscribe();
        engine.terminate().await;
        engine.terminate().await;
        assert_eq!(*states.borrow_and_update(), SessionState::Terminated);
        assert_eq!(engine.analyze(START, 5, 1).await, None);
    }

    #[tokio::test]
    async fn stream_sessions_cannot_restart() {
        let (mut engine, _) = session(Script::Normal);
        assert!(matches!(
            engine.restart().await,
            Err(EngineError::NotRestartable)
        ));
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let result = EngineSession::spawn("/nonexistent/engine", SessionOptions::default());
        assert!(matches!(result, Err(EngineError::Spawn { .. })));
    }
}
