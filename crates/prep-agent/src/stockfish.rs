//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::analysis::Score;
use crate::config::PrepConfig;
use crate::error::EngineError;

/// Added to every query budget so tiny movetimes still leave room for I/O.
const TIMEOUT_FLOOR_MS: u64 = 1_000;

/// Limit for the startup handshake (`uciok`, `readyok`).
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const QUIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything needed to launch and drive one engine process.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub path: String,
    pub threads: u32,
    pub hash_mb: u32,
    pub movetime_ms: u64,
    pub timeout_factor: u32,
}

impl EngineOptions {
    pub fn from_config(config: &PrepConfig) -> Self {
        Self {
            path: config.stockfish_path.clone(),
            threads: config.engine_threads,
            hash_mb: config.engine_hash_mb,
            movetime_ms: config.engine_movetime_ms,
            timeout_factor: config.engine_timeout_factor,
        }
    }

    /// Wall-clock limit for one analysis before it counts as failed.
    pub fn query_budget(&self) -> Duration {
        Duration::from_millis(
            self.movetime_ms
                .saturating_mul(u64::from(self.timeout_factor))
                .saturating_add(TIMEOUT_FLOOR_MS),
        )
    }
}

/// Result of a single position analysis
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Score relative to the side to move
    pub score: Score,
    /// Principal variation in UCI notation
    pub pv: Vec<String>,
}

/// Anything that can analyse a FEN under a fixed per-query budget.
pub trait Evaluator {
    fn analyse(&mut self, fen: &str) -> impl Future<Output = Result<Evaluation, EngineError>>;

    /// Terminate the underlying process. Called exactly once per launch.
    fn shutdown(&mut self) -> impl Future<Output = ()>;
}

/// Starts evaluators for a detection run.
pub trait EngineLauncher {
    type Engine: Evaluator;

    fn launch(&self, options: &EngineOptions) -> impl Future<Output = Result<Self::Engine, EngineError>>;
}

/// Launches real Stockfish processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockfishLauncher;

impl EngineLauncher for StockfishLauncher {
    type Engine = StockfishEngine;

    async fn launch(&self, options: &EngineOptions) -> Result<StockfishEngine, EngineError> {
        StockfishEngine::new(options).await
    }
}

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// Survives a cancelled read, so a timed-out query never splits a line.
    pending: String,
    path: String,
    movetime_ms: u64,
    budget: Duration,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(options: &EngineOptions) -> Result<Self, EngineError> {
        let mut process = Command::new(&options.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: options.path.clone(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (process.stdin.take(), process.stdout.take()) else {
            let _ = process.start_kill();
            return Err(EngineError::Protocol {
                path: options.path.clone(),
                reason: "engine pipes unavailable".into(),
            });
        };

        let mut engine = Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
            pending: String::new(),
            path: options.path.clone(),
            movetime_ms: options.movetime_ms,
            budget: options.query_budget(),
        };

        // Initialize UCI
        engine.send("uci").await?;
        engine.wait_for("uciok", HANDSHAKE_TIMEOUT).await?;

        // Configure for analysis
        engine
            .send(&format!("setoption name Threads value {}", options.threads))
            .await?;
        engine
            .send(&format!("setoption name Hash value {}", options.hash_mb))
            .await?;
        engine.send("isready").await?;
        engine.wait_for("readyok", HANDSHAKE_TIMEOUT).await?;

        debug!(path = %engine.path, "Stockfish ready");
        Ok(engine)
    }

    fn crashed(&self, reason: impl Into<String>) -> EngineError {
        EngineError::Crashed {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), EngineError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| self.crashed(format!("write failed: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| self.crashed(format!("flush failed: {e}")))?;
        Ok(())
    }

    /// Read one complete line. End of stream means the process is gone.
    async fn read_line(&mut self) -> Result<String, EngineError> {
        let n = self
            .stdout
            .read_line(&mut self.pending)
            .await
            .map_err(|e| self.crashed(format!("read failed: {e}")))?;
        if n == 0 {
            return Err(self.crashed("unexpected end of output"));
        }
        let line = std::mem::take(&mut self.pending);
        let trimmed = line.trim().to_string();
        debug!(line = %trimmed, "SF >");
        Ok(trimmed)
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str, limit: Duration) -> Result<(), EngineError> {
        let wait = async {
            loop {
                if self.read_line().await? == expected {
                    return Ok(());
                }
            }
        };
        match timeout(limit, wait).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Protocol {
                path: self.path.clone(),
                reason: format!("no {expected} within {limit:?}"),
            }),
        }
    }

    /// Analyse a position for the configured movetime.
    ///
    /// A search that overruns its budget is stopped and reported as
    /// [`EngineError::Timeout`]. The engine then gets one more budget to
    /// answer `readyok`; if it does not, the failure is fatal.
    pub async fn evaluate(&mut self, fen: &str) -> Result<Evaluation, EngineError> {
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go movetime {}", self.movetime_ms)).await?;

        let budget = self.budget;
        match timeout(budget, self.read_search()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(fen, budget_ms = budget.as_millis() as u64, "Analysis timed out, stopping search");
                self.send("stop").await?;
                self.send("isready").await?;
                self.wait_for("readyok", budget).await?;
                Err(EngineError::Timeout {
                    budget_ms: budget.as_millis() as u64,
                })
            }
        }
    }

    /// Collect info lines until `bestmove`, keeping the deepest score and PV.
    async fn read_search(&mut self) -> Result<Evaluation, EngineError> {
        let mut score = None;
        let mut pv = Vec::new();

        loop {
            let line = self.read_line().await?;
            if line.starts_with("info") {
                if let Some(s) = parse_score(&line) {
                    score = Some(s);
                }
                if line.contains(" pv ") {
                    pv = parse_pv(&line);
                }
            } else if line.starts_with("bestmove") {
                break;
            }
        }

        score
            .map(|score| Evaluation { score, pv })
            .ok_or(EngineError::NoScore)
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        if timeout(QUIT_TIMEOUT, self.process.wait()).await.is_err() {
            warn!(path = %self.path, "Stockfish ignored quit, killing");
            let _ = self.process.kill().await;
        }
    }
}

impl Evaluator for StockfishEngine {
    async fn analyse(&mut self, fen: &str) -> Result<Evaluation, EngineError> {
        self.evaluate(fen).await
    }

    async fn shutdown(&mut self) {
        self.quit().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// Parse the score of an info line, centipawns or mate
fn parse_score(line: &str) -> Option<Score> {
    parse_cp(line)
        .map(Score::Cp)
        .or_else(|| parse_mate(line).map(Score::Mate))
}

/// Parse centipawn score from info line
fn parse_cp(line: &str) -> Option<i32> {
    token_after(line, "cp")
}

/// Parse mate score from info line
fn parse_mate(line: &str) -> Option<i32> {
    token_after(line, "mate")
}

fn token_after(line: &str, key: &str) -> Option<i32> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    parts
        .windows(2)
        .find(|w| w[0] == key)
        .and_then(|w| w[1].parse().ok())
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    line.split_whitespace()
        .skip_while(|part| *part != "pv")
        .skip(1)
        // PV ends at next keyword or end of line
        .take_while(|part| !part.starts_with("bmc") && *part != "string")
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cp() {
        let line = "info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 pv e2e4";
        assert_eq!(parse_cp(line), Some(35));
        assert_eq!(parse_score(line), Some(Score::Cp(35)));
    }

    #[test]
    fn test_parse_mate() {
        let line = "info depth 20 score mate -3 nodes 100000 pv e2e4";
        assert_eq!(parse_mate(line), Some(-3));
        assert_eq!(parse_score(line), Some(Score::Mate(-3)));
        assert_eq!(parse_score("info depth 0 score mate 0"), Some(Score::Mate(0)));
    }

    #[test]
    fn test_parse_pv() {
        let line = "info depth 20 score cp 35 pv e2e4 e7e5 g1f3";
        let pv = parse_pv(line);
        assert_eq!(pv, vec!["e2e4", "e7e5", "g1f3"]);
        assert!(parse_pv("info depth 3 score cp 10").is_empty());
    }

    #[test]
    fn test_info_string_has_no_score() {
        assert_eq!(parse_score("info string NNUE evaluation using nn-1.nnue enabled"), None);
    }

    #[test]
    fn test_query_budget() {
        let options = EngineOptions {
            path: "stockfish".into(),
            threads: 1,
            hash_mb: 16,
            movetime_ms: 200,
            timeout_factor: 5,
        };
        assert_eq!(options.query_budget(), Duration::from_millis(2_000));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let options = EngineOptions {
            path: "/nonexistent/stockfish-binary".into(),
            threads: 1,
            hash_mb: 16,
            movetime_ms: 50,
            timeout_factor: 2,
        };
        match StockfishEngine::new(&options).await {
            Err(EngineError::Spawn { path, .. }) => assert_eq!(path, "/nonexistent/stockfish-binary"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("spawned a missing binary"),
        }
    }

    /// Answers the handshake, ignores the first `go`, and answers later
    /// searches. With `settle` unset it also ignores every `isready` after
    /// the handshake.
    #[cfg(unix)]
    const STALLING_ENGINE: &str = r#"#!/bin/sh
ready=0
searches=0
while read -r cmd; do
  case "$cmd" in
    uci) echo "id name stall"; echo uciok ;;
    isready)
      ready=$((ready + 1))
      if [ "$ready" -eq 1 ] || [ "$SETTLE" = 1 ]; then echo readyok; fi ;;
    go*)
      searches=$((searches + 1))
      if [ "$searches" -gt 1 ]; then
        echo "info depth 1 score cp 15 pv e2e4 e7e5"
        echo "bestmove e2e4"
      fi ;;
    quit) exit 0 ;;
  esac
done
"#;

    #[cfg(unix)]
    fn fake_engine(name: &str, settle: bool) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("prep-agent-{}-{name}.sh", std::process::id()));
        let body = STALLING_ENGINE.replacen("ready=0", &format!("ready=0\nSETTLE={}", u8::from(settle)), 1);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    async fn start(path: &std::path::Path) -> StockfishEngine {
        let options = EngineOptions {
            path: path.display().to_string(),
            threads: 1,
            hash_mb: 16,
            movetime_ms: 10,
            timeout_factor: 1,
        };
        // a freshly written script can briefly be "text file busy"
        for _ in 0..20 {
            match StockfishEngine::new(&options).await {
                Ok(engine) => return engine,
                Err(EngineError::Spawn { source, .. }) if source.raw_os_error() == Some(26) => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Err(other) => panic!("fake engine failed to start: {other}"),
            }
        }
        panic!("fake engine stayed busy");
    }

    #[cfg(unix)]
    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stalled_search_times_out_and_engine_recovers() {
        let path = fake_engine("settles", true);
        let mut engine = start(&path).await;

        let err = engine.evaluate(START_FEN).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout { budget_ms: 1_010 }));
        assert!(!err.is_fatal());

        let eval = engine.evaluate(START_FEN).await.unwrap();
        assert_eq!(eval.score, Score::Cp(15));
        assert_eq!(eval.pv, vec!["e2e4", "e7e5"]);

        engine.quit().await;
        let _ = std::fs::remove_file(path);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_engine_that_never_settles_is_fatal() {
        let path = fake_engine("stuck", false);
        let mut engine = start(&path).await;

        let err = engine.evaluate(START_FEN).await.unwrap_err();
        assert!(err.is_fatal());
        match &err {
            EngineError::Protocol { path: engine_path, reason } => {
                assert_eq!(engine_path, &path.display().to_string());
                assert!(reason.contains("readyok"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains(&path.display().to_string()));

        engine.quit().await;
        let _ = std::fs::remove_file(path);
    }
}
