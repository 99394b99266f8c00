//! Shared helpers: PGN builders and an in-process engine scripted by
//! position key.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chess_core::{import_pgns, position_key_from_fen, ImportOptions};
use prep_agent::analysis::Score;
use prep_agent::stockfish::{EngineLauncher, EngineOptions, Evaluation, Evaluator};
use prep_agent::{EngineError, PrepConfig};

/// Score every unscripted position gets, from the side to move.
pub const QUIET_SCORE: Score = Score::Cp(20);

/// One unfinished PGN game with the given headers and movetext.
pub fn pgn_game(site: &str, white: &str, black: &str, moves: &str) -> String {
    pgn_game_with_result(site, white, black, moves, "*")
}

/// Same as [`pgn_game`], ending in `result` (`1-0`, `1/2-1/2`, ...).
pub fn pgn_game_with_result(site: &str, white: &str, black: &str, moves: &str, result: &str) -> String {
    format!(
        "[Event \"Test\"]\n[Site \"{site}\"]\n[White \"{white}\"]\n[Black \"{black}\"]\n[Result \"{result}\"]\n\n{moves} {result}\n\n"
    )
}

/// FEN after playing the SAN movetext from the start position.
pub fn fen_after(moves: &str) -> String {
    let batch = import_pgns(&[pgn_game("fen", "A", "B", moves)], None, &ImportOptions::default()).unwrap();
    batch.plies.last().unwrap().fen_after.clone()
}

/// Config with a shallow opening depth so branches stay short.
pub fn test_config() -> PrepConfig {
    PrepConfig {
        opening_plies: 3,
        engine_pool_size: 2,
        engine_movetime_ms: 10,
        ..PrepConfig::default()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineLog {
    pub launched: usize,
    pub shut_down: usize,
    pub queries: usize,
}

#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    scores: Arc<HashMap<String, Score>>,
    crash_on: Option<String>,
    fail_launch: bool,
    log: Arc<Mutex<EngineLog>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher whose engines never start.
    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }

    /// Score for the position of `fen`, from its side to move.
    pub fn with_score(mut self, fen: &str, score: Score) -> Self {
        Arc::make_mut(&mut self.scores).insert(position_key_from_fen(fen), score);
        self
    }

    /// Engines die when asked about this position.
    pub fn crashing_on(mut self, fen: &str) -> Self {
        self.crash_on = Some(position_key_from_fen(fen));
        self
    }

    pub fn log(&self) -> EngineLog {
        *self.log.lock().unwrap()
    }
}

impl EngineLauncher for ScriptedLauncher {
    type Engine = ScriptedEngine;

    async fn launch(&self, options: &EngineOptions) -> Result<ScriptedEngine, EngineError> {
        if self.fail_launch {
            return Err(EngineError::Spawn {
                path: options.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such engine"),
            });
        }
        self.log.lock().unwrap().launched += 1;
        Ok(ScriptedEngine {
            scores: Arc::clone(&self.scores),
            crash_on: self.crash_on.clone(),
            log: Arc::clone(&self.log),
        })
    }
}

pub struct ScriptedEngine {
    scores: Arc<HashMap<String, Score>>,
    crash_on: Option<String>,
    log: Arc<Mutex<EngineLog>>,
}

impl Evaluator for ScriptedEngine {
    async fn analyse(&mut self, fen: &str) -> Result<Evaluation, EngineError> {
        self.log.lock().unwrap().queries += 1;
        let key = position_key_from_fen(fen);
        if self.crash_on.as_deref() == Some(key.as_str()) {
            return Err(EngineError::Crashed {
                path: "scripted".into(),
                reason: "unexpected end of output".into(),
            });
        }
        Ok(Evaluation {
            score: self.scores.get(&key).copied().unwrap_or(QUIET_SCORE),
            pv: vec!["e8e7".into(), "g5f7".into()],
        })
    }

    async fn shutdown(&mut self) {
        self.log.lock().unwrap().shut_down += 1;
    }
}
