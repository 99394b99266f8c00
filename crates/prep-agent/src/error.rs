//! Prep agent error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to spawn engine at {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine at {path} stopped responding: {reason}")]
    Crashed { path: String, reason: String },

    #[error("Engine at {path} broke protocol: {reason}")]
    Protocol { path: String, reason: String },

    #[error("Analysis exceeded its {budget_ms} ms budget")]
    Timeout { budget_ms: u64 },

    #[error("Analysis finished without a score")]
    NoScore,
}

impl EngineError {
    /// Fatal errors end the whole detection run; the rest only lose one ply.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::Timeout { .. } | EngineError::NoScore)
    }
}

#[derive(Error, Debug)]
pub enum PrepError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid preferences: {}", .0.join("; "))]
    InvalidPrefs(Vec<String>),

    #[error("Import error: {0}")]
    Import(#[from] chess_core::ImportError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
