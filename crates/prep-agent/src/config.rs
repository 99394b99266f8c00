//! Prep configuration from defaults and environment variables

use std::env;
use std::str::FromStr;

use chess_core::ImportOptions;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PrepError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrepConfig {
    /// Path to the UCI engine binary
    pub stockfish_path: String,

    /// Thinking time per analysed position
    pub engine_movetime_ms: u64,

    pub engine_threads: u32,
    pub engine_hash_mb: u32,

    /// Independent engine processes per detection run
    pub engine_pool_size: usize,

    /// A query is abandoned after `movetime * factor` (plus a fixed floor)
    pub engine_timeout_factor: u32,

    /// Optional volume caps
    pub max_games: Option<usize>,
    pub max_plies_per_game: Option<usize>,

    /// Opening depth in half-moves
    pub opening_plies: usize,

    /// Branches kept per opening bucket
    pub top_branches: usize,

    /// Evaluation loss thresholds (centipawn equivalent)
    pub mistake_drop_cp: i32,
    pub blunder_drop_cp: i32,

    /// Hard ceilings on the per-side caps in preferences
    pub max_targets_per_side: usize,
    pub turning_points_per_side: usize,

    /// Accepted but not applied yet
    pub only_time_controls: Option<Vec<String>>,
    pub since_date: Option<String>,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            stockfish_path: "stockfish".to_string(),
            engine_movetime_ms: 150,
            engine_threads: 2,
            engine_hash_mb: 128,
            engine_pool_size: 1,
            engine_timeout_factor: 5,
            max_games: None,
            max_plies_per_game: None,
            opening_plies: 8,
            top_branches: chess_core::openings::DEFAULT_TOP_BRANCHES,
            mistake_drop_cp: 80,
            blunder_drop_cp: 200,
            max_targets_per_side: 10,
            turning_points_per_side: 10,
            only_time_controls: None,
            since_date: None,
        }
    }
}

impl PrepConfig {
    /// Defaults overridden by environment variables, then validated.
    pub fn load() -> Result<Self, PrepError> {
        let defaults = Self::default();

        let stockfish_path = env::var("STOCKFISH_PATH").unwrap_or(defaults.stockfish_path);

        let engine_pool_size = match env::var("ENGINE_POOL_SIZE") {
            Ok(v) if v.trim().eq_ignore_ascii_case("auto") => num_cpus::get(),
            Ok(v) => parse_var("ENGINE_POOL_SIZE", &v)?,
            Err(_) => defaults.engine_pool_size,
        };

        let only_time_controls = env::var("ONLY_TIME_CONTROLS").ok().map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let config = Self {
            stockfish_path,
            engine_movetime_ms: env_or("ENGINE_MOVETIME_MS", defaults.engine_movetime_ms)?,
            engine_threads: env_or("ENGINE_THREADS", defaults.engine_threads)?,
            engine_hash_mb: env_or("ENGINE_HASH_MB", defaults.engine_hash_mb)?,
            engine_pool_size,
            engine_timeout_factor: env_or("ENGINE_TIMEOUT_FACTOR", defaults.engine_timeout_factor)?,
            max_games: env_opt("MAX_GAMES")?,
            max_plies_per_game: env_opt("MAX_PLIES_PER_GAME")?,
            opening_plies: env_or("OPENING_PLIES", defaults.opening_plies)?,
            top_branches: env_or("TOP_BRANCHES", defaults.top_branches)?,
            mistake_drop_cp: env_or("MISTAKE_DROP_CP", defaults.mistake_drop_cp)?,
            blunder_drop_cp: env_or("BLUNDER_DROP_CP", defaults.blunder_drop_cp)?,
            max_targets_per_side: env_or("MAX_TARGETS_PER_SIDE", defaults.max_targets_per_side)?,
            turning_points_per_side: env_or("TURNING_POINTS_PER_SIDE", defaults.turning_points_per_side)?,
            only_time_controls,
            since_date: env::var("SINCE_DATE").ok().filter(|s| !s.trim().is_empty()),
        };

        config.validate()?;
        info!(
            stockfish_path = %config.stockfish_path,
            movetime_ms = config.engine_movetime_ms,
            pool = config.engine_pool_size,
            opening_plies = config.opening_plies,
            "Prep config loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PrepError> {
        if self.stockfish_path.trim().is_empty() {
            return Err(PrepError::Config("stockfish_path is empty".into()));
        }
        if self.engine_movetime_ms == 0 {
            return Err(PrepError::Config("engine_movetime_ms must be positive".into()));
        }
        if self.engine_pool_size == 0 {
            return Err(PrepError::Config("engine_pool_size must be at least 1".into()));
        }
        if self.engine_timeout_factor == 0 {
            return Err(PrepError::Config("engine_timeout_factor must be at least 1".into()));
        }
        if self.opening_plies == 0 {
            return Err(PrepError::Config("opening_plies must be at least 1".into()));
        }
        if self.top_branches == 0 {
            return Err(PrepError::Config("top_branches must be at least 1".into()));
        }
        if self.mistake_drop_cp <= 0 {
            return Err(PrepError::Config("mistake_drop_cp must be positive".into()));
        }
        if self.blunder_drop_cp < self.mistake_drop_cp {
            return Err(PrepError::Config(format!(
                "blunder_drop_cp ({}) is below mistake_drop_cp ({})",
                self.blunder_drop_cp, self.mistake_drop_cp
            )));
        }
        if self.max_targets_per_side == 0 || self.turning_points_per_side == 0 {
            return Err(PrepError::Config("per-side caps must be at least 1".into()));
        }
        Ok(())
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            opening_plies: self.opening_plies,
            max_games: self.max_games,
            max_plies_per_game: self.max_plies_per_game,
        }
    }

    pub fn has_unapplied_filters(&self) -> bool {
        self.only_time_controls.as_ref().is_some_and(|v| !v.is_empty()) || self.since_date.is_some()
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, PrepError> {
    value
        .trim()
        .parse()
        .map_err(|_| PrepError::Config(format!("{name} has an invalid value: {value:?}")))
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, PrepError> {
    match env::var(name) {
        Ok(v) => parse_var(name, &v),
        Err(_) => Ok(default),
    }
}

fn env_opt<T: FromStr>(name: &str) -> Result<Option<T>, PrepError> {
    match env::var(name) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => parse_var(name, &v).map(Some),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PrepConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.has_unapplied_filters());
        assert_eq!(config.import_options().opening_plies, 8);
    }

    #[test]
    fn test_threshold_order_checked() {
        let config = PrepConfig {
            mistake_drop_cp: 300,
            blunder_drop_cp: 200,
            ..PrepConfig::default()
        };
        assert!(matches!(config.validate(), Err(PrepError::Config(_))));
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var::<u64>("X", " 250 ").unwrap(), 250);
        let err = parse_var::<u64>("ENGINE_MOVETIME_MS", "fast").unwrap_err();
        assert!(err.to_string().contains("ENGINE_MOVETIME_MS"));
    }
}
