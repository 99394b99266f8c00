pub use chess_core;

pub mod analysis;
pub mod blunders;
pub mod config;
pub mod drills;
pub mod error;
pub mod pipeline;
pub mod prefs;
pub mod report;
pub mod scoring;
pub mod select;
pub mod stockfish;

pub use config::PrepConfig;
pub use error::{EngineError, PrepError};
pub use pipeline::{plan, run_prep, run_prep_graph, run_prep_with, NextStep, PlannedPrep, PrepRun, Stage, StageEvent};
pub use prefs::{Focus, PrefsForm, PrepPrefs, RiskProfile, SelectionPolicy};
pub use report::{PrepReport, ReportStatus};
