//! Prep pipeline: ingest -> profile -> blunders -> report -> plan
//!
//! Each stage hands an immutable value to the next and announces itself
//! through a [`StageEvent`], so a UI can stream progress.

use chess_core::{build_opening_profile, import_pgns, ImportBatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::blunders::detect_mistakes;
use crate::config::PrepConfig;
use crate::error::PrepError;
use crate::prefs::PrepPrefs;
use crate::report::{assemble_report, PrepReport};
use crate::scoring::{score_branches, BranchScore};
use crate::select::{select_targets, Target};
use crate::stockfish::{EngineLauncher, StockfishLauncher};

/// A finished report re-scored under a set of preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedPrep {
    pub opponent_name: Option<String>,
    pub prefs: PrepPrefs,
    pub ranked_branches: Vec<BranchScore>,
    pub chosen_targets: Vec<Target>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Profile,
    Blunders,
    Report,
    Plan,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Profile => "profile",
            Stage::Blunders => "blunders",
            Stage::Report => "report",
            Stage::Plan => "plan",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: Stage,
    pub message: String,
}

/// What follows the plan. Coaching itself happens outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    Coach,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepRun {
    pub report: PrepReport,
    pub planned: PlannedPrep,
    pub events: Vec<StageEvent>,
    pub next: NextStep,
}

/// Full pipeline with Stockfish.
pub async fn run_prep<S: AsRef<str> + Sync>(
    sources: &[S],
    opponent: Option<&str>,
    config: &PrepConfig,
    prefs: &PrepPrefs,
) -> Result<PrepReport, PrepError> {
    run_prep_with(sources, opponent, config, prefs, &StockfishLauncher).await
}

/// Full pipeline with any engine launcher.
pub async fn run_prep_with<S: AsRef<str> + Sync, L: EngineLauncher>(
    sources: &[S],
    opponent: Option<&str>,
    config: &PrepConfig,
    prefs: &PrepPrefs,
    launcher: &L,
) -> Result<PrepReport, PrepError> {
    let run = run_prep_graph(sources, opponent, config, prefs, launcher, false, |_| {}).await?;
    Ok(run.report)
}

/// Normalized preferences, or every validation error at once.
pub fn checked_prefs(prefs: &PrepPrefs) -> Result<PrepPrefs, PrepError> {
    let prefs = prefs.normalize();
    prefs.validate().map_err(PrepError::InvalidPrefs)?;
    Ok(prefs)
}

/// Re-score a finished report under new preferences. No engine is involved.
pub fn plan(report: &PrepReport, prefs: &PrepPrefs) -> Result<PlannedPrep, PrepError> {
    let prefs = checked_prefs(prefs)?;
    Ok(plan_checked(report, prefs))
}

fn plan_checked(report: &PrepReport, prefs: PrepPrefs) -> PlannedPrep {
    let ranked_branches = score_branches(&report.opening_profile, &report.blunders, &prefs);
    let chosen_targets = select_targets(&ranked_branches, &report.blunders, &prefs);
    PlannedPrep {
        opponent_name: report.opponent_name.clone(),
        prefs,
        ranked_branches,
        chosen_targets,
        created_at: Utc::now(),
    }
}

/// Run every stage in order, reporting each through `on_event`.
///
/// Config and preferences are validated before any work. An empty batch
/// never launches an engine. The run ends with [`NextStep::Coach`] when
/// `enable_coach` is set.
pub async fn run_prep_graph<S, L, F>(
    sources: &[S],
    opponent: Option<&str>,
    config: &PrepConfig,
    prefs: &PrepPrefs,
    launcher: &L,
    enable_coach: bool,
    mut on_event: F,
) -> Result<PrepRun, PrepError>
where
    S: AsRef<str> + Sync,
    L: EngineLauncher,
    F: FnMut(&StageEvent),
{
    config.validate()?;
    let prefs = checked_prefs(prefs)?.with_ceilings(config.max_targets_per_side, config.turning_points_per_side);

    let mut events = Vec::new();
    let mut emit = |stage: Stage, message: String| {
        info!(stage = stage.as_str(), "{message}");
        let event = StageEvent { stage, message };
        on_event(&event);
        events.push(event);
    };

    // ingest
    let batch: ImportBatch = import_pgns(sources, opponent, &config.import_options())?;
    emit(
        Stage::Ingest,
        format!("Ingested {} games ({} skipped).", batch.games.len(), batch.skipped),
    );

    // profile
    let profile = build_opening_profile(&batch, config.opening_plies, config.top_branches);
    emit(
        Stage::Profile,
        format!(
            "Opening profile built: {} white, {} black-vs-e4, {} black-vs-d4 branches.",
            profile.as_white_top.len(),
            profile.as_black_vs_e4_top.len(),
            profile.as_black_vs_d4_top.len()
        ),
    );

    // blunders
    let blunders = if batch.is_empty() {
        Vec::new()
    } else {
        detect_mistakes(&batch, config, launcher).await?
    };
    emit(Stage::Blunders, format!("Found {} opponent mistakes.", blunders.len()));

    // report
    let opponent_name = opponent
        .map(String::from)
        .or_else(|| batch.opponent_name().map(String::from));
    let ranked = score_branches(&profile, &blunders, &prefs);
    let targets = select_targets(&ranked, &blunders, &prefs);
    let report = assemble_report(
        opponent_name,
        batch.games.len(),
        batch.skipped,
        profile,
        blunders,
        targets,
    );
    emit(Stage::Report, "Report assembled.".to_string());

    // plan
    let planned = plan_checked(&report, prefs);
    let mut summary = vec![format!("Planned {} target(s):", planned.chosen_targets.len())];
    summary.extend(planned.chosen_targets.iter().map(|t| format!("  - {}", t.headline)));
    emit(Stage::Plan, summary.join("\n"));

    let next = if enable_coach {
        NextStep::Coach
    } else {
        NextStep::Done
    };

    Ok(PrepRun {
        report,
        planned,
        events,
        next,
    })
}
