//! Target selection: top branches per side with their turning points

use std::collections::HashSet;

use chess_core::{opening_key_extends, Side};
use serde::{Deserialize, Serialize};

use crate::analysis::Severity;
use crate::blunders::BlunderEvent;
use crate::prefs::{PrepPrefs, SelectionPolicy};
use crate::scoring::BranchScore;

const TURNING_POINT_NOTE: &str = "Look for forcing moves and punish loose pieces.";

/// A position worth drilling: the opponent went wrong here before.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurningPoint {
    pub title: String,
    pub fen: String,
    pub pos_key: String,
    pub opening_key: String,
    pub mistake_move_san: String,
    pub mistake_move_uci: String,
    pub severity: Severity,
    pub drop_cp: i32,
    pub punish_move_uci: Option<String>,
    pub refutation_line_uci: Vec<String>,
    pub note: String,
}

impl From<&BlunderEvent> for TurningPoint {
    fn from(event: &BlunderEvent) -> Self {
        Self {
            title: format!("Turning point (drop {:.1})", f64::from(event.drop_cp) / 100.0),
            fen: event.fen_before.clone(),
            pos_key: event.pos_key.clone(),
            opening_key: event.opening_key.clone(),
            mistake_move_san: event.played_move_san.clone(),
            mistake_move_uci: event.played_move_uci.clone(),
            severity: event.severity,
            drop_cp: event.drop_cp,
            punish_move_uci: event.punish_move_uci.clone(),
            refutation_line_uci: event.refutation_pv_uci.clone(),
            note: TURNING_POINT_NOTE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub opponent_side: Side,
    pub headline: String,
    pub branch: BranchScore,
    pub turning_points: Vec<TurningPoint>,
}

/// One-line summary of a scored branch.
pub fn headline(score: &BranchScore) -> String {
    let moves = if score.branch_moves_san.is_empty() {
        "(root)".to_string()
    } else {
        score.move_text()
    };
    let mut parts = vec![moves, format!("{} games", score.games)];
    if score.blunder_rate > 0.0 {
        parts.push(format!("{:.0}% blunder rate", score.blunder_rate * 100.0));
    }
    if score.fit_score > 0.0 {
        parts.push("fits repertoire".to_string());
    }
    parts.join(", ")
}

/// Turning points inside a branch, worst first, one per position.
pub fn turning_points_for(
    branch: &BranchScore,
    events: &[&BlunderEvent],
    cap: usize,
) -> Vec<TurningPoint> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut points = Vec::new();
    for &event in events {
        if points.len() >= cap {
            break;
        }
        if event.opponent_side != branch.opponent_side
            || !opening_key_extends(&event.opening_key, &branch.branch_moves_san)
        {
            continue;
        }
        if !seen.insert(event.pos_key.as_str()) {
            continue;
        }
        points.push(TurningPoint::from(event));
    }
    points
}

/// Pick targets from branches ranked by [`crate::scoring::score_branches`].
///
/// The first `max_targets_per_side` branches of each side are chosen. Under
/// [`SelectionPolicy::RequireTurningPoints`] a chosen branch without turning
/// points is dropped rather than replaced.
pub fn select_targets(ranked: &[BranchScore], events: &[BlunderEvent], prefs: &PrepPrefs) -> Vec<Target> {
    let mut by_loss: Vec<&BlunderEvent> = events.iter().collect();
    by_loss.sort_by(|a, b| b.drop_cp.cmp(&a.drop_cp));

    let mut white_chosen = 0;
    let mut black_chosen = 0;
    let mut targets = Vec::new();

    for branch in ranked {
        let chosen = match branch.opponent_side {
            Side::White => &mut white_chosen,
            Side::Black => &mut black_chosen,
        };
        if *chosen >= prefs.max_targets_per_side {
            continue;
        }
        *chosen += 1;

        let turning_points = turning_points_for(branch, &by_loss, prefs.max_turning_points_per_side);
        if turning_points.is_empty() && prefs.selection == SelectionPolicy::RequireTurningPoints {
            continue;
        }

        targets.push(Target {
            opponent_side: branch.opponent_side,
            headline: headline(branch),
            branch: branch.clone(),
            turning_points,
        });
    }

    targets
}
