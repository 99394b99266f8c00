//! Training drills built from a planned prep

use std::collections::HashSet;

use chess_core::{fen_after_uci, uci_line_to_san, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::pipeline::PlannedPrep;
use crate::select::TurningPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrillMode {
    /// Find the move that punishes the opponent's mistake
    Punish,
    /// Hint only, no engine answer to reveal
    Plan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillItem {
    pub drill_id: String,
    pub mode: DrillMode,
    pub opponent_side: Side,
    pub fen: String,
    pub prompt: String,
    pub best_move_uci: Option<String>,
    pub best_line_uci: Vec<String>,
    pub best_line_san: Vec<String>,
    pub source_opening_key: String,
    pub drop_cp: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillPack {
    pub pack_id: String,
    pub opponent_name: Option<String>,
    pub items: Vec<DrillItem>,
    pub created_at: DateTime<Utc>,
}

fn short_digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let hex = format!("{:x}", hasher.finalize());
    hex[..12].to_string()
}

fn drill_for(side: Side, branch_text: &str, tp: &TurningPoint) -> DrillItem {
    let drill_id = short_digest(&[&tp.pos_key, branch_text]);
    let after = fen_after_uci(&tp.fen, &tp.mistake_move_uci);

    match (after, &tp.punish_move_uci) {
        (Some(fen), Some(best)) => DrillItem {
            drill_id,
            mode: DrillMode::Punish,
            opponent_side: side,
            prompt: format!(
                "The opponent just played {}. Find the move that punishes it.",
                tp.mistake_move_san
            ),
            best_move_uci: Some(best.clone()),
            best_line_san: uci_line_to_san(&fen, &tp.refutation_line_uci),
            best_line_uci: tp.refutation_line_uci.clone(),
            fen,
            source_opening_key: tp.opening_key.clone(),
            drop_cp: Some(tp.drop_cp),
        },
        _ => DrillItem {
            drill_id,
            mode: DrillMode::Plan,
            opponent_side: side,
            fen: tp.fen.clone(),
            prompt: format!(
                "The opponent tends to go wrong here (they played {}). What should you be ready for?",
                tp.mistake_move_san
            ),
            best_move_uci: None,
            best_line_uci: Vec::new(),
            best_line_san: Vec::new(),
            source_opening_key: tp.opening_key.clone(),
            drop_cp: Some(tp.drop_cp),
        },
    }
}

/// One drill per turning point of every chosen target, in target order.
pub fn build_drill_pack(planned: &PlannedPrep) -> DrillPack {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for target in &planned.chosen_targets {
        let branch_text = target.branch.move_text();
        for tp in &target.turning_points {
            let item = drill_for(target.opponent_side, &branch_text, tp);
            if seen.insert(item.drill_id.clone()) {
                items.push(item);
            }
        }
    }

    let ids: Vec<&str> = items.iter().map(|i| i.drill_id.as_str()).collect();
    let opponent = planned.opponent_name.as_deref().unwrap_or("");
    let mut parts = vec![opponent];
    parts.extend(ids);

    DrillPack {
        pack_id: short_digest(&parts),
        opponent_name: planned.opponent_name.clone(),
        items,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Severity;
    use crate::prefs::PrepPrefs;
    use crate::scoring::BranchScore;
    use crate::select::Target;
    use chess_core::Bucket;

    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

    fn turning_point(punish: Option<&str>) -> TurningPoint {
        TurningPoint {
            title: "Turning point (drop 3.0)".into(),
            fen: AFTER_E4.into(),
            pos_key: "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq -".into(),
            opening_key: "e4".into(),
            mistake_move_san: "f6".into(),
            mistake_move_uci: "f7f6".into(),
            severity: Severity::Blunder,
            drop_cp: 300,
            punish_move_uci: punish.map(String::from),
            refutation_line_uci: punish.map(|m| vec![m.to_string(), "g7g6".into()]).unwrap_or_default(),
            note: String::new(),
        }
    }

    fn planned(tps: Vec<TurningPoint>) -> PlannedPrep {
        let branch = BranchScore {
            branch_moves_san: vec!["e4".into()],
            bucket: Bucket::OpponentAsBlackVsE4,
            opponent_side: Side::Black,
            games: 3,
            frequency_score: 1.0,
            weakness_score: 0.5,
            fit_score: 1.0,
            total_score: 0.8,
            blunder_rate: 0.3,
            avg_drop_cp: 300.0,
        };
        PlannedPrep {
            opponent_name: Some("Scout".into()),
            prefs: PrepPrefs::default(),
            ranked_branches: vec![branch.clone()],
            chosen_targets: vec![Target {
                opponent_side: Side::Black,
                headline: "e4, 3 games".into(),
                branch,
                turning_points: tps,
            }],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_punish_drill_uses_position_after_mistake() {
        let pack = build_drill_pack(&planned(vec![turning_point(Some("d1h5"))]));
        assert_eq!(pack.items.len(), 1);
        let item = &pack.items[0];
        assert_eq!(item.mode, DrillMode::Punish);
        assert!(item.fen.starts_with("rnbqkbnr/ppppp1pp/5p2/8/4P3/8/PPPP1PPP/RNBQKBNR w"));
        assert_eq!(item.best_move_uci.as_deref(), Some("d1h5"));
        assert_eq!(item.best_line_san, vec!["Qh5+", "g6"]);
        assert!(item.prompt.contains("f6"));
        assert_eq!(item.drill_id.len(), 12);
        assert_eq!(pack.pack_id.len(), 12);
    }

    #[test]
    fn test_plan_drill_without_punish_move() {
        let pack = build_drill_pack(&planned(vec![turning_point(None)]));
        let item = &pack.items[0];
        assert_eq!(item.mode, DrillMode::Plan);
        assert_eq!(item.fen, AFTER_E4);
        assert!(item.best_line_uci.is_empty());
    }

    #[test]
    fn test_ids_are_stable_and_unique() {
        let a = build_drill_pack(&planned(vec![turning_point(Some("d1h5")), turning_point(Some("d1h5"))]));
        assert_eq!(a.items.len(), 1);
        let b = build_drill_pack(&planned(vec![turning_point(Some("d1h5"))]));
        assert_eq!(a.pack_id, b.pack_id);
        assert_eq!(a.items[0].drill_id, b.items[0].drill_id);
    }
}
