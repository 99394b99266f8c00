//! Branch scoring: frequency + weakness + repertoire fit

use chess_core::{opening_key_extends, Bucket, OpeningBranchStat, OpeningProfile, Side};
use serde::{Deserialize, Serialize};

use crate::blunders::BlunderEvent;
use crate::prefs::PrepPrefs;

/// Event rate per game at which the rate half of weakness saturates.
const SATURATING_RATE: f64 = 0.5;

/// Average loss at which the severity half of weakness saturates.
const SATURATING_DROP_CP: f64 = 300.0;

/// Scoring breakdown for one opening branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchScore {
    pub branch_moves_san: Vec<String>,
    pub bucket: Bucket,
    pub opponent_side: Side,
    pub games: u32,

    pub frequency_score: f64,
    pub weakness_score: f64,
    pub fit_score: f64,
    pub total_score: f64,

    // supporting evidence
    pub blunder_rate: f64,
    pub avg_drop_cp: f64,
}

impl BranchScore {
    pub fn move_text(&self) -> String {
        self.branch_moves_san.join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Weakness {
    pub score: f64,
    pub blunder_rate: f64,
    pub avg_drop_cp: f64,
}

/// Weakness of a branch from the events whose opening key extends it.
pub fn weakness_for_branch(
    branch: &[String],
    opponent_side: Side,
    games: u32,
    events: &[BlunderEvent],
) -> Weakness {
    if games == 0 {
        return Weakness::default();
    }

    let (count, total_drop) = events
        .iter()
        .filter(|e| e.opponent_side == opponent_side && opening_key_extends(&e.opening_key, branch))
        .fold((0usize, 0i64), |(n, sum), e| (n + 1, sum + i64::from(e.drop_cp)));
    if count == 0 {
        return Weakness::default();
    }

    let blunder_rate = count as f64 / f64::from(games);
    let avg_drop_cp = total_drop as f64 / count as f64;
    let score = 0.5 * (blunder_rate / SATURATING_RATE).min(1.0)
        + 0.5 * (avg_drop_cp / SATURATING_DROP_CP).min(1.0);

    Weakness {
        score,
        blunder_rate,
        avg_drop_cp,
    }
}

fn fit_for_branch(branch: &OpeningBranchStat, banned_lc: &[String], prefs: &PrepPrefs) -> f64 {
    let text = branch.move_text().to_lowercase();
    if banned_lc.iter().any(|k| text.contains(k.as_str())) {
        return 0.0;
    }

    match (branch.side, branch.first_move()) {
        // opponent is White: the user's Black repertoire does not filter yet
        (Side::White, _) | (_, None) => 1.0,
        (Side::Black, Some(first)) => {
            let first = first.to_lowercase();
            let fits = prefs
                .as_white_first_moves
                .iter()
                .map(|m| m.trim().to_lowercase())
                .any(|m| !m.is_empty() && first.starts_with(&m));
            if fits {
                1.0
            } else {
                0.0
            }
        }
    }
}

/// Score every branch in the profile's focus, highest total first.
///
/// Frequency is relative to the most played branch of the same bucket. Ties
/// keep profile order.
pub fn score_branches(
    profile: &OpeningProfile,
    events: &[BlunderEvent],
    prefs: &PrepPrefs,
) -> Vec<BranchScore> {
    let weights = prefs.risk.weights();
    let banned_lc = prefs.banned_keywords_lowercase();

    let mut scores = Vec::new();
    for bucket in Bucket::ALL {
        let side = bucket.opponent_side();
        if !prefs.focus.includes(side) {
            continue;
        }
        let branches = profile.bucket(bucket);
        let max_games = branches.iter().map(|b| b.games).max().unwrap_or(0);
        if max_games == 0 {
            continue;
        }

        for branch in branches {
            let frequency = f64::from(branch.games) / f64::from(max_games);
            let weakness = weakness_for_branch(&branch.moves_san, side, branch.games, events);
            let fit = fit_for_branch(branch, &banned_lc, prefs);
            let total = weights.frequency * frequency + weights.weakness * weakness.score + weights.fit * fit;

            scores.push(BranchScore {
                branch_moves_san: branch.moves_san.clone(),
                bucket,
                opponent_side: side,
                games: branch.games,
                frequency_score: frequency,
                weakness_score: weakness.score,
                fit_score: fit,
                total_score: total,
                blunder_rate: weakness.blunder_rate,
                avg_drop_cp: weakness.avg_drop_cp,
            });
        }
    }

    scores.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Severity;
    use crate::prefs::{Focus, RiskProfile};

    fn stat(side: Side, moves: &str, games: u32) -> OpeningBranchStat {
        OpeningBranchStat {
            side,
            moves_san: moves.split_whitespace().map(String::from).collect(),
            games,
            score: 0.5,
        }
    }

    fn event(side: Side, opening_key: &str, drop_cp: i32) -> BlunderEvent {
        BlunderEvent {
            game_id: "g".into(),
            ply: 9,
            opponent_side: side,
            fen_before: String::new(),
            pos_key: opening_key.into(),
            opening_key: opening_key.into(),
            played_move_uci: "a2a3".into(),
            played_move_san: "a3".into(),
            drop_cp,
            severity: Severity::Blunder,
            refutation_pv_uci: Vec::new(),
            punish_move_uci: None,
        }
    }

    fn moves(text: &str) -> Vec<String> {
        text.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_frequency_relative_to_bucket() {
        let profile = OpeningProfile {
            opening_plies: 4,
            as_white_top: vec![stat(Side::White, "e4 e5 Nf3", 4), stat(Side::White, "d4 d5 c4", 2)],
            as_black_vs_d4_top: vec![stat(Side::Black, "d4 Nf6 c4", 1)],
            ..OpeningProfile::default()
        };
        let scores = score_branches(&profile, &[], &PrepPrefs::default());
        let freq = |m: &str| {
            scores
                .iter()
                .find(|s| s.move_text() == m)
                .map(|s| s.frequency_score)
                .unwrap()
        };
        assert_eq!(freq("e4 e5 Nf3"), 1.0);
        assert_eq!(freq("d4 d5 c4"), 0.5);
        assert_eq!(freq("d4 Nf6 c4"), 1.0);
    }

    #[test]
    fn test_weakness_without_matches_is_zero() {
        let events = vec![event(Side::Black, "e4 e5 Nf3", 500)];
        let w = weakness_for_branch(&moves("e4 e5 Nf3"), Side::White, 3, &events);
        assert_eq!(w, Weakness::default());
        let w = weakness_for_branch(&moves("d4 d5"), Side::Black, 3, &events);
        assert_eq!(w.score, 0.0);
        assert_eq!(weakness_for_branch(&moves("e4"), Side::Black, 0, &events).score, 0.0);
    }

    #[test]
    fn test_weakness_saturates() {
        let events = vec![event(Side::White, "e4 e5 Nf3 Nc6", 300), event(Side::White, "e4 e5 Nf3 d6", 500)];
        let w = weakness_for_branch(&moves("e4 e5 Nf3"), Side::White, 4, &events);
        assert_eq!(w.blunder_rate, 0.5);
        assert_eq!(w.avg_drop_cp, 400.0);
        assert_eq!(w.score, 1.0);

        let half = weakness_for_branch(&moves("e4 e5 Nf3"), Side::White, 8, &events[..1]);
        assert!((half.score - (0.5 * 0.25 + 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_prefix_is_per_move() {
        let events = vec![event(Side::White, "e4 e5 Nf3", 300)];
        assert_eq!(weakness_for_branch(&moves("e4 e5 N"), Side::White, 1, &events).score, 0.0);
        assert!(weakness_for_branch(&[], Side::White, 1, &events).score > 0.0);
    }

    #[test]
    fn test_banned_keyword_kills_fit() {
        let prefs = PrepPrefs {
            banned_branch_keywords: vec!["BB5".into()],
            ..PrepPrefs::default()
        };
        let branch = stat(Side::White, "e4 e5 Nf3 Nc6 Bb5", 3);
        assert_eq!(fit_for_branch(&branch, &prefs.banned_keywords_lowercase(), &prefs), 0.0);
    }

    #[test]
    fn test_black_fit_follows_white_repertoire() {
        let branch = stat(Side::Black, "e4 c5 Nf3", 3);
        let e4_player = PrepPrefs::default();
        assert_eq!(fit_for_branch(&branch, &[], &e4_player), 1.0);

        let d4_player = PrepPrefs {
            as_white_first_moves: vec!["d4".into()],
            ..PrepPrefs::default()
        };
        assert_eq!(fit_for_branch(&branch, &[], &d4_player), 0.0);
        assert_eq!(fit_for_branch(&stat(Side::White, "b3 e5", 1), &[], &d4_player), 1.0);
    }

    #[test]
    fn test_focus_and_risk() {
        let profile = OpeningProfile {
            opening_plies: 4,
            as_white_top: vec![stat(Side::White, "e4 e5 Nf3", 10), stat(Side::White, "c4 e5 Nc3", 2)],
            as_black_vs_e4_top: vec![stat(Side::Black, "e4 c5 Nf3", 3)],
            ..OpeningProfile::default()
        };
        let events = vec![
            event(Side::White, "c4 e5 Nc3 Nf6", 450),
            event(Side::White, "c4 e5 Nc3 Nc6", 350),
        ];

        let white_only = PrepPrefs {
            focus: Focus::OppAsWhite,
            ..PrepPrefs::default()
        };
        let scores = score_branches(&profile, &events, &white_only);
        assert!(scores.iter().all(|s| s.opponent_side == Side::White));

        let solid = PrepPrefs {
            risk: RiskProfile::Solid,
            ..white_only.clone()
        };
        let sharp = PrepPrefs {
            risk: RiskProfile::Sharp,
            ..white_only
        };
        assert_eq!(score_branches(&profile, &events, &solid)[0].move_text(), "e4 e5 Nf3");
        assert_eq!(score_branches(&profile, &events, &sharp)[0].move_text(), "c4 e5 Nc3");
    }
}
