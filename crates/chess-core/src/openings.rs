//! Opening profile: which branches the scouted player reaches, and how they
//! score in them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::game_data::Side;
use crate::pgn::ImportBatch;

/// Default number of branches kept per bucket.
pub const DEFAULT_TOP_BRANCHES: usize = 10;

/// Aggregate over games sharing the same first moves and opponent side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningBranchStat {
    pub side: Side,
    pub moves_san: Vec<String>,
    pub games: u32,
    /// Opponent points per game in this branch (0..=1).
    pub score: f64,
}

impl OpeningBranchStat {
    pub fn move_text(&self) -> String {
        self.moves_san.join(" ")
    }

    pub fn first_move(&self) -> Option<&str> {
        self.moves_san.first().map(String::as_str)
    }
}

/// The three statistic buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    OpponentAsWhite,
    OpponentAsBlackVsE4,
    OpponentAsBlackVsD4,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [
        Bucket::OpponentAsWhite,
        Bucket::OpponentAsBlackVsE4,
        Bucket::OpponentAsBlackVsD4,
    ];

    pub fn opponent_side(self) -> Side {
        match self {
            Bucket::OpponentAsWhite => Side::White,
            Bucket::OpponentAsBlackVsE4 | Bucket::OpponentAsBlackVsD4 => Side::Black,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Bucket::OpponentAsWhite => "Opponent as White",
            Bucket::OpponentAsBlackVsE4 => "Opponent as Black vs 1.e4",
            Bucket::OpponentAsBlackVsD4 => "Opponent as Black vs 1.d4",
        }
    }

    /// Bucket for a branch played with the opponent on `side`. Black branches
    /// are split by White's first move; anything but 1.e4 / 1.d4 is out of
    /// scope.
    pub fn classify(side: Side, moves: &[String]) -> Option<Bucket> {
        match side {
            Side::White => Some(Bucket::OpponentAsWhite),
            Side::Black => {
                let first = moves.first()?;
                if first.starts_with("e4") {
                    Some(Bucket::OpponentAsBlackVsE4)
                } else if first.starts_with("d4") {
                    Some(Bucket::OpponentAsBlackVsD4)
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OpeningProfile {
    pub opening_plies: usize,
    pub opponent_name: Option<String>,
    pub as_white_top: Vec<OpeningBranchStat>,
    pub as_black_vs_e4_top: Vec<OpeningBranchStat>,
    pub as_black_vs_d4_top: Vec<OpeningBranchStat>,
}

impl OpeningProfile {
    pub fn bucket(&self, bucket: Bucket) -> &[OpeningBranchStat] {
        match bucket {
            Bucket::OpponentAsWhite => &self.as_white_top,
            Bucket::OpponentAsBlackVsE4 => &self.as_black_vs_e4_top,
            Bucket::OpponentAsBlackVsD4 => &self.as_black_vs_d4_top,
        }
    }

    pub fn branch_count(&self) -> usize {
        Bucket::ALL.iter().map(|b| self.bucket(*b).len()).sum()
    }
}

#[derive(Default)]
struct Tally {
    games: u32,
    half_points: u32,
}

/// Build the opening profile from one import batch.
///
/// A game's branch is the SAN of its plies numbered below `opening_plies`.
/// Games without a resolved opponent side, or with an empty branch, are not
/// counted. Buckets are sorted by games, then score, then move text, and cut
/// to `top_n`; the output does not depend on game order.
pub fn build_opening_profile(batch: &ImportBatch, opening_plies: usize, top_n: usize) -> OpeningProfile {
    let mut branch_by_game: HashMap<&str, Vec<String>> = HashMap::new();
    for ply in &batch.plies {
        if (ply.ply as usize) < opening_plies {
            branch_by_game
                .entry(ply.game_id.as_str())
                .or_default()
                .push(ply.move_san.clone());
        }
    }

    let mut tallies: HashMap<(Bucket, Vec<String>), Tally> = HashMap::new();
    for game in &batch.games {
        let Some(side) = game.opponent_side else {
            continue;
        };
        let Some(moves) = branch_by_game.remove(game.game_id.as_str()) else {
            continue;
        };
        let Some(bucket) = Bucket::classify(side, &moves) else {
            continue;
        };

        let tally = tallies.entry((bucket, moves)).or_default();
        tally.games += 1;
        tally.half_points += game.result.half_points_for(side);
    }

    let mut buckets: HashMap<Bucket, Vec<OpeningBranchStat>> = HashMap::new();
    for ((bucket, moves), tally) in tallies {
        buckets.entry(bucket).or_default().push(OpeningBranchStat {
            side: bucket.opponent_side(),
            moves_san: moves,
            games: tally.games,
            score: tally.half_points as f64 / (2.0 * tally.games.max(1) as f64),
        });
    }

    let mut top = |bucket: Bucket| {
        let mut stats = buckets.remove(&bucket).unwrap_or_default();
        stats.sort_by(|a, b| {
            b.games
                .cmp(&a.games)
                .then(b.score.total_cmp(&a.score))
                .then_with(|| a.moves_san.cmp(&b.moves_san))
        });
        stats.truncate(top_n);
        stats
    };

    OpeningProfile {
        opening_plies,
        opponent_name: batch.opponent_name().map(String::from),
        as_white_top: top(Bucket::OpponentAsWhite),
        as_black_vs_e4_top: top(Bucket::OpponentAsBlackVsE4),
        as_black_vs_d4_top: top(Bucket::OpponentAsBlackVsD4),
    }
}
