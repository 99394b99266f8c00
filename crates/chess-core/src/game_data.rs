use std::fmt;

use serde::{Deserialize, Serialize};

/// Colour of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }
}

impl From<shakmaty::Color> for Side {
    fn from(color: shakmaty::Color) -> Self {
        match color {
            shakmaty::Color::White => Side::White,
            shakmaty::Color::Black => Side::Black,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared game result, as found in the `Result` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    #[serde(rename = "1-0")]
    WhiteWins,
    #[serde(rename = "0-1")]
    BlackWins,
    #[serde(rename = "1/2-1/2")]
    Draw,
    #[serde(rename = "*")]
    Unknown,
}

impl GameResult {
    pub fn from_tag(value: &str) -> Self {
        match value.trim() {
            "1-0" => GameResult::WhiteWins,
            "0-1" => GameResult::BlackWins,
            "1/2-1/2" => GameResult::Draw,
            _ => GameResult::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameResult::WhiteWins => "1-0",
            GameResult::BlackWins => "0-1",
            GameResult::Draw => "1/2-1/2",
            GameResult::Unknown => "*",
        }
    }

    /// Points scored by `side`: win = 1, draw = 0.5, loss or unknown = 0.
    pub fn points_for(self, side: Side) -> f64 {
        self.half_points_for(side) as f64 / 2.0
    }

    /// Same as [`points_for`](Self::points_for) in half-point units, so
    /// aggregates can be summed exactly.
    pub fn half_points_for(self, side: Side) -> u32 {
        match (self, side) {
            (GameResult::WhiteWins, Side::White) | (GameResult::BlackWins, Side::Black) => 2,
            (GameResult::Draw, _) => 1,
            _ => 0,
        }
    }
}

/// One imported game. Built in a single step by the importer, including
/// opponent resolution, and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub game_id: String,
    pub event: Option<String>,
    pub site: Option<String>,
    pub date: Option<String>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: GameResult,
    pub time_control: Option<String>,
    pub white_elo: Option<u16>,
    pub black_elo: Option<u16>,

    /// Name of the scouted player as written in the game headers.
    pub opponent_name: Option<String>,
    /// Side the scouted player had, when the name hint matched.
    pub opponent_side: Option<Side>,
}

impl Game {
    /// Points the scouted player scored, if their side is known.
    pub fn opponent_points(&self) -> Option<f64> {
        self.opponent_side.map(|side| self.result.points_for(side))
    }
}

/// A single half-move of a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlyRecord {
    pub game_id: String,
    /// 1-based index within the game.
    pub ply: u32,
    pub side_who_moved: Side,
    pub fen_before: String,
    pub fen_after: String,
    pub move_uci: String,
    pub move_san: String,
    /// Position key of `fen_before`.
    pub pos_key: String,
    /// SAN moves preceding this ply, truncated to the opening depth.
    pub opening_key: String,
}

/// True when the space-separated move sequence `opening_key` begins with
/// every move of `branch`. Comparison is per move, so `"e4 e5 Nf3"` does not
/// extend `"e4 e5 N"`. An empty branch is extended by every key.
pub fn opening_key_extends<S: AsRef<str>>(opening_key: &str, branch: &[S]) -> bool {
    let mut key_moves = opening_key.split_whitespace();
    branch
        .iter()
        .all(|mv| key_moves.next() == Some(mv.as_ref()))
}
