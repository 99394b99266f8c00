//! Evaluation normalization and mistake classification. Pure functions only,
//! no engine or game dependencies.

use serde::{Deserialize, Serialize};

/// Value of a forced mate delivered on the spot.
pub const MATE_CEILING: i32 = 100_000;

/// Value lost per move of mate distance.
pub const MATE_DECAY_PER_MOVE: i32 = 1_000;

/// Mate distances beyond this are treated as equally far, so every mate
/// stays at least `MATE_CEILING - MATE_DECAY_PER_MOVE * MAX_MATE_DISTANCE`.
const MAX_MATE_DISTANCE: i32 = 50;

/// Engine score as reported, relative to the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Score {
    Cp(i32),
    /// Mate in N moves; negative when the side to move gets mated, zero when
    /// it is already mated.
    Mate(i32),
}

impl Score {
    /// Single numeric scale for the side to move.
    pub fn to_numeric(self) -> i32 {
        match self {
            Score::Cp(cp) => cp,
            Score::Mate(0) => -MATE_CEILING,
            Score::Mate(n) => {
                let magnitude = MATE_CEILING - MATE_DECAY_PER_MOVE * n.abs().min(MAX_MATE_DISTANCE);
                if n > 0 {
                    magnitude
                } else {
                    -magnitude
                }
            }
        }
    }

    /// Numeric value for a given player: the side to move keeps the sign,
    /// the other side gets it flipped.
    pub fn numeric_for(self, pov_is_side_to_move: bool) -> i32 {
        let value = self.to_numeric();
        if pov_is_side_to_move {
            value
        } else {
            -value
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mistake,
    Blunder,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Mistake => "mistake",
            Severity::Blunder => "blunder",
        }
    }
}

/// Loss thresholds in centipawn equivalents.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub mistake_cp: i32,
    pub blunder_cp: i32,
}

/// Damage done by one move, from the mover's point of view.
///
/// `before` scores the position with the mover to play; `after` scores the
/// position right after the move, where the other side is to play.
pub fn evaluation_loss(before: Score, after: Score) -> i32 {
    let before_value = before.numeric_for(true);
    let after_value = after.numeric_for(false);
    before_value.saturating_sub(after_value)
}

/// `None` below the mistake threshold.
pub fn classify_loss(loss: i32, thresholds: Thresholds) -> Option<Severity> {
    if loss >= thresholds.blunder_cp {
        Some(Severity::Blunder)
    } else if loss >= thresholds.mistake_cp {
        Some(Severity::Mistake)
    } else {
        None
    }
}
