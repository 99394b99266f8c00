//! User preferences that shape scoring and target selection

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chess_core::Side;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which side of the opponent's games to prepare for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Focus {
    #[default]
    Both,
    OppAsWhite,
    OppAsBlack,
}

impl Focus {
    pub fn includes(self, side: Side) -> bool {
        match self {
            Focus::Both => true,
            Focus::OppAsWhite => side == Side::White,
            Focus::OppAsBlack => side == Side::Black,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Focus::Both => "both",
            Focus::OppAsWhite => "opp_as_white",
            Focus::OppAsBlack => "opp_as_black",
        }
    }
}

impl FromStr for Focus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "both" => Ok(Focus::Both),
            "opp_as_white" | "white" => Ok(Focus::OppAsWhite),
            "opp_as_black" | "black" => Ok(Focus::OppAsBlack),
            other => Err(format!("Unknown focus: {other:?}")),
        }
    }
}

/// Scoring weights for frequency, weakness and repertoire fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub frequency: f64,
    pub weakness: f64,
    pub fit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    /// Favors the lines the opponent plays most
    Solid,
    #[default]
    Practical,
    /// Favors the lines where the opponent goes wrong
    Sharp,
}

impl RiskProfile {
    pub fn weights(self) -> Weights {
        let (frequency, weakness, fit) = match self {
            RiskProfile::Solid => (0.50, 0.20, 0.30),
            RiskProfile::Practical => (0.40, 0.35, 0.25),
            RiskProfile::Sharp => (0.25, 0.50, 0.25),
        };
        Weights {
            frequency,
            weakness,
            fit,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskProfile::Solid => "solid",
            RiskProfile::Practical => "practical",
            RiskProfile::Sharp => "sharp",
        }
    }
}

impl FromStr for RiskProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solid" => Ok(RiskProfile::Solid),
            "practical" => Ok(RiskProfile::Practical),
            "sharp" => Ok(RiskProfile::Sharp),
            other => Err(format!("Unknown risk profile: {other:?}")),
        }
    }
}

/// How chosen branches turn into targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// A branch without turning points produces no target.
    #[default]
    RequireTurningPoints,
    /// Every chosen branch produces a target, possibly without turning points.
    BranchOnly,
}

impl SelectionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionPolicy::RequireTurningPoints => "require_turning_points",
            SelectionPolicy::BranchOnly => "branch_only",
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "require_turning_points" | "strict" => Ok(SelectionPolicy::RequireTurningPoints),
            "branch_only" => Ok(SelectionPolicy::BranchOnly),
            other => Err(format!("Unknown selection policy: {other:?}")),
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepPrefs {
    pub focus: Focus,
    pub risk: RiskProfile,

    /// The user's repertoire
    pub as_white_first_moves: Vec<String>,
    pub as_black_vs_e4: Vec<String>,
    pub as_black_vs_d4: Vec<String>,

    /// Branches whose move text contains any of these are never a fit
    pub banned_branch_keywords: Vec<String>,

    pub max_targets_per_side: usize,
    pub max_turning_points_per_side: usize,
    pub selection: SelectionPolicy,

    pub notes: String,
}

impl Default for PrepPrefs {
    fn default() -> Self {
        Self {
            focus: Focus::Both,
            risk: RiskProfile::Practical,
            as_white_first_moves: vec!["e4".into(), "d4".into()],
            as_black_vs_e4: vec!["c5".into(), "e5".into()],
            as_black_vs_d4: vec!["Nf6".into(), "d5".into()],
            banned_branch_keywords: Vec::new(),
            max_targets_per_side: 3,
            max_turning_points_per_side: 10,
            selection: SelectionPolicy::RequireTurningPoints,
            notes: String::new(),
        }
    }
}

impl PrepPrefs {
    /// Trimmed copy with blank entries dropped.
    pub fn normalize(&self) -> PrepPrefs {
        PrepPrefs {
            as_white_first_moves: clean(&self.as_white_first_moves),
            as_black_vs_e4: clean(&self.as_black_vs_e4),
            as_black_vs_d4: clean(&self.as_black_vs_d4),
            banned_branch_keywords: clean(&self.banned_branch_keywords),
            notes: self.notes.trim().to_string(),
            ..self.clone()
        }
    }

    /// Every problem at once, in a stable order.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let lists = [
            ("first move as White", &self.as_white_first_moves),
            ("response to e4", &self.as_black_vs_e4),
            ("response to d4", &self.as_black_vs_d4),
        ];
        for (label, moves) in lists {
            if moves.iter().all(|m| m.trim().is_empty()) {
                errors.push(format!("At least one {label} is required"));
            }
            for mv in moves.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
                if !is_san_shaped(mv) {
                    errors.push(format!("Not a move in SAN: {mv:?} ({label})"));
                }
            }
        }

        if self.max_targets_per_side < 1 {
            errors.push("Max targets per side must be at least 1".into());
        }
        if self.max_turning_points_per_side < 1 {
            errors.push("Max turning points per side must be at least 1".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Copy with both per-side caps clamped to hard ceilings.
    pub fn with_ceilings(&self, max_targets: usize, max_turning_points: usize) -> PrepPrefs {
        PrepPrefs {
            max_targets_per_side: self.max_targets_per_side.min(max_targets),
            max_turning_points_per_side: self.max_turning_points_per_side.min(max_turning_points),
            ..self.clone()
        }
    }

    pub fn banned_keywords_lowercase(&self) -> Vec<String> {
        self.banned_branch_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

fn clean(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

fn is_san_shaped(mv: &str) -> bool {
    static SAN_RE: OnceLock<Option<Regex>> = OnceLock::new();
    SAN_RE
        .get_or_init(|| Regex::new(r"^(?:[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?|O-O-O|O-O)[+#]?$").ok())
        .as_ref()
        .map_or(true, |re| re.is_match(mv))
}

/// Raw form values as a UI submits them. Lists are comma separated; blank
/// scalar fields fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefsForm {
    pub focus: String,
    pub risk: String,
    pub selection: String,
    pub as_white_first_moves: String,
    pub as_black_vs_e4: String,
    pub as_black_vs_d4: String,
    pub banned_branch_keywords: String,
    pub max_targets_per_side: String,
    pub max_turning_points_per_side: String,
    pub notes: String,
}

impl From<&PrepPrefs> for PrefsForm {
    fn from(prefs: &PrepPrefs) -> Self {
        Self {
            focus: prefs.focus.as_str().into(),
            risk: prefs.risk.as_str().into(),
            selection: prefs.selection.as_str().into(),
            as_white_first_moves: prefs.as_white_first_moves.join(", "),
            as_black_vs_e4: prefs.as_black_vs_e4.join(", "),
            as_black_vs_d4: prefs.as_black_vs_d4.join(", "),
            banned_branch_keywords: prefs.banned_branch_keywords.join(", "),
            max_targets_per_side: prefs.max_targets_per_side.to_string(),
            max_turning_points_per_side: prefs.max_turning_points_per_side.to_string(),
            notes: prefs.notes.clone(),
        }
    }
}

impl Default for PrefsForm {
    fn default() -> Self {
        PrefsForm::from(&PrepPrefs::default())
    }
}

impl PrefsForm {
    /// Parse, normalize and validate, reporting every error together.
    pub fn into_prefs(self) -> Result<PrepPrefs, Vec<String>> {
        let defaults = PrepPrefs::default();
        let mut errors = Vec::new();

        let focus = parse_or(&self.focus, defaults.focus, &mut errors);
        let risk = parse_or(&self.risk, defaults.risk, &mut errors);
        let selection = parse_or(&self.selection, defaults.selection, &mut errors);
        let max_targets_per_side = parse_count(
            "Max targets per side",
            &self.max_targets_per_side,
            defaults.max_targets_per_side,
            &mut errors,
        );
        let max_turning_points_per_side = parse_count(
            "Max turning points per side",
            &self.max_turning_points_per_side,
            defaults.max_turning_points_per_side,
            &mut errors,
        );

        let prefs = PrepPrefs {
            focus,
            risk,
            as_white_first_moves: split_list(&self.as_white_first_moves),
            as_black_vs_e4: split_list(&self.as_black_vs_e4),
            as_black_vs_d4: split_list(&self.as_black_vs_d4),
            banned_branch_keywords: split_list(&self.banned_branch_keywords),
            max_targets_per_side,
            max_turning_points_per_side,
            selection,
            notes: self.notes,
        }
        .normalize();

        if let Err(mut invalid) = prefs.validate() {
            errors.append(&mut invalid);
        }

        if errors.is_empty() {
            Ok(prefs)
        } else {
            Err(errors)
        }
    }
}

fn parse_or<T: FromStr<Err = String>>(raw: &str, default: T, errors: &mut Vec<String>) -> T {
    if raw.trim().is_empty() {
        return default;
    }
    raw.parse().unwrap_or_else(|e| {
        errors.push(e);
        default
    })
}

fn parse_count(label: &str, raw: &str, default: usize, errors: &mut Vec<String>) -> usize {
    let raw = raw.trim();
    if raw.is_empty() {
        return default;
    }
    raw.parse().unwrap_or_else(|_| {
        errors.push(format!("{label} must be a whole number: {raw:?}"));
        default
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).collect()
}
