//! Prep report assembly and markdown rendering

use chess_core::{Bucket, OpeningProfile, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blunders::BlunderEvent;
use crate::error::PrepError;
use crate::select::Target;

/// Rows in the mistake table.
const MISTAKE_TABLE_ROWS: usize = 15;

/// Turning points listed per target section.
const TURNING_POINTS_LISTED: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Analyzed,
    /// No game survived import; nothing was analysed.
    EmptyBatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepReport {
    pub created_at: DateTime<Utc>,
    pub status: ReportStatus,
    pub opponent_name: Option<String>,
    pub games_ingested: usize,
    pub games_skipped: usize,
    pub opening_profile: OpeningProfile,
    /// Worst loss first
    pub blunders: Vec<BlunderEvent>,
    pub targets: Vec<Target>,
    pub markdown_report: String,
}

impl PrepReport {
    pub fn display_name(&self) -> &str {
        self.opponent_name
            .as_deref()
            .or(self.opening_profile.opponent_name.as_deref())
            .unwrap_or("Opponent")
    }

    pub fn to_json(&self) -> Result<String, PrepError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Build the report and render its markdown. A report without ingested games
/// is marked [`ReportStatus::EmptyBatch`].
pub fn assemble_report(
    opponent_name: Option<String>,
    games_ingested: usize,
    games_skipped: usize,
    opening_profile: OpeningProfile,
    blunders: Vec<BlunderEvent>,
    targets: Vec<Target>,
) -> PrepReport {
    let status = if games_ingested == 0 {
        ReportStatus::EmptyBatch
    } else {
        ReportStatus::Analyzed
    };

    let mut report = PrepReport {
        created_at: Utc::now(),
        status,
        opponent_name,
        games_ingested,
        games_skipped,
        opening_profile,
        blunders,
        targets,
        markdown_report: String::new(),
    };
    report.markdown_report = render_markdown(&report);
    report
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::White => "Opponent as White",
        Side::Black => "Opponent as Black",
    }
}

fn pawns(drop_cp: i32) -> f64 {
    f64::from(drop_cp) / 100.0
}

pub fn render_markdown(report: &PrepReport) -> String {
    let mut lines = vec![
        format!("# Prep Report: {}", report.display_name()),
        String::new(),
        format!("**Games ingested:** {}", report.games_ingested),
        format!("- Games skipped: {}", report.games_skipped),
        format!(
            "- Opening plies profiled: **{}**",
            report.opening_profile.opening_plies
        ),
        String::new(),
    ];

    if report.status == ReportStatus::EmptyBatch {
        lines.push("_No games were imported, so there is nothing to analyse._".into());
        lines.push(String::new());
        return lines.join("\n");
    }

    for bucket in Bucket::ALL {
        lines.push(format!("## {}: top branches", bucket.title()));
        lines.push(String::new());
        let branches = report.opening_profile.bucket(bucket);
        if branches.is_empty() {
            lines.push("_No data._".into());
            lines.push(String::new());
            continue;
        }
        lines.push("| Branch | Games | Score |".into());
        lines.push("|---|---:|---:|".into());
        for b in branches {
            lines.push(format!("| `{}` | {} | {:.2} |", b.move_text(), b.games, b.score));
        }
        lines.push(String::new());
    }

    lines.push(format!("## Biggest mistakes (top {MISTAKE_TABLE_ROWS})"));
    lines.push(String::new());
    if report.blunders.is_empty() {
        lines.push("_No mistakes found._".into());
    } else {
        lines.push("| Side | Opening key | Ply | Move | Drop (pawns) |".into());
        lines.push("|---|---|---:|---|---:|".into());
        for b in report.blunders.iter().take(MISTAKE_TABLE_ROWS) {
            lines.push(format!(
                "| {} | `{}` | {} | `{}` | {:.1} |",
                b.opponent_side,
                b.opening_key,
                b.ply,
                b.played_move_san,
                pawns(b.drop_cp)
            ));
        }
    }
    lines.push(String::new());

    for target in &report.targets {
        lines.push(format!("## Target: {}", side_label(target.opponent_side)));
        lines.push(String::new());
        lines.push(target.headline.clone());
        lines.push(String::new());
        if !target.turning_points.is_empty() {
            lines.push("**Turning points to drill:**".into());
            for (i, tp) in target
                .turning_points
                .iter()
                .take(TURNING_POINTS_LISTED)
                .enumerate()
            {
                let punish = tp
                    .punish_move_uci
                    .as_deref()
                    .map(|m| format!(", punish with `{m}`"))
                    .unwrap_or_default();
                lines.push(format!(
                    "{}. {}: opponent played `{}` ({}){}",
                    i + 1,
                    tp.title,
                    tp.mistake_move_san,
                    tp.severity.as_str(),
                    punish
                ));
            }
            lines.push(String::new());
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Severity;
    use chess_core::OpeningBranchStat;

    fn profile() -> OpeningProfile {
        OpeningProfile {
            opening_plies: 8,
            opponent_name: Some("Scout".into()),
            as_white_top: vec![OpeningBranchStat {
                side: Side::White,
                moves_san: vec!["e4".into(), "e5".into()],
                games: 2,
                score: 0.75,
            }],
            ..OpeningProfile::default()
        }
    }

    fn blunder(ply: u32) -> BlunderEvent {
        BlunderEvent {
            game_id: "abc".into(),
            ply,
            opponent_side: Side::White,
            fen_before: String::new(),
            pos_key: format!("k{ply}"),
            opening_key: "e4 e5".into(),
            played_move_uci: "f2f3".into(),
            played_move_san: "f3".into(),
            drop_cp: 250,
            severity: Severity::Blunder,
            refutation_pv_uci: Vec::new(),
            punish_move_uci: None,
        }
    }

    #[test]
    fn test_markdown_sections() {
        let blunders: Vec<BlunderEvent> = (1..=20).map(blunder).collect();
        let report = assemble_report(None, 2, 1, profile(), blunders, Vec::new());
        let md = &report.markdown_report;

        assert_eq!(report.status, ReportStatus::Analyzed);
        assert!(md.starts_with("# Prep Report: Scout"));
        assert!(md.contains("- Games skipped: 1"));
        assert!(md.contains("| `e4 e5` | 2 | 0.75 |"));
        assert!(md.contains("## Opponent as Black vs 1.e4: top branches"));
        assert_eq!(md.matches("| white | `e4 e5` |").count(), MISTAKE_TABLE_ROWS);
        assert!(md.contains("| 2.5 |"));
    }

    #[test]
    fn test_empty_batch_report() {
        let report = assemble_report(Some("Nobody".into()), 0, 3, OpeningProfile::default(), Vec::new(), Vec::new());
        assert_eq!(report.status, ReportStatus::EmptyBatch);
        assert!(report.markdown_report.contains("No games were imported"));
        assert!(!report.markdown_report.contains("Biggest mistakes"));

        let json = report.to_json().unwrap();
        assert!(json.contains("\"status\": \"empty_batch\""));
        let back: PrepReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
