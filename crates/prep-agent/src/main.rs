//! Opponent prep CLI
//!
//! Reads PGN files (or directories of them), runs the prep pipeline with a
//! local Stockfish and prints the markdown report.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing::info;

use prep_agent::drills::build_drill_pack;
use prep_agent::stockfish::StockfishLauncher;
use prep_agent::{run_prep_graph, PrefsForm, PrepConfig, PrepError};

const USAGE: &str = "usage: opponent-prep [--opponent NAME] [--risk solid|practical|sharp] \
[--focus both|opp_as_white|opp_as_black] [--policy require_turning_points|branch_only] \
[--json OUT] [--drills OUT] <PGN file or directory>...";

struct CliArgs {
    inputs: Vec<PathBuf>,
    opponent: Option<String>,
    form: PrefsForm,
    json_out: Option<PathBuf>,
    drills_out: Option<PathBuf>,
}

/// Parse flags and positional inputs
fn parse_args(args: &[String]) -> anyhow::Result<CliArgs> {
    let mut cli = CliArgs {
        inputs: Vec::new(),
        opponent: None,
        form: PrefsForm::default(),
        json_out: None,
        drills_out: None,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .with_context(|| format!("{flag} needs a value"))
        };
        match arg.as_str() {
            "--opponent" => cli.opponent = Some(value("--opponent")?),
            "--risk" => cli.form.risk = value("--risk")?,
            "--focus" => cli.form.focus = value("--focus")?,
            "--policy" => cli.form.selection = value("--policy")?,
            "--json" => cli.json_out = Some(PathBuf::from(value("--json")?)),
            "--drills" => cli.drills_out = Some(PathBuf::from(value("--drills")?)),
            "-h" | "--help" => bail!("{USAGE}"),
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            path => cli.inputs.push(PathBuf::from(path)),
        }
    }

    if cli.inputs.is_empty() {
        bail!("no PGN input given\n{USAGE}");
    }
    Ok(cli)
}

/// Expand directories to the `.pgn` files below them
fn collect_pgn_files(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let pattern = format!("{}/**/*.pgn", input.display());
            let mut found: Vec<PathBuf> = glob::glob(&pattern)
                .with_context(|| format!("bad directory pattern {pattern}"))?
                .filter_map(Result::ok)
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn write_output(path: &Path, contents: &str) -> anyhow::Result<()> {
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "Wrote output");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;

    let config = PrepConfig::load()?;
    let prefs = cli.form.into_prefs().map_err(PrepError::InvalidPrefs)?;

    let files = collect_pgn_files(&cli.inputs)?;
    if files.is_empty() {
        bail!("no PGN files found");
    }
    let sources = files
        .iter()
        .map(|path| fs::read_to_string(path).with_context(|| format!("reading {}", path.display())))
        .collect::<anyhow::Result<Vec<String>>>()?;
    info!(files = sources.len(), "Loaded PGN sources");

    let run = run_prep_graph(
        &sources,
        cli.opponent.as_deref(),
        &config,
        &prefs,
        &StockfishLauncher,
        false,
        |event| eprintln!("[{}] {}", event.stage.as_str(), event.message),
    )
    .await?;

    println!("{}", run.report.markdown_report);

    if let Some(path) = &cli.json_out {
        write_output(path, &run.report.to_json()?)?;
    }
    if let Some(path) = &cli.drills_out {
        let pack = build_drill_pack(&run.planned);
        info!(drills = pack.items.len(), "Built drill pack");
        write_output(path, &serde_json::to_string_pretty(&pack)?)?;
    }

    Ok(())
}
