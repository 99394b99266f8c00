//! Engine-backed mistake detection over the opponent's own moves

use std::collections::HashMap;
use std::time::Instant;

use chess_core::{ImportBatch, PlyRecord, Side};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::{classify_loss, evaluation_loss, Severity, Thresholds};
use crate::config::PrepConfig;
use crate::error::EngineError;
use crate::stockfish::{EngineLauncher, EngineOptions, Evaluator};

/// Longest refutation line kept on an event.
pub const MAX_REFUTATION_MOVES: usize = 10;

/// One opponent move that lost at least the mistake threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlunderEvent {
    pub game_id: String,
    pub ply: u32,
    pub opponent_side: Side,
    pub fen_before: String,
    pub pos_key: String,
    pub opening_key: String,
    pub played_move_uci: String,
    pub played_move_san: String,
    /// Evaluation loss in centipawn equivalents
    pub drop_cp: i32,
    pub severity: Severity,
    pub refutation_pv_uci: Vec<String>,
    pub punish_move_uci: Option<String>,
}

/// Run detection over every opponent ply of the batch.
///
/// Plies are split by game across `engine_pool_size` engines, each owned by a
/// single future. Every launched engine is shut down before returning, on
/// success and on a fatal error alike.
pub async fn detect_mistakes<L: EngineLauncher>(
    batch: &ImportBatch,
    config: &PrepConfig,
    launcher: &L,
) -> Result<Vec<BlunderEvent>, EngineError> {
    if config.has_unapplied_filters() {
        warn!(
            only_time_controls = ?config.only_time_controls,
            since_date = ?config.since_date,
            "Time-control and date filters are not applied"
        );
    }

    let partitions = partition_opponent_plies(batch, config.engine_pool_size);
    let ply_count: usize = partitions.iter().map(Vec::len).sum();
    if ply_count == 0 {
        info!("No opponent plies to analyse");
        return Ok(Vec::new());
    }

    let options = EngineOptions::from_config(config);
    let thresholds = Thresholds {
        mistake_cp: config.mistake_drop_cp,
        blunder_cp: config.blunder_drop_cp,
    };

    let mut engines = Vec::with_capacity(partitions.len());
    for engine_id in 0..partitions.len() {
        match launcher.launch(&options).await {
            Ok(engine) => {
                debug!(engine_id, "Engine launched");
                engines.push(engine);
            }
            Err(e) => {
                shutdown_all(&mut engines).await;
                return Err(e);
            }
        }
    }

    info!(engines = engines.len(), plies = ply_count, "Detecting opponent mistakes");
    let start = Instant::now();

    let outcome = try_join_all(
        engines
            .iter_mut()
            .zip(&partitions)
            .map(|(engine, plies)| detect_with(engine, plies, thresholds)),
    )
    .await;

    shutdown_all(&mut engines).await;

    let mut events: Vec<BlunderEvent> = outcome?.into_iter().flatten().collect();
    sort_events(&mut events);

    info!(
        events = events.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Mistake detection finished"
    );
    Ok(events)
}

/// Analyse plies with one engine. Non-fatal failures skip the ply.
pub async fn detect_with<E: Evaluator>(
    engine: &mut E,
    plies: &[(Side, &PlyRecord)],
    thresholds: Thresholds,
) -> Result<Vec<BlunderEvent>, EngineError> {
    let mut events = Vec::new();
    for (side, ply) in plies {
        match examine_ply(engine, *side, ply, thresholds).await {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) if !e.is_fatal() => {
                warn!(game_id = %ply.game_id, ply = ply.ply, error = %e, "Skipping ply");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(events)
}

async fn examine_ply<E: Evaluator>(
    engine: &mut E,
    opponent_side: Side,
    ply: &PlyRecord,
    thresholds: Thresholds,
) -> Result<Option<BlunderEvent>, EngineError> {
    let before = engine.analyse(&ply.fen_before).await?;
    let after = engine.analyse(&ply.fen_after).await?;

    let loss = evaluation_loss(before.score, after.score);
    let Some(severity) = classify_loss(loss, thresholds) else {
        return Ok(None);
    };

    let mut refutation = match engine.analyse(&ply.fen_after).await {
        Ok(evaluation) => evaluation.pv,
        Err(e) if !e.is_fatal() => {
            warn!(game_id = %ply.game_id, ply = ply.ply, error = %e, "Refutation search failed");
            after.pv
        }
        Err(e) => return Err(e),
    };
    refutation.truncate(MAX_REFUTATION_MOVES);

    debug!(
        game_id = %ply.game_id,
        ply = ply.ply,
        san = %ply.move_san,
        loss,
        severity = severity.as_str(),
        "Opponent mistake"
    );

    Ok(Some(BlunderEvent {
        game_id: ply.game_id.clone(),
        ply: ply.ply,
        opponent_side,
        fen_before: ply.fen_before.clone(),
        pos_key: ply.pos_key.clone(),
        opening_key: ply.opening_key.clone(),
        played_move_uci: ply.move_uci.clone(),
        played_move_san: ply.move_san.clone(),
        drop_cp: loss,
        severity,
        punish_move_uci: refutation.first().cloned(),
        refutation_pv_uci: refutation,
    }))
}

/// Opponent plies grouped by game, games dealt round-robin to at most
/// `pool_size` partitions. Empty partitions are dropped.
fn partition_opponent_plies(batch: &ImportBatch, pool_size: usize) -> Vec<Vec<(Side, &PlyRecord)>> {
    let sides: HashMap<&str, Side> = batch
        .games
        .iter()
        .filter_map(|g| g.opponent_side.map(|side| (g.game_id.as_str(), side)))
        .collect();

    let mut by_game: Vec<Vec<(Side, &PlyRecord)>> = Vec::new();
    let mut slot: HashMap<&str, usize> = HashMap::new();
    for ply in &batch.plies {
        let Some(&side) = sides.get(ply.game_id.as_str()) else {
            continue;
        };
        if ply.side_who_moved != side {
            continue;
        }
        let idx = *slot.entry(ply.game_id.as_str()).or_insert_with(|| {
            by_game.push(Vec::new());
            by_game.len() - 1
        });
        by_game[idx].push((side, ply));
    }

    let pool = pool_size.max(1);
    let mut partitions: Vec<Vec<(Side, &PlyRecord)>> = vec![Vec::new(); pool];
    for (i, plies) in by_game.into_iter().enumerate() {
        partitions[i % pool].extend(plies);
    }
    partitions.retain(|p| !p.is_empty());
    partitions
}

async fn shutdown_all<E: Evaluator>(engines: &mut [E]) {
    for engine in engines.iter_mut() {
        engine.shutdown().await;
    }
}

/// Loss descending, then game id and ply for a stable order.
pub fn sort_events(events: &mut [BlunderEvent]) {
    events.sort_by(|a, b| {
        b.drop_cp
            .cmp(&a.drop_cp)
            .then_with(|| a.game_id.cmp(&b.game_id))
            .then(a.ply.cmp(&b.ply))
    });
}
