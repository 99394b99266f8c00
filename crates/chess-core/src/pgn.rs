//! PGN import: game headers plus one record per main-line ply.

use std::collections::HashSet;
use std::ops::ControlFlow;

use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use shakmaty::{CastlingMode, Chess, Position};
use thiserror::Error;
use tracing::{info, warn};

use crate::game_data::{Game, GameResult, PlyRecord, Side};
use crate::position::{check_suffix, fen_string, position_key_from_fen};

const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Length of the hex digest used as game id.
const GAME_ID_LEN: usize = 12;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Opening depth in half-moves; bounds every ply's opening key.
    pub opening_plies: usize,
    /// Stop importing once this many games were accepted.
    pub max_games: Option<usize>,
    /// Stop walking a game after this many plies.
    pub max_plies_per_game: Option<usize>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            opening_plies: 8,
            max_games: None,
            max_plies_per_game: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Failed to read PGN source #{index}: {source}")]
    Read {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Why a game contributed nothing to the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameSkip {
    #[error("non-standard starting position")]
    NonStandardStart,

    #[error("illegal move {san} at ply {ply}")]
    IllegalMove { ply: u32, san: String },

    #[error("no moves in main line")]
    NoMoves,
}

/// Everything imported from one call.
#[derive(Debug, Clone, Default)]
pub struct ImportBatch {
    pub games: Vec<Game>,
    pub plies: Vec<PlyRecord>,
    /// Games dropped by the skip policy.
    pub skipped: usize,
}

impl ImportBatch {
    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn plies_for<'a>(&'a self, game_id: &'a str) -> impl Iterator<Item = &'a PlyRecord> + 'a {
        self.plies.iter().filter(move |p| p.game_id == game_id)
    }

    /// Header spelling of the scouted player's name, from the first game
    /// where it was resolved.
    pub fn opponent_name(&self) -> Option<&str> {
        self.games.iter().find_map(|g| g.opponent_name.as_deref())
    }
}

/// Import every game of every source.
///
/// Sources are parsed in parallel and merged in source order, so the batch
/// equals what a sequential walk would produce. Malformed games are skipped
/// and counted; they never abort the batch.
pub fn import_pgns<S>(
    sources: &[S],
    opponent_hint: Option<&str>,
    options: &ImportOptions,
) -> Result<ImportBatch, ImportError>
where
    S: AsRef<str> + Sync,
{
    let parsed: Vec<Vec<Result<ParsedGame, GameSkip>>> = sources
        .par_iter()
        .enumerate()
        .map(|(index, text)| parse_source(index, text.as_ref(), options))
        .collect::<Result<_, _>>()?;

    let hint = opponent_hint
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_lowercase);

    let mut batch = ImportBatch::default();
    let mut issued_ids: HashSet<String> = HashSet::new();

    'sources: for (source_index, games) in parsed.into_iter().enumerate() {
        for (game_index, outcome) in games.into_iter().enumerate() {
            if options.max_games.is_some_and(|max| batch.games.len() >= max) {
                break 'sources;
            }

            let parsed = match outcome {
                Ok(parsed) => parsed,
                Err(skip) => {
                    warn!(source_index, game_index, reason = %skip, "Skipping game");
                    batch.skipped += 1;
                    continue;
                }
            };

            let game_id = assign_game_id(&parsed.headers, source_index, game_index, &mut issued_ids);
            let (game, plies) = parsed.finish(game_id, hint.as_deref(), options.opening_plies);
            batch.games.push(game);
            batch.plies.extend(plies);
        }
    }

    info!(
        games = batch.games.len(),
        plies = batch.plies.len(),
        skipped = batch.skipped,
        "PGN import complete"
    );

    Ok(batch)
}

fn parse_source(
    index: usize,
    text: &str,
    options: &ImportOptions,
) -> Result<Vec<Result<ParsedGame, GameSkip>>, ImportError> {
    let mut reader = Reader::new(text.as_bytes());
    let mut visitor = MainLineVisitor {
        max_plies: options.max_plies_per_game,
    };
    let mut out = Vec::new();
    let mut accepted = 0usize;

    while let Some(outcome) = reader
        .read_game(&mut visitor)
        .map_err(|source| ImportError::Read { index, source })?
    {
        if outcome.is_ok() {
            accepted += 1;
        }
        out.push(outcome);
        // No need to parse past what the merge could ever accept.
        if options.max_games.is_some_and(|max| accepted >= max) {
            break;
        }
    }

    Ok(out)
}

/// Derive a short id from `Link`, then `Site`; fall back to the synthetic
/// per-source identifier when neither is usable or the id was already issued.
fn assign_game_id(
    headers: &Headers,
    source_index: usize,
    game_index: usize,
    issued: &mut HashSet<String>,
) -> String {
    let derived = [&headers.link, &headers.site]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty() && *s != "?")
        .map(short_digest);

    let id = match derived {
        Some(id) if !issued.contains(&id) => id,
        _ => short_digest(&format!("game_{source_index}_{game_index}")),
    };
    issued.insert(id.clone());
    id
}

fn short_digest(value: &str) -> String {
    let mut hex = format!("{:x}", Sha256::digest(value.as_bytes()));
    hex.truncate(GAME_ID_LEN);
    hex
}

/// Case-insensitive substring match of the hint against White, then Black.
fn resolve_opponent(
    white: Option<&str>,
    black: Option<&str>,
    hint_lc: Option<&str>,
) -> (Option<String>, Option<Side>) {
    let Some(hint) = hint_lc else {
        return (None, None);
    };
    let matches = |name: Option<&str>| name.is_some_and(|n| n.to_lowercase().contains(hint));

    if matches(white) {
        (white.map(String::from), Some(Side::White))
    } else if matches(black) {
        (black.map(String::from), Some(Side::Black))
    } else {
        (None, None)
    }
}

#[derive(Debug, Clone, Default)]
struct Headers {
    event: Option<String>,
    site: Option<String>,
    link: Option<String>,
    date: Option<String>,
    white: Option<String>,
    black: Option<String>,
    result: Option<String>,
    time_control: Option<String>,
    white_elo: Option<u16>,
    black_elo: Option<u16>,
    fen: Option<String>,
}

#[derive(Debug, Clone)]
struct MoveRecord {
    side: Side,
    fen_before: String,
    fen_after: String,
    uci: String,
    san: String,
}

#[derive(Debug, Clone)]
struct ParsedGame {
    headers: Headers,
    moves: Vec<MoveRecord>,
}

impl ParsedGame {
    fn finish(self, game_id: String, hint_lc: Option<&str>, opening_plies: usize) -> (Game, Vec<PlyRecord>) {
        let h = self.headers;
        let (opponent_name, opponent_side) =
            resolve_opponent(h.white.as_deref(), h.black.as_deref(), hint_lc);

        let mut plies = Vec::with_capacity(self.moves.len());
        let mut opening: Vec<&str> = Vec::with_capacity(opening_plies);
        for (i, mv) in self.moves.iter().enumerate() {
            plies.push(PlyRecord {
                game_id: game_id.clone(),
                ply: (i + 1) as u32,
                side_who_moved: mv.side,
                fen_before: mv.fen_before.clone(),
                fen_after: mv.fen_after.clone(),
                move_uci: mv.uci.clone(),
                move_san: mv.san.clone(),
                pos_key: position_key_from_fen(&mv.fen_before),
                opening_key: opening.join(" "),
            });
            if opening.len() < opening_plies {
                opening.push(&mv.san);
            }
        }

        let game = Game {
            game_id,
            event: h.event,
            site: h.site,
            date: h.date,
            white: h.white,
            black: h.black,
            result: h.result.as_deref().map_or(GameResult::Unknown, GameResult::from_tag),
            time_control: h.time_control,
            white_elo: h.white_elo,
            black_elo: h.black_elo,
            opponent_name,
            opponent_side,
        };
        (game, plies)
    }
}

/// State while walking the movetext.
struct MainLine {
    headers: Headers,
    pos: Chess,
    moves: Vec<MoveRecord>,
}

/// Visitor that keeps the main line only.
struct MainLineVisitor {
    max_plies: Option<usize>,
}

impl Visitor for MainLineVisitor {
    type Tags = Headers;
    type Movetext = MainLine;
    type Output = Result<ParsedGame, GameSkip>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Headers> {
        ControlFlow::Continue(Headers::default())
    }

    fn tag(&mut self, tags: &mut Headers, name: &[u8], value: RawTag<'_>) -> ControlFlow<Self::Output> {
        let text = || value.decode_utf8_lossy().trim().to_string();
        match name {
            b"Event" => tags.event = Some(text()),
            b"Site" => tags.site = Some(text()),
            b"Link" => tags.link = Some(text()),
            b"Date" => tags.date = Some(text()),
            b"White" => tags.white = Some(text()),
            b"Black" => tags.black = Some(text()),
            b"Result" => tags.result = Some(text()),
            b"TimeControl" => tags.time_control = Some(text()),
            b"WhiteElo" => tags.white_elo = text().parse().ok(),
            b"BlackElo" => tags.black_elo = text().parse().ok(),
            b"FEN" => tags.fen = Some(text()),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Headers) -> ControlFlow<Self::Output, MainLine> {
        if let Some(fen) = &tags.fen {
            if position_key_from_fen(fen) != position_key_from_fen(STANDARD_START_FEN) {
                return ControlFlow::Break(Err(GameSkip::NonStandardStart));
            }
        }

        ControlFlow::Continue(MainLine {
            headers: tags,
            pos: Chess::default(),
            moves: Vec::new(),
        })
    }

    fn begin_variation(&mut self, _movetext: &mut MainLine) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn san(&mut self, line: &mut MainLine, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        if self.max_plies.is_some_and(|max| line.moves.len() >= max) {
            return ControlFlow::Continue(());
        }

        let ply = (line.moves.len() + 1) as u32;
        let illegal = || {
            ControlFlow::Break(Err(GameSkip::IllegalMove {
                ply,
                san: san_plus.to_string(),
            }))
        };

        let mv = match san_plus.san.to_move(&line.pos) {
            Ok(mv) => mv,
            Err(_) => return illegal(),
        };

        let side = Side::from(line.pos.turn());
        let fen_before = fen_string(&line.pos);
        let uci = mv.to_uci(CastlingMode::Standard).to_string();

        let after = match line.pos.clone().play(mv) {
            Ok(after) => after,
            Err(_) => return illegal(),
        };

        line.moves.push(MoveRecord {
            side,
            fen_before,
            fen_after: fen_string(&after),
            uci,
            san: format!("{}{}", san_plus.san, check_suffix(&after)),
        });
        line.pos = after;

        ControlFlow::Continue(())
    }

    fn end_game(&mut self, line: MainLine) -> Self::Output {
        if line.moves.is_empty() {
            return Err(GameSkip::NoMoves);
        }
        Ok(ParsedGame {
            headers: line.headers,
            moves: line.moves,
        })
    }
}
