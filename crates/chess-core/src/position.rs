//! Canonical position identities.

use shakmaty::{fen::Fen, san::San, uci::UciMove, CastlingMode, Chess, EnPassantMode, Position};

/// Full FEN of a position, en passant square only when a capture is legal.
pub fn fen_string(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// Position key: placement, side to move, castling and en passant, without
/// the move clocks. Transpositions reached with different clocks compare
/// equal.
pub fn position_key(pos: &Chess) -> String {
    position_key_from_fen(&fen_string(pos))
}

/// Position key of a FEN string.
pub fn position_key_from_fen(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

/// Check or mate marker for the side that just moved into `pos`.
pub fn check_suffix(pos: &Chess) -> &'static str {
    if pos.is_checkmate() {
        "#"
    } else if pos.is_check() {
        "+"
    } else {
        ""
    }
}

fn parse_fen(fen: &str) -> Option<Chess> {
    fen.parse::<Fen>()
        .ok()?
        .into_position(CastlingMode::Standard)
        .ok()
}

/// FEN after playing one UCI move, `None` if the FEN or the move is invalid.
pub fn fen_after_uci(fen: &str, uci: &str) -> Option<String> {
    let pos = parse_fen(fen)?;
    let uci_move: UciMove = uci.parse().ok()?;
    let mv = uci_move.to_move(&pos).ok()?;
    let after = pos.play(mv).ok()?;
    Some(fen_string(&after))
}

/// SAN of a UCI line played from `fen`. Stops at the first move that does
/// not apply.
pub fn uci_line_to_san<S: AsRef<str>>(fen: &str, line: &[S]) -> Vec<String> {
    let Some(mut pos) = parse_fen(fen) else {
        return Vec::new();
    };

    let mut moves = Vec::with_capacity(line.len());
    for uci_str in line {
        let Ok(uci_move) = uci_str.as_ref().parse::<UciMove>() else {
            break;
        };
        let Ok(mv) = uci_move.to_move(&pos) else {
            break;
        };
        let san = San::from_move(&pos, mv.clone()).to_string();
        pos.play_unchecked(mv);
        moves.push(format!("{san}{}", check_suffix(&pos)));
    }
    moves
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_drops_clocks() {
        let a = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        let b = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 12 40";
        assert_eq!(position_key_from_fen(a), position_key_from_fen(b));
        assert_eq!(
            position_key_from_fen(a),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq -"
        );
    }

    #[test]
    fn test_start_position_key() {
        assert_eq!(
            position_key(&Chess::default()),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -"
        );
    }

    #[test]
    fn test_key_keeps_castling_rights() {
        let with = "r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1";
        let without = "r3k2r/8/8/8/8/8/8/R3K2R w - - 0 1";
        assert_ne!(position_key_from_fen(with), position_key_from_fen(without));
    }

    #[test]
    fn test_fen_after_uci() {
        let start = fen_string(&Chess::default());
        let after = fen_after_uci(&start, "e2e4").unwrap();
        assert_eq!(
            position_key_from_fen(&after),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq -"
        );
        assert_eq!(fen_after_uci(&start, "e2e5"), None);
        assert_eq!(fen_after_uci("not a fen", "e2e4"), None);
    }

    #[test]
    fn test_uci_line_to_san() {
        let start = fen_string(&Chess::default());
        let line = ["e2e4", "e7e5", "d1h5", "b8c6", "f1c4", "g8f6", "h5f7"];
        assert_eq!(
            uci_line_to_san(&start, &line),
            vec!["e4", "e5", "Qh5", "Nc6", "Bc4", "Nf6", "Qxf7#"]
        );
        // stops at the first bad move
        assert_eq!(uci_line_to_san(&start, &["e2e4", "e2e4", "e7e5"]), vec!["e4"]);
    }
}
