pub use pgn_reader;
pub use shakmaty;

pub mod game_data;
pub mod openings;
pub mod pgn;
pub mod position;

pub use game_data::{opening_key_extends, Game, GameResult, PlyRecord, Side};
pub use openings::{build_opening_profile, Bucket, OpeningBranchStat, OpeningProfile};
pub use pgn::{import_pgns, GameSkip, ImportBatch, ImportError, ImportOptions};
pub use position::{fen_after_uci, position_key, position_key_from_fen, uci_line_to_san};
