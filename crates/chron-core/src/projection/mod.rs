//! Aggregates derived from the update log.
//!
//! Neither aggregate is authored directly; both are folded from merged
//! updates and can be rebuilt from the log at any time.

pub mod game;
pub mod idols;

pub use game::{GameAggregate, RebuildReport, fold_game, get_game, rebuild_games, refresh_games};
pub use idols::{HourlyIdols, IdolEntry, get_hour, idol_players, record_hour};
