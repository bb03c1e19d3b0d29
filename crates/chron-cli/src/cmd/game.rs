use anyhow::{Result, bail};
use chron_core::config::IngestConfig;
use chron_core::projection::get_game;
use clap::Args;

use super::open_store;

#[derive(Args, Debug)]
pub struct GameArgs {
    /// Game identifier.
    pub id: String,
}

/// Print one game aggregate as JSON.
///
/// # Errors
///
/// Returns an error if the game has no aggregate or the store fails.
pub fn run_game(args: &GameArgs, config: &IngestConfig) -> Result<()> {
    let store = open_store(config)?;
    let Some(game) = get_game(&store, &args.id)? else {
        bail!("no aggregate for game {}", args.id);
    };
    println!("{}", serde_json::to_string_pretty(&game)?);
    Ok(())
}
