use anyhow::Result;
use chron_core::config::IngestConfig;
use chron_core::projection::rebuild_games;

use super::open_store;

/// Run `chron rebuild`: drop and refold every game aggregate.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the rebuild fails.
pub fn run_rebuild(config: &IngestConfig, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let report = rebuild_games(&store)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "update_count": report.update_count,
                "game_count": report.game_count,
                "elapsed_ms": report.elapsed.as_millis(),
            })
        );
    } else {
        println!(
            "rebuild: updates={} games={} elapsed_ms={}",
            report.update_count,
            report.game_count,
            report.elapsed.as_millis()
        );
    }
    Ok(())
}
