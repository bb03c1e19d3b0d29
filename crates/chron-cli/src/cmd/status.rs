use anyhow::Result;
use chron_core::config::IngestConfig;
use serde_json::{Map, Value, json};

use super::open_store;

/// Run `chron status`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or queried.
pub fn run_status(config: &IngestConfig, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let status = store.status()?;

    if json {
        let updates: Map<String, Value> = status
            .updates
            .iter()
            .map(|(kind, count)| (kind.to_string(), json!(count)))
            .collect();
        let out = json!({
            "store": config.store.path.display().to_string(),
            "updates": updates,
            "games": status.games,
            "idol_hours": status.idol_hours,
            "last_rebuild_at": status.last_rebuild_at,
        });
        println!("{out}");
        return Ok(());
    }

    println!("store: {}", config.store.path.display());
    for (kind, count) in &status.updates {
        println!("{:<14} {count}", format!("{kind}:"));
    }
    println!("{:<14} {}", "games:", status.games);
    println!("{:<14} {}", "idol hours:", status.idol_hours);
    match status.last_rebuild_at {
        Some(ts) => println!("{:<14} {ts}", "last rebuild:"),
        None => println!("{:<14} never", "last rebuild:"),
    }
    Ok(())
}
