use std::sync::Arc;

use anyhow::{Context, Result};
use chron_core::config::IngestConfig;
use chron_ingest::{run_workers, shutdown};
use tracing::info;

use super::open_store;

/// Run all workers until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the runtime fails to
/// start.
pub fn run_ingest(config: &IngestConfig) -> Result<()> {
    let store = Arc::new(open_store(config)?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;

    runtime.block_on(async {
        let (trigger, stop) = shutdown::channel();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
            }
            trigger.trigger();
        });
        run_workers(config, store, stop).await
    })
}
