//! Spawns the three workers against one store and waits for them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{error, info};

use chron_core::config::IngestConfig;
use chron_core::error::ErrorCode;
use chron_core::Store;

use crate::ingestor::Ingestor;
use crate::poll::{run_minute_poller, run_roster_poller};
use crate::roster::RosterState;
use crate::shutdown::Shutdown;
use crate::source::HttpSource;
use crate::stream::{StreamOptions, run_stream};

/// Run the stream worker and both pollers until `shutdown` fires.
///
/// A worker that panics is logged; the others keep running.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
pub async fn run_workers(
    config: &IngestConfig,
    store: Arc<Store>,
    shutdown: Shutdown,
) -> Result<()> {
    let timeout = Duration::from_secs(config.poll.request_timeout_secs.max(1));
    let source = Arc::new(HttpSource::new(timeout).context("build HTTP client")?);
    let ingestor = Ingestor::new(store, RosterState::new());

    let stream = StreamOptions {
        url: config.feeds.stream_url.clone(),
        reconnect_delay: Duration::from_millis(config.stream.reconnect_delay_ms),
        connect_timeout: timeout,
        idle_timeout: Duration::from_millis(config.stream.idle_timeout_ms.max(1)),
        max_line_bytes: config.stream.max_line_bytes,
    };

    let mut workers = JoinSet::new();
    workers.spawn(run_stream(stream, ingestor.clone(), shutdown.clone()));
    workers.spawn(run_minute_poller(
        Arc::clone(&source),
        config.feeds.clone(),
        ingestor.clone(),
        shutdown.clone(),
    ));
    workers.spawn(run_roster_poller(
        source,
        config.feeds.clone(),
        config.poll.clone(),
        ingestor,
        shutdown,
    ));
    info!(workers = workers.len(), "ingestion started");

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(code = %ErrorCode::InternalUnexpected, error = %e, "worker task failed");
        }
    }
    info!("ingestion stopped");
    Ok(())
}
