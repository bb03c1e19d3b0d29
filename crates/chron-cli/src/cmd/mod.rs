pub mod game;
pub mod ingest;
pub mod rebuild;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};
use chron_core::Store;
use chron_core::config::{IngestConfig, resolve_config};
use chron_core::error::ErrorCode;

/// Resolve configuration, tagging parse failures with their error code.
pub fn load_config(explicit: Option<&Path>) -> Result<IngestConfig> {
    resolve_config(explicit).inspect_err(|e| {
        tracing::error!(
            code = %ErrorCode::ConfigParseError,
            error = %format!("{e:#}"),
            "config rejected"
        );
    })
}

/// Open the configured store.
pub fn open_store(config: &IngestConfig) -> Result<Store> {
    Store::open(&config.store.path)
        .with_context(|| format!("open store at {}", config.store.path.display()))
}
