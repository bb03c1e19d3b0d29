//! SQLite backing for the merge store.
//!
//! File databases run in WAL mode with `synchronous = NORMAL` and a busy
//! timeout, so the three ingest workers and a concurrent `chron status` can
//! share one file.

pub mod schema;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// How long a writer waits on a locked database before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the store file at `path` and make sure its schema is in
/// place. Missing parent directories are created.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, tuned or validated.
pub fn open_database(path: &Path) -> Result<Connection> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)
            .with_context(|| format!("create store directory {}", dir.display()))?,
        _ => {}
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("open store database {}", path.display()))?;

    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .context("enable WAL journal")?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(journal_mode = %mode, path = %path.display(), "store is not in WAL mode");
    }
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("set synchronous mode")?;
    conn.busy_timeout(BUSY_TIMEOUT).context("set busy timeout")?;

    schema::ensure_schema(&mut conn)
        .with_context(|| format!("prepare schema in {}", path.display()))?;
    Ok(conn)
}

/// Open a private in-memory database with the full schema.
///
/// # Errors
///
/// Returns an error if the schema cannot be created.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory store")?;
    schema::ensure_schema(&mut conn)?;
    Ok(conn)
}
