//! The merge store: one generic merge-by-identity operation for every
//! entity kind.
//!
//! # Merge algebra
//!
//! `merge(kind, hash, payload, t)`:
//! - no record for `(kind, hash)`: insert `{payload, first_seen: t, last_seen: t}`
//! - record exists: payload untouched, `first_seen = min(first_seen, t)`,
//!   `last_seen = max(last_seen, t)`
//!
//! Insert-if-absent, min and max are each idempotent, commutative and
//! associative, so any interleaving of duplicate or replayed observations
//! from any number of workers lands on the same row. No dedup happens
//! before the write.
//!
//! The [`Store`] is `Send + Sync` and meant to be shared as `Arc<Store>`.
//! Calls block on SQLite; async callers move them onto the blocking pool.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::Serialize;

use crate::db;
use crate::hash::canonical_json;
use crate::model::{EntityKind, StoredUpdate, Update};

// ---------------------------------------------------------------------------
// Time conversion
// ---------------------------------------------------------------------------

/// Microseconds since the Unix epoch, as stored in SQLite.
#[must_use]
pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Inverse of [`to_micros`].
///
/// # Errors
///
/// Returns an error if `us` is outside chrono's representable range.
pub fn from_micros(us: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us).ok_or_else(|| anyhow!("timestamp {us}us out of range"))
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What a single merge did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First observation of this identity.
    Inserted,
    /// Identity already stored; its seen-window was widened (possibly by
    /// nothing, for an exact replay).
    Merged,
}

/// Counters for a batch of merges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub inserted: usize,
    pub merged: usize,
}

impl MergeStats {
    #[must_use]
    pub const fn total(self) -> usize {
        self.inserted + self.merged
    }

    fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Merged => self.merged += 1,
        }
    }
}

/// Record counts for `chron status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub updates: Vec<(EntityKind, usize)>,
    pub games: usize,
    pub idol_hours: usize,
    pub last_rebuild_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Shared merge store over a single SQLite connection.
pub struct Store {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = db::open_database(path)?;
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(db::open_in_memory()?))
    }

    #[must_use]
    pub const fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("store connection mutex poisoned"))
    }

    /// Run `f` with exclusive access to the underlying connection.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f`, or fails if the mutex is poisoned.
    pub fn with_connection<R>(&self, f: impl FnOnce(&mut Connection) -> Result<R>) -> Result<R> {
        let mut conn = self.lock()?;
        f(&mut conn)
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    /// Merge one observation.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn merge(&self, update: &Update) -> Result<MergeOutcome> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("begin merge transaction")?;
        let outcome = merge_in(&tx, update)?;
        tx.commit().context("commit merge transaction")?;
        Ok(outcome)
    }

    /// Merge a batch of observations in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails; nothing from the batch is kept.
    pub fn merge_batch(&self, updates: &[Update]) -> Result<MergeStats> {
        let mut stats = MergeStats::default();
        if updates.is_empty() {
            return Ok(stats);
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("begin merge batch")?;
        for update in updates {
            stats.record(merge_in(&tx, update)?);
        }
        tx.commit().context("commit merge batch")?;

        tracing::debug!(
            inserted = stats.inserted,
            merged = stats.merged,
            "merged update batch"
        );
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Fetch one record by identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub fn get(&self, kind: EntityKind, hash: &str) -> Result<Option<StoredUpdate>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT kind, hash, entity_id, payload, first_seen_us, last_seen_us
                 FROM updates WHERE kind = ?1 AND hash = ?2",
                params![kind.as_str(), hash],
                RawRow::from_row,
            )
            .optional()
            .with_context(|| format!("get {kind} {hash}"))?;
        raw.map(RawRow::decode).transpose()
    }

    /// Every record for one natural key, ascending by first-seen.
    ///
    /// With `after`, only records first seen strictly after that instant.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub fn entity_history(
        &self,
        kind: EntityKind,
        entity_id: &str,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredUpdate>> {
        let conn = self.lock()?;
        entity_history_in(&conn, kind, entity_id, after)
    }

    /// Every record of a kind, ascending by first-seen.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub fn all_of_kind(&self, kind: EntityKind) -> Result<Vec<StoredUpdate>> {
        let conn = self.lock()?;
        all_of_kind_in(&conn, kind)
    }

    /// Number of records of a kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self, kind: EntityKind) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM updates WHERE kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )
            .with_context(|| format!("count {kind} updates"))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Counts per kind plus derived table sizes.
    ///
    /// # Errors
    ///
    /// Returns an error if any count query fails.
    pub fn status(&self) -> Result<StoreStatus> {
        let mut updates = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            updates.push((kind, self.count(kind)?));
        }

        let conn = self.lock()?;
        let games: i64 = conn
            .query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))
            .context("count games")?;
        let idol_hours: i64 = conn
            .query_row("SELECT COUNT(*) FROM idols_hourly", [], |row| row.get(0))
            .context("count idol hours")?;
        let last_rebuild_us: i64 = conn
            .query_row(
                "SELECT last_rebuild_at_us FROM store_meta WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .context("read store_meta")?;

        Ok(StoreStatus {
            updates,
            games: usize::try_from(games).unwrap_or(0),
            idol_hours: usize::try_from(idol_hours).unwrap_or(0),
            last_rebuild_at: if last_rebuild_us > 0 {
                Some(from_micros(last_rebuild_us)?)
            } else {
                None
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Connection-level helpers (shared with the projections)
// ---------------------------------------------------------------------------

fn merge_in(conn: &Connection, update: &Update) -> Result<MergeOutcome> {
    let kind = update.kind.as_str();
    let observed = to_micros(update.observed_at);

    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM updates WHERE kind = ?1 AND hash = ?2)",
            params![kind, update.hash],
            |row| row.get(0),
        )
        .with_context(|| format!("look up {kind} {}", update.hash))?;

    conn.execute(
        "INSERT INTO updates (kind, hash, entity_id, payload, first_seen_us, last_seen_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(kind, hash) DO UPDATE SET
             first_seen_us = min(first_seen_us, excluded.first_seen_us),
             last_seen_us = max(last_seen_us, excluded.last_seen_us)",
        params![
            kind,
            update.hash,
            update.entity_id.as_deref(),
            canonical_json(&update.payload),
            observed,
        ],
    )
    .with_context(|| format!("merge {kind} {}", update.hash))?;

    Ok(if exists {
        MergeOutcome::Merged
    } else {
        MergeOutcome::Inserted
    })
}

pub(crate) fn entity_history_in(
    conn: &Connection,
    kind: EntityKind,
    entity_id: &str,
    after: Option<DateTime<Utc>>,
) -> Result<Vec<StoredUpdate>> {
    let after_us = after.map_or(i64::MIN, to_micros);
    let mut stmt = conn
        .prepare_cached(
            "SELECT kind, hash, entity_id, payload, first_seen_us, last_seen_us
             FROM updates
             WHERE kind = ?1 AND entity_id = ?2 AND first_seen_us > ?3
             ORDER BY first_seen_us ASC, hash ASC",
        )
        .context("prepare entity history query")?;
    let rows = stmt
        .query_map(params![kind.as_str(), entity_id, after_us], RawRow::from_row)
        .with_context(|| format!("query {kind} history for {entity_id}"))?;
    decode_rows(rows)
}

pub(crate) fn all_of_kind_in(conn: &Connection, kind: EntityKind) -> Result<Vec<StoredUpdate>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT kind, hash, entity_id, payload, first_seen_us, last_seen_us
             FROM updates
             WHERE kind = ?1
             ORDER BY first_seen_us ASC, hash ASC",
        )
        .context("prepare kind scan")?;
    let rows = stmt
        .query_map(params![kind.as_str()], RawRow::from_row)
        .with_context(|| format!("scan {kind} updates"))?;
    decode_rows(rows)
}

fn decode_rows(
    rows: impl Iterator<Item = rusqlite::Result<RawRow>>,
) -> Result<Vec<StoredUpdate>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("read update row")?.decode()?);
    }
    Ok(out)
}

struct RawRow {
    kind: String,
    hash: String,
    entity_id: Option<String>,
    payload: String,
    first_seen_us: i64,
    last_seen_us: i64,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            kind: row.get(0)?,
            hash: row.get(1)?,
            entity_id: row.get(2)?,
            payload: row.get(3)?,
            first_seen_us: row.get(4)?,
            last_seen_us: row.get(5)?,
        })
    }

    fn decode(self) -> Result<StoredUpdate> {
        let kind: EntityKind = self.kind.parse()?;
        let payload = serde_json::from_str(&self.payload)
            .with_context(|| format!("decode payload of {kind} {}", self.hash))?;
        Ok(StoredUpdate {
            kind,
            hash: self.hash,
            entity_id: self.entity_id,
            payload,
            first_seen: from_micros(self.first_seen_us)?,
            last_seen: from_micros(self.last_seen_us)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
