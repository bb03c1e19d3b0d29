//! SQLite schema for the merge store.
//!
//! - `updates` holds every event-derived record of every kind, keyed by
//!   `(kind, hash)`; `entity_id` is the optional natural key
//! - `games` is the per-game aggregate folded from `game` updates
//! - `idols_hourly` keeps the first idols board seen in each UTC hour
//! - `store_meta` tracks the schema stamp and the last full rebuild
//!
//! There is a single schema version. A fresh file is created at it; a file
//! stamped by a newer build is refused instead of being written with an
//! older layout.

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, TransactionBehavior};

/// Value stored in `PRAGMA user_version` for this layout.
pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA_SQL: &str = r"
CREATE TABLE updates (
    kind TEXT NOT NULL,
    hash TEXT NOT NULL CHECK (hash LIKE 'blake3:%'),
    entity_id TEXT,
    payload TEXT NOT NULL,
    first_seen_us INTEGER NOT NULL,
    last_seen_us INTEGER NOT NULL,
    PRIMARY KEY (kind, hash),
    CHECK (first_seen_us <= last_seen_us)
);

CREATE INDEX idx_updates_kind_entity_first_seen
    ON updates(kind, entity_id, first_seen_us);

CREATE INDEX idx_updates_kind_first_seen
    ON updates(kind, first_seen_us);

CREATE TABLE games (
    game_id TEXT PRIMARY KEY,
    season INTEGER NOT NULL,
    day INTEGER NOT NULL,
    last_update TEXT NOT NULL,
    last_update_us INTEGER NOT NULL,
    start_us INTEGER,
    end_us INTEGER
);

CREATE INDEX idx_games_season_day
    ON games(season, day);

CREATE INDEX idx_games_season_day_desc
    ON games(season DESC, day DESC);

CREATE TABLE idols_hourly (
    hour_us INTEGER PRIMARY KEY,
    players TEXT NOT NULL,
    first_seen_us INTEGER NOT NULL
);

CREATE TABLE store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    created_at_us INTEGER NOT NULL,
    last_rebuild_at_us INTEGER NOT NULL DEFAULT 0
);
";

/// Indexes expected by the range-scan query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_updates_kind_entity_first_seen",
    "idx_updates_kind_first_seen",
    "idx_games_season_day",
    "idx_games_season_day_desc",
];

/// What [`ensure_schema`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    /// Empty file; the schema was just created.
    Created,
    /// Already at [`SCHEMA_VERSION`].
    Current,
}

/// Create the schema in an empty database, or confirm an existing one.
///
/// # Errors
///
/// Returns an error if the file carries a different schema stamp or the DDL
/// fails.
pub fn ensure_schema(conn: &mut Connection) -> Result<SchemaState> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("begin schema check")?;
    let stamp: i64 = tx
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("read schema stamp")?;

    match stamp {
        0 => {
            tx.execute_batch(SCHEMA_SQL).context("create store schema")?;
            tx.execute(
                "INSERT INTO store_meta (id, created_at_us) VALUES (1, ?1)",
                [crate::store::to_micros(chrono::Utc::now())],
            )
            .context("stamp store_meta")?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)
                .context("write schema stamp")?;
            tx.commit().context("commit store schema")?;
            tracing::info!(version = SCHEMA_VERSION, "created store schema");
            Ok(SchemaState::Created)
        }
        SCHEMA_VERSION => Ok(SchemaState::Current),
        other => bail!(
            "store schema stamp {other} is not supported (this build writes {SCHEMA_VERSION})"
        ),
    }
}
