//! Game update log → per-game current-state aggregate.
//!
//! Updates for one game are folded in ascending `first_seen` order (ties
//! broken by hash):
//!
//! - `season`, `day`: from the first update that carries them; never changed
//! - `last_update`, `last_update_time`: the latest update by `first_seen`
//! - `start`: minimum `first_seen` over updates flagged `gameStart`
//! - `end`: minimum `last_seen` over updates flagged `gameComplete`
//!
//! `end` reads `last_seen` while `start` reads `first_seen`; the asymmetry is
//! deliberate and must not be unified.
//!
//! # Incremental vs. full rebuild
//!
//! [`refresh_games`] refolds the complete stored history of each touched
//! game; [`rebuild_games`] refolds every game. Both go through
//! [`fold_game`], so they always agree. A re-observed `gameComplete` record
//! moves its `last_seen`, so a refresh always refolds the whole history.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::Serialize;
use serde_json::Value;

use crate::hash::canonical_json;
use crate::model::{EntityKind, StoredUpdate};
use crate::store::{Store, all_of_kind_in, entity_history_in, from_micros, to_micros};

// ---------------------------------------------------------------------------
// GameAggregate
// ---------------------------------------------------------------------------

/// Current state of one game.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameAggregate {
    pub game_id: String,
    pub season: i64,
    pub day: i64,
    pub last_update: Value,
    pub last_update_time: DateTime<Utc>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

fn flag(payload: &Value, field: &str) -> bool {
    payload.get(field).and_then(Value::as_bool).unwrap_or(false)
}

fn earliest(current: Option<DateTime<Utc>>, candidate: DateTime<Utc>) -> DateTime<Utc> {
    current.map_or(candidate, |ts| ts.min(candidate))
}

/// Running state while folding one game's history.
///
/// Every update contributes its flags and its claim on `last_update`, even
/// when it carries no `season`/`day`. The aggregate only exists once some
/// update has supplied both.
#[derive(Debug, Default)]
struct GameFold<'a> {
    game_id: Option<&'a str>,
    season_day: Option<(i64, i64)>,
    latest: Option<&'a StoredUpdate>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl<'a> GameFold<'a> {
    /// Updates must arrive in ascending `(first_seen, hash)` order.
    fn apply(&mut self, update: &'a StoredUpdate) {
        if self.game_id.is_none() {
            self.game_id = update.entity_id.as_deref();
        }
        if self.season_day.is_none() {
            let payload = &update.payload;
            if let (Some(season), Some(day)) = (
                payload.get("season").and_then(Value::as_i64),
                payload.get("day").and_then(Value::as_i64),
            ) {
                self.season_day = Some((season, day));
            }
        }
        self.latest = Some(update);

        if flag(&update.payload, "gameStart") {
            self.start = Some(earliest(self.start, update.first_seen));
        }
        if flag(&update.payload, "gameComplete") {
            self.end = Some(earliest(self.end, update.last_seen));
        }
    }

    fn finish(self) -> Option<GameAggregate> {
        let (season, day) = self.season_day?;
        let latest = self.latest?;
        // start <= end once both are known
        let end = match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end.max(start)),
            (_, end) => end,
        };
        Some(GameAggregate {
            game_id: self.game_id?.to_string(),
            season,
            day,
            last_update: latest.payload.clone(),
            last_update_time: latest.first_seen,
            start: self.start,
            end,
        })
    }
}

/// Fold the history of a single game.
///
/// `updates` may arrive in any order; they are sorted by `first_seen` (then
/// hash) first. Returns `None` until some update carries an integer
/// `season` and `day`.
#[must_use]
pub fn fold_game(updates: &[StoredUpdate]) -> Option<GameAggregate> {
    let mut ordered: Vec<&StoredUpdate> = updates.iter().collect();
    ordered.sort_by(|a, b| (a.first_seen, &a.hash).cmp(&(b.first_seen, &b.hash)));

    let mut fold = GameFold::default();
    for update in ordered {
        fold.apply(update);
    }
    fold.finish()
}

/// Fold a mixed log into one aggregate per game id.
#[must_use]
pub fn fold_all(updates: &[StoredUpdate]) -> Vec<GameAggregate> {
    let mut by_game: BTreeMap<&str, Vec<StoredUpdate>> = BTreeMap::new();
    for update in updates {
        if let Some(id) = update.entity_id.as_deref() {
            by_game.entry(id).or_default().push(update.clone());
        }
    }
    by_game.values().filter_map(|history| fold_game(history)).collect()
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Report returned after a full rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Game updates read from the log.
    pub update_count: usize,
    /// Aggregates written.
    pub game_count: usize,
    #[serde(skip)]
    pub elapsed: std::time::Duration,
}

fn write_game(conn: &Connection, game: &GameAggregate) -> Result<()> {
    conn.execute(
        "INSERT INTO games (game_id, season, day, last_update, last_update_us, start_us, end_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(game_id) DO UPDATE SET
             season = excluded.season,
             day = excluded.day,
             last_update = excluded.last_update,
             last_update_us = excluded.last_update_us,
             start_us = excluded.start_us,
             end_us = excluded.end_us",
        params![
            game.game_id,
            game.season,
            game.day,
            canonical_json(&game.last_update),
            to_micros(game.last_update_time),
            game.start.map(to_micros),
            game.end.map(to_micros),
        ],
    )
    .with_context(|| format!("write game aggregate {}", game.game_id))?;
    Ok(())
}

/// Recompute the aggregates of the given games from their stored history.
///
/// Returns the number of aggregates written.
///
/// # Errors
///
/// Returns an error if reading history or writing aggregates fails.
pub fn refresh_games<'a>(
    store: &Store,
    game_ids: impl IntoIterator<Item = &'a str>,
) -> Result<usize> {
    let ids: BTreeSet<&str> = game_ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(0);
    }

    store.with_connection(|conn| {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("begin game refresh")?;
        let mut written = 0;
        for id in &ids {
            let history = entity_history_in(&tx, EntityKind::Game, id, None)?;
            if let Some(game) = fold_game(&history) {
                write_game(&tx, &game)?;
                written += 1;
            } else {
                tracing::debug!(game_id = *id, "no seedable update for game yet");
            }
        }
        tx.commit().context("commit game refresh")?;
        Ok(written)
    })
}

/// Drop every aggregate and refold the full game update log.
///
/// # Errors
///
/// Returns an error if the log cannot be read or aggregates cannot be written.
pub fn rebuild_games(store: &Store) -> Result<RebuildReport> {
    let start = Instant::now();

    let (update_count, game_count) = store.with_connection(|conn| {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("begin game rebuild")?;
        tx.execute("DELETE FROM games", [])
            .context("clear game aggregates")?;

        let updates = all_of_kind_in(&tx, EntityKind::Game)?;
        let games = fold_all(&updates);
        for game in &games {
            write_game(&tx, game)?;
        }

        tx.execute(
            "UPDATE store_meta SET last_rebuild_at_us = ?1 WHERE id = 1",
            params![to_micros(Utc::now())],
        )
        .context("record rebuild time")?;
        tx.commit().context("commit game rebuild")?;
        Ok((updates.len(), games.len()))
    })?;

    let elapsed = start.elapsed();
    tracing::info!(
        update_count,
        game_count,
        elapsed_ms = elapsed.as_millis(),
        "game projection rebuild complete"
    );

    Ok(RebuildReport {
        update_count,
        game_count,
        elapsed,
    })
}

/// Read one aggregate.
///
/// # Errors
///
/// Returns an error if the query fails or the row cannot be decoded.
pub fn get_game(store: &Store, game_id: &str) -> Result<Option<GameAggregate>> {
    store.with_connection(|conn| {
        let row = conn
            .query_row(
                "SELECT game_id, season, day, last_update, last_update_us, start_us, end_us
                 FROM games WHERE game_id = ?1",
                params![game_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                        row.get::<_, Option<i64>>(6)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("get game {game_id}"))?;

        let Some((game_id, season, day, last_update, last_update_us, start_us, end_us)) = row
        else {
            return Ok(None);
        };

        Ok(Some(GameAggregate {
            last_update: serde_json::from_str(&last_update)
                .with_context(|| format!("decode last update of {game_id}"))?,
            game_id,
            season,
            day,
            last_update_time: from_micros(last_update_us)?,
            start: start_us.map(from_micros).transpose()?,
            end: end_us.map(from_micros).transpose()?,
        }))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
