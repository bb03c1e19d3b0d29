//! Hourly idol board snapshots.
//!
//! One record per UTC hour, keyed by the top of the hour in which an idols
//! update was first seen. The first board recorded for an hour wins; later
//! boards in the same hour are ignored.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schedule::hour_bucket;
use crate::store::{Store, from_micros, to_micros};

/// One player on an hourly board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdolEntry {
    pub player_id: String,
    /// Provisional; always `None` when first recorded.
    pub rank: Option<u32>,
}

/// The board recorded for one hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyIdols {
    pub hour: DateTime<Utc>,
    pub players: Vec<IdolEntry>,
    pub first_seen: DateTime<Utc>,
}

/// Player ids present in an idols document.
///
/// Accepts a bare array or an `idols`/`data` wrapper; elements may be id
/// strings or objects with `playerId` (or `id`).
#[must_use]
pub fn idol_players(payload: &Value) -> Vec<String> {
    let items = payload
        .as_array()
        .or_else(|| payload.get("idols").and_then(Value::as_array))
        .or_else(|| payload.get("data").and_then(Value::as_array));

    items
        .into_iter()
        .flatten()
        .filter_map(|item| {
            item.as_str()
                .or_else(|| item.get("playerId").and_then(Value::as_str))
                .or_else(|| item.get("id").and_then(Value::as_str))
        })
        .map(str::to_string)
        .collect()
}

/// Record the board for the hour containing `first_seen`, unless that hour
/// already has one.
///
/// Returns `true` if a new hourly record was written.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn record_hour(store: &Store, payload: &Value, first_seen: DateTime<Utc>) -> Result<bool> {
    let hour = hour_bucket(first_seen);
    let players: Vec<IdolEntry> = idol_players(payload)
        .into_iter()
        .map(|player_id| IdolEntry {
            player_id,
            rank: None,
        })
        .collect();
    let players_json = serde_json::to_string(&players).context("encode idol board")?;

    let written = store.with_connection(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO idols_hourly (hour_us, players, first_seen_us)
             VALUES (?1, ?2, ?3)",
            params![to_micros(hour), players_json, to_micros(first_seen)],
        )
        .with_context(|| format!("record idol hour {hour}"))
    })?;

    if written > 0 {
        tracing::info!(%hour, players = players.len(), "recorded hourly idol board");
    }
    Ok(written > 0)
}

/// Read the board for the hour containing `ts`.
///
/// # Errors
///
/// Returns an error if the query fails or the row cannot be decoded.
pub fn get_hour(store: &Store, ts: DateTime<Utc>) -> Result<Option<HourlyIdols>> {
    let hour = hour_bucket(ts);
    let row = store.with_connection(|conn| {
        conn.query_row(
            "SELECT players, first_seen_us FROM idols_hourly WHERE hour_us = ?1",
            params![to_micros(hour)],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()
        .with_context(|| format!("get idol hour {hour}"))
    })?;

    let Some((players, first_seen_us)) = row else {
        return Ok(None);
    };
    Ok(Some(HourlyIdols {
        hour,
        players: serde_json::from_str(&players).context("decode idol board")?,
        first_seen: from_micros(first_seen_us)?,
    }))
}
