//! Merge-writes shared by all workers.
//!
//! Store calls are synchronous SQLite work and run on the blocking pool.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use chron_core::error::ErrorCode;
use chron_core::extract::{self, Collection};
use chron_core::projection::{record_hour, refresh_games};
use chron_core::store::MergeStats;
use chron_core::{EntityKind, Store, Update};

use crate::roster::RosterState;

/// What one stream payload contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub merged: MergeStats,
    pub games: usize,
    pub teams: usize,
    pub games_refreshed: usize,
}

/// Handle to the shared store and roster.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<Store>,
    roster: RosterState,
}

impl Ingestor {
    #[must_use]
    pub const fn new(store: Arc<Store>, roster: RosterState) -> Self {
        Self { store, roster }
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<Store> {
        &self.store
    }

    #[must_use]
    pub const fn roster(&self) -> &RosterState {
        &self.roster
    }

    /// Run `f` against the store on the blocking pool.
    async fn blocking<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&Store) -> Result<R> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .context("store task panicked")?
    }

    /// Merge a batch of updates.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn merge(&self, updates: Vec<Update>) -> Result<MergeStats> {
        if updates.is_empty() {
            return Ok(MergeStats::default());
        }
        self.blocking(move |store| store.merge_batch(&updates)).await
    }

    /// Ingest one push-feed payload.
    ///
    /// The raw payload, every scheduled game and every team are merged under
    /// one observation instant. Touched games are then re-projected and the
    /// team collection becomes the current roster.
    ///
    /// # Errors
    ///
    /// Returns an error if the merge write fails. A failed projection
    /// refresh is logged and does not fail the payload.
    pub async fn ingest_stream_payload(
        &self,
        payload: Value,
        observed_at: DateTime<Utc>,
    ) -> Result<StreamReport> {
        let games = extract::extract_or_skip(&payload, Collection::Schedule, observed_at);
        let teams = match extract::extract(&payload, Collection::Teams, observed_at) {
            Ok(teams) => teams,
            Err(e) => {
                debug!(error = %e, "stream payload carries no teams");
                extract::Extracted::default()
            }
        };

        let game_ids: Vec<String> = games
            .updates
            .iter()
            .filter_map(|u| u.entity_id.clone())
            .collect();
        let team_docs: Vec<Value> = teams.updates.iter().map(|u| u.payload.clone()).collect();

        let mut report = StreamReport {
            games: games.updates.len(),
            teams: teams.updates.len(),
            ..StreamReport::default()
        };

        let mut batch = Vec::with_capacity(1 + report.games + report.teams);
        batch.push(Update::new(EntityKind::Stream, None, payload, observed_at));
        batch.extend(games.updates);
        batch.extend(teams.updates);
        report.merged = self.merge(batch).await?;

        if !game_ids.is_empty() {
            match self
                .blocking(move |store| refresh_games(store, game_ids.iter().map(String::as_str)))
                .await
            {
                Ok(n) => report.games_refreshed = n,
                Err(e) => warn!(
                    code = %ErrorCode::ProjectionFailed,
                    error = %format!("{e:#}"),
                    "game projection refresh failed"
                ),
            }
        }

        self.roster.publish(team_docs);
        Ok(report)
    }

    /// Ingest a polled team collection and publish it as the roster.
    ///
    /// # Errors
    ///
    /// Returns an error if the document has no team array or merging
    /// fails.
    pub async fn ingest_teams(
        &self,
        doc: &Value,
        observed_at: DateTime<Utc>,
    ) -> Result<MergeStats> {
        let teams =
            extract::extract(doc, Collection::Teams, observed_at).context("teams document")?;
        let docs: Vec<Value> = teams.updates.iter().map(|u| u.payload.clone()).collect();
        let stats = self.merge(teams.updates).await?;
        self.roster.publish(docs);
        Ok(stats)
    }

    /// Ingest one polled player chunk (a bare array of player documents).
    ///
    /// # Errors
    ///
    /// Returns an error if the response has no player array or the write
    /// fails.
    pub async fn ingest_players(
        &self,
        doc: &Value,
        observed_at: DateTime<Utc>,
    ) -> Result<MergeStats> {
        let items = doc
            .as_array()
            .or_else(|| doc.get("players").and_then(Value::as_array))
            .ok_or_else(|| anyhow::anyhow!("player response is not an array"))?;
        let players = extract::keyed_updates(items, EntityKind::Player, observed_at);
        self.merge(players.updates).await
    }

    /// Merge one whole-document snapshot (idols, tributes, global events,
    /// site assets). Returns the stored record's first-seen instant.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or read-back fails.
    pub async fn ingest_snapshot(
        &self,
        kind: EntityKind,
        entity_id: Option<String>,
        doc: Value,
        observed_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let update = Update::new(kind, entity_id, doc, observed_at);
        self.blocking(move |store| {
            store.merge(&update)?;
            let stored = store
                .get(update.kind, &update.hash)?
                .with_context(|| format!("{} {} vanished after merge", update.kind, update.hash))?;
            Ok(stored.first_seen)
        })
        .await
    }

    /// Record the hourly idol board for a stored idols snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn record_idols(&self, doc: Value, first_seen: DateTime<Utc>) -> Result<bool> {
        self.blocking(move |store| record_hour(store, &doc, first_seen))
            .await
    }
}
