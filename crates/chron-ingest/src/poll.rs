//! Wall-clock aligned request/response pollers.
//!
//! Each worker runs a tick immediately, then sleeps to the next epoch-aligned
//! boundary of its period. Within a tick every feed (and every player chunk)
//! is isolated: one failure is logged and the rest of the tick proceeds.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::{error, info, warn};

use chron_core::config::{FeedConfig, PollConfig, SiteAsset};
use chron_core::error::ErrorCode;
use chron_core::roster::{chunk_ids, join_ids, player_ids};
use chron_core::schedule::{self, FIVE_MINUTES, MINUTE};
use chron_core::store::MergeStats;
use chron_core::EntityKind;

use crate::ingestor::Ingestor;
use crate::shutdown::Shutdown;
use crate::source::{JsonSource, with_query};

/// Run `tick` now and then on every boundary of `period` until shutdown.
///
/// A tick that panics is logged and the schedule carries on.
pub async fn run_aligned<F, Fut, R>(
    name: &'static str,
    period: Duration,
    mut shutdown: Shutdown,
    mut tick: F,
) where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = R> + Send,
    R: std::fmt::Debug + Send,
{
    let mut ticks: u64 = 0;
    loop {
        ticks += 1;
        match AssertUnwindSafe(async { tick().await }).catch_unwind().await {
            Ok(report) => info!(worker = name, tick = ticks, ?report, "poll tick finished"),
            Err(_) => error!(
                worker = name,
                tick = ticks,
                code = %ErrorCode::InternalUnexpected,
                "poll tick panicked"
            ),
        }

        let wait = schedule::until_next_boundary(Utc::now(), period);
        if !shutdown.sleep(wait).await {
            break;
        }
    }
    info!(worker = name, "poller stopped");
}

// ---------------------------------------------------------------------------
// Minute poller
// ---------------------------------------------------------------------------

/// Outcome of one minute tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinuteReport {
    pub stored: usize,
    pub failed: usize,
    pub idol_hour_recorded: bool,
}

fn log_failure(feed: &str, code: ErrorCode, e: &anyhow::Error) {
    warn!(feed, code = %code, error = %format!("{e:#}"), "feed poll failed");
}

/// Fetch and store idols, tributes, global events and site assets once.
pub async fn minute_tick<S: JsonSource>(
    source: &S,
    feeds: &FeedConfig,
    ingestor: &Ingestor,
) -> MinuteReport {
    let mut report = MinuteReport::default();

    match poll_idols(source, &feeds.idols_url, ingestor).await {
        Ok(recorded) => {
            report.stored += 1;
            report.idol_hour_recorded = recorded;
        }
        Err(e) => {
            report.failed += 1;
            log_failure("idols", ErrorCode::FetchFailed, &e);
        }
    }

    for (feed, kind, url) in [
        ("tributes", EntityKind::Tributes, &feeds.tributes_url),
        ("global_events", EntityKind::GlobalEvents, &feeds.global_events_url),
    ] {
        match poll_snapshot(source, kind, url, ingestor).await {
            Ok(()) => report.stored += 1,
            Err(e) => {
                report.failed += 1;
                log_failure(feed, ErrorCode::FetchFailed, &e);
            }
        }
    }

    for asset in &feeds.site_assets {
        match poll_asset(source, asset, ingestor).await {
            Ok(()) => report.stored += 1,
            Err(e) => {
                report.failed += 1;
                log_failure(&asset.path, ErrorCode::FetchFailed, &e);
            }
        }
    }

    report
}

async fn poll_snapshot<S: JsonSource>(
    source: &S,
    kind: EntityKind,
    url: &str,
    ingestor: &Ingestor,
) -> Result<()> {
    let doc = source.fetch_json(url).await?;
    ingestor.ingest_snapshot(kind, None, doc, Utc::now()).await?;
    Ok(())
}

async fn poll_asset<S: JsonSource>(
    source: &S,
    asset: &SiteAsset,
    ingestor: &Ingestor,
) -> Result<()> {
    let text = source.fetch_text(&asset.url).await?;
    ingestor
        .ingest_snapshot(
            EntityKind::SiteAsset,
            Some(asset.path.clone()),
            Value::String(text),
            Utc::now(),
        )
        .await?;
    Ok(())
}

/// Store the idols board and record its hour if the hour is still open.
async fn poll_idols<S: JsonSource>(source: &S, url: &str, ingestor: &Ingestor) -> Result<bool> {
    let doc = source.fetch_json(url).await?;
    let first_seen = ingestor
        .ingest_snapshot(EntityKind::Idols, None, doc.clone(), Utc::now())
        .await?;
    ingestor.record_idols(doc, first_seen).await
}

/// Run the minute poller until shutdown.
pub async fn run_minute_poller<S: JsonSource>(
    source: Arc<S>,
    feeds: FeedConfig,
    ingestor: Ingestor,
    shutdown: Shutdown,
) {
    run_aligned("minute", MINUTE, shutdown, || {
        minute_tick(source.as_ref(), &feeds, &ingestor)
    })
    .await;
}

// ---------------------------------------------------------------------------
// Five-minute poller
// ---------------------------------------------------------------------------

/// Outcome of one five-minute tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RosterReport {
    pub teams_ok: bool,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub players: usize,
}

async fn poll_teams<S: JsonSource>(
    source: &S,
    url: &str,
    ingestor: &Ingestor,
) -> Result<MergeStats> {
    let doc = source.fetch_json(url).await?;
    ingestor.ingest_teams(&doc, Utc::now()).await
}

async fn poll_players<S: JsonSource>(
    source: &S,
    url: &str,
    ingestor: &Ingestor,
) -> Result<MergeStats> {
    let doc = source.fetch_json(url).await?;
    ingestor.ingest_players(&doc, Utc::now()).await
}

/// Refresh teams, then fetch every rostered player in chunks.
///
/// A teams failure keeps the previous roster. Each player chunk stands
/// alone: a failed chunk is skipped and the others still land.
pub async fn roster_tick<S: JsonSource>(
    source: &S,
    feeds: &FeedConfig,
    poll: &PollConfig,
    ingestor: &Ingestor,
) -> RosterReport {
    let mut report = RosterReport::default();

    match poll_teams(source, &feeds.teams_url, ingestor).await {
        Ok(_) => report.teams_ok = true,
        Err(e) => log_failure("teams", ErrorCode::FetchFailed, &e),
    }

    let Some(roster) = ingestor.roster().current() else {
        return report;
    };
    let ids = player_ids(&roster);
    for (index, chunk) in chunk_ids(&ids, poll.player_chunk_size).into_iter().enumerate() {
        report.chunks += 1;
        let url = with_query(&feeds.players_url, "ids", &join_ids(chunk));
        match poll_players(source, &url, ingestor).await {
            Ok(stats) => report.players += stats.total(),
            Err(e) => {
                report.failed_chunks += 1;
                warn!(
                    chunk = index,
                    size = chunk.len(),
                    code = %ErrorCode::FetchFailed,
                    error = %format!("{e:#}"),
                    "player chunk failed"
                );
            }
        }
    }
    report
}

/// Wait for the first roster, then run the five-minute poller until
/// shutdown.
pub async fn run_roster_poller<S: JsonSource>(
    source: Arc<S>,
    feeds: FeedConfig,
    poll: PollConfig,
    ingestor: Ingestor,
    mut shutdown: Shutdown,
) {
    let interval = Duration::from_millis(poll.readiness_interval_ms.max(1));
    info!("roster poller waiting for first roster");
    if !ingestor.roster().wait_ready(interval, &mut shutdown).await {
        return;
    }
    run_aligned("five_minute", FIVE_MINUTES, shutdown, || {
        roster_tick(source.as_ref(), &feeds, &poll, &ingestor)
    })
    .await;
}
