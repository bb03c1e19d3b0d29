//! Typed update extraction from raw feed payloads.
//!
//! Feed documents nest the interesting arrays under optional wrappers. The
//! lookup order is fixed:
//!
//! 1. unwrap `value` if present
//! 2. unwrap `games` (schedule) or `leagues` (teams) if present
//! 3. require the `schedule` / `teams` array
//!
//! A document that is already a bare array after step 1 is taken as the
//! collection itself; the request/response endpoints return that shape.
//! When the required array is missing the whole payload is skipped.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ErrorCode;
use crate::model::{EntityKind, Update};

/// Sub-collections the extractor knows how to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// `games.schedule`: one entry per game in progress or scheduled.
    Schedule,
    /// `leagues.teams`: one entry per team, rosters included.
    Teams,
}

impl Collection {
    #[must_use]
    pub const fn wrapper(self) -> &'static str {
        match self {
            Self::Schedule => "games",
            Self::Teams => "leagues",
        }
    }

    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Teams => "teams",
        }
    }

    #[must_use]
    pub const fn kind(self) -> EntityKind {
        match self {
            Self::Schedule => EntityKind::Game,
            Self::Teams => EntityKind::Team,
        }
    }
}

/// Why a payload yielded nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("payload has no '{field}' collection")]
    MissingPath { field: &'static str },

    #[error("'{field}' is not an array")]
    NotAnArray { field: &'static str },
}

impl ExtractError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MissingPath { .. } | Self::NotAnArray { .. } => ErrorCode::MissingPath,
        }
    }
}

/// Updates found in one payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub updates: Vec<Update>,
    /// Elements dropped because they carried no string `id`.
    pub skipped: usize,
}

/// Locate `collection` inside `payload` following the fixed lookup order.
///
/// # Errors
///
/// Returns [`ExtractError`] when the required array is absent.
pub fn locate(payload: &Value, collection: Collection) -> Result<&[Value], ExtractError> {
    let mut node = payload.get("value").unwrap_or(payload);
    if let Some(items) = node.as_array() {
        return Ok(items);
    }
    if let Some(inner) = node.get(collection.wrapper()) {
        node = inner;
    }

    let field = collection.field();
    node.get(field)
        .ok_or(ExtractError::MissingPath { field })?
        .as_array()
        .map(Vec::as_slice)
        .ok_or(ExtractError::NotAnArray { field })
}

/// Turn every element of `collection` into a typed update stamped with the
/// shared observation instant.
///
/// # Errors
///
/// Returns [`ExtractError`] when the required array is absent.
pub fn extract(
    payload: &Value,
    collection: Collection,
    observed_at: DateTime<Utc>,
) -> Result<Extracted, ExtractError> {
    let items = locate(payload, collection)?;
    Ok(keyed_updates(items, collection.kind(), observed_at))
}

/// Like [`extract`], but a missing path is logged and yields nothing.
#[must_use]
pub fn extract_or_skip(
    payload: &Value,
    collection: Collection,
    observed_at: DateTime<Utc>,
) -> Extracted {
    match extract(payload, collection, observed_at) {
        Ok(extracted) => extracted,
        Err(e) => {
            tracing::warn!(
                code = %e.code(),
                collection = collection.field(),
                error = %e,
                "skipping payload without required collection"
            );
            Extracted::default()
        }
    }
}

/// Build one update per element keyed by its `id`.
#[must_use]
pub fn keyed_updates(items: &[Value], kind: EntityKind, observed_at: DateTime<Utc>) -> Extracted {
    let mut out = Extracted::default();
    for item in items {
        if let Some(update) = Update::keyed_by_id(kind, item.clone(), observed_at) {
            out.updates.push(update);
        } else {
            tracing::warn!(
                code = %ErrorCode::MissingIdentity,
                %kind,
                "skipping element without id"
            );
            out.skipped += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::content_hash;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_600_000_000, 0).expect("valid ts")
    }

    #[test]
    fn finds_schedule_under_value_and_games() {
        let payload = json!({
            "value": {
                "games": {
                    "sim": {"season": 11, "day": 3},
                    "schedule": [
                        {"id": "g1", "season": 11, "day": 3},
                        {"id": "g2", "season": 11, "day": 3}
                    ]
                }
            }
        });

        let extracted = extract(&payload, Collection::Schedule, now()).expect("extract");
        assert_eq!(extracted.updates.len(), 2);
        assert_eq!(extracted.skipped, 0);

        let first = &extracted.updates[0];
        assert_eq!(first.kind, EntityKind::Game);
        assert_eq!(first.entity_id.as_deref(), Some("g1"));
        assert_eq!(first.observed_at, now());
        assert_eq!(first.hash, content_hash(&json!({"id": "g1", "season": 11, "day": 3})));
    }

    #[test]
    fn wrappers_are_optional() {
        let bare = json!({"teams": [{"id": "t1"}]});
        assert_eq!(locate(&bare, Collection::Teams).expect("bare").len(), 1);

        let leagues = json!({"leagues": {"teams": [{"id": "t1"}, {"id": "t2"}]}});
        assert_eq!(locate(&leagues, Collection::Teams).expect("leagues").len(), 2);

        let value_only = json!({"value": {"schedule": []}});
        assert!(locate(&value_only, Collection::Schedule).expect("value").is_empty());
    }

    #[test]
    fn bare_array_is_the_collection() {
        let payload = json!([{"id": "t1"}, {"id": "t2"}, {"id": "t3"}]);
        let extracted = extract(&payload, Collection::Teams, now()).expect("extract");
        assert_eq!(extracted.updates.len(), 3);
        assert!(extracted.updates.iter().all(|u| u.kind == EntityKind::Team));
    }

    #[test]
    fn missing_collection_skips_whole_payload() {
        let payload = json!({"value": {"games": {"sim": {}}}});
        assert_eq!(
            extract(&payload, Collection::Schedule, now()),
            Err(ExtractError::MissingPath { field: "schedule" })
        );
        let skipped = extract_or_skip(&payload, Collection::Schedule, now());
        assert!(skipped.updates.is_empty());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn skipped_payload_logs_one_warning() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let payload = json!({"games": {"sim": {"day": 4}}});
        let skipped = tracing::subscriber::with_default(subscriber, || {
            extract_or_skip(&payload, Collection::Schedule, now())
        });
        assert_eq!(skipped, Extracted::default());

        let bytes = captured.0.lock().expect("log buffer").clone();
        let logs = String::from_utf8(bytes).expect("utf-8 logs");
        let lines: Vec<&str> = logs.lines().collect();
        assert_eq!(lines.len(), 1, "{logs}");
        assert!(lines[0].contains("WARN"));
        assert!(lines[0].contains("skipping payload without required collection"));
        assert!(lines[0].contains("E2002"));
    }

    #[test]
    fn wrong_wrapper_does_not_match() {
        // teams live under `leagues`, not `games`
        let payload = json!({"games": {"teams": [{"id": "t1"}]}});
        assert!(extract(&payload, Collection::Teams, now()).is_err());
    }

    #[test]
    fn non_array_collection_is_rejected() {
        let payload = json!({"schedule": {"id": "g1"}});
        assert_eq!(
            extract(&payload, Collection::Schedule, now()),
            Err(ExtractError::NotAnArray { field: "schedule" })
        );
    }

    #[test]
    fn elements_without_id_are_counted_not_stored() {
        let payload = json!({"schedule": [{"id": "g1"}, {"home": "t1"}, {"id": 5}]});
        let extracted = extract(&payload, Collection::Schedule, now()).expect("extract");
        assert_eq!(extracted.updates.len(), 1);
        assert_eq!(extracted.skipped, 2);
    }
}
