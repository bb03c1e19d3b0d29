//! Entity kinds and the shared `{identity, payload, firstSeen, lastSeen}`
//! record shape.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hash::content_hash;

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// Kind tag for every event-derived record held by the merge store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A whole payload delivered by the push feed.
    Stream,
    Game,
    Team,
    Player,
    Idols,
    Tributes,
    GlobalEvents,
    /// Script, stylesheet or page fetched from the simulation's site.
    SiteAsset,
}

impl EntityKind {
    pub const ALL: [Self; 8] = [
        Self::Stream,
        Self::Game,
        Self::Team,
        Self::Player,
        Self::Idols,
        Self::Tributes,
        Self::GlobalEvents,
        Self::SiteAsset,
    ];

    /// Value stored in the `kind` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Game => "game",
            Self::Team => "team",
            Self::Player => "player",
            Self::Idols => "idols",
            Self::Tributes => "tributes",
            Self::GlobalEvents => "global_events",
            Self::SiteAsset => "site_asset",
        }
    }

    /// Whether records of this kind carry a natural key in `entity_id`.
    #[must_use]
    pub const fn has_natural_key(self) -> bool {
        matches!(self, Self::Game | Self::Team | Self::Player | Self::SiteAsset)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity kind '{0}'")]
pub struct UnknownKind(pub String);

impl FromStr for EntityKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// One observation of a payload, ready to be merged.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub kind: EntityKind,
    /// Content hash of `payload`; the dedup key.
    pub hash: String,
    /// Natural key (game/team/player id, asset path). Not unique.
    pub entity_id: Option<String>,
    pub payload: Value,
    pub observed_at: DateTime<Utc>,
}

impl Update {
    /// Build an update, hashing the payload.
    #[must_use]
    pub fn new(
        kind: EntityKind,
        entity_id: Option<String>,
        payload: Value,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            hash: content_hash(&payload),
            entity_id,
            payload,
            observed_at,
        }
    }

    /// Build an update whose natural key is the payload's `id` field.
    ///
    /// Returns `None` when the payload has no string `id`.
    #[must_use]
    pub fn keyed_by_id(
        kind: EntityKind,
        payload: Value,
        observed_at: DateTime<Utc>,
    ) -> Option<Self> {
        let id = payload.get("id")?.as_str()?.to_string();
        Some(Self::new(kind, Some(id), payload, observed_at))
    }
}

// ---------------------------------------------------------------------------
// StoredUpdate
// ---------------------------------------------------------------------------

/// A record as held by the merge store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredUpdate {
    pub kind: EntityKind,
    pub hash: String,
    pub entity_id: Option<String>,
    pub payload: Value,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}
