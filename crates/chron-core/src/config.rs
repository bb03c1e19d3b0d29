use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CHRON_CONFIG";
/// Environment variable overriding `store.path`.
pub const DATABASE_ENV: &str = "CHRON_DATABASE";

const DEFAULT_API: &str = "https://www.blaseball.com";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub feeds: FeedConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    #[serde(default = "default_teams_url")]
    pub teams_url: String,
    #[serde(default = "default_players_url")]
    pub players_url: String,
    #[serde(default = "default_idols_url")]
    pub idols_url: String,
    #[serde(default = "default_tributes_url")]
    pub tributes_url: String,
    #[serde(default = "default_global_events_url")]
    pub global_events_url: String,
    #[serde(default)]
    pub site_assets: Vec<SiteAsset>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            stream_url: default_stream_url(),
            teams_url: default_teams_url(),
            players_url: default_players_url(),
            idols_url: default_idols_url(),
            tributes_url: default_tributes_url(),
            global_events_url: default_global_events_url(),
            site_assets: Vec::new(),
        }
    }
}

/// A non-JSON site resource archived by the minute poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteAsset {
    /// Natural key, e.g. `/static/js/main.js`.
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_player_chunk_size")]
    pub player_chunk_size: usize,
    #[serde(default = "default_readiness_interval_ms")]
    pub readiness_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            player_chunk_size: default_player_chunk_size(),
            readiness_interval_ms: default_readiness_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// A connection that delivers no bytes for this long is dropped and
    /// redialled.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Longest accepted payload line; longer lines are discarded.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Parse a config file. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_file(path: &Path) -> Result<IngestConfig> {
    if !path.exists() {
        return Ok(IngestConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<IngestConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Where the config is read from when no flag is given.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("chron/config.toml"))
}

/// Resolve the effective config: explicit path, then `CHRON_CONFIG`, then
/// the user config dir, then defaults. `CHRON_DATABASE` overrides the store
/// path afterwards.
///
/// An explicit path must exist; the looked-up locations fall back to
/// defaults when absent.
///
/// # Errors
///
/// Returns an error if the explicit file is missing, or any config file
/// exists but cannot be parsed.
pub fn resolve_config(explicit: Option<&Path>) -> Result<IngestConfig> {
    let mut config = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("config file {} does not exist", path.display());
            }
            load_config_file(path)?
        }
        None => match default_config_path() {
            Some(path) => load_config_file(&path)?,
            None => IngestConfig::default(),
        },
    };
    apply_database_override(&mut config, env::var(DATABASE_ENV).ok());
    Ok(config)
}

fn apply_database_override(config: &mut IngestConfig, database: Option<String>) {
    if let Some(path) = database.filter(|p| !p.trim().is_empty()) {
        config.store.path = PathBuf::from(path);
    }
}

fn default_stream_url() -> String {
    format!("{DEFAULT_API}/events/streamData")
}

fn default_teams_url() -> String {
    format!("{DEFAULT_API}/database/allTeams")
}

fn default_players_url() -> String {
    format!("{DEFAULT_API}/database/players")
}

fn default_idols_url() -> String {
    format!("{DEFAULT_API}/api/getIdols")
}

fn default_tributes_url() -> String {
    format!("{DEFAULT_API}/api/getTribute")
}

fn default_global_events_url() -> String {
    format!("{DEFAULT_API}/database/globalEvents")
}

const fn default_player_chunk_size() -> usize {
    crate::roster::MAX_CHUNK
}

const fn default_readiness_interval_ms() -> u64 {
    1000
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_reconnect_delay_ms() -> u64 {
    1000
}

const fn default_idle_timeout_ms() -> u64 {
    60_000
}

const fn default_max_line_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_store_path() -> PathBuf {
    PathBuf::from("chron.sqlite3")
}
