//! chron-core library.
//!
//! Entity model, content-addressed merge store and derived projections for
//! the chron ingestion service. Everything here is synchronous; the async
//! workers live in `chron-ingest`.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for store plumbing, `thiserror` enums
//!   for failures callers branch on.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).
//! - **Time**: observation instants are `DateTime<Utc>` in memory and integer
//!   microseconds since the Unix epoch in SQLite.

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod hash;
pub mod model;
pub mod projection;
pub mod roster;
pub mod schedule;
pub mod store;

pub use model::{EntityKind, StoredUpdate, Update};
pub use store::Store;
