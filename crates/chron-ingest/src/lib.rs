//! Long-running ingestion workers for chron.
//!
//! Three workers run for the life of the process and write concurrently to
//! one shared [`chron_core::Store`]:
//!
//! - the stream worker, holding a push connection to the event feed
//! - the minute poller (idols, tributes, global events, site assets)
//! - the five-minute poller (teams, then players in chunks), gated on the
//!   first roster the stream delivers
//!
//! Workers never return errors to each other. Each failure is logged with an
//! [`chron_core::error::ErrorCode`] and the worker carries on; only the
//! shared [`shutdown::Shutdown`] signal stops them.

pub mod ingestor;
pub mod lines;
pub mod poll;
pub mod roster;
pub mod shutdown;
pub mod source;
pub mod stream;
pub mod supervisor;

pub use ingestor::Ingestor;
pub use roster::RosterState;
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use source::{FetchError, HttpSource, JsonSource};
pub use stream::PayloadHandler;
pub use supervisor::run_workers;
