//! Scuttle Core Library
//!
//! Scuttlebutt-style anti-entropy reconciliation. Every host keeps a
//! versioned replica of each participant it has heard of, and peers converge
//! by exchanging digests (highest version seen per participant) and the
//! deltas those digests reveal are missing.
//!
//! # Modules
//!
//! - [`types`]: Participants, deltas, digest entries and their wire shapes
//! - [`store`]: Per-participant versioned history
//! - [`backend`]: The `StateBackend` contract and the in-memory backend
//! - [`host`]: Local API, digest and delta computation
//! - [`ordering`]: Breadth and depth delta orderings
//! - [`protocol`]: `GossipSource` / `GossipSink` exchange endpoints
//! - [`pipe`]: In-process wiring of a source to a sink
//! - [`config`]: Host and exchange options
//! - [`error`]: Error types

pub mod backend;
pub mod config;
pub mod error;
pub mod host;
pub mod ordering;
pub mod pipe;
pub mod protocol;
pub mod store;
pub mod types;

pub use backend::{CompactionReport, MemoryBackend, StateBackend};
pub use config::{DeltaOrdering, ExchangeOptions, HistoryRetention, HostConfig};
pub use error::{BackendError, Error, Result};
pub use host::Host;
pub use pipe::{exchange, ExchangeStats, Pipe};
pub use protocol::{GossipSink, GossipSource};
pub use store::VersionedStore;
pub use types::*;
