//! gossipd - Scuttlebutt anti-entropy gossip daemon
//!
//! This daemon provides:
//! - A local participant whose writes replicate to every reachable peer
//! - Inbound gossip sessions answered with the deltas a peer is missing
//! - Outbound sessions to configured peers with reconnect backoff
//! - Periodic acknowledgment-driven history compaction

pub mod config;
pub mod server;
pub mod sync;

pub use config::Config;
pub use server::{Server, ServerError, ServerStats};
pub use sync::{SyncManager, SyncStats};
