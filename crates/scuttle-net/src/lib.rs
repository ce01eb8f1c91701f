//! Networking for Scuttle gossip exchanges
//!
//! This crate provides:
//! - Length-prefixed JSON framing of digest and delta records
//! - Async drivers running a `GossipSource` or `GossipSink` over any
//!   `AsyncRead + AsyncWrite` connection

pub mod framing;
pub mod transport;

pub use framing::{FrameError, RecordCodec, MAX_FRAME_SIZE};
pub use transport::{drive_sink, drive_source, SinkStats, SourceStats, TransportError};
