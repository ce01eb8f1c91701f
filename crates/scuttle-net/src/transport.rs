//! Async drivers that run exchange endpoints over a byte stream
//!
//! Each side splits its connection into two unidirectional typed channels:
//! the source writes digest entries and reads deltas, the sink reads digest
//! entries and writes deltas. Reads and writes on the source proceed
//! concurrently, so neither side can stall the other on a full buffer.

use crate::framing::{FrameError, RecordCodec};
use futures_util::{SinkExt, StreamExt};
use scuttle_core::{Delta, DigestEntry, GossipSink, GossipSource};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::interval;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace};

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Gossip error: {0}")]
    Gossip(#[from] scuttle_core::Error),
    #[error("Streaming source needs a non-zero digest cadence")]
    ZeroCadence,
}

/// Counters of a source connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Digest batches written
    pub batches: u64,
    /// Deltas read from the peer
    pub deltas_received: u64,
    /// Deltas our host accepted
    pub deltas_applied: u64,
}

/// Counters of a sink connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Digest entries read from the peer
    pub digest_entries: u64,
    /// Completed digest batches answered
    pub batches: u64,
    /// Deltas written
    pub deltas_sent: u64,
}

/// Run a source over `io` until the peer closes its side.
///
/// A terminating source writes its single digest, shuts down its write half
/// and applies deltas until end of input. A streaming source writes a fresh
/// digest every `cadence` (the first one immediately) while applying deltas
/// as they arrive. A streaming source with a zero `cadence` is rejected with
/// `TransportError::ZeroCadence` before anything is written.
pub async fn drive_source<T>(
    source: GossipSource,
    io: T,
    cadence: Duration,
) -> Result<SourceStats, TransportError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    if source.is_streaming() && cadence.is_zero() {
        return Err(TransportError::ZeroCadence);
    }

    let (reader, writer) = tokio::io::split(io);
    let mut deltas = FramedRead::new(reader, RecordCodec::<Delta>::new());
    let mut digests = FramedWrite::new(writer, RecordCodec::<DigestEntry>::new());
    let mut stats = SourceStats::default();

    if !source.is_streaming() {
        send_digest(&source, &mut digests).await?;
        digests.close().await?;
        receive_deltas(&source, &mut deltas, &mut stats).await?;
        stats.batches = source.batches();
        return Ok(stats);
    }

    tokio::select! {
        result = emit_digests(&source, &mut digests, cadence) => result?,
        result = receive_deltas(&source, &mut deltas, &mut stats) => result?,
    }

    stats.batches = source.batches();
    debug!(
        host = %source.host().id(),
        batches = stats.batches,
        applied = stats.deltas_applied,
        "source connection closed"
    );
    Ok(stats)
}

/// Run a sink over `io`: answer every completed digest batch with deltas and
/// answer whatever is buffered at end of input, then close the write half.
pub async fn drive_sink<T>(mut sink: GossipSink, io: T) -> Result<SinkStats, TransportError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, writer) = tokio::io::split(io);
    let mut digests = FramedRead::new(reader, RecordCodec::<DigestEntry>::new());
    let mut deltas = FramedWrite::new(writer, RecordCodec::<Delta>::new());
    let mut stats = SinkStats::default();

    while let Some(entry) = digests.next().await {
        stats.digest_entries += 1;
        if let Some(batch) = sink.push(entry?)? {
            stats.batches += 1;
            send_deltas(&mut deltas, batch, &mut stats).await?;
        }
        if sink.is_closed() {
            break;
        }
    }

    if !sink.is_closed() {
        let batch = sink.finish()?;
        if !batch.is_empty() {
            stats.batches += 1;
        }
        send_deltas(&mut deltas, batch, &mut stats).await?;
    }

    deltas.close().await?;
    debug!(
        host = %sink.host().id(),
        entries = stats.digest_entries,
        sent = stats.deltas_sent,
        "sink connection closed"
    );
    Ok(stats)
}

async fn emit_digests<W>(
    source: &GossipSource,
    digests: &mut FramedWrite<W, RecordCodec<DigestEntry>>,
    cadence: Duration,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let mut ticker = interval(cadence);
    loop {
        ticker.tick().await;
        send_digest(source, digests).await?;
    }
}

async fn send_digest<W>(
    source: &GossipSource,
    digests: &mut FramedWrite<W, RecordCodec<DigestEntry>>,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let Some(batch) = source.poll_digest()? else {
        return Ok(());
    };
    trace!(entries = batch.len(), "writing digest batch");
    for entry in batch {
        digests.feed(entry).await?;
    }
    digests.flush().await?;
    Ok(())
}

async fn receive_deltas<R>(
    source: &GossipSource,
    deltas: &mut FramedRead<R, RecordCodec<Delta>>,
    stats: &mut SourceStats,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    while let Some(delta) = deltas.next().await {
        stats.deltas_received += 1;
        if source.receive(delta?)? {
            stats.deltas_applied += 1;
        }
    }
    Ok(())
}

async fn send_deltas<W>(
    deltas: &mut FramedWrite<W, RecordCodec<Delta>>,
    batch: Vec<Delta>,
    stats: &mut SinkStats,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    for delta in batch {
        deltas.feed(delta).await?;
        stats.deltas_sent += 1;
    }
    deltas.flush().await?;
    Ok(())
}
