//! Exchange endpoints
//!
//! A `GossipSource` emits its host's digest and applies deltas written back
//! to it. A `GossipSink` collects a peer's digest and answers with the deltas
//! that peer is missing. Piping host A's source into host B's sink, and the
//! sink's output back into the source, is one directed gossip exchange.

use crate::config::ExchangeOptions;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::types::{Delta, DigestEntry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Digest-out / delta-in endpoint
#[derive(Debug)]
pub struct GossipSource {
    host: Arc<Host>,
    options: ExchangeOptions,
    emitted: AtomicU64,
}

impl GossipSource {
    pub(crate) fn new(host: Arc<Host>, options: ExchangeOptions) -> Self {
        Self {
            host,
            options,
            emitted: AtomicU64::new(0),
        }
    }

    /// Host this source gossips for
    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    /// Whether batches are delimited by the `done` marker instead of end-of-output
    pub fn is_streaming(&self) -> bool {
        !self.options.end
    }

    /// Next digest batch.
    ///
    /// A terminating source yields exactly one batch and then `None`. A
    /// streaming source yields a fresh batch on every call with its last entry
    /// marked `done`.
    pub fn poll_digest(&self) -> Result<Option<Vec<DigestEntry>>> {
        if self.options.end && self.batches() > 0 {
            return Ok(None);
        }

        let mut batch = self.host.digest()?;
        if !self.options.end {
            if let Some(last) = batch.last_mut() {
                last.done = true;
            }
        }
        self.emitted.fetch_add(1, Ordering::Relaxed);

        trace!(host = %self.host.id(), entries = batch.len(), "emitting digest");
        Ok(Some(batch))
    }

    /// Digest batches emitted so far
    pub fn batches(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Apply a delta sent back by the peer, in arrival order
    pub fn receive(&self, delta: Delta) -> Result<bool> {
        self.host.apply_delta(delta)
    }
}

/// Digest-in / delta-out endpoint
#[derive(Debug)]
pub struct GossipSink {
    host: Arc<Host>,
    options: ExchangeOptions,
    buffer: Vec<DigestEntry>,
    closed: bool,
}

impl GossipSink {
    pub(crate) fn new(host: Arc<Host>, options: ExchangeOptions) -> Self {
        Self {
            host,
            options,
            buffer: Vec::new(),
            closed: false,
        }
    }

    /// Host answering through this sink
    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    /// Whether the sink has seen the end of its input
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Buffer one digest entry.
    ///
    /// Returns the deltas for the batch once an entry marked `done` completes
    /// it. On a terminating sink that entry also ends the input.
    pub fn push(&mut self, entry: DigestEntry) -> Result<Option<Vec<Delta>>> {
        if self.closed {
            return Err(Error::SinkClosed);
        }

        let done = entry.done;
        self.buffer.push(entry);
        if !done {
            return Ok(None);
        }

        if self.options.end {
            self.closed = true;
        }
        self.flush().map(Some)
    }

    /// End of input: answer whatever digest is still buffered
    pub fn finish(&mut self) -> Result<Vec<Delta>> {
        self.closed = true;
        if self.buffer.is_empty() {
            return Ok(Vec::new());
        }
        self.flush()
    }

    fn flush(&mut self) -> Result<Vec<Delta>> {
        let digest = std::mem::take(&mut self.buffer);
        let ordering = self.options.ordering.unwrap_or(self.host.config().ordering);
        self.host.compute_deltas_with(&digest, ordering)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;

    fn host(id: &str) -> Arc<Host> {
        Arc::new(Host::new(id, HostConfig::default().with_seed(1)))
    }

    #[test]
    fn test_terminating_source_emits_once() {
        let a = host("A");
        let source = a.create_source(ExchangeOptions::default());

        let batch = source.poll_digest().unwrap().unwrap();
        assert_eq!(batch, vec![DigestEntry::new("A", 0)]);
        assert!(source.poll_digest().unwrap().is_none());
    }

    #[test]
    fn test_streaming_source_marks_last_entry() {
        let a = host("A");
        a.set("x", 1).unwrap();
        a.compute_deltas(&[DigestEntry::new("B", 0)]).unwrap();

        let source = a.create_source(ExchangeOptions::streaming());
        assert!(source.is_streaming());
        for _ in 0..3 {
            let batch = source.poll_digest().unwrap().unwrap();
            assert_eq!(batch.len(), 2);
            assert!(!batch[0].done);
            assert!(batch[1].done);
        }
        assert_eq!(source.batches(), 3);
    }

    #[test]
    fn test_streaming_sink_flushes_on_done() {
        let b = host("B");
        b.set("b", 1).unwrap();
        let mut sink = b.create_sink(ExchangeOptions::streaming());

        assert!(sink.push(DigestEntry::new("A", 0)).unwrap().is_none());
        let mut last = DigestEntry::new("B", 0);
        last.done = true;
        let deltas = sink.push(last.clone()).unwrap().unwrap();
        assert_eq!(deltas.len(), 1);
        assert!(!sink.is_closed());

        // buffer was cleared, the next round computes from scratch
        let again = sink.push(last).unwrap().unwrap();
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn test_terminating_sink_flushes_at_end_of_input() {
        let b = host("B");
        b.set("b", 1).unwrap();
        b.set("b", 2).unwrap();
        let mut sink = b.create_sink(ExchangeOptions::default());

        assert!(sink.push(DigestEntry::new("B", 1)).unwrap().is_none());
        let deltas = sink.finish().unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].version, 2);

        assert!(sink.is_closed());
        assert!(matches!(
            sink.push(DigestEntry::new("B", 0)),
            Err(Error::SinkClosed)
        ));
    }

    #[test]
    fn test_terminating_sink_closes_on_done() {
        let b = host("B");
        b.set("b", 1).unwrap();
        let mut sink = b.create_sink(ExchangeOptions::default());

        let mut last = DigestEntry::new("B", 0);
        last.done = true;
        assert_eq!(sink.push(last).unwrap().unwrap().len(), 1);
        assert!(sink.is_closed());
        assert!(sink.finish().unwrap().is_empty());
    }

    #[test]
    fn test_source_applies_received_deltas() {
        let a = host("A");
        let b = host("B");
        let delta = b.set("b", "x").unwrap();

        let source = a.create_source(ExchangeOptions::default());
        assert!(source.receive(delta.clone()).unwrap());
        assert!(!source.receive(delta).unwrap());
        assert_eq!(
            a.lookup(&"B".into(), "b").unwrap(),
            Some(serde_json::json!("x"))
        );
    }
}
