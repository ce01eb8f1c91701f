//! In-process pipe between a source and a sink

use crate::error::Result;
use crate::protocol::{GossipSink, GossipSource};
use crate::types::Delta;

/// Counters of one exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    /// Digest entries carried source -> sink
    pub digest_entries: usize,
    /// Deltas carried sink -> source
    pub deltas_sent: usize,
    /// Deltas the source's host accepted
    pub deltas_applied: usize,
}

impl std::ops::AddAssign for ExchangeStats {
    fn add_assign(&mut self, other: Self) {
        self.digest_entries += other.digest_entries;
        self.deltas_sent += other.deltas_sent;
        self.deltas_applied += other.deltas_applied;
    }
}

/// Run one exchange: pull a digest batch from `source`, feed it to `sink`
/// and apply every delta the sink produces back through `source`.
///
/// Deltas are applied as soon as the sink emits them. A terminating source
/// closes the sink's input after its batch.
pub fn exchange(source: &GossipSource, sink: &mut GossipSink) -> Result<ExchangeStats> {
    let mut stats = ExchangeStats::default();
    let Some(batch) = source.poll_digest()? else {
        return Ok(stats);
    };

    for entry in batch {
        stats.digest_entries += 1;
        if let Some(deltas) = sink.push(entry)? {
            deliver(source, deltas, &mut stats)?;
        }
    }

    if !source.is_streaming() && !sink.is_closed() {
        let deltas = sink.finish()?;
        deliver(source, deltas, &mut stats)?;
    }

    Ok(stats)
}

fn deliver(
    source: &GossipSource,
    deltas: Vec<Delta>,
    stats: &mut ExchangeStats,
) -> Result<()> {
    for delta in deltas {
        stats.deltas_sent += 1;
        if source.receive(delta)? {
            stats.deltas_applied += 1;
        }
    }
    Ok(())
}

/// A long-lived directed link: one host's source wired to a peer's sink
#[derive(Debug)]
pub struct Pipe {
    source: GossipSource,
    sink: GossipSink,
}

impl Pipe {
    pub fn new(source: GossipSource, sink: GossipSink) -> Self {
        Self { source, sink }
    }

    /// Run one gossip round over this link
    pub fn round(&mut self) -> Result<ExchangeStats> {
        exchange(&self.source, &mut self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExchangeOptions, HostConfig};
    use crate::host::Host;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_one_way_exchange() {
        let a = Arc::new(Host::new("A", HostConfig::default()));
        let b = Arc::new(Host::new("B", HostConfig::default()));
        b.set("b", 1).unwrap();
        b.set("b", 2).unwrap();

        // first contact: A's digest only mentions A, so B registers A and
        // offers nothing until the done marker invites B's other participants
        let source = a.create_source(ExchangeOptions::default());
        let mut sink = b.create_sink(ExchangeOptions::default());
        let stats = exchange(&source, &mut sink).unwrap();
        assert_eq!(stats.digest_entries, 1);
        assert_eq!(stats.deltas_sent, 0);
        assert!(source.poll_digest().unwrap().is_none());

        let mut pipe = Pipe::new(
            a.create_source(ExchangeOptions::streaming()),
            b.create_sink(ExchangeOptions::streaming()),
        );
        let stats = pipe.round().unwrap();
        assert_eq!(stats.deltas_sent, 2);
        assert_eq!(stats.deltas_applied, 2);
        assert_eq!(a.lookup(&"B".into(), "b").unwrap(), Some(json!(2)));

        let stats = pipe.round().unwrap();
        assert_eq!(stats.deltas_sent, 0);
    }
}
