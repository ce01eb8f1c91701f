//! Ring convergence and compaction across four hosts

use scuttle_core::*;
use serde_json::json;
use std::sync::Arc;

struct Ring {
    hosts: Vec<Arc<Host>>,
    pipes: Vec<Pipe>,
}

impl Ring {
    /// A -> B -> C -> D -> A, each host's streaming source wired to the next
    /// host's sink
    fn new(config: HostConfig) -> Self {
        Self::build(config, false)
    }

    /// Ring with a second pipe per neighbour pair in the opposite direction
    fn bidirectional(config: HostConfig) -> Self {
        Self::build(config, true)
    }

    fn build(config: HostConfig, both_ways: bool) -> Self {
        let hosts: Vec<Arc<Host>> = ["A", "B", "C", "D"]
            .iter()
            .enumerate()
            .map(|(i, id)| Arc::new(Host::new(*id, config.clone().with_seed(i as u64))))
            .collect();

        let link = |from: &Arc<Host>, to: &Arc<Host>| {
            Pipe::new(
                from.create_source(ExchangeOptions::streaming()),
                to.create_sink(ExchangeOptions::streaming()),
            )
        };

        let count = hosts.len();
        let mut pipes: Vec<Pipe> = (0..count)
            .map(|i| link(&hosts[i], &hosts[(i + 1) % count]))
            .collect();
        if both_ways {
            pipes.extend((0..count).map(|i| link(&hosts[(i + 1) % count], &hosts[i])));
        }

        Self { hosts, pipes }
    }

    fn host(&self, id: &str) -> &Arc<Host> {
        self.hosts
            .iter()
            .find(|host| host.id().as_str() == id)
            .unwrap()
    }

    fn gossip(&mut self, rounds: usize) -> ExchangeStats {
        let mut total = ExchangeStats::default();
        for _ in 0..rounds {
            for pipe in &mut self.pipes {
                total += pipe.round().unwrap();
            }
        }
        total
    }

    fn compact(&self) {
        for host in &self.hosts {
            host.compact().unwrap();
        }
    }

    /// Whether every host holds exactly one entry per fixture key
    fn fully_compacted(&self) -> bool {
        self.hosts.iter().all(|host| {
            EXPECTED
                .iter()
                .all(|(participant, key, _)| retained(host, participant, DEFAULT_NAMESPACE, key) == 1)
        })
    }

    /// Compact, then run single rounds, compacting after each, until the
    /// ring is fully compacted; returns the rounds needed
    fn rounds_until_compacted(&mut self, limit: usize) -> Option<usize> {
        self.compact();
        for round in 1..=limit {
            self.gossip(1);
            self.compact();
            if self.fully_compacted() {
                return Some(round);
            }
        }
        None
    }

    fn write_fixture(&self) {
        self.host("A").set("a", 1).unwrap();
        for n in 1..=2 {
            self.host("B").set("b", n).unwrap();
        }
        for n in 1..=3 {
            self.host("C").set("c", n).unwrap();
        }
        for n in 1..=4 {
            self.host("D").set("d", n).unwrap();
        }
    }
}

fn retained(host: &Host, participant: &str, namespace: &str, key: &str) -> usize {
    host.history(&participant.into(), 0)
        .unwrap()
        .iter()
        .filter(|delta| delta.namespace == namespace && delta.key == key)
        .count()
}

const EXPECTED: [(&str, &str, i64); 4] = [("A", "a", 1), ("B", "b", 2), ("C", "c", 3), ("D", "d", 4)];

#[test]
fn test_ring_converges_depth() {
    let mut ring = Ring::new(HostConfig::default().with_ordering(DeltaOrdering::Depth));
    ring.write_fixture();
    ring.gossip(6);

    for host in &ring.hosts {
        for (participant, key, writes) in EXPECTED {
            assert_eq!(
                host.lookup(&participant.into(), key).unwrap(),
                Some(json!(writes)),
                "{} sees {}",
                host.id(),
                participant
            );
            assert_eq!(retained(host, participant, DEFAULT_NAMESPACE, key), writes as usize);
        }
    }
}

#[test]
fn test_ring_converges_breadth() {
    let mut ring = Ring::new(HostConfig::default().with_ordering(DeltaOrdering::Breadth));
    ring.write_fixture();
    ring.gossip(6);

    for host in &ring.hosts {
        assert_eq!(host.participants().unwrap().len(), 4);
        for (participant, key, writes) in EXPECTED {
            assert_eq!(host.lookup(&participant.into(), key).unwrap(), Some(json!(writes)));
            assert_eq!(retained(host, participant, DEFAULT_NAMESPACE, key), writes as usize);
        }
    }
}

#[test]
fn test_converged_ring_goes_quiet() {
    let mut ring = Ring::new(HostConfig::default());
    ring.write_fixture();
    let first = ring.gossip(6);
    assert_eq!(first.deltas_sent, first.deltas_applied);

    let quiet = ring.gossip(1);
    assert_eq!(quiet.deltas_sent, 0);
    assert_eq!(quiet.digest_entries, 16);
}

fn assert_compacted(ring: &Ring) {
    for host in &ring.hosts {
        let own = host.id().as_str();
        assert_eq!(retained(host, own, ACK_NAMESPACE, own), 1);

        for (participant, key, writes) in EXPECTED {
            assert_eq!(retained(host, participant, DEFAULT_NAMESPACE, key), 1);
            assert_eq!(host.lookup(&participant.into(), key).unwrap(), Some(json!(writes)));
        }
    }
}

#[test]
fn test_compaction_after_convergence() {
    let mut ring = Ring::new(HostConfig::default());
    ring.write_fixture();
    ring.gossip(6);

    // acknowledgments travel against the pipe direction, one hop per pipe
    assert_eq!(ring.rounds_until_compacted(6), Some(3));
    assert_compacted(&ring);
}

#[test]
fn test_bidirectional_ring_converges() {
    let mut ring = Ring::bidirectional(HostConfig::default());
    ring.write_fixture();
    ring.gossip(2);

    for host in &ring.hosts {
        for (participant, key, writes) in EXPECTED {
            assert_eq!(host.lookup(&participant.into(), key).unwrap(), Some(json!(writes)));
            assert_eq!(retained(host, participant, DEFAULT_NAMESPACE, key), writes as usize);
        }
    }
}

#[test]
fn test_bidirectional_compaction_rounds() {
    let mut ring = Ring::bidirectional(HostConfig::default());
    ring.write_fixture();
    ring.gossip(6);

    assert_eq!(ring.rounds_until_compacted(6), Some(2));
    assert_compacted(&ring);
}

#[test]
fn test_compaction_before_acknowledgments_keeps_history() {
    let mut ring = Ring::new(HostConfig::default());
    ring.write_fixture();
    ring.gossip(6);

    // nobody has seen anyone else's acknowledgments yet
    ring.compact();
    for host in &ring.hosts {
        for (participant, key, writes) in EXPECTED {
            assert_eq!(retained(host, participant, DEFAULT_NAMESPACE, key), writes as usize);
        }
    }
}
