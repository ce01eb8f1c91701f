//! Per-peer anti-entropy session tracking

use parking_lot::RwLock;
use scuttle_net::{SinkStats, SourceStats};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Longest wait between reconnect attempts
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Gossip state for one configured peer
#[derive(Debug, Clone, Default)]
pub struct PeerSyncState {
    /// Whether a session is currently open
    pub connected: bool,
    /// End of the last session, successful or not
    pub last_sync: Option<Instant>,
    /// Completed sessions
    pub sync_count: u64,
    /// Consecutive failures
    pub failures: u32,
    /// Digest batches written to this peer
    pub batches: u64,
    /// Deltas from this peer our host accepted
    pub deltas_applied: u64,
}

/// Tracks outbound sessions to configured peers and inbound sessions served
#[derive(Debug)]
pub struct SyncManager {
    peers: RwLock<HashMap<SocketAddr, PeerSyncState>>,
    served: RwLock<SinkStats>,
    /// Base reconnect delay
    interval: Duration,
}

impl SyncManager {
    pub fn new(interval: Duration) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            served: RwLock::new(SinkStats::default()),
            interval,
        }
    }

    /// Register a peer for synchronization
    pub fn register_peer(&self, addr: SocketAddr) {
        self.peers.write().entry(addr).or_default();
    }

    /// A session to `addr` was established
    pub fn mark_connected(&self, addr: SocketAddr) {
        let mut peers = self.peers.write();
        let state = peers.entry(addr).or_default();
        state.connected = true;
        state.failures = 0;
    }

    /// A session to `addr` ended cleanly
    pub fn record_session(&self, addr: SocketAddr, stats: SourceStats) {
        let mut peers = self.peers.write();
        let state = peers.entry(addr).or_default();
        state.connected = false;
        state.last_sync = Some(Instant::now());
        state.sync_count += 1;
        state.batches += stats.batches;
        state.deltas_applied += stats.deltas_applied;
    }

    /// Mark peer sync as failed
    pub fn mark_failure(&self, addr: SocketAddr) {
        let mut peers = self.peers.write();
        let state = peers.entry(addr).or_default();
        state.connected = false;
        state.last_sync = Some(Instant::now());
        state.failures += 1;
    }

    /// Delay before the next connection attempt to `addr`.
    ///
    /// Doubles with each consecutive failure, capped at `MAX_BACKOFF`.
    pub fn backoff(&self, addr: &SocketAddr) -> Duration {
        let failures = self
            .peers
            .read()
            .get(addr)
            .map(|state| state.failures)
            .unwrap_or(0);
        let factor = 1u32 << failures.saturating_sub(1).min(6);
        self.interval.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Add counters of a finished inbound session
    pub fn record_served(&self, stats: SinkStats) {
        let mut served = self.served.write();
        served.digest_entries += stats.digest_entries;
        served.batches += stats.batches;
        served.deltas_sent += stats.deltas_sent;
    }

    /// Snapshot of one peer's state
    pub fn peer(&self, addr: &SocketAddr) -> Option<PeerSyncState> {
        self.peers.read().get(addr).cloned()
    }

    /// Get sync statistics
    pub fn stats(&self) -> SyncStats {
        let peers = self.peers.read();
        let served = self.served.read();
        SyncStats {
            peer_count: peers.len(),
            connected: peers.values().filter(|s| s.connected).count(),
            total_syncs: peers.values().map(|s| s.sync_count).sum(),
            deltas_applied: peers.values().map(|s| s.deltas_applied).sum(),
            deltas_served: served.deltas_sent,
        }
    }
}

/// Sync statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub peer_count: usize,
    pub connected: usize,
    pub total_syncs: u64,
    pub deltas_applied: u64,
    pub deltas_served: u64,
}
