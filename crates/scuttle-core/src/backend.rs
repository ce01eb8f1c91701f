//! State backends: one replica store per known participant

use crate::config::HistoryRetention;
use crate::error::BackendError;
use crate::store::VersionedStore;
use crate::types::*;
use std::collections::HashMap;
use tracing::debug;

/// Outcome of one compaction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Acknowledgments written to the reserved namespace
    pub acknowledged: usize,
    /// Participants whose history was compacted
    pub compacted: usize,
    /// Participants skipped because some peer has not acknowledged them yet
    pub skipped: usize,
    /// History entries removed
    pub pruned: usize,
}

/// Storage contract a `Host` depends on.
///
/// Implementations hold the owner's own store plus a replica of every other
/// participant learned through gossip. Participants are registered lazily
/// and never removed.
pub trait StateBackend: Send + Sync {
    /// Participant owning this backend
    fn owner(&self) -> &ParticipantId;

    /// One entry per known participant with its highest accepted version
    fn digest(&self) -> Result<Vec<DigestEntry>, BackendError>;

    /// Whether `participant` is known; registers it when it is not
    fn knows(&mut self, participant: &ParticipantId) -> Result<bool, BackendError>;

    /// Deltas of `participant` newer than `since`, ascending by version
    fn history(&self, participant: &ParticipantId, since: u64) -> Result<Vec<Delta>, BackendError>;

    /// Newest value of a key in the owner's store
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, BackendError>;

    /// Newest value of a key in any participant's replica
    fn lookup(
        &self,
        participant: &ParticipantId,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Value>, BackendError>;

    /// Local write to the owner's store
    fn set(&mut self, namespace: &str, key: &str, value: Value) -> Result<Delta, BackendError>;

    /// Apply a replicated delta; returns whether it was accepted
    fn apply_delta(&mut self, delta: Delta) -> Result<bool, BackendError>;

    /// Acknowledge observed versions and prune history every participant has seen
    fn compact(&mut self) -> Result<CompactionReport, BackendError>;
}

/// In-memory reference backend
#[derive(Debug)]
pub struct MemoryBackend {
    owner: ParticipantId,
    retention: HistoryRetention,
    stores: HashMap<ParticipantId, VersionedStore>,
}

impl MemoryBackend {
    /// Create a backend holding only the owner's empty store
    pub fn new(owner: ParticipantId, retention: HistoryRetention) -> Self {
        let mut stores = HashMap::new();
        stores.insert(
            owner.clone(),
            VersionedStore::new(owner.clone(), retention.clone()),
        );

        Self {
            owner,
            retention,
            stores,
        }
    }

    /// Replica store of a participant, if known
    pub fn store(&self, participant: &ParticipantId) -> Option<&VersionedStore> {
        self.stores.get(participant)
    }

    fn store_mut(&mut self, participant: &ParticipantId) -> &mut VersionedStore {
        let retention = &self.retention;
        self.stores
            .entry(participant.clone())
            .or_insert_with(|| VersionedStore::new(participant.clone(), retention.clone()))
    }

    fn own_store_mut(&mut self) -> &mut VersionedStore {
        let owner = self.owner.clone();
        self.store_mut(&owner)
    }

    /// Lowest acknowledged version of `participant` across every known store
    fn acknowledged_floor(&self, participant: &ParticipantId) -> Option<u64> {
        self.stores.values().try_fold(u64::MAX, |floor, store| {
            store
                .get(ACK_NAMESPACE, participant.as_str())
                .and_then(Value::as_u64)
                .map(|version| floor.min(version))
        })
    }
}

impl StateBackend for MemoryBackend {
    fn owner(&self) -> &ParticipantId {
        &self.owner
    }

    fn digest(&self) -> Result<Vec<DigestEntry>, BackendError> {
        Ok(self
            .stores
            .values()
            .map(|store| DigestEntry::new(store.participant().clone(), store.max_version()))
            .collect())
    }

    fn knows(&mut self, participant: &ParticipantId) -> Result<bool, BackendError> {
        if self.stores.contains_key(participant) {
            return Ok(true);
        }
        self.store_mut(participant);
        Ok(false)
    }

    fn history(&self, participant: &ParticipantId, since: u64) -> Result<Vec<Delta>, BackendError> {
        Ok(self
            .stores
            .get(participant)
            .map(|store| store.history(since))
            .unwrap_or_default())
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, BackendError> {
        self.lookup(&self.owner, namespace, key)
    }

    fn lookup(
        &self,
        participant: &ParticipantId,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Value>, BackendError> {
        Ok(self
            .stores
            .get(participant)
            .and_then(|store| store.get(namespace, key))
            .cloned())
    }

    fn set(&mut self, namespace: &str, key: &str, value: Value) -> Result<Delta, BackendError> {
        Ok(self.own_store_mut().set(namespace, key, value))
    }

    fn apply_delta(&mut self, delta: Delta) -> Result<bool, BackendError> {
        let participant = delta.participant.clone();
        Ok(self.store_mut(&participant).apply_delta(delta))
    }

    fn compact(&mut self) -> Result<CompactionReport, BackendError> {
        let mut report = CompactionReport::default();
        let mut participants: Vec<ParticipantId> = self.stores.keys().cloned().collect();
        participants.sort();

        for participant in &participants {
            let observed = self.stores[participant].max_version();
            let own = self.own_store_mut();
            let recorded = own
                .get(ACK_NAMESPACE, participant.as_str())
                .and_then(Value::as_u64);
            if recorded.map_or(true, |recorded| observed > recorded) {
                own.set(ACK_NAMESPACE, participant.as_str(), Value::from(observed));
                report.acknowledged += 1;
            }
        }

        for participant in &participants {
            let Some(floor) = self.acknowledged_floor(participant) else {
                report.skipped += 1;
                continue;
            };
            let pruned = self.store_mut(participant).compact(floor);
            debug!(%participant, floor, pruned, "compacted replica history");
            report.compacted += 1;
            report.pruned += pruned;
        }

        Ok(report)
    }
}
