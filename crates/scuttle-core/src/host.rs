//! Gossip host: local identity plus its view of every participant

use crate::backend::{CompactionReport, MemoryBackend, StateBackend};
use crate::config::{DeltaOrdering, ExchangeOptions, HostConfig};
use crate::error::Result;
use crate::ordering;
use crate::protocol::{GossipSink, GossipSource};
use crate::types::*;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// A participant in the gossip network.
///
/// Owns exactly one `StateBackend` holding its own store and the replicas of
/// every participant it has heard of. Shared with its exchange endpoints
/// through `Arc`.
pub struct Host {
    id: ParticipantId,
    config: HostConfig,
    backend: RwLock<Box<dyn StateBackend>>,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Host {
    /// Create a host backed by the in-memory backend
    pub fn new(id: impl Into<ParticipantId>, config: HostConfig) -> Self {
        let id = id.into();
        let backend = MemoryBackend::new(id.clone(), config.retention.clone());
        Self::with_backend(Box::new(backend), config)
    }

    /// Create a host on top of an existing backend; the host takes the
    /// backend owner's identity
    pub fn with_backend(backend: Box<dyn StateBackend>, config: HostConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            id: backend.owner().clone(),
            config,
            backend: RwLock::new(backend),
            rng: Mutex::new(rng),
        }
    }

    /// Participant id of this host
    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    /// Host configuration
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Read a key of the default namespace from our own store
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.backend.read().get(DEFAULT_NAMESPACE, key)?)
    }

    /// Write a key of the default namespace to our own store
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<Delta> {
        Ok(self
            .backend
            .write()
            .set(DEFAULT_NAMESPACE, key, value.into())?)
    }

    /// Read a key of the default namespace from a participant's replica
    pub fn lookup(&self, participant: &ParticipantId, key: &str) -> Result<Option<Value>> {
        Ok(self
            .backend
            .read()
            .lookup(participant, DEFAULT_NAMESPACE, key)?)
    }

    /// Deltas of a participant's replica newer than `since`
    pub fn history(&self, participant: &ParticipantId, since: u64) -> Result<Vec<Delta>> {
        Ok(self.backend.read().history(participant, since)?)
    }

    /// Every participant this host knows of
    pub fn participants(&self) -> Result<Vec<ParticipantId>> {
        let mut participants: Vec<ParticipantId> = self
            .backend
            .read()
            .digest()?
            .into_iter()
            .map(|entry| entry.participant)
            .collect();
        participants.sort();
        Ok(participants)
    }

    /// Current digest, in uniformly random order
    pub fn digest(&self) -> Result<Vec<DigestEntry>> {
        let mut digest = sorted_digest(&**self.backend.read())?;
        digest.shuffle(&mut *self.rng.lock());
        Ok(digest)
    }

    /// Deltas the sender of `digest` is missing, merged with the configured ordering
    pub fn compute_deltas(&self, digest: &[DigestEntry]) -> Result<Vec<Delta>> {
        self.compute_deltas_with(digest, self.config.ordering)
    }

    /// Deltas the sender of `digest` is missing, merged with `ordering`.
    ///
    /// Participants we have never heard of are registered and skipped. A digest
    /// carrying the `done` marker was truncated by a streaming source, so every
    /// participant it does not mention is offered in full.
    pub fn compute_deltas_with(
        &self,
        digest: &[DigestEntry],
        ordering: DeltaOrdering,
    ) -> Result<Vec<Delta>> {
        let include_unmentioned = digest.iter().any(|entry| entry.done);
        let mut mentioned = HashSet::new();
        let mut runs = Vec::new();

        {
            let mut backend = self.backend.write();
            for entry in digest {
                if !mentioned.insert(entry.participant.clone()) {
                    continue;
                }
                if !backend.knows(&entry.participant)? {
                    continue;
                }
                runs.push(backend.history(&entry.participant, entry.version)?);
            }

            if include_unmentioned {
                for entry in sorted_digest(&**backend)? {
                    if mentioned.contains(&entry.participant) {
                        continue;
                    }
                    runs.push(backend.history(&entry.participant, 0)?);
                }
            }
        }

        runs.retain(|run| !run.is_empty());
        runs.shuffle(&mut *self.rng.lock());
        let deltas = ordering::merge(runs, ordering);

        debug!(
            host = %self.id,
            digest_entries = digest.len(),
            deltas = deltas.len(),
            %ordering,
            "computed deltas"
        );
        Ok(deltas)
    }

    /// Apply a replicated delta; returns whether it was accepted
    pub fn apply_delta(&self, delta: Delta) -> Result<bool> {
        Ok(self.backend.write().apply_delta(delta)?)
    }

    /// Acknowledge observed versions and prune globally obsolete history
    pub fn compact(&self) -> Result<CompactionReport> {
        let report = self.backend.write().compact()?;
        debug!(
            host = %self.id,
            acknowledged = report.acknowledged,
            compacted = report.compacted,
            skipped = report.skipped,
            pruned = report.pruned,
            "compaction finished"
        );
        Ok(report)
    }

    /// Endpoint that emits our digest and applies the deltas sent back
    pub fn create_source(self: &Arc<Self>, options: ExchangeOptions) -> GossipSource {
        GossipSource::new(Arc::clone(self), options)
    }

    /// Endpoint that collects a peer's digest and answers with deltas
    pub fn create_sink(self: &Arc<Self>, options: ExchangeOptions) -> GossipSink {
        GossipSink::new(Arc::clone(self), options)
    }
}

/// Backend digest in participant order, so a seeded shuffle is reproducible
fn sorted_digest(backend: &dyn StateBackend) -> Result<Vec<DigestEntry>> {
    let mut digest = backend.digest()?;
    digest.sort_by(|lhs, rhs| lhs.participant.cmp(&rhs.participant));
    Ok(digest)
}
