//! Per-participant versioned history

use crate::config::HistoryRetention;
use crate::types::*;
use std::collections::{HashMap, VecDeque};

/// Append-ordered history of one participant's writes.
///
/// Each `(namespace, key)` maps to its deltas newest-first, so the front of
/// the list always carries the current value and the highest version written
/// to that key.
#[derive(Debug, Clone)]
pub struct VersionedStore {
    participant: ParticipantId,
    max_version: u64,
    namespaces: HashMap<String, HashMap<String, VecDeque<Delta>>>,
    retention: HistoryRetention,
}

impl VersionedStore {
    /// Create an empty store for `participant`
    pub fn new(participant: ParticipantId, retention: HistoryRetention) -> Self {
        Self {
            participant,
            max_version: 0,
            namespaces: HashMap::new(),
            retention,
        }
    }

    /// Participant whose writes this store holds
    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    /// Highest version ever accepted
    pub fn max_version(&self) -> u64 {
        self.max_version
    }

    /// Value of the newest entry for a key
    pub fn get(&self, namespace: &str, key: &str) -> Option<&Value> {
        self.namespaces
            .get(namespace)?
            .get(key)?
            .front()
            .map(|delta| &delta.value)
    }

    /// Record a local write under the next version
    pub fn set(&mut self, namespace: &str, key: &str, value: Value) -> Delta {
        self.max_version += 1;
        let delta = Delta {
            participant: self.participant.clone(),
            namespace: namespace.to_string(),
            key: key.to_string(),
            value,
            version: self.max_version,
        };

        let retain = self.retention.retains(namespace);
        let history = self
            .namespaces
            .entry(delta.namespace.clone())
            .or_default()
            .entry(delta.key.clone())
            .or_default();
        if !retain {
            history.clear();
        }
        history.push_front(delta.clone());

        delta
    }

    /// Accept a replicated delta if it is strictly newer than anything seen.
    ///
    /// Returns whether the delta was applied. Stale, duplicate and misaddressed
    /// deltas are ignored.
    pub fn apply_delta(&mut self, delta: Delta) -> bool {
        if delta.participant != self.participant || delta.version <= self.max_version {
            return false;
        }

        self.max_version = delta.version;
        self.namespaces
            .entry(delta.namespace.clone())
            .or_default()
            .entry(delta.key.clone())
            .or_default()
            .push_front(delta);

        true
    }

    /// All entries newer than `since`, ascending by version
    pub fn history(&self, since: u64) -> Vec<Delta> {
        let mut history: Vec<Delta> = self
            .namespaces
            .values()
            .flat_map(|keys| keys.values())
            .flat_map(|entries| entries.iter().take_while(|delta| delta.version > since))
            .cloned()
            .collect();
        history.sort_by_key(|delta| delta.version);
        history
    }

    /// Drop entries older than `until`, always keeping each key's newest entry.
    ///
    /// Returns the number of entries removed.
    pub fn compact(&mut self, until: u64) -> usize {
        let mut pruned = 0;
        for entries in self.namespaces.values_mut().flat_map(|keys| keys.values_mut()) {
            let keep = entries
                .iter()
                .skip(1)
                .take_while(|delta| delta.version >= until)
                .count()
                + 1;
            if entries.len() > keep {
                pruned += entries.len() - keep;
                entries.truncate(keep);
            }
        }
        pruned
    }

    /// Number of retained entries for a key
    pub fn history_len(&self, namespace: &str, key: &str) -> usize {
        self.namespaces
            .get(namespace)
            .and_then(|keys| keys.get(key))
            .map_or(0, VecDeque::len)
    }
}
