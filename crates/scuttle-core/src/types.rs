//! Core replication types
//!
//! `Delta` and `DigestEntry` serialize to the compact wire shapes exchanged
//! between peers:
//!
//! - DigestEntry: `{"r": id, "n": version, "done"?: true}`
//! - Delta: `{"r": id, "k": [namespace, key], "v": value, "n": version}`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Application values carried by deltas
pub type Value = serde_json::Value;

/// Namespace used by `Host::get` / `Host::set`
pub const DEFAULT_NAMESPACE: &str = "~";

/// Reserved namespace holding compaction acknowledgments.
///
/// Keys are participant ids, values are the highest version of that
/// participant the writer has observed. Never read by application code.
pub const ACK_NAMESPACE: &str = "$";

/// Identity of a participant producing its own versioned writes
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Create from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One historical write of a participant; the unit of replication
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireDelta", into = "WireDelta")]
pub struct Delta {
    /// Writing participant
    pub participant: ParticipantId,
    /// Namespace of the key
    pub namespace: String,
    /// Key within the namespace
    pub key: String,
    /// Written value
    pub value: Value,
    /// Version local to `participant`
    pub version: u64,
}

/// Highest version the sender has observed for one participant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireDigestEntry", into = "WireDigestEntry")]
pub struct DigestEntry {
    /// Participant summarized by this entry
    pub participant: ParticipantId,
    /// Highest version observed for `participant`
    pub version: u64,
    /// Marks the last entry of a streamed batch
    pub done: bool,
}

impl DigestEntry {
    /// Create an entry without the batch marker
    pub fn new(participant: impl Into<ParticipantId>, version: u64) -> Self {
        Self {
            participant: participant.into(),
            version,
            done: false,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireDelta {
    r: ParticipantId,
    k: (String, String),
    v: Value,
    n: u64,
}

impl From<WireDelta> for Delta {
    fn from(wire: WireDelta) -> Self {
        let (namespace, key) = wire.k;
        Self {
            participant: wire.r,
            namespace,
            key,
            value: wire.v,
            version: wire.n,
        }
    }
}

impl From<Delta> for WireDelta {
    fn from(delta: Delta) -> Self {
        Self {
            r: delta.participant,
            k: (delta.namespace, delta.key),
            v: delta.value,
            n: delta.version,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireDigestEntry {
    r: ParticipantId,
    n: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    done: Option<bool>,
}

impl From<WireDigestEntry> for DigestEntry {
    fn from(wire: WireDigestEntry) -> Self {
        Self {
            participant: wire.r,
            version: wire.n,
            done: wire.done.unwrap_or(false),
        }
    }
}

impl From<DigestEntry> for WireDigestEntry {
    fn from(entry: DigestEntry) -> Self {
        Self {
            r: entry.participant,
            n: entry.version,
            done: entry.done.then_some(true),
        }
    }
}
