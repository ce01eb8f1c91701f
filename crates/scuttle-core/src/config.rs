//! Host and exchange configuration

use crate::types::ACK_NAMESPACE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Strategy for merging per-participant delta runs into one batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaOrdering {
    /// Round-robin: one delta per participant per round
    Breadth,
    /// Participants with the most pending deltas first, runs kept contiguous
    #[default]
    Depth,
}

/// Unrecognized ordering name
#[derive(Debug, Error)]
#[error("unknown delta ordering: {0} (expected breadth or depth)")]
pub struct ParseOrderingError(String);

impl FromStr for DeltaOrdering {
    type Err = ParseOrderingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "breadth" => Ok(Self::Breadth),
            "depth" => Ok(Self::Depth),
            other => Err(ParseOrderingError(other.to_string())),
        }
    }
}

impl fmt::Display for DeltaOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Breadth => f.write_str("breadth"),
            Self::Depth => f.write_str("depth"),
        }
    }
}

/// Per-namespace history retention for local writes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRetention {
    /// Applies to namespaces without an explicit entry
    pub default: bool,
    /// Explicit per-namespace overrides
    #[serde(default)]
    pub namespaces: HashMap<String, bool>,
}

impl Default for HistoryRetention {
    fn default() -> Self {
        Self {
            default: true,
            namespaces: HashMap::new(),
        }
    }
}

impl HistoryRetention {
    /// Override retention for one namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>, retain: bool) -> Self {
        self.namespaces.insert(namespace.into(), retain);
        self
    }

    /// Whether local writes to `namespace` keep older entries
    pub fn retains(&self, namespace: &str) -> bool {
        if namespace == ACK_NAMESPACE {
            return false;
        }
        self.namespaces
            .get(namespace)
            .copied()
            .unwrap_or(self.default)
    }
}

/// Configuration of a single host
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Delta ordering used when a sink does not override it
    #[serde(default)]
    pub ordering: DeltaOrdering,
    /// History retention of the local store
    #[serde(default)]
    pub retention: HistoryRetention,
    /// Seed for digest shuffling and tie-breaks (entropy when absent)
    #[serde(default)]
    pub seed: Option<u64>,
}

impl HostConfig {
    /// Set the default delta ordering
    pub fn with_ordering(mut self, ordering: DeltaOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Set history retention for local writes
    pub fn with_retention(mut self, retention: HistoryRetention) -> Self {
        self.retention = retention;
        self
    }

    /// Seed the shuffle RNG for reproducible digests and tie-breaks
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Options for `Host::create_source` / `Host::create_sink`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeOptions {
    /// Terminate the channel after one batch; `false` streams batches
    /// delimited by the `done` marker
    pub end: bool,
    /// Overrides the host's ordering for deltas produced by a sink
    pub ordering: Option<DeltaOrdering>,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            end: true,
            ordering: None,
        }
    }
}

impl ExchangeOptions {
    /// Options for a long-lived streaming exchange
    pub fn streaming() -> Self {
        Self {
            end: false,
            ..Self::default()
        }
    }

    /// Override the host's ordering for this endpoint
    pub fn with_ordering(mut self, ordering: DeltaOrdering) -> Self {
        self.ordering = Some(ordering);
        self
    }
}
