//! Delta batch orderings
//!
//! Both orderings take one run of deltas per participant, each run already
//! ascending by version, and keep every run's internal order intact so the
//! receiver's monotonicity check accepts deltas one by one. Callers shuffle
//! the runs beforehand; that order is the tie-break.

use crate::config::DeltaOrdering;
use crate::types::Delta;
use std::collections::VecDeque;

/// Merge per-participant runs into a single batch
pub fn merge(runs: Vec<Vec<Delta>>, ordering: DeltaOrdering) -> Vec<Delta> {
    match ordering {
        DeltaOrdering::Breadth => breadth(runs),
        DeltaOrdering::Depth => depth(runs),
    }
}

/// Round-robin: each round emits the oldest remaining delta of every
/// participant that still has one.
pub fn breadth(runs: Vec<Vec<Delta>>) -> Vec<Delta> {
    let total = runs.iter().map(Vec::len).sum();
    let mut batch = Vec::with_capacity(total);
    let mut queues: Vec<VecDeque<Delta>> = runs
        .into_iter()
        .filter(|run| !run.is_empty())
        .map(VecDeque::from)
        .collect();

    while !queues.is_empty() {
        queues.retain_mut(|queue| {
            if let Some(delta) = queue.pop_front() {
                batch.push(delta);
            }
            !queue.is_empty()
        });
    }

    batch
}

/// Largest runs first, each emitted contiguously. The sort is stable, so runs
/// of equal length keep the caller's (shuffled) order.
pub fn depth(mut runs: Vec<Vec<Delta>>) -> Vec<Delta> {
    runs.sort_by(|lhs, rhs| rhs.len().cmp(&lhs.len()));
    runs.into_iter().flatten().collect()
}
