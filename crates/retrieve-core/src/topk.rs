//! Canonical bounded top-k selection.
//!
//! The source system's scoring code mixed `(score, id)` and `(id, score)`
//! tuples across its heap call sites, so the comparison operator sometimes
//! ordered by id and sometimes by score depending on which field landed
//! first in the tuple. [`ScoredId`] exists so every retriever in this crate
//! goes through one named type with one `Ord` impl instead of re-deriving
//! tuple ordering at each call site.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A single scored candidate, used by both the text and image retrievers.
///
/// Ordering: higher `score` wins; ties break on `id` so that the docId (or
/// imageId) comparing smaller lexicographically wins, for determinism.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub score: f32,
    pub id: String,
}

impl Eq for ScoredId {}

impl Ord for ScoredId {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.score.partial_cmp(&other.score) {
            Some(Ordering::Equal) | None => other.id.cmp(&self.id),
            Some(ord) => ord,
        }
    }
}

impl PartialOrd for ScoredId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Wrapper reversing [`ScoredId`]'s ordering, so a `BinaryHeap<MinHeapEntry>`
/// behaves as a min-heap over score (with the worst candidate on top,
/// ready to be evicted when a better one arrives).
#[derive(Debug, Clone, PartialEq, Eq)]
struct MinHeapEntry(ScoredId);

impl Ord for MinHeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

impl PartialOrd for MinHeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded top-k accumulator: holds at most `k` candidates, evicting the
/// worst one whenever a better candidate arrives.
pub struct TopK {
    k: usize,
    heap: BinaryHeap<MinHeapEntry>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.min(1024)),
        }
    }

    /// Offer a candidate. If the heap isn't full, or this candidate beats
    /// the current worst, it's admitted (evicting the worst if at capacity).
    pub fn push(&mut self, candidate: ScoredId) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(MinHeapEntry(candidate));
        } else if let Some(worst) = self.heap.peek() {
            if candidate > worst.0 {
                self.heap.pop();
                self.heap.push(MinHeapEntry(candidate));
            }
        }
    }

    /// Drain into a score-descending (then id-ascending) vector.
    pub fn into_sorted_vec(self) -> Vec<ScoredId> {
        let mut v: Vec<ScoredId> = self.heap.into_iter().map(|e| e.0).collect();
        v.sort_by(|a, b| b.cmp(a));
        v
    }
}
