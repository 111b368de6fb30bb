//! Rank-bucketed queue of merge candidates.
//!
//! Candidates pop in `(rank asc, left index asc)` order; the left-index
//! tie-break is what makes equal-rank merges apply leftmost-first. Entries
//! are never removed when they go stale; the merge loop re-validates every
//! candidate against the arena at pop time and discards mismatches.

use std::collections::VecDeque;

use crate::arena::NodeIndex;
use crate::model::TokenId;

/// A proposed merge, captured at push time.
///
/// Everything needed to detect staleness travels with the candidate: the
/// node indices, the tokens observed there, and the arena versions of both
/// slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MergeCandidate {
    pub rank: u32,
    pub left: NodeIndex,
    pub right: NodeIndex,
    pub left_token: TokenId,
    pub right_token: TokenId,
    pub left_version: u64,
    pub right_version: u64,
}

/// FIFO buckets indexed by rank, with a cursor at the lowest non-empty one.
#[derive(Debug, Default)]
pub(crate) struct MergeQueue {
    buckets: Vec<VecDeque<MergeCandidate>>,
    touched: Vec<u32>,
    cursor: usize,
    len: usize,
}

/// Bucket sizes below this use a linear scan to find the insertion point.
const LINEAR_INSERT_LIMIT: usize = 16;

impl MergeQueue {
    /// Creates a queue with one bucket per rank in the merge table.
    pub(crate) fn new(rank_count: usize) -> Self {
        Self {
            buckets: vec![VecDeque::new(); rank_count],
            touched: Vec::new(),
            cursor: 0,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Inserts a candidate, keeping its bucket ordered by left index.
    pub(crate) fn push(&mut self, cand: MergeCandidate) {
        let rank = cand.rank as usize;
        debug_assert!(rank < self.buckets.len(), "rank beyond merge table");
        let bucket = &mut self.buckets[rank];
        if bucket.is_empty() {
            self.touched.push(cand.rank);
        }

        let at = if bucket.len() < LINEAR_INSERT_LIMIT {
            bucket
                .iter()
                .position(|c| c.left >= cand.left)
                .unwrap_or(bucket.len())
        } else {
            bucket.partition_point(|c| c.left < cand.left)
        };
        if at == bucket.len() {
            bucket.push_back(cand);
        } else {
            bucket.insert(at, cand);
        }

        self.len += 1;
        if rank < self.cursor {
            self.cursor = rank;
        }
    }

    /// Removes and returns the minimum candidate under `(rank, left)` order.
    pub(crate) fn pop(&mut self) -> Option<MergeCandidate> {
        if self.len == 0 {
            return None;
        }
        while self.buckets[self.cursor].is_empty() {
            self.cursor += 1;
        }
        let cand = self.buckets[self.cursor].pop_front();
        self.len -= 1;
        cand
    }

    /// Empties the queue without deallocating bucket storage.
    pub(crate) fn reset(&mut self) {
        for rank in self.touched.drain(..) {
            self.buckets[rank as usize].clear();
        }
        self.cursor = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(rank: u32, left: NodeIndex) -> MergeCandidate {
        MergeCandidate {
            rank,
            left,
            right: left + 1,
            left_token: 0,
            right_token: 0,
            left_version: 1,
            right_version: 1,
        }
    }

    #[test]
    fn pops_by_rank_then_left_index() {
        let mut q = MergeQueue::new(4);
        q.push(cand(2, 5));
        q.push(cand(0, 9));
        q.push(cand(0, 3));
        q.push(cand(1, 0));

        let order: Vec<(u32, NodeIndex)> =
            std::iter::from_fn(|| q.pop()).map(|c| (c.rank, c.left)).collect();
        assert_eq!(order, vec![(0, 3), (0, 9), (1, 0), (2, 5)]);
    }

    #[test]
    fn lower_rank_push_rewinds_cursor() {
        let mut q = MergeQueue::new(3);
        q.push(cand(2, 0));
        assert_eq!(q.pop().map(|c| c.rank), Some(2));
        q.push(cand(0, 1));
        assert_eq!(q.pop().map(|c| c.rank), Some(0));
        assert!(q.pop().is_none());
    }

    #[test]
    fn insertion_stays_sorted_past_the_linear_limit() {
        let mut q = MergeQueue::new(1);
        for left in (0..64).rev() {
            q.push(cand(0, left));
        }
        let lefts: Vec<NodeIndex> = std::iter::from_fn(|| q.pop()).map(|c| c.left).collect();
        let mut sorted = lefts.clone();
        sorted.sort_unstable();
        assert_eq!(lefts, sorted);
    }

    #[test]
    fn reset_clears_leftover_candidates() {
        let mut q = MergeQueue::new(2);
        q.push(cand(1, 0));
        q.push(cand(0, 2));
        q.reset();
        assert_eq!(q.len(), 0);
        assert!(q.pop().is_none());
        q.push(cand(1, 7));
        assert_eq!(q.pop().map(|c| c.left), Some(7));
    }
}
