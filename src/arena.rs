//! Flat arena backing the merge engine's doubly linked token list.
//!
//! Nodes live in parallel vectors addressed by plain `u32` indices; list
//! ends use the [`NONE`] sentinel. Each slot carries a version stamp drawn
//! from a monotonic generation counter: a merge bumps the surviving slot to
//! a fresh generation and zeroes the absorbed one, so any queued candidate
//! that captured the old versions is detectably stale. Retired slots are
//! never reused within a pass; the backing storage is reused across passes
//! without reallocating.

use crate::model::{BpeModel, TokenId};
use crate::queue::MergeCandidate;

/// Index of a node in the arena.
pub(crate) type NodeIndex = u32;

/// Sentinel for "no node": list ends and retired pointers.
pub(crate) const NONE: NodeIndex = NodeIndex::MAX;

#[derive(Debug, Default)]
pub(crate) struct Arena {
    tokens: Vec<TokenId>,
    prev: Vec<NodeIndex>,
    next: Vec<NodeIndex>,
    live: Vec<u64>,
    byte_len: Vec<u32>,
    head: NodeIndex,
    tail: NodeIndex,
    generation: u64,
}

impl Arena {
    pub(crate) fn new() -> Self {
        Self {
            head: NONE,
            tail: NONE,
            ..Self::default()
        }
    }

    /// Rebuilds the list as one node per input byte, reusing storage.
    ///
    /// Every node is stamped with a fresh generation, so candidates left
    /// over from a previous pass can never validate against the new list.
    pub(crate) fn reset_from_bytes(&mut self, model: &BpeModel, input: &[u8]) {
        self.tokens.clear();
        self.prev.clear();
        self.next.clear();
        self.live.clear();
        self.byte_len.clear();

        let n = input.len();
        if n == 0 {
            self.head = NONE;
            self.tail = NONE;
            return;
        }
        assert!(n < NONE as usize, "input too large for u32 node indices");

        self.generation += 1;
        let generation = self.generation;
        self.tokens.reserve(n);
        for (i, &b) in input.iter().enumerate() {
            self.tokens.push(model.byte_token(b));
            self.prev.push(if i == 0 { NONE } else { (i - 1) as NodeIndex });
            self.next
                .push(if i == n - 1 { NONE } else { (i + 1) as NodeIndex });
            self.live.push(generation);
            self.byte_len.push(1);
        }
        self.head = 0;
        self.tail = (n - 1) as NodeIndex;
    }

    pub(crate) fn head(&self) -> NodeIndex {
        self.head
    }

    #[inline]
    pub(crate) fn token(&self, i: NodeIndex) -> TokenId {
        self.tokens[i as usize]
    }

    #[inline]
    pub(crate) fn next(&self, i: NodeIndex) -> NodeIndex {
        self.next[i as usize]
    }

    #[inline]
    pub(crate) fn prev(&self, i: NodeIndex) -> NodeIndex {
        self.prev[i as usize]
    }

    #[inline]
    pub(crate) fn version(&self, i: NodeIndex) -> u64 {
        self.live[i as usize]
    }

    #[inline]
    pub(crate) fn byte_len(&self, i: NodeIndex) -> u32 {
        self.byte_len[i as usize]
    }

    /// Checks that a queued candidate still describes the current list:
    /// both slots unchanged since capture, still adjacent, same tokens.
    pub(crate) fn candidate_is_current(&self, c: &MergeCandidate) -> bool {
        let (i, j) = (c.left as usize, c.right as usize);
        if i >= self.tokens.len() || j >= self.tokens.len() {
            return false;
        }
        if self.live[i] == 0 || self.live[j] == 0 {
            return false;
        }
        if self.live[i] != c.left_version || self.live[j] != c.right_version {
            return false;
        }
        if self.next[i] != c.right || self.prev[j] != c.left {
            return false;
        }
        self.tokens[i] == c.left_token && self.tokens[j] == c.right_token
    }

    /// Collapses `right` into `left`, which becomes `merged`.
    ///
    /// The right slot is retired (`live = 0`, pointers cleared) and the left
    /// slot is stamped with a fresh generation, invalidating every
    /// outstanding candidate that references either.
    pub(crate) fn merge(&mut self, left: NodeIndex, right: NodeIndex, merged: TokenId) {
        let (i, j) = (left as usize, right as usize);
        debug_assert_eq!(self.next[i], right);
        debug_assert_eq!(self.prev[j], left);

        self.tokens[i] = merged;
        self.byte_len[i] += self.byte_len[j];

        let after = self.next[j];
        self.next[i] = after;
        if after != NONE {
            self.prev[after as usize] = left;
        }

        self.prev[j] = NONE;
        self.next[j] = NONE;
        self.live[j] = 0;

        self.generation += 1;
        self.live[i] = self.generation;

        if self.tail == right {
            self.tail = left;
        }
    }

    /// Appends the tokens of the live list to `out`, head to tail.
    pub(crate) fn collect_into(&self, out: &mut Vec<TokenId>) {
        let mut i = self.head;
        while i != NONE {
            out.push(self.tokens[i as usize]);
            i = self.next[i as usize];
        }
    }

    /// Total byte length of the live list.
    pub(crate) fn total_byte_len(&self) -> usize {
        let mut total = 0usize;
        let mut i = self.head;
        while i != NONE {
            total += self.byte_len[i as usize] as usize;
            i = self.next[i as usize];
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::byte_model;

    #[test]
    fn reset_builds_a_chain() {
        let model = byte_model();
        let mut arena = Arena::new();
        arena.reset_from_bytes(&model, b"abc");

        assert_eq!(arena.head(), 0);
        assert_eq!(arena.next(0), 1);
        assert_eq!(arena.next(2), NONE);
        assert_eq!(arena.prev(0), NONE);
        assert_eq!(arena.prev(2), 1);
        assert_eq!(arena.token(1), u32::from(b'b'));
        assert_eq!(arena.total_byte_len(), 3);
    }

    #[test]
    fn merge_splices_and_retires_the_right_node() {
        let model = byte_model();
        let mut arena = Arena::new();
        arena.reset_from_bytes(&model, b"abc");
        let before = arena.version(0);

        arena.merge(0, 1, 999);

        assert_eq!(arena.token(0), 999);
        assert_eq!(arena.byte_len(0), 2);
        assert_eq!(arena.next(0), 2);
        assert_eq!(arena.prev(2), 0);
        assert_eq!(arena.version(1), 0);
        assert!(arena.version(0) > before);

        let mut out = Vec::new();
        arena.collect_into(&mut out);
        assert_eq!(out, vec![999, u32::from(b'c')]);
    }

    #[test]
    fn merge_at_the_tail_moves_the_tail() {
        let model = byte_model();
        let mut arena = Arena::new();
        arena.reset_from_bytes(&model, b"ab");
        arena.merge(0, 1, 500);
        assert_eq!(arena.tail, 0);
        assert_eq!(arena.total_byte_len(), 2);
    }

    #[test]
    fn stale_candidates_are_rejected() {
        let model = byte_model();
        let mut arena = Arena::new();
        arena.reset_from_bytes(&model, b"abc");

        let cand = MergeCandidate {
            rank: 0,
            left: 1,
            right: 2,
            left_token: arena.token(1),
            right_token: arena.token(2),
            left_version: arena.version(1),
            right_version: arena.version(2),
        };
        assert!(arena.candidate_is_current(&cand));

        // Merging (0, 1) retires node 1, so the captured versions no longer match.
        arena.merge(0, 1, 999);
        assert!(!arena.candidate_is_current(&cand));
    }
}
