//! The offline merge engine.
//!
//! Encoding seeds one arena node per input byte, queues a candidate for
//! every adjacent pair with a merge rule, then repeatedly applies the valid
//! candidate with the lowest `(rank, left index)`. Applying a merge bumps
//! the versions of both touched slots, so overlapping candidates queued
//! earlier fail the pop-time validity check instead of corrupting the list.
//! Each merge shortens the list by one node, so the loop terminates.

use std::sync::Arc;

use crate::arena::{Arena, NodeIndex, NONE};
use crate::model::{BpeModel, TokenId};
use crate::queue::{MergeCandidate, MergeQueue};

/// Offline encoder with scratch pooled across calls.
///
/// The arena and queue only ever grow; encoding a buffer no larger than a
/// previous one allocates nothing. An encoder is single-owner: clone the
/// `Arc<BpeModel>` and build one encoder per thread instead of sharing.
#[derive(Debug)]
pub struct Encoder {
    model: Arc<BpeModel>,
    arena: Arena,
    queue: MergeQueue,
}

impl Encoder {
    /// Creates an encoder over a shared model.
    pub fn new(model: Arc<BpeModel>) -> Self {
        let queue = MergeQueue::new(model.merge_count());
        Self {
            model,
            arena: Arena::new(),
            queue,
        }
    }

    /// Returns the model this encoder encodes with.
    #[must_use]
    pub fn model(&self) -> &BpeModel {
        &self.model
    }

    /// Encodes a whole buffer into token ids.
    ///
    /// Empty input yields empty output; arbitrary binary is legal input.
    #[must_use]
    pub fn encode(&mut self, input: &[u8]) -> Vec<TokenId> {
        let mut out = Vec::new();
        self.encode_into(input, &mut out);
        out
    }

    /// Encodes a whole buffer, appending token ids to `out`.
    pub fn encode_into(&mut self, input: &[u8], out: &mut Vec<TokenId>) {
        run_pass(&self.model, &mut self.arena, &mut self.queue, input);
        self.arena.collect_into(out);
    }
}

/// One-shot encode without a pooled [`Encoder`]; backs [`BpeModel::encode`].
pub(crate) fn encode_with_fresh_scratch(model: &BpeModel, input: &[u8]) -> Vec<TokenId> {
    let mut arena = Arena::new();
    let mut queue = MergeQueue::new(model.merge_count());
    run_pass(model, &mut arena, &mut queue, input);
    let mut out = Vec::with_capacity(input.len().min(4096));
    arena.collect_into(&mut out);
    out
}

/// Rebuilds the arena from `input` and merges it to a fixed point.
pub(crate) fn run_pass(model: &BpeModel, arena: &mut Arena, queue: &mut MergeQueue, input: &[u8]) {
    queue.reset();
    arena.reset_from_bytes(model, input);

    let mut i = arena.head();
    while i != NONE {
        let j = arena.next(i);
        if j == NONE {
            break;
        }
        push_candidate(model, arena, queue, i, j);
        i = j;
    }

    drain(model, arena, queue);
    debug_assert_eq!(queue.len(), 0, "drain must exhaust the queue");
    debug_assert_eq!(
        arena.total_byte_len(),
        input.len(),
        "merging must preserve the byte length of the list"
    );
}

/// Queues a candidate for `(i, j)` if the pair has a merge rule.
fn push_candidate(
    model: &BpeModel,
    arena: &Arena,
    queue: &mut MergeQueue,
    i: NodeIndex,
    j: NodeIndex,
) {
    if i == NONE || j == NONE {
        return;
    }
    let a = arena.token(i);
    let b = arena.token(j);
    if let Some(info) = model.pair_info(a, b) {
        queue.push(MergeCandidate {
            rank: info.rank,
            left: i,
            right: j,
            left_token: a,
            right_token: b,
            left_version: arena.version(i),
            right_version: arena.version(j),
        });
    }
}

/// Drains the queue, applying every candidate that is still current.
fn drain(model: &BpeModel, arena: &mut Arena, queue: &mut MergeQueue) {
    while let Some(cand) = queue.pop() {
        if !arena.candidate_is_current(&cand) {
            continue;
        }
        let Some(info) = model.pair_info(cand.left_token, cand.right_token) else {
            continue;
        };
        if info.rank != cand.rank {
            continue;
        }

        let left = cand.left;
        arena.merge(left, cand.right, info.merged);

        // The merged node forms two new frontier pairs.
        push_candidate(model, arena, queue, arena.prev(left), left);
        push_candidate(model, arena, queue, left, arena.next(left));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::{byte_model, model_with_merges};

    fn encoder(model: BpeModel) -> Encoder {
        Encoder::new(Arc::new(model))
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let mut enc = encoder(byte_model());
        assert_eq!(enc.encode(b""), Vec::<TokenId>::new());
    }

    #[test]
    fn unmergeable_bytes_stay_one_token_each() {
        let mut enc = encoder(byte_model());
        let input = [0x00, 0xFF, 0x10, 0x7F];
        let tokens = enc.encode(&input);
        assert_eq!(tokens.len(), 4);
        assert_eq!(enc.model().decode(&tokens), input);
    }

    #[test]
    fn applies_a_single_merge() {
        let mut enc = encoder(model_with_merges(&[(b"h", b"i")]));
        let tokens = enc.encode(b"hi");
        assert_eq!(tokens.len(), 1);
        assert_eq!(enc.model().decode(&tokens), b"hi");
    }

    #[test]
    fn equal_rank_merges_apply_leftmost_first() {
        let model = model_with_merges(&[(b"p", b"q")]);
        let pq = model
            .pair_info(model.byte_token(b'p'), model.byte_token(b'q'))
            .expect("merge exists")
            .merged;
        let mut enc = encoder(model);
        let tokens = enc.encode(b"pqpq");
        assert_eq!(tokens, vec![pq, pq]);
        assert_eq!(enc.model().decode(&tokens), b"pqpq");
    }

    #[test]
    fn overlapping_candidates_go_stale_instead_of_double_merging() {
        // Every adjacent (a, a) pair is queued up front; after the leftmost
        // merge fires, the overlapping seeded candidates must be discarded.
        let model = model_with_merges(&[(b"a", b"a"), (b"aa", b"aa")]);
        let mut enc = encoder(model);

        let tokens = enc.encode(b"aaaa");
        assert_eq!(tokens.len(), 1);
        assert_eq!(enc.model().decode(&tokens), b"aaaa");

        let tokens = enc.encode(b"aaaaa");
        assert_eq!(tokens.len(), 2);
        assert_eq!(enc.model().decode(&tokens), b"aaaaa");
    }

    #[test]
    fn chained_merges_reach_the_longest_token() {
        let model = model_with_merges(&[(b"t", b"h"), (b"th", b"e"), (b" ", b"the")]);
        let mut enc = encoder(model);
        let input = b" the the the";
        let tokens = enc.encode(input);
        assert!(tokens.len() < input.len());
        assert_eq!(tokens.len(), 3);
        assert_eq!(enc.model().decode(&tokens), input);
    }

    #[test]
    fn rank_order_beats_text_order() {
        // (b, c) outranks (a, b), so "abc" must not greedily merge (a, b).
        let model = model_with_merges(&[(b"b", b"c"), (b"a", b"b")]);
        let bc = model
            .pair_info(model.byte_token(b'b'), model.byte_token(b'c'))
            .expect("merge exists")
            .merged;
        let a = model.byte_token(b'a');
        let mut enc = encoder(model);
        let tokens = enc.encode(b"abc");
        assert_eq!(tokens, vec![a, bc]);
    }

    #[test]
    fn scratch_reuse_is_deterministic() {
        let mut enc = encoder(model_with_merges(&[(b"t", b"h"), (b"th", b"e")]));
        let first = enc.encode(b"the theatre");
        let second = enc.encode(b"the theatre");
        assert_eq!(first, second);
        let after_smaller = enc.encode(b"th");
        assert_eq!(after_smaller.len(), 1);
        let third = enc.encode(b"the theatre");
        assert_eq!(first, third);
    }

    #[test]
    fn matches_the_fresh_scratch_path() {
        let model = model_with_merges(&[(b"t", b"h"), (b"th", b"e")]);
        let mut enc = Encoder::new(Arc::new(model.clone()));
        let input = b"the the thethe";
        assert_eq!(enc.encode(input), model.encode(input));
    }
}
