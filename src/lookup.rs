//! Two-tier lookup from adjacent token pairs to merge information.
//!
//! BPE merges cluster heavily around low-id tokens, so pairs whose
//! components are both below a cutoff resolve through a flat 2-D array with
//! no hashing; the long tail falls back to a hash map. Both tiers store the
//! same packed 64-bit word: rank in the high 32 bits, merged token id in the
//! low 32 bits.

use rustc_hash::FxHashMap;

use crate::model::TokenId;

/// Sentinel meaning "this pair has no merge" in the dense tier.
const NO_PAIR: u64 = u64::MAX;

/// Rank and result of a single merge rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairInfo {
    /// Zero-based position of the rule in the merge table; lower wins.
    pub rank: u32,
    /// Token id produced by applying the rule.
    pub merged: TokenId,
}

/// Pair-to-merge index backing the hot path of the merge engine.
#[derive(Debug, Clone)]
pub struct PairLookup {
    fast: Vec<u64>,
    fast_size: usize,
    fallback: FxHashMap<u64, u64>,
}

#[inline]
fn pack_key(a: TokenId, b: TokenId) -> u64 {
    (u64::from(a) << 32) | u64::from(b)
}

#[inline]
fn pack_info(rank: u32, merged: TokenId) -> u64 {
    (u64::from(rank) << 32) | u64::from(merged)
}

#[inline]
fn unpack_info(word: u64) -> PairInfo {
    PairInfo {
        rank: (word >> 32) as u32,
        merged: word as TokenId,
    }
}

impl PairLookup {
    /// Builds the index from `(pair, (rank, merged))` entries.
    ///
    /// The dense tier covers pairs whose components are both below
    /// `min(vocab_size, fast_lookup_size)`.
    pub(crate) fn build<I>(entries: I, vocab_size: usize, fast_lookup_size: usize) -> Self
    where
        I: IntoIterator<Item = ((TokenId, TokenId), PairInfo)>,
    {
        let fast_size = vocab_size.min(fast_lookup_size);
        let mut fast = vec![NO_PAIR; fast_size * fast_size];
        let mut fallback = FxHashMap::default();

        for ((a, b), info) in entries {
            let word = pack_info(info.rank, info.merged);
            debug_assert!(word != NO_PAIR);
            let (ai, bi) = (a as usize, b as usize);
            if ai < fast_size && bi < fast_size {
                fast[ai * fast_size + bi] = word;
            } else {
                fallback.insert(pack_key(a, b), word);
            }
        }

        Self {
            fast,
            fast_size,
            fallback,
        }
    }

    /// Returns the merge rule for the adjacent pair `(a, b)`, if one exists.
    #[inline]
    #[must_use]
    pub fn get(&self, a: TokenId, b: TokenId) -> Option<PairInfo> {
        let (ai, bi) = (a as usize, b as usize);
        if ai < self.fast_size && bi < self.fast_size {
            let word = self.fast[ai * self.fast_size + bi];
            if word == NO_PAIR {
                None
            } else {
                Some(unpack_info(word))
            }
        } else {
            self.fallback.get(&pack_key(a, b)).map(|&w| unpack_info(w))
        }
    }

    /// Number of entries held by the sparse tier.
    #[must_use]
    pub(crate) fn fallback_len(&self) -> usize {
        self.fallback.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PairLookup {
        let entries = vec![
            ((1, 2), PairInfo { rank: 0, merged: 7 }),
            ((3, 3), PairInfo { rank: 1, merged: 8 }),
            ((9000, 2), PairInfo { rank: 2, merged: 9 }),
        ];
        PairLookup::build(entries, 10_000, 16)
    }

    #[test]
    fn dense_tier_hits() {
        let lookup = sample();
        assert_eq!(lookup.get(1, 2), Some(PairInfo { rank: 0, merged: 7 }));
        assert_eq!(lookup.get(3, 3), Some(PairInfo { rank: 1, merged: 8 }));
        assert_eq!(lookup.get(2, 1), None);
    }

    #[test]
    fn sparse_tier_hits() {
        let lookup = sample();
        assert_eq!(lookup.get(9000, 2), Some(PairInfo { rank: 2, merged: 9 }));
        assert_eq!(lookup.get(9000, 3), None);
        assert_eq!(lookup.fallback_len(), 1);
    }

    #[test]
    fn cutoff_clamps_to_vocab_size() {
        let lookup = PairLookup::build(
            vec![((0, 1), PairInfo { rank: 0, merged: 2 })],
            3,
            2048,
        );
        assert_eq!(lookup.fast_size, 3);
        assert_eq!(lookup.get(0, 1), Some(PairInfo { rank: 0, merged: 2 }));
    }
}
