//! The immutable BPE model: vocabulary, byte seeds, and merge rules.

use std::path::Path;

use ahash::AHashMap;
use log::debug;

use crate::config::ModelConfig;
use crate::encoder;
use crate::error::{BpetokError, Result};
use crate::lookup::{PairInfo, PairLookup};

/// Token identifier used throughout the crate.
pub type TokenId = u32;
/// Merge pair encoded as `(left, right)` token identifiers.
pub type Pair = (TokenId, TokenId);

/// Frozen BPE model derived from a GPT-2 style vocabulary and merge table.
///
/// A model is immutable after construction and safe for unlimited concurrent
/// readers; share it across encoders behind an [`std::sync::Arc`]. All
/// mutable encoding state lives in the encoder types.
#[must_use]
#[derive(Debug, Clone)]
pub struct BpeModel {
    rev_vocab: Vec<Vec<u8>>,
    byte_to_token: [TokenId; 256],
    pairs: PairLookup,
    max_token_byte_len: usize,
    merge_count: usize,
    config: ModelConfig,
}

impl BpeModel {
    /// Constructs a model from a dense reverse vocabulary and an ordered
    /// merge list.
    ///
    /// `rev_vocab[id]` holds the exact byte sequence for token `id`; the
    /// position of a pair in `merges` is its rank. Every invariant the file
    /// loader enforces is re-checked here, so embedders and tests can build
    /// models without touching disk.
    pub fn from_parts(
        rev_vocab: Vec<Vec<u8>>,
        merges: Vec<Pair>,
        config: ModelConfig,
    ) -> Result<Self> {
        config.validate()?;

        let vocab_size = rev_vocab.len();
        if vocab_size > u32::MAX as usize {
            return Err(BpetokError::Internal(
                "vocabulary size exceeds u32::MAX".into(),
            ));
        }

        let mut bytes_to_id: AHashMap<&[u8], TokenId> = AHashMap::with_capacity(vocab_size);
        for (id, bytes) in rev_vocab.iter().enumerate() {
            if bytes.is_empty() {
                return Err(BpetokError::Vocab(format!(
                    "token id {id} decodes to an empty byte sequence"
                )));
            }
            if let Some(prev) = bytes_to_id.insert(bytes.as_slice(), id as TokenId) {
                return Err(BpetokError::Vocab(format!(
                    "duplicate byte sequence for token ids {prev} and {id}"
                )));
            }
        }

        let mut byte_to_token = [0 as TokenId; 256];
        let mut filled = [false; 256];
        for (id, bytes) in rev_vocab.iter().enumerate() {
            if let [b] = bytes.as_slice() {
                byte_to_token[*b as usize] = id as TokenId;
                filled[*b as usize] = true;
            }
        }
        if let Some(missing) = filled.iter().position(|&f| !f) {
            return Err(BpetokError::Vocab(format!(
                "no single-byte token for byte {missing}"
            )));
        }

        if merges.len() > u32::MAX as usize {
            return Err(BpetokError::Internal(
                "merge table size exceeds u32::MAX".into(),
            ));
        }
        let merge_count = merges.len();
        let mut seen_pairs: AHashMap<Pair, u32> = AHashMap::with_capacity(merge_count);
        let mut entries = Vec::with_capacity(merge_count);
        for (rank, &(left, right)) in merges.iter().enumerate() {
            let rank = rank as u32;
            if left as usize >= vocab_size || right as usize >= vocab_size {
                return Err(BpetokError::Merges(format!(
                    "merge rank {rank} references token ids ({left}, {right}) outside the vocabulary"
                )));
            }
            if seen_pairs.insert((left, right), rank).is_some() {
                return Err(BpetokError::Merges(format!(
                    "duplicate merge pair ({left}, {right}) at rank {rank}"
                )));
            }

            let mut merged_bytes =
                Vec::with_capacity(rev_vocab[left as usize].len() + rev_vocab[right as usize].len());
            merged_bytes.extend_from_slice(&rev_vocab[left as usize]);
            merged_bytes.extend_from_slice(&rev_vocab[right as usize]);
            let Some(&merged) = bytes_to_id.get(merged_bytes.as_slice()) else {
                return Err(BpetokError::Merges(format!(
                    "merge rank {rank} produces a byte sequence absent from the vocabulary"
                )));
            };
            entries.push(((left, right), PairInfo { rank, merged }));
        }
        drop(bytes_to_id);

        let max_token_byte_len = rev_vocab.iter().map(Vec::len).max().unwrap_or(0);
        let pairs = PairLookup::build(entries, vocab_size, config.fast_lookup_size);
        debug!(
            "built pair lookup: vocab {vocab_size}, {merge_count} merges, {} in the sparse tier",
            pairs.fallback_len()
        );

        Ok(Self {
            rev_vocab,
            byte_to_token,
            pairs,
            max_token_byte_len,
            merge_count,
            config,
        })
    }

    /// Loads a model from GPT-2 style `vocab.json` and `merges.txt` files.
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(
        vocab_path: P,
        merges_path: Q,
        config: ModelConfig,
    ) -> Result<Self> {
        crate::vocab::load_model(vocab_path.as_ref(), merges_path.as_ref(), config)
    }

    /// Returns the total number of tokens in the vocabulary.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.rev_vocab.len()
    }

    /// Returns the number of rules in the merge table.
    #[must_use]
    pub fn merge_count(&self) -> usize {
        self.merge_count
    }

    /// Returns the byte length of the longest token in the vocabulary.
    #[must_use]
    pub fn max_token_byte_len(&self) -> usize {
        self.max_token_byte_len
    }

    /// Returns the raw bytes backing a token.
    ///
    /// # Panics
    ///
    /// Panics if `id` is outside the vocabulary.
    #[must_use]
    pub fn token_bytes(&self, id: TokenId) -> &[u8] {
        &self.rev_vocab[id as usize]
    }

    /// Returns the byte length of a token.
    #[inline]
    #[must_use]
    pub fn token_len(&self, id: TokenId) -> usize {
        self.rev_vocab[id as usize].len()
    }

    /// Returns the base token whose byte sequence is exactly `[b]`.
    #[inline]
    #[must_use]
    pub fn byte_token(&self, b: u8) -> TokenId {
        self.byte_to_token[b as usize]
    }

    /// Returns the merge rule for the adjacent token pair `(a, b)`, if any.
    #[inline]
    #[must_use]
    pub fn pair_info(&self, a: TokenId, b: TokenId) -> Option<PairInfo> {
        self.pairs.get(a, b)
    }

    /// Returns the [`ModelConfig`] the model was built with.
    #[must_use]
    pub fn model_config(&self) -> &ModelConfig {
        &self.config
    }

    /// Encodes a byte buffer with freshly allocated scratch.
    ///
    /// Callers encoding repeatedly should hold an [`crate::Encoder`], which
    /// pools its scratch across calls.
    #[must_use]
    pub fn encode(&self, input: &[u8]) -> Vec<TokenId> {
        encoder::encode_with_fresh_scratch(self, input)
    }

    /// Decodes token ids back into the byte sequence they represent.
    ///
    /// # Panics
    ///
    /// Panics if any id is outside the vocabulary. Ids are produced by a
    /// trusted encoder over the same model, so an out-of-range id is a
    /// programming error, not a recoverable condition.
    #[must_use]
    pub fn decode(&self, tokens: &[TokenId]) -> Vec<u8> {
        let mut total = 0usize;
        for &id in tokens {
            let Some(bytes) = self.rev_vocab.get(id as usize) else {
                panic!("token id {id} out of range while decoding");
            };
            total += bytes.len();
        }

        let mut out = Vec::with_capacity(total);
        for &id in tokens {
            out.extend_from_slice(&self.rev_vocab[id as usize]);
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use ahash::AHashMap;

    /// A model with the 256 base byte tokens and no merges.
    pub(crate) fn byte_model() -> BpeModel {
        BpeModel::from_parts(
            (0u8..=255).map(|b| vec![b]).collect(),
            Vec::new(),
            ModelConfig::default(),
        )
        .expect("byte model is valid")
    }

    /// A model whose merge table is given as byte-string pairs, ranked in
    /// order of appearance. Merged tokens are appended to the vocabulary.
    pub(crate) fn model_with_merges(merges: &[(&[u8], &[u8])]) -> BpeModel {
        let mut rev_vocab: Vec<Vec<u8>> = (0u8..=255).map(|b| vec![b]).collect();
        let mut index: AHashMap<Vec<u8>, TokenId> = rev_vocab
            .iter()
            .enumerate()
            .map(|(id, bytes)| (bytes.clone(), id as TokenId))
            .collect();

        let mut pairs = Vec::with_capacity(merges.len());
        for (left, right) in merges {
            let left_id = index[*left];
            let right_id = index[*right];
            let mut merged = left.to_vec();
            merged.extend_from_slice(right);
            if !index.contains_key(&merged) {
                index.insert(merged.clone(), rev_vocab.len() as TokenId);
                rev_vocab.push(merged);
            }
            pairs.push((left_id, right_id));
        }

        BpeModel::from_parts(rev_vocab, pairs, ModelConfig::default())
            .expect("test model is valid")
    }
}
