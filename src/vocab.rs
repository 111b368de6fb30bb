//! Parsing and validation of GPT-2 style `vocab.json` and `merges.txt`.
//!
//! Loading is all-or-nothing: every failure surfaces as an error and no
//! partially constructed model ever escapes. The keys of both files use the
//! printable-rune encoding replayed by [`crate::alphabet`].

use std::fs;
use std::path::Path;

use ahash::AHashMap;
use log::info;

use crate::alphabet;
use crate::config::ModelConfig;
use crate::error::{BpetokError, Result};
use crate::model::{BpeModel, Pair, TokenId};

/// Loads and fully validates a model from the two asset files.
pub(crate) fn load_model(
    vocab_path: &Path,
    merges_path: &Path,
    config: ModelConfig,
) -> Result<BpeModel> {
    let vocab_raw = fs::read(vocab_path)
        .map_err(|err| BpetokError::io(err, Some(vocab_path.to_path_buf())))?;
    let vocab: AHashMap<String, TokenId> = serde_json::from_slice(&vocab_raw)?;

    let rev_vocab = build_rev_vocab(&vocab)?;

    let merges_raw = fs::read_to_string(merges_path)
        .map_err(|err| BpetokError::io(err, Some(merges_path.to_path_buf())))?;
    let merges = parse_merges(&merges_raw, &vocab)?;

    let model = BpeModel::from_parts(rev_vocab, merges, config)?;
    info!(
        "loaded model: {} tokens, {} merge rules, longest token {} bytes",
        model.vocab_size(),
        model.merge_count(),
        model.max_token_byte_len()
    );
    Ok(model)
}

/// Inverts the parsed vocabulary into `rev_vocab[id] = raw bytes`.
///
/// Ids must be dense in `[0, len)`; every key decodes through the
/// printable-rune alphabet.
fn build_rev_vocab(vocab: &AHashMap<String, TokenId>) -> Result<Vec<Vec<u8>>> {
    let vocab_size = vocab.len();
    let mut rev_vocab: Vec<Vec<u8>> = vec![Vec::new(); vocab_size];
    let mut seen = vec![false; vocab_size];

    for (key, &id) in vocab {
        let slot = id as usize;
        if slot >= vocab_size {
            return Err(BpetokError::Vocab(format!(
                "token id {id} out of range for vocabulary of {vocab_size}"
            )));
        }
        if seen[slot] {
            return Err(BpetokError::Vocab(format!("duplicate token id {id}")));
        }
        seen[slot] = true;

        let bytes = alphabet::token_key_to_bytes(key);
        if bytes.is_empty() {
            return Err(BpetokError::Vocab(format!(
                "key {key:?} for token id {id} decodes to an empty byte sequence"
            )));
        }
        rev_vocab[slot] = bytes;
    }

    // Dense ids plus no duplicates means every slot was filled, but keep the
    // check so a miscounted map cannot slip through.
    if let Some(missing) = seen.iter().position(|&s| !s) {
        return Err(BpetokError::Vocab(format!(
            "vocabulary ids are not dense, id {missing} is missing"
        )));
    }

    Ok(rev_vocab)
}

/// Parses merges.txt into `(left, right)` id pairs ranked by line order.
///
/// Blank lines and `#` comments (the `#version` header GPT-2 ships) are
/// skipped and do not consume a rank.
fn parse_merges(text: &str, vocab: &AHashMap<String, TokenId>) -> Result<Vec<Pair>> {
    let mut merges = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let (Some(left), Some(right), None) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(BpetokError::Merges(format!(
                "line {line:?} must contain exactly two fields"
            )));
        };

        let Some(&left_id) = vocab.get(left) else {
            return Err(BpetokError::Merges(format!(
                "token {left:?} is not in the vocabulary"
            )));
        };
        let Some(&right_id) = vocab.get(right) else {
            return Err(BpetokError::Merges(format!(
                "token {right:?} is not in the vocabulary"
            )));
        };

        merges.push((left_id, right_id));
    }
    Ok(merges)
}
