//! Chunked streaming encoder.
//!
//! The encoder buffers the unsealed suffix of the stream as raw bytes and
//! holds back a tail reserve of `max_token_byte_len - 1` bytes: a token is
//! emitted only once enough bytes sit behind it that no token the
//! vocabulary can form would reach back and swallow it through a legal
//! merge sequence. Each push re-merges the buffered suffix together with
//! the new chunk through the shared arena engine, so the concatenation of
//! everything `push` and `flush` emit is bitwise identical to
//! [`BpeModel::encode`] of the whole stream, for every chunking — including
//! chunk boundaries that land inside a multi-byte UTF-8 sequence, since the
//! engine never looks at rune boundaries.
//!
//! After a commit the buffer holds at most the tail reserve plus one token,
//! so the cost of a push is proportional to the reserve plus the chunk, not
//! to the length of the stream so far.

use std::sync::Arc;

use crate::arena::{Arena, NONE};
use crate::config::StreamConfig;
use crate::encoder;
use crate::model::{BpeModel, TokenId};
use crate::queue::MergeQueue;

/// Incremental encoder for unbounded byte streams.
///
/// Not thread-safe; one instance per concurrent stream, all sharing the
/// same `Arc<BpeModel>`.
#[derive(Debug)]
pub struct StreamingEncoder {
    model: Arc<BpeModel>,
    arena: Arena,
    queue: MergeQueue,
    buf: Vec<u8>,
    out: Vec<TokenId>,
    tail_reserve: usize,
}

impl StreamingEncoder {
    /// Creates a streaming encoder with the default [`StreamConfig`].
    pub fn new(model: Arc<BpeModel>) -> Self {
        Self::with_config(model, StreamConfig::default())
    }

    /// Creates a streaming encoder with an explicit configuration.
    ///
    /// `extra_tail_reserve` widens the holdback window beyond the minimum;
    /// it can delay emission but never change what is emitted overall.
    pub fn with_config(model: Arc<BpeModel>, config: StreamConfig) -> Self {
        let tail_reserve =
            model.max_token_byte_len().saturating_sub(1) + config.extra_tail_reserve;
        let queue = MergeQueue::new(model.merge_count());
        Self {
            model,
            arena: Arena::new(),
            queue,
            buf: Vec::new(),
            out: Vec::new(),
            tail_reserve,
        }
    }

    /// Returns the model this encoder encodes with.
    #[must_use]
    pub fn model(&self) -> &BpeModel {
        &self.model
    }

    /// Consumes the next chunk of the stream, returning any tokens that are
    /// now final.
    ///
    /// The returned slice aliases the encoder's internal output buffer; it
    /// is valid until the next call on this encoder and must be copied if
    /// the caller wants to keep it.
    pub fn push(&mut self, chunk: &[u8]) -> &[TokenId] {
        self.out.clear();
        self.buf.extend_from_slice(chunk);

        if self.buf.len() > self.tail_reserve {
            encoder::run_pass(&self.model, &mut self.arena, &mut self.queue, &self.buf);
            let emit_limit = self.buf.len() - self.tail_reserve;

            let mut consumed = 0usize;
            let mut node = self.arena.head();
            while node != NONE {
                let len = self.arena.byte_len(node) as usize;
                if consumed + len > emit_limit {
                    break;
                }
                self.out.push(self.arena.token(node));
                consumed += len;
                node = self.arena.next(node);
            }
            self.buf.drain(..consumed);
        }

        &self.out
    }

    /// Declares the stream complete, returning every remaining token.
    ///
    /// Afterwards the encoder is indistinguishable from a freshly
    /// constructed one and may be reused for a new stream. The returned
    /// slice follows the same aliasing rule as [`StreamingEncoder::push`].
    pub fn flush(&mut self) -> &[TokenId] {
        self.out.clear();
        if !self.buf.is_empty() {
            encoder::run_pass(&self.model, &mut self.arena, &mut self.queue, &self.buf);
            self.arena.collect_into(&mut self.out);
            self.buf.clear();
        }
        &self.out
    }

    /// Bytes currently withheld from emission.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}
