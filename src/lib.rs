//! Byte-level byte pair encoding (BPE) for the GPT-2 vocabulary format.
//!
//! The crate loads a frozen BPE model (a dense vocabulary plus an ordered
//! merge table) and turns byte streams into token ids and back. Two
//! encoders share one merge engine: [`Encoder`] processes a whole buffer in
//! one call, and [`StreamingEncoder`] accepts arbitrary chunks — including
//! splits inside multi-byte UTF-8 sequences — while emitting exactly the
//! tokens the offline encoder would produce for the concatenated stream.
//!
//! ```no_run
//! use std::sync::Arc;
//! use bpetok::{BpeModel, ModelConfig, StreamingEncoder};
//!
//! # fn main() -> bpetok::Result<()> {
//! let model = Arc::new(BpeModel::from_files(
//!     "assets/gpt2/vocab.json",
//!     "assets/gpt2/merges.txt",
//!     ModelConfig::default(),
//! )?);
//!
//! let mut encoder = StreamingEncoder::new(Arc::clone(&model));
//! let mut tokens = Vec::new();
//! tokens.extend_from_slice(encoder.push(b"hello "));
//! tokens.extend_from_slice(encoder.push(b"world"));
//! tokens.extend_from_slice(encoder.flush());
//! assert_eq!(model.decode(&tokens), b"hello world");
//! # Ok(())
//! # }
//! ```
//!
//! The model is immutable and safe to share across threads; encoders are
//! single-owner and pool their scratch across calls. The CLI is enabled by
//! default through the `cli` feature; library-only users can disable
//! default features: `bpetok = { version = "...", default-features = false }`.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::multiple_crate_versions
)]

pub mod alphabet;
mod arena;
pub mod config;
pub mod encoder;
pub mod error;
pub mod lookup;
pub mod model;
mod queue;
pub mod streaming;
mod vocab;

pub use config::{ModelBuilder, ModelConfig, StreamBuilder, StreamConfig};
pub use encoder::Encoder;
pub use error::{BpetokError, Result};
pub use lookup::{PairInfo, PairLookup};
pub use model::{BpeModel, Pair, TokenId};
pub use streaming::StreamingEncoder;
