//! Configuration builders controlling model construction and streaming.

use crate::error::{BpetokError, Result};
use serde::{Deserialize, Serialize};

/// Default edge length of the dense pair-lookup tier.
pub const DEFAULT_FAST_LOOKUP_SIZE: usize = 2048;

/// Configuration for building a [`crate::BpeModel`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelConfig {
    /// Edge length of the dense pair-lookup tier. Pairs whose components are
    /// both below `min(vocab_size, fast_lookup_size)` resolve through a flat
    /// 2-D array; the rest fall back to a hash map. Correctness is
    /// independent of this value.
    pub fast_lookup_size: usize,
}

impl ModelConfig {
    /// Returns a builder initialised with [`ModelConfig::default`].
    #[must_use]
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }

    /// Validates the invariants required for model construction.
    pub fn validate(&self) -> Result<()> {
        if self.fast_lookup_size == 0 {
            return Err(BpetokError::InvalidConfig(
                "fast_lookup_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            fast_lookup_size: DEFAULT_FAST_LOOKUP_SIZE,
        }
    }
}

/// Builder for [`ModelConfig`].
#[derive(Debug, Default, Clone)]
pub struct ModelBuilder {
    cfg: ModelConfig,
}

impl ModelBuilder {
    /// Creates a builder with [`ModelConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the dense pair-lookup cutoff.
    #[must_use]
    pub fn fast_lookup_size(mut self, value: usize) -> Self {
        self.cfg.fast_lookup_size = value;
        self
    }

    /// Finalises the builder, returning a validated [`ModelConfig`].
    pub fn build(self) -> Result<ModelConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Configuration for a [`crate::StreamingEncoder`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamConfig {
    /// Additional bytes withheld on top of the minimum tail reserve of
    /// `max_token_byte_len - 1`. A larger reserve trades emission eagerness
    /// for nothing else; output is identical either way. The reserve can
    /// never be made smaller than the minimum.
    pub extra_tail_reserve: usize,
}

impl StreamConfig {
    /// Returns a builder initialised with [`StreamConfig::default`].
    #[must_use]
    pub fn builder() -> StreamBuilder {
        StreamBuilder::default()
    }
}

/// Builder for [`StreamConfig`].
#[derive(Debug, Default, Clone)]
pub struct StreamBuilder {
    cfg: StreamConfig,
}

impl StreamBuilder {
    /// Creates a builder with [`StreamConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Widens the tail reserve by `value` bytes beyond the minimum.
    #[must_use]
    pub fn extra_tail_reserve(mut self, value: usize) -> Self {
        self.cfg.extra_tail_reserve = value;
        self
    }

    /// Finalises the builder, returning the [`StreamConfig`].
    pub fn build(self) -> StreamConfig {
        self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_fast_lookup_size() {
        let cfg = ModelConfig::builder()
            .fast_lookup_size(64)
            .build()
            .expect("config should be valid");
        assert_eq!(cfg.fast_lookup_size, 64);
    }

    #[test]
    fn validate_rejects_zero_fast_lookup() {
        let cfg = ModelConfig {
            fast_lookup_size: 0,
        };
        let err = cfg.validate().expect_err("validation should fail");
        assert!(matches!(
            err,
            BpetokError::InvalidConfig(message) if message.contains("fast_lookup_size")
        ));
    }

    #[test]
    fn stream_builder_overrides_defaults() {
        let cfg = StreamConfig::builder().extra_tail_reserve(16).build();
        assert_eq!(cfg.extra_tail_reserve, 16);
    }
}
