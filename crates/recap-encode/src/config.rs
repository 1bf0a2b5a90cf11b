//! Encoder configuration.

use crate::record::Kind;

/// Configuration for an [`Encoder`](crate::Encoder).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Record kinds whose values are deduplicated.
    ///
    /// Default: integer lists, strings, lists and maps. Float lists are
    /// not cached since equal float series rarely repeat.
    pub cached_kinds: Vec<Kind>,
}

impl EncoderConfig {
    /// Default cached kinds.
    pub const DEFAULT_CACHED_KINDS: [Kind; 4] = [Kind::Int, Kind::Str, Kind::List, Kind::Dict];

    /// Default configuration.
    pub fn new() -> Self {
        Self {
            cached_kinds: Self::DEFAULT_CACHED_KINDS.to_vec(),
        }
    }

    /// Configuration without any deduplication.
    pub fn uncached() -> Self {
        Self {
            cached_kinds: Vec::new(),
        }
    }

    /// Whether values of `kind` are deduplicated.
    pub fn caches(&self, kind: Kind) -> bool {
        self.cached_kinds.contains(&kind)
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::new()
    }
}
