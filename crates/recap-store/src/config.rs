//! Backend configuration parameters.

use recap_encode::{EncoderConfig, Kind};

/// Row encoding of a binary result file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FileFormat {
    /// Fixed-width rows of big-endian `f64`. Numbers only.
    Legacy,
    /// Length-prefixed bincode rows. Any [`Value`](recap_core::Value).
    #[default]
    Current,
}

impl FileFormat {
    /// Tag recorded in the file's metadata block.
    pub fn tag(self) -> &'static str {
        match self {
            FileFormat::Legacy => "legacy",
            FileFormat::Current => "current",
        }
    }

    /// Format named by a recorded tag.
    pub fn from_tag(tag: &str) -> Option<FileFormat> {
        match tag {
            "legacy" => Some(FileFormat::Legacy),
            "current" => Some(FileFormat::Current),
            _ => None,
        }
    }
}

/// Configuration for the binary file backend.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Budget, in values, for the recent-rows buffer.
    ///
    /// Default: 4096. The buffer keeps `max(1, buffer_size / len)` rows of
    /// the current run so reads of recent rows skip the file.
    pub buffer_size: usize,

    /// Encoding of new rows.
    pub format: FileFormat,
}

impl FileConfig {
    /// Default recent-rows budget.
    pub const DEFAULT_BUFFER_SIZE: usize = 4096;

    /// Default configuration.
    pub fn new() -> Self {
        Self {
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
            format: FileFormat::default(),
        }
    }

    /// Number of buffered rows for a selector of `len` columns.
    pub fn buffered_rows(&self, len: usize) -> usize {
        (self.buffer_size / len.max(1)).max(1)
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the SQLite run-group store.
#[derive(Clone, Debug)]
pub struct SqliteConfig {
    /// Number of inserted rows between commits.
    ///
    /// Default: 10. Rows not yet committed are committed on `finalize`.
    pub commit_freq: usize,
}

impl SqliteConfig {
    /// Default commit frequency.
    pub const DEFAULT_COMMIT_FREQ: usize = 10;

    /// Default configuration.
    pub fn new() -> Self {
        Self {
            commit_freq: Self::DEFAULT_COMMIT_FREQ,
        }
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the hierarchical run-group store.
#[derive(Clone, Debug)]
pub struct HierConfig {
    /// Compound record kinds deduplicated by the encoder.
    pub cached_kinds: Vec<Kind>,

    /// Number of saved rows between flushes of the store file.
    ///
    /// Default: 10. Rows are appended to the file as they are saved; a
    /// flush makes them durable if the process dies before `finalize`.
    pub flush_freq: usize,
}

impl HierConfig {
    /// Default flush frequency.
    pub const DEFAULT_FLUSH_FREQ: usize = 10;

    /// Default configuration.
    pub fn new() -> Self {
        Self {
            cached_kinds: EncoderConfig::DEFAULT_CACHED_KINDS.to_vec(),
            flush_freq: Self::DEFAULT_FLUSH_FREQ,
        }
    }

    /// Encoder configuration derived from this one.
    pub fn encoder(&self) -> EncoderConfig {
        EncoderConfig {
            cached_kinds: self.cached_kinds.clone(),
        }
    }
}

impl Default for HierConfig {
    fn default() -> Self {
        Self::new()
    }
}
