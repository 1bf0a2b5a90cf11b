//! Content-addressed nested-value encoder.
//!
//! Flattens heterogeneous [`Value`](recap_core::Value)s into a handful of
//! homogeneously typed, append-only arrays and restores them from an
//! integer handle.
//!
//! # Layout
//!
//! ```text
//! CompObjs  [(kind, start, end), ...]   one record per handle
//! Ints      [i64, ...]                  kind 0
//! Floats    [f64, ...]                  kind 1
//! Strings   [u8, ...]                   kind 2 (UTF-8)
//! Lists     [handle, ...]               kind 3 and 4 (map = [keys, values])
//! ```
//!
//! A bare number is a one-element record whose `end` is `-1`. Handle `-1`
//! is the absent value.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod encoder;
pub mod error;
mod key;
pub mod record;
pub mod storage;

pub use config::EncoderConfig;
pub use encoder::Encoder;
pub use error::EncodeError;
pub use record::{Kind, Record};
pub use storage::{CompoundStorage, VecStorage};

/// Handle of the absent value.
pub const NONE_HANDLE: i64 = -1;
