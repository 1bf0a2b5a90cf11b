//! Persistence backends and run-group stores.
//!
//! A saved selector writes its rows through a [`Backend`]: in memory, to an
//! append-only binary file, to a SQLite table, or to a group of an
//! HDF5 file through [`TreeStore`]. The database backends keep several run
//! groups side by side behind the [`RunGroupStore`] contract, each group
//! tagged with user parameters.
//!
//! Reads go through [`Slice`] indexing over runs, rows and columns and
//! return full nested blocks.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod config;
pub mod error;
pub mod file;
pub mod group;
pub mod hier;
pub mod memory;
pub mod multi;
pub mod readonly;
pub mod slice;
pub mod sqlite;
pub mod tree;

pub use backend::{Backend, RemoteBackend};
pub use config::{FileConfig, FileFormat, HierConfig, SqliteConfig};
pub use error::StoreError;
pub use file::FileBackend;
pub use group::{GroupLayout, GroupRequest, Params, RunGroupInfo, RunGroupStore};
pub use hier::{HierBackend, HierStore};
pub use memory::MemoryBackend;
pub use multi::MultiReader;
pub use readonly::ReadOnlySelector;
pub use slice::Slice;
pub use sqlite::{SqliteBackend, SqliteStore};
pub use tree::{Data, Dataset, TreeStore};
