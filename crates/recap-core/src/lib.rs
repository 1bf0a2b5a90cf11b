//! Core types and traits for the recap result-capture engine.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! abstractions shared by every other recap crate: identifiers, nested
//! values and metadata, selector schemas, simulation paths, the global
//! column map, error types, and the collaborator traits implemented by the
//! simulator, its mesh, and the process group.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod colmap;
pub mod error;
pub mod id;
pub mod mesh;
pub mod path;
pub mod process;
pub mod schema;
pub mod traits;
pub mod value;

pub use colmap::ColumnMap;
pub use error::{CommError, SimError};
pub use id::{Rank, RunId, SelectorId, SimInstanceId, StateHint};
pub use mesh::{ElemKind, LocationKind, Mesh, Region};
pub use path::{path, IntoSimPath, PathBuilder, PathElem, SimPath};
pub use process::{ProcessContext, SingleProcess};
pub use schema::{Schema, VALUE_TYPE_KEY};
pub use traits::{PathInfo, ProcessGroup, Simulation};
pub use value::{MetaData, Value};

/// Version string recorded in every persisted run group.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
