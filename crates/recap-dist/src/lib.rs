//! Saving and reading selectors of a simulation partitioned across
//! processes.
//!
//! Before any backend is opened, [`reconcile`] restricts every scheduled
//! selector to the columns owned by the calling rank and builds, on the
//! coordinator, one [`ColumnMap`](recap_core::ColumnMap) per selector:
//!
//! ```text
//! global column   0  1  2  3
//! owning rank     0  1  0  1
//! local column    0  0  1  1
//! ```
//!
//! Each rank then saves its own columns to a private store file, and the
//! coordinator persists the maps. [`DistributedReader`] uses them to read
//! the selector back as a whole.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod reader;
pub mod reconcile;
pub mod thread;

pub use error::DistError;
pub use reader::{DistributedReader, DistributedResults};
pub use reconcile::{build_map, reconcile, Reconciliation};
pub use thread::ThreadGroup;
