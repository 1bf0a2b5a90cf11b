//! Describing saved results as XDMF grids for visualisation tools.
//!
//! [`Partition::build`] splits the mesh into grids such that each grid
//! carries the same set of saved values on every element. Columns of the
//! saved selectors are then reordered so that the values of one grid are
//! contiguous, and [`XdmfStore`] writes, next to the hierarchical store,
//! one `.xmf` descriptor per run pointing into the saved datasets:
//!
//! ```text
//! Xdmf
//! └── Domain
//!     └── SpatialGrids          (spatial collection)
//!         └── tetGrids
//!             └── comp1
//!                 └── tetGrid0  (temporal collection)
//!                     ├── Grid  t = 0.0
//!                     └── Grid  t = 0.1
//! ```
//!
//! When ranks save separately, every rank describes its own grids and the
//! coordinator also writes a `_Full` descriptor including all of them.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod geometry;
pub mod partition;
pub mod store;
pub mod xdmf;

pub use config::XdmfConfig;
pub use error::GridError;
pub use geometry::GridGeometry;
pub use partition::{Center, ElemSet, Grid, GridPath, GridValue, Partition};
pub use store::XdmfStore;
pub use xdmf::{file_name, full_file_name, GridEntry, XdmfWriter};
