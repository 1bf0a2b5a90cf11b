//! Recap: result capture and persistence for scientific simulations.
//!
//! This is the top-level facade crate. It re-exports the public API of the
//! recap sub-crates and adds the [`Recorder`], which advances a simulation
//! through a save schedule and routes every row to its backend.
//!
//! # Quick start
//!
//! ```ignore
//! use recap::prelude::*;
//!
//! let count = Selector::leaf(&sim, path().member("comp1").member("A").terminal("Count"))?;
//! let mut rec = Recorder::new(ProcessContext::single());
//! let ids = rec.add(vec![count.into()], Timing::Interval(0.1))?;
//! rec.attach_store(
//!     Box::new(HierStore::open("results/run", HierConfig::new())?),
//!     None,
//!     Params::new(),
//! )?;
//! rec.new_run(&mut sim)?;
//! rec.run(&mut sim, 1.0)?;
//! rec.finalize()?;
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `recap-core` | ids, values, schemas, paths, collaborator traits |
//! | [`encode`] | `recap-encode` | nested-value encoder |
//! | [`selector`] | `recap-selector` | selector algebra, evaluation plans, save schedule |
//! | [`store`] | `recap-store` | memory, binary-file, SQLite and hierarchical backends |
//! | [`dist`] | `recap-dist` | reconciliation of partitioned selectors, distributed reads |
//! | [`grid`] | `recap-grid` | grid partitioning and XDMF descriptors |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod recorder;

pub use error::RecordError;
pub use recorder::Recorder;

/// Core types, traits, and IDs (`recap-core`).
///
/// Contains [`types::Value`], [`types::Schema`], the path builder and the
/// traits implemented by the host: [`types::Simulation`],
/// [`types::Mesh`] and [`types::ProcessGroup`].
pub use recap_core as types;

/// Nested-value encoder (`recap-encode`).
pub use recap_encode as encode;

/// Selector expression trees and the save schedule (`recap-selector`).
///
/// Build [`selector::Selector`]s from simulation paths, combine them, and
/// register them in a [`selector::Schedule`].
pub use recap_selector as selector;

/// Persistence backends and run-group stores (`recap-store`).
pub use recap_store as store;

/// Distributed saving and reading (`recap-dist`).
///
/// [`dist::reconcile`] restricts selectors to the columns a rank owns;
/// [`dist::ThreadGroup`] runs a process group on threads.
pub use recap_dist as dist;

/// Grid partitioning and XDMF export (`recap-grid`).
pub use recap_grid as grid;

/// Common imports for typical recap usage.
///
/// ```rust
/// use recap::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use recap_core::{
        path, ProcessContext, RunId, Schema, SelectorId, SimPath, Simulation, Value,
    };

    // Selectors
    pub use recap_selector::{ColumnType, CustomResults, Selector, SelectorError, Source, Timing};

    // Stores
    pub use recap_store::{
        Backend, FileBackend, FileConfig, HierConfig, HierStore, MemoryBackend, Params,
        ReadOnlySelector, RunGroupStore, Slice, SqliteConfig, SqliteStore, StoreError,
    };

    // Distribution and grids
    pub use recap_dist::{DistributedResults, ThreadGroup};
    pub use recap_grid::{XdmfConfig, XdmfStore};

    // Driver
    pub use crate::{RecordError, Recorder};
}
