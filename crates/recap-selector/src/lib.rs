//! Selector expression trees for recap.
//!
//! A [`Selector`] describes a derived quantity captured at every save
//! event. Leaves bind a [`SimPath`](recap_core::SimPath) to a simulation,
//! combinators apply arithmetic, aggregates and concatenation:
//!
//! ```text
//! Selector
//! ├── Leaf       simulation path query
//! ├── Scalar     selector op number
//! ├── Binary     selector op selector (scalar, broadcast or elementwise)
//! ├── Aggregate  SUM / MIN / MAX
//! └── Concat     JOIN and <<
//! ```
//!
//! Evaluation goes through an [`EvalContext`], which caches leaf queries
//! for the duration of one save event, and an [`EvalPlan`], which
//! deduplicates leaf paths across the selectors of an optimisation group.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod custom;
pub mod distribute;
pub mod error;
pub mod header;
pub mod metadata;
pub mod ops;
pub mod plan;
pub mod schedule;
pub mod selector;

pub use custom::{ColumnType, CustomResults};
pub use distribute::LocalLayout;
pub use error::SelectorError;
pub use header::Header;
pub use ops::{Agg, BinOp, Operand};
pub use plan::{EvalContext, EvalPlan};
pub use schedule::{Cursor, Schedule, ScheduleEntry, Source, Timing};
pub use selector::{Distribution, Selector};
