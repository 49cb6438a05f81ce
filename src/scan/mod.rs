//! Scan merge engine
//!
//! Reads a set of segments as one bitemporal relation. The merge planner
//! cuts the hash space into tasks; each task's pages are merged row by row
//! through a per-entity `Ceiling`, and every put emits the rectangles of its
//! polygon that the query can see.
//!
//! # Modules
//!
//! - `spec`: query bounds, entity selection, predicates, page pruning
//! - `filters`: column predicates and their page-level test
//! - `selector`: exact and set iid selection
//! - `pointer`: row pointers and the k-way merge queue
//! - `cursor`: the pull-based cursor
//! - `sink`: output rows and sinks
//!
//! # Usage
//!
//! ```ignore
//! let spec = ScanSpec::new().with_bounds(TemporalBounds::as_of(t));
//! let mut cursor = ScanCursor::new(&segments, spec)?;
//! while let Some(batch) = cursor.advance()? {
//!     for row in batch.rows { /* ... */ }
//! }
//! ```

mod cursor;
mod filters;
mod pointer;
mod selector;
mod sink;
mod spec;

pub use cursor::{plan_scan, ScanCursor};
pub use filters::{ColumnPredicate, FilterOp, PredicateFilter};
pub use pointer::{RowPointer, TaskRows};
pub use selector::IidSelector;
pub use sink::{JsonLinesSink, OutputRow, RowBatch, RowSink};
pub use spec::{PageSelection, ScanSpec};
