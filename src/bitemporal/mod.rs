//! Bitemporal resolution
//!
//! - `Ceiling` is the per-entity interval ledger, owned by the caller and
//!   reset between entities
//! - `PolygonResolver` computes one version's remaining exposure against it
//!
//! For each version of an entity, newest first:
//!
//! ```text
//! resolve(ceiling, version) -> polygon     // exposure before this version's log
//! ceiling.apply_log(version)               // newer-first supersession
//! ```

mod ceiling;
mod polygon;

pub use ceiling::Ceiling;
pub use polygon::{is_stale, Polygon, PolygonResolver, Rectangle, VersionExtent};
