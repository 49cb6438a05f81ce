//! Bucketed hash tries
//!
//! Segments are tries keyed on the entity iid. Every level consumes
//! `level_bits` of the iid, so the bucket of an iid at a given depth is the
//! same in every segment whatever that segment's shape.
//!
//! # Modules
//!
//! - `iid`: 16-byte entity ids
//! - `bucketer`: bucket assignment and path arithmetic
//! - `node`: immutable Branch/Leaf nodes and their persisted table form
//! - `writer`: recursive partitioning of sorted rows into leaves

mod bucketer;
mod iid;
mod node;
mod writer;

pub use bucketer::{Bucketer, Path};
pub use iid::{Iid, IID_LEN};
pub use node::{HashTrie, Node, NodeEntry};
pub use writer::{PageSink, TrieWriter};
