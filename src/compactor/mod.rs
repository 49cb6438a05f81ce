//! Compaction
//!
//! Folds several segments into one. The merge plans over the inputs like a
//! scan does, but emits event rows instead of resolved rectangles, so the
//! output resolves exactly as its inputs did. The merged relation is then
//! written through the trie writer into a memory or persisted segment.
//!
//! # Modules
//!
//! - `merge`: task-by-task event-row merge with erase handling
//! - `job`: the `Compactor` tying merge and writer together

mod job;
mod merge;

pub use job::Compactor;
pub use merge::merge_segments;
