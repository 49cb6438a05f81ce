//! Segments
//!
//! A segment is an immutable, named run of fact-versions: one hash trie plus
//! the leaf pages it refers to. Segments are created by a write or a
//! compaction and never modified afterwards.
//!
//! # Backings
//!
//! - `MemorySegment`: decoded pages held in memory, no page metadata
//! - `PersistedSegment`: checksummed page records on disk plus `meta.json`
//!
//! Both are reached through `Segment`, which exposes what the planner and
//! the scan need: the root node, page loading and a metadata test.

mod checksum;
mod fact;
mod memory;
mod page;
mod persisted;
mod planner;
mod record;

use std::sync::Arc;

pub use fact::{check_write_order, sort_for_write, Document, FactVersion, OpKind, Operation};
pub use memory::MemorySegment;
pub use page::{Column, IidBloom, NumericRange, Page, PageMeta};
pub use persisted::{PersistedSegment, PersistedSegmentWriter, SegmentMeta, DATA_FILE, META_FILE};
pub use planner::{AllPages, MergePlanner, MergeTask, PageRef, PagesFilter};

use crate::errors::ChronoResult;
use crate::trie::{Bucketer, HashTrie, Node};

/// A conservative test over page metadata: `false` only when no row of the
/// page can matter.
pub trait PagePredicate {
    fn test(&self, meta: &PageMeta) -> bool;
}

impl<F: Fn(&PageMeta) -> bool> PagePredicate for F {
    fn test(&self, meta: &PageMeta) -> bool {
        self(meta)
    }
}

#[derive(Debug, Clone)]
pub enum Segment {
    Memory(MemorySegment),
    Persisted(PersistedSegment),
}

impl Segment {
    pub fn name(&self) -> &str {
        match self {
            Segment::Memory(seg) => seg.name(),
            Segment::Persisted(seg) => seg.name(),
        }
    }

    pub fn trie(&self) -> &HashTrie {
        match self {
            Segment::Memory(seg) => seg.trie(),
            Segment::Persisted(seg) => seg.trie(),
        }
    }

    /// `None` for an empty segment
    pub fn root_node(&self) -> Option<&Node> {
        self.trie().root()
    }

    pub fn bucketer(&self) -> Bucketer {
        self.trie().bucketer()
    }

    pub fn page_count(&self) -> usize {
        match self {
            Segment::Memory(seg) => seg.page_count(),
            Segment::Persisted(seg) => seg.page_count(),
        }
    }

    pub fn page_meta(&self, page_idx: usize) -> Option<&PageMeta> {
        match self {
            Segment::Memory(_) => None,
            Segment::Persisted(seg) => seg.page_meta(page_idx),
        }
    }

    /// Loads page `page_idx`; the only blocking step of a scan.
    pub fn load_page(&self, page_idx: usize) -> ChronoResult<Arc<Page>> {
        match self {
            Segment::Memory(seg) => seg.load_page(page_idx),
            Segment::Persisted(seg) => seg.load_page(page_idx).map(Arc::new),
        }
    }

    /// Tests page `page_idx` against its metadata. Pages without metadata
    /// always pass.
    pub fn test_page(&self, page_idx: usize, predicate: &dyn PagePredicate) -> bool {
        match self.page_meta(page_idx) {
            Some(meta) => predicate.test(meta),
            None => true,
        }
    }
}

impl From<MemorySegment> for Segment {
    fn from(seg: MemorySegment) -> Self {
        Segment::Memory(seg)
    }
}

impl From<PersistedSegment> for Segment {
    fn from(seg: PersistedSegment) -> Self {
        Segment::Persisted(seg)
    }
}
