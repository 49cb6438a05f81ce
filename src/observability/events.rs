//! Observable events
//!
//! Every event the engine logs is named here.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Trie writer
    /// A segment write begins
    SegmentWriteStart,
    /// A segment write finished
    SegmentWriteComplete,
    /// A single-entity leaf exceeds the row limit
    OversizedLeaf,

    // Segments
    /// A persisted segment's metadata was opened
    SegmentOpened,
    /// A page failed to load
    PageLoadFailed,
    /// A page was skipped on its metadata
    PagePruned,

    // Planning and scanning
    /// Merge tasks computed
    MergePlanBuilt,
    /// One merge task fully scanned
    ScanTaskComplete,
    /// Input violated an ordering invariant
    MalformedInput,

    // Compaction
    /// Compaction begins
    CompactionStart,
    /// Compaction finished
    CompactionComplete,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::SegmentWriteStart => "SEGMENT_WRITE_BEGIN",
            Event::SegmentWriteComplete => "SEGMENT_WRITE_COMPLETE",
            Event::OversizedLeaf => "OVERSIZED_LEAF",
            Event::SegmentOpened => "SEGMENT_OPENED",
            Event::PageLoadFailed => "PAGE_LOAD_FAILED",
            Event::PagePruned => "PAGE_PRUNED",
            Event::MergePlanBuilt => "MERGE_PLAN_BUILT",
            Event::ScanTaskComplete => "SCAN_TASK_COMPLETE",
            Event::MalformedInput => "MALFORMED_INPUT",
            Event::CompactionStart => "COMPACTION_BEGIN",
            Event::CompactionComplete => "COMPACTION_COMPLETE",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::PagePruned | Event::ScanTaskComplete => Severity::Trace,
            Event::OversizedLeaf => Severity::Warn,
            Event::PageLoadFailed | Event::MalformedInput => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
