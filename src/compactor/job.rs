//! Compaction jobs

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::errors::ChronoResult;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::segment::{MemorySegment, PersistedSegment, PersistedSegmentWriter, Segment};
use crate::trie::{HashTrie, PageSink, TrieWriter};

use super::merge::merge_segments;

/// Merges several segments into one.
///
/// The inputs are left untouched; callers swap the output in for them.
pub struct Compactor {
    config: EngineConfig,
    writer: TrieWriter,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Compactor {
    pub fn new(config: &EngineConfig) -> ChronoResult<Self> {
        Ok(Self {
            config: config.clone(),
            writer: TrieWriter::new(config)?,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.writer = self.writer.with_metrics(Arc::clone(&metrics));
        self.metrics = Some(metrics);
        self
    }

    /// Writes the merge of `segments` into `sink` and returns the new trie.
    pub fn compact(&self, segments: &[Segment], sink: &mut dyn PageSink) -> ChronoResult<HashTrie> {
        let inputs = segments
            .iter()
            .map(Segment::name)
            .collect::<Vec<_>>()
            .join(",");
        log_event_with_fields(Event::CompactionStart, &[("inputs", &inputs)]);

        let rows = merge_segments(segments)?;
        let trie = self.writer.write(&rows, sink)?;

        if let Some(metrics) = &self.metrics {
            metrics.increment_compactions();
        }
        let rows_str = rows.len().to_string();
        let leaves_str = trie.leaf_count().to_string();
        log_event_with_fields(
            Event::CompactionComplete,
            &[("inputs", &inputs), ("rows", &rows_str), ("leaves", &leaves_str)],
        );

        Ok(trie)
    }

    pub fn compact_to_memory(&self, segments: &[Segment], name: &str) -> ChronoResult<MemorySegment> {
        let mut pages = Vec::new();
        let trie = self.compact(segments, &mut pages)?;
        MemorySegment::new(name, trie, pages)
    }

    /// Compacts into the new persisted segment `name` under the configured
    /// data directory.
    pub fn compact_to_disk(&self, segments: &[Segment], name: &str) -> ChronoResult<PersistedSegment> {
        let mut sink = PersistedSegmentWriter::create(&self.config, name)?;
        let trie = self.compact(segments, &mut sink)?;
        sink.finish(&trie)
    }
}
