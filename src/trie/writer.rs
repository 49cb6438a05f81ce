//! Trie writer
//!
//! Partitions a sorted relation recursively by iid bucket until every
//! selection fits in a leaf:
//!
//! ```text
//! write_subtree(rows, depth):
//!     empty                                  -> absent child
//!     len <= leaf limit | one iid | max depth -> leaf page
//!     otherwise                              -> branch over fan_out sub-ranges
//! ```
//!
//! Rows arrive sorted by iid, so each bucket's rows are one contiguous range
//! found by binary search. Leaves are written in ascending path order, which
//! numbers pages sequentially.

use std::sync::Arc;

use crate::config::{EngineConfig, OversizedLeafPolicy};
use crate::errors::{ChronoError, ChronoResult};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::segment::{check_write_order, FactVersion, Page};

use super::bucketer::Bucketer;
use super::node::{HashTrie, Node};

/// Destination for the pages a write produces
pub trait PageSink {
    /// Stores `page` and returns its page index
    fn write_page(&mut self, page: Page) -> ChronoResult<usize>;
}

/// Collects pages in memory
impl PageSink for Vec<Page> {
    fn write_page(&mut self, page: Page) -> ChronoResult<usize> {
        self.push(page);
        Ok(self.len() - 1)
    }
}

pub struct TrieWriter {
    bucketer: Bucketer,
    leaf_row_limit: usize,
    oversized_leaf_policy: OversizedLeafPolicy,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl TrieWriter {
    pub fn new(config: &EngineConfig) -> ChronoResult<Self> {
        config.validate()?;
        Ok(Self {
            bucketer: config.bucketer()?,
            leaf_row_limit: config.leaf_row_limit,
            oversized_leaf_policy: config.oversized_leaf_policy,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn bucketer(&self) -> Bucketer {
        self.bucketer
    }

    /// Writes `rows` into `sink` and returns the trie over the written pages.
    ///
    /// `rows` must be sorted by iid ascending, then system_from descending;
    /// anything else fails with `MalformedInput` before a page is written.
    pub fn write(&self, rows: &[FactVersion], sink: &mut dyn PageSink) -> ChronoResult<HashTrie> {
        if let Err(e) = check_write_order(rows) {
            log_event_with_fields(Event::MalformedInput, &[("reason", &e.to_string())]);
            return Err(e);
        }

        let rows_str = rows.len().to_string();
        log_event_with_fields(Event::SegmentWriteStart, &[("rows", &rows_str)]);

        let root = self.write_subtree(rows, 0, sink)?;
        let trie = HashTrie::new(root, self.bucketer);

        let leaves_str = trie.leaf_count().to_string();
        let depth_str = trie.depth().to_string();
        log_event_with_fields(
            Event::SegmentWriteComplete,
            &[("rows", &rows_str), ("leaves", &leaves_str), ("depth", &depth_str)],
        );
        Ok(trie)
    }

    fn write_subtree(
        &self,
        rows: &[FactVersion],
        depth: usize,
        sink: &mut dyn PageSink,
    ) -> ChronoResult<Option<Node>> {
        if rows.is_empty() {
            return Ok(None);
        }

        let solo_iid = rows[0].iid == rows[rows.len() - 1].iid;

        if rows.len() <= self.leaf_row_limit || solo_iid || depth >= self.bucketer.max_depth() {
            if rows.len() > self.leaf_row_limit {
                self.handle_oversized(rows, depth)?;
            }
            return self.write_leaf(rows, sink).map(Some);
        }

        let children = self
            .partition(rows, depth)
            .into_iter()
            .map(|slice| self.write_subtree(slice, depth + 1, sink))
            .collect::<ChronoResult<Vec<_>>>()?;

        Ok(Some(Node::Branch(children)))
    }

    /// Splits `rows` into one (possibly empty) contiguous slice per bucket
    fn partition<'r>(&self, rows: &'r [FactVersion], depth: usize) -> Vec<&'r [FactVersion]> {
        let fan_out = self.bucketer.fan_out();

        let mut starts: Vec<usize> = (0..fan_out)
            .map(|bucket| {
                rows.partition_point(|row| (self.bucketer.bucket_for(&row.iid, depth) as usize) < bucket)
            })
            .collect();
        starts.push(rows.len());

        starts.windows(2).map(|w| &rows[w[0]..w[1]]).collect()
    }

    fn write_leaf(&self, rows: &[FactVersion], sink: &mut dyn PageSink) -> ChronoResult<Node> {
        let page_idx = sink.write_page(Page::from_rows(rows))?;
        if let Some(metrics) = &self.metrics {
            metrics.increment_leaves_written();
        }
        Ok(Node::leaf(page_idx))
    }

    fn handle_oversized(&self, rows: &[FactVersion], depth: usize) -> ChronoResult<()> {
        let rows_str = rows.len().to_string();
        let limit_str = self.leaf_row_limit.to_string();
        let depth_str = depth.to_string();
        let iid_str = rows[0].iid.to_string();
        let fields = [
            ("iid", iid_str.as_str()),
            ("rows", rows_str.as_str()),
            ("limit", limit_str.as_str()),
            ("depth", depth_str.as_str()),
        ];

        match self.oversized_leaf_policy {
            OversizedLeafPolicy::Allow => {
                log_event_with_fields(Event::OversizedLeaf, &fields);
                if let Some(metrics) = &self.metrics {
                    metrics.increment_oversized_leaves();
                }
                Ok(())
            }
            OversizedLeafPolicy::Reject => Err(ChronoError::ResourceExhausted(format!(
                "entity {} has {} rows, over the leaf limit of {}",
                iid_str, rows_str, limit_str
            ))),
        }
    }
}
