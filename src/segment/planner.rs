//! Merge planning
//!
//! Walks all segment tries together, depth first, and cuts the hash space
//! into disjoint tasks. A segment that bottoms out in a leaf above a prefix
//! contributes that same leaf to every finer prefix beneath it, so each task
//! sees every row that can hash under its path.
//!
//! Tasks come out in ascending path order. Within a task, pages keep the
//! order in which their segments were passed in.

use serde::Serialize;

use crate::errors::{ChronoError, ChronoResult};
use crate::observability::{log_event_with_fields, Event};
use crate::trie::{Bucketer, Node, Path};

use super::Segment;

/// Page `page_idx` of segment number `segment` in the planned slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PageRef {
    pub segment: usize,
    pub page_idx: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeTask {
    pub path: Path,
    pub pages: Vec<PageRef>,
}

/// Final say over the pages of a task about to be emitted.
///
/// Returning `None` or an empty list drops the task.
pub trait PagesFilter {
    fn filter_pages(&self, segments: &[Segment], pages: Vec<PageRef>) -> Option<Vec<PageRef>>;
}

/// Keeps every page
#[derive(Debug, Clone, Copy, Default)]
pub struct AllPages;

impl PagesFilter for AllPages {
    fn filter_pages(&self, _segments: &[Segment], pages: Vec<PageRef>) -> Option<Vec<PageRef>> {
        Some(pages)
    }
}

struct WorkItem<'s> {
    /// (segment number, node) for every segment still relevant here
    nodes: Vec<(usize, &'s Node)>,
    path: Path,
}

pub struct MergePlanner;

impl MergePlanner {
    /// Plans over every page of `segments`.
    pub fn plan_all(segments: &[Segment]) -> ChronoResult<Vec<MergeTask>> {
        Self::plan(segments, None, &AllPages)
    }

    /// `path_pred` prunes whole subtrees: a prefix it rejects is never
    /// expanded.
    pub fn plan(
        segments: &[Segment],
        path_pred: Option<&dyn Fn(&[u8]) -> bool>,
        filter: &dyn PagesFilter,
    ) -> ChronoResult<Vec<MergeTask>> {
        let bucketer = common_bucketer(segments)?;

        let initial: Vec<(usize, &Node)> = segments
            .iter()
            .enumerate()
            .filter_map(|(seg_idx, seg)| seg.root_node().map(|root| (seg_idx, root)))
            .collect();

        let mut tasks = Vec::new();
        if initial.is_empty() {
            return Ok(tasks);
        }

        let fan_out = bucketer.fan_out();
        let mut stack = vec![WorkItem {
            nodes: initial,
            path: Vec::new(),
        }];

        while let Some(item) = stack.pop() {
            if let Some(pred) = path_pred {
                if !pred(&item.path) {
                    continue;
                }
            }

            if item.nodes.iter().any(|(_, node)| !node.is_leaf()) {
                // reversed so that they pop in ascending path order
                for bucket in (0..fan_out).rev() {
                    let nodes: Vec<(usize, &Node)> = item
                        .nodes
                        .iter()
                        .filter_map(|&(seg_idx, node)| match node {
                            Node::Branch(_) => node.child(bucket).map(|child| (seg_idx, child)),
                            Node::Leaf { .. } => Some((seg_idx, node)),
                        })
                        .collect();

                    if !nodes.is_empty() {
                        stack.push(WorkItem {
                            nodes,
                            path: Bucketer::conj_path(&item.path, bucket as u8),
                        });
                    }
                }
            } else {
                let pages: Vec<PageRef> = item
                    .nodes
                    .iter()
                    .filter_map(|&(segment, node)| match node {
                        Node::Leaf { page_idx } => Some(PageRef {
                            segment,
                            page_idx: *page_idx,
                        }),
                        Node::Branch(_) => None,
                    })
                    .collect();

                if let Some(pages) = filter.filter_pages(segments, pages) {
                    if !pages.is_empty() {
                        tasks.push(MergeTask {
                            path: item.path,
                            pages,
                        });
                    }
                }
            }
        }

        let segments_str = segments.len().to_string();
        let tasks_str = tasks.len().to_string();
        log_event_with_fields(
            Event::MergePlanBuilt,
            &[("segments", &segments_str), ("tasks", &tasks_str)],
        );

        Ok(tasks)
    }
}

/// All segments of one plan must slice iids identically.
fn common_bucketer(segments: &[Segment]) -> ChronoResult<Bucketer> {
    let mut iter = segments.iter();
    let first = match iter.next() {
        Some(seg) => seg.bucketer(),
        None => return Ok(Bucketer::default()),
    };

    for seg in iter {
        if seg.bucketer() != first {
            let err = ChronoError::malformed(format!(
                "segment '{}' uses {} level bits, '{}' uses {}",
                seg.name(),
                seg.bucketer().level_bits(),
                segments[0].name(),
                first.level_bits()
            ));
            log_event_with_fields(Event::MalformedInput, &[("reason", &err.to_string())]);
            return Err(err);
        }
    }

    Ok(first)
}
