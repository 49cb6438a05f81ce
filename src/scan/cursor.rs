//! Scan cursor
//!
//! Pull-based: each `advance` runs merge tasks in ascending path order until
//! one produces rows, and returns that task's batch.
//!
//! Per task:
//!
//! ```text
//! load every task page
//! merge rows by (iid asc, system_from desc, task page order)
//! for each row:
//!     new iid        -> reset the ceiling
//!     erase          -> reset, skip the rest of this iid
//!     unknown as-of  -> skip
//!     otherwise      -> resolve the polygon, emit puts, apply to the ceiling
//! ```
//!
//! A failed page load aborts the task and ends the cursor; rows already
//! returned stand.

use std::sync::Arc;
use std::vec;

use crate::bitemporal::{is_stale, Ceiling, Polygon, PolygonResolver};
use crate::errors::{ChronoError, ChronoResult};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::segment::{Document, MergePlanner, MergeTask, OpKind, Page, Segment};
use crate::temporal::{InstantMicros, MAX_INSTANT};
use crate::trie::{Bucketer, Iid};

use super::filters::PredicateFilter;
use super::pointer::TaskRows;
use super::sink::{OutputRow, RowBatch, RowSink};
use super::spec::{PageSelection, ScanSpec};

/// Plans the tasks of a scan, pruning paths and pages with `spec`.
pub fn plan_scan(
    segments: &[Segment],
    spec: &ScanSpec,
    metrics: Option<&MetricsRegistry>,
) -> ChronoResult<Vec<MergeTask>> {
    let bucketer = segments.first().map(Segment::bucketer).unwrap_or_default();
    let filter = PageSelection::new(spec, metrics);

    let tasks = match &spec.selector {
        Some(selector) => {
            let under_selected = |path: &[u8]| selector.under_path(&bucketer, path);
            MergePlanner::plan(segments, Some(&under_selected), &filter)?
        }
        None => MergePlanner::plan(segments, None, &filter)?,
    };

    if let Some(metrics) = metrics {
        metrics.add_tasks_planned(tasks.len() as u64);
    }
    Ok(tasks)
}

pub struct ScanCursor<'s> {
    segments: &'s [Segment],
    spec: ScanSpec,
    tasks: vec::IntoIter<MergeTask>,
    ceiling: Ceiling,
    polygon: Polygon,
    metrics: Option<Arc<MetricsRegistry>>,
    done: bool,
}

impl<'s> ScanCursor<'s> {
    pub fn new(segments: &'s [Segment], spec: ScanSpec) -> ChronoResult<Self> {
        let tasks = plan_scan(segments, &spec, None)?;
        Ok(Self::for_tasks(segments, spec, tasks))
    }

    pub fn with_metrics(
        segments: &'s [Segment],
        spec: ScanSpec,
        metrics: Arc<MetricsRegistry>,
    ) -> ChronoResult<Self> {
        let tasks = plan_scan(segments, &spec, Some(&metrics))?;
        let mut cursor = Self::for_tasks(segments, spec, tasks);
        cursor.metrics = Some(metrics);
        Ok(cursor)
    }

    /// Scans only `tasks`, e.g. one share of a plan fanned out across
    /// threads. Tasks must come from a plan over the same `segments`.
    pub fn for_tasks(segments: &'s [Segment], spec: ScanSpec, tasks: Vec<MergeTask>) -> Self {
        Self {
            segments,
            spec,
            tasks: tasks.into_iter(),
            ceiling: Ceiling::new(),
            polygon: Polygon::new(),
            metrics: None,
            done: false,
        }
    }

    pub fn remaining_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Next non-empty batch, or `None` once every task is scanned.
    pub fn advance(&mut self) -> ChronoResult<Option<RowBatch>> {
        if self.done {
            return Ok(None);
        }

        while let Some(task) = self.tasks.next() {
            let rows = match self.scan_task(&task) {
                Ok(rows) => rows,
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            };

            if let Some(metrics) = &self.metrics {
                metrics.increment_tasks_scanned();
                metrics.add_rows_emitted(rows.len() as u64);
            }
            let path_str = format!("{:?}", task.path);
            let rows_str = rows.len().to_string();
            log_event_with_fields(
                Event::ScanTaskComplete,
                &[("path", &path_str), ("rows", &rows_str)],
            );

            if !rows.is_empty() {
                return Ok(Some(RowBatch {
                    path: task.path,
                    rows,
                }));
            }
        }

        self.done = true;
        Ok(None)
    }

    /// Drains the cursor into `sink`, returning the number of rows written.
    pub fn drain_into(&mut self, sink: &mut dyn RowSink) -> ChronoResult<usize> {
        let mut written = 0;
        while let Some(batch) = self.advance()? {
            written += batch.len();
            for row in batch.rows {
                sink.write_row(row)?;
            }
        }
        sink.flush()?;
        Ok(written)
    }

    /// Collects every remaining row
    pub fn collect_rows(&mut self) -> ChronoResult<Vec<OutputRow>> {
        let mut rows = Vec::new();
        self.drain_into(&mut rows)?;
        Ok(rows)
    }

    fn scan_task(&mut self, task: &MergeTask) -> ChronoResult<Vec<OutputRow>> {
        let mut bucketer = Bucketer::default();
        let mut pages = Vec::with_capacity(task.pages.len());
        for page_ref in &task.pages {
            let segment = &self.segments[page_ref.segment];
            bucketer = segment.bucketer();
            pages.push(segment.load_page(page_ref.page_idx)?);
            if let Some(metrics) = &self.metrics {
                metrics.increment_pages_loaded();
            }
        }

        let mut rows = TaskRows::new(pages, &bucketer, &task.path);
        let mut out = Vec::new();
        let mut current: Option<Iid> = None;
        let mut erased = false;
        let mut last_system_from = MAX_INSTANT;

        while let Some((page_pos, idx)) = rows.next_row() {
            let page = rows.page(page_pos);
            let iid = page.iid(idx);
            let system_from = page.system_from(idx);

            // order is checked on every row, whatever the query skips
            if current == Some(iid) && system_from > last_system_from {
                return Err(malformed_entity(
                    ChronoError::malformed(format!(
                        "system_from {} arrived after {}: versions of one entity must be \
                         in descending system-time order",
                        system_from, last_system_from
                    )),
                    &iid,
                ));
            }
            last_system_from = system_from;

            if current != Some(iid) {
                self.ceiling.reset();
                current = Some(iid);
                erased = false;
            }
            if erased {
                continue;
            }

            if let Some(selector) = &self.spec.selector {
                if !selector.selects(&iid) {
                    continue;
                }
            }

            let op = page.op(idx);
            if op == OpKind::Erase {
                self.ceiling.reset();
                erased = true;
                continue;
            }

            if !self.spec.bounds.knows(system_from) {
                continue;
            }

            let version = (system_from, page.valid_from(idx), page.valid_to(idx));
            PolygonResolver::resolve_into(&self.ceiling, &version, &mut self.polygon)
                .map_err(|e| malformed_entity(e, &iid))?;

            if op == OpKind::Put {
                emit_put(&self.polygon, &self.spec, page, idx, iid, system_from, &mut out);
            }

            self.ceiling
                .apply_log(version.0, version.1, version.2)
                .map_err(|e| malformed_entity(e, &iid))?;
        }

        Ok(out)
    }
}

impl Iterator for ScanCursor<'_> {
    type Item = ChronoResult<RowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}

fn malformed_entity(e: ChronoError, iid: &Iid) -> ChronoError {
    let iid_str = iid.to_string();
    let reason = e.to_string();
    log_event_with_fields(Event::MalformedInput, &[("iid", &iid_str), ("reason", &reason)]);
    e
}

/// Emits one row per rectangle of the resolved polygon that survives the
/// query bounds, clipped to them.
fn emit_put(
    polygon: &Polygon,
    spec: &ScanSpec,
    page: &Page,
    idx: usize,
    iid: Iid,
    system_from: InstantMicros,
    out: &mut Vec<OutputRow>,
) {
    let bounds = &spec.bounds;
    if polygon.is_empty() || is_stale(polygon, bounds.valid_time.lower, bounds.system_time.lower) {
        return;
    }

    let mut content: Option<Document> = None;

    for rect in polygon.rectangles() {
        if rect.valid_from >= rect.valid_to || system_from >= rect.system_to {
            continue;
        }
        if !bounds.intersects(rect.valid_from, rect.valid_to, system_from, rect.system_to) {
            continue;
        }

        let doc = match &content {
            Some(doc) => doc.clone(),
            None => {
                let full = page.copy_row(idx, None);
                if !PredicateFilter::matches(&full, &spec.predicates) {
                    return;
                }
                let doc = project(full, spec.projection.as_deref());
                content = Some(doc.clone());
                doc
            }
        };

        let (valid_from, valid_to) = bounds.valid_time.clip(rect.valid_from, rect.valid_to);
        let (row_system_from, system_to) = bounds.system_time.clip(system_from, rect.system_to);

        out.push(OutputRow {
            iid,
            valid_from,
            valid_to,
            system_from: row_system_from,
            system_to,
            doc,
        });
    }
}

fn project(mut doc: Document, projection: Option<&[String]>) -> Document {
    if let Some(columns) = projection {
        doc.retain(|name, _| columns.iter().any(|c| c == name));
    }
    doc
}
