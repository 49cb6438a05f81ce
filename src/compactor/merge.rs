//! Event-row merge
//!
//! Merges segments into one relation in writer order without resolving
//! polygons: every version survives except those an erase has wiped.
//!
//! Per entity, the newest erase is kept so the compacted segment still
//! suppresses the entity in other segments it is later merged with. Every
//! older row of that entity is dropped.

use crate::errors::ChronoResult;
use crate::scan::TaskRows;
use crate::segment::{FactVersion, MergePlanner, MergeTask, OpKind, Segment};
use crate::trie::{Bucketer, Iid};

/// All rows of `segments`, sorted by iid ascending then system_from
/// descending, with erased history removed.
pub fn merge_segments(segments: &[Segment]) -> ChronoResult<Vec<FactVersion>> {
    let tasks = MergePlanner::plan_all(segments)?;

    let mut out = Vec::new();
    for task in &tasks {
        merge_task(segments, task, &mut out)?;
    }
    Ok(out)
}

fn merge_task(segments: &[Segment], task: &MergeTask, out: &mut Vec<FactVersion>) -> ChronoResult<()> {
    let mut bucketer = Bucketer::default();
    let mut pages = Vec::with_capacity(task.pages.len());
    for page_ref in &task.pages {
        let segment = &segments[page_ref.segment];
        bucketer = segment.bucketer();
        pages.push(segment.load_page(page_ref.page_idx)?);
    }

    let mut rows = TaskRows::new(pages, &bucketer, &task.path);
    let mut current: Option<Iid> = None;
    let mut erased = false;

    while let Some((page_pos, idx)) = rows.next_row() {
        let page = rows.page(page_pos);
        let iid = page.iid(idx);

        if current != Some(iid) {
            current = Some(iid);
            erased = false;
        }
        if erased {
            continue;
        }

        if page.op(idx) == OpKind::Erase {
            erased = true;
        }
        out.push(page.fact(idx));
    }

    Ok(())
}
