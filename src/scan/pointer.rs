//! Row pointers and the per-task merge queue
//!
//! Each page of a task gets one pointer over the rows that hash under the
//! task's path. A page can sit above that path in a shallower segment, so
//! the range is found by binary search rather than taken whole.
//!
//! The queue is a k-way merge, not a sort: every page is already in
//! `(iid asc, system_from desc)` order. Ties on `(iid, system_from)` go to
//! the page that comes first in the task.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::segment::Page;
use crate::temporal::InstantMicros;
use crate::trie::{Bucketer, Iid};

/// Cursor over the rows of one page that lie under a path
#[derive(Debug, Clone)]
pub struct RowPointer {
    page: Arc<Page>,
    idx: usize,
    end: usize,
}

impl RowPointer {
    pub fn new(page: Arc<Page>, bucketer: &Bucketer, path: &[u8]) -> Self {
        let iids = page.iids();
        let idx = iids.partition_point(|iid| bucketer.compare_to_path(iid, path) == Ordering::Less);
        let end = iids.partition_point(|iid| bucketer.compare_to_path(iid, path) != Ordering::Greater);
        Self { page, idx, end }
    }

    pub fn is_valid(&self) -> bool {
        self.idx < self.end
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn index(&self) -> usize {
        self.idx
    }

    pub fn remaining(&self) -> usize {
        self.end - self.idx
    }

    fn advance(&mut self) {
        self.idx += 1;
    }
}

#[derive(Debug, PartialEq, Eq)]
struct QueueEntry {
    iid: Iid,
    system_from: InstantMicros,
    page_pos: usize,
}

impl QueueEntry {
    fn key(&self) -> (Iid, Reverse<InstantMicros>, usize) {
        (self.iid, Reverse(self.system_from), self.page_pos)
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap pops the greatest entry: reversed so the smallest key pops first
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// Merged row stream of one task's pages
pub struct TaskRows {
    pointers: Vec<RowPointer>,
    queue: BinaryHeap<QueueEntry>,
}

impl TaskRows {
    /// `pages` in task order
    pub fn new(pages: Vec<Arc<Page>>, bucketer: &Bucketer, path: &[u8]) -> Self {
        let pointers: Vec<RowPointer> = pages
            .into_iter()
            .map(|page| RowPointer::new(page, bucketer, path))
            .collect();

        let mut queue = BinaryHeap::with_capacity(pointers.len());
        for (page_pos, ptr) in pointers.iter().enumerate() {
            if ptr.is_valid() {
                queue.push(Self::entry(ptr, page_pos));
            }
        }

        Self { pointers, queue }
    }

    fn entry(ptr: &RowPointer, page_pos: usize) -> QueueEntry {
        QueueEntry {
            iid: ptr.page.iid(ptr.idx),
            system_from: ptr.page.system_from(ptr.idx),
            page_pos,
        }
    }

    /// Pops the next row as `(page position in task, row index)`.
    pub fn next_row(&mut self) -> Option<(usize, usize)> {
        let head = self.queue.pop()?;
        let ptr = &mut self.pointers[head.page_pos];
        let row_idx = ptr.idx;

        ptr.advance();
        if ptr.is_valid() {
            let entry = Self::entry(ptr, head.page_pos);
            self.queue.push(entry);
        }

        Some((head.page_pos, row_idx))
    }

    pub fn page(&self, page_pos: usize) -> &Page {
        self.pointers[page_pos].page()
    }

    pub fn is_exhausted(&self) -> bool {
        self.queue.is_empty()
    }
}
