//! Entity selection
//!
//! A selector narrows a scan to an exact iid or a sorted set of iids. It
//! pushes down three ways: trie paths no selected iid lies under are never
//! planned, pages whose bloom rules out every selected iid are pruned, and
//! rows of other entities are skipped during the merge.

use std::cmp::Ordering;

use crate::segment::PageMeta;
use crate::trie::{Bucketer, Iid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IidSelector {
    Exact(Iid),
    /// Sorted ascending, no duplicates
    Set(Vec<Iid>),
}

impl IidSelector {
    pub fn exact(iid: Iid) -> Self {
        IidSelector::Exact(iid)
    }

    /// Sorts and dedups `iids`; a single iid becomes `Exact`.
    pub fn set(mut iids: Vec<Iid>) -> Self {
        iids.sort_unstable();
        iids.dedup();
        if iids.len() == 1 {
            IidSelector::Exact(iids[0])
        } else {
            IidSelector::Set(iids)
        }
    }

    pub fn iids(&self) -> &[Iid] {
        match self {
            IidSelector::Exact(iid) => std::slice::from_ref(iid),
            IidSelector::Set(iids) => iids,
        }
    }

    pub fn selects(&self, iid: &Iid) -> bool {
        match self {
            IidSelector::Exact(selected) => selected == iid,
            IidSelector::Set(iids) => iids.binary_search(iid).is_ok(),
        }
    }

    /// Whether any selected iid lies under `path`.
    ///
    /// The iids under a path are one contiguous range starting at
    /// `start_iid(path)`, so a single binary search settles it.
    pub fn under_path(&self, bucketer: &Bucketer, path: &[u8]) -> bool {
        let iids = self.iids();
        let start = bucketer.start_iid(path);
        let idx = iids.partition_point(|iid| *iid < start);
        iids.get(idx)
            .map_or(false, |iid| bucketer.compare_to_path(iid, path) == Ordering::Equal)
    }

    /// Whether the page can hold a selected iid
    pub fn may_match(&self, meta: &PageMeta) -> bool {
        self.iids().iter().any(|iid| meta.might_contain(iid))
    }
}
