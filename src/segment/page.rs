//! Leaf pages
//!
//! A page is the columnar row-view of one trie leaf: fixed temporal columns,
//! an op column and one sparse column per content field. Rows are sorted by
//! iid ascending, then system_from descending.
//!
//! `PageMeta` is what a segment knows about a page without loading it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::temporal::{InstantMicros, TemporalBounds, MAX_INSTANT, MIN_INSTANT};
use crate::trie::Iid;

use super::fact::{Document, FactVersion, OpKind, Operation};

/// One content column; `None` where the row has no such field
pub type Column = Vec<Option<Value>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    iids: Vec<Iid>,
    valid_froms: Vec<InstantMicros>,
    valid_tos: Vec<InstantMicros>,
    system_froms: Vec<InstantMicros>,
    ops: Vec<OpKind>,
    columns: BTreeMap<String, Column>,
}

impl Page {
    /// Builds a page from rows already in page order.
    pub fn from_rows(rows: &[FactVersion]) -> Self {
        let mut page = Page {
            iids: Vec::with_capacity(rows.len()),
            valid_froms: Vec::with_capacity(rows.len()),
            valid_tos: Vec::with_capacity(rows.len()),
            system_froms: Vec::with_capacity(rows.len()),
            ops: Vec::with_capacity(rows.len()),
            columns: BTreeMap::new(),
        };

        for (idx, row) in rows.iter().enumerate() {
            page.iids.push(row.iid);
            page.valid_froms.push(row.valid_from);
            page.valid_tos.push(row.valid_to);
            page.system_froms.push(row.system_from);
            page.ops.push(row.kind());

            if let Operation::Put(doc) = &row.op {
                for (name, value) in doc {
                    let column = page
                        .columns
                        .entry(name.clone())
                        .or_insert_with(|| vec![None; rows.len()]);
                    column[idx] = Some(value.clone());
                }
            }
        }

        page
    }

    /// Reassembles a page from decoded columns; the codec checks the lengths.
    pub(crate) fn from_columns(
        iids: Vec<Iid>,
        valid_froms: Vec<InstantMicros>,
        valid_tos: Vec<InstantMicros>,
        system_froms: Vec<InstantMicros>,
        ops: Vec<OpKind>,
        columns: BTreeMap<String, Column>,
    ) -> Self {
        Self {
            iids,
            valid_froms,
            valid_tos,
            system_froms,
            ops,
            columns,
        }
    }

    pub fn row_count(&self) -> usize {
        self.iids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iids.is_empty()
    }

    pub fn iids(&self) -> &[Iid] {
        &self.iids
    }

    pub fn iid(&self, idx: usize) -> Iid {
        self.iids[idx]
    }

    pub fn valid_from(&self, idx: usize) -> InstantMicros {
        self.valid_froms[idx]
    }

    pub fn valid_to(&self, idx: usize) -> InstantMicros {
        self.valid_tos[idx]
    }

    pub fn system_from(&self, idx: usize) -> InstantMicros {
        self.system_froms[idx]
    }

    pub fn op(&self, idx: usize) -> OpKind {
        self.ops[idx]
    }

    pub(crate) fn valid_froms(&self) -> &[InstantMicros] {
        &self.valid_froms
    }

    pub(crate) fn valid_tos(&self) -> &[InstantMicros] {
        &self.valid_tos
    }

    pub(crate) fn system_froms(&self) -> &[InstantMicros] {
        &self.system_froms
    }

    pub(crate) fn ops(&self) -> &[OpKind] {
        &self.ops
    }

    pub fn columns(&self) -> &BTreeMap<String, Column> {
        &self.columns
    }

    /// Copies the content columns of row `idx`.
    ///
    /// With a projection, only the named columns are copied.
    pub fn copy_row(&self, idx: usize, projection: Option<&[String]>) -> Document {
        let mut doc = Document::new();
        match projection {
            None => {
                for (name, column) in &self.columns {
                    if let Some(value) = &column[idx] {
                        doc.insert(name.clone(), value.clone());
                    }
                }
            }
            Some(names) => {
                for name in names {
                    if let Some(Some(value)) = self.columns.get(name).map(|c| &c[idx]) {
                        doc.insert(name.clone(), value.clone());
                    }
                }
            }
        }
        doc
    }

    /// Row `idx` as a fact-version
    pub fn fact(&self, idx: usize) -> FactVersion {
        let op = match self.ops[idx] {
            OpKind::Put => Operation::Put(self.copy_row(idx, None)),
            OpKind::Delete => Operation::Delete,
            OpKind::Erase => Operation::Erase,
        };
        FactVersion {
            iid: self.iids[idx],
            valid_from: self.valid_froms[idx],
            valid_to: self.valid_tos[idx],
            system_from: self.system_froms[idx],
            op,
        }
    }

    /// Collects page metadata; `offset`/`len` are filled in by the persisted
    /// writer.
    pub fn meta(&self, bloom_bits: usize) -> PageMeta {
        let mut meta = PageMeta {
            offset: 0,
            len: 0,
            row_count: self.row_count(),
            min_system_from: MAX_INSTANT,
            max_system_from: MIN_INSTANT,
            min_valid_from: MAX_INSTANT,
            max_valid_to: MIN_INSTANT,
            iid_bloom: IidBloom::new(bloom_bits),
            has_erase: false,
            column_stats: BTreeMap::new(),
        };

        for idx in 0..self.row_count() {
            meta.min_system_from = meta.min_system_from.min(self.system_froms[idx]);
            meta.max_system_from = meta.max_system_from.max(self.system_froms[idx]);
            meta.min_valid_from = meta.min_valid_from.min(self.valid_froms[idx]);
            meta.max_valid_to = meta.max_valid_to.max(self.valid_tos[idx]);
            meta.iid_bloom.insert(&self.iids[idx]);
            meta.has_erase |= self.op(idx) == OpKind::Erase;
        }

        for (name, column) in &self.columns {
            let mut range: Option<NumericRange> = None;
            for value in column.iter().flatten() {
                if let Some(n) = value.as_f64() {
                    range = Some(match range {
                        None => NumericRange { min: n, max: n },
                        Some(r) => NumericRange {
                            min: r.min.min(n),
                            max: r.max.max(n),
                        },
                    });
                }
            }
            if let Some(range) = range {
                meta.column_stats.insert(name.clone(), range);
            }
        }

        meta
    }
}

/// Bloom filter over the iids of one page.
///
/// Iids are already uniformly distributed hashes, so the probe positions are
/// derived straight from their two halves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IidBloom {
    words: Vec<u64>,
}

const BLOOM_HASHES: u64 = 3;

impl IidBloom {
    /// `bits` is rounded up to a whole number of words
    pub fn new(bits: usize) -> Self {
        Self {
            words: vec![0; bits.div_ceil(64).max(1)],
        }
    }

    fn bit_count(&self) -> u64 {
        self.words.len() as u64 * 64
    }

    fn positions(&self, iid: &Iid) -> impl Iterator<Item = u64> {
        let bytes = iid.as_bytes();
        let mut hi = [0u8; 8];
        let mut lo = [0u8; 8];
        hi.copy_from_slice(&bytes[..8]);
        lo.copy_from_slice(&bytes[8..]);
        let h1 = u64::from_be_bytes(hi);
        let h2 = u64::from_be_bytes(lo) | 1;
        let bit_count = self.bit_count();
        (0..BLOOM_HASHES).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % bit_count)
    }

    pub fn insert(&mut self, iid: &Iid) {
        let positions: Vec<u64> = self.positions(iid).collect();
        for pos in positions {
            self.words[(pos / 64) as usize] |= 1 << (pos % 64);
        }
    }

    /// False positives possible, false negatives not
    pub fn might_contain(&self, iid: &Iid) -> bool {
        self.positions(iid)
            .all(|pos| self.words[(pos / 64) as usize] & (1 << (pos % 64)) != 0)
    }

    /// Whether the two filters may hold a common iid. Positions depend on the
    /// filter size, so filters of different sizes always count as
    /// intersecting.
    pub fn intersects(&self, other: &IidBloom) -> bool {
        if self.words.len() != other.words.len() {
            return true;
        }
        self.words
            .iter()
            .zip(&other.words)
            .any(|(a, b)| a & b != 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

/// What a segment records about each page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    /// Byte offset of the page record in `data.pages`
    #[serde(default)]
    pub offset: u64,
    /// Length of the page record in bytes
    #[serde(default)]
    pub len: u64,
    pub row_count: usize,
    pub min_system_from: InstantMicros,
    pub max_system_from: InstantMicros,
    pub min_valid_from: InstantMicros,
    pub max_valid_to: InstantMicros,
    pub iid_bloom: IidBloom,
    /// Erases apply whatever the as-of time
    #[serde(default)]
    pub has_erase: bool,
    /// Min/max over the numeric values of each content column
    #[serde(default)]
    pub column_stats: BTreeMap<String, NumericRange>,
}

impl PageMeta {
    /// Whether any row of the page can take part in a query with `bounds`.
    ///
    /// Only rows unknown as of the query, or wholly outside its valid time,
    /// are irrelevant: a row before the system-time window still caps older
    /// rows of its entity. A page holding an erase is always relevant.
    pub fn overlaps(&self, bounds: &TemporalBounds) -> bool {
        self.has_erase
            || bounds.knows(self.min_system_from)
            && bounds
                .valid_time
                .intersects(self.min_valid_from, self.max_valid_to)
    }

    pub fn might_contain(&self, iid: &Iid) -> bool {
        self.iid_bloom.might_contain(iid)
    }

    pub fn column_range(&self, column: &str) -> Option<&NumericRange> {
        self.column_stats.get(column)
    }
}
