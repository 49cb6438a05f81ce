//! Bucket assignment
//!
//! Level `n` of every trie consumes bits `[n * level_bits, (n + 1) * level_bits)`
//! of the iid, most significant first. Bucket assignment depends only on the
//! iid and the level, never on the shape of the trie that holds it, which is
//! what makes differently-shaped segments mergeable by shared prefix.

use std::cmp::Ordering;

use crate::errors::{ChronoError, ChronoResult};

use super::iid::{Iid, IID_LEN};

/// A hash-path prefix: one bucket per trie level, root first
pub type Path = Vec<u8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucketer {
    level_bits: u8,
    mask: u8,
}

impl Default for Bucketer {
    fn default() -> Self {
        Self {
            level_bits: 2,
            mask: 0b11,
        }
    }
}

impl Bucketer {
    /// `level_bits` must divide a byte: 2, 4 or 8
    pub fn new(level_bits: u8) -> ChronoResult<Self> {
        match level_bits {
            2 | 4 | 8 => Ok(Self {
                level_bits,
                mask: ((1u16 << level_bits) - 1) as u8,
            }),
            other => Err(ChronoError::config(format!(
                "level_bits must be 2, 4 or 8, got {}",
                other
            ))),
        }
    }

    pub fn level_bits(&self) -> u8 {
        self.level_bits
    }

    /// Number of children per branch
    pub fn fan_out(&self) -> usize {
        1 << self.level_bits
    }

    /// Deepest level at which an iid still has unconsumed bits
    pub fn max_depth(&self) -> usize {
        IID_LEN * 8 / self.level_bits as usize
    }

    /// Bucket of `iid` at trie depth `level`
    #[inline]
    pub fn bucket_for(&self, iid: &Iid, level: usize) -> u8 {
        let bits = self.level_bits as usize;
        let bit_idx = level * bits;
        let byte = iid.as_bytes()[bit_idx / 8];
        let shift = 8 - bits - bit_idx % 8;
        (byte >> shift) & self.mask
    }

    /// Compares the leading buckets of `iid` against `path`.
    ///
    /// `Equal` means the iid lies under the prefix.
    pub fn compare_to_path(&self, iid: &Iid, path: &[u8]) -> Ordering {
        for (level, &bucket) in path.iter().enumerate() {
            match self.bucket_for(iid, level).cmp(&bucket) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Smallest iid under `path`
    pub fn start_iid(&self, path: &[u8]) -> Iid {
        let bits = self.level_bits as usize;
        let mut bytes = [0u8; IID_LEN];

        for (level, &bucket) in path.iter().enumerate().take(self.max_depth()) {
            let bit_idx = level * bits;
            let shift = 8 - bits - bit_idx % 8;
            bytes[bit_idx / 8] |= (bucket & self.mask) << shift;
        }

        Iid::from_bytes(bytes)
    }

    /// The next path of the same length in ascending order, or `None` once
    /// every bucket is at its maximum.
    pub fn increment_path(&self, path: &[u8]) -> Option<Path> {
        let mut next = path.to_vec();
        for idx in (0..next.len()).rev() {
            if next[idx] < self.mask {
                next[idx] += 1;
                return Some(next);
            }
            next[idx] = 0;
        }
        None
    }

    /// `path` extended by one level
    pub fn conj_path(path: &[u8], bucket: u8) -> Path {
        let mut child = Vec::with_capacity(path.len() + 1);
        child.extend_from_slice(path);
        child.push(bucket);
        child
    }

    /// Full path of `iid` down to `depth` levels
    pub fn path_of(&self, iid: &Iid, depth: usize) -> Path {
        (0..depth.min(self.max_depth()))
            .map(|level| self.bucket_for(iid, level))
            .collect()
    }
}
