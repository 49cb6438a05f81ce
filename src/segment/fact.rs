//! Fact-versions
//!
//! One input row of a segment: an entity id, its valid-time span, the system
//! time it was recorded and what it records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bitemporal::VersionExtent;
use crate::errors::{ChronoError, ChronoResult};
use crate::temporal::{InstantMicros, MAX_INSTANT};
use crate::trie::Iid;

/// Content columns of a `put`, keyed by column name
pub type Document = Map<String, Value>;

/// Operation tag stored in the page's op column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Put,
    Delete,
    Erase,
}

impl OpKind {
    pub fn as_u8(self) -> u8 {
        match self {
            OpKind::Put => 0,
            OpKind::Delete => 1,
            OpKind::Erase => 2,
        }
    }

    pub fn from_u8(tag: u8) -> ChronoResult<Self> {
        match tag {
            0 => Ok(OpKind::Put),
            1 => Ok(OpKind::Delete),
            2 => Ok(OpKind::Erase),
            other => Err(ChronoError::corruption(format!("unknown op tag {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Asserts the document over the valid-time span
    Put(Document),
    /// Retracts the entity over the valid-time span
    Delete,
    /// Removes every trace of the entity, across all time
    Erase,
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Put(_) => OpKind::Put,
            Operation::Delete => OpKind::Delete,
            Operation::Erase => OpKind::Erase,
        }
    }
}

/// One immutable, versioned row
#[derive(Debug, Clone, PartialEq)]
pub struct FactVersion {
    pub iid: Iid,
    pub valid_from: InstantMicros,
    pub valid_to: InstantMicros,
    pub system_from: InstantMicros,
    pub op: Operation,
}

impl FactVersion {
    /// A `put` valid from `valid_from` until further notice
    pub fn put(iid: Iid, system_from: InstantMicros, valid_from: InstantMicros, doc: Document) -> Self {
        Self {
            iid,
            valid_from,
            valid_to: MAX_INSTANT,
            system_from,
            op: Operation::Put(doc),
        }
    }

    pub fn delete(iid: Iid, system_from: InstantMicros, valid_from: InstantMicros) -> Self {
        Self {
            iid,
            valid_from,
            valid_to: MAX_INSTANT,
            system_from,
            op: Operation::Delete,
        }
    }

    /// An erase spans all of valid time
    pub fn erase(iid: Iid, system_from: InstantMicros) -> Self {
        Self {
            iid,
            valid_from: crate::temporal::MIN_INSTANT,
            valid_to: MAX_INSTANT,
            system_from,
            op: Operation::Erase,
        }
    }

    pub fn with_valid_to(mut self, valid_to: InstantMicros) -> Self {
        self.valid_to = valid_to;
        self
    }

    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    /// Order rows are stored and merged in: iid ascending, then newest first
    pub fn sort_key(&self) -> (Iid, std::cmp::Reverse<InstantMicros>) {
        (self.iid, std::cmp::Reverse(self.system_from))
    }
}

impl VersionExtent for FactVersion {
    fn system_from(&self) -> InstantMicros {
        self.system_from
    }

    fn valid_from(&self) -> InstantMicros {
        self.valid_from
    }

    fn valid_to(&self) -> InstantMicros {
        self.valid_to
    }
}

/// Sorts rows into writer order.
pub fn sort_for_write(rows: &mut [FactVersion]) {
    rows.sort_by_key(|row| row.sort_key());
}

/// Checks that `rows` are in writer order, naming the first offending row.
pub fn check_write_order(rows: &[FactVersion]) -> ChronoResult<()> {
    for (idx, pair) in rows.windows(2).enumerate() {
        if pair[0].sort_key() > pair[1].sort_key() {
            return Err(ChronoError::malformed(format!(
                "row {} ({}, system_from {}) is out of order after ({}, system_from {}); \
                 rows must be sorted by iid ascending then system_from descending",
                idx + 1,
                pair[1].iid,
                pair[1].system_from,
                pair[0].iid,
                pair[0].system_from
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_op_tags() {
        for kind in [OpKind::Put, OpKind::Delete, OpKind::Erase] {
            assert_eq!(OpKind::from_u8(kind.as_u8()).unwrap(), kind);
        }
        assert!(OpKind::from_u8(9).unwrap_err().is_fatal());
    }

    #[test]
    fn test_sort_for_write() {
        let a = Iid::from_bytes([1; 16]);
        let b = Iid::from_bytes([2; 16]);
        let mut rows = vec![
            FactVersion::put(b, 1, 0, doc(json!({}))),
            FactVersion::put(a, 1, 0, doc(json!({}))),
            FactVersion::put(a, 5, 0, doc(json!({}))),
        ];
        sort_for_write(&mut rows);

        let keys: Vec<_> = rows.iter().map(|r| (r.iid, r.system_from)).collect();
        assert_eq!(keys, vec![(a, 5), (a, 1), (b, 1)]);
        check_write_order(&rows).unwrap();
    }

    #[test]
    fn test_check_write_order_rejects_ascending_system_time() {
        let a = Iid::from_bytes([1; 16]);
        let rows = vec![FactVersion::delete(a, 1, 0), FactVersion::delete(a, 2, 0)];
        let err = check_write_order(&rows).unwrap_err();
        assert_eq!(err.code().code(), "CHRONO_MALFORMED_INPUT");
    }

    #[test]
    fn test_erase_spans_all_valid_time() {
        let erase = FactVersion::erase(Iid::from_bytes([3; 16]), 9);
        assert_eq!(erase.valid_from, crate::temporal::MIN_INSTANT);
        assert_eq!(erase.valid_to, MAX_INSTANT);
        assert_eq!(erase.kind(), OpKind::Erase);
    }
}
