//! Write/Scan Round-Trip Tests
//!
//! Tests for invariants:
//! - a relation written through the trie writer and scanned with unbounded
//!   bounds gives back every put exactly once, unchanged
//! - deletes and erases never surface as rows
//! - the writer rejects relations out of writer order before writing anything

use std::collections::BTreeSet;

use chronoscan::config::EngineConfig;
use chronoscan::scan::{OutputRow, ScanCursor, ScanSpec};
use chronoscan::segment::{sort_for_write, Document, FactVersion, MemorySegment, Operation, Page, Segment};
use chronoscan::temporal::MAX_INSTANT;
use chronoscan::trie::{Iid, TrieWriter};
use serde_json::json;

fn doc(v: serde_json::Value) -> Document {
    v.as_object().cloned().unwrap()
}

/// Entities with disjoint valid ranges per version, so no version caps another
fn relation(entities: usize) -> Vec<FactVersion> {
    let mut rows = Vec::new();
    for e in 0..entities {
        let iid = Iid::for_key(&format!("user-{}", e));
        for v in 0..3i64 {
            let from = v * 10;
            rows.push(
                FactVersion::put(iid, 100 + v, from, doc(json!({ "n": e, "v": v, "name": format!("u{}", e) })))
                    .with_valid_to(from + 10),
            );
        }
    }
    sort_for_write(&mut rows);
    rows
}

fn as_tuple(row: &OutputRow) -> (Iid, i64, i64, i64, i64, String) {
    (
        row.iid,
        row.valid_from,
        row.valid_to,
        row.system_from,
        row.system_to,
        serde_json::to_string(&row.doc).unwrap(),
    )
}

fn expected_tuple(row: &FactVersion) -> (Iid, i64, i64, i64, i64, String) {
    let doc = match &row.op {
        Operation::Put(doc) => doc,
        other => panic!("not a put: {:?}", other),
    };
    (
        row.iid,
        row.valid_from,
        row.valid_to,
        row.system_from,
        MAX_INSTANT,
        serde_json::to_string(doc).unwrap(),
    )
}

#[test]
fn test_round_trip_reproduces_puts() {
    for limit in [1, 2, 7, 1024] {
        let rows = relation(40);
        let config = EngineConfig::default().with_leaf_row_limit(limit);
        let segments: Vec<Segment> = vec![MemorySegment::write("rt", &rows, &config).unwrap().into()];

        let out = ScanCursor::new(&segments, ScanSpec::new())
            .unwrap()
            .collect_rows()
            .unwrap();

        let got: BTreeSet<_> = out.iter().map(as_tuple).collect();
        let want: BTreeSet<_> = rows.iter().map(expected_tuple).collect();
        assert_eq!(out.len(), rows.len());
        assert_eq!(got, want, "leaf limit {}", limit);
    }
}

#[test]
fn test_round_trip_output_is_in_merge_order() {
    let rows = relation(25);
    let config = EngineConfig::default().with_leaf_row_limit(4);
    let segments: Vec<Segment> = vec![MemorySegment::write("rt", &rows, &config).unwrap().into()];

    let out = ScanCursor::new(&segments, ScanSpec::new())
        .unwrap()
        .collect_rows()
        .unwrap();

    let keys: Vec<_> = out.iter().map(|r| (r.iid, std::cmp::Reverse(r.system_from))).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn test_deletes_and_erases_never_emit() {
    let a = Iid::for_key("a");
    let b = Iid::for_key("b");
    let mut rows = vec![
        FactVersion::delete(a, 5, 0),
        FactVersion::put(a, 3, 100, doc(json!({"x": 1}))),
        FactVersion::erase(b, 9),
    ];
    sort_for_write(&mut rows);

    let segments: Vec<Segment> = vec![MemorySegment::write("s", &rows, &EngineConfig::default())
        .unwrap()
        .into()];
    let out = ScanCursor::new(&segments, ScanSpec::new())
        .unwrap()
        .collect_rows()
        .unwrap();

    // the put at valid 100.. is capped from system time 5 by the delete
    assert_eq!(out.len(), 1);
    assert_eq!(
        (out[0].iid, out[0].valid_from, out[0].system_from, out[0].system_to),
        (a, 100, 3, 5)
    );
}

#[test]
fn test_unsorted_relation_is_rejected() {
    let iid = Iid::for_key("x");
    let rows = vec![
        FactVersion::put(iid, 1, 0, Document::new()),
        FactVersion::put(iid, 2, 0, Document::new()),
    ];

    let writer = TrieWriter::new(&EngineConfig::default()).unwrap();
    let mut pages: Vec<Page> = Vec::new();
    let err = writer.write(&rows, &mut pages).unwrap_err();

    assert_eq!(err.code().code(), "CHRONO_MALFORMED_INPUT");
    assert!(pages.is_empty());
}
