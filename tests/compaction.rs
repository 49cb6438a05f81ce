//! Compaction Invariant Tests
//!
//! Tests for invariants:
//! - reading the compacted segment gives the same scan result as reading its
//!   inputs, under any bounds
//! - history older than an erase is dropped, the erase itself survives
//! - a compacted segment still suppresses erased entities in segments it is
//!   later read together with

use chronoscan::compactor::{merge_segments, Compactor};
use chronoscan::config::EngineConfig;
use chronoscan::scan::{OutputRow, ScanCursor, ScanSpec};
use chronoscan::segment::{Document, FactVersion, MemorySegment, OpKind, PersistedSegment, Segment};
use chronoscan::temporal::{TemporalBounds, MAX_INSTANT};
use chronoscan::trie::Iid;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn doc(n: i64) -> Document {
    json!({ "n": n }).as_object().cloned().unwrap()
}

/// Rows of `entities` entities, system times drawn from `system_range` and
/// distinct per entity
fn history(rng: &mut StdRng, entities: usize, system_range: std::ops::Range<i64>) -> Vec<FactVersion> {
    let mut rows = Vec::new();
    for e in 0..entities {
        let iid = Iid::for_key(&format!("c{}", e));
        let mut used = Vec::new();
        for _ in 0..rng.gen_range(0..5) {
            let sf = rng.gen_range(system_range.clone());
            if used.contains(&sf) {
                continue;
            }
            used.push(sf);

            let from = rng.gen_range(0..30);
            let to = if rng.gen_bool(0.5) { MAX_INSTANT } else { rng.gen_range(from + 1..=35) };
            rows.push(match rng.gen_range(0..12) {
                0 => FactVersion::erase(iid, sf),
                1 | 2 => FactVersion::delete(iid, sf, from).with_valid_to(to),
                _ => FactVersion::put(iid, sf, from, doc(sf)).with_valid_to(to),
            });
        }
    }
    rows
}

fn memory(name: &str, rows: Vec<FactVersion>, config: &EngineConfig) -> Segment {
    MemorySegment::from_unsorted(name, rows, config).unwrap().into()
}

fn scan(segments: &[Segment], bounds: TemporalBounds) -> Vec<OutputRow> {
    ScanCursor::new(segments, ScanSpec::new().with_bounds(bounds))
        .unwrap()
        .collect_rows()
        .unwrap()
}

fn sample_bounds() -> Vec<TemporalBounds> {
    vec![
        TemporalBounds::unbounded(),
        TemporalBounds::as_of(10),
        TemporalBounds::as_of(25).with_valid_at(12),
        TemporalBounds::unbounded().with_valid_at(3),
        TemporalBounds::as_of(60),
    ]
}

// =============================================================================
// Equivalence
// =============================================================================

#[test]
fn test_compaction_preserves_scan_results() {
    let mut rng = StdRng::seed_from_u64(17);

    for round in 0..8 {
        let config = EngineConfig::default().with_leaf_row_limit(rng.gen_range(1..5));
        let rows = history(&mut rng, 40, 1..60);

        let mut shards: Vec<Vec<FactVersion>> = vec![Vec::new(); 3];
        for row in rows {
            shards[rng.gen_range(0..3)].push(row);
        }
        let inputs: Vec<Segment> = shards
            .into_iter()
            .enumerate()
            .map(|(i, rows)| memory(&format!("r{}-{}", round, i), rows, &config))
            .collect();

        let compacted: Vec<Segment> = vec![Compactor::new(&config)
            .unwrap()
            .compact_to_memory(&inputs, "out")
            .unwrap()
            .into()];

        for bounds in sample_bounds() {
            assert_eq!(scan(&compacted, bounds), scan(&inputs, bounds), "round {} {:?}", round, bounds);
        }
    }
}

#[test]
fn test_compacted_older_segments_merge_with_newer() {
    let mut rng = StdRng::seed_from_u64(23);
    let config = EngineConfig::default().with_leaf_row_limit(3);

    let older_a = memory("a", history(&mut rng, 30, 1..30), &config);
    let older_b = memory("b", history(&mut rng, 30, 30..60), &config);
    let newer = memory("n", history(&mut rng, 30, 60..90), &config);

    let compacted: Segment = Compactor::new(&config)
        .unwrap()
        .compact_to_memory(&[older_a.clone(), older_b.clone()], "ab")
        .unwrap()
        .into();

    let originals = vec![newer.clone(), older_b, older_a];
    let replaced = vec![newer, compacted];

    for bounds in sample_bounds() {
        assert_eq!(scan(&replaced, bounds), scan(&originals, bounds), "{:?}", bounds);
    }
}

// =============================================================================
// Erase
// =============================================================================

#[test]
fn test_erase_drops_older_history() {
    let config = EngineConfig::default();
    let gone = Iid::for_key("gone");
    let kept = Iid::for_key("kept");

    let inputs = vec![
        memory(
            "new",
            vec![FactVersion::put(gone, 9, 0, doc(9)), FactVersion::erase(gone, 8)],
            &config,
        ),
        memory(
            "old",
            vec![
                FactVersion::put(gone, 5, 0, doc(5)),
                FactVersion::erase(gone, 3),
                FactVersion::put(kept, 4, 0, doc(4)),
            ],
            &config,
        ),
    ];

    let merged = merge_segments(&inputs).unwrap();
    let gone_rows: Vec<(i64, OpKind)> = merged
        .iter()
        .filter(|r| r.iid == gone)
        .map(|r| (r.system_from, r.kind()))
        .collect();
    assert_eq!(gone_rows, vec![(9, OpKind::Put), (8, OpKind::Erase)]);
    assert_eq!(merged.iter().filter(|r| r.iid == kept).count(), 1);
}

#[test]
fn test_compacted_erase_still_suppresses_other_segments() {
    let config = EngineConfig::default();
    let iid = Iid::for_key("x");

    let erase_only = memory("e", vec![FactVersion::erase(iid, 50)], &config);
    let compacted: Segment = Compactor::new(&config)
        .unwrap()
        .compact_to_memory(&[erase_only], "e2")
        .unwrap()
        .into();

    let untouched = memory("old", vec![FactVersion::put(iid, 10, 0, doc(10))], &config);
    assert!(scan(&[compacted, untouched], TemporalBounds::unbounded()).is_empty());
}

// =============================================================================
// On disk
// =============================================================================

#[test]
fn test_compact_persisted_inputs_to_disk() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::default()
        .with_data_dir(dir.path())
        .with_leaf_row_limit(2);
    let mut rng = StdRng::seed_from_u64(31);

    let inputs: Vec<Segment> = (0..2)
        .map(|i| {
            let mut rows = history(&mut rng, 20, (i * 40 + 1)..(i * 40 + 40));
            chronoscan::segment::sort_for_write(&mut rows);
            PersistedSegment::write(&config, &format!("in{}", i), &rows)
                .unwrap()
                .into()
        })
        .collect();

    Compactor::new(&config)
        .unwrap()
        .compact_to_disk(&inputs, "out")
        .unwrap();
    let output: Vec<Segment> = vec![PersistedSegment::open(&config, "out").unwrap().into()];

    for bounds in sample_bounds() {
        assert_eq!(scan(&output, bounds), scan(&inputs, bounds), "{:?}", bounds);
    }
}
