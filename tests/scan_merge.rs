//! Scan Merge Invariant Tests
//!
//! Tests for invariants:
//! - sharding rows over segments, pages and tasks never changes the result:
//!   the merged scan agrees with resolving each entity's full history alone
//! - at any (valid, system) point at most one version of an entity is visible
//! - an erase removes every older version of its entity under any bounds
//! - tasks of one plan can be scanned on separate threads

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use chronoscan::config::EngineConfig;
use chronoscan::observability::MetricsRegistry;
use chronoscan::scan::{plan_scan, OutputRow, ScanCursor, ScanSpec};
use chronoscan::segment::{Document, FactVersion, MemorySegment, OpKind, Operation, Segment};
use chronoscan::temporal::{TemporalBounds, MAX_INSTANT};
use chronoscan::trie::Iid;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;

// =============================================================================
// Test Utilities
// =============================================================================

fn doc_for(key: &str, system_from: i64) -> Document {
    json!({ "key": key, "sf": system_from })
        .as_object()
        .cloned()
        .unwrap()
}

/// Random histories: distinct system times per entity, a few deletes and
/// erases, open and closed valid ranges.
fn random_history(rng: &mut StdRng, entities: usize) -> Vec<FactVersion> {
    let mut rows = Vec::new();
    let mut system_times: Vec<i64> = (1..=100).collect();

    for e in 0..entities {
        let key = format!("e{}", e);
        let iid = Iid::for_key(&key);
        system_times.shuffle(rng);

        for &sf in system_times.iter().take(rng.gen_range(1..8)) {
            let roll = rng.gen_range(0..100);
            let from = rng.gen_range(0..50);
            let to = if rng.gen_bool(0.3) { MAX_INSTANT } else { rng.gen_range(from + 1..=60) };

            rows.push(match roll {
                0..=69 => FactVersion::put(iid, sf, from, doc_for(&key, sf)).with_valid_to(to),
                70..=92 => FactVersion::delete(iid, sf, from).with_valid_to(to),
                _ => FactVersion::erase(iid, sf),
            });
        }
    }

    rows
}

/// Scatters rows over `count` in-memory segments with differing leaf limits
fn shard(rng: &mut StdRng, rows: &[FactVersion], count: usize) -> Vec<Segment> {
    let mut shards: Vec<Vec<FactVersion>> = vec![Vec::new(); count];
    for row in rows {
        shards[rng.gen_range(0..count)].push(row.clone());
    }

    shards
        .into_iter()
        .enumerate()
        .map(|(idx, rows)| {
            let config = EngineConfig::default().with_leaf_row_limit(rng.gen_range(1..6));
            MemorySegment::from_unsorted(format!("seg-{}", idx), rows, &config)
                .unwrap()
                .into()
        })
        .collect()
}

/// The document visible for each entity at `(valid, system)`, computed from
/// each entity's full history without any ledger.
fn naive_visible(rows: &[FactVersion], valid: i64, system: i64) -> BTreeMap<Iid, Document> {
    let mut by_entity: BTreeMap<Iid, Vec<&FactVersion>> = BTreeMap::new();
    for row in rows {
        by_entity.entry(row.iid).or_default().push(row);
    }

    let mut visible = BTreeMap::new();
    for (iid, versions) in by_entity {
        let erased_at = versions
            .iter()
            .filter(|v| v.kind() == OpKind::Erase)
            .map(|v| v.system_from)
            .max();

        let winner = versions
            .iter()
            .filter(|v| v.kind() != OpKind::Erase)
            .filter(|v| erased_at.map_or(true, |e| v.system_from > e))
            .filter(|v| v.system_from <= system)
            .filter(|v| v.valid_from <= valid && valid < v.valid_to)
            .max_by_key(|v| v.system_from);

        if let Some(Operation::Put(doc)) = winner.map(|v| &v.op) {
            visible.insert(iid, doc.clone());
        }
    }
    visible
}

fn scan(segments: &[Segment], spec: ScanSpec) -> Vec<OutputRow> {
    ScanCursor::new(segments, spec).unwrap().collect_rows().unwrap()
}

fn rows_at(rows: &[OutputRow], valid: i64, system: i64) -> BTreeMap<Iid, Document> {
    let mut visible = BTreeMap::new();
    for row in rows {
        let inside = row.valid_from <= valid
            && valid < row.valid_to
            && row.system_from <= system
            && system < row.system_to;
        if inside {
            let previous = visible.insert(row.iid, row.doc.clone());
            assert!(previous.is_none(), "two rows of {} visible at ({}, {})", row.iid, valid, system);
        }
    }
    visible
}

// =============================================================================
// Merge equivalence
// =============================================================================

#[test]
fn test_point_queries_match_naive_resolution() {
    let mut rng = StdRng::seed_from_u64(2024);

    for _ in 0..10 {
        let rows = random_history(&mut rng, 40);
        let segment_count = rng.gen_range(1..5);
        let segments = shard(&mut rng, &rows, segment_count);

        for _ in 0..25 {
            let valid = rng.gen_range(-1..65);
            let system = rng.gen_range(0..105);

            let spec = ScanSpec::new().with_bounds(TemporalBounds::as_of(system).with_valid_at(valid));
            let out = scan(&segments, spec);

            for row in &out {
                assert_eq!((row.valid_from, row.valid_to), (valid, valid + 1));
                assert_eq!((row.system_from, row.system_to), (system, system + 1));
            }
            assert_eq!(rows_at(&out, valid, system), naive_visible(&rows, valid, system));
        }
    }
}

#[test]
fn test_unbounded_scan_tiles_the_history() {
    let mut rng = StdRng::seed_from_u64(99);

    for _ in 0..10 {
        let rows = random_history(&mut rng, 30);
        let segments = shard(&mut rng, &rows, 3);
        let out = scan(&segments, ScanSpec::new());

        for valid in (-1..62).step_by(3) {
            for system in (0..104).step_by(7) {
                assert_eq!(
                    rows_at(&out, valid, system),
                    naive_visible(&rows, valid, system),
                    "at ({}, {})",
                    valid,
                    system
                );
            }
        }
    }
}

#[test]
fn test_sharding_does_not_change_output() {
    let mut rng = StdRng::seed_from_u64(5);
    let rows = random_history(&mut rng, 50);

    let single = shard(&mut rng, &rows, 1);
    let many = shard(&mut rng, &rows, 4);

    let mut a = scan(&single, ScanSpec::new());
    let mut b = scan(&many, ScanSpec::new());
    let key = |r: &OutputRow| (r.iid, r.system_from, r.valid_from);
    a.sort_by_key(key);
    b.sort_by_key(key);
    assert_eq!(a, b);
}

// =============================================================================
// Erase
// =============================================================================

#[test]
fn test_erase_hides_entity_under_any_bounds() {
    let iid = Iid::for_key("gone");
    let rows = vec![
        FactVersion::erase(iid, 30),
        FactVersion::put(iid, 20, 0, doc_for("gone", 20)),
        FactVersion::put(iid, 10, 5, doc_for("gone", 10)).with_valid_to(50),
    ];
    let config = EngineConfig::default();
    let segments: Vec<Segment> = vec![MemorySegment::from_unsorted("s", rows, &config).unwrap().into()];

    let bounds = [
        TemporalBounds::unbounded(),
        TemporalBounds::as_of(15),
        TemporalBounds::as_of(25).with_valid_at(10),
        TemporalBounds::as_of(100),
    ];
    for b in bounds {
        assert!(scan(&segments, ScanSpec::new().with_bounds(b)).is_empty(), "{:?}", b);
    }
}

#[test]
fn test_versions_after_erase_stay_visible() {
    let iid = Iid::for_key("reborn");
    let rows = vec![
        FactVersion::put(iid, 40, 0, doc_for("reborn", 40)),
        FactVersion::erase(iid, 30),
        FactVersion::put(iid, 20, 0, doc_for("reborn", 20)),
    ];
    let config = EngineConfig::default();
    let segments: Vec<Segment> = vec![MemorySegment::from_unsorted("s", rows, &config).unwrap().into()];

    let out = scan(&segments, ScanSpec::new());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].system_from, 40);
    assert_eq!(out[0].doc, doc_for("reborn", 40));
}

// =============================================================================
// Parallel tasks
// =============================================================================

#[test]
fn test_tasks_scan_on_separate_threads() {
    let mut rng = StdRng::seed_from_u64(11);
    let rows = random_history(&mut rng, 60);
    let segments = shard(&mut rng, &rows, 3);
    let spec = ScanSpec::new().with_bounds(TemporalBounds::as_of(70));

    let sequential = scan(&segments, spec.clone());

    let metrics = Arc::new(MetricsRegistry::new());
    let tasks = plan_scan(&segments, &spec, Some(&metrics)).unwrap();
    let planned = tasks.len();
    let chunk = planned.div_ceil(4).max(1);

    let parallel: Vec<OutputRow> = thread::scope(|s| {
        let handles: Vec<_> = tasks
            .chunks(chunk)
            .map(|share| {
                let (segments, spec, share) = (&segments, spec.clone(), share.to_vec());
                s.spawn(move || ScanCursor::for_tasks(segments, spec, share).collect_rows().unwrap())
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    assert_eq!(parallel, sequential);
    assert_eq!(metrics.snapshot().tasks_planned, planned as u64);
}
