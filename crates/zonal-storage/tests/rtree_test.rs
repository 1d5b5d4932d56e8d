//! R-tree integration tests.
//!
//! Validates the index end to end over real files:
//! - concrete insert/search/delete scenarios
//! - structural invariants (balance, tight MBRs, capacity, self
//!   addresses) after arbitrary operation sequences
//! - search soundness and completeness against a brute-force oracle
//! - persistence round-trips across close and reopen

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use tempfile::tempdir;

use zonal_common::{IndexConfig, Mbr, ZonalError};
use zonal_storage::{IndexEntry, RTreeIndex};

// =============================================================================
// Helpers
// =============================================================================

fn rect(x1: f64, y1: f64, x2: f64, y2: f64) -> Mbr {
    Mbr::new(vec![x1, y1, x2, y2])
}

fn value(v: u64) -> [u8; 8] {
    v.to_le_bytes()
}

fn tag(entry: &IndexEntry) -> u64 {
    u64::from_le_bytes(entry.value.as_ref().try_into().unwrap())
}

/// Canonical multiset form of search results for comparison.
fn canon(entries: &[IndexEntry]) -> Vec<(Vec<u64>, u64)> {
    let mut out: Vec<(Vec<u64>, u64)> = entries
        .iter()
        .map(|e| {
            (
                e.mbr.as_slice().iter().map(|c| c.to_bits()).collect(),
                tag(e),
            )
        })
        .collect();
    out.sort();
    out
}

fn canon_pairs(pairs: &[(Mbr, u64)]) -> Vec<(Vec<u64>, u64)> {
    let mut out: Vec<(Vec<u64>, u64)> = pairs
        .iter()
        .map(|(m, v)| (m.as_slice().iter().map(|c| c.to_bits()).collect(), *v))
        .collect();
    out.sort();
    out
}

/// Generates a random rectangle in [0, 100]^2 with coordinates swapped
/// into lo <= hi order, distinct from everything generated before.
fn random_rect(rng: &mut StdRng, seen: &mut HashSet<[u64; 4]>) -> Mbr {
    loop {
        let (a, b): (f64, f64) = (rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0));
        let (c, d): (f64, f64) = (rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0));
        let (x1, x2) = if a <= c { (a, c) } else { (c, a) };
        let (y1, y2) = if b <= d { (b, d) } else { (d, b) };
        let bits = [x1.to_bits(), y1.to_bits(), x2.to_bits(), y2.to_bits()];
        if seen.insert(bits) {
            return rect(x1, y1, x2, y2);
        }
    }
}

// =============================================================================
// Brute-Force Oracle
// =============================================================================

/// Linear-scan reference implementation the tree is checked against.
struct BruteForce {
    data: Vec<(Mbr, u64)>,
}

impl BruteForce {
    fn new() -> Self {
        Self { data: Vec::new() }
    }

    fn insert(&mut self, key: Mbr, val: u64) {
        self.data.push((key, val));
    }

    fn remove(&mut self, key: &Mbr) -> bool {
        match self.data.iter().position(|(k, _)| k == key) {
            Some(idx) => {
                self.data.remove(idx);
                true
            }
            None => false,
        }
    }

    fn overlap_search(&self, query: &Mbr) -> Vec<(Mbr, u64)> {
        self.data
            .iter()
            .filter(|(k, _)| k.overlaps(query))
            .cloned()
            .collect()
    }

    fn comprise_search(&self, query: &Mbr) -> Vec<(Mbr, u64)> {
        self.data
            .iter()
            .filter(|(k, _)| query.covers(k))
            .cloned()
            .collect()
    }
}

// =============================================================================
// Concrete Scenarios
// =============================================================================

#[test]
fn test_three_rectangles_overlap_and_comprise() {
    let dir = tempdir().unwrap();
    let mut tree = RTreeIndex::create(dir.path(), "t.idx", IndexConfig::default()).unwrap();

    tree.insert(&rect(0.0, 0.0, 10.0, 10.0), &value(1)).unwrap();
    tree.insert(&rect(5.0, 5.0, 15.0, 15.0), &value(2)).unwrap();
    tree.insert(&rect(20.0, 20.0, 30.0, 30.0), &value(3)).unwrap();

    let hits = tree.overlap_search(&rect(4.0, 4.0, 6.0, 6.0)).unwrap();
    let mut tags: Vec<u64> = hits.iter().map(tag).collect();
    tags.sort_unstable();
    assert_eq!(tags, vec![1, 2]);

    let hits = tree.comprise_search(&rect(0.0, 0.0, 100.0, 100.0)).unwrap();
    let mut tags: Vec<u64> = hits.iter().map(tag).collect();
    tags.sort_unstable();
    assert_eq!(tags, vec![1, 2, 3]);
}

#[test]
fn test_invariants_after_every_insert() {
    let dir = tempdir().unwrap();
    let mut tree = RTreeIndex::create(dir.path(), "t.idx", IndexConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let mut seen = HashSet::new();

    for i in 0..100u64 {
        let key = random_rect(&mut rng, &mut seen);
        tree.insert(&key, &value(i)).unwrap();

        let stats = tree.check_consistency().unwrap();
        assert_eq!(stats.entry_count, i + 1);
        // Insert-only trees never hold an empty node
        assert!(stats.min_leaf_fill >= 1);
    }
}

#[test]
fn test_delete_then_search() {
    let dir = tempdir().unwrap();
    let mut tree = RTreeIndex::create(dir.path(), "t.idx", IndexConfig::default()).unwrap();

    tree.insert(&rect(0.0, 0.0, 10.0, 10.0), &value(1)).unwrap();
    tree.insert(&rect(5.0, 5.0, 15.0, 15.0), &value(2)).unwrap();
    tree.insert(&rect(20.0, 20.0, 30.0, 30.0), &value(3)).unwrap();

    assert!(tree.delete(&rect(5.0, 5.0, 15.0, 15.0)).unwrap());

    let hits = tree.overlap_search(&rect(4.0, 4.0, 6.0, 6.0)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(tag(&hits[0]), 1);
    tree.check_consistency().unwrap();
}

#[test]
fn test_balance_across_many_splits() {
    let dir = tempdir().unwrap();
    let mut tree = RTreeIndex::create(dir.path(), "t.idx", IndexConfig::default()).unwrap();

    // Leaf capacity is 101 at the default geometry; 400 entries force
    // several leaf splits and at least one root growth.
    for i in 0..400u64 {
        let x = (i % 20) as f64 * 5.0;
        let y = (i / 20) as f64 * 5.0;
        tree.insert(&rect(x, y, x + 4.0, y + 4.0), &value(i)).unwrap();
    }

    let stats = tree.check_consistency().unwrap();
    assert_eq!(stats.entry_count, 400);
    assert!(stats.height >= 2, "height {}", stats.height);
    assert!(stats.node_count >= 5, "nodes {}", stats.node_count);
    assert_eq!(tree.len().unwrap(), 400);
}

#[test]
fn test_comprise_search_with_point_query() {
    let dir = tempdir().unwrap();
    let mut tree = RTreeIndex::create(dir.path(), "t.idx", IndexConfig::default()).unwrap();

    tree.insert(&rect(0.0, 0.0, 0.0, 0.0), &value(1)).unwrap();
    tree.insert(&rect(0.0, 0.0, 1.0, 1.0), &value(2)).unwrap();
    tree.insert(&rect(-1.0, -1.0, 0.0, 0.0), &value(3)).unwrap();

    // A point query covers exactly the boxes equal to that point.
    let hits = tree.comprise_search(&rect(0.0, 0.0, 0.0, 0.0)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(tag(&hits[0]), 1);
}

#[test]
fn test_open_with_mismatched_dimensions_fails() {
    let dir = tempdir().unwrap();
    let config = IndexConfig::default();
    {
        let mut tree = RTreeIndex::create(dir.path(), "t.idx", config).unwrap();
        tree.insert(&rect(0.0, 0.0, 1.0, 1.0), &value(1)).unwrap();
        tree.sync().unwrap();
    }

    let mismatched = IndexConfig {
        dimensions: 3,
        ..config
    };
    assert!(matches!(
        RTreeIndex::open(dir.path(), "t.idx", mismatched),
        Err(ZonalError::HeaderMismatch { .. })
    ));

    // The matching geometry still opens fine afterwards
    assert!(RTreeIndex::open(dir.path(), "t.idx", config).is_ok());
}

// =============================================================================
// Properties Against the Oracle
// =============================================================================

#[test]
fn test_search_matches_oracle_on_random_workload() {
    let dir = tempdir().unwrap();
    let mut tree = RTreeIndex::create(dir.path(), "t.idx", IndexConfig::default()).unwrap();
    let mut oracle = BruteForce::new();
    let mut rng = StdRng::seed_from_u64(42);
    let mut seen = HashSet::new();

    for i in 0..500u64 {
        let key = random_rect(&mut rng, &mut seen);
        tree.insert(&key, &value(i)).unwrap();
        oracle.insert(key, i);
    }

    for _ in 0..50 {
        let query = random_rect(&mut rng, &mut seen);

        let tree_hits = tree.overlap_search(&query).unwrap();
        assert_eq!(canon(&tree_hits), canon_pairs(&oracle.overlap_search(&query)));

        let tree_hits = tree.comprise_search(&query).unwrap();
        assert_eq!(
            canon(&tree_hits),
            canon_pairs(&oracle.comprise_search(&query))
        );
    }
}

#[test]
fn test_mixed_inserts_and_deletes_match_oracle() {
    let dir = tempdir().unwrap();
    let mut tree = RTreeIndex::create(dir.path(), "t.idx", IndexConfig::default()).unwrap();
    let mut oracle = BruteForce::new();
    let mut rng = StdRng::seed_from_u64(1234);
    let mut seen = HashSet::new();

    for i in 0..600u64 {
        if !oracle.data.is_empty() && rng.gen_bool(0.3) {
            // Delete a live key half the time, an absent one otherwise
            let key = if rng.gen_bool(0.5) {
                let idx = rng.gen_range(0..oracle.data.len());
                oracle.data[idx].0.clone()
            } else {
                random_rect(&mut rng, &mut seen)
            };
            let expected = oracle.remove(&key);
            assert_eq!(tree.delete(&key).unwrap(), expected);
        } else {
            let key = random_rect(&mut rng, &mut seen);
            tree.insert(&key, &value(i)).unwrap();
            oracle.insert(key, i);
        }

        if i % 50 == 0 {
            tree.check_consistency().unwrap();
        }
    }

    assert_eq!(canon(&tree.all_entries().unwrap()), canon_pairs(&oracle.data));
    tree.check_consistency().unwrap();
}

#[test]
fn test_delete_idempotence() {
    let dir = tempdir().unwrap();
    let mut tree = RTreeIndex::create(dir.path(), "t.idx", IndexConfig::default()).unwrap();

    for i in 0..50u64 {
        let c = i as f64;
        tree.insert(&rect(c, c, c + 2.0, c + 2.0), &value(i)).unwrap();
    }

    // Deleting an absent key leaves the tree unchanged
    let before = tree.all_entries().unwrap();
    let before_stats = tree.check_consistency().unwrap();
    assert!(!tree.delete(&rect(500.0, 500.0, 501.0, 501.0)).unwrap());
    assert_eq!(canon(&tree.all_entries().unwrap()), canon(&before));
    assert_eq!(tree.check_consistency().unwrap(), before_stats);

    // Deleting the same key twice: true, then false
    assert!(tree.delete(&rect(10.0, 10.0, 12.0, 12.0)).unwrap());
    assert!(!tree.delete(&rect(10.0, 10.0, 12.0, 12.0)).unwrap());
    assert_eq!(tree.len().unwrap(), 49);
}

#[test]
fn test_persistence_roundtrip() {
    let dir = tempdir().unwrap();
    let config = IndexConfig::default();
    let mut oracle = BruteForce::new();
    let mut rng = StdRng::seed_from_u64(99);
    let mut seen = HashSet::new();

    {
        let mut tree = RTreeIndex::create(dir.path(), "t.idx", config).unwrap();
        for i in 0..300u64 {
            let key = random_rect(&mut rng, &mut seen);
            tree.insert(&key, &value(i)).unwrap();
            oracle.insert(key, i);
        }
        // Drop a third of the keys again before closing
        for i in (0..300).step_by(3) {
            let key = oracle.data[oracle.data.len() - 1 - i / 3].0.clone();
            assert!(oracle.remove(&key));
            assert!(tree.delete(&key).unwrap());
        }
        tree.sync().unwrap();
    }

    let tree = RTreeIndex::open(dir.path(), "t.idx", config).unwrap();
    assert_eq!(canon(&tree.all_entries().unwrap()), canon_pairs(&oracle.data));
    tree.check_consistency().unwrap();

    // The reopened tree keeps answering queries correctly
    let query = rect(25.0, 25.0, 75.0, 75.0);
    assert_eq!(
        canon(&tree.overlap_search(&query).unwrap()),
        canon_pairs(&oracle.overlap_search(&query))
    );
}

#[test]
fn test_duplicate_keys_are_kept_as_separate_entries() {
    let dir = tempdir().unwrap();
    let mut tree = RTreeIndex::create(dir.path(), "t.idx", IndexConfig::default()).unwrap();

    let key = rect(1.0, 1.0, 2.0, 2.0);
    tree.insert(&key, &value(1)).unwrap();
    tree.insert(&key, &value(2)).unwrap();
    assert_eq!(tree.len().unwrap(), 2);

    // One delete removes one copy
    assert!(tree.delete(&key).unwrap());
    assert_eq!(tree.len().unwrap(), 1);
    assert!(tree.delete(&key).unwrap());
    assert!(!tree.delete(&key).unwrap());
}

#[test]
fn test_large_workload_stays_balanced() {
    let dir = tempdir().unwrap();
    let mut tree = RTreeIndex::create(dir.path(), "t.idx", IndexConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(2024);
    let mut seen = HashSet::new();
    let mut keys = Vec::new();

    for i in 0..2000u64 {
        let key = random_rect(&mut rng, &mut seen);
        tree.insert(&key, &value(i)).unwrap();
        keys.push(key);
    }

    let stats = tree.check_consistency().unwrap();
    assert_eq!(stats.entry_count, 2000);
    assert!(stats.height >= 2);

    // Every stored key is findable by an exact overlap query
    for key in keys.iter().step_by(97) {
        let hits = tree.overlap_search(key).unwrap();
        assert!(hits.iter().any(|e| e.mbr == *key));
    }
}
