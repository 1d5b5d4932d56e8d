//! Quadratic node split (Guttman).
//!
//! Splitting lifts all entries of an overflowing node plus the incoming
//! one out of the block, picks the two most wasteful entries as seeds,
//! and distributes the rest one at a time to the group whose covering
//! MBR grows the least, always placing the entry with the largest growth
//! difference next.

use zonal_common::Mbr;

/// One entry lifted out of a node for redistribution.
#[derive(Debug, Clone)]
pub(crate) struct SplitEntry {
    pub key: Mbr,
    pub value: Vec<u8>,
}

/// The two groups produced by a split, with their covering MBRs.
pub(crate) struct SplitResult {
    pub group_one: Vec<SplitEntry>,
    pub one_mbr: Mbr,
    pub group_two: Vec<SplitEntry>,
    pub two_mbr: Mbr,
}

/// Picks the pair of entries wasting the most area when boxed together:
/// the pair maximizing `area(union(i, j)) - area(i) - area(j)`.
fn pick_seeds(entries: &[SplitEntry]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut best_waste = f64::NEG_INFINITY;
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            let waste = entries[i].key.union(&entries[j].key).area()
                - entries[i].key.area()
                - entries[j].key.area();
            if waste > best_waste {
                best_waste = waste;
                best = (i, j);
            }
        }
    }
    best
}

/// Splits at least two entries into two non-empty groups.
pub(crate) fn quadratic_split(mut entries: Vec<SplitEntry>) -> SplitResult {
    debug_assert!(entries.len() >= 2);

    let (s1, s2) = pick_seeds(&entries);
    // Remove the higher index first so the lower one stays valid.
    let seed_two = entries.remove(s2);
    let seed_one = entries.remove(s1);

    let mut one_mbr = seed_one.key.clone();
    let mut two_mbr = seed_two.key.clone();
    let mut group_one = vec![seed_one];
    let mut group_two = vec![seed_two];

    while !entries.is_empty() {
        // Assign next the entry whose preference between the groups is
        // strongest: maximum |enlargement(one) - enlargement(two)|.
        let mut pick = 0;
        let mut pick_diff = f64::NEG_INFINITY;
        for (i, e) in entries.iter().enumerate() {
            let d1 = one_mbr.union(&e.key).area() - one_mbr.area();
            let d2 = two_mbr.union(&e.key).area() - two_mbr.area();
            let diff = (d1 - d2).abs();
            if diff > pick_diff {
                pick_diff = diff;
                pick = i;
            }
        }

        let entry = entries.swap_remove(pick);
        let d1 = one_mbr.union(&entry.key).area() - one_mbr.area();
        let d2 = two_mbr.union(&entry.key).area() - two_mbr.area();
        if d1 <= d2 {
            one_mbr.expand(&entry.key);
            group_one.push(entry);
        } else {
            two_mbr.expand(&entry.key);
            group_two.push(entry);
        }
    }

    SplitResult {
        group_one,
        one_mbr,
        group_two,
        two_mbr,
    }
}
