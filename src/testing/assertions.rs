//! Assertion functions for testing clustering outputs.

use crate::result::LeafView;
use std::collections::BTreeSet;

/// Assert that two `f64` values are within `tol` of each other.
///
/// # Panics
///
/// Panics with both values and the tolerance if they differ by more than
/// `tol`.
pub fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "values differ by more than {tol}:\n  expected: {expected}\n  actual:   {actual}"
    );
}

/// Assert that `leaves` partitions into the same top-level groups as
/// `expected`, comparing by physical id set equality and ignoring the
/// numeric module labels themselves (labels are an implementation detail,
/// not part of the result's meaning).
///
/// # Panics
///
/// Panics if the set of top-level groups differs.
pub fn assert_same_top_level_clusters(leaves: &[LeafView], expected: &[Vec<u64>]) {
    let actual = top_level_groups(leaves);
    let expected: BTreeSet<BTreeSet<u64>> = expected.iter().map(|g| g.iter().copied().collect()).collect();
    assert_eq!(
        actual, expected,
        "top-level clustering mismatch:\n  expected: {expected:?}\n  actual:   {actual:?}"
    );
}

/// Assert that `a` and `b` are the same physical id, regardless of which
/// module each currently belongs to -- a half of
/// [`assert_same_top_level_clusters`] useful when only checking "these two
/// nodes ended up together".
pub fn assert_same_cluster(leaves: &[LeafView], a: u64, b: u64) {
    let groups = top_level_groups(leaves);
    let found = groups.iter().any(|g| g.contains(&a) && g.contains(&b));
    assert!(found, "expected {a} and {b} in the same top-level cluster");
}

pub fn assert_different_clusters(leaves: &[LeafView], a: u64, b: u64) {
    let groups = top_level_groups(leaves);
    let together = groups.iter().any(|g| g.contains(&a) && g.contains(&b));
    assert!(!together, "expected {a} and {b} in different top-level clusters");
}

fn top_level_groups(leaves: &[LeafView]) -> BTreeSet<BTreeSet<u64>> {
    let mut by_label: std::collections::BTreeMap<u32, BTreeSet<u64>> = std::collections::BTreeMap::new();
    for leaf in leaves {
        let label = leaf.module_path.first().copied().unwrap_or(0);
        by_label.entry(label).or_default().insert(leaf.physical_id);
    }
    by_label.into_values().collect()
}
