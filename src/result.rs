//! Result accessor (C7): read-only views over a finished hierarchy.
//!
//! This module never mutates the tree; it only walks it. `level_stats` and
//! `depth_stats` carry over the upstream
//! `aggregatePerLevelCodelength`/`calcMaxAndAverageDepth` diagnostics.

use crate::tree::{NodeKind, TreeHandle, TreeStore};
use std::collections::BTreeMap;

/// One leaf as seen from the physical (state-node) view.
#[derive(Clone, Debug, PartialEq)]
pub struct LeafView {
    pub physical_id: u64,
    pub flow: f64,
    /// Module path from just below the root to the leaf's immediate parent,
    /// e.g. `[3, 1, 0]`.
    pub module_path: Vec<u32>,
}

/// Per-depth codelength contribution and node counts.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LevelStats {
    pub depth: usize,
    pub codelength_contribution: f64,
    pub num_modules: usize,
}

/// Tree-depth summary.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DepthStats {
    pub max: usize,
    pub mean: f64,
}

/// Read-only view over a finished [`TreeStore`].
pub struct ResultAccessor<'t> {
    tree: &'t TreeStore,
    codelength: f64,
}

impl<'t> ResultAccessor<'t> {
    #[must_use]
    pub fn new(tree: &'t TreeStore, codelength: f64) -> Self {
        Self { tree, codelength }
    }

    #[must_use]
    pub fn codelength(&self) -> f64 {
        self.codelength
    }

    /// Number of modules at each depth (depth 0 being the children of the
    /// root).
    #[must_use]
    pub fn num_modules_per_depth(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        self.walk(self.tree.root(), 0, &mut Vec::new(), &mut |_, depth, path, node| {
            if !node.is_leaf() && !path.is_empty() {
                *counts.entry(depth - 1).or_insert(0) += 1;
            }
        });
        counts
    }

    /// Pre-order iterator over leaves, each reporting its physical id, flow,
    /// and module path.
    #[must_use]
    pub fn leaves(&self) -> Vec<LeafView> {
        let mut out = Vec::new();
        self.walk(self.tree.root(), 0, &mut Vec::new(), &mut |_, _, path, node| {
            if let NodeKind::Leaf { physical_id, .. } = node.kind {
                out.push(LeafView {
                    physical_id,
                    flow: node.flow,
                    module_path: path.to_vec(),
                });
            }
        });
        out
    }

    /// Like [`Self::leaves`] but aggregates state nodes sharing a physical
    /// id into one leaf whose flow is their sum (the physical-view
    /// projection for memory/multiplex networks).
    #[must_use]
    pub fn physical_leaves(&self) -> Vec<LeafView> {
        let mut by_physical: BTreeMap<u64, LeafView> = BTreeMap::new();
        for leaf in self.leaves() {
            by_physical
                .entry(leaf.physical_id)
                .and_modify(|existing| existing.flow += leaf.flow)
                .or_insert(leaf);
        }
        by_physical.into_values().collect()
    }

    /// Per-level codelength contribution, aggregated the way
    /// `aggregatePerLevelCodelength` does upstream.
    #[must_use]
    pub fn level_stats(&self) -> Vec<LevelStats> {
        let mut stats: BTreeMap<usize, LevelStats> = BTreeMap::new();
        self.walk(self.tree.root(), 0, &mut Vec::new(), &mut |_, depth, path, node| {
            if node.is_leaf() || path.is_empty() {
                return;
            }
            let entry = stats.entry(depth - 1).or_insert(LevelStats {
                depth: depth - 1,
                codelength_contribution: 0.0,
                num_modules: 0,
            });
            entry.codelength_contribution += node.module_codelength;
            entry.num_modules += 1;
        });
        stats.into_values().collect()
    }

    /// Maximum and mean leaf depth, matching `calcMaxAndAverageDepth`.
    #[must_use]
    pub fn depth_stats(&self) -> DepthStats {
        let mut depths = Vec::new();
        self.walk(self.tree.root(), 0, &mut Vec::new(), &mut |_, depth, _, node| {
            if node.is_leaf() {
                depths.push(depth);
            }
        });
        if depths.is_empty() {
            return DepthStats::default();
        }
        let max = depths.iter().copied().max().unwrap_or(0);
        let mean = depths.iter().sum::<usize>() as f64 / depths.len() as f64;
        DepthStats { max, mean }
    }

    fn walk(
        &self,
        handle: TreeHandle,
        depth: usize,
        path: &mut Vec<u32>,
        visit: &mut impl FnMut(TreeHandle, usize, &[u32], &crate::tree::TreeNode),
    ) {
        let node = self.tree.get(handle);
        visit(handle, depth, path, node);
        for (i, &child) in node.children.iter().enumerate() {
            path.push(u32::try_from(i).unwrap_or(u32::MAX));
            self.walk(child, depth + 1, path, visit);
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_leaves_aggregate_shared_ids() {
        // Two distinct state ids (1, 101) sharing physical id 1, as a
        // memory-order network would produce.
        let mut store = TreeStore::new_flat([(1, 1, 0.3), (101, 1, 0.2), (2, 2, 0.5)]);
        let _ = &mut store;
        let accessor = ResultAccessor::new(&store, 0.0);
        let physical = accessor.physical_leaves();
        let node1: f64 = physical.iter().filter(|l| l.physical_id == 1).map(|l| l.flow).sum();
        assert!((node1 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn leaves_report_module_paths() {
        let mut store = TreeStore::new_flat([(1, 1, 0.5), (2, 2, 0.5)]);
        let leaves = store.get(store.root()).children.clone();
        let root = store.root();
        let module = store.new_module(root, vec![leaves[0]]);
        store.get_mut(root).children = vec![module, leaves[1]];
        let accessor = ResultAccessor::new(&store, 0.0);
        let views = accessor.leaves();
        let leaf1 = views.iter().find(|l| l.physical_id == 1).unwrap();
        assert_eq!(leaf1.module_path, vec![0, 0]);
    }
}
