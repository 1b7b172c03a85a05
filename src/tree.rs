//! Tree store (C3): the arena holding the evolving cluster hierarchy.
//!
//! Nodes are addressed by [`TreeHandle`], a `Copy` integer handle into a
//! `Vec`-backed arena rather than by pointer -- this sidesteps the aliasing
//! and cycle problems a parent/child/sibling pointer tree would otherwise
//! have in safe Rust. A freed slot is tombstoned (`None`) rather than
//! reused, so handles stay valid for the lifetime of the store.

use std::collections::BTreeMap;

/// Opaque handle into a [`TreeStore`]'s arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TreeHandle(u32);

impl TreeHandle {
    pub(crate) fn new(v: u32) -> Self {
        Self(v)
    }

    /// The underlying arena index. Useful for debugging and stable sorting.
    #[must_use]
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// What a tree node represents.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// A leaf wrapping one state node.
    Leaf {
        state_id: u64,
        /// The physical node this state node belongs to -- equal to
        /// `state_id` for a first-order network, shared by several leaves
        /// for memory-order/multiplex networks.
        physical_id: u64,
    },
    /// An internal module node owning a contiguous list of children.
    Module,
}

/// One node in the hierarchy.
#[derive(Clone, Debug)]
pub struct TreeNode {
    pub parent: Option<TreeHandle>,
    pub children: Vec<TreeHandle>,
    pub kind: NodeKind,
    pub flow: f64,
    pub enter_flow: f64,
    pub exit_flow: f64,
    pub module_codelength: f64,
}

impl TreeNode {
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }
}

/// The arena itself.
///
/// Child order within a module is insertion order, not sorted -- sort order
/// for presentation is a [`crate::result`] concern, not a structural one.
pub struct TreeStore {
    arena: Vec<Option<TreeNode>>,
    root: TreeHandle,
}

impl TreeStore {
    /// Build the flat (one-level) tree: a root module directly owning one
    /// leaf per `(state_id, physical_id, flow)` triple, in iteration order.
    #[must_use]
    pub fn new_flat(leaves: impl IntoIterator<Item = (u64, u64, f64)>) -> Self {
        let mut store = Self {
            arena: vec![Some(TreeNode {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Module,
                flow: 0.0,
                enter_flow: 0.0,
                exit_flow: 0.0,
                module_codelength: 0.0,
            })],
            root: TreeHandle::new(0),
        };

        let mut children = Vec::new();
        let mut total_flow = 0.0;
        for (state_id, physical_id, flow) in leaves {
            let handle = store.push(TreeNode {
                parent: Some(store.root),
                children: Vec::new(),
                kind: NodeKind::Leaf { state_id, physical_id },
                flow,
                enter_flow: 0.0,
                exit_flow: 0.0,
                module_codelength: 0.0,
            });
            total_flow += flow;
            children.push(handle);
        }
        let root = store.root;
        let root_node = store.get_mut(root);
        root_node.children = children;
        root_node.flow = total_flow;
        store
    }

    fn push(&mut self, node: TreeNode) -> TreeHandle {
        let handle = TreeHandle::new(u32::try_from(self.arena.len()).expect("tree exceeded u32 capacity"));
        self.arena.push(Some(node));
        handle
    }

    #[must_use]
    pub fn root(&self) -> TreeHandle {
        self.root
    }

    #[must_use]
    pub fn get(&self, handle: TreeHandle) -> &TreeNode {
        self.arena[handle.raw() as usize].as_ref().expect("dangling tree handle")
    }

    pub fn get_mut(&mut self, handle: TreeHandle) -> &mut TreeNode {
        self.arena[handle.raw() as usize].as_mut().expect("dangling tree handle")
    }

    /// Create a new module node owning `children`, re-parenting them and
    /// attaching the new module under `parent`. Returns the module's handle.
    pub fn new_module(&mut self, parent: TreeHandle, children: Vec<TreeHandle>) -> TreeHandle {
        let flow: f64 = children.iter().map(|&c| self.get(c).flow).sum();
        let handle = self.push(TreeNode {
            parent: Some(parent),
            children: children.clone(),
            kind: NodeKind::Module,
            flow,
            enter_flow: 0.0,
            exit_flow: 0.0,
            module_codelength: 0.0,
        });
        for child in children {
            self.get_mut(child).parent = Some(handle);
        }
        handle
    }

    /// Collapse `handle`: re-parent its children into its own slot in its
    /// parent's child list, then destroy it. Calling this on the root is a
    /// programmer error -- the root has no parent slot to collapse into.
    pub fn replace_with_children(&mut self, handle: TreeHandle) {
        assert_ne!(handle, self.root, "cannot collapse the root tree node");
        let node = self.arena[handle.raw() as usize]
            .take()
            .expect("dangling tree handle");
        for &child in &node.children {
            self.get_mut(child).parent = node.parent;
        }
        let parent = node.parent.expect("non-root node must have a parent");
        let parent_node = self.get_mut(parent);
        let idx = parent_node
            .children
            .iter()
            .position(|&c| c == handle)
            .expect("parent/child link broken");
        parent_node.children.splice(idx..=idx, node.children.iter().copied());
    }

    /// Pre-order depth-first iteration over the logical tree.
    #[must_use]
    pub fn iter_preorder(&self) -> PreorderIter<'_> {
        PreorderIter {
            store: self,
            stack: vec![self.root],
        }
    }

    /// Verify invariant 1 (leaves of `handle` partition those reachable from
    /// it) and invariant 2's flow-conservation clause, for tests and for the
    /// `InternalConsistency` checks the partitioner performs after
    /// consolidation.
    pub fn check_flow_conservation(&self, handle: TreeHandle, tol: f64) -> bool {
        let node = self.get(handle);
        if node.is_leaf() {
            return true;
        }
        let sum: f64 = node.children.iter().map(|&c| self.get(c).flow).sum();
        (sum - node.flow).abs() <= tol && node.children.iter().all(|&c| self.check_flow_conservation(c, tol))
    }

    /// Collect the leaf `state_id`s reachable from `handle`, used by tests
    /// that check invariant 1 (leaves partition the reachable set).
    #[must_use]
    pub fn leaves_under(&self, handle: TreeHandle) -> BTreeMap<u64, TreeHandle> {
        let mut out = BTreeMap::new();
        let mut stack = vec![handle];
        while let Some(h) = stack.pop() {
            let node = self.get(h);
            match node.kind {
                NodeKind::Leaf { state_id, .. } => {
                    out.insert(state_id, h);
                }
                NodeKind::Module => stack.extend(node.children.iter().copied()),
            }
        }
        out
    }
}

/// Pre-order depth-first iterator over a [`TreeStore`].
pub struct PreorderIter<'a> {
    store: &'a TreeStore,
    stack: Vec<TreeHandle>,
}

impl Iterator for PreorderIter<'_> {
    type Item = TreeHandle;

    fn next(&mut self) -> Option<TreeHandle> {
        let handle = self.stack.pop()?;
        let node = self.store.get(handle);
        for &child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_tree_conserves_flow() {
        let store = TreeStore::new_flat([(1, 1, 0.2), (2, 2, 0.3), (3, 3, 0.5)]);
        assert!(store.check_flow_conservation(store.root(), 1e-12));
        assert_eq!(store.leaves_under(store.root()).len(), 3);
    }

    #[test]
    fn consolidate_then_collapse_round_trips() {
        let mut store = TreeStore::new_flat([(1, 1, 0.25), (2, 2, 0.25), (3, 3, 0.25), (4, 4, 0.25)]);
        let leaves: Vec<TreeHandle> = store.get(store.root()).children.clone();
        let root = store.root();
        let module_a = store.new_module(root, vec![leaves[0], leaves[1]]);
        let module_b = store.new_module(root, vec![leaves[2], leaves[3]]);
        store.get_mut(root).children = vec![module_a, module_b];

        assert!(store.check_flow_conservation(root, 1e-12));
        assert_eq!(store.leaves_under(root).len(), 4);

        store.replace_with_children(module_a);
        store.replace_with_children(module_b);
        assert_eq!(store.get(root).children.len(), 4);
        assert!(store.check_flow_conservation(root, 1e-12));
    }

    #[test]
    fn preorder_visits_root_first() {
        let store = TreeStore::new_flat([(1, 1, 0.5), (2, 2, 0.5)]);
        let mut iter = store.iter_preorder();
        assert_eq!(iter.next(), Some(store.root()));
    }
}
