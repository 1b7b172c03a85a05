//! Round-trip / idempotence properties (spec §8, items 8-9).

use infomap_engine::codelength::{Balance, CodelengthBook, DeltaFlow};
use infomap_engine::partition;
use infomap_engine::tree::TreeStore;

/// 8: consolidating leaves into modules, then collapsing every module back
/// into its parent, reproduces the original leaf set with unchanged flow.
#[test]
fn consolidate_then_collapse_preserves_leaves_and_flow() {
    let mut tree = TreeStore::new_flat([(1u64, 1u64, 0.1), (2, 2, 0.2), (3, 3, 0.3), (4, 4, 0.4)]);
    let root = tree.root();
    let leaves: Vec<_> = tree.get(root).children.clone();
    let original_flows: Vec<f64> = leaves.iter().map(|&h| tree.get(h).flow).collect();

    let module_of = vec![0u32, 0, 1, 1];
    let modules = partition::consolidate(&mut tree, root, &leaves, &module_of);
    assert_eq!(modules.len(), 2);
    assert!(tree.check_flow_conservation(root, 1e-12));

    for &m in &modules {
        tree.replace_with_children(m);
    }

    let restored = tree.get(root).children.clone();
    assert_eq!(restored.len(), 4);
    let restored_flows: Vec<f64> = restored.iter().map(|&h| tree.get(h).flow).collect();
    assert_eq!(original_flows, restored_flows);
    assert!(tree.check_flow_conservation(root, 1e-12));
}

/// 9: applying a move and then its exact inverse restores the codelength
/// book to its prior value and per-module aggregates.
#[test]
fn move_then_inverse_move_restores_codelength() {
    let book = CodelengthBook::new(
        Balance::Undirected,
        [(0u32, 0.5, 0.2, 0.2), (1u32, 0.5, 0.2, 0.2)],
        -2.0 * (0.25_f64 * 0.25_f64.log2()),
    );
    let original_codelength = book.codelength();
    let original_flow_0 = book.module_flow(0);
    let original_flow_1 = book.module_flow(1);

    let mut mutated = book;
    mutated.apply(
        0.1,
        DeltaFlow { module: 0, delta_exit: -0.1, delta_enter: -0.1 },
        DeltaFlow { module: 1, delta_exit: 0.1, delta_enter: 0.1 },
    );
    assert_ne!(mutated.codelength(), original_codelength);

    mutated.apply(
        0.1,
        DeltaFlow { module: 1, delta_exit: -0.1, delta_enter: -0.1 },
        DeltaFlow { module: 0, delta_exit: 0.1, delta_enter: 0.1 },
    );

    assert!((mutated.codelength() - original_codelength).abs() < 1e-12);
    assert!((mutated.module_flow(0) - original_flow_0).abs() < 1e-12);
    assert!((mutated.module_flow(1) - original_flow_1).abs() < 1e-12);
}
