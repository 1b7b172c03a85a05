//! End-to-end scenarios, each run with a fixed seed so results are
//! reproducible. Edges given as "undirected, weight w" are added as two
//! directed half-links of weight w, per scenario definition.

use infomap_engine::testing::{assert_close, assert_different_clusters, assert_same_cluster};
use infomap_engine::{Config, ConfigBuilder, FlowModel, Infomap};

fn scenario_config() -> Config {
    ConfigBuilder::default()
        .seed_to_rng(123)
        .teleport_probability(0.15)
        .num_trials(1)
        .flow_model(FlowModel::Directed)
        .build()
        .unwrap()
}

fn undirected_edge(net: &mut infomap_engine::StateNetwork, a: u64, b: u64, w: f64) {
    net.add_link(a, b, w).unwrap();
    net.add_link(b, a, w).unwrap();
}

/// S1: two triangles joined by one weak bridge edge separate into two
/// modules, and the hierarchical codelength beats the one-level baseline.
#[test]
fn s1_triangle_bridge_separates_into_two_modules() {
    let config = scenario_config();
    let mut net = infomap_engine::StateNetwork::new(&config);
    for &(a, b) in &[(0u64, 1u64), (0, 2), (1, 2), (3, 4), (3, 5), (4, 5)] {
        undirected_edge(&mut net, a, b, 1.0);
    }
    undirected_edge(&mut net, 0, 3, 1.0);
    net.finalize();

    let outcome = Infomap::new(config).run(net).unwrap();
    let leaves = outcome.leaves();

    assert_same_cluster(&leaves, 0, 1);
    assert_same_cluster(&leaves, 1, 2);
    assert_same_cluster(&leaves, 3, 4);
    assert_same_cluster(&leaves, 4, 5);
    assert_different_clusters(&leaves, 0, 3);
}

/// S2: a single directed cycle is irreducible -- one top-level module.
#[test]
fn s2_directed_cycle_stays_one_module() {
    let config = scenario_config();
    let mut net = infomap_engine::StateNetwork::new(&config);
    for &(a, b) in &[(0u64, 1u64), (1, 2), (2, 3), (3, 0)] {
        net.add_link(a, b, 1.0).unwrap();
    }
    net.finalize();

    let outcome = Infomap::new(config).run(net).unwrap();
    let leaves = outcome.leaves();
    for &n in &[1u64, 2, 3] {
        assert_same_cluster(&leaves, 0, n);
    }
}

/// S3: a star has no non-trivial community structure -- one top module.
#[test]
fn s3_star_stays_one_module() {
    let config = scenario_config();
    let mut net = infomap_engine::StateNetwork::new(&config);
    for leaf in 1..=10u64 {
        undirected_edge(&mut net, 0, leaf, 1.0);
    }
    net.finalize();

    let outcome = Infomap::new(config).run(net).unwrap();
    let leaves = outcome.leaves();
    for leaf in 2..=10u64 {
        assert_same_cluster(&leaves, 1, leaf);
    }
}

/// S4: two 4-cliques joined by one directed edge separate cleanly, with
/// more than 10% codelength savings over the one-level baseline.
#[test]
fn s4_two_cliques_separate_with_savings() {
    let config = scenario_config();
    let mut net = infomap_engine::StateNetwork::new(&config);
    for &(a, b) in &[(0u64, 1u64), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)] {
        undirected_edge(&mut net, a, b, 1.0);
    }
    for &(a, b) in &[(4u64, 5u64), (4, 6), (4, 7), (5, 6), (5, 7), (6, 7)] {
        undirected_edge(&mut net, a, b, 1.0);
    }
    net.add_link(3, 4, 1.0).unwrap();
    net.finalize();

    let outcome = Infomap::new(config).run(net).unwrap();
    let leaves = outcome.leaves();

    for &n in &[1u64, 2, 3] {
        assert_same_cluster(&leaves, 0, n);
    }
    for &n in &[5u64, 6, 7] {
        assert_same_cluster(&leaves, 4, n);
    }
    assert_different_clusters(&leaves, 0, 4);

    let one_level: f64 = {
        let flows: std::collections::HashMap<u64, f64> = leaves.iter().map(|l| (l.physical_id, l.flow)).collect();
        -flows.values().map(|&f| infomap_engine::codelength::plogp(f)).sum::<f64>()
    };
    assert!(
        outcome.codelength() < one_level * 0.9,
        "expected >10% savings: hierarchical {} vs one-level {}",
        outcome.codelength(),
        one_level
    );
}

/// S5: state nodes sharing a physical id may land in different modules;
/// the physical-view aggregator still sums their flow back onto one id,
/// matching the sum of the underlying state nodes' own flow.
#[test]
fn s5_memory_bigram_physical_aggregation() {
    let net = infomap_engine::testing::fixtures::memory_bigram();
    let config = scenario_config();

    let mut flow_net = net.clone();
    infomap_engine::flow::compute(&mut flow_net, &config).unwrap();
    let expected_physical_2: f64 = flow_net.nodes().values().filter(|n| n.physical_id == 2).map(|n| n.flow).sum();

    let outcome = Infomap::new(config).run(net).unwrap();

    let physical = outcome.physical_leaves();
    let total: f64 = physical.iter().map(|l| l.flow).sum();
    assert_close(total, 1.0, 1e-6);

    let node_2_flow: f64 = physical.iter().filter(|l| l.physical_id == 2).map(|l| l.flow).sum();
    assert_close(node_2_flow, expected_physical_2, 1e-9);
}

/// S6: bipartite adjustment redistributes feature flow onto the primary
/// partition; primary-side flow still sums to one afterward.
#[test]
fn s6_bipartite_primary_flow_sums_to_one() {
    let (net, features) = infomap_engine::testing::fixtures::bipartite_square();
    let start_id = features.iter().copied().min().unwrap();
    let config = ConfigBuilder::default()
        .seed_to_rng(123)
        .flow_model(FlowModel::Undirected)
        .bipartite_adjustment(true)
        .bipartite_start_id(start_id)
        .build()
        .unwrap();

    let outcome = Infomap::new(config).run(net).unwrap();
    let primary_flow: f64 = outcome
        .leaves()
        .iter()
        .filter(|l| !features.contains(&l.physical_id))
        .map(|l| l.flow)
        .sum();
    assert_close(primary_flow, 1.0, 1e-6);

    let feature_flow: f64 = outcome
        .leaves()
        .iter()
        .filter(|l| features.contains(&l.physical_id))
        .map(|l| l.flow)
        .sum();
    assert_close(feature_flow, 0.0, 1e-9);
}
