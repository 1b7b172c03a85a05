//! Flow calculation (C2): computes the stationary node-flow distribution and
//! per-link flow under one of five flow models.
//!
//! Grounded on the upstream `FlowCalculator`: the directed power iteration,
//! its dangling-node handling, and its alpha-perturbation stall-breaker are
//! carried over verbatim.

use crate::config::{Config, FlowModel};
use crate::error::{InfomapError, Result};
use crate::network::StateNetwork;
use std::collections::HashMap;

/// Outcome of the (possibly iterative) flow computation.
#[derive(Clone, Copy, Debug)]
pub struct Convergence {
    pub converged: bool,
    pub iterations: usize,
    pub final_error: f64,
}

/// Compute flow in place on `network` according to `config.flow_model`.
///
/// Non-convergence of the directed power iteration is not a fatal error: it
/// is logged via `tracing::warn!`, the best available flow is kept, and the
/// returned [`Convergence`] lets the caller turn it into a warning (see
/// [`crate::Outcome::convergence_warning`]) rather than aborting the run
/// (§7's recovery policy).
pub fn compute(network: &mut StateNetwork, config: &Config) -> Result<Convergence> {
    tracing::debug!(
        model = ?config.flow_model,
        nodes = network.num_nodes(),
        "computing flow"
    );

    if config.bipartite_adjustment && config.flow_model == FlowModel::RawDir {
        return Err(InfomapError::FlowModelUnsupported {
            message: "rawdir flow model does not support bipartite adjustment".into(),
        });
    }

    let convergence = match config.flow_model {
        FlowModel::Undirected => {
            calc_undirected(network);
            Convergence {
                converged: true,
                iterations: 1,
                final_error: 0.0,
            }
        }
        FlowModel::RawDir => {
            calc_rawdir(network);
            Convergence {
                converged: true,
                iterations: 1,
                final_error: 0.0,
            }
        }
        FlowModel::UndirDir | FlowModel::OutDirDir => calc_undirdir(network),
        FlowModel::Directed => power_iteration(network, config),
    };

    if !convergence.converged {
        tracing::warn!(
            iterations = convergence.iterations,
            error = convergence.final_error,
            "flow power iteration did not converge within its budget"
        );
    }

    if config.bipartite_adjustment {
        bipartite::adjust(network, config);
    }

    finalize_enter_exit(network);
    Ok(convergence)
}

fn calc_undirected(net: &mut StateNetwork) {
    let total_weight = net.sum_link_weight();
    let denom = (2.0 * total_weight).max(f64::MIN_POSITIVE);

    let mut node_flow: HashMap<u64, f64> = HashMap::new();
    for (&src, links) in net.adjacency() {
        for (&tgt, link) in links {
            *node_flow.entry(src).or_insert(0.0) += link.weight;
            *node_flow.entry(tgt).or_insert(0.0) += link.weight;
        }
    }
    for (id, node) in net.nodes_mut() {
        node.flow = node_flow.get(id).copied().unwrap_or(0.0) / denom;
    }
    for links in net.adjacency_mut().values_mut() {
        for link in links.values_mut() {
            link.flow = link.weight / denom;
        }
    }
}

/// `undirdir`/`outdirdir`: seed node flow from the undirected steady state,
/// then take a single directed redistribution pass over out-edges (no
/// teleportation term), and renormalize by the resulting sum. Grounded on
/// `InfomapUndirdir.cpp::calculateFlow()` -- this is a one-shot pass, not an
/// iterative power method.
fn calc_undirdir(net: &mut StateNetwork) -> Convergence {
    calc_undirected(net);

    let ids: Vec<u64> = net.nodes().keys().copied().collect();
    let undirected_flow: HashMap<u64, f64> = ids.iter().map(|&id| (id, net.nodes()[&id].flow)).collect();
    let out_weight: HashMap<u64, f64> = ids.iter().map(|&id| (id, net.out_weight(id))).collect();

    let mut new_flow: HashMap<u64, f64> = ids.iter().map(|&id| (id, 0.0)).collect();
    for &src in &ids {
        let out_w = out_weight[&src];
        if out_w <= 0.0 {
            continue;
        }
        if let Some(links) = net.adjacency().get(&src) {
            for (&tgt, link) in links {
                let edge_flow = link.weight / out_w * undirected_flow[&src];
                *new_flow.get_mut(&tgt).unwrap() += edge_flow;
            }
        }
    }

    let sum_node_flow = new_flow.values().sum::<f64>().max(f64::MIN_POSITIVE);

    for (&id, node) in net.nodes_mut() {
        node.flow = new_flow.get(&id).copied().unwrap_or(0.0) / sum_node_flow;
    }
    for (&src, links) in net.adjacency_mut() {
        let out_w = out_weight[&src];
        if out_w <= 0.0 {
            continue;
        }
        let u = undirected_flow[&src];
        for link in links.values_mut() {
            link.flow = link.weight / out_w * u / sum_node_flow;
        }
    }

    Convergence {
        converged: true,
        iterations: 1,
        final_error: 0.0,
    }
}

fn calc_rawdir(net: &mut StateNetwork) {
    let denom = net.sum_link_weight().max(f64::MIN_POSITIVE);
    let mut node_flow: HashMap<u64, f64> = HashMap::new();
    for links in net.adjacency().values() {
        for (&tgt, link) in links {
            *node_flow.entry(tgt).or_insert(0.0) += link.weight / denom;
        }
    }
    for links in net.adjacency_mut().values_mut() {
        for link in links.values_mut() {
            link.flow = link.weight / denom;
        }
    }
    for (id, node) in net.nodes_mut() {
        node.flow = node_flow.get(id).copied().unwrap_or(0.0);
    }
}

/// PageRank-style power iteration for `FlowModel::Directed`, starting from a
/// uniform distribution.
fn power_iteration(net: &mut StateNetwork, config: &Config) -> Convergence {
    let ids: Vec<u64> = net.nodes().keys().copied().collect();
    let n = ids.len();
    if n == 0 {
        return Convergence {
            converged: true,
            iterations: 0,
            final_error: 0.0,
        };
    }
    let index_of: HashMap<u64, usize> = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    let out_weight: Vec<f64> = ids.iter().map(|&id| net.out_weight(id)).collect();
    let total_link_weight = net.sum_link_weight().max(f64::MIN_POSITIVE);
    let total_node_weight: f64 = ids.iter().map(|&id| net.nodes()[&id].weight).sum::<f64>().max(f64::MIN_POSITIVE);

    let teleport: Vec<f64> = if config.teleport_to_nodes {
        ids.iter()
            .map(|&id| net.nodes()[&id].weight / total_node_weight)
            .collect()
    } else if config.recorded_teleportation {
        ids.iter().map(|&id| net.in_weight(id) / total_link_weight).collect()
    } else {
        ids.iter().map(|&id| net.out_weight(id) / total_link_weight).collect()
    };

    let mut node_flow: Vec<f64> = vec![1.0 / n as f64; n];
    normalize(&mut node_flow);

    let dangling: Vec<bool> = out_weight.iter().map(|&w| w <= 0.0).collect();

    let mut alpha = config.teleport_probability;
    let mut beta = 1.0 - alpha;
    let mut error = f64::MAX;
    let mut iterations = 0usize;

    loop {
        let dangling_rank: f64 = (0..n).filter(|&i| dangling[i]).map(|i| node_flow[i]).sum();
        let mut next = vec![0.0; n];
        for i in 0..n {
            next[i] = (alpha + beta * dangling_rank) * teleport[i];
        }
        for (si, &src) in ids.iter().enumerate() {
            if out_weight[si] <= 0.0 {
                continue;
            }
            if let Some(links) = net.adjacency().get(&src) {
                for (tgt, link) in links {
                    let ti = index_of[tgt];
                    next[ti] += beta * (link.weight / out_weight[si]) * node_flow[si];
                }
            }
        }

        let new_error: f64 = (0..n).map(|i| (next[i] - node_flow[i]).abs()).sum();
        node_flow = next;
        let sum: f64 = node_flow.iter().sum();
        if (sum - 1.0).abs() > 1e-10 && sum > 0.0 {
            for v in &mut node_flow {
                *v /= sum;
            }
        }

        if (new_error - error).abs() < 1e-15 {
            alpha += 1e-10;
            beta = 1.0 - alpha;
        }
        error = new_error;
        iterations += 1;

        if iterations >= 200 || (error <= 1e-15 && iterations >= 50) {
            break;
        }
    }

    for (i, &id) in ids.iter().enumerate() {
        net.nodes_mut().get_mut(&id).unwrap().flow = node_flow[i];
    }
    for (si, &src) in ids.iter().enumerate() {
        if out_weight[si] <= 0.0 {
            continue;
        }
        if let Some(links) = net.adjacency_mut().get_mut(&src) {
            for link in links.values_mut() {
                let p = link.weight / out_weight[si];
                link.flow = node_flow[si] * p;
            }
        }
    }

    Convergence {
        converged: error <= 1e-15,
        iterations,
        final_error: error,
    }
}

fn normalize(v: &mut [f64]) {
    let sum: f64 = v.iter().sum();
    if sum > 0.0 {
        for x in v.iter_mut() {
            *x /= sum;
        }
    }
}

fn finalize_enter_exit(net: &mut StateNetwork) {
    let mut enter: HashMap<u64, f64> = HashMap::new();
    let mut exit: HashMap<u64, f64> = HashMap::new();
    for (&src, links) in net.adjacency() {
        for (&tgt, link) in links {
            *exit.entry(src).or_insert(0.0) += link.flow;
            *enter.entry(tgt).or_insert(0.0) += link.flow;
        }
    }
    for (id, node) in net.nodes_mut() {
        node.exit_flow = exit.get(id).copied().unwrap_or(0.0);
        node.enter_flow = enter.get(id).copied().unwrap_or(0.0);
        node.dangling_flow = if node.exit_flow <= 0.0 { node.flow } else { 0.0 };
    }
}

mod bipartite {
    use super::{Config, HashMap, StateNetwork};

    /// Redistribute feature-node flow onto the primary partition and double
    /// link flow, per the bipartite adjustment rule.
    pub fn adjust(net: &mut StateNetwork, config: &Config) {
        let Some(start_id) = config.bipartite_start_id else {
            return;
        };
        let ids: Vec<u64> = net.nodes().keys().copied().collect();
        let mut added: HashMap<u64, f64> = HashMap::new();

        for &id in &ids {
            if id < start_id {
                continue;
            }
            let flow = net.nodes()[&id].flow;
            if flow <= 0.0 {
                continue;
            }
            if let Some(links) = net.adjacency().get(&id) {
                let out_sum: f64 = links.values().map(|l| l.flow).sum();
                if out_sum > 0.0 {
                    for (&tgt, link) in links {
                        *added.entry(tgt).or_insert(0.0) += flow * (link.flow / out_sum);
                    }
                }
            }
        }

        for (&id, node) in net.nodes_mut() {
            if id >= start_id {
                node.flow = 0.0;
            } else if let Some(a) = added.get(&id) {
                node.flow += a;
            }
        }
        for links in net.adjacency_mut().values_mut() {
            for link in links.values_mut() {
                link.flow *= 2.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;

    fn build_cycle(config: &Config) -> StateNetwork {
        let mut net = StateNetwork::new(config);
        net.add_link(1, 2, 1.0).unwrap();
        net.add_link(2, 3, 1.0).unwrap();
        net.add_link(3, 1, 1.0).unwrap();
        net.finalize();
        net
    }

    #[test]
    fn undirected_flow_sums_to_one() {
        let config = Config::default();
        let mut net = build_cycle(&config);
        compute(&mut net, &ConfigBuilder::default().flow_model(FlowModel::Undirected).build().unwrap()).unwrap();
        let total: f64 = net.nodes().values().map(|n| n.flow).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn directed_cycle_converges_to_uniform() {
        let config = Config::default();
        let mut net = build_cycle(&config);
        let conv = compute(&mut net, &config).unwrap();
        assert!(conv.converged);
        for n in net.nodes().values() {
            assert!((n.flow - 1.0 / 3.0).abs() < 1e-6, "flow {}", n.flow);
        }
    }

    #[test]
    fn rawdir_uses_weight_directly() {
        let config = ConfigBuilder::default().flow_model(FlowModel::RawDir).build().unwrap();
        let mut net = build_cycle(&config);
        compute(&mut net, &config).unwrap();
        let total: f64 = net.nodes().values().map(|n| n.flow).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn dangling_node_flow_is_redistributed() {
        let config = Config::default();
        let mut net = StateNetwork::new(&config);
        net.add_link(1, 2, 1.0).unwrap();
        // node 2 has no outgoing links: dangling.
        net.finalize();
        let conv = compute(&mut net, &config).unwrap();
        assert!(conv.converged);
        let total: f64 = net.nodes().values().map(|n| n.flow).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn undirdir_seeds_from_undirected_then_takes_one_directed_pass() {
        let config = ConfigBuilder::default().flow_model(FlowModel::UndirDir).build().unwrap();
        let mut net = StateNetwork::new(&config);
        net.add_link(1, 2, 1.0).unwrap();
        net.add_link(2, 3, 1.0).unwrap();
        net.add_link(2, 1, 1.0).unwrap();
        // node 3 is dangling under the directed step: its undirected share
        // is dropped from the redistribution rather than teleported.
        net.finalize();

        let conv = compute(&mut net, &config).unwrap();
        assert!(conv.converged);

        let total: f64 = net.nodes().values().map(|n| n.flow).sum();
        assert!((total - 1.0).abs() < 1e-9);

        assert!((net.nodes()[&1].flow - 0.3).abs() < 1e-9, "node 1 flow {}", net.nodes()[&1].flow);
        assert!((net.nodes()[&2].flow - 0.4).abs() < 1e-9, "node 2 flow {}", net.nodes()[&2].flow);
        assert!((net.nodes()[&3].flow - 0.3).abs() < 1e-9, "node 3 flow {}", net.nodes()[&3].flow);
    }

    #[test]
    fn kept_self_link_counts_twice_toward_its_node_degree() {
        // A kept self-link contributes to both the "src" and "tgt" side of
        // the same node's incident-weight sum, so it counts twice toward
        // the node's own undirected degree -- matching how a graph's degree
        // sequence treats a self-loop as contributing 2, not 1.
        let config = ConfigBuilder::default().flow_model(FlowModel::Undirected).include_self_links(true).build().unwrap();
        let mut net = StateNetwork::new(&config);
        net.add_link(1, 2, 1.0).unwrap();
        net.add_link(1, 1, 1.0).unwrap();
        net.finalize();
        compute(&mut net, &config).unwrap();

        // total_weight = 1.0 (to 2) + 1.0 (self) = 2.0, denom = 4.0.
        // node 1's accumulated weight = 1.0 (link to 2) + 2.0 (self-link,
        // once per endpoint) = 3.0 -> flow = 3/4.
        // node 2's accumulated weight = 1.0 -> flow = 1/4.
        assert!((net.nodes()[&1].flow - 0.75).abs() < 1e-9, "node 1 flow {}", net.nodes()[&1].flow);
        assert!((net.nodes()[&2].flow - 0.25).abs() < 1e-9, "node 2 flow {}", net.nodes()[&2].flow);
    }

    #[test]
    fn bipartite_with_rawdir_is_unsupported() {
        let config = ConfigBuilder::default()
            .flow_model(FlowModel::RawDir)
            .bipartite_adjustment(true)
            .bipartite_start_id(10)
            .build()
            .unwrap();
        let mut net = build_cycle(&config);
        assert!(matches!(
            compute(&mut net, &config),
            Err(InfomapError::FlowModelUnsupported { .. })
        ));
    }
}
