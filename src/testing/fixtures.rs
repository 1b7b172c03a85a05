//! Pre-built test networks for common clustering scenarios.

use crate::config::Config;
use crate::network::StateNetwork;

fn net() -> StateNetwork {
    StateNetwork::new(&Config::default())
}

/// Two triangles joined by a single weak bridge edge -- the textbook
/// two-community example.
#[must_use]
pub fn triangle_bridge() -> StateNetwork {
    let mut g = net();
    for &(a, b) in &[(0u64, 1u64), (1, 2), (2, 0)] {
        g.add_link(a, b, 1.0).unwrap();
        g.add_link(b, a, 1.0).unwrap();
    }
    for &(a, b) in &[(3u64, 4u64), (4, 5), (5, 3)] {
        g.add_link(a, b, 1.0).unwrap();
        g.add_link(b, a, 1.0).unwrap();
    }
    g.add_link(2, 3, 0.01).unwrap();
    g.add_link(3, 2, 0.01).unwrap();
    g.finalize();
    g
}

/// A single directed cycle of length `n` -- every node has exactly one
/// in-link and one out-link, so the stationary distribution only emerges
/// after power iteration rather than being given by degree.
#[must_use]
pub fn directed_cycle(n: u64) -> StateNetwork {
    let mut g = net();
    for id in 0..n {
        g.add_link(id, (id + 1) % n, 1.0).unwrap();
    }
    g.finalize();
    g
}

/// One hub connected to `leaves` spokes, undirected -- a network with no
/// non-trivial community structure.
#[must_use]
pub fn star(leaves: u64) -> StateNetwork {
    let mut g = net();
    for id in 1..=leaves {
        g.add_link(0, id, 1.0).unwrap();
        g.add_link(id, 0, 1.0).unwrap();
    }
    g.finalize();
    g
}

/// Two fully-connected cliques of size `k` joined by one weak edge.
#[must_use]
pub fn clique_pair(k: u64) -> StateNetwork {
    let mut g = net();
    for a in 0..k {
        for b in (a + 1)..k {
            g.add_link(a, b, 1.0).unwrap();
            g.add_link(b, a, 1.0).unwrap();
        }
    }
    for a in k..2 * k {
        for b in (a + 1)..(2 * k) {
            g.add_link(a, b, 1.0).unwrap();
            g.add_link(b, a, 1.0).unwrap();
        }
    }
    g.add_link(0, k, 0.1).unwrap();
    g.add_link(k, 0, 0.1).unwrap();
    g.finalize();
    g
}

/// A small second-order (memory) network: state nodes `(prior, current)`
/// encoded as `prior * 100 + current`, sharing physical id `current`, used
/// to exercise [`crate::result::ResultAccessor::physical_leaves`].
#[must_use]
pub fn memory_bigram() -> StateNetwork {
    let mut g = net();
    let state = |prior: u64, current: u64| prior * 100 + current;
    let transitions: &[(u64, u64, u64, u64)] = &[
        (0, 1, 1, 2),
        (0, 2, 2, 1),
        (1, 2, 2, 1),
        (2, 1, 1, 2),
        (2, 3, 3, 2),
        (3, 2, 2, 3),
    ];
    for &(p1, c1, p2, c2) in transitions {
        let from = state(p1, c1);
        let to = state(p2, c2);
        g.add_state_node(from, c1, 1.0).unwrap();
        g.add_state_node(to, c2, 1.0).unwrap();
        g.add_link(from, to, 1.0).unwrap();
    }
    g.finalize();
    g
}

/// A bipartite network with two feature nodes shared by overlapping groups
/// of primary nodes, for exercising the bipartite flow adjustment.
/// Returns the network plus the feature-node ids.
#[must_use]
pub fn bipartite_square() -> (StateNetwork, Vec<u64>) {
    let mut g = net();
    let features = vec![4u64, 5u64];
    for &primary in &[0u64, 1, 2] {
        g.add_link(primary, 4, 1.0).unwrap();
        g.add_link(4, primary, 1.0).unwrap();
    }
    for &primary in &[1u64, 2, 3] {
        g.add_link(primary, 5, 1.0).unwrap();
        g.add_link(5, primary, 1.0).unwrap();
    }
    g.finalize();
    (g, features)
}
