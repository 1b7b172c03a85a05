//! State network: the in-memory graph the flow calculator and partitioner
//! operate on.
//!
//! A [`StateNetwork`] is built incrementally via [`StateNetwork::add_state_node`]
//! and [`StateNetwork::add_link`], then locked with [`StateNetwork::finalize`].
//! Duplicate links are aggregated by summing weight; iteration order after
//! `finalize` is deterministic because the adjacency map is keyed and
//! ordered by target id (a `BTreeMap`, not a hash map).

use crate::config::Config;
use crate::error::{InfomapError, Result};
use std::collections::BTreeMap;

/// A single state node (see the data-model §3 "State node").
///
/// For a first-order network `state_id == physical_id`; memory-order and
/// multiplex networks set `physical_id` to the node several state ids share.
#[derive(Clone, Debug)]
pub struct StateNode {
    pub id: u64,
    pub physical_id: u64,
    pub layer_id: u64,
    pub weight: f64,
    pub flow: f64,
    pub enter_flow: f64,
    pub exit_flow: f64,
    pub dangling_flow: f64,
}

impl StateNode {
    fn new(id: u64, physical_id: u64) -> Self {
        Self {
            id,
            physical_id,
            layer_id: 0,
            weight: 1.0,
            flow: 0.0,
            enter_flow: 0.0,
            exit_flow: 0.0,
            dangling_flow: 0.0,
        }
    }
}

/// Aggregated per-physical-node attributes (display name, weight).
#[derive(Clone, Debug, Default)]
pub struct PhysicalNode {
    pub weight: f64,
    pub name: Option<String>,
}

/// Directed link data between two state nodes, aggregated across duplicate
/// `(source, target)` insertions by summing weight.
#[derive(Clone, Copy, Debug)]
pub struct LinkData {
    pub weight: f64,
    pub flow: f64,
}

/// In-memory, append-then-finalize graph store.
///
/// `adjacency[source]` is a `BTreeMap<target, LinkData>` so that iteration
/// is sorted by target id once the network is finalized -- this is what
/// makes the core loop's candidate enumeration reproducible.
#[derive(Clone, Debug)]
pub struct StateNetwork {
    nodes: BTreeMap<u64, StateNode>,
    physical_nodes: BTreeMap<u64, PhysicalNode>,
    adjacency: BTreeMap<u64, BTreeMap<u64, LinkData>>,
    weight_threshold: f64,
    include_self_links: bool,
    finalized: bool,
    num_self_links_found: u64,
    num_links_ignored_by_threshold: u64,
    sum_link_weight: f64,
    sum_self_link_weight: f64,
}

impl StateNetwork {
    /// Create an empty network governed by `config`'s `weight_threshold` and
    /// `include_self_links` options.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            nodes: BTreeMap::new(),
            physical_nodes: BTreeMap::new(),
            adjacency: BTreeMap::new(),
            weight_threshold: config.weight_threshold,
            include_self_links: config.include_self_links,
            finalized: false,
            num_self_links_found: 0,
            num_links_ignored_by_threshold: 0,
            sum_link_weight: 0.0,
            sum_self_link_weight: 0.0,
        }
    }

    /// Insert a state node. Re-adding an existing `id` is idempotent (the
    /// prior node's attributes are kept).
    pub fn add_state_node(&mut self, id: u64, physical_id: u64, weight: f64) -> Result<()> {
        self.ensure_not_finalized()?;
        if weight < 0.0 {
            return Err(InfomapError::invalid_graph(format!(
                "node {id}: weight must be >= 0, got {weight}"
            )));
        }
        self.nodes.entry(id).or_insert_with(|| {
            let mut n = StateNode::new(id, physical_id);
            n.weight = weight;
            n
        });
        self.physical_nodes
            .entry(physical_id)
            .or_insert_with(PhysicalNode::default);
        Ok(())
    }

    /// Insert a first-order node (`state_id == physical_id`).
    pub fn add_node(&mut self, id: u64, weight: f64) -> Result<()> {
        self.add_state_node(id, id, weight)
    }

    /// Add (or aggregate into an existing) directed link.
    ///
    /// Links below `weight_threshold` are silently dropped and counted, not
    /// treated as an error. Self-links are kept or dropped per
    /// `include_self_links`.
    pub fn add_link(&mut self, source: u64, target: u64, weight: f64) -> Result<()> {
        self.ensure_not_finalized()?;
        if weight < 0.0 {
            return Err(InfomapError::invalid_graph(format!(
                "link {source}->{target}: weight must be >= 0, got {weight}"
            )));
        }
        if source == target {
            self.num_self_links_found += 1;
            self.sum_self_link_weight += weight;
            if !self.include_self_links {
                return Ok(());
            }
        }
        if weight < self.weight_threshold {
            self.num_links_ignored_by_threshold += 1;
            return Ok(());
        }
        if !self.nodes.contains_key(&source) {
            self.add_state_node(source, source, 1.0)?;
        }
        if !self.nodes.contains_key(&target) {
            self.add_state_node(target, target, 1.0)?;
        }
        self.sum_link_weight += weight;
        let entry = self
            .adjacency
            .entry(source)
            .or_default()
            .entry(target)
            .or_insert(LinkData { weight: 0.0, flow: 0.0 });
        entry.weight += weight;
        Ok(())
    }

    /// Lock the network against further structural edits.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    fn ensure_not_finalized(&self) -> Result<()> {
        if self.finalized {
            return Err(InfomapError::invalid_graph(
                "network is finalized; no further structural edits are allowed",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn num_physical_nodes(&self) -> usize {
        self.physical_nodes.len()
    }

    #[must_use]
    pub fn sum_link_weight(&self) -> f64 {
        self.sum_link_weight
    }

    #[must_use]
    pub fn nodes(&self) -> &BTreeMap<u64, StateNode> {
        &self.nodes
    }

    #[must_use]
    pub fn nodes_mut(&mut self) -> &mut BTreeMap<u64, StateNode> {
        &mut self.nodes
    }

    #[must_use]
    pub fn adjacency(&self) -> &BTreeMap<u64, BTreeMap<u64, LinkData>> {
        &self.adjacency
    }

    #[must_use]
    pub fn adjacency_mut(&mut self) -> &mut BTreeMap<u64, BTreeMap<u64, LinkData>> {
        &mut self.adjacency
    }

    /// Out-degree (sum of outgoing link weight) per node, used by flow
    /// models that teleport to links weighted by source degree.
    #[must_use]
    pub fn out_weight(&self, node: u64) -> f64 {
        self.adjacency
            .get(&node)
            .map(|links| links.values().map(|l| l.weight).sum())
            .unwrap_or(0.0)
    }

    /// In-degree (sum of incoming link weight), used for recorded
    /// teleport-to-links.
    #[must_use]
    pub fn in_weight(&self, node: u64) -> f64 {
        self.adjacency
            .values()
            .filter_map(|links| links.get(&node))
            .map(|l| l.weight)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config::default()
    }

    #[test]
    fn duplicate_links_are_aggregated() {
        let mut net = StateNetwork::new(&cfg());
        net.add_link(1, 2, 1.0).unwrap();
        net.add_link(1, 2, 2.5).unwrap();
        net.finalize();
        assert_eq!(net.adjacency()[&1][&2].weight, 3.5);
        assert_eq!(net.num_nodes(), 2);
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut net = StateNetwork::new(&cfg());
        assert!(net.add_link(1, 2, -1.0).is_err());
    }

    #[test]
    fn self_links_dropped_by_default() {
        let mut net = StateNetwork::new(&cfg());
        net.add_link(1, 1, 5.0).unwrap();
        assert!(net.adjacency().get(&1).is_none());
    }

    #[test]
    fn self_links_kept_when_enabled() {
        let mut c = cfg();
        c.include_self_links = true;
        let mut net = StateNetwork::new(&c);
        net.add_link(1, 1, 5.0).unwrap();
        assert_eq!(net.adjacency()[&1][&1].weight, 5.0);
    }

    #[test]
    fn edits_after_finalize_are_rejected() {
        let mut net = StateNetwork::new(&cfg());
        net.finalize();
        assert!(net.add_link(1, 2, 1.0).is_err());
    }
}
