//! A fluent builder for assembling small test networks.

use crate::config::Config;
use crate::network::StateNetwork;

/// Fluent wrapper around [`StateNetwork`] for building small graphs inline
/// in a test body, without threading `Result` through every call.
///
/// # Example
///
/// ```
/// use infomap_engine::testing::GraphBuilder;
///
/// let net = GraphBuilder::new()
///     .undirected_edge(0, 1, 1.0)
///     .undirected_edge(1, 2, 1.0)
///     .build();
/// assert_eq!(net.num_nodes(), 3);
/// ```
pub struct GraphBuilder {
    config: Config,
    network: StateNetwork,
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        let config = Config::default();
        let network = StateNetwork::new(&config);
        Self { config, network }
    }

    /// Build with a specific configuration (governs `weight_threshold` and
    /// `include_self_links` during construction).
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        let network = StateNetwork::new(&config);
        Self { config, network }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Add a directed link `source -> target`.
    ///
    /// # Panics
    ///
    /// Panics if the network has already been finalized or the weight is
    /// negative -- fixture construction is expected to be infallible.
    #[must_use]
    pub fn edge(mut self, source: u64, target: u64, weight: f64) -> Self {
        self.network.add_link(source, target, weight).expect("edge");
        self
    }

    /// Add both directions of an undirected link.
    #[must_use]
    pub fn undirected_edge(self, a: u64, b: u64, weight: f64) -> Self {
        self.edge(a, b, weight).edge(b, a, weight)
    }

    /// Add an isolated node with no links.
    #[must_use]
    pub fn node(mut self, id: u64, weight: f64) -> Self {
        self.network.add_node(id, weight).expect("node");
        self
    }

    /// Add a state node sharing `physical_id` with other state nodes (for
    /// memory/multiplex fixtures).
    #[must_use]
    pub fn state_node(mut self, id: u64, physical_id: u64, weight: f64) -> Self {
        self.network.add_state_node(id, physical_id, weight).expect("state node");
        self
    }

    /// Finalize and return the built network.
    #[must_use]
    pub fn build(mut self) -> StateNetwork {
        self.network.finalize();
        self.network
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
