//! # infomap-engine
//!
//! A hierarchical network clustering engine implementing the map equation:
//! given a weighted, possibly directed graph, find the multi-level module
//! partition that minimizes the expected description length of a random
//! walker's trajectory on the network.
//!
//! ## Quick Start
//!
//! ```
//! use infomap_engine::{Config, Infomap};
//! use infomap_engine::testing::fixtures;
//!
//! # fn main() -> infomap_engine::Result<()> {
//! let network = fixtures::triangle_bridge();
//! let outcome = Infomap::new(Config::default()).run(network)?;
//!
//! println!("codelength: {}", outcome.codelength());
//! for leaf in outcome.leaves() {
//!     println!("{} -> {:?}", leaf.physical_id, leaf.module_path);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### `StateNetwork`
//!
//! A [`StateNetwork`] is the input graph: add nodes and links, then
//! [`StateNetwork::finalize`] it. For a first-order network, state ids and
//! physical ids coincide; memory-order and multiplex networks give several
//! state ids the same physical id so that context-dependent paths can share
//! module assignment downstream (see [`testing::fixtures::memory_bigram`]).
//!
//! ### `Config`
//!
//! [`Config`] selects the flow model, trial count, and every core-loop/tuning
//! knob the engine exposes. Build one with [`Config::builder`].
//!
//! ### `Infomap`
//!
//! [`Infomap`] is the facade tying the flow calculator
//! ([`flow::compute`]) and the hierarchical driver ([`driver::HierarchicalDriver`])
//! together into one call. [`Infomap::run`] consumes a finalized (or
//! not-yet-finalized -- it finalizes for you) network and returns an
//! [`Outcome`].
//!
//! ### `Outcome`
//!
//! [`Outcome`] wraps the winning trial's tree and exposes
//! [`result::ResultAccessor`]'s read-only views: [`Outcome::leaves`],
//! [`Outcome::physical_leaves`], [`Outcome::level_stats`],
//! [`Outcome::depth_stats`].
//!
//! ## Extending
//!
//! ### Custom Flow Models
//!
//! The five models in [`config::FlowModel`] cover the upstream engine's
//! models; adding a sixth means extending [`flow::compute`]'s match and the
//! [`codelength::Balance`] it maps to.
//!
//! ### Custom Metrics
//!
//! Implement [`metrics::Metric`] to track your own run-level statistics
//! alongside the built-in counters, gauges, and histograms.

pub mod codelength;
pub mod config;
pub mod driver;
pub mod error;
pub mod flow;
pub mod network;
pub mod partition;
pub mod result;
pub mod rng;
pub mod tree;

#[cfg(feature = "metrics")]
pub mod metrics;

pub mod testing;

pub use config::{Config, ConfigBuilder, FlowModel};
pub use error::{InfomapError, Result};
pub use network::StateNetwork;
pub use result::{DepthStats, LeafView, LevelStats, ResultAccessor};

use driver::HierarchicalDriver;

/// Facade tying network, configuration, flow calculation, and the
/// hierarchical driver together into one entry point.
pub struct Infomap {
    config: Config,
}

impl Infomap {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Compute flow, then search for the hierarchy minimizing the map
    /// equation, running `config.num_trials` independent attempts and
    /// keeping the shortest.
    ///
    /// # Errors
    ///
    /// Returns [`InfomapError::InvalidGraph`] for an empty network,
    /// [`InfomapError::FlowModelUnsupported`] for an unsupported
    /// configuration/flow-model combination, or
    /// [`InfomapError::InternalConsistency`] if an engine invariant is
    /// violated.
    pub fn run(&self, mut network: StateNetwork) -> Result<Outcome> {
        if !network.is_finalized() {
            network.finalize();
        }
        let convergence = flow::compute(&mut network, &self.config)?;
        let convergence_warning = (!convergence.converged).then(|| InfomapError::NonconvergedFlow {
            iterations: convergence.iterations,
            final_error: convergence.final_error,
        });

        let driver = HierarchicalDriver::new(&self.config);
        let result = driver.run(&network)?;

        Ok(Outcome {
            tree: result.tree,
            codelength: result.codelength,
            collapsed_to_one_level: result.collapsed_to_one_level,
            convergence_warning,
        })
    }
}

/// The winning trial's hierarchy plus its codelength.
pub struct Outcome {
    tree: tree::TreeStore,
    codelength: f64,
    collapsed_to_one_level: bool,
    convergence_warning: Option<InfomapError>,
}

impl Outcome {
    #[must_use]
    pub fn codelength(&self) -> f64 {
        self.codelength
    }

    /// `Some(InfomapError::NonconvergedFlow { .. })` when flow computation
    /// exhausted its iteration budget before converging. The run still
    /// completed and `self` reflects the best flow found (§7's non-fatal
    /// recovery policy) -- callers that want strict behavior instead of a
    /// warning can match on this and bail themselves.
    #[must_use]
    pub fn convergence_warning(&self) -> Option<&InfomapError> {
        self.convergence_warning.as_ref()
    }

    /// True when the two-level (single-module) solution was shorter than
    /// every hierarchical trial and was substituted in (§4.6 step 8).
    #[must_use]
    pub fn collapsed_to_one_level(&self) -> bool {
        self.collapsed_to_one_level
    }

    #[must_use]
    pub fn tree(&self) -> &tree::TreeStore {
        &self.tree
    }

    #[must_use]
    pub fn accessor(&self) -> ResultAccessor<'_> {
        ResultAccessor::new(&self.tree, self.codelength)
    }

    #[must_use]
    pub fn leaves(&self) -> Vec<LeafView> {
        self.accessor().leaves()
    }

    #[must_use]
    pub fn physical_leaves(&self) -> Vec<LeafView> {
        self.accessor().physical_leaves()
    }

    #[must_use]
    pub fn level_stats(&self) -> Vec<LevelStats> {
        self.accessor().level_stats()
    }

    #[must_use]
    pub fn depth_stats(&self) -> DepthStats {
        self.accessor().depth_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn triangle_bridge_separates_into_two_clusters() {
        let outcome = Infomap::new(Config::default()).run(fixtures::triangle_bridge()).unwrap();
        let leaves = outcome.leaves();
        testing::assert_same_cluster(&leaves, 0, 1);
        testing::assert_different_clusters(&leaves, 0, 3);
    }

    #[test]
    fn convergence_warning_is_absent_on_a_well_behaved_run() {
        let outcome = Infomap::new(Config::default()).run(fixtures::triangle_bridge()).unwrap();
        assert!(outcome.convergence_warning().is_none());
    }

    #[test]
    fn empty_network_is_rejected() {
        let net = StateNetwork::new(&Config::default());
        let err = Infomap::new(Config::default()).run(net).unwrap_err();
        assert!(matches!(err, InfomapError::InvalidGraph { .. }));
    }
}
