//! Engine configuration.
//!
//! [`Config`] is immutable once built; construct it through [`ConfigBuilder`]
//! (mirroring the struct-literal-with-defaults idiom used elsewhere in this
//! crate) and validate eagerly in [`ConfigBuilder::build`] so that a bad
//! option is caught before any flow computation starts.

use crate::error::{InfomapError, Result};
use serde::{Deserialize, Serialize};

/// Which stationary-distribution model the flow calculator should use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowModel {
    /// Each link treated as two directed half-links of equal weight.
    Undirected,
    /// PageRank-style power iteration with teleportation.
    Directed,
    /// Undirected steady state seeds one directed power-iteration step.
    UndirDir,
    /// Like [`Self::UndirDir`] but only the out-direction is iterated.
    OutDirDir,
    /// Link weight interpreted as flow directly, one power-iteration step.
    RawDir,
}

impl Default for FlowModel {
    fn default() -> Self {
        Self::Directed
    }
}

/// Immutable, validated set of options read by the engine at construction.
///
/// Field names and defaults match the upstream Infomap CLI's option list
/// one-to-one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub flow_model: FlowModel,
    pub teleport_probability: f64,
    pub teleport_to_nodes: bool,
    pub recorded_teleportation: bool,
    pub include_self_links: bool,
    pub weight_threshold: f64,
    pub num_trials: usize,
    pub two_level: bool,
    pub min_codelength_improvement: f64,
    pub core_loop_limit: usize,
    pub randomize_core_loop_limit: bool,
    pub level_aggregation_limit: usize,
    pub tune_iteration_limit: usize,
    pub coarse_tune_level: usize,
    pub alternate_coarse_tune_level: bool,
    pub fast_hierarchical_solution: u8,
    pub seed_to_rng: u64,
    pub max_levels: usize,
    pub min_relative_tune_iteration_improvement: f64,
    pub bipartite_adjustment: bool,
    pub bipartite_start_id: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flow_model: FlowModel::Directed,
            teleport_probability: 0.15,
            teleport_to_nodes: true,
            recorded_teleportation: true,
            include_self_links: false,
            weight_threshold: 0.0,
            num_trials: 1,
            two_level: false,
            min_codelength_improvement: 1e-10,
            core_loop_limit: 10,
            randomize_core_loop_limit: true,
            level_aggregation_limit: 0,
            tune_iteration_limit: 0,
            coarse_tune_level: 1,
            alternate_coarse_tune_level: false,
            fast_hierarchical_solution: 0,
            seed_to_rng: 0,
            max_levels: 64,
            min_relative_tune_iteration_improvement: 1e-5,
            bipartite_adjustment: false,
            bipartite_start_id: None,
        }
    }
}

impl Config {
    /// Start building a `Config` from the documented defaults.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder(Self::default())
    }

    /// Initialize a reproducible RNG seeded from this config, or from system
    /// entropy when `seed_to_rng == 0`.
    #[must_use]
    pub(crate) fn root_rng(&self) -> crate::rng::EngineRng {
        crate::rng::EngineRng::from_seed(self.seed_to_rng)
    }
}

/// Fluent builder for [`Config`]; validates on [`Self::build`].
#[derive(Clone, Debug, Default)]
pub struct ConfigBuilder(Config);

macro_rules! setter {
    ($name:ident : $ty:ty) => {
        #[must_use]
        pub fn $name(mut self, value: $ty) -> Self {
            self.0.$name = value;
            self
        }
    };
}

impl ConfigBuilder {
    setter!(flow_model: FlowModel);
    setter!(teleport_probability: f64);
    setter!(teleport_to_nodes: bool);
    setter!(recorded_teleportation: bool);
    setter!(include_self_links: bool);
    setter!(weight_threshold: f64);
    setter!(num_trials: usize);
    setter!(two_level: bool);
    setter!(min_codelength_improvement: f64);
    setter!(core_loop_limit: usize);
    setter!(randomize_core_loop_limit: bool);
    setter!(level_aggregation_limit: usize);
    setter!(tune_iteration_limit: usize);
    setter!(coarse_tune_level: usize);
    setter!(alternate_coarse_tune_level: bool);
    setter!(fast_hierarchical_solution: u8);
    setter!(seed_to_rng: u64);
    setter!(max_levels: usize);
    setter!(min_relative_tune_iteration_improvement: f64);
    setter!(bipartite_adjustment: bool);

    #[must_use]
    pub fn bipartite_start_id(mut self, value: u64) -> Self {
        self.0.bipartite_start_id = Some(value);
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<Config> {
        let c = self.0;

        if !(0.0..1.0).contains(&c.teleport_probability) {
            return Err(InfomapError::invalid_config(
                "teleport_probability",
                format!("must be in (0,1), got {}", c.teleport_probability),
            ));
        }
        if c.num_trials == 0 {
            return Err(InfomapError::invalid_config(
                "num_trials",
                "must be >= 1",
            ));
        }
        if c.weight_threshold < 0.0 {
            return Err(InfomapError::invalid_config(
                "weight_threshold",
                "must be >= 0",
            ));
        }
        if c.min_codelength_improvement < 0.0 {
            return Err(InfomapError::invalid_config(
                "min_codelength_improvement",
                "must be >= 0",
            ));
        }
        if c.fast_hierarchical_solution > 3 {
            return Err(InfomapError::invalid_config(
                "fast_hierarchical_solution",
                "must be one of {0,1,2,3}",
            ));
        }
        if c.max_levels == 0 {
            return Err(InfomapError::invalid_config("max_levels", "must be >= 1"));
        }

        Ok(c)
    }
}
