//! Hierarchical driver (C6): trials, super-module iteration, coarse/fine
//! tuning, and recursive sub-structure discovery.
//!
//! Grounded on `InfomapBase.cpp`'s `run`/`partition`/`generalTune` control
//! flow. Super-node levels and the original leaf level are both driven
//! through the same [`Driver::partition_level`] helper, treating a module's
//! [`TreeHandle::raw`] as its id at the next level up -- one mechanism
//! covers both "partition the leaves" and "partition the current modules".
//!
//! Sub-engine recursion (§4.6 step 7) only considers links internal to the
//! module being recursed into; links leaving the module are dropped from
//! that recursion rather than folded into the sub-engine's own codelength.
//! This is a deliberate simplification recorded in `DESIGN.md`.

use crate::codelength::{plogp, Balance};
use crate::config::{Config, FlowModel};
use crate::error::{InfomapError, Result};
use crate::network::StateNetwork;
use crate::partition::{consolidate, PartitionInput, PartitionResult, Partitioner};
use crate::rng::EngineRng;
use crate::tree::{TreeHandle, TreeStore};
use rayon::prelude::*;
use std::collections::HashMap;

/// Outcome of a full hierarchical run: the winning trial's tree and its
/// codelength (hierarchical, or the one-level codelength if that was
/// shorter -- see §4.6 step 8).
pub struct DriverResult {
    pub tree: TreeStore,
    pub codelength: f64,
    pub collapsed_to_one_level: bool,
}

pub struct HierarchicalDriver<'c> {
    config: &'c Config,
}

impl<'c> HierarchicalDriver<'c> {
    #[must_use]
    pub fn new(config: &'c Config) -> Self {
        Self { config }
    }

    /// Run `config.num_trials` independent attempts and keep the shortest.
    pub fn run(&self, network: &StateNetwork) -> Result<DriverResult> {
        if network.num_nodes() == 0 {
            return Err(InfomapError::invalid_graph("cannot cluster an empty network"));
        }

        let state_ids: Vec<u64> = network.nodes().keys().copied().collect();
        let node_flow_by_id: HashMap<u64, f64> = state_ids.iter().map(|&id| (id, network.nodes()[&id].flow)).collect();
        let physical_id_by_state: HashMap<u64, u64> = state_ids.iter().map(|&id| (id, network.nodes()[&id].physical_id)).collect();
        let links_by_id: Vec<(u64, u64, f64)> = network
            .adjacency()
            .iter()
            .flat_map(|(&src, targets)| targets.iter().map(move |(&tgt, link)| (src, tgt, link.flow)))
            .collect();

        let one_level_codelength: f64 = -state_ids.iter().map(|id| plogp(node_flow_by_id[id])).sum::<f64>();

        let balance = match self.config.flow_model {
            FlowModel::Undirected | FlowModel::UndirDir | FlowModel::OutDirDir => Balance::Undirected,
            FlowModel::Directed | FlowModel::RawDir => Balance::DirectedUnbalanced,
        };

        let seeds: Vec<u64> = (0..self.config.num_trials as u64)
            .map(|i| {
                if self.config.seed_to_rng == 0 {
                    i + 1
                } else {
                    self.config.seed_to_rng.wrapping_add(i.wrapping_mul(0x9E37_79B9_7F4A_7C15))
                }
            })
            .collect();

        tracing::info!(num_trials = seeds.len(), model = ?self.config.flow_model, "starting hierarchical search");

        let run_one = |seed: u64| self.run_trial(&state_ids, &node_flow_by_id, &physical_id_by_state, &links_by_id, balance, seed);

        let mut trials: Vec<(TreeStore, f64)> = if seeds.len() > 1 && num_cpus::get() > 1 {
            seeds.par_iter().map(|&seed| run_one(seed)).collect()
        } else {
            seeds.iter().map(|&seed| run_one(seed)).collect()
        };

        trials.sort_by(|a, b| a.1.partial_cmp(&b.1).expect("codelength must not be NaN"));
        let (mut best_tree, mut best_codelength) = trials.into_iter().next().expect("at least one trial");

        tracing::info!(hierarchical_codelength = best_codelength, one_level_codelength, "trials complete");

        let collapsed = one_level_codelength <= best_codelength + self.config.min_codelength_improvement;
        if collapsed {
            tracing::debug!("one-level solution is shorter; collapsing");
            best_tree = TreeStore::new_flat(state_ids.iter().map(|&id| (id, physical_id_by_state[&id], node_flow_by_id[&id])));
            best_codelength = one_level_codelength;
        }

        Ok(DriverResult {
            tree: best_tree,
            codelength: best_codelength,
            collapsed_to_one_level: collapsed,
        })
    }

    /// Partition the network described by `ids`/`flow_by_id`/`links_by_id`
    /// (either the original leaves, keyed by state id, or a super-node
    /// level, keyed by module handle raw ids) and return the result plus
    /// each id's index into `ids`.
    ///
    /// `physical_by_id`, when given, enables the §4.4 memory/physical
    /// codelength correction -- pass it whenever `ids` are state ids (the
    /// original leaves); pass `None` when `ids` are module handles, which
    /// have no single physical id of their own.
    fn partition_level(
        &self,
        ids: &[u64],
        flow_by_id: &HashMap<u64, f64>,
        links_by_id: &[(u64, u64, f64)],
        balance: Balance,
        physical_by_id: Option<&HashMap<u64, u64>>,
        initial: Option<&[u32]>,
        rng: &mut EngineRng,
    ) -> (PartitionResult, HashMap<u64, usize>) {
        let idx_of: HashMap<u64, usize> = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let flow: Vec<f64> = ids.iter().map(|id| flow_by_id[id]).collect();
        let links: Vec<(usize, usize, f64)> = links_by_id
            .iter()
            .filter_map(|&(s, t, f)| Some((*idx_of.get(&s)?, *idx_of.get(&t)?, f)))
            .collect();
        let mut input = PartitionInput::from_links(flow, links, balance);
        if let Some(physical) = physical_by_id {
            input = input.with_physical_ids(ids.iter().map(|id| physical[id]).collect());
        }
        let result = Partitioner::new(self.config).run_from(&input, initial, rng);
        (result, idx_of)
    }

    fn run_trial(
        &self,
        state_ids: &[u64],
        node_flow_by_id: &HashMap<u64, f64>,
        physical_id_by_state: &HashMap<u64, u64>,
        links_by_id: &[(u64, u64, f64)],
        balance: Balance,
        seed: u64,
    ) -> (TreeStore, f64) {
        let mut rng = EngineRng::from_seed(seed);
        let mut tree = TreeStore::new_flat(state_ids.iter().map(|&id| (id, physical_id_by_state[&id], node_flow_by_id[&id])));
        let leaf_handle_of_id: HashMap<u64, TreeHandle> = state_ids
            .iter()
            .copied()
            .zip(tree.get(tree.root()).children.clone())
            .collect();

        let (result, _) = self.partition_level(state_ids, node_flow_by_id, links_by_id, balance, Some(physical_id_by_state), None, &mut rng);
        let ordered_leaves: Vec<TreeHandle> = state_ids.iter().map(|id| leaf_handle_of_id[id]).collect();
        let mut modules = consolidate(&mut tree, tree.root(), &ordered_leaves, &result.module_of);
        let mut codelength = result.codelength;

        let mut owner_of_state: HashMap<u64, u64> = state_ids
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, u64::from(modules[result.module_of[i] as usize].raw())))
            .collect();

        if self.config.two_level || modules.len() <= 1 {
            return (tree, codelength);
        }

        let mut tune_iteration = 0usize;
        loop {
            let super_improved = self.grow_super_levels(&mut tree, &mut modules, &mut owner_of_state, links_by_id, balance, &mut rng, &mut codelength);

            let use_coarse_tune = self.config.coarse_tune_level > 0
                && (!self.config.alternate_coarse_tune_level || tune_iteration % 2 == 0);
            let coarse_initial = use_coarse_tune.then(|| {
                self.coarse_tune(&tree, &modules, node_flow_by_id, physical_id_by_state, links_by_id, balance, &mut rng)
            });

            let previous = codelength;
            let mut candidate_owner = owner_of_state.clone();
            let fine_improved = self.fine_tune(
                &mut tree,
                state_ids,
                node_flow_by_id,
                physical_id_by_state,
                links_by_id,
                balance,
                &owner_of_state,
                coarse_initial.as_ref(),
                &mut rng,
                &mut modules,
                &mut candidate_owner,
                &mut codelength,
            );
            if fine_improved {
                owner_of_state = candidate_owner;
            }

            let relative_improvement = (previous - codelength) / previous.abs().max(1e-12);
            tune_iteration += 1;

            let limit_reached = self.config.tune_iteration_limit > 0 && tune_iteration >= self.config.tune_iteration_limit;
            let no_progress = !super_improved && !fine_improved;
            if limit_reached || no_progress || relative_improvement < self.config.min_relative_tune_iteration_improvement {
                break;
            }
        }

        self.recurse_into_modules(&mut tree, &modules.clone(), node_flow_by_id, physical_id_by_state, links_by_id, balance, &mut rng, 1);
        self.annotate_module_stats(&mut tree, &modules, node_flow_by_id, links_by_id, &owner_of_state);

        (tree, codelength)
    }

    /// Stamp each top-level module's enter/exit flow and its own index-codebook
    /// contribution onto the tree node, for [`crate::result::ResultAccessor::level_stats`].
    /// Only the top level is annotated; see `DESIGN.md`.
    fn annotate_module_stats(
        &self,
        tree: &mut TreeStore,
        modules: &[TreeHandle],
        node_flow_by_id: &HashMap<u64, f64>,
        links_by_id: &[(u64, u64, f64)],
        owner_of_state: &HashMap<u64, u64>,
    ) {
        let mut exit_by_module: HashMap<u64, f64> = HashMap::new();
        for &(s, t, f) in links_by_id {
            let (Some(&os), Some(&ot)) = (owner_of_state.get(&s), owner_of_state.get(&t)) else {
                continue;
            };
            if os != ot {
                *exit_by_module.entry(os).or_insert(0.0) += f;
                *exit_by_module.entry(ot).or_insert(0.0) += f;
            }
        }

        for &module in modules {
            let exit = exit_by_module.get(&u64::from(module.raw())).copied().unwrap_or(0.0);
            let flow = tree.get(module).flow;
            let leaf_term: f64 = tree
                .leaves_under(module)
                .keys()
                .map(|id| plogp(node_flow_by_id.get(id).copied().unwrap_or(0.0)))
                .sum();
            let node = tree.get_mut(module);
            node.enter_flow = exit;
            node.exit_flow = exit;
            node.module_codelength = plogp(flow + exit) - plogp(exit) - leaf_term;
        }
    }

    /// Repeatedly look for structure among the current top-level modules,
    /// accepting a new super-level only when it is non-trivial and strictly
    /// shortens the codelength (§4.6 step 3).
    fn grow_super_levels(
        &self,
        tree: &mut TreeStore,
        modules: &mut Vec<TreeHandle>,
        owner_of_state: &mut HashMap<u64, u64>,
        links_by_id: &[(u64, u64, f64)],
        balance: Balance,
        rng: &mut EngineRng,
        codelength: &mut f64,
    ) -> bool {
        let mut improved = false;
        let mut depth = 0usize;

        loop {
            if modules.len() <= 1 || depth >= self.config.max_levels {
                break;
            }
            let current_ids: Vec<u64> = modules.iter().map(|h| u64::from(h.raw())).collect();
            let current_flow: HashMap<u64, f64> = current_ids.iter().map(|&id| (id, tree.get(TreeHandle::new(id as u32)).flow)).collect();
            let current_links: Vec<(u64, u64, f64)> = links_by_id.iter().map(|&(s, t, f)| (owner_of_state[&s], owner_of_state[&t], f)).collect();

            let mut child_rng = rng.child(depth as u64);
            let (super_result, idx_of) = self.partition_level(&current_ids, &current_flow, &current_links, balance, None, None, &mut child_rng);

            let non_trivial = super_result.num_modules > 1 && super_result.num_modules < current_ids.len();
            if !non_trivial || super_result.codelength >= *codelength - self.config.min_codelength_improvement {
                break;
            }

            let new_modules = consolidate(tree, tree.root(), modules, &super_result.module_of);
            for owner in owner_of_state.values_mut() {
                let old_idx = idx_of[owner];
                *owner = u64::from(new_modules[super_result.module_of[old_idx] as usize].raw());
            }
            *modules = new_modules;
            *codelength = super_result.codelength;
            improved = true;
            depth += 1;
        }

        improved
    }

    /// Re-run the partitioner on the original leaves, warm-started either
    /// from `coarse_initial` (the finer-grained sub-structure [`Self::coarse_tune`]
    /// found, §4.6 step 4) when present, or otherwise from the current
    /// modular assignment (§4.6 step 5), accepting the refinement only if it
    /// does not increase the codelength.
    #[allow(clippy::too_many_arguments)]
    fn fine_tune(
        &self,
        tree: &mut TreeStore,
        state_ids: &[u64],
        node_flow_by_id: &HashMap<u64, f64>,
        physical_id_by_state: &HashMap<u64, u64>,
        links_by_id: &[(u64, u64, f64)],
        balance: Balance,
        owner_of_state: &HashMap<u64, u64>,
        coarse_initial: Option<&HashMap<u64, u32>>,
        rng: &mut EngineRng,
        modules: &mut Vec<TreeHandle>,
        owner_out: &mut HashMap<u64, u64>,
        codelength: &mut f64,
    ) -> bool {
        let initial: Vec<u32> = match coarse_initial {
            Some(refined) => state_ids.iter().map(|id| refined[id]).collect(),
            None => state_ids.iter().map(|id| owner_of_state[id] as u32).collect(),
        };
        let (result, idx_of) =
            self.partition_level(state_ids, node_flow_by_id, links_by_id, balance, Some(physical_id_by_state), Some(&initial), rng);
        let _ = idx_of;

        if result.codelength >= *codelength - self.config.min_codelength_improvement {
            return false;
        }

        let leaves = tree.leaves_under(tree.root());
        let ordered_leaves: Vec<TreeHandle> = state_ids.iter().map(|id| leaves[id]).collect();
        let new_modules = consolidate(tree, tree.root(), &ordered_leaves, &result.module_of);

        *owner_out = state_ids
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, u64::from(new_modules[result.module_of[i] as usize].raw())))
            .collect();
        *modules = new_modules;
        *codelength = result.codelength;
        true
    }

    /// Within each current top-level module, look for finer-grained
    /// sub-structure via a bounded sub-engine recursion and return a fresh
    /// module assignment over all leaves that `fine_tune` can warm-start
    /// from (§4.6 step 4). `coarse_tune_level` bounds how many nested levels
    /// the sub-engine is allowed to recurse; `alternate_coarse_tune_level`
    /// (read by the caller) makes this pass run every other tune iteration
    /// instead of every one.
    fn coarse_tune(
        &self,
        tree: &TreeStore,
        modules: &[TreeHandle],
        node_flow_by_id: &HashMap<u64, f64>,
        physical_id_by_state: &HashMap<u64, u64>,
        links_by_id: &[(u64, u64, f64)],
        balance: Balance,
        rng: &mut EngineRng,
    ) -> HashMap<u64, u32> {
        let mut refined: HashMap<u64, u32> = HashMap::new();
        let mut next_id = 0u32;
        let depth = self.config.coarse_tune_level.max(1);

        for &module in modules {
            let leaves = tree.leaves_under(module);
            let local_ids: Vec<u64> = leaves.keys().copied().collect();
            let mut child_rng = rng.child(u64::from(module.raw()));
            let nested = self.coarse_tune_module(&local_ids, node_flow_by_id, physical_id_by_state, links_by_id, balance, &mut child_rng, depth);
            let offset = nested.values().copied().max().map_or(0, |m| m + 1).max(1);
            for &id in &local_ids {
                refined.insert(id, next_id + nested[&id]);
            }
            next_id += offset;
        }

        refined
    }

    /// Recursive step of [`Self::coarse_tune`]: partition `leaf_ids` on
    /// their own, then recurse into whatever sub-modules that finds, up to
    /// `depth_remaining` nested levels. Module ids returned are local to
    /// this call's `leaf_ids` and start at zero.
    #[allow(clippy::too_many_arguments)]
    fn coarse_tune_module(
        &self,
        leaf_ids: &[u64],
        node_flow_by_id: &HashMap<u64, f64>,
        physical_id_by_state: &HashMap<u64, u64>,
        links_by_id: &[(u64, u64, f64)],
        balance: Balance,
        rng: &mut EngineRng,
        depth_remaining: usize,
    ) -> HashMap<u64, u32> {
        let mut owner: HashMap<u64, u32> = leaf_ids.iter().map(|&id| (id, 0u32)).collect();
        if leaf_ids.len() <= 1 || depth_remaining == 0 {
            return owner;
        }

        let (sub_result, _) = self.partition_level(leaf_ids, node_flow_by_id, links_by_id, balance, Some(physical_id_by_state), None, rng);
        if sub_result.num_modules <= 1 {
            return owner;
        }

        let mut groups: HashMap<u32, Vec<u64>> = HashMap::new();
        for (i, &id) in leaf_ids.iter().enumerate() {
            groups.entry(sub_result.module_of[i]).or_default().push(id);
        }

        let mut next_id = 0u32;
        for members in groups.into_values() {
            let mut child_rng = rng.child(members[0]);
            let nested =
                self.coarse_tune_module(&members, node_flow_by_id, physical_id_by_state, links_by_id, balance, &mut child_rng, depth_remaining - 1);
            let offset = nested.values().copied().max().map_or(0, |m| m + 1).max(1);
            for &id in &members {
                owner.insert(id, next_id + nested[&id]);
            }
            next_id += offset;
        }

        owner
    }

    /// Recurse into every module with more than two leaves, accepting the
    /// sub-structure when it is non-trivial and shortens the module's own
    /// (one-level) codelength (§4.6 step 7), bounded by `max_levels`.
    #[allow(clippy::too_many_arguments)]
    fn recurse_into_modules(
        &self,
        tree: &mut TreeStore,
        modules: &[TreeHandle],
        node_flow_by_id: &HashMap<u64, f64>,
        physical_id_by_state: &HashMap<u64, u64>,
        links_by_id: &[(u64, u64, f64)],
        balance: Balance,
        rng: &mut EngineRng,
        depth: usize,
    ) {
        if depth >= self.config.max_levels {
            return;
        }
        for &module in modules {
            let leaves = tree.leaves_under(module);
            if leaves.len() <= 2 {
                continue;
            }
            let state_ids: Vec<u64> = leaves.keys().copied().collect();
            let module_one_level: f64 = -state_ids.iter().map(|id| plogp(node_flow_by_id[id])).sum::<f64>();

            let mut child_rng = rng.child(u64::from(module.raw()) ^ (depth as u64));
            let (sub_result, _) =
                self.partition_level(&state_ids, node_flow_by_id, links_by_id, balance, Some(physical_id_by_state), None, &mut child_rng);

            if sub_result.num_modules <= 1 || sub_result.codelength >= module_one_level - self.config.min_codelength_improvement {
                continue;
            }

            let leaf_handles: Vec<TreeHandle> = state_ids.iter().map(|id| leaves[id]).collect();
            let sub_modules = consolidate(tree, module, &leaf_handles, &sub_result.module_of);
            self.recurse_into_modules(tree, &sub_modules, node_flow_by_id, physical_id_by_state, links_by_id, balance, &mut child_rng, depth + 1);
        }
    }
}
