//! Partitioner (C5): the greedy local-moving core loop and consolidation
//! into a new tree level.
//!
//! Move evaluation uses the symmetric (undirected) boundary-flow formula for
//! all three [`Balance`] variants; see `DESIGN.md` for why the directed,
//! non-detailed-balance specialization is treated as this same symmetric
//! approximation rather than the fully separate enter/exit bookkeeping
//! `InfomapGreedySpecialized.h` uses -- an explicitly recorded simplification,
//! not an oversight.

use crate::codelength::{plogp, Balance, CodelengthBook, DeltaFlow};
use crate::config::Config;
use crate::rng::EngineRng;
use crate::tree::{TreeHandle, TreeStore};
use std::collections::{BTreeMap, HashMap};

/// Flat description of the network a single partition pass operates over --
/// either the original leaves, or a coarser network of super-nodes built
/// from a previous level's modules (see [`crate::driver`]).
pub struct PartitionInput {
    pub node_flow: Vec<f64>,
    /// `neighbor_flow[i]` lists `(j, combined flow)` for every node `j`
    /// sharing a link with `i` in either direction, excluding self-links.
    pub neighbor_flow: Vec<Vec<(usize, f64)>>,
    pub balance: Balance,
    /// Physical node id of each node (index-aligned with `node_flow`), for
    /// the §4.4 memory/physical codelength correction. `None` when every
    /// node already owns a unique physical id -- the correction then
    /// collapses to the plain per-node `plogp` sum and tracking it
    /// per-module would be pure overhead.
    pub physical_id: Option<Vec<u64>>,
}

impl PartitionInput {
    /// Build from a flat list of directed `(source, target, flow)` links,
    /// merging both directions into one symmetric adjacency weight per pair.
    #[must_use]
    pub fn from_links(node_flow: Vec<f64>, links: impl IntoIterator<Item = (usize, usize, f64)>, balance: Balance) -> Self {
        let n = node_flow.len();
        let mut acc: Vec<HashMap<usize, f64>> = vec![HashMap::new(); n];
        for (a, b, f) in links {
            if a == b {
                continue;
            }
            *acc[a].entry(b).or_insert(0.0) += f;
            *acc[b].entry(a).or_insert(0.0) += f;
        }
        let neighbor_flow = acc.into_iter().map(IntoIterator::into_iter).map(Iterator::collect).collect();
        Self {
            node_flow,
            neighbor_flow,
            balance,
            physical_id: None,
        }
    }

    /// Attach physical node ids, index-aligned with `node_flow`, enabling
    /// the memory/physical codelength correction for this partition pass.
    #[must_use]
    pub fn with_physical_ids(mut self, ids: Vec<u64>) -> Self {
        self.physical_id = Some(ids);
        self
    }
}

/// Outcome of one `Partitioner::run` call.
#[derive(Clone, Debug)]
pub struct PartitionResult {
    pub module_of: Vec<u32>,
    pub codelength: f64,
    pub num_modules: usize,
}

pub struct Partitioner<'c> {
    config: &'c Config,
}

impl<'c> Partitioner<'c> {
    #[must_use]
    pub fn new(config: &'c Config) -> Self {
        Self { config }
    }

    /// Run the greedy core loop to convergence (or the loop limit), starting
    /// every node in its own module.
    pub fn run(&self, input: &PartitionInput, rng: &mut EngineRng) -> PartitionResult {
        self.run_from(input, None, rng)
    }

    /// Run the greedy core loop starting from `initial` (one module id per
    /// node) instead of singleton modules -- the warm start used by
    /// fine-tuning: the partitioner refines an existing modular assignment
    /// rather than rediscovering it from scratch.
    pub fn run_from(&self, input: &PartitionInput, initial: Option<&[u32]>, rng: &mut EngineRng) -> PartitionResult {
        let n = input.node_flow.len();
        if n == 0 {
            return PartitionResult {
                module_of: Vec::new(),
                codelength: 0.0,
                num_modules: 0,
            };
        }

        let total_incident: Vec<f64> = input
            .neighbor_flow
            .iter()
            .map(|nbrs| nbrs.iter().map(|&(_, f)| f).sum())
            .collect();

        let mut module_of: Vec<u32> = match initial {
            Some(ids) => ids.to_vec(),
            None => (0..u32::try_from(n).expect("too many nodes")).collect(),
        };
        let mut member_count: HashMap<u32, usize> = HashMap::new();
        for &m in &module_of {
            *member_count.entry(m).or_insert(0) += 1;
        }
        let mut next_module_id = module_of.iter().copied().max().map_or(0, |m| m + 1).max(u32::try_from(n).unwrap_or(u32::MAX));

        // Group initial per-module flow/exit: exit(m) = total incident flow
        // of m's members minus twice the flow internal to m (each internal
        // link's flow is otherwise double-counted, once per endpoint).
        let mut module_flow: HashMap<u32, f64> = HashMap::new();
        let mut module_exit: HashMap<u32, f64> = HashMap::new();
        for i in 0..n {
            let m = module_of[i];
            *module_flow.entry(m).or_insert(0.0) += input.node_flow[i];
            *module_exit.entry(m).or_insert(0.0) += total_incident[i];
        }
        for (i, nbrs) in input.neighbor_flow.iter().enumerate() {
            for &(j, f) in nbrs {
                if module_of[i] == module_of[j] {
                    *module_exit.get_mut(&module_of[i]).unwrap() -= f;
                }
            }
        }

        // Memory/physical codelength correction (§4.4): track
        // Σ_{v∈m, phys(v)=p} flow(v) per (module, physical id) pair so the
        // core loop can keep `node_flow_log_node_flow` exact as nodes move
        // between modules sharing a physical id, in O(1) per move. Collapses
        // to the plain per-node sum when no physical id is supplied.
        let mut module_physical_flow: HashMap<(u32, u64), f64> = HashMap::new();
        if let Some(physical) = &input.physical_id {
            for i in 0..n {
                *module_physical_flow.entry((module_of[i], physical[i])).or_insert(0.0) += input.node_flow[i];
            }
        }
        let node_flow_log_node_flow: f64 = match &input.physical_id {
            Some(_) => module_physical_flow.values().map(|&f| plogp(f)).sum(),
            None => input.node_flow.iter().map(|&f| plogp(f)).sum(),
        };

        let mut book = CodelengthBook::new(
            input.balance,
            module_flow.keys().map(|&m| {
                let exit = module_exit.get(&m).copied().unwrap_or(0.0).max(0.0);
                (m, module_flow[&m], exit, exit)
            }),
            node_flow_log_node_flow,
        );

        let mut dirty = vec![true; n];
        let mut pass = 0usize;

        loop {
            let mut order: Vec<usize> = (0..n).collect();
            rng.shuffle(&mut order);
            let mut moved_any = false;

            for &v in &order {
                if !dirty[v] {
                    continue;
                }
                dirty[v] = false;

                let a = module_of[v];
                let total = total_incident[v];
                let node_flow_v = input.node_flow[v];
                let phys_v = input.physical_id.as_ref().map(|p| p[v]);

                let mut weight_to_module: HashMap<u32, f64> = HashMap::new();
                for &(neighbor, flow) in &input.neighbor_flow[v] {
                    *weight_to_module.entry(module_of[neighbor]).or_insert(0.0) += flow;
                }
                let weight_to_a = weight_to_module.get(&a).copied().unwrap_or(0.0);

                let mut candidates: Vec<u32> = weight_to_module.keys().copied().filter(|&m| m != a).collect();
                if member_count.get(&a).copied().unwrap_or(0) > 1 {
                    candidates.push(next_module_id);
                }
                rng.shuffle(&mut candidates);

                let mut best_module = a;
                let mut best_delta = -self.config.min_codelength_improvement;

                for &b in &candidates {
                    let weight_to_b = weight_to_module.get(&b).copied().unwrap_or(0.0);
                    let mut delta = book.delta_codelength(
                        node_flow_v,
                        DeltaFlow {
                            module: a,
                            delta_exit: 2.0 * weight_to_a - total,
                            delta_enter: 2.0 * weight_to_a - total,
                        },
                        DeltaFlow {
                            module: b,
                            delta_exit: total - 2.0 * weight_to_b,
                            delta_enter: total - 2.0 * weight_to_b,
                        },
                    );
                    if let Some(phys) = phys_v {
                        delta -= physical_correction_delta(&module_physical_flow, a, b, phys, node_flow_v);
                    }
                    if delta < best_delta {
                        best_delta = delta;
                        best_module = b;
                    }
                }

                if best_module != a {
                    let weight_to_best = weight_to_module.get(&best_module).copied().unwrap_or(0.0);
                    book.apply(
                        node_flow_v,
                        DeltaFlow {
                            module: a,
                            delta_exit: 2.0 * weight_to_a - total,
                            delta_enter: 2.0 * weight_to_a - total,
                        },
                        DeltaFlow {
                            module: best_module,
                            delta_exit: total - 2.0 * weight_to_best,
                            delta_enter: total - 2.0 * weight_to_best,
                        },
                    );

                    if let Some(phys) = phys_v {
                        let correction = physical_correction_delta(&module_physical_flow, a, best_module, phys, node_flow_v);
                        *module_physical_flow.entry((a, phys)).or_insert(0.0) -= node_flow_v;
                        *module_physical_flow.entry((best_module, phys)).or_insert(0.0) += node_flow_v;
                        book.set_node_flow_log_node_flow(book.node_flow_log_node_flow() + correction);
                    }

                    *member_count.entry(a).or_insert(1) -= 1;
                    *member_count.entry(best_module).or_insert(0) += 1;
                    if best_module == next_module_id {
                        next_module_id += 1;
                    }
                    module_of[v] = best_module;
                    moved_any = true;
                    dirty[v] = true;
                    for &(neighbor, _) in &input.neighbor_flow[v] {
                        dirty[neighbor] = true;
                    }
                }
            }

            pass += 1;
            if !moved_any {
                break;
            }
            if self.config.core_loop_limit > 0 && pass >= self.config.core_loop_limit {
                break;
            }
        }

        let num_modules = member_count.values().filter(|&&c| c > 0).count();
        tracing::trace!(pass, num_modules, codelength = book.codelength(), "core loop converged");

        // Renumber module ids to a contiguous 0..num_modules range, in order
        // of first appearance, so downstream consolidation doesn't need to
        // know about the (possibly sparse) ids the core loop happened to use.
        let mut remap: HashMap<u32, u32> = HashMap::new();
        let mut next_id = 0u32;
        let module_of: Vec<u32> = module_of
            .into_iter()
            .map(|m| {
                *remap.entry(m).or_insert_with(|| {
                    let id = next_id;
                    next_id += 1;
                    id
                })
            })
            .collect();

        PartitionResult {
            module_of,
            codelength: book.codelength(),
            num_modules,
        }
    }
}

/// Change in `node_flow_log_node_flow` from moving `node_flow` of physical
/// id `phys` out of `from_module` and into `to_module`: only those two
/// `(module, phys)` buckets are affected by the move.
fn physical_correction_delta(
    module_physical_flow: &HashMap<(u32, u64), f64>,
    from_module: u32,
    to_module: u32,
    phys: u64,
    node_flow: f64,
) -> f64 {
    let old_from = module_physical_flow.get(&(from_module, phys)).copied().unwrap_or(0.0);
    let old_to = module_physical_flow.get(&(to_module, phys)).copied().unwrap_or(0.0);
    let new_from = old_from - node_flow;
    let new_to = old_to + node_flow;
    (plogp(new_from) + plogp(new_to)) - (plogp(old_from) + plogp(old_to))
}

/// Materialize a [`PartitionResult`] as a new tree level: group `leaves` by
/// module id and create one module node per non-empty group under `parent`.
/// Returns the new module handles in ascending module-id order (determinism
/// for the invariant-1 leaf-partition check).
pub fn consolidate(tree: &mut TreeStore, parent: TreeHandle, leaves: &[TreeHandle], module_of: &[u32]) -> Vec<TreeHandle> {
    let mut groups: BTreeMap<u32, Vec<TreeHandle>> = BTreeMap::new();
    for (leaf, &module) in leaves.iter().zip(module_of) {
        groups.entry(module).or_default().push(*leaf);
    }
    let modules: Vec<TreeHandle> = groups.into_values().map(|children| tree.new_module(parent, children)).collect();
    tree.get_mut(parent).children = modules.clone();
    modules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;

    #[test]
    fn two_disjoint_cliques_are_separated() {
        let config = ConfigBuilder::default().seed_to_rng(42).build().unwrap();
        let node_flow = vec![0.125; 8];
        let mut links = Vec::new();
        for &(a, b) in &[(0, 1), (1, 2), (2, 3), (3, 0), (0, 2), (1, 3)] {
            links.push((a, b, 0.05));
        }
        for &(a, b) in &[(4, 5), (5, 6), (6, 7), (7, 4), (4, 6), (5, 7)] {
            links.push((a, b, 0.05));
        }
        links.push((0, 4, 0.001));

        let input = PartitionInput::from_links(node_flow, links, Balance::Undirected);
        let mut rng = config.root_rng();
        let result = Partitioner::new(&config).run(&input, &mut rng);

        assert_eq!(result.module_of[0], result.module_of[1]);
        assert_eq!(result.module_of[1], result.module_of[2]);
        assert_eq!(result.module_of[2], result.module_of[3]);
        assert_eq!(result.module_of[4], result.module_of[5]);
        assert_ne!(result.module_of[0], result.module_of[4]);
    }

    #[test]
    fn isolated_node_stays_in_its_own_module() {
        let config = Config::default();
        let node_flow = vec![0.9, 0.1];
        let input = PartitionInput::from_links(node_flow, std::iter::empty(), Balance::Undirected);
        let mut rng = config.root_rng();
        let result = Partitioner::new(&config).run(&input, &mut rng);
        assert_ne!(result.module_of[0], result.module_of[1]);
    }

    /// Two state nodes sharing a physical id, both placed in the same
    /// module, should have their flow merged into one `plogp` bucket for
    /// the correction term rather than summed as two separate node terms.
    #[test]
    fn physical_correction_merges_shared_physical_flow_within_a_module() {
        // Pin the assignment by making any move prohibitively costly, so the
        // result reflects exactly the `initial` grouping we hand in.
        let config = ConfigBuilder::default().min_codelength_improvement(1e6).build().unwrap();
        let node_flow = vec![0.3, 0.3, 0.4];
        let input = PartitionInput::from_links(node_flow, std::iter::empty(), Balance::Undirected).with_physical_ids(vec![1, 1, 2]);
        let mut rng = config.root_rng();
        let initial = [0u32, 0, 1];
        let result = Partitioner::new(&config).run_from(&input, Some(&initial), &mut rng);

        assert_eq!(result.module_of, vec![0, 0, 1]);

        // No links, so enter/exit are all zero and flow_log_flow is the only
        // module term: plogp(0.6) for the merged module, plogp(0.4) for the
        // other.
        let flow_log_flow = plogp(0.6) + plogp(0.4);
        let merged_correction = plogp(0.6) + plogp(0.4);
        let expected = flow_log_flow - merged_correction;
        assert!((result.codelength - expected).abs() < 1e-9);

        let naive_correction = plogp(0.3) + plogp(0.3) + plogp(0.4);
        assert!((merged_correction - naive_correction).abs() > 1e-6, "merging should actually change the correction term");
    }
}
