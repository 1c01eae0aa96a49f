use log::{debug, info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{
	exact::{self, ExactGridPartitioner},
	fm::FmBipartitioner,
	InitialStrategy, LocalSearch, LocalSearchPartitioner, PartitionResult, EPS,
};
use crate::{
	coarsen::coarsen,
	config::Config,
	grid::GridDim,
	hier_graph::{HierarchicalHyperGraph, Hierarchy},
	hypergraph::HyperGraph,
	util::{HashM, HashS},
	Error, Result,
};

/// Coarsen, partition the coarsest level, then project back level by level
/// with a bounded refinement at each step.
///
/// Two blocks use FM throughout. More blocks use the greedy initial partition
/// and the generic edge/vertex passes of [`LocalSearch`]. With
/// [`InitialStrategy::Exact`] the coarsest level is placed on the grid by
/// [`ExactGridPartitioner`], one block per island.
pub struct MultiLevelPartitioner<'a> {
	graph: &'a HyperGraph,
	fixed_nodes: &'a HashM<usize, usize>,
	config: &'a Config,
}

impl<'a> MultiLevelPartitioner<'a> {
	pub fn new(
		graph: &'a HyperGraph,
		fixed_nodes: &'a HashM<usize, usize>,
		config: &'a Config,
	) -> Self {
		Self {
			graph,
			fixed_nodes,
			config,
		}
	}

	/// Coarsens until the coarsest level has at most `stop_node_num` nodes.
	/// Fixed nodes are kept as singletons on every level.
	pub fn build_hierarchy(&self, seed: u64) -> Result<Hierarchy> {
		let root = HierarchicalHyperGraph::root(self.graph.clone())
			.with_fixed_nodes(self.fixed_nodes.clone());
		let mut hierarchy = Hierarchy::new(root);
		let mut level_seed = seed;
		while hierarchy.coarsest().node_num() > self.config.coarsen.stop_node_num {
			let coarsest = hierarchy.coarsest();
			let dont_touch: HashS<usize> = coarsest.fixed_nodes().keys().copied().collect();
			let next = coarsen(coarsest, &dont_touch, &self.config.coarsen, level_seed)?;
			level_seed += 1;
			if next.node_num() >= coarsest.node_num() {
				warn!(
					"Coarsening stalled at level-{} with {} nodes",
					coarsest.hierarchical_level(),
					coarsest.node_num()
				);
				break;
			}
			hierarchy.push(next);
		}
		info!(
			"Coarsening built {} levels, coarsest has {} nodes and {} edges",
			hierarchy.len(),
			hierarchy.coarsest().node_num(),
			hierarchy.coarsest().edge_num()
		);
		Ok(hierarchy)
	}

	fn partitioner<'g>(
		&self,
		level: &'g HierarchicalHyperGraph,
		seed: u64,
	) -> Result<LocalSearchPartitioner<'g>> {
		let p = &self.config.partition;
		Ok(
			LocalSearchPartitioner::new(level.graph(), p.block_num, &p.imbalance_factors, seed)?
				.with_fixed_nodes(level.fixed_nodes().clone())?
				.with_verbose(p.verbose),
		)
	}

	fn grid(&self) -> GridDim {
		let [x, y] = self.config.exact.grid;
		GridDim::new(x, y)
	}

	fn exact_initial_partition(&self, level: &HierarchicalHyperGraph) -> Result<PartitionResult> {
		let dim = self.grid();
		let p = &self.config.partition;
		if p.block_num != dim.island_num() {
			return Err(Error::InvalidConfig(format!(
				"exact initial partitioning needs block_num == {}, got {}",
				dim.island_num(),
				p.block_num
			)));
		}
		let graph = level.graph();
		let fixed = exact::fixed_coords(level.fixed_nodes(), dim)?;
		let mut solver = ExactGridPartitioner::from_imbalance(graph, dim, &p.imbalance_factors)?
			.with_fixed_nodes(fixed)?
			.with_decision_limit(self.config.exact.decision_limit);
		if let Some(hint) = exact::heuristic_hint(graph, level.fixed_nodes(), dim, self.config) {
			solver = solver.with_hint(hint);
		}
		solver.solve()
	}

	fn initial_partition(
		&self,
		level: &HierarchicalHyperGraph,
		seed: u64,
	) -> Result<PartitionResult> {
		if self.config.partition.initial == InitialStrategy::Exact {
			return self.exact_initial_partition(level);
		}
		let mut base = self.partitioner(level, seed)?;
		if base.block_num() == 2 {
			let mut fm = FmBipartitioner::new(base, &self.config.refine)?;
			fm.initial_partition()?;
			fm.refine();
			return Ok(fm.base().result());
		}
		base.initial_partition(self.config.refine.extreme_large_ratio)?;
		base.edge_based_refinement();
		base.vertex_based_refinement();
		Ok(base.result())
	}

	fn refine(
		&self,
		level: &HierarchicalHyperGraph,
		part: &[usize],
		seed: u64,
	) -> Result<PartitionResult> {
		let refine = &self.config.refine;
		let mut base = self.partitioner(level, seed)?;
		if base.block_num() == 2 {
			let mut fm = FmBipartitioner::new(base, refine)?.bounded(refine);
			fm.set_part_result(part);
			if refine.edge_refinement {
				fm.edge_based_refinement();
			}
			fm.refine();
			return Ok(fm.base().result());
		}
		base.set_part_result(part);
		if refine.edge_refinement {
			base.edge_based_refinement();
		}
		base.vertex_based_refinement();
		Ok(base.result())
	}

	/// One complete coarsen / partition / uncoarsen cycle.
	pub fn run_once(&self, seed: u64) -> Result<PartitionResult> {
		let hierarchy = self.build_hierarchy(seed)?;
		let mut result = self.initial_partition(hierarchy.coarsest(), seed)?;
		for level in (1..hierarchy.len()).rev() {
			let part = hierarchy.level(level).part_result_of_parent(&result.part)?;
			result = self.refine(hierarchy.level(level - 1), &part, seed + level as u64)?;
			debug!(
				"Refined level-{}: cut size {:.3}",
				level - 1,
				result.cut_size
			);
		}
		if self.config.partition.initial == InitialStrategy::Exact {
			let dim = self.grid();
			result.coords = result.part.iter().map(|b| dim.coord_of(*b)).collect();
		}
		Ok(result)
	}

	/// Runs `start_num` seeded cycles and keeps the one with the lowest cut.
	/// The first cycle uses the configured seed.
	pub fn run(&self) -> Result<PartitionResult> {
		let p = &self.config.partition;
		let mut rng = StdRng::seed_from_u64(p.seed);
		let mut best: Option<PartitionResult> = None;
		for start in 0..p.start_num {
			let seed = if start == 0 { p.seed } else { rng.random() };
			let result = self.run_once(seed)?;
			debug!("Start-{start} (seed {seed}): cut size {:.3}", result.cut_size);
			if best
				.as_ref()
				.map_or(true, |b| result.cut_size < b.cut_size - EPS)
			{
				best = Some(result);
			}
		}
		best.ok_or_else(|| Error::InvalidConfig("start_num must be at least 1".to_owned()))
	}
}

pub(crate) fn partition(
	graph: &HyperGraph,
	fixed_nodes: &HashM<usize, usize>,
	config: &Config,
) -> Result<PartitionResult> {
	MultiLevelPartitioner::new(graph, fixed_nodes, config).run()
}
