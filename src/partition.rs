//! Partitioner state shared by every strategy, the two generic local-search
//! passes and the strategy table.

use std::collections::BTreeSet;

use itertools::Itertools;
use log::{debug, info};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
	config::Config,
	grid::Coord,
	hypergraph::{HyperGraph, UNASSIGNED},
	util::{sorted_keys, HashM},
	weights::{self, Weights},
	Error, Result,
};

pub mod exact;
pub mod fm;
pub mod multilevel;

pub(crate) const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionStrategy {
	/// Single-level 2-way FM.
	Fm,
	/// Coarsen, partition the coarsest level, refine while projecting back.
	MultiLevel,
	/// Exact solve onto a grid of at most 2x2 islands.
	Exact,
}

/// Partitioner for the coarsest level of the multi-level flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitialStrategy {
	/// FM for two blocks, greedy placement plus refinement passes otherwise.
	Fm,
	/// Exact grid solve with one block per island.
	Exact,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionResult {
	/// Block (or island index) of every node.
	pub part: Vec<usize>,
	pub cut_size: f64,
	pub block_sizes: Vec<Weights>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub coords: Vec<Coord>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub objective: Option<f64>,
}

type PartitionFn = fn(&HyperGraph, &HashM<usize, usize>, &Config) -> Result<PartitionResult>;

const STRATEGIES: &[(PartitionStrategy, &str, PartitionFn)] = &[
	(PartitionStrategy::Fm, "FM", fm::partition),
	(PartitionStrategy::MultiLevel, "multi-level", multilevel::partition),
	(PartitionStrategy::Exact, "exact grid", exact::partition),
];

/// Partitions `graph` with the strategy selected in `config`. `fixed_nodes`
/// maps node ids to their mandatory block (island index for the exact strategy).
pub fn partition(
	graph: &HyperGraph,
	fixed_nodes: &HashM<usize, usize>,
	config: &Config,
) -> Result<PartitionResult> {
	let (_, name, func) = STRATEGIES
		.iter()
		.find(|(strategy, _, _)| *strategy == config.partition.strategy)
		.copied()
		.unwrap_or(STRATEGIES[1]);
	info!(
		"Start {name} partitioning of {} nodes and {} edges",
		graph.node_num(),
		graph.edge_num()
	);
	let result = func(graph, fixed_nodes, config)?;
	info!("Complete {name} partitioning: cut size {:.3}", result.cut_size);
	Ok(result)
}

/// Balance and fixed-node bookkeeping plus incremental cut tracking.
#[derive(Debug, Clone)]
pub struct LocalSearchPartitioner<'g> {
	graph: &'g HyperGraph,
	block_num: usize,
	rng: StdRng,
	verbose: bool,

	upper_bound: Weights,
	lower_bound: Weights,
	fixed_nodes: HashM<usize, usize>,

	node2block: Vec<usize>,
	block_sizes: Vec<Weights>,
	cut_size: f64,
}

impl<'g> LocalSearchPartitioner<'g> {
	pub fn new(
		graph: &'g HyperGraph,
		block_num: usize,
		imbalance_factors: &[f64],
		seed: u64,
	) -> Result<Self> {
		let dim = graph.node_weight_dim();
		let factors = match imbalance_factors.len() {
			1 => vec![imbalance_factors[0]; dim],
			n if n == dim => imbalance_factors.to_vec(),
			n => {
				return Err(Error::InvalidConfig(format!(
					"{n} imbalance factors for {dim} node weight dimensions"
				)))
			},
		};
		let total = graph.total_node_weight();
		let even = 1.0 / block_num as f64;
		let upper_bound = total
			.iter()
			.zip(&factors)
			.map(|(t, f)| t * (even + f))
			.collect_vec();
		let lower_bound = total
			.iter()
			.zip(&factors)
			.map(|(t, f)| (t * (even - f)).max(0.0))
			.collect_vec();
		debug!("Block size bounds: lower {lower_bound:?} upper {upper_bound:?}");

		Ok(Self {
			graph,
			block_num,
			rng: StdRng::seed_from_u64(seed),
			verbose: false,
			upper_bound,
			lower_bound,
			fixed_nodes: HashM::default(),
			node2block: vec![UNASSIGNED; graph.node_num()],
			block_sizes: vec![weights::zeros(dim); block_num],
			cut_size: 0.0,
		})
	}

	pub fn with_fixed_nodes(mut self, fixed_nodes: HashM<usize, usize>) -> Result<Self> {
		for node in sorted_keys(&fixed_nodes) {
			let block = fixed_nodes[&node];
			if node >= self.graph.node_num() || block >= self.block_num {
				return Err(Error::InvalidConfig(format!(
					"fixed node-{node} -> block-{block} is out of range"
				)));
			}
		}
		self.fixed_nodes = fixed_nodes;
		Ok(self)
	}

	pub fn with_verbose(mut self, verbose: bool) -> Self {
		self.verbose = verbose;
		self
	}

	pub fn graph(&self) -> &'g HyperGraph {
		self.graph
	}

	pub fn block_num(&self) -> usize {
		self.block_num
	}

	pub fn node2block(&self) -> &[usize] {
		&self.node2block
	}

	pub fn block_sizes(&self) -> &[Weights] {
		&self.block_sizes
	}

	pub fn cut_size(&self) -> f64 {
		self.cut_size
	}

	pub fn upper_bound(&self) -> &[f64] {
		&self.upper_bound
	}

	pub fn lower_bound(&self) -> &[f64] {
		&self.lower_bound
	}

	pub fn fixed_nodes(&self) -> &HashM<usize, usize> {
		&self.fixed_nodes
	}

	fn reset(&mut self) {
		self.node2block = vec![UNASSIGNED; self.graph.node_num()];
		self.block_sizes = vec![weights::zeros(self.graph.node_weight_dim()); self.block_num];
		self.cut_size = 0.0;
	}

	/// Replaces the whole assignment and recomputes sizes and cut from scratch.
	pub fn set_part_result(&mut self, part: &[usize]) {
		assert_eq!(part.len(), self.graph.node_num());
		self.reset();
		for (node, &block) in part.iter().enumerate() {
			assert!(block < self.block_num, "Node-{node} has invalid block {block}");
			weights::accu(&mut self.block_sizes[block], self.graph.weights_of_node(node));
		}
		self.node2block = part.to_vec();
		self.cut_size = self.graph.edge_weights_sum(&self.graph.cut_size(part));
	}

	/// Moves `node` and updates block sizes and the cut from the cut of the
	/// node's edges before and after. `node` may be unassigned.
	pub fn move_node(&mut self, node: usize, block: usize) {
		let from = self.node2block[node];
		if from == block {
			return;
		}
		let graph = self.graph;
		let before = graph.edge_weights_sum(&graph.cut_size_of_node(&self.node2block, node));
		if from != UNASSIGNED {
			weights::dec(&mut self.block_sizes[from], graph.weights_of_node(node));
		}
		weights::accu(&mut self.block_sizes[block], graph.weights_of_node(node));
		self.node2block[node] = block;
		let after = graph.edge_weights_sum(&graph.cut_size_of_node(&self.node2block, node));
		self.cut_size += after - before;
		if self.verbose {
			debug!("Move node-{node} {from} -> {block}: cut {:.3}", self.cut_size);
		}
	}

	fn fits(&self, size: &[f64]) -> bool {
		size.iter()
			.zip(&self.upper_bound)
			.all(|(s, u)| *s <= u + EPS)
	}

	pub fn is_move_legal(&self, node: usize, block: usize) -> bool {
		if let Some(&fixed) = self.fixed_nodes.get(&node) {
			if fixed != block {
				return false;
			}
		}
		if self.node2block[node] == block {
			return true;
		}
		self.fits(&weights::add(
			&self.block_sizes[block],
			self.graph.weights_of_node(node),
		))
	}

	/// Legality of moving every node in `nodes` into `block` at once.
	pub fn is_group_move_legal(&self, nodes: &[usize], block: usize) -> bool {
		let mut size = self.block_sizes[block].clone();
		for &node in nodes {
			if self.fixed_nodes.get(&node).is_some_and(|b| *b != block) {
				return false;
			}
			if self.node2block[node] != block {
				weights::accu(&mut size, self.graph.weights_of_node(node));
			}
		}
		self.fits(&size)
	}

	fn is_cut_after_group_move(&self, edge: usize, nodes: &[usize], block: usize) -> bool {
		let mut first = UNASSIGNED;
		for &node in self.graph.nodes_of_edge(edge) {
			let b = if nodes.contains(&node) {
				block
			} else {
				self.node2block[node]
			};
			if b == UNASSIGNED {
				continue;
			}
			if first == UNASSIGNED {
				first = b;
			} else if first != b {
				return true;
			}
		}
		false
	}

	/// Cut decrease of moving every node in `nodes` into `block`, computed by a
	/// trial evaluation of the touched edges. The state is not modified.
	pub fn group_move_gain(&self, nodes: &[usize], block: usize) -> f64 {
		let edges = nodes
			.iter()
			.flat_map(|n| self.graph.edges_of_node(*n).iter().copied())
			.collect::<BTreeSet<_>>();
		let mut gain = 0.0;
		for edge in edges {
			let before = self.graph.is_cut_edge(edge, &self.node2block);
			let after = self.is_cut_after_group_move(edge, nodes, block);
			match (before, after) {
				(true, false) => gain += self.graph.edge_weight(edge),
				(false, true) => gain -= self.graph.edge_weight(edge),
				_ => {},
			}
		}
		gain
	}

	pub fn move_gain(&self, node: usize, block: usize) -> f64 {
		self.group_move_gain(&[node], block)
	}

	/// Greedy placement: fixed nodes first, then extremely large nodes, then
	/// the rest in seeded random order. Each node goes to the legal block with
	/// the smallest cut increase; ties go to the lowest block id.
	pub fn initial_partition(&mut self, extreme_large_ratio: f64) -> Result<()> {
		self.reset();
		for node in sorted_keys(&self.fixed_nodes) {
			let block = self.fixed_nodes[&node];
			self.move_node(node, block);
		}
		if !self.check_size_constraint() {
			return Err(Error::FixedNodesViolateBalance);
		}

		let graph = self.graph;
		let threshold = graph.node_weights_sum(&graph.total_node_weight()) * extreme_large_ratio;
		let (large, mut rest): (Vec<usize>, Vec<usize>) = (0..graph.node_num())
			.filter(|n| !self.fixed_nodes.contains_key(n))
			.partition(|n| graph.node_weight(*n) > threshold);
		let large = large
			.into_iter()
			.sorted_by(|a, b| graph.node_weight(*b).total_cmp(&graph.node_weight(*a)))
			.collect_vec();
		rest.shuffle(&mut self.rng);

		for node in large.into_iter().chain(rest) {
			let mut best: Option<(usize, f64)> = None;
			for block in 0..self.block_num {
				if !self.is_move_legal(node, block) {
					continue;
				}
				let increase = -self.move_gain(node, block);
				if best.map_or(true, |(_, inc)| increase < inc - EPS) {
					best = Some((block, increase));
				}
			}
			match best {
				Some((block, _)) => self.move_node(node, block),
				None => return Err(Error::NoLegalBlock(node)),
			}
		}
		info!(
			"Initial partition: cut size {:.3}, block sizes {:?}",
			self.cut_size, self.block_sizes
		);
		Ok(())
	}

	pub fn check_size_constraint(&self) -> bool {
		self.block_sizes.iter().all(|size| self.fits(size))
	}

	pub fn check_fixed_nodes_constraint(&self) -> bool {
		self.fixed_nodes
			.iter()
			.all(|(node, block)| self.node2block[*node] == *block)
	}

	/// Recomputes block sizes and cut from the assignment and compares them
	/// with the incrementally maintained values.
	pub fn check_partition_states(&self) -> bool {
		let mut sizes = vec![weights::zeros(self.graph.node_weight_dim()); self.block_num];
		for (node, &block) in self.node2block.iter().enumerate() {
			if block != UNASSIGNED {
				weights::accu(&mut sizes[block], self.graph.weights_of_node(node));
			}
		}
		let sizes_ok = sizes.iter().zip(&self.block_sizes).all(|(a, b)| {
			a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-6)
		});
		let cut = self
			.graph
			.edge_weights_sum(&self.graph.cut_size(&self.node2block));
		sizes_ok && (cut - self.cut_size).abs() < 1e-6
	}

	pub fn result(&self) -> PartitionResult {
		PartitionResult {
			part: self.node2block.clone(),
			cut_size: self.cut_size,
			block_sizes: self.block_sizes.clone(),
			coords: vec![],
			objective: None,
		}
	}
}

/// Hill-climbing passes over a [`LocalSearchPartitioner`]. Every move goes
/// through [`LocalSearch::move_node`], so an implementor that keeps its own
/// incremental bookkeeping sees each move exactly once.
pub trait LocalSearch<'g> {
	fn base(&self) -> &LocalSearchPartitioner<'g>;
	fn base_mut(&mut self) -> &mut LocalSearchPartitioner<'g>;

	fn move_node(&mut self, node: usize, block: usize) {
		self.base_mut().move_node(node, block);
	}

	/// Visits cut edges in random order and pulls all nodes of an edge into the
	/// legal block with the best strictly positive gain. Returns the total gain.
	fn edge_based_refinement(&mut self) -> f64 {
		let graph = self.base().graph;
		let mut edges = (0..graph.edge_num())
			.filter(|e| graph.is_cut_edge(*e, &self.base().node2block))
			.collect_vec();
		edges.shuffle(&mut self.base_mut().rng);

		let mut total = 0.0;
		for edge in edges {
			let base = self.base();
			if !graph.is_cut_edge(edge, &base.node2block) {
				continue;
			}
			let nodes = graph.nodes_of_edge(edge);
			let mut best: Option<(usize, f64)> = None;
			for block in 0..base.block_num {
				if !base.is_group_move_legal(nodes, block) {
					continue;
				}
				let gain = base.group_move_gain(nodes, block);
				if gain > EPS && best.map_or(true, |(_, g)| gain > g) {
					best = Some((block, gain));
				}
			}
			if let Some((block, gain)) = best {
				for &node in nodes {
					self.move_node(node, block);
				}
				total += gain;
			}
		}
		debug!("Edge-based refinement gain {total:.3}");
		total
	}

	/// Sweeps of best-single-move hill climbing. Gains are recomputed per move, not cached.
	/// Each node moves at most once per sweep; stops after a sweep without gain.
	fn vertex_based_refinement(&mut self) -> f64 {
		let graph = self.base().graph;
		let block_num = self.base().block_num;
		let mut total = 0.0;
		loop {
			let mut sweep_gain = 0.0;
			let mut moved = vec![false; graph.node_num()];
			let mut candidates = (0..graph.edge_num())
				.filter(|e| graph.is_cut_edge(*e, &self.base().node2block))
				.flat_map(|e| graph.nodes_of_edge(e).iter().copied())
				.collect::<BTreeSet<_>>();
			loop {
				let base = self.base();
				let mut best: Option<(usize, usize, f64)> = None;
				for &node in &candidates {
					if moved[node] {
						continue;
					}
					for block in 0..block_num {
						if block == base.node2block[node] || !base.is_move_legal(node, block) {
							continue;
						}
						let gain = base.move_gain(node, block);
						if gain > EPS && best.map_or(true, |(_, _, g)| gain > g) {
							best = Some((node, block, gain));
						}
					}
				}
				let Some((node, block, gain)) = best else {
					break;
				};
				self.move_node(node, block);
				moved[node] = true;
				sweep_gain += gain;
				for layer in graph.k_distance_nodes(node, 1) {
					candidates.extend(layer);
				}
			}
			total += sweep_gain;
			if sweep_gain <= EPS {
				break;
			}
		}
		debug!("Vertex-based refinement gain {total:.3}");
		total
	}
}

impl<'g> LocalSearch<'g> for LocalSearchPartitioner<'g> {
	fn base(&self) -> &LocalSearchPartitioner<'g> {
		self
	}

	fn base_mut(&mut self) -> &mut LocalSearchPartitioner<'g> {
		self
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::util::fixed_map;
	use float_cmp::assert_approx_eq;

	/// Two triangles {0,1,2} and {3,4,5} bridged by edge {2,3}.
	fn two_triangles() -> HyperGraph {
		let mut g = HyperGraph::new(1, 1);
		for _ in 0..6 {
			g.add_node(vec![1.0]);
		}
		for (a, b) in [(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5), (2, 3)] {
			g.add_edge([a, b], vec![1.0]);
		}
		g
	}

	#[test]
	fn bounds() {
		let g = two_triangles();
		let p = LocalSearchPartitioner::new(&g, 2, &[0.1], 0).unwrap();
		assert_approx_eq!(f64, p.upper_bound()[0], 3.6);
		assert_approx_eq!(f64, p.lower_bound()[0], 2.4);
		assert!(matches!(
			LocalSearchPartitioner::new(&g, 2, &[0.1, 0.2], 0),
			Err(Error::InvalidConfig(_))
		));
	}

	#[test]
	fn incremental_cut() {
		let g = two_triangles();
		let mut p = LocalSearchPartitioner::new(&g, 2, &[0.5], 0).unwrap();
		p.set_part_result(&[0, 0, 0, 1, 1, 1]);
		assert_approx_eq!(f64, p.cut_size(), 1.0);
		assert_approx_eq!(f64, p.move_gain(2, 1), -1.0);
		p.move_node(2, 1);
		assert_approx_eq!(f64, p.cut_size(), 2.0);
		assert!(p.check_partition_states());
		assert_approx_eq!(f64, p.group_move_gain(&[0, 1], 1), 2.0);
	}

	#[test]
	fn legality() {
		let g = two_triangles();
		let mut p = LocalSearchPartitioner::new(&g, 2, &[0.0], 0)
			.unwrap()
			.with_fixed_nodes(fixed_map([(0, 0)]))
			.unwrap();
		p.set_part_result(&[0, 0, 0, 1, 1, 1]);
		assert!(!p.is_move_legal(0, 1));
		assert!(!p.is_move_legal(3, 0));
		p.move_node(1, 1);
		assert!(p.is_move_legal(3, 0));
		assert!(!p.is_group_move_legal(&[0, 4], 1));
		assert!(p.check_fixed_nodes_constraint());
		assert!(!p.check_size_constraint());
	}

	#[test]
	fn fixed_nodes_out_of_range() {
		let g = two_triangles();
		let p = LocalSearchPartitioner::new(&g, 2, &[0.0], 0).unwrap();
		assert!(p.with_fixed_nodes(fixed_map([(1, 2)])).is_err());
	}

	#[test]
	fn initial_partition_is_legal() {
		let g = two_triangles();
		let mut p = LocalSearchPartitioner::new(&g, 2, &[0.0], 4)
			.unwrap()
			.with_fixed_nodes(fixed_map([(5, 0)]))
			.unwrap();
		p.initial_partition(1.0).unwrap();
		assert!(p.node2block().iter().all(|b| *b < 2));
		assert!(p.check_size_constraint());
		assert!(p.check_fixed_nodes_constraint());
		assert!(p.check_partition_states());
	}

	#[test]
	fn fixed_nodes_can_break_balance() {
		let g = two_triangles();
		let mut p = LocalSearchPartitioner::new(&g, 2, &[0.0], 0)
			.unwrap()
			.with_fixed_nodes(fixed_map([(0, 1), (1, 1), (2, 1), (3, 1)]))
			.unwrap();
		assert!(matches!(
			p.initial_partition(0.1),
			Err(Error::FixedNodesViolateBalance)
		));
	}

	#[test]
	fn no_legal_block() {
		let mut g = two_triangles();
		g.set_node_weights(5, vec![10.0]);
		let mut p = LocalSearchPartitioner::new(&g, 2, &[0.0], 0).unwrap();
		assert!(matches!(
			p.initial_partition(1.0),
			Err(Error::NoLegalBlock(5))
		));
	}

	#[test]
	fn generic_passes_reach_the_bridge_cut() {
		let g = two_triangles();
		let mut p = LocalSearchPartitioner::new(&g, 2, &[0.2], 1).unwrap();
		p.set_part_result(&[0, 1, 0, 1, 0, 1]);
		let start = p.cut_size();
		let gain = p.edge_based_refinement() + p.vertex_based_refinement();
		assert!(p.check_partition_states());
		assert!(p.check_size_constraint());
		assert_approx_eq!(f64, start - gain, p.cut_size());
		assert!(p.cut_size() < start);
	}

	#[test]
	fn vertex_pass_with_slack() {
		let g = two_triangles();
		let mut p = LocalSearchPartitioner::new(&g, 2, &[0.2], 1).unwrap();
		p.set_part_result(&[0, 0, 1, 1, 1, 0]);
		p.vertex_based_refinement();
		assert_approx_eq!(f64, p.cut_size(), 1.0);
		assert!(p.check_partition_states());
	}
}
