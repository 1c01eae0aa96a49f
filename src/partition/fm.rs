//! Fiduccia-Mattheyses 2-way partitioning.
//!
//! Gains are kept in an explicit table and updated incrementally on every
//! move, touching only nodes that share an edge with the moved node. The
//! table is exact for every node at all times, so moves made by the generic
//! edge-based pass and pass rollbacks go through the same update.

use std::{cmp::Reverse, collections::BTreeSet};

use log::{debug, info};
use ordered_float::OrderedFloat;

use super::{LocalSearch, LocalSearchPartitioner, PartitionResult, EPS};
use crate::{
	config::{Config, ConfigRefine},
	hypergraph::{HyperGraph, UNASSIGNED},
	util::HashM,
	weights, Error, Result,
};

type GainKey = (Reverse<OrderedFloat<f64>>, usize);

pub struct FmBipartitioner<'g> {
	base: LocalSearchPartitioner<'g>,
	extreme_large_ratio: f64,
	max_pass_num: usize,
	early_exit_ratio: f64,

	gains: Vec<f64>,
	buckets: BTreeSet<GainKey>,
	in_bucket: Vec<bool>,
}

impl<'g> LocalSearch<'g> for FmBipartitioner<'g> {
	fn base(&self) -> &LocalSearchPartitioner<'g> {
		&self.base
	}

	fn base_mut(&mut self) -> &mut LocalSearchPartitioner<'g> {
		&mut self.base
	}

	fn move_node(&mut self, node: usize, block: usize) {
		let from = self.base.node2block[node];
		if from == block {
			return;
		}
		assert!(from != UNASSIGNED && block < 2, "FM moves assigned nodes between 2 blocks");
		let graph = self.base.graph;
		self.base.cut_size -= self.gains[node];

		let mut deltas = vec![];
		for &edge in graph.edges_of_node(node) {
			let w = graph.edge_weight(edge);
			let (mut from_nodes, mut to_nodes) = (vec![], vec![]);
			for &n in graph.nodes_of_edge(edge) {
				if n == node {
					continue;
				}
				if self.base.node2block[n] == from {
					from_nodes.push(n);
				} else {
					to_nodes.push(n);
				}
			}
			// Edge becomes cut: every other node can now uncut it by following.
			match to_nodes.len() {
				0 => {
					deltas.extend(from_nodes.iter().map(|n| (*n, w)));
					deltas.push((node, 2.0 * w));
				},
				1 => deltas.push((to_nodes[0], -w)),
				_ => {},
			}
			// Edge becomes uncut: moving any node back would cut it again.
			match from_nodes.len() {
				0 => {
					deltas.extend(to_nodes.iter().map(|n| (*n, -w)));
					deltas.push((node, -2.0 * w));
				},
				1 => deltas.push((from_nodes[0], w)),
				_ => {},
			}
		}
		for (n, delta) in deltas {
			self.update_gain(n, delta);
		}

		let node_weights = graph.weights_of_node(node);
		weights::dec(&mut self.base.block_sizes[from], node_weights);
		weights::accu(&mut self.base.block_sizes[block], node_weights);
		self.base.node2block[node] = block;
		if self.base.verbose {
			debug!(
				"FM move node-{node} {from} -> {block}: cut {:.3}",
				self.base.cut_size
			);
		}
	}
}

impl<'g> FmBipartitioner<'g> {
	pub fn new(base: LocalSearchPartitioner<'g>, refine: &ConfigRefine) -> Result<Self> {
		if base.block_num != 2 {
			return Err(Error::InvalidConfig(format!(
				"FM partitions into 2 blocks, got {}",
				base.block_num
			)));
		}
		let node_num = base.graph.node_num();
		Ok(Self {
			base,
			extreme_large_ratio: refine.extreme_large_ratio,
			max_pass_num: usize::MAX,
			early_exit_ratio: 1.0,
			gains: vec![0.0; node_num],
			buckets: BTreeSet::new(),
			in_bucket: vec![false; node_num],
		})
	}

	/// Caps the number of passes and tolerated non-positive moves per pass,
	/// as used when refining a projected partition.
	pub fn bounded(mut self, refine: &ConfigRefine) -> Self {
		self.max_pass_num = refine.max_pass_num;
		self.early_exit_ratio = refine.pass_early_exit_ratio;
		self
	}

	pub fn gain_of(&self, node: usize) -> f64 {
		self.gains[node]
	}

	pub fn initial_partition(&mut self) -> Result<()> {
		self.base.initial_partition(self.extreme_large_ratio)?;
		self.setup_gains();
		Ok(())
	}

	pub fn set_part_result(&mut self, part: &[usize]) {
		self.base.set_part_result(part);
		self.setup_gains();
	}

	fn setup_gains(&mut self) {
		let graph = self.base.graph;
		let part = &self.base.node2block;
		self.gains = vec![0.0; graph.node_num()];
		for edge in 0..graph.edge_num() {
			let w = graph.edge_weight(edge);
			let mut counts = [0usize; 2];
			for &n in graph.nodes_of_edge(edge) {
				counts[part[n]] += 1;
			}
			for &n in graph.nodes_of_edge(edge) {
				let block = part[n];
				if counts[block] == 1 {
					self.gains[n] += w;
				}
				if counts[1 - block] == 0 {
					self.gains[n] -= w;
				}
			}
		}
	}

	fn key(&self, node: usize) -> GainKey {
		(Reverse(OrderedFloat(self.gains[node])), node)
	}

	fn update_gain(&mut self, node: usize, delta: f64) {
		if self.in_bucket[node] {
			let old = self.key(node);
			self.buckets.remove(&old);
			self.gains[node] += delta;
			let new = self.key(node);
			self.buckets.insert(new);
		} else {
			self.gains[node] += delta;
		}
	}

	fn remove_from_bucket(&mut self, node: usize) {
		if self.in_bucket[node] {
			let key = self.key(node);
			self.buckets.remove(&key);
			self.in_bucket[node] = false;
		}
	}

	fn fill_buckets(&mut self) {
		self.buckets.clear();
		self.in_bucket = vec![false; self.gains.len()];
		for node in 0..self.gains.len() {
			if !self.base.fixed_nodes.contains_key(&node) {
				let key = self.key(node);
				self.buckets.insert(key);
				self.in_bucket[node] = true;
			}
		}
	}

	/// One FM pass. Flips the best legal unlocked node until none is left or
	/// too many non-positive moves were made, then rolls back to the best
	/// prefix. Returns the cut decrease kept.
	fn fm_pass(&mut self) -> f64 {
		self.fill_buckets();
		let node_num = self.gains.len();
		let max_none_gain_moves = (node_num as f64 * self.early_exit_ratio) as usize;

		let mut moves: Vec<(usize, usize)> = vec![];
		let mut pass_gain = 0.0;
		let mut best_gain = 0.0;
		let mut best_len = 0;
		let mut none_gain_moves = 0;
		loop {
			let pick = self.buckets.iter().map(|(_, n)| *n).find(|n| {
				let other = 1 - self.base.node2block[*n];
				self.base.is_move_legal(*n, other)
			});
			let Some(node) = pick else {
				break;
			};
			let gain = self.gains[node];
			let from = self.base.node2block[node];
			self.remove_from_bucket(node);
			self.move_node(node, 1 - from);
			moves.push((node, from));

			pass_gain += gain;
			if pass_gain > best_gain + EPS {
				best_gain = pass_gain;
				best_len = moves.len();
			}
			if gain <= EPS {
				none_gain_moves += 1;
				if none_gain_moves > max_none_gain_moves {
					break;
				}
			}
		}

		let undone = moves.split_off(best_len);
		for (node, from) in undone.into_iter().rev() {
			self.move_node(node, from);
		}
		self.buckets.clear();
		self.in_bucket.fill(false);
		best_gain
	}

	/// Runs passes until one keeps no gain or the pass cap is hit. Returns the
	/// number of passes run.
	pub fn refine(&mut self) -> usize {
		let mut pass = 0;
		while pass < self.max_pass_num {
			let before = self.base.cut_size;
			let gain = self.fm_pass();
			pass += 1;
			debug!(
				"FM pass-{pass}: gain {gain:.3}, cut {before:.3} -> {:.3}",
				self.base.cut_size
			);
			if gain <= EPS {
				break;
			}
		}
		debug_assert!(self.base.check_partition_states());
		pass
	}

	/// Initial partition followed by unbounded refinement.
	pub fn run(mut self) -> Result<PartitionResult> {
		self.initial_partition()?;
		let passes = self.refine();
		info!(
			"FM finished after {passes} passes: cut size {:.3}",
			self.base.cut_size
		);
		Ok(self.base.result())
	}
}

pub(crate) fn partition(
	graph: &HyperGraph,
	fixed_nodes: &HashM<usize, usize>,
	config: &Config,
) -> Result<PartitionResult> {
	let p = &config.partition;
	let base = LocalSearchPartitioner::new(graph, p.block_num, &p.imbalance_factors, p.seed)?
		.with_fixed_nodes(fixed_nodes.clone())?
		.with_verbose(p.verbose);
	FmBipartitioner::new(base, &config.refine)?.run()
}
