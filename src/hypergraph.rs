use std::collections::{BTreeSet, VecDeque};

use itertools::Itertools;

use crate::{
	report,
	util::{hash_map, HashM},
	weights::{self, Weights},
};

pub mod hmetis;

/// Block id of a node that has not been placed yet.
pub const UNASSIGNED: usize = usize::MAX;

/// Flat weighted hypergraph.
///
/// Node and edge ids are dense, 0-based and never change once handed out.
/// Every node weight vector has `node_weight_dim()` entries and every edge
/// weight vector has `edge_weight_dim()` entries. The per-dimension weight
/// factors turn a vector into the scalar used by the partitioners.
#[derive(Debug, Clone)]
pub struct HyperGraph {
	node_weight_factor: Weights,
	edge_weight_factor: Weights,

	edge2nodes: Vec<Vec<usize>>,
	edge2weights: Vec<Weights>,

	node2edges: Vec<Vec<usize>>,
	node2weights: Vec<Weights>,
}

impl HyperGraph {
	pub fn new(node_weight_dim: usize, edge_weight_dim: usize) -> Self {
		Self::with_factors(vec![1.0; node_weight_dim], vec![1.0; edge_weight_dim])
	}

	pub fn with_factors(node_weight_factor: Weights, edge_weight_factor: Weights) -> Self {
		assert!(!node_weight_factor.is_empty());
		assert!(!edge_weight_factor.is_empty());
		Self {
			node_weight_factor,
			edge_weight_factor,
			edge2nodes: vec![],
			edge2weights: vec![],
			node2edges: vec![],
			node2weights: vec![],
		}
	}

	pub fn add_node(&mut self, weights: Weights) -> usize {
		assert_eq!(weights.len(), self.node_weight_dim());
		let id = self.node2weights.len();
		self.node2weights.push(weights);
		self.node2edges.push(vec![]);
		id
	}

	/// Adds a hyperedge over `nodes`. Duplicate ids are collapsed; at least two
	/// distinct existing nodes are required.
	pub fn add_edge<I>(&mut self, nodes: I, weights: Weights) -> usize
	where
		I: IntoIterator<Item = usize>,
	{
		assert_eq!(weights.len(), self.edge_weight_dim());
		let nodes = nodes.into_iter().collect::<BTreeSet<_>>();
		assert!(nodes.len() > 1, "An edge needs at least two distinct nodes");

		let id = self.edge2nodes.len();
		for &node in &nodes {
			assert!(node < self.node_num(), "Node-{node} does not exist");
			self.node2edges[node].push(id);
		}
		self.edge2nodes.push(nodes.into_iter().collect());
		self.edge2weights.push(weights);
		id
	}

	pub fn set_node_weights(&mut self, node: usize, weights: Weights) {
		assert_eq!(weights.len(), self.node_weight_dim());
		self.node2weights[node] = weights;
	}

	pub fn set_edge_weights(&mut self, edge: usize, weights: Weights) {
		assert_eq!(weights.len(), self.edge_weight_dim());
		self.edge2weights[edge] = weights;
	}

	/// Replaces the node weight factor. Existing weight vectors are padded with
	/// 1.0 or truncated to the new dimension.
	pub fn set_node_weight_factor(&mut self, factor: Weights) {
		assert!(!factor.is_empty());
		for w in self.node2weights.iter_mut() {
			weights::resize(w, factor.len());
		}
		self.node_weight_factor = factor;
	}

	pub fn set_edge_weight_factor(&mut self, factor: Weights) {
		assert!(!factor.is_empty());
		for w in self.edge2weights.iter_mut() {
			weights::resize(w, factor.len());
		}
		self.edge_weight_factor = factor;
	}

	pub fn node_num(&self) -> usize {
		self.node2weights.len()
	}

	pub fn edge_num(&self) -> usize {
		self.edge2nodes.len()
	}

	pub fn node_weight_dim(&self) -> usize {
		self.node_weight_factor.len()
	}

	pub fn edge_weight_dim(&self) -> usize {
		self.edge_weight_factor.len()
	}

	pub fn node_weight_factor(&self) -> &[f64] {
		&self.node_weight_factor
	}

	pub fn edge_weight_factor(&self) -> &[f64] {
		&self.edge_weight_factor
	}

	pub fn nodes_of_edge(&self, edge: usize) -> &[usize] {
		&self.edge2nodes[edge]
	}

	pub fn edges_of_node(&self, node: usize) -> &[usize] {
		&self.node2edges[node]
	}

	pub fn weights_of_node(&self, node: usize) -> &[f64] {
		&self.node2weights[node]
	}

	pub fn weights_of_edge(&self, edge: usize) -> &[f64] {
		&self.edge2weights[edge]
	}

	pub fn degree_of_edge(&self, edge: usize) -> usize {
		self.edge2nodes[edge].len()
	}

	pub fn max_edge_degree(&self) -> usize {
		self.edge2nodes.iter().map(|n| n.len()).max().unwrap_or(0)
	}

	pub fn node_weights_sum(&self, weights: &[f64]) -> f64 {
		weights::weighted_sum(weights, &self.node_weight_factor)
	}

	pub fn edge_weights_sum(&self, weights: &[f64]) -> f64 {
		weights::weighted_sum(weights, &self.edge_weight_factor)
	}

	/// Scalar weight of a node.
	pub fn node_weight(&self, node: usize) -> f64 {
		self.node_weights_sum(&self.node2weights[node])
	}

	/// Scalar weight of an edge.
	pub fn edge_weight(&self, edge: usize) -> f64 {
		self.edge_weights_sum(&self.edge2weights[edge])
	}

	/// True when the assigned incident nodes of `edge` span more than one block.
	/// Unassigned nodes are ignored.
	pub fn is_cut_edge(&self, edge: usize, part: &[usize]) -> bool {
		assert_eq!(part.len(), self.node_num());
		let mut first = UNASSIGNED;
		for &node in &self.edge2nodes[edge] {
			let block = part[node];
			if block == UNASSIGNED {
				continue;
			}
			if first == UNASSIGNED {
				first = block;
			} else if first != block {
				return true;
			}
		}
		false
	}

	/// Per edge-weight dimension, the total weight of cut edges.
	pub fn cut_size(&self, part: &[usize]) -> Weights {
		assert_eq!(part.len(), self.node_num());
		let mut cut = weights::zeros(self.edge_weight_dim());
		for edge in 0..self.edge_num() {
			if self.is_cut_edge(edge, part) {
				weights::accu(&mut cut, &self.edge2weights[edge]);
			}
		}
		cut
	}

	/// Same as [`HyperGraph::cut_size`] restricted to the edges incident on `node`.
	pub fn cut_size_of_node(&self, part: &[usize], node: usize) -> Weights {
		let mut cut = weights::zeros(self.edge_weight_dim());
		for &edge in &self.node2edges[node] {
			if self.is_cut_edge(edge, part) {
				weights::accu(&mut cut, &self.edge2weights[edge]);
			}
		}
		cut
	}

	/// Weight of every block `0..=max(part)`. Every node must be assigned.
	pub fn block_size(&self, part: &[usize]) -> Vec<Weights> {
		assert_eq!(part.len(), self.node_num());
		let block_num = part.iter().max().map(|b| b + 1).unwrap_or(0);
		let mut sizes = vec![weights::zeros(self.node_weight_dim()); block_num];
		for (node, &block) in part.iter().enumerate() {
			assert!(block != UNASSIGNED, "Node-{node} is unassigned");
			weights::accu(&mut sizes[block], &self.node2weights[node]);
		}
		sizes
	}

	/// For every block, the weight of the cut edges that touch it.
	pub fn block_cut_size(&self, part: &[usize]) -> Vec<Weights> {
		assert_eq!(part.len(), self.node_num());
		let block_num = part
			.iter()
			.filter(|b| **b != UNASSIGNED)
			.max()
			.map(|b| b + 1)
			.unwrap_or(0);
		let mut sizes = vec![weights::zeros(self.edge_weight_dim()); block_num];
		for edge in 0..self.edge_num() {
			let blocks = self.edge2nodes[edge]
				.iter()
				.map(|n| part[*n])
				.filter(|b| *b != UNASSIGNED)
				.collect::<BTreeSet<_>>();
			if blocks.len() > 1 {
				for block in blocks {
					weights::accu(&mut sizes[block], &self.edge2weights[edge]);
				}
			}
		}
		sizes
	}

	/// Distinct nodes sharing at least one edge with `node`, ascending.
	pub fn neighbors_of_node(&self, node: usize) -> Vec<usize> {
		self.node2edges[node]
			.iter()
			.flat_map(|e| self.edge2nodes[*e].iter().copied())
			.filter(|n| *n != node)
			.sorted()
			.dedup()
			.collect_vec()
	}

	pub fn has_connection(&self, a: usize, b: usize) -> bool {
		self.node2edges[a]
			.iter()
			.any(|e| self.edge2nodes[*e].binary_search(&b).is_ok())
	}

	pub fn total_node_weight(&self) -> Weights {
		let mut total = weights::zeros(self.node_weight_dim());
		for w in &self.node2weights {
			weights::accu(&mut total, w);
		}
		total
	}

	pub fn total_edge_weight(&self) -> Weights {
		let mut total = weights::zeros(self.edge_weight_dim());
		for w in &self.edge2weights {
			weights::accu(&mut total, w);
		}
		total
	}

	pub fn max_node_weight(&self) -> Weights {
		self.node2weights
			.iter()
			.fold(weights::zeros(self.node_weight_dim()), |acc, w| {
				weights::max(&acc, w)
			})
	}

	pub fn total_node_weights_of_edge(&self, edge: usize) -> Weights {
		let mut total = weights::zeros(self.node_weight_dim());
		for &node in &self.edge2nodes[edge] {
			weights::accu(&mut total, &self.node2weights[node]);
		}
		total
	}

	/// Breadth-first layers around `node`: entry `d` holds the nodes at exactly
	/// distance `d`, for `d` in `0..=max_dist`.
	pub fn k_distance_nodes(&self, node: usize, max_dist: usize) -> Vec<Vec<usize>> {
		self.k_distance_nodes_from(&[node], max_dist)
	}

	/// Multi-source variant of [`HyperGraph::k_distance_nodes`].
	pub fn k_distance_nodes_from(&self, sources: &[usize], max_dist: usize) -> Vec<Vec<usize>> {
		let mut node2dist = vec![usize::MAX; self.node_num()];
		let mut layers = vec![vec![]];
		let mut queue = VecDeque::new();
		for &node in sources {
			assert!(node < self.node_num());
			if node2dist[node] == usize::MAX {
				node2dist[node] = 0;
				layers[0].push(node);
				queue.push_back(node);
			}
		}

		while let Some(cur) = queue.pop_front() {
			let dist = node2dist[cur] + 1;
			if dist > max_dist {
				continue;
			}
			for next in self.neighbors_of_node(cur) {
				if node2dist[next] != usize::MAX {
					continue;
				}
				node2dist[next] = dist;
				if layers.len() <= dist {
					layers.push(vec![]);
				}
				layers[dist].push(next);
				queue.push_back(next);
			}
		}
		layers
	}

	/// Same nodes, but edges with an identical incident-node set merged into one
	/// edge whose weight is the sum. Edge order follows first occurrence.
	pub fn compressed_graph(&self) -> HyperGraph {
		let mut index: HashM<&[usize], usize> = hash_map();
		let mut merged: Vec<(&[usize], Weights)> = vec![];
		for edge in 0..self.edge_num() {
			let nodes = self.edge2nodes[edge].as_slice();
			match index.get(nodes) {
				Some(&idx) => weights::accu(&mut merged[idx].1, &self.edge2weights[edge]),
				None => {
					index.insert(nodes, merged.len());
					merged.push((nodes, self.edge2weights[edge].clone()));
				},
			}
		}

		let mut graph = HyperGraph::with_factors(
			self.node_weight_factor.clone(),
			self.edge_weight_factor.clone(),
		);
		for w in &self.node2weights {
			graph.add_node(w.clone());
		}
		for (nodes, w) in merged {
			graph.add_edge(nodes.iter().copied(), w);
		}
		graph
	}

	/// Human readable summary used in log output.
	pub fn graph_info(&self, verbose: bool) -> String {
		let mut info = String::new();
		info += &format!("Total number of nodes: {}\n", self.node_num());
		info += &format!("Total number of edges: {}\n", self.edge_num());
		info += &format!("Total node weights: {:?}\n", self.total_node_weight());
		let total_edge = self.total_edge_weight();
		info += &format!(
			"Total edge weights: {:.2} ({:?})\n",
			self.edge_weights_sum(&total_edge),
			total_edge
		);

		let dist = |values: &[f64]| {
			if verbose {
				report::value_dist_info(values, 6)
			} else {
				report::basic_dist_info(values)
			}
		};
		for dim in 0..self.node_weight_dim() {
			let values = self.node2weights.iter().map(|w| w[dim]).collect_vec();
			info += &format!("Node weight in dim-{dim}: {}\n", dist(&values));
		}
		let values = (0..self.edge_num()).map(|e| self.edge_weight(e)).collect_vec();
		info += &format!("Edge weight: {}\n", dist(&values));
		let values = self.edge2nodes.iter().map(|n| n.len() as f64).collect_vec();
		info += &format!("Edge degree: {}", dist(&values));
		info
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use float_cmp::assert_approx_eq;

	/// 0-1-2 chain plus a 3-pin net {2,3,4}.
	fn small_graph() -> HyperGraph {
		let mut g = HyperGraph::new(1, 1);
		for _ in 0..5 {
			g.add_node(vec![1.0]);
		}
		g.add_edge([0, 1], vec![1.0]);
		g.add_edge([1, 2], vec![2.0]);
		g.add_edge([2, 3, 4], vec![3.0]);
		g
	}

	#[test]
	fn build() {
		let g = small_graph();
		assert_eq!(g.node_num(), 5);
		assert_eq!(g.edge_num(), 3);
		assert_eq!(g.edges_of_node(2), &[1, 2]);
		assert_eq!(g.nodes_of_edge(2), &[2, 3, 4]);
		assert_eq!(g.max_edge_degree(), 3);
		assert_eq!(g.neighbors_of_node(2), vec![1, 3, 4]);
		assert!(g.has_connection(3, 4));
		assert!(!g.has_connection(0, 4));
	}

	#[test]
	fn duplicate_pins_collapse() {
		let mut g = HyperGraph::new(1, 1);
		g.add_node(vec![1.0]);
		g.add_node(vec![1.0]);
		let e = g.add_edge([1, 0, 1], vec![1.0]);
		assert_eq!(g.nodes_of_edge(e), &[0, 1]);
	}

	#[test]
	#[should_panic]
	fn single_pin_edge_rejected() {
		let mut g = HyperGraph::new(1, 1);
		g.add_node(vec![1.0]);
		g.add_edge([0, 0], vec![1.0]);
	}

	#[test]
	#[should_panic]
	fn node_weight_dim_checked() {
		let mut g = HyperGraph::new(2, 1);
		g.add_node(vec![1.0]);
	}

	#[test]
	fn cut_size() {
		let g = small_graph();
		let part = vec![0, 0, 1, 1, 1];
		assert!(g.is_cut_edge(1, &part));
		assert!(!g.is_cut_edge(2, &part));
		assert_eq!(g.cut_size(&part), vec![2.0]);
		assert_eq!(g.cut_size_of_node(&part, 2), vec![2.0]);
		assert_eq!(g.cut_size_of_node(&part, 4), vec![0.0]);
		assert_eq!(g.block_size(&part), vec![vec![2.0], vec![3.0]]);
		assert_eq!(g.block_cut_size(&part), vec![vec![2.0], vec![2.0]]);
	}

	#[test]
	fn unassigned_nodes_do_not_cut() {
		let g = small_graph();
		let part = vec![0, UNASSIGNED, 1, UNASSIGNED, 1];
		assert!(!g.is_cut_edge(0, &part));
		assert!(g.is_cut_edge(1, &[0, 0, 1, UNASSIGNED, UNASSIGNED]));
		assert_eq!(g.cut_size(&part), vec![0.0]);
	}

	#[test]
	fn weight_factors() {
		let mut g = HyperGraph::with_factors(vec![1.0, 2.0], vec![0.5]);
		let n = g.add_node(vec![1.0, 3.0]);
		g.add_node(vec![2.0, 0.0]);
		let e = g.add_edge([0, 1], vec![4.0]);
		assert_approx_eq!(f64, g.node_weight(n), 7.0);
		assert_approx_eq!(f64, g.edge_weight(e), 2.0);
		assert_eq!(g.total_node_weight(), vec![3.0, 3.0]);
		assert_eq!(g.max_node_weight(), vec![2.0, 3.0]);
		assert_eq!(g.total_node_weights_of_edge(e), vec![3.0, 3.0]);

		g.set_node_weight_factor(vec![1.0, 1.0, 1.0]);
		assert_eq!(g.weights_of_node(0), &[1.0, 3.0, 1.0]);
		g.set_edge_weight_factor(vec![1.0]);
		g.set_edge_weights(e, vec![5.0]);
		assert_approx_eq!(f64, g.edge_weight(e), 5.0);
	}

	#[test]
	fn k_distance() {
		let g = small_graph();
		let layers = g.k_distance_nodes(0, 2);
		assert_eq!(layers, vec![vec![0], vec![1], vec![2]]);
		let layers = g.k_distance_nodes(0, 10);
		assert_eq!(layers.len(), 4);
		assert_eq!(layers[3], vec![3, 4]);
		let layers = g.k_distance_nodes_from(&[0, 4], 1);
		assert_eq!(layers, vec![vec![0, 4], vec![1, 2, 3]]);
	}

	#[test]
	fn compressed_graph_merges_parallel_edges() {
		let mut g = small_graph();
		g.add_edge([1, 0], vec![4.0]);
		g.add_edge([4, 3, 2], vec![1.0]);
		let c = g.compressed_graph();
		assert_eq!(c.node_num(), g.node_num());
		assert_eq!(c.edge_num(), 3);
		assert_eq!(c.weights_of_edge(0), &[5.0]);
		assert_eq!(c.weights_of_edge(2), &[4.0]);
		assert_eq!(c.total_edge_weight(), g.total_edge_weight());
	}

	#[test]
	fn info_mentions_counts() {
		let g = small_graph();
		let info = g.graph_info(false);
		assert!(info.contains("Total number of nodes: 5"));
		assert!(g.graph_info(true).contains("Edge degree"));
	}
}
