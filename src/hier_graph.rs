//! Multi-level view over [`HyperGraph`].
//!
//! Every level owns its own graph. A coarse level records, per node, the group
//! of node ids of the finer level it was built from. Levels are kept in a
//! [`Hierarchy`] arena and refer to each other only by index.

use std::{
	collections::BTreeSet,
	ops::{Deref, DerefMut},
};

use itertools::Itertools;
use log::debug;

use crate::{
	hypergraph::{HyperGraph, UNASSIGNED},
	util::{hash_map, sorted_keys, HashM},
	weights, Error, Result,
};

#[derive(Debug, Clone)]
pub struct HierarchicalHyperGraph {
	graph: HyperGraph,
	level: usize,

	/// Empty for a root graph.
	child2parents: Vec<Vec<usize>>,
	parent2child: Vec<usize>,
	child_edge2parent_edge: Vec<usize>,

	fixed_nodes: HashM<usize, usize>,
}

impl Deref for HierarchicalHyperGraph {
	type Target = HyperGraph;

	fn deref(&self) -> &Self::Target {
		&self.graph
	}
}

impl DerefMut for HierarchicalHyperGraph {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.graph
	}
}

impl HierarchicalHyperGraph {
	/// Wraps an original, uncoarsened graph.
	pub fn root(graph: HyperGraph) -> Self {
		Self {
			graph,
			level: 0,
			child2parents: vec![],
			parent2child: vec![],
			child_edge2parent_edge: vec![],
			fixed_nodes: hash_map(),
		}
	}

	pub fn with_fixed_nodes(mut self, fixed_nodes: HashM<usize, usize>) -> Self {
		for node in fixed_nodes.keys() {
			assert!(*node < self.node_num(), "Fixed node-{node} does not exist");
		}
		self.fixed_nodes = fixed_nodes;
		self
	}

	pub fn graph(&self) -> &HyperGraph {
		&self.graph
	}

	pub fn into_graph(self) -> HyperGraph {
		self.graph
	}

	pub fn hierarchical_level(&self) -> usize {
		self.level
	}

	pub fn is_root(&self) -> bool {
		self.level == 0
	}

	/// Node count of the immediate finer level.
	pub fn parent_node_num(&self) -> Option<usize> {
		if self.is_root() {
			None
		} else {
			Some(self.parent2child.len())
		}
	}

	pub fn fixed_nodes(&self) -> &HashM<usize, usize> {
		&self.fixed_nodes
	}

	pub fn parents_of_node(&self, node: usize) -> &[usize] {
		assert!(!self.is_root());
		&self.child2parents[node]
	}

	pub fn child_of_parent(&self, parent: usize) -> usize {
		assert!(!self.is_root());
		self.parent2child[parent]
	}

	pub fn parent_edge_of(&self, edge: usize) -> usize {
		assert!(!self.is_root());
		self.child_edge2parent_edge[edge]
	}

	/// Builds one coarser level. `groups` must partition `0..node_num()`: every
	/// node appears in exactly one group. Group `i` becomes child node `i`.
	pub fn create_clustered_child_graph(&self, groups: &[Vec<usize>]) -> Result<Self> {
		let parent_num = self.node_num();
		let mut parent2child = vec![UNASSIGNED; parent_num];
		for (child, group) in groups.iter().enumerate() {
			assert!(!group.is_empty(), "Cluster-{child} is empty");
			for &parent in group {
				if parent >= parent_num {
					return Err(Error::ClusterOutOfRange(parent));
				}
				if parent2child[parent] != UNASSIGNED {
					return Err(Error::NodeInMultipleClusters(parent));
				}
				parent2child[parent] = child;
			}
		}
		if let Some(node) = parent2child.iter().position(|c| *c == UNASSIGNED) {
			return Err(Error::NodeNotClustered(node));
		}

		let mut graph = HyperGraph::with_factors(
			self.node_weight_factor().to_vec(),
			self.edge_weight_factor().to_vec(),
		);
		let mut child2parents = Vec::with_capacity(groups.len());
		for group in groups {
			let mut w = weights::zeros(self.node_weight_dim());
			for &parent in group {
				weights::accu(&mut w, self.weights_of_node(parent));
			}
			graph.add_node(w);
			child2parents.push(group.iter().copied().sorted().collect_vec());
		}

		let mut fixed_nodes = hash_map();
		for parent in sorted_keys(&self.fixed_nodes) {
			let block = self.fixed_nodes[&parent];
			let child = parent2child[parent];
			match fixed_nodes.insert(child, block) {
				Some(prev) if prev != block => return Err(Error::ConflictingFixedNodes(child)),
				_ => {},
			}
		}

		let mut child_edge2parent_edge = vec![];
		for edge in 0..self.edge_num() {
			let children = self
				.nodes_of_edge(edge)
				.iter()
				.map(|p| parent2child[*p])
				.collect::<BTreeSet<_>>();
			if children.len() > 1 {
				graph.add_edge(children, self.weights_of_edge(edge).to_vec());
				child_edge2parent_edge.push(edge);
			}
		}

		debug!(
			"Level-{} built: {} nodes {} edges (from {} nodes {} edges)",
			self.level + 1,
			graph.node_num(),
			graph.edge_num(),
			parent_num,
			self.edge_num()
		);

		Ok(Self {
			graph,
			level: self.level + 1,
			child2parents,
			parent2child,
			child_edge2parent_edge,
			fixed_nodes,
		})
	}

	/// Copies the block of every node of this level to each node of its group,
	/// producing an assignment over the immediate finer level.
	pub fn part_result_of_parent(&self, child_part: &[usize]) -> Result<Vec<usize>> {
		assert!(!self.is_root(), "A root graph has no parent");
		assert_eq!(child_part.len(), self.node_num());
		let mut parent_part = vec![UNASSIGNED; self.parent2child.len()];
		for (child, parents) in self.child2parents.iter().enumerate() {
			for &parent in parents {
				parent_part[parent] = child_part[child];
			}
		}
		match parent_part.iter().position(|b| *b == UNASSIGNED) {
			Some(node) => Err(Error::UnassignedParentNode(node)),
			None => Ok(parent_part),
		}
	}

	/// Reverse projection. Every group must be entirely in one block.
	pub fn part_result_from_parent(&self, parent_part: &[usize]) -> Vec<usize> {
		assert!(!self.is_root(), "A root graph has no parent");
		assert_eq!(parent_part.len(), self.parent2child.len());
		self.child2parents
			.iter()
			.enumerate()
			.map(|(child, parents)| {
				let block = parent_part[parents[0]];
				for p in parents {
					assert_eq!(
						parent_part[*p], block,
						"Node-{child} has parents in different blocks"
					);
				}
				block
			})
			.collect_vec()
	}
}

/// Arena of levels. Index 0 is the root, the last entry the coarsest level.
#[derive(Debug, Clone)]
pub struct Hierarchy {
	levels: Vec<HierarchicalHyperGraph>,
}

impl Hierarchy {
	pub fn new(root: HierarchicalHyperGraph) -> Self {
		assert!(root.is_root());
		Self { levels: vec![root] }
	}

	pub fn push(&mut self, level: HierarchicalHyperGraph) {
		let last = self.coarsest();
		assert_eq!(level.hierarchical_level(), last.hierarchical_level() + 1);
		assert_eq!(level.parent_node_num(), Some(last.node_num()));
		self.levels.push(level);
	}

	pub fn len(&self) -> usize {
		self.levels.len()
	}

	pub fn is_empty(&self) -> bool {
		self.levels.is_empty()
	}

	pub fn level(&self, idx: usize) -> &HierarchicalHyperGraph {
		&self.levels[idx]
	}

	pub fn root(&self) -> &HierarchicalHyperGraph {
		&self.levels[0]
	}

	pub fn coarsest(&self) -> &HierarchicalHyperGraph {
		&self.levels[self.levels.len() - 1]
	}

	/// Original node ids aggregated, transitively, by `node` of `level`.
	pub fn root_parents_of_node(&self, level: usize, node: usize) -> Vec<usize> {
		if level == 0 {
			return vec![node];
		}
		self.levels[level]
			.parents_of_node(node)
			.iter()
			.flat_map(|p| self.root_parents_of_node(level - 1, *p))
			.sorted()
			.collect_vec()
	}

	/// Projects an assignment of `level` all the way to the root.
	pub fn project_to_root(&self, level: usize, part: &[usize]) -> Result<Vec<usize>> {
		let mut part = part.to_vec();
		for idx in (1..=level).rev() {
			part = self.levels[idx].part_result_of_parent(&part)?;
		}
		Ok(part)
	}
}
