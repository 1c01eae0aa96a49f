use std::collections::VecDeque;

use itertools::Itertools;
use log::{debug, info, warn};

use super::{LocalSearch, LocalSearchPartitioner, PartitionResult, EPS};
use crate::{
	config::Config,
	grid::{Coord, GridDim},
	hypergraph::HyperGraph,
	solver::{BoolVar, Model, Status},
	util::{sorted_keys, HashM},
	weights::{self, Weights},
	Error, Result,
};

pub const DEFAULT_DECISION_LIMIT: u64 = 100_000;

/// Exact placement onto a grid of at most 2x2 islands.
///
/// Every node gets one boolean per grid axis. On a 2-wide axis the boolean is
/// the coordinate, on a 1-wide axis it is pinned to 0. A one-hot island
/// indicator per node is tied to the coordinate booleans, and every hyperedge
/// pays its weight for each axis its nodes span.
///
/// Without fixed nodes every placement has mirror images of equal cost, so
/// the first node in branching order is pinned to `(0,0)`. Edges too heavy
/// for one island must span some axis, which the solver uses as a bound.
pub struct ExactGridPartitioner<'g> {
	graph: &'g HyperGraph,
	dim: GridDim,
	capacity: Weights,
	fixed_nodes: HashM<usize, Coord>,
	decision_limit: Option<u64>,
	hint: Option<Vec<usize>>,
}

struct GridModel {
	model: Model,
	xs: Vec<BoolVar>,
	ys: Vec<BoolVar>,
	indicators: Vec<Vec<BoolVar>>,
}

impl<'g> ExactGridPartitioner<'g> {
	/// `capacity` bounds every island, per node weight dimension.
	pub fn new(graph: &'g HyperGraph, dim: GridDim, capacity: Weights) -> Result<Self> {
		if dim.x > 2 || dim.y > 2 {
			return Err(Error::GridTooLarge);
		}
		assert_eq!(capacity.len(), graph.node_weight_dim());
		Ok(Self {
			graph,
			dim,
			capacity,
			fixed_nodes: HashM::default(),
			decision_limit: Some(DEFAULT_DECISION_LIMIT),
			hint: None,
		})
	}

	/// Island capacity `total * (1 / islands + imbalance)` per dimension.
	/// A single factor applies to every dimension.
	pub fn from_imbalance(
		graph: &'g HyperGraph,
		dim: GridDim,
		imbalance_factors: &[f64],
	) -> Result<Self> {
		let node_dim = graph.node_weight_dim();
		let factors = match imbalance_factors.len() {
			1 => vec![imbalance_factors[0]; node_dim],
			n if n == node_dim => imbalance_factors.to_vec(),
			n => {
				return Err(Error::InvalidConfig(format!(
					"{n} imbalance factors for {node_dim} node weight dimensions"
				)))
			},
		};
		let even = 1.0 / dim.island_num() as f64;
		let capacity = graph
			.total_node_weight()
			.iter()
			.zip(&factors)
			.map(|(t, f)| t * (even + f))
			.collect_vec();
		Self::new(graph, dim, capacity)
	}

	pub fn with_fixed_nodes(mut self, fixed_nodes: HashM<usize, Coord>) -> Result<Self> {
		for (&node, &coord) in &fixed_nodes {
			if node >= self.graph.node_num() || !self.dim.contains(coord) {
				return Err(Error::InvalidConfig(format!(
					"Node-{node} fixed at {coord} is outside the graph or grid"
				)));
			}
		}
		self.fixed_nodes = fixed_nodes;
		Ok(self)
	}

	pub fn with_decision_limit(mut self, decision_limit: Option<u64>) -> Self {
		self.decision_limit = decision_limit;
		self
	}

	/// Island index per node, tried first by the solver.
	pub fn with_hint(mut self, part: Vec<usize>) -> Self {
		let islands = self.dim.island_num();
		if part.len() == self.graph.node_num() && part.iter().all(|i| *i < islands) {
			self.hint = Some(part);
		} else {
			warn!("Ignoring a hint that does not place every node on the grid");
		}
		self
	}

	pub fn capacity(&self) -> &[f64] {
		&self.capacity
	}

	/// Breadth-first from the heaviest node, heavier neighbors first, so
	/// connected nodes are decided next to each other.
	fn branch_order(graph: &HyperGraph) -> Vec<usize> {
		let heavy_first = (0..graph.node_num())
			.sorted_by(|a, b| graph.node_weight(*b).total_cmp(&graph.node_weight(*a)))
			.collect_vec();
		let mut seen = vec![false; graph.node_num()];
		let mut order = Vec::with_capacity(graph.node_num());
		for &start in &heavy_first {
			if seen[start] {
				continue;
			}
			seen[start] = true;
			let mut queue = VecDeque::from([start]);
			while let Some(node) = queue.pop_front() {
				order.push(node);
				let next = graph
					.neighbors_of_node(node)
					.into_iter()
					.filter(|n| !seen[*n])
					.sorted_by(|a, b| graph.node_weight(*b).total_cmp(&graph.node_weight(*a)))
					.collect_vec();
				for n in next {
					seen[n] = true;
					queue.push_back(n);
				}
			}
		}
		order
	}

	fn build_model(&self, graph: &HyperGraph) -> GridModel {
		let mut model = Model::new();
		let node_num = graph.node_num();
		let order = Self::branch_order(graph);
		let xs = (0..node_num).map(|_| model.new_bool_var()).collect_vec();
		let ys = (0..node_num).map(|_| model.new_bool_var()).collect_vec();
		for node in 0..node_num {
			if self.dim.x == 1 {
				model.fix(xs[node], false);
			}
			if self.dim.y == 1 {
				model.fix(ys[node], false);
			}
		}

		let mut indicators = vec![];
		for node in 0..node_num {
			let islands = self.dim.coords().map(|_| model.new_bool_var()).collect_vec();
			for (ind, coord) in islands.iter().zip(self.dim.coords()) {
				for (axis, on) in [(xs[node], coord.x == 1), (ys[node], coord.y == 1)] {
					if on {
						model.add_greater_or_equal(&[(axis, 1.0), (*ind, -1.0)], 0.0);
					} else {
						model.add_less_or_equal(&[(axis, 1.0), (*ind, 1.0)], 1.0);
					}
				}
			}
			model.add_exactly_one(&islands);
			indicators.push(islands);
		}

		for island in 0..self.dim.island_num() {
			for d in 0..graph.node_weight_dim() {
				let terms = (0..node_num)
					.map(|node| (indicators[node][island], graph.weights_of_node(node)[d]))
					.collect_vec();
				model.add_less_or_equal(&terms, self.capacity[d]);
			}
		}

		for node in sorted_keys(&self.fixed_nodes) {
			let coord = self.fixed_nodes[&node];
			model.fix(indicators[node][self.dim.index_of(coord)], true);
		}
		let pinned = match (self.fixed_nodes.is_empty(), order.first()) {
			(true, Some(&node)) => {
				model.fix(xs[node], false);
				model.fix(ys[node], false);
				Some(node)
			},
			_ => None,
		};

		let mut objective = vec![];
		let slack = weights::add(&self.capacity, &vec![EPS; self.capacity.len()]);
		for edge in 0..graph.edge_num() {
			let weight = graph.edge_weight(edge);
			let nodes = graph.nodes_of_edge(edge);
			let mut spans = vec![];
			for (wide, coords) in [(self.dim.x == 2, &xs), (self.dim.y == 2, &ys)] {
				if !wide {
					continue;
				}
				let vars = nodes.iter().map(|n| coords[*n]).collect_vec();
				let low = model.new_bool_var();
				let high = model.new_bool_var();
				let span = model.new_bool_var();
				model.add_min_equality(low, &vars);
				model.add_max_equality(high, &vars);
				model.add_equality(&[(span, 1.0), (high, -1.0), (low, 1.0)], 0.0);
				objective.push((span, weight));
				spans.push(span);
			}
			let too_heavy = !weights::less_eq(&graph.total_node_weights_of_edge(edge), &slack);
			if too_heavy && !spans.is_empty() {
				model.add_at_least_one(&spans);
			}
		}
		model.minimize(&objective);
		model.set_branch_order(&order.iter().flat_map(|n| [xs[*n], ys[*n]]).collect_vec());

		if let Some(hint) = &self.hint {
			// Mirror the hint so the pinned node sits at (0,0).
			let (flip_x, flip_y) = match pinned {
				Some(node) => {
					let at = self.dim.coord_of(hint[node]);
					(at.x == 1, at.y == 1)
				},
				None => (false, false),
			};
			let values = (0..node_num)
				.flat_map(|node| {
					let at = self.dim.coord_of(hint[node]);
					[(xs[node], (at.x == 1) != flip_x), (ys[node], (at.y == 1) != flip_y)]
				})
				.collect_vec();
			model.set_hint(&values);
		}

		GridModel {
			model,
			xs,
			ys,
			indicators,
		}
	}

	/// Solves on the compressed graph and checks the placement against the
	/// original one. A status without a solution is an error.
	pub fn solve(&self) -> Result<PartitionResult> {
		let compressed = self.graph.compressed_graph();
		info!(
			"Exact {}x{} solve: {} nodes, {} edges after compression (from {})",
			self.dim.x,
			self.dim.y,
			compressed.node_num(),
			compressed.edge_num(),
			self.graph.edge_num()
		);
		let grid = self.build_model(&compressed);
		debug!(
			"Model has {} vars and {} constraints",
			grid.model.var_num(),
			grid.model.constraint_num()
		);
		let solution = grid.model.solve(self.decision_limit);
		match solution.status {
			Status::Optimal => {},
			Status::Feasible => warn!(
				"Decision limit reached after {} decisions, keeping objective {:.3}",
				solution.decisions, solution.objective
			),
			status => return Err(Error::SolverFailed(status)),
		}

		let mut part = vec![];
		let mut coords = vec![];
		for node in 0..compressed.node_num() {
			let coord = Coord::new(
				solution.value(grid.xs[node]) as usize,
				solution.value(grid.ys[node]) as usize,
			);
			let island = self.dim.index_of(coord);
			assert!(solution.value(grid.indicators[node][island]));
			part.push(island);
			coords.push(coord);
		}

		let block_sizes = self.check_solution(&part, &coords, solution.objective)?;
		let cut_size = self.graph.edge_weights_sum(&self.graph.cut_size(&part));
		info!(
			"Exact solve done: objective {:.3}, cut size {:.3}",
			solution.objective, cut_size
		);
		Ok(PartitionResult {
			part,
			cut_size,
			block_sizes,
			coords,
			objective: Some(solution.objective),
		})
	}

	/// Recomputes island sizes, edge spans and fixed placements from the
	/// decoded coordinates. Returns the island sizes.
	fn check_solution(
		&self,
		part: &[usize],
		coords: &[Coord],
		objective: f64,
	) -> Result<Vec<Weights>> {
		let graph = self.graph;
		let mut sizes = vec![weights::zeros(graph.node_weight_dim()); self.dim.island_num()];
		for (node, &island) in part.iter().enumerate() {
			weights::accu(&mut sizes[island], graph.weights_of_node(node));
		}
		let slack = weights::add(&self.capacity, &vec![EPS; self.capacity.len()]);
		if let Some(island) = sizes.iter().position(|s| !weights::less_eq(s, &slack)) {
			return Err(Error::SolutionCheckFailed(format!(
				"island {} holds {:?} above capacity {:?}",
				self.dim.coord_of(island),
				sizes[island],
				self.capacity
			)));
		}

		let mut recomputed = 0.0;
		for edge in 0..graph.edge_num() {
			let nodes = graph.nodes_of_edge(edge);
			let (lx, hx) = nodes
				.iter()
				.map(|n| coords[*n].x)
				.minmax()
				.into_option()
				.unwrap_or((0, 0));
			let (ly, hy) = nodes
				.iter()
				.map(|n| coords[*n].y)
				.minmax()
				.into_option()
				.unwrap_or((0, 0));
			if hx - lx > 1 || hy - ly > 1 {
				return Err(Error::SolutionCheckFailed(format!(
					"edge-{edge} spans more than one island per axis"
				)));
			}
			recomputed += graph.edge_weight(edge) * (hx - lx + hy - ly) as f64;
		}
		if (recomputed - objective).abs() > 1e-6 {
			return Err(Error::SolutionCheckFailed(format!(
				"objective {objective} differs from recomputed span cost {recomputed}"
			)));
		}

		for node in sorted_keys(&self.fixed_nodes) {
			let want = self.fixed_nodes[&node];
			if coords[node] != want {
				return Err(Error::SolutionCheckFailed(format!(
					"node-{node} placed at {} instead of {want}",
					coords[node]
				)));
			}
		}
		Ok(sizes)
	}
}

pub(crate) fn partition(
	graph: &HyperGraph,
	fixed_nodes: &HashM<usize, usize>,
	config: &Config,
) -> Result<PartitionResult> {
	let [x, y] = config.exact.grid;
	let dim = GridDim::new(x, y);
	let fixed = fixed_coords(fixed_nodes, dim)?;
	let mut exact =
		ExactGridPartitioner::from_imbalance(graph, dim, &config.partition.imbalance_factors)?
			.with_fixed_nodes(fixed)?
			.with_decision_limit(config.exact.decision_limit);
	if let Some(hint) = heuristic_hint(graph, fixed_nodes, dim, config) {
		exact = exact.with_hint(hint);
	}
	exact.solve()
}

/// Maps fixed island indices to grid coordinates.
pub(crate) fn fixed_coords(
	fixed_nodes: &HashM<usize, usize>,
	dim: GridDim,
) -> Result<HashM<usize, Coord>> {
	let mut fixed = HashM::default();
	for node in sorted_keys(fixed_nodes) {
		let island = fixed_nodes[&node];
		if island >= dim.island_num() {
			return Err(Error::InvalidConfig(format!(
				"Node-{node} fixed to island {island} of a {}x{} grid",
				dim.x, dim.y
			)));
		}
		fixed.insert(node, dim.coord_of(island));
	}
	Ok(fixed)
}

/// Greedy placement plus refinement passes with one block per island, used
/// to seed the exact search. None when the heuristic finds no legal placement.
pub(crate) fn heuristic_hint(
	graph: &HyperGraph,
	fixed_nodes: &HashM<usize, usize>,
	dim: GridDim,
	config: &Config,
) -> Option<Vec<usize>> {
	let p = &config.partition;
	let attempt = || -> Result<Vec<usize>> {
		let mut base =
			LocalSearchPartitioner::new(graph, dim.island_num(), &p.imbalance_factors, p.seed)?
				.with_fixed_nodes(fixed_nodes.clone())?;
		base.initial_partition(config.refine.extreme_large_ratio)?;
		base.edge_based_refinement();
		base.vertex_based_refinement();
		Ok(base.node2block().to_vec())
	};
	match attempt() {
		Ok(part) => Some(part),
		Err(e) => {
			debug!("No heuristic start for the exact solve: {e:?}");
			None
		},
	}
}
