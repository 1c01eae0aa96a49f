use float_cmp::assert_approx_eq;
use itertools::Itertools;

use crate::{
	coarsen::{coarsen, CoarsenScheme},
	config::{Config, ConfigCoarsen},
	grid::GridDim,
	hier_graph::HierarchicalHyperGraph,
	hypergraph::HyperGraph,
	partition::{self, exact::ExactGridPartitioner, InitialStrategy, PartitionStrategy},
	solver::Status,
	util::{fixed_map, HashS},
	Error,
};

/// Six unit nodes, pairs (0,1) (2,3) (4,5) each joined by one edge.
fn three_pairs() -> HyperGraph {
	let mut g = HyperGraph::new(1, 1);
	for _ in 0..6 {
		g.add_node(vec![1.0]);
	}
	for a in [0, 2, 4] {
		g.add_edge([a, a + 1], vec![1.0]);
	}
	g
}

fn ring(n: usize) -> HyperGraph {
	let mut g = HyperGraph::new(1, 1);
	for _ in 0..n {
		g.add_node(vec![1.0]);
	}
	for i in 0..n {
		g.add_edge([i, (i + 1) % n], vec![1.0]);
	}
	g
}

fn fm_config(imbalance: f64) -> Config {
	let mut config = Config::default();
	config.partition.strategy = PartitionStrategy::Fm;
	config.partition.imbalance_factors = vec![imbalance];
	config
}

#[test]
fn pairs_stay_together_with_room_for_four() {
	let g = three_pairs();
	let result = partition::partition(&g, &fixed_map([]), &fm_config(1.0 / 6.0)).unwrap();
	assert_approx_eq!(f64, result.cut_size, 0.0);
	for a in [0, 2, 4] {
		assert_eq!(result.part[a], result.part[a + 1]);
	}
}

#[test]
fn perfect_three_three_split_cuts_one_pair() {
	let g = three_pairs();
	let result = partition::partition(&g, &fixed_map([]), &fm_config(0.0)).unwrap();
	assert_approx_eq!(f64, result.cut_size, 1.0);
	assert_eq!(result.block_sizes, vec![vec![3.0], vec![3.0]]);
}

#[test]
fn one_node_per_island_on_two_by_two() {
	let mut g = HyperGraph::new(1, 1);
	for _ in 0..4 {
		g.add_node(vec![1.0]);
	}
	g.add_edge(0..4, vec![2.5]);
	let result = ExactGridPartitioner::new(&g, GridDim::new(2, 2), vec![1.0])
		.unwrap()
		.solve()
		.unwrap();
	assert_approx_eq!(f64, result.objective.unwrap(), 5.0);
	assert_eq!(result.coords.iter().sorted().dedup().count(), 4);
	assert!(result.block_sizes.iter().all(|s| s == &vec![1.0]));

	let none = ExactGridPartitioner::new(&g, GridDim::new(2, 2), vec![0.0]).unwrap();
	assert!(matches!(none.solve(), Err(Error::SolverFailed(Status::Infeasible))));
}

#[test]
fn multilevel_with_exact_coarsest_level_fills_the_grid() {
	// Four 12-node rings joined in a chain; each ring fits one island.
	let mut g = HyperGraph::new(1, 1);
	for _ in 0..48 {
		g.add_node(vec![1.0]);
	}
	for r in 0..4 {
		for i in 0..12 {
			g.add_edge([r * 12 + i, r * 12 + (i + 1) % 12], vec![2.0]);
		}
		if r < 3 {
			g.add_edge([r * 12, (r + 1) * 12], vec![1.0]);
		}
	}
	let mut config = Config::default();
	config.partition.strategy = PartitionStrategy::MultiLevel;
	config.partition.initial = InitialStrategy::Exact;
	config.partition.block_num = 4;
	config.partition.imbalance_factors = vec![0.1];
	config.coarsen.stop_node_num = 12;
	config.coarsen.max_node_ratio = 0.1;
	config.exact.grid = [2, 2];
	assert!(config.validate().is_ok());

	let result = partition::partition(&g, &fixed_map([(13, 2)]), &config).unwrap();
	let dim = GridDim::new(2, 2);
	assert_eq!(result.part[13], 2);
	assert_eq!(result.coords.len(), 48);
	for (node, coord) in result.coords.iter().enumerate() {
		assert_eq!(*coord, dim.coord_of(result.part[node]));
	}
	assert!(result.block_sizes.iter().all(|s| s[0] <= 48.0 * 0.35 + 1e-9));
	assert_eq!(result.block_sizes.len(), 4);
}

#[test]
fn hec_shrinks_a_ring() {
	let root = HierarchicalHyperGraph::root(ring(8));
	let config = ConfigCoarsen {
		scheme: CoarsenScheme::Hec,
		..ConfigCoarsen::default()
	};
	let child = coarsen(&root, &HashS::default(), &config, 5).unwrap();
	assert_eq!(child.total_node_weight(), vec![8.0]);
	assert!(child.node_num() < 8);
	assert_eq!(child.hierarchical_level(), 1);
}

#[test]
fn dont_touch_node_stays_alone() {
	let g = ring(9);
	let dont_touch: HashS<usize> = [4].into_iter().collect();
	for scheme in [CoarsenScheme::Ec, CoarsenScheme::Hec, CoarsenScheme::Fc] {
		let config = ConfigCoarsen {
			scheme,
			..ConfigCoarsen::default()
		};
		for seed in 0..4 {
			let root = HierarchicalHyperGraph::root(g.clone());
			let child = coarsen(&root, &dont_touch, &config, seed).unwrap();
			let cluster = child.child_of_parent(4);
			assert_eq!(child.parents_of_node(cluster), &[4], "{scheme:?} seed {seed}");
			assert_eq!(child.weights_of_node(cluster), &[1.0]);
		}
	}
}
