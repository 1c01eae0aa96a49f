use itertools::Itertools;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
	coarsen::{coarsen, CoarsenScheme},
	config::{Config, ConfigRefine},
	hier_graph::HierarchicalHyperGraph,
	hypergraph::{HyperGraph, UNASSIGNED},
	partition::{
		self, fm::FmBipartitioner, multilevel::MultiLevelPartitioner, LocalSearch,
		LocalSearchPartitioner, PartitionStrategy,
	},
	util::{fixed_map, HashS},
	weights,
};

/// Random hypergraph with integer node weights in 1..=3 over two dimensions
/// and edges of 2 to 4 distinct nodes.
fn random_graph(node_num: usize, edge_num: usize, seed: u64) -> HyperGraph {
	let mut rng = StdRng::seed_from_u64(seed);
	let mut g = HyperGraph::new(2, 1);
	for _ in 0..node_num {
		let w = vec![rng.random_range(1..=3) as f64, rng.random_range(1..=3) as f64];
		g.add_node(w);
	}
	let mut added = 0;
	while added < edge_num {
		let degree = rng.random_range(2..=4);
		let nodes = (0..degree)
			.map(|_| rng.random_range(0..node_num))
			.unique()
			.collect_vec();
		if nodes.len() < 2 {
			continue;
		}
		g.add_edge(nodes, vec![rng.random_range(1..=2) as f64]);
		added += 1;
	}
	g
}

fn config(strategy: PartitionStrategy, scheme: CoarsenScheme) -> Config {
	let mut config = Config::default();
	config.partition.strategy = strategy;
	config.partition.imbalance_factors = vec![0.1];
	config.coarsen.scheme = scheme;
	config.coarsen.stop_node_num = 12;
	config.coarsen.max_node_ratio = 0.05;
	config
}

#[test]
fn every_block_respects_the_upper_bound() {
	for seed in 0..3 {
		let g = random_graph(60, 90, seed);
		let total = g.total_node_weight();
		let upper = weights::mul_scalar(&total, 0.6 + 1e-9);
		for strategy in [PartitionStrategy::Fm, PartitionStrategy::MultiLevel] {
			let result =
				partition::partition(&g, &fixed_map([]), &config(strategy, CoarsenScheme::Fc))
					.unwrap();
			assert_eq!(result.part.len(), 60);
			for size in &result.block_sizes {
				assert!(weights::less_eq(size, &upper), "{strategy:?} {size:?}");
			}
			assert_eq!(g.block_size(&result.part), result.block_sizes);
		}
	}
}

#[test]
fn fixed_nodes_keep_their_block() {
	let g = random_graph(50, 80, 11);
	let fixed = fixed_map([(3, 1), (7, 0), (20, 1), (41, 0)]);
	for scheme in [CoarsenScheme::Ec, CoarsenScheme::Hec, CoarsenScheme::Fc] {
		for strategy in [PartitionStrategy::Fm, PartitionStrategy::MultiLevel] {
			let result = partition::partition(&g, &fixed, &config(strategy, scheme)).unwrap();
			for (node, block) in &fixed {
				assert_eq!(result.part[*node], *block, "{strategy:?} {scheme:?}");
			}
		}
	}
}

#[test]
fn coarsening_conserves_nodes_and_weight() {
	let g = random_graph(40, 70, 3);
	let root = HierarchicalHyperGraph::root(g.clone());
	let dont_touch: HashS<usize> = [0, 9].into_iter().collect();
	for scheme in [CoarsenScheme::Ec, CoarsenScheme::Hec, CoarsenScheme::Fc] {
		let cfg = config(PartitionStrategy::MultiLevel, scheme).coarsen;
		let child = coarsen(&root, &dont_touch, &cfg, 17).unwrap();
		let mut seen = vec![0; g.node_num()];
		for node in 0..child.node_num() {
			let mut sum = weights::zeros(2);
			for &parent in child.parents_of_node(node) {
				seen[parent] += 1;
				weights::accu(&mut sum, g.weights_of_node(parent));
				assert_eq!(child.child_of_parent(parent), node);
			}
			assert_eq!(child.weights_of_node(node), sum.as_slice());
		}
		assert!(seen.iter().all(|c| *c == 1), "{scheme:?}");
		assert_eq!(child.total_node_weight(), g.total_node_weight());
		for node in [0, 9] {
			assert_eq!(child.parents_of_node(child.child_of_parent(node)), &[node]);
		}
	}
}

#[test]
fn projection_assigns_every_root_node() {
	let g = random_graph(80, 120, 5);
	let fixed = fixed_map([]);
	let config = config(PartitionStrategy::MultiLevel, CoarsenScheme::Fc);
	let hierarchy = MultiLevelPartitioner::new(&g, &fixed, &config)
		.build_hierarchy(config.partition.seed)
		.unwrap();
	let top = hierarchy.len() - 1;
	assert!(top > 0);
	let coarse_part = (0..hierarchy.coarsest().node_num()).map(|n| n % 2).collect_vec();
	let part = hierarchy.project_to_root(top, &coarse_part).unwrap();
	assert_eq!(part.len(), 80);
	assert!(part.iter().all(|b| *b != UNASSIGNED));
	for (node, block) in coarse_part.iter().enumerate() {
		for root_node in hierarchy.root_parents_of_node(top, node) {
			assert_eq!(part[root_node], *block);
		}
	}
}

#[test]
fn fm_passes_never_raise_the_cut() {
	let g = random_graph(60, 100, 8);
	let refine = ConfigRefine {
		max_pass_num: 1,
		..ConfigRefine::default()
	};
	let base = LocalSearchPartitioner::new(&g, 2, &[0.1], 4).unwrap();
	let mut fm = FmBipartitioner::new(base, &refine).unwrap().bounded(&refine);
	fm.initial_partition().unwrap();
	let mut last = fm.base().cut_size();
	for _ in 0..10 {
		fm.refine();
		let cut = fm.base().cut_size();
		assert!(cut <= last + 1e-9);
		last = cut;
	}
	assert!(fm.base().check_partition_states());
	assert!(fm.base().check_size_constraint());
}

#[test]
fn same_seed_same_partition() {
	let g = random_graph(70, 110, 21);
	for strategy in [PartitionStrategy::Fm, PartitionStrategy::MultiLevel] {
		let mut config = config(strategy, CoarsenScheme::Ec);
		config.partition.start_num = 2;
		let a = partition::partition(&g, &fixed_map([]), &config).unwrap();
		let b = partition::partition(&g, &fixed_map([]), &config).unwrap();
		assert_eq!(a.part, b.part);
		assert_eq!(a.cut_size, b.cut_size);
	}
}
