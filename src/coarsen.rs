//! One coarsening step: cluster the nodes of a level and build the next,
//! coarser level from the clusters.
//!
//! All schemes share the same contract. Every node ends up in exactly one
//! cluster, don't-touch nodes always form their own singleton clusters and
//! are emitted last, and the visiting order only depends on `seed`.

use std::cmp::Ordering;

use itertools::Itertools;
use log::debug;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
	config::ConfigCoarsen,
	hier_graph::HierarchicalHyperGraph,
	hypergraph::{HyperGraph, UNASSIGNED},
	util::{hash_map, sorted_keys, HashM, HashS},
	Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoarsenScheme {
	/// Edge coarsening, pairwise matching.
	Ec,
	/// Hyperedge coarsening, whole edges at once.
	Hec,
	/// First-choice coarsening, nodes may join existing clusters.
	Fc,
}

type ClusterFn = fn(&HyperGraph, &HashS<usize>, &ConfigCoarsen, u64) -> Vec<Vec<usize>>;

const SCHEMES: &[(CoarsenScheme, &str, ClusterFn)] = &[
	(CoarsenScheme::Ec, "EC", edge_coarsening),
	(CoarsenScheme::Hec, "HEC", hyperedge_coarsening),
	(CoarsenScheme::Fc, "FC", first_choice_coarsening),
];

/// Builds the next coarser level of `graph` with the scheme selected in `config`.
pub fn coarsen(
	graph: &HierarchicalHyperGraph,
	dont_touch: &HashS<usize>,
	config: &ConfigCoarsen,
	seed: u64,
) -> Result<HierarchicalHyperGraph> {
	let (_, name, func) = SCHEMES
		.iter()
		.find(|(scheme, _, _)| *scheme == config.scheme)
		.copied()
		.unwrap_or(SCHEMES[2]);
	let groups = func(graph.graph(), dont_touch, config, seed);
	debug!(
		"{name} coarsening level-{}: {} nodes -> {} clusters",
		graph.hierarchical_level(),
		graph.node_num(),
		groups.len()
	);
	graph.create_clustered_child_graph(&groups)
}

fn max_cluster_weight(graph: &HyperGraph, config: &ConfigCoarsen) -> f64 {
	graph.node_weights_sum(&graph.total_node_weight()) * config.max_node_ratio
}

fn shuffled_candidates<F>(graph: &HyperGraph, ignored: F, seed: u64) -> Vec<usize>
where
	F: Fn(usize) -> bool,
{
	let mut rng = StdRng::seed_from_u64(seed);
	let mut nodes = (0..graph.node_num()).filter(|n| !ignored(*n)).collect_vec();
	nodes.shuffle(&mut rng);
	nodes
}

/// Connectivity score of every eligible neighbor: sum of `w / (degree - 1)`
/// over shared edges.
fn neighbor_scores<F>(graph: &HyperGraph, node: usize, eligible: F) -> HashM<usize, f64>
where
	F: Fn(usize) -> bool,
{
	let mut scores = hash_map();
	for &edge in graph.edges_of_node(node) {
		let score = graph.edge_weight(edge) / (graph.degree_of_edge(edge) - 1) as f64;
		for &nb in graph.nodes_of_edge(edge) {
			if nb != node && eligible(nb) {
				*scores.entry(nb).or_insert(0.0) += score;
			}
		}
	}
	scores
}

/// Highest scoring neighbor accepted by `accept`; lowest id wins ties.
/// Neighbors scoring zero are never chosen.
fn best_neighbor<F>(scores: &HashM<usize, f64>, accept: F) -> Option<usize>
where
	F: Fn(usize) -> bool,
{
	let mut best: Option<(usize, f64)> = None;
	for nb in sorted_keys(scores) {
		if !accept(nb) {
			continue;
		}
		let score = scores[&nb];
		if score > best.map_or(0.0, |(_, s)| s) {
			best = Some((nb, score));
		}
	}
	best.map(|(nb, _)| nb)
}

/// Remaining nodes become singletons; don't-touch nodes go last.
fn push_singletons(groups: &mut Vec<Vec<usize>>, clustered: &[bool], dont_touch: &HashS<usize>) {
	let (late, early): (Vec<usize>, Vec<usize>) = (0..clustered.len())
		.filter(|n| !clustered[*n])
		.partition(|n| dont_touch.contains(n));
	groups.extend(early.into_iter().map(|n| vec![n]));
	groups.extend(late.into_iter().map(|n| vec![n]));
}

pub(crate) fn edge_coarsening(
	graph: &HyperGraph,
	dont_touch: &HashS<usize>,
	config: &ConfigCoarsen,
	seed: u64,
) -> Vec<Vec<usize>> {
	let max_weight = max_cluster_weight(graph, config);
	let ignored = |n: usize| dont_touch.contains(&n) || graph.node_weight(n) > max_weight;

	let mut matched = vec![false; graph.node_num()];
	let mut groups = vec![];
	for node in shuffled_candidates(graph, ignored, seed) {
		if matched[node] {
			continue;
		}
		matched[node] = true;
		let scores = neighbor_scores(graph, node, |nb| !matched[nb] && !ignored(nb));
		match best_neighbor(&scores, |_| true) {
			Some(nb) => {
				matched[nb] = true;
				groups.push(vec![node, nb]);
			},
			None => groups.push(vec![node]),
		}
	}
	push_singletons(&mut groups, &matched, dont_touch);
	groups
}

pub(crate) fn hyperedge_coarsening(
	graph: &HyperGraph,
	dont_touch: &HashS<usize>,
	_config: &ConfigCoarsen,
	_seed: u64,
) -> Vec<Vec<usize>> {
	let edges = (0..graph.edge_num())
		.sorted_by(|a, b| {
			match graph.edge_weight(*b).total_cmp(&graph.edge_weight(*a)) {
				Ordering::Equal => graph.degree_of_edge(*a).cmp(&graph.degree_of_edge(*b)),
				ord => ord,
			}
		})
		.collect_vec();

	let mut matched = vec![false; graph.node_num()];
	let mut groups = vec![];
	let free = |n: &usize, matched: &[bool]| !matched[*n] && !dont_touch.contains(n);

	for &edge in &edges {
		let nodes = graph.nodes_of_edge(edge);
		if nodes.iter().all(|n| free(n, &matched)) {
			for &n in nodes {
				matched[n] = true;
			}
			groups.push(nodes.to_vec());
		}
	}

	for &edge in &edges {
		let group = graph
			.nodes_of_edge(edge)
			.iter()
			.copied()
			.filter(|n| free(n, &matched))
			.collect_vec();
		if !group.is_empty() {
			for &n in &group {
				matched[n] = true;
			}
			groups.push(group);
		}
	}

	push_singletons(&mut groups, &matched, dont_touch);
	groups
}

pub(crate) fn first_choice_coarsening(
	graph: &HyperGraph,
	dont_touch: &HashS<usize>,
	config: &ConfigCoarsen,
	seed: u64,
) -> Vec<Vec<usize>> {
	let node_num = graph.node_num();
	let max_weight = max_cluster_weight(graph, config);
	let ignored = |n: usize| dont_touch.contains(&n) || graph.node_weight(n) > max_weight;

	let mut node2cluster = vec![UNASSIGNED; node_num];
	let mut clusters: Vec<Vec<usize>> = vec![];
	let mut cluster_weights: Vec<f64> = vec![];
	let mut matched_num = 0;

	for node in shuffled_candidates(graph, ignored, seed) {
		if node2cluster[node] != UNASSIGNED {
			continue;
		}
		let scores = neighbor_scores(graph, node, |nb| !ignored(nb));

		let cluster_num = node_num - matched_num + clusters.len();
		if node_num as f64 / cluster_num as f64 > config.stop_ratio {
			break;
		}

		let node_weight = graph.node_weight(node);
		let best = best_neighbor(&scores, |nb| {
			let weight = match node2cluster[nb] {
				UNASSIGNED => graph.node_weight(nb),
				cluster => cluster_weights[cluster],
			};
			weight + node_weight <= max_weight
		});
		let Some(nb) = best else {
			continue;
		};

		match node2cluster[nb] {
			UNASSIGNED => {
				node2cluster[node] = clusters.len();
				node2cluster[nb] = clusters.len();
				clusters.push(vec![node, nb]);
				cluster_weights.push(node_weight + graph.node_weight(nb));
				matched_num += 2;
			},
			cluster => {
				node2cluster[node] = cluster;
				clusters[cluster].push(node);
				cluster_weights[cluster] += node_weight;
				matched_num += 1;
			},
		}
	}

	let clustered = node2cluster.iter().map(|c| *c != UNASSIGNED).collect_vec();
	push_singletons(&mut clusters, &clustered, dont_touch);
	clusters
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::util::hash_set;

	/// Two 4-node cliques joined by a single light edge.
	fn two_cliques() -> HyperGraph {
		let mut g = HyperGraph::new(1, 1);
		for _ in 0..8 {
			g.add_node(vec![1.0]);
		}
		for base in [0, 4] {
			for a in base..base + 4 {
				for b in a + 1..base + 4 {
					g.add_edge([a, b], vec![2.0]);
				}
			}
		}
		g.add_edge([3, 4], vec![1.0]);
		g
	}

	fn check_partition_of_nodes(groups: &[Vec<usize>], node_num: usize) {
		let mut all = groups.iter().flatten().copied().collect_vec();
		all.sort();
		assert_eq!(all, (0..node_num).collect_vec());
	}

	#[test]
	fn every_scheme_clusters_every_node_once() {
		let g = two_cliques();
		let config = ConfigCoarsen::default();
		let none = hash_set();
		for (_, name, func) in SCHEMES {
			let groups = func(&g, &none, &config, 3);
			check_partition_of_nodes(&groups, g.node_num());
			assert!(groups.len() < g.node_num(), "{name} did not shrink the graph");
		}
	}

	#[test]
	fn ec_pairs_nodes() {
		let g = two_cliques();
		let groups = edge_coarsening(&g, &hash_set(), &ConfigCoarsen::default(), 1);
		assert!(groups.iter().all(|c| c.len() <= 2));
		assert_eq!(groups.len(), 4);
	}

	#[test]
	fn hec_prefers_heavy_edges() {
		let g = two_cliques();
		let groups = hyperedge_coarsening(&g, &hash_set(), &ConfigCoarsen::default(), 0);
		// The light bridge edge is visited last, so 3 and 4 never share a cluster.
		assert!(!groups.iter().any(|c| c.contains(&3) && c.contains(&4)));
		assert_eq!(groups[0], vec![0, 1]);
	}

	#[test]
	fn fc_respects_stop_ratio() {
		let g = two_cliques();
		let config = ConfigCoarsen {
			stop_ratio: 1.5,
			..Default::default()
		};
		let groups = first_choice_coarsening(&g, &hash_set(), &config, 7);
		check_partition_of_nodes(&groups, g.node_num());
		// 8 / 1.5 leaves room for at most three merges before the ratio is exceeded.
		assert!(groups.len() >= 5);
	}

	#[test]
	fn oversize_nodes_stay_alone() {
		let mut g = two_cliques();
		g.set_node_weights(0, vec![10.0]);
		let config = ConfigCoarsen {
			max_node_ratio: 0.5,
			..Default::default()
		};
		for func in [edge_coarsening as ClusterFn, first_choice_coarsening] {
			let groups = func(&g, &hash_set(), &config, 5);
			assert!(groups.contains(&vec![0]));
		}
	}

	#[test]
	fn zero_weight_edges_do_not_merge() {
		let mut g = HyperGraph::new(1, 1);
		for _ in 0..4 {
			g.add_node(vec![1.0]);
		}
		g.add_edge([0, 1], vec![0.0]);
		g.add_edge([1, 2], vec![0.0]);
		g.add_edge([2, 3], vec![0.0]);
		let config = ConfigCoarsen::default();
		for func in [edge_coarsening as ClusterFn, first_choice_coarsening] {
			let groups = func(&g, &hash_set(), &config, 9);
			assert!(groups.iter().all(|c| c.len() == 1), "{groups:?}");
			check_partition_of_nodes(&groups, 4);
		}
	}

	#[test]
	fn same_seed_same_clusters() {
		let g = two_cliques();
		let config = ConfigCoarsen::default();
		let a = first_choice_coarsening(&g, &hash_set(), &config, 11);
		let b = first_choice_coarsening(&g, &hash_set(), &config, 11);
		assert_eq!(a, b);
	}

	#[test]
	fn builds_child_level() {
		let root = HierarchicalHyperGraph::root(two_cliques());
		let child = coarsen(&root, &hash_set(), &ConfigCoarsen::default(), 2).unwrap();
		assert_eq!(child.hierarchical_level(), 1);
		assert_eq!(child.total_node_weight(), vec![8.0]);
		assert!(child.node_num() < 8);
	}
}
