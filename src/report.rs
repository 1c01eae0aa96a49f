use std::fmt;

use itertools::Itertools;
use serde::Serialize;

use crate::{
	grid::{Coord, GridDim},
	hypergraph::HyperGraph,
	weights::{self, Weights},
};

/// `min/max/avg` of a list of values on one line.
pub fn basic_dist_info(values: &[f64]) -> String {
	if values.is_empty() {
		return "n/a".to_owned();
	}
	let min = values.iter().copied().fold(f64::INFINITY, f64::min);
	let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
	let avg = values.iter().sum::<f64>() / values.len() as f64;
	format!("min={min:.2} max={max:.2} avg={avg:.2}")
}

/// Histogram of `values` with `bins` equal-width buckets.
pub fn value_dist_info(values: &[f64], bins: usize) -> String {
	if values.is_empty() || bins == 0 {
		return "n/a".to_owned();
	}
	let min = values.iter().copied().fold(f64::INFINITY, f64::min);
	let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
	let width = (max - min) / bins as f64;
	let mut counts = vec![0usize; bins];
	for v in values {
		let idx = if width > 0.0 {
			(((v - min) / width) as usize).min(bins - 1)
		} else {
			0
		};
		counts[idx] += 1;
	}
	let mut out = basic_dist_info(values);
	for (i, count) in counts.iter().enumerate() {
		if width <= 0.0 && i > 0 {
			break;
		}
		let lo = min + width * i as f64;
		let hi = lo + width;
		out += &format!("\n  [{lo:.2}, {hi:.2}]: {count}");
	}
	out
}

/// Diagnostic view of a finished partition. Only meant for logs.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionReport {
	pub cut_size: f64,
	pub block_sizes: Vec<Weights>,
	pub block_cut_sizes: Vec<Weights>,
	/// Cut weight between each pair of adjacent islands, present for grid results.
	pub boundary_cut_sizes: Vec<(Coord, Coord, f64)>,
}

impl PartitionReport {
	pub fn new(graph: &HyperGraph, part: &[usize]) -> Self {
		Self {
			cut_size: graph.edge_weights_sum(&graph.cut_size(part)),
			block_sizes: graph.block_size(part),
			block_cut_sizes: graph.block_cut_size(part),
			boundary_cut_sizes: vec![],
		}
	}

	/// Same as [`PartitionReport::new`] plus the per-boundary distribution, with
	/// block ids interpreted as island indices of `dim`.
	pub fn for_grid(graph: &HyperGraph, part: &[usize], dim: GridDim) -> Self {
		let mut report = Self::new(graph, part);
		let mut boundaries = vec![];
		for a in dim.coords() {
			for b in dim.coords() {
				if a < b && a.manhattan_dist(&b) == 1 {
					boundaries.push((a, b, 0.0));
				}
			}
		}
		for edge in 0..graph.edge_num() {
			let islands = graph
				.nodes_of_edge(edge)
				.iter()
				.map(|n| dim.coord_of(part[*n]))
				.sorted()
				.dedup()
				.collect_vec();
			if islands.len() < 2 {
				continue;
			}
			let w = graph.edge_weight(edge);
			for (a, b, total) in boundaries.iter_mut() {
				if islands.contains(a) && islands.contains(b) {
					*total += w;
				}
			}
		}
		report.boundary_cut_sizes = boundaries;
		report
	}

	pub fn total_block_weight(&self) -> Weights {
		let dim = self.block_sizes.first().map(|b| b.len()).unwrap_or(0);
		self.block_sizes
			.iter()
			.fold(weights::zeros(dim), |acc, b| weights::add(&acc, b))
	}
}

impl fmt::Display for PartitionReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "Partition quality:")?;
		writeln!(f, "  Cut size: {:.3}", self.cut_size)?;
		for (block, (size, cut)) in self
			.block_sizes
			.iter()
			.zip(self.block_cut_sizes.iter())
			.enumerate()
		{
			writeln!(f, "  Block-{block}: size={size:?} cut={cut:?}")?;
		}
		for (a, b, w) in &self.boundary_cut_sizes {
			writeln!(f, "  Boundary {a}-{b}: {w:.3}")?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use float_cmp::assert_approx_eq;

	#[test]
	fn distributions() {
		assert_eq!(basic_dist_info(&[]), "n/a");
		assert_eq!(basic_dist_info(&[1.0, 3.0]), "min=1.00 max=3.00 avg=2.00");
		let hist = value_dist_info(&[0.0, 1.0, 2.0, 3.0], 2);
		assert!(hist.contains("[0.00, 1.50]: 2"));
		assert!(hist.contains("[1.50, 3.00]: 2"));
		let flat = value_dist_info(&[2.0, 2.0], 4);
		assert_eq!(flat.lines().count(), 2);
	}

	#[test]
	fn grid_boundaries() {
		let mut g = HyperGraph::new(1, 1);
		for _ in 0..4 {
			g.add_node(vec![1.0]);
		}
		g.add_edge([0, 1], vec![2.0]);
		g.add_edge([0, 3], vec![1.0]);
		let dim = GridDim::new(2, 2);
		let report = PartitionReport::for_grid(&g, &[0, 1, 2, 3], dim);
		assert_approx_eq!(f64, report.cut_size, 3.0);
		assert_eq!(report.boundary_cut_sizes.len(), 4);
		let total: f64 = report.boundary_cut_sizes.iter().map(|b| b.2).sum();
		// Island 0 and 3 are diagonal, so only the 0-1 edge lands on a boundary.
		assert_approx_eq!(f64, total, 2.0);
		assert_eq!(report.total_block_weight(), vec![4.0]);
		assert!(format!("{report}").contains("Boundary"));
	}
}
