//! Plain-text hMETIS adjacency dump.
//!
//! ```text
//! <edge_num> <node_num> [fmt]
//! [edge weights...] <1-based node ids...>   (one line per edge)
//! <node weights...>                         (one line per node, when fmt has node weights)
//! ```
//!
//! `fmt` is `1` (edge weights), `10` (node weights) or `11` (both). Only used
//! for exchanging graphs with external partitioning tools.

use std::{fs, path::Path};

use itertools::Itertools;

use super::HyperGraph;
use crate::{weights::Weights, Error, Result};

fn weight_line(weights: &[f64]) -> String {
	weights.iter().map(|w| format!("{w}")).join(" ")
}

/// Writes `graph` with `fmt` 11. Weights use the shortest text that parses
/// back to the same `f64`.
pub fn to_hmetis_string(graph: &HyperGraph) -> String {
	let mut out = format!("{} {} 11\n", graph.edge_num(), graph.node_num());
	for edge in 0..graph.edge_num() {
		let nodes = graph.nodes_of_edge(edge).iter().map(|n| n + 1).join(" ");
		out.push_str(&format!(
			"{} {nodes}\n",
			weight_line(graph.weights_of_edge(edge))
		));
	}
	for node in 0..graph.node_num() {
		out.push_str(&weight_line(graph.weights_of_node(node)));
		out.push('\n');
	}
	out
}

pub fn save_hmetis<P: AsRef<Path>>(graph: &HyperGraph, path: P) -> Result<()> {
	fs::write(path, to_hmetis_string(graph))?;
	Ok(())
}

pub fn read_hmetis<P: AsRef<Path>>(
	path: P,
	node_weight_factor: Weights,
	edge_weight_factor: Weights,
) -> Result<HyperGraph> {
	let text = fs::read_to_string(path)?;
	parse_hmetis(&text, node_weight_factor, edge_weight_factor)
}

fn parse_tokens<T: std::str::FromStr>(line: &str, line_no: usize) -> Result<Vec<T>> {
	line.split_whitespace()
		.map(|tok| {
			tok.parse::<T>()
				.map_err(|_| Error::Parse(format!("line {line_no}: bad token '{tok}'")))
		})
		.collect()
}

/// Parses an hMETIS file. Missing weights default to 1.0 in every dimension.
pub fn parse_hmetis(
	text: &str,
	node_weight_factor: Weights,
	edge_weight_factor: Weights,
) -> Result<HyperGraph> {
	let mut graph = HyperGraph::with_factors(node_weight_factor, edge_weight_factor);
	let node_dim = graph.node_weight_dim();
	let edge_dim = graph.edge_weight_dim();

	let mut lines = text
		.lines()
		.enumerate()
		.map(|(i, l)| (i + 1, l.trim()))
		.filter(|(_, l)| !l.is_empty() && !l.starts_with('%'));

	let (line_no, header) = lines
		.next()
		.ok_or_else(|| Error::Parse("empty hMETIS file".to_owned()))?;
	let header = header.split_whitespace().collect_vec();
	if header.len() < 2 {
		return Err(Error::Parse(format!("line {line_no}: malformed header")));
	}
	let edge_num: usize = header[0]
		.parse()
		.map_err(|_| Error::Parse(format!("line {line_no}: bad edge count")))?;
	let node_num: usize = header[1]
		.parse()
		.map_err(|_| Error::Parse(format!("line {line_no}: bad node count")))?;
	let (has_edge_weights, has_node_weights) = match header.get(2).copied() {
		None | Some("0") | Some("00") => (false, false),
		Some("1") | Some("01") => (true, false),
		Some("10") => (false, true),
		Some("11") => (true, true),
		Some(other) => {
			return Err(Error::Parse(format!(
				"line {line_no}: unsupported fmt '{other}'"
			)))
		},
	};

	let mut edges = Vec::with_capacity(edge_num);
	for _ in 0..edge_num {
		let (line_no, line) = lines
			.next()
			.ok_or_else(|| Error::Parse("unexpected end of file in edge section".to_owned()))?;
		let (weights, pins) = if has_edge_weights {
			let tokens = line.split_whitespace().collect_vec();
			if tokens.len() <= edge_dim {
				return Err(Error::Parse(format!("line {line_no}: too few tokens")));
			}
			let weights = parse_tokens::<f64>(&tokens[..edge_dim].join(" "), line_no)?;
			let pins = parse_tokens::<usize>(&tokens[edge_dim..].join(" "), line_no)?;
			(weights, pins)
		} else {
			(vec![1.0; edge_dim], parse_tokens::<usize>(line, line_no)?)
		};
		if pins.iter().any(|p| *p == 0 || *p > node_num) {
			return Err(Error::Parse(format!("line {line_no}: node id out of range")));
		}
		let pins = pins.into_iter().map(|p| p - 1).unique().collect_vec();
		if pins.len() < 2 {
			return Err(Error::Parse(format!(
				"line {line_no}: edge with fewer than two nodes"
			)));
		}
		edges.push((pins, weights));
	}

	for _ in 0..node_num {
		let weights = if has_node_weights {
			let (line_no, line) = lines.next().ok_or_else(|| {
				Error::Parse("unexpected end of file in node section".to_owned())
			})?;
			let weights = parse_tokens::<f64>(line, line_no)?;
			if weights.len() != node_dim {
				return Err(Error::Parse(format!(
					"line {line_no}: expected {node_dim} node weights"
				)));
			}
			weights
		} else {
			vec![1.0; node_dim]
		};
		graph.add_node(weights);
	}
	for (pins, weights) in edges {
		graph.add_edge(pins, weights);
	}
	Ok(graph)
}
