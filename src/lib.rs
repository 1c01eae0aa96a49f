use std::{
	fs::File,
	io::BufReader,
	path::{Path, PathBuf},
};

use clap::Parser;
use config::Config;
use grid::GridDim;
use hypergraph::{hmetis, HyperGraph};
use log::info;
use partition::{InitialStrategy, PartitionStrategy};
use report::PartitionReport;
use util::HashM;

pub mod coarsen;
pub mod config;
pub mod grid;
pub mod hier_graph;
pub mod hypergraph;
pub mod partition;
pub mod report;
pub mod solver;
pub mod weights;

pub mod util;


pub use config::dump_cfg_template;

#[derive(Debug)]
pub enum Error {
	SerializationError(serde_json::Error),
	IOError(std::io::Error),
	TomlDeError(toml::de::Error),
	TomlSerError(toml::ser::Error),
	/// A cluster names a node id outside the parent graph.
	ClusterOutOfRange(usize),
	NodeInMultipleClusters(usize),
	NodeNotClustered(usize),
	/// Parents fixed to different blocks were merged into this child node.
	ConflictingFixedNodes(usize),
	FixedNodesViolateBalance,
	/// No block can take this node without breaking the balance.
	NoLegalBlock(usize),
	BalanceViolation,
	UnassignedParentNode(usize),
	GridTooLarge,
	SolverFailed(solver::Status),
	SolutionCheckFailed(String),
	Parse(String),
	InvalidConfig(String),
}

impl From<serde_json::Error> for Error {
	fn from(value: serde_json::Error) -> Self {
		Self::SerializationError(value)
	}
}

impl From<std::io::Error> for Error {
	fn from(value: std::io::Error) -> Self {
		Self::IOError(value)
	}
}

impl From<toml::de::Error> for Error {
	fn from(value: toml::de::Error) -> Self {
		Self::TomlDeError(value)
	}
}

impl From<toml::ser::Error> for Error {
	fn from(value: toml::ser::Error) -> Self {
		Self::TomlSerError(value)
	}
}

pub type Result<T> = std::result::Result<T, Error>;

/// Multilevel hypergraph partitioner onto a small grid of islands
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
	/// Input hypergraph in hMETIS format.
	#[arg(short, long, required_unless_present = "dump_cfg")]
	pub input_file: Option<PathBuf>,

	/// TOML config. Defaults are used when absent.
	#[arg(short, long)]
	pub config: Option<PathBuf>,

	/// JSON object mapping node ids to their fixed block.
	#[arg(short, long)]
	pub fixed_file: Option<PathBuf>,

	/// Where to write the JSON result. Printed to stdout when absent.
	#[arg(short, long)]
	pub output_file: Option<PathBuf>,

	/// Dump a template cfg/islandpart_template.toml.
	#[arg(short, long)]
	pub dump_cfg: bool,

	/// Debug level logging.
	#[arg(short, long)]
	pub verbose: bool,
}

pub fn read_fixed_nodes<P: AsRef<Path>>(path: P) -> Result<HashM<usize, usize>> {
	let reader = BufReader::new(File::open(path)?);
	Ok(serde_json::from_reader(reader)?)
}

fn load_config(args: &Args) -> Result<Config> {
	let config = match &args.config {
		Some(path) => Config::load(path)?,
		None => Config::default(),
	};
	config.validate()?;
	Ok(config)
}

/// Reads the hypergraph, partitions it and returns the result as JSON.
pub fn run_flow(args: Args) -> Result<String> {
	let config = load_config(&args)?;
	let Some(input_file) = &args.input_file else {
		return Err(Error::InvalidConfig("no input file given".to_owned()));
	};
	let graph = hmetis::read_hmetis(
		input_file,
		config.graph.node_weight_factor.clone(),
		config.graph.edge_weight_factor.clone(),
	)?;
	let fixed_nodes = match &args.fixed_file {
		Some(path) => read_fixed_nodes(path)?,
		None => HashM::default(),
	};
	info!("Read {}", input_file.display());
	info!("\n{}", graph.graph_info(config.partition.verbose));

	let result = partition::partition(&graph, &fixed_nodes, &config)?;
	info!("\n{}", report_of(&graph, &result.part, &config));

	let json = serde_json::to_string(&result)?;
	if let Some(path) = &args.output_file {
		std::fs::write(path, &json)?;
		info!("Wrote {}", path.display());
	}
	Ok(json)
}

fn report_of(graph: &HyperGraph, part: &[usize], config: &Config) -> PartitionReport {
	let p = &config.partition;
	match (p.strategy, p.initial) {
		(PartitionStrategy::Exact, _) | (PartitionStrategy::MultiLevel, InitialStrategy::Exact) => {
			let [x, y] = config.exact.grid;
			PartitionReport::for_grid(graph, part, GridDim::new(x, y))
		},
		_ => PartitionReport::new(graph, part),
	}
}
