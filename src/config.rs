use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
	coarsen::CoarsenScheme,
	partition::{exact::DEFAULT_DECISION_LIMIT, InitialStrategy, PartitionStrategy},
	weights::Weights,
	Error, Result,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPartition {
	pub block_num: usize,
	pub seed: u64,
	/// One entry per node weight dimension. A single entry applies to every dimension.
	pub imbalance_factors: Vec<f64>,
	pub strategy: PartitionStrategy,
	pub verbose: bool,
	/// Seeded restarts of the multi-level flow; the lowest cut is kept.
	pub start_num: usize,
	/// How the multi-level flow partitions its coarsest level.
	pub initial: InitialStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigGraph {
	/// Scales each node weight dimension. Its length is the node weight dimension.
	pub node_weight_factor: Weights,
	/// Scales each edge weight dimension. Its length is the edge weight dimension.
	pub edge_weight_factor: Weights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigCoarsen {
	pub scheme: CoarsenScheme,
	/// Coarsening stops once a level has at most this many nodes.
	pub stop_node_num: usize,
	/// First-choice matching stops once `nodes / clusters` exceeds this.
	pub stop_ratio: f64,
	/// Nodes heavier than this share of the total weight are never merged.
	pub max_node_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigRefine {
	pub max_pass_num: usize,
	pub pass_early_exit_ratio: f64,
	pub extreme_large_ratio: f64,
	pub edge_refinement: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigExact {
	pub grid: [usize; 2],
	/// Branching decisions before the solver settles for its best solution.
	pub decision_limit: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub graph: ConfigGraph,
	pub partition: ConfigPartition,
	pub coarsen: ConfigCoarsen,
	pub refine: ConfigRefine,
	pub exact: ConfigExact,
}

impl Default for ConfigPartition {
	fn default() -> Self {
		Self {
			block_num: 2,
			seed: 999,
			imbalance_factors: vec![0.01],
			strategy: PartitionStrategy::MultiLevel,
			verbose: false,
			start_num: 1,
			initial: InitialStrategy::Fm,
		}
	}
}

impl Default for ConfigGraph {
	fn default() -> Self {
		Self {
			node_weight_factor: vec![1.0],
			edge_weight_factor: vec![1.0],
		}
	}
}

impl Default for ConfigCoarsen {
	fn default() -> Self {
		Self {
			scheme: CoarsenScheme::Fc,
			stop_node_num: 80,
			stop_ratio: 2.0,
			max_node_ratio: 1.0,
		}
	}
}

impl Default for ConfigRefine {
	fn default() -> Self {
		Self {
			max_pass_num: 3,
			pass_early_exit_ratio: 0.25,
			extreme_large_ratio: 0.1,
			edge_refinement: true,
		}
	}
}

impl Default for ConfigExact {
	fn default() -> Self {
		Self {
			grid: [2, 2],
			decision_limit: Some(DEFAULT_DECISION_LIMIT),
		}
	}
}

impl Config {
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
		let text = std::fs::read_to_string(path)?;
		Ok(toml::from_str(&text)?)
	}

	pub fn to_toml(&self) -> Result<String> {
		Ok(toml::to_string(self)?)
	}

	pub fn validate(&self) -> Result<()> {
		let bad = |msg: String| Err(Error::InvalidConfig(msg));
		let g = &self.graph;
		if g.node_weight_factor.is_empty() || g.edge_weight_factor.is_empty() {
			return bad("weight factors need at least one dimension".to_owned());
		}
		let p = &self.partition;
		if p.block_num < 2 {
			return bad(format!("block_num must be at least 2, got {}", p.block_num));
		}
		if p.imbalance_factors.is_empty() || p.imbalance_factors.iter().any(|f| *f < 0.0) {
			return bad("imbalance_factors must be non-empty and non-negative".to_owned());
		}
		if p.start_num == 0 {
			return bad("start_num must be at least 1".to_owned());
		}
		let c = &self.coarsen;
		if c.stop_ratio <= 1.0 {
			return bad(format!("stop_ratio must exceed 1, got {}", c.stop_ratio));
		}
		if c.max_node_ratio <= 0.0 {
			return bad(format!("max_node_ratio must be positive, got {}", c.max_node_ratio));
		}
		let r = &self.refine;
		if r.max_pass_num == 0 {
			return bad("max_pass_num must be at least 1".to_owned());
		}
		if r.pass_early_exit_ratio <= 0.0 || r.pass_early_exit_ratio >= 1.0 {
			return bad(format!(
				"pass_early_exit_ratio must lie in (0, 1), got {}",
				r.pass_early_exit_ratio
			));
		}
		let [x, y] = self.exact.grid;
		if x == 0 || y == 0 {
			return bad("grid dimensions must be positive".to_owned());
		}
		if p.strategy == PartitionStrategy::MultiLevel
			&& p.initial == InitialStrategy::Exact
			&& p.block_num != x * y
		{
			return bad(format!(
				"exact initial partitioning needs block_num == {}, got {}",
				x * y,
				p.block_num
			));
		}
		Ok(())
	}
}

/// Writes the defaults to `cfg/islandpart_template.toml`.
pub fn dump_cfg_template() -> Result<()> {
	let cfg = Config::default().to_toml()?;
	std::fs::create_dir_all("cfg")?;
	std::fs::write("cfg/islandpart_template.toml", cfg)?;
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn defaults_validate() {
		assert!(Config::default().validate().is_ok());
	}

	#[test]
	fn partial_toml_falls_back_to_defaults() {
		let cfg: Config = toml::from_str(
			r#"
			[partition]
			seed = 7
			strategy = "Fm"

			[coarsen]
			scheme = "Hec"
			"#,
		)
		.unwrap();
		assert_eq!(cfg.partition.seed, 7);
		assert_eq!(cfg.partition.strategy, PartitionStrategy::Fm);
		assert_eq!(cfg.partition.block_num, 2);
		assert_eq!(cfg.coarsen.scheme, CoarsenScheme::Hec);
		assert_eq!(cfg.coarsen.stop_node_num, 80);
		assert_eq!(cfg.refine.max_pass_num, 3);
		assert_eq!(cfg.exact.grid, [2, 2]);
		assert_eq!(cfg.partition.initial, InitialStrategy::Fm);
		assert_eq!(cfg.graph.node_weight_factor, vec![1.0]);
	}

	#[test]
	fn weight_factors_and_initial_strategy_parse() {
		let cfg: Config = toml::from_str(
			r#"
			[graph]
			node_weight_factor = [1.0, 0.5]

			[partition]
			block_num = 4
			initial = "Exact"
			"#,
		)
		.unwrap();
		assert_eq!(cfg.graph.node_weight_factor, vec![1.0, 0.5]);
		assert_eq!(cfg.graph.edge_weight_factor, vec![1.0]);
		assert_eq!(cfg.partition.initial, InitialStrategy::Exact);
		assert!(cfg.validate().is_ok());
	}

	#[test]
	fn template_parses_back() {
		let text = Config::default().to_toml().unwrap();
		let cfg: Config = toml::from_str(&text).unwrap();
		assert_eq!(cfg.partition.imbalance_factors, vec![0.01]);
		assert_eq!(cfg.exact.decision_limit, Some(DEFAULT_DECISION_LIMIT));
	}

	#[test]
	fn rejects_bad_values() {
		let mut cfg = Config::default();
		cfg.partition.block_num = 1;
		assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

		let mut cfg = Config::default();
		cfg.coarsen.stop_ratio = 1.0;
		assert!(cfg.validate().is_err());

		let mut cfg = Config::default();
		cfg.refine.pass_early_exit_ratio = 1.5;
		assert!(cfg.validate().is_err());

		let mut cfg = Config::default();
		cfg.partition.imbalance_factors = vec![];
		assert!(cfg.validate().is_err());

		let mut cfg = Config::default();
		cfg.graph.node_weight_factor = vec![];
		assert!(cfg.validate().is_err());

		let mut cfg = Config::default();
		cfg.partition.initial = InitialStrategy::Exact;
		cfg.partition.block_num = 3;
		assert!(cfg.validate().is_err());
	}
}
