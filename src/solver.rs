//! Small exact solver for 0/1 linear models.
//!
//! Variables are booleans. Constraints are bounded linear sums, exactly-one
//! groups and min/max equalities. [`Model::solve`] runs a depth-first branch
//! and bound with unit propagation to fixpoint after every decision, and
//! returns a proven optimum unless the decision limit is hit.
//!
//! Two things keep the search small. A hint steers the first dive, so the
//! first incumbent is usually a good one. Disjoint at-least-one groups over
//! non-negative objective variables tighten the bound: a group with nothing
//! set yet still costs its cheapest open member.

use std::collections::VecDeque;

use log::debug;

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoolVar(usize);

impl BoolVar {
	pub fn index(&self) -> usize {
		self.0
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	/// Search finished and the solution is optimal.
	Optimal,
	/// Decision limit reached with a solution in hand.
	Feasible,
	/// Search finished without any solution.
	Infeasible,
	/// Decision limit reached before any solution was found.
	Unknown,
}

#[derive(Debug, Clone)]
enum Constraint {
	Linear {
		terms: Vec<(usize, f64)>,
		lo: f64,
		hi: f64,
	},
	MinEquality {
		target: usize,
		vars: Vec<usize>,
	},
	MaxEquality {
		target: usize,
		vars: Vec<usize>,
	},
}

impl Constraint {
	fn vars(&self) -> Vec<usize> {
		match self {
			Constraint::Linear { terms, .. } => terms.iter().map(|(v, _)| *v).collect(),
			Constraint::MinEquality { target, vars } | Constraint::MaxEquality { target, vars } => {
				let mut all = vars.clone();
				all.push(*target);
				all
			},
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct Model {
	var_num: usize,
	constraints: Vec<Constraint>,
	objective: Vec<(usize, f64)>,
	branch_order: Vec<usize>,
	hint: Vec<(usize, bool)>,
	covers: Vec<Vec<usize>>,
}

#[derive(Debug, Clone)]
pub struct Solution {
	pub status: Status,
	pub objective: f64,
	pub decisions: u64,
	values: Vec<bool>,
}

impl Solution {
	pub fn value(&self, var: BoolVar) -> bool {
		self.values[var.0]
	}

	pub fn has_values(&self) -> bool {
		matches!(self.status, Status::Optimal | Status::Feasible)
	}
}

impl Model {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn new_bool_var(&mut self) -> BoolVar {
		self.var_num += 1;
		BoolVar(self.var_num - 1)
	}

	pub fn var_num(&self) -> usize {
		self.var_num
	}

	pub fn constraint_num(&self) -> usize {
		self.constraints.len()
	}

	/// `lo <= sum(coef * var) <= hi`
	pub fn add_linear(&mut self, terms: &[(BoolVar, f64)], lo: f64, hi: f64) {
		let terms = terms.iter().map(|(v, c)| (v.0, *c)).collect();
		self.constraints.push(Constraint::Linear { terms, lo, hi });
	}

	pub fn add_less_or_equal(&mut self, terms: &[(BoolVar, f64)], hi: f64) {
		self.add_linear(terms, f64::NEG_INFINITY, hi);
	}

	pub fn add_greater_or_equal(&mut self, terms: &[(BoolVar, f64)], lo: f64) {
		self.add_linear(terms, lo, f64::INFINITY);
	}

	pub fn add_equality(&mut self, terms: &[(BoolVar, f64)], value: f64) {
		self.add_linear(terms, value, value);
	}

	pub fn add_exactly_one(&mut self, vars: &[BoolVar]) {
		let terms = vars.iter().map(|v| (*v, 1.0)).collect::<Vec<_>>();
		self.add_equality(&terms, 1.0);
	}

	/// `sum(vars) >= 1`. Also feeds the objective bound.
	pub fn add_at_least_one(&mut self, vars: &[BoolVar]) {
		let terms = vars.iter().map(|v| (*v, 1.0)).collect::<Vec<_>>();
		self.add_greater_or_equal(&terms, 1.0);
		self.covers.push(vars.iter().map(|v| v.0).collect());
	}

	pub fn fix(&mut self, var: BoolVar, value: bool) {
		self.add_equality(&[(var, 1.0)], if value { 1.0 } else { 0.0 });
	}

	/// `target == min(vars)`
	pub fn add_min_equality(&mut self, target: BoolVar, vars: &[BoolVar]) {
		assert!(!vars.is_empty());
		self.constraints.push(Constraint::MinEquality {
			target: target.0,
			vars: vars.iter().map(|v| v.0).collect(),
		});
	}

	/// `target == max(vars)`
	pub fn add_max_equality(&mut self, target: BoolVar, vars: &[BoolVar]) {
		assert!(!vars.is_empty());
		self.constraints.push(Constraint::MaxEquality {
			target: target.0,
			vars: vars.iter().map(|v| v.0).collect(),
		});
	}

	pub fn minimize(&mut self, terms: &[(BoolVar, f64)]) {
		self.objective = terms.iter().map(|(v, c)| (v.0, *c)).collect();
	}

	/// Variables branched on first, in this order. The rest follow by index.
	pub fn set_branch_order(&mut self, vars: &[BoolVar]) {
		self.branch_order = vars.iter().map(|v| v.0).collect();
	}

	/// Preferred values, tried first when the search branches on them.
	pub fn set_hint(&mut self, hint: &[(BoolVar, bool)]) {
		self.hint = hint.iter().map(|(v, b)| (v.0, *b)).collect();
	}

	pub fn solve(&self, decision_limit: Option<u64>) -> Solution {
		let mut search = Search::new(self, decision_limit);
		let all = (0..self.constraints.len()).collect::<Vec<_>>();
		if search.propagate(all) {
			search.dfs();
		}
		let decisions = search.decisions;
		let status = match (&search.best, search.aborted) {
			(Some(_), false) => Status::Optimal,
			(Some(_), true) => Status::Feasible,
			(None, false) => Status::Infeasible,
			(None, true) => Status::Unknown,
		};
		debug!(
			"Solver finished: {status:?} after {decisions} decisions ({} vars, {} constraints)",
			self.var_num,
			self.constraints.len()
		);
		match search.best {
			Some((objective, values)) => Solution {
				status,
				objective,
				decisions,
				values,
			},
			None => Solution {
				status,
				objective: f64::INFINITY,
				decisions,
				values: vec![false; self.var_num],
			},
		}
	}
}

struct Search<'m> {
	model: &'m Model,
	var2cons: Vec<Vec<usize>>,
	order: Vec<usize>,
	obj_coef: Vec<f64>,
	hint: Vec<Option<bool>>,
	covers: Vec<Vec<usize>>,
	values: Vec<Option<bool>>,
	trail: Vec<usize>,
	in_queue: Vec<bool>,
	best: Option<(f64, Vec<bool>)>,
	decisions: u64,
	decision_limit: Option<u64>,
	aborted: bool,
}

impl<'m> Search<'m> {
	fn new(model: &'m Model, decision_limit: Option<u64>) -> Self {
		let mut var2cons = vec![vec![]; model.var_num];
		for (idx, cons) in model.constraints.iter().enumerate() {
			for var in cons.vars() {
				if var2cons[var].last() != Some(&idx) {
					var2cons[var].push(idx);
				}
			}
		}
		let mut seen = vec![false; model.var_num];
		let mut order = vec![];
		for var in model.branch_order.iter().copied().chain(0..model.var_num) {
			if !seen[var] {
				seen[var] = true;
				order.push(var);
			}
		}

		let mut obj_coef = vec![0.0; model.var_num];
		for &(var, c) in &model.objective {
			obj_coef[var] += c;
		}
		let mut hint = vec![None; model.var_num];
		for &(var, value) in &model.hint {
			hint[var] = Some(value);
		}
		// Each var may back at most one group, otherwise its cost is counted twice.
		let mut covered = vec![false; model.var_num];
		let mut covers = vec![];
		for group in &model.covers {
			if group.is_empty() || group.iter().any(|v| covered[*v] || obj_coef[*v] < 0.0) {
				continue;
			}
			for &v in group {
				covered[v] = true;
			}
			covers.push(group.clone());
		}

		Self {
			model,
			var2cons,
			order,
			obj_coef,
			hint,
			covers,
			values: vec![None; model.var_num],
			trail: vec![],
			in_queue: vec![false; model.constraints.len()],
			best: None,
			decisions: 0,
			decision_limit,
			aborted: false,
		}
	}

	fn assign(&mut self, var: usize, value: bool, queue: &mut VecDeque<usize>) -> bool {
		match self.values[var] {
			Some(v) => v == value,
			None => {
				self.values[var] = Some(value);
				self.trail.push(var);
				for &cons in &self.var2cons[var] {
					if !self.in_queue[cons] {
						self.in_queue[cons] = true;
						queue.push_back(cons);
					}
				}
				true
			},
		}
	}

	fn undo(&mut self, mark: usize) {
		while self.trail.len() > mark {
			if let Some(var) = self.trail.pop() {
				self.values[var] = None;
			}
		}
	}

	/// Runs constraints until nothing changes. False on conflict.
	fn propagate(&mut self, initial: Vec<usize>) -> bool {
		let mut queue = VecDeque::new();
		for cons in initial {
			if !self.in_queue[cons] {
				self.in_queue[cons] = true;
				queue.push_back(cons);
			}
		}
		let model = self.model;
		let mut ok = true;
		while let Some(cons) = queue.pop_front() {
			self.in_queue[cons] = false;
			if !ok {
				continue;
			}
			let implied = match self.implications(&model.constraints[cons]) {
				Some(implied) => implied,
				None => {
					ok = false;
					continue;
				},
			};
			for (var, value) in implied {
				if !self.assign(var, value, &mut queue) {
					ok = false;
					break;
				}
			}
		}
		ok
	}

	/// Assignments forced by one constraint, or None on conflict.
	fn implications(&self, cons: &Constraint) -> Option<Vec<(usize, bool)>> {
		let mut implied = vec![];
		match cons {
			Constraint::Linear { terms, lo, hi } => {
				let (mut min, mut max) = (0.0, 0.0);
				for &(var, c) in terms {
					match self.values[var] {
						Some(true) => {
							min += c;
							max += c;
						},
						Some(false) => {},
						None => {
							min += c.min(0.0);
							max += c.max(0.0);
						},
					}
				}
				if min > hi + EPS || max < lo - EPS {
					return None;
				}
				let fits = |a: f64, b: f64| a <= hi + EPS && b >= lo - EPS;
				for &(var, c) in terms {
					if self.values[var].is_some() || c == 0.0 {
						continue;
					}
					let base_min = min - c.min(0.0);
					let base_max = max - c.max(0.0);
					let one = fits(base_min + c, base_max + c);
					let zero = fits(base_min, base_max);
					match (zero, one) {
						(false, false) => return None,
						(true, false) => implied.push((var, false)),
						(false, true) => implied.push((var, true)),
						(true, true) => {},
					}
				}
			},
			Constraint::MinEquality { target, vars } => {
				self.extreme_implications(*target, vars, false, &mut implied)?;
			},
			Constraint::MaxEquality { target, vars } => {
				self.extreme_implications(*target, vars, true, &mut implied)?;
			},
		}
		Some(implied)
	}

	/// Shared rule for min and max. For max, `dominant` is true: any var at
	/// `dominant` forces the target to it; all vars at `!dominant` force the
	/// target to `!dominant`; a target at `dominant` needs one var there.
	fn extreme_implications(
		&self,
		target: usize,
		vars: &[usize],
		dominant: bool,
		implied: &mut Vec<(usize, bool)>,
	) -> Option<()> {
		let any_dominant = vars.iter().any(|v| self.values[*v] == Some(dominant));
		let free = vars
			.iter()
			.copied()
			.filter(|v| self.values[*v].is_none())
			.collect::<Vec<_>>();
		match self.values[target] {
			Some(t) if t == dominant => {
				if !any_dominant {
					match free.len() {
						0 => return None,
						1 => implied.push((free[0], dominant)),
						_ => {},
					}
				}
			},
			Some(_) => {
				if any_dominant {
					return None;
				}
				implied.extend(free.iter().map(|v| (*v, !dominant)));
			},
			None => {
				if any_dominant {
					implied.push((target, dominant));
				} else if free.is_empty() {
					implied.push((target, !dominant));
				}
			},
		}
		Some(())
	}

	fn objective_bound(&self) -> f64 {
		let assigned: f64 = self
			.model
			.objective
			.iter()
			.map(|&(var, c)| match self.values[var] {
				Some(true) => c,
				Some(false) => 0.0,
				None => c.min(0.0),
			})
			.sum();
		let pending: f64 = self
			.covers
			.iter()
			.filter(|group| !group.iter().any(|v| self.values[*v] == Some(true)))
			.map(|group| {
				group
					.iter()
					.filter(|v| self.values[**v].is_none())
					.map(|v| self.obj_coef[*v])
					.fold(f64::INFINITY, f64::min)
			})
			.filter(|c| c.is_finite())
			.sum();
		assigned + pending
	}

	fn dfs(&mut self) {
		let bound = self.objective_bound();
		if let Some((best, _)) = &self.best {
			if bound >= best - EPS {
				return;
			}
		}
		let Some(var) = self.order.iter().copied().find(|v| self.values[*v].is_none()) else {
			let values = self.values.iter().map(|v| v.unwrap_or(false)).collect();
			self.best = Some((bound, values));
			return;
		};
		if let Some(limit) = self.decision_limit {
			if self.decisions >= limit {
				self.aborted = true;
				return;
			}
		}
		self.decisions += 1;

		let first = self.hint[var].unwrap_or(self.obj_coef[var] < 0.0);
		let values = [first, !first];
		for value in values {
			let mark = self.trail.len();
			let mut queue = VecDeque::new();
			if self.assign(var, value, &mut queue) {
				let pending = queue.into_iter().collect::<Vec<_>>();
				for cons in &pending {
					self.in_queue[*cons] = false;
				}
				if self.propagate(pending) {
					self.dfs();
				}
			}
			self.undo(mark);
			if self.aborted {
				return;
			}
		}
	}
}
