use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of an island on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coord {
	pub x: usize,
	pub y: usize,
}

impl Coord {
	pub fn new(x: usize, y: usize) -> Self {
		Self { x, y }
	}

	pub fn manhattan_dist(&self, other: &Coord) -> usize {
		self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
	}
}

impl fmt::Display for Coord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "({},{})", self.x, self.y)
	}
}

/// Grid size in islands. Islands are numbered row-major along `y`:
/// `index = x * dim_y + y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDim {
	pub x: usize,
	pub y: usize,
}

impl GridDim {
	pub fn new(x: usize, y: usize) -> Self {
		assert!(x > 0 && y > 0);
		Self { x, y }
	}

	pub fn island_num(&self) -> usize {
		self.x * self.y
	}

	pub fn coord_of(&self, index: usize) -> Coord {
		assert!(index < self.island_num(), "Island-{index} is outside {self:?}");
		Coord::new(index / self.y, index % self.y)
	}

	pub fn index_of(&self, coord: Coord) -> usize {
		assert!(self.contains(coord));
		coord.x * self.y + coord.y
	}

	pub fn contains(&self, coord: Coord) -> bool {
		coord.x < self.x && coord.y < self.y
	}

	pub fn coords(&self) -> impl Iterator<Item = Coord> + '_ {
		(0..self.island_num()).map(|i| self.coord_of(i))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use itertools::Itertools;

	#[test]
	fn index_mapping() {
		let dim = GridDim::new(2, 2);
		assert_eq!(
			dim.coords().collect_vec(),
			vec![
				Coord::new(0, 0),
				Coord::new(0, 1),
				Coord::new(1, 0),
				Coord::new(1, 1)
			]
		);
		for i in 0..dim.island_num() {
			assert_eq!(dim.index_of(dim.coord_of(i)), i);
		}
		let dim = GridDim::new(2, 1);
		assert_eq!(dim.coord_of(1), Coord::new(1, 0));
		assert!(!dim.contains(Coord::new(0, 1)));
	}

	#[test]
	fn distance() {
		assert_eq!(Coord::new(0, 0).manhattan_dist(&Coord::new(1, 1)), 2);
		assert_eq!(format!("{}", Coord::new(1, 0)), "(1,0)");
	}
}
