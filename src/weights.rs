//! Element-wise arithmetic over weight vectors.
//!
//! Node and edge weights are multi-dimensional (cell count, register count,
//! DSP count, ...). Every binary operation requires both operands to have the
//! same dimension; a mismatch is a contract violation and panics.

pub type Weights = Vec<f64>;

pub fn zeros(dim: usize) -> Weights {
	vec![0.0; dim]
}

pub fn add(a: &[f64], b: &[f64]) -> Weights {
	assert_eq!(a.len(), b.len(), "Size of operand a and b: {} {}", a.len(), b.len());
	a.iter().zip(b).map(|(x, y)| x + y).collect()
}

pub fn sub(a: &[f64], b: &[f64]) -> Weights {
	assert_eq!(a.len(), b.len(), "Size of operand a and b: {} {}", a.len(), b.len());
	a.iter().zip(b).map(|(x, y)| x - y).collect()
}

/// `target += source`
pub fn accu(target: &mut [f64], source: &[f64]) {
	assert_eq!(target.len(), source.len());
	for (t, s) in target.iter_mut().zip(source) {
		*t += s;
	}
}

/// `target -= source`
pub fn dec(target: &mut [f64], source: &[f64]) {
	assert_eq!(target.len(), source.len());
	for (t, s) in target.iter_mut().zip(source) {
		*t -= s;
	}
}

pub fn mul_scalar(a: &[f64], scalar: f64) -> Weights {
	a.iter().map(|x| x * scalar).collect()
}

pub fn max(a: &[f64], b: &[f64]) -> Weights {
	assert_eq!(a.len(), b.len());
	a.iter().zip(b).map(|(x, y)| x.max(*y)).collect()
}

pub fn less_eq(a: &[f64], b: &[f64]) -> bool {
	assert_eq!(a.len(), b.len());
	a.iter().zip(b).all(|(x, y)| x <= y)
}

pub fn greater_eq(a: &[f64], b: &[f64]) -> bool {
	assert_eq!(a.len(), b.len());
	a.iter().zip(b).all(|(x, y)| x >= y)
}

/// Dot product of a weight vector with its per-dimension factor.
pub fn weighted_sum(weights: &[f64], factors: &[f64]) -> f64 {
	assert_eq!(weights.len(), factors.len());
	weights.iter().zip(factors).map(|(w, f)| w * f).sum()
}

/// Grow or shrink `weights` to `dim`, padding with 1.0.
pub(crate) fn resize(weights: &mut Weights, dim: usize) {
	weights.resize(dim, 1.0);
}

#[cfg(test)]
mod test {
	use super::*;
	use float_cmp::assert_approx_eq;

	#[test]
	fn arithmetic() {
		let a = vec![1.0, 2.0, 3.0];
		let b = vec![0.5, 2.0, 4.0];
		assert_eq!(add(&a, &b), vec![1.5, 4.0, 7.0]);
		assert_eq!(sub(&a, &b), vec![0.5, 0.0, -1.0]);
		assert_eq!(max(&a, &b), vec![1.0, 2.0, 4.0]);
		assert_eq!(mul_scalar(&a, 2.0), vec![2.0, 4.0, 6.0]);

		let mut c = zeros(3);
		accu(&mut c, &a);
		accu(&mut c, &b);
		dec(&mut c, &a);
		assert_eq!(c, b);
	}

	#[test]
	fn comparisons() {
		assert!(less_eq(&[1.0, 2.0], &[1.0, 3.0]));
		assert!(!less_eq(&[1.0, 4.0], &[1.0, 3.0]));
		assert!(greater_eq(&[1.0, 4.0], &[1.0, 3.0]));
		assert_approx_eq!(f64, weighted_sum(&[2.0, 3.0], &[1.0, 0.5]), 3.5);
	}

	#[test]
	fn resize_pads_with_ones() {
		let mut w = vec![3.0];
		resize(&mut w, 3);
		assert_eq!(w, vec![3.0, 1.0, 1.0]);
		resize(&mut w, 1);
		assert_eq!(w, vec![3.0]);
	}

	#[test]
	#[should_panic]
	fn dimension_mismatch_panics() {
		add(&[1.0], &[1.0, 2.0]);
	}
}
