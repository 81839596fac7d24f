//! Termination predicates for the iterative solvers.

use num_traits::NumCast;
use sparla_core::Scalar;

/// Pluggable stopping criterion consulted once per iteration.
///
/// Implementations cache only the norms captured in `initialize` and are
/// cheap to query.
pub trait StoppingCriteria<V: Scalar> {
    /// Captures the baseline right-hand-side norm before the first
    /// iteration.
    fn initialize(&mut self, b_norm: V);

    /// True once the residual norm satisfies the criterion.
    fn has_converged(&self, residual_norm: V) -> bool;

    /// True once the iteration counter has exhausted its budget.
    fn has_reached_iteration_limit(&self, iteration: usize) -> bool;
}

/// Default criterion: relative residual `||r|| / ||b|| < tolerance` with an
/// iteration cap. Falls back to the absolute residual when `||b||` is zero.
#[derive(Debug, Clone)]
pub struct RelativeResidual<V = f64> {
    pub tolerance: V,
    pub max_iterations: usize,
    b_norm: V,
}

impl<V: Scalar> RelativeResidual<V> {
    pub fn new(tolerance: V, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
            b_norm: V::zero(),
        }
    }
}

impl<V: Scalar> Default for RelativeResidual<V> {
    fn default() -> Self {
        Self::new(
            <V as NumCast>::from(1.0e-6).unwrap_or_else(V::epsilon),
            1000,
        )
    }
}

impl<V: Scalar> StoppingCriteria<V> for RelativeResidual<V> {
    fn initialize(&mut self, b_norm: V) {
        self.b_norm = b_norm;
    }

    fn has_converged(&self, residual_norm: V) -> bool {
        if self.b_norm > V::zero() {
            residual_norm / self.b_norm < self.tolerance
        } else {
            residual_norm < self.tolerance
        }
    }

    fn has_reached_iteration_limit(&self, iteration: usize) -> bool {
        iteration >= self.max_iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_residual() {
        let mut criteria: RelativeResidual<f64> = RelativeResidual::new(1e-6, 10);
        criteria.initialize(100.0);
        assert!(!criteria.has_converged(1e-3));
        assert!(criteria.has_converged(1e-5));
        assert!(!criteria.has_reached_iteration_limit(9));
        assert!(criteria.has_reached_iteration_limit(10));
    }

    #[test]
    fn test_absolute_fallback_for_zero_rhs() {
        let mut criteria: RelativeResidual<f64> = RelativeResidual::new(1e-6, 10);
        criteria.initialize(0.0);
        assert!(criteria.has_converged(1e-7));
        assert!(!criteria.has_converged(1e-5));
    }
}
