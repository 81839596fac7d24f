use sparla_core::{Device, Matrix, Result, Scalar, SparlaCoreError};

pub mod cpu_bicgstab;
pub mod gpu_bicgstab;

/// How a Krylov solve ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveStatus {
    /// The stopping criterion was satisfied.
    Converged,
    /// The iteration budget ran out first. `x` holds the last iterate.
    IterationLimit,
    /// A scalar denominator in the recurrences vanished; no further
    /// iteration is meaningful. `x` holds the best iterate so far.
    Breakdown {
        iteration: usize,
        quantity: &'static str,
        value: f64,
    },
}

impl SolveStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, SolveStatus::Converged)
    }
}

/// Solution vector plus per-algorithm metadata.
pub struct SolveResult<V: Scalar, M> {
    pub x: Vec<V>,
    pub metadata: M,
}

/// Metadata reported by the BiCGstab solvers.
#[derive(Debug, Clone, PartialEq)]
pub struct BiCGStabMetadata<V> {
    pub iterations: usize,
    pub residual_norm: V,
    pub status: SolveStatus,
}

/// Trait representing a specific linear system solving algorithm, generic
/// over the execution device and the matrix type it supports.
pub trait SolveAlgorithm<D: Device, M: Matrix> {
    /// The numeric type the algorithm operates on. Matches `M::Value`.
    type Value: Scalar;
    type Metadata: std::fmt::Debug;

    /// Solves `A x = b` for `x`, starting from a zero initial guess.
    fn solve(
        &self,
        device: &D,
        a: &M,
        b: &[Self::Value],
    ) -> impl std::future::Future<Output = Result<SolveResult<Self::Value, Self::Metadata>>> + Send;

    /// Shared input validation for implementations.
    fn validate_inputs(&self, a: &M, b: &[Self::Value]) -> Result<()> {
        let (rows, cols) = a.dims();
        if !a.is_square() {
            return Err(SparlaCoreError::ShapeMismatch(format!(
                "matrix A must be square (dims: {}x{})",
                rows, cols
            )));
        }
        if rows != b.len() {
            return Err(SparlaCoreError::ShapeMismatch(format!(
                "matrix A rows ({}) must match RHS vector b length ({})",
                rows,
                b.len()
            )));
        }
        Ok(())
    }
}

/// BiConjugate Gradient Stabilized algorithm parameters.
#[derive(Debug, Clone)]
pub struct BiCGStab {
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Jacobi preconditioning when the operator exposes a diagonal;
    /// identity otherwise.
    pub use_preconditioner: bool,
    /// Emit per-iteration diagnostics through the `log` facade.
    pub verbose: bool,
}

impl Default for BiCGStab {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 1000,
            use_preconditioner: false,
            verbose: false,
        }
    }
}

impl BiCGStab {
    /// Creates the algorithm with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the algorithm with explicit parameters.
    pub fn with_params(tolerance: f64, max_iterations: usize, use_preconditioner: bool) -> Self {
        Self {
            tolerance,
            max_iterations,
            use_preconditioner,
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}
