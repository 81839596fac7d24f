//! Preconditioner capability for the Krylov solvers.
//!
//! A preconditioner applies an operator `M` approximating `A^{-1}`; the
//! default is the identity (a plain copy). Jacobi scales by the inverse of
//! the main diagonal and is available wherever the operator exposes one.

use log::warn;
use sparla_core::{blas, GpuDevice, GpuVector, LinearOperator, Result, Scalar, SparlaCoreError};

/// Host preconditioner: computes `out = M * x`.
pub trait Preconditioner<V: Scalar> {
    fn apply(&self, x: &[V], out: &mut [V]) -> Result<()>;
}

/// Identity preconditioner; `apply` is a copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<V: Scalar> Preconditioner<V> for Identity {
    fn apply(&self, x: &[V], out: &mut [V]) -> Result<()> {
        blas::copy(x, out)
    }
}

/// Jacobi (diagonal) preconditioner: `out = diag(A)^{-1} * x`. Zero
/// diagonal entries scale by zero instead of dividing.
#[derive(Debug, Clone)]
pub struct Jacobi<V = f64> {
    inverse_diagonal: Vec<V>,
}

impl<V: Scalar> Jacobi<V> {
    /// Builds the preconditioner from a diagonal.
    pub fn from_diagonal(diagonal: Vec<V>) -> Self {
        let inverse_diagonal = diagonal
            .into_iter()
            .map(|d| if d == V::zero() { V::zero() } else { d.recip() })
            .collect();
        Self { inverse_diagonal }
    }

    /// Builds the preconditioner from any operator exposing its diagonal.
    pub fn from_operator<M: LinearOperator<Value = V>>(a: &M) -> Option<Self> {
        a.diagonal().map(Self::from_diagonal)
    }
}

impl<V: Scalar> Preconditioner<V> for Jacobi<V> {
    fn apply(&self, x: &[V], out: &mut [V]) -> Result<()> {
        if x.len() != self.inverse_diagonal.len() || out.len() != self.inverse_diagonal.len() {
            return Err(SparlaCoreError::ShapeMismatch(format!(
                "Jacobi preconditioner of size {} applied to vectors of size {} and {}",
                self.inverse_diagonal.len(),
                x.len(),
                out.len()
            )));
        }
        for i in 0..out.len() {
            out[i] = self.inverse_diagonal[i] * x[i];
        }
        Ok(())
    }
}

/// Device preconditioner used by the GPU solver.
#[derive(Debug)]
pub enum GpuPreconditioner {
    Identity,
    /// Holds the elementwise inverse of the diagonal in device memory.
    Jacobi(GpuVector),
}

impl GpuPreconditioner {
    /// Computes `out = M * x` on the device.
    pub async fn apply(
        &self,
        device: &GpuDevice,
        x: &GpuVector,
        out: &mut GpuVector,
    ) -> Result<()> {
        match self {
            GpuPreconditioner::Identity => out.clone_from(x),
            GpuPreconditioner::Jacobi(inverse_diagonal) => {
                device.elementwise_mul(inverse_diagonal, x, out).await
            }
        }
    }
}

/// Resolves the requested preconditioning for an operator, falling back to
/// the identity with a warning when the layout exposes no diagonal.
pub(crate) fn resolve_host<V: Scalar, M: LinearOperator<Value = V>>(
    requested: bool,
    a: &M,
) -> Option<Jacobi<V>> {
    if !requested {
        return None;
    }
    let jacobi = Jacobi::from_operator(a);
    if jacobi.is_none() {
        warn!("operator exposes no diagonal; continuing without preconditioning");
    }
    jacobi
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparla_core::CsrMatrix;

    #[test]
    fn test_identity_copies() {
        let x = [1.0f64, 2.0];
        let mut out = [0.0f64; 2];
        Identity.apply(&x, &mut out).unwrap();
        assert_eq!(out, x);
    }

    #[test]
    fn test_jacobi_scales_by_inverse_diagonal() {
        let a = CsrMatrix::from_dense(&[vec![2.0, 1.0], vec![0.0, 4.0]]);
        let jacobi = Jacobi::from_operator(&a).unwrap();
        let x = [2.0f64, 8.0];
        let mut out = [0.0f64; 2];
        jacobi.apply(&x, &mut out).unwrap();
        assert_eq!(out, [1.0, 2.0]);
    }

    #[test]
    fn test_jacobi_zero_diagonal_guard() {
        let jacobi = Jacobi::from_diagonal(vec![0.0f64, 2.0]);
        let x = [5.0f64, 2.0];
        let mut out = [0.0f64; 2];
        jacobi.apply(&x, &mut out).unwrap();
        assert_eq!(out, [0.0, 1.0]);
    }
}
