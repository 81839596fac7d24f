use log::{info, warn};
use num_traits::NumCast;

use sparla_core::{blas, Array1d, CpuDevice, LinearOperator, Result, Scalar, SparlaCoreError};

use super::{BiCGStab, BiCGStabMetadata, SolveAlgorithm, SolveResult, SolveStatus};
use crate::preconditioner::{resolve_host, Identity, Preconditioner};
use crate::stopping::{RelativeResidual, StoppingCriteria};

fn as_f64<V: Scalar>(value: V) -> f64 {
    num_traits::cast(value).unwrap_or(f64::NAN)
}

/// Solves `A x = b` with BiCGstab on the host. `x` is updated in place and
/// is the initial guess on entry.
///
/// Two SpMVs and four reductions per iteration. A vanishing denominator in
/// the scalar recurrences ends the solve with `SolveStatus::Breakdown`,
/// leaving the best iterate in `x`; exhausting the criterion's iteration
/// budget reports `SolveStatus::IterationLimit`.
pub fn bicgstab<V, M, S, P>(
    a: &M,
    x: &mut [V],
    b: &[V],
    criteria: &mut S,
    preconditioner: &P,
    verbose: bool,
) -> Result<BiCGStabMetadata<V>>
where
    V: Scalar,
    M: LinearOperator<Value = V>,
    S: StoppingCriteria<V>,
    P: Preconditioner<V>,
{
    let (rows, cols) = a.dims();
    if rows != cols {
        return Err(SparlaCoreError::ShapeMismatch(format!(
            "matrix must be square (dims: {}x{})",
            rows, cols
        )));
    }
    if x.len() != rows || b.len() != rows {
        return Err(SparlaCoreError::ShapeMismatch(format!(
            "matrix is {}x{} but x has length {} and b length {}",
            rows,
            cols,
            x.len(),
            b.len()
        )));
    }

    let n = rows;
    let mut y = Array1d::zeros(n);
    let mut p = Array1d::zeros(n);
    let mut r = Array1d::zeros(n);
    let mut r_star = Array1d::zeros(n);
    let mut s = Array1d::zeros(n);
    let mut mp = Array1d::zeros(n);
    let mut amp = Array1d::zeros(n);
    let mut ms = Array1d::zeros(n);
    let mut ams = Array1d::zeros(n);

    criteria.initialize(blas::nrm2(b));

    // r = b - A*x
    a.spmv(x, &mut y)?;
    blas::axpby(V::one(), b, -V::one(), &y, &mut r)?;

    blas::copy(&r, &mut p)?;
    blas::copy(&r, &mut r_star)?;

    let mut r_norm = blas::nrm2(&r);
    let mut r_r_star_old = blas::dotc(&r_star, &r)?;

    if verbose {
        info!("[bicgstab] initial residual norm {}", r_norm);
    }

    let eps = V::epsilon();
    let mut iteration = 0usize;
    let breakdown = |iteration: usize, quantity: &'static str, value: V, residual_norm: V| {
        warn!(
            "[bicgstab] breakdown at iteration {}: {} ({}) is near zero",
            iteration, quantity, value
        );
        BiCGStabMetadata {
            iterations: iteration,
            residual_norm,
            status: SolveStatus::Breakdown {
                iteration,
                quantity,
                value: as_f64(value),
            },
        }
    };

    loop {
        if criteria.has_converged(r_norm) {
            if verbose {
                info!(
                    "[bicgstab] converged in {} iterations (residual {})",
                    iteration, r_norm
                );
            }
            return Ok(BiCGStabMetadata {
                iterations: iteration,
                residual_norm: r_norm,
                status: SolveStatus::Converged,
            });
        }
        if criteria.has_reached_iteration_limit(iteration) {
            if verbose {
                warn!(
                    "[bicgstab] iteration limit after {} iterations (residual {})",
                    iteration, r_norm
                );
            }
            return Ok(BiCGStabMetadata {
                iterations: iteration,
                residual_norm: r_norm,
                status: SolveStatus::IterationLimit,
            });
        }

        // Mp = M*p, AMp = A*Mp
        preconditioner.apply(&p, &mut mp)?;
        a.spmv(&mp, &mut amp)?;

        // alpha = (r, r*) / (A*M*p, r*)
        let denominator = blas::dotc(&r_star, &amp)?;
        if denominator.abs() < eps {
            return Ok(breakdown(iteration, "(r*, A*M*p)", denominator, r_norm));
        }
        let alpha = r_r_star_old / denominator;

        // s = r - alpha * AMp
        blas::axpby(V::one(), &r, -alpha, &amp, &mut s)?;

        // An exact step leaves s at zero; finish without risking a spurious
        // breakdown in the omega recurrence.
        let s_norm = blas::nrm2(&s);
        if criteria.has_converged(s_norm) {
            blas::axpy(alpha, &mp, x)?;
            iteration += 1;
            if verbose {
                info!(
                    "[bicgstab] converged in {} iterations (residual {})",
                    iteration, s_norm
                );
            }
            return Ok(BiCGStabMetadata {
                iterations: iteration,
                residual_norm: s_norm,
                status: SolveStatus::Converged,
            });
        }

        // Ms = M*s, AMs = A*Ms
        preconditioner.apply(&s, &mut ms)?;
        a.spmv(&ms, &mut ams)?;

        // omega = (AMs, s) / (AMs, AMs)
        let ams_ams = blas::dotc(&ams, &ams)?;
        if ams_ams.abs() < eps {
            return Ok(breakdown(iteration, "(A*M*s, A*M*s)", ams_ams, r_norm));
        }
        let omega = blas::dotc(&ams, &s)? / ams_ams;
        if omega.abs() < eps {
            return Ok(breakdown(iteration, "omega", omega, r_norm));
        }

        // x = x + alpha*M*p + omega*M*s
        blas::axpbypcz(V::one(), x, alpha, &mp, omega, &ms)?;

        // r = s - omega * AMs
        blas::axpby(V::one(), &s, -omega, &ams, &mut r)?;

        // beta = ((r, r*)_new / (r, r*)_old) * (alpha / omega)
        let r_r_star_new = blas::dotc(&r_star, &r)?;
        let beta = (r_r_star_new / r_r_star_old) * (alpha / omega);
        r_r_star_old = r_r_star_new;

        // p = r + beta*(p - omega*AMp)
        blas::axpbypcz(beta, &mut p, V::one(), &r, -beta * omega, &amp)?;

        r_norm = blas::nrm2(&r);
        iteration += 1;
        if verbose {
            info!("[bicgstab] iteration {}: residual norm {}", iteration, r_norm);
        }
    }
}

impl<V, M> SolveAlgorithm<CpuDevice, M> for BiCGStab
where
    V: Scalar,
    M: LinearOperator<Value = V> + Sync,
{
    type Value = V;
    type Metadata = BiCGStabMetadata<V>;

    async fn solve(
        &self,
        _device: &CpuDevice,
        a: &M,
        b: &[V],
    ) -> Result<SolveResult<V, Self::Metadata>> {
        self.validate_inputs(a, b)?;

        let mut x = vec![V::zero(); b.len()];
        let tolerance = <V as NumCast>::from(self.tolerance).unwrap_or_else(V::epsilon);
        let mut criteria = RelativeResidual::new(tolerance, self.max_iterations);

        let metadata = match resolve_host(self.use_preconditioner, a) {
            Some(jacobi) => bicgstab(a, &mut x, b, &mut criteria, &jacobi, self.verbose)?,
            None => bicgstab(a, &mut x, b, &mut criteria, &Identity, self.verbose)?,
        };
        Ok(SolveResult { x, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparla_core::CsrMatrix;

    #[test]
    fn test_identity_converges_in_one_iteration() {
        let a = CsrMatrix::from_dense(&[
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ]);
        let b = [1.0, 2.0, 3.0];
        let mut x = [0.0; 3];
        let mut criteria = RelativeResidual::new(1e-6, 100);
        let metadata = bicgstab(&a, &mut x, &b, &mut criteria, &Identity, false).unwrap();
        assert_eq!(metadata.status, SolveStatus::Converged);
        assert_eq!(metadata.iterations, 1);
        assert_eq!(x, b);
    }

    #[test]
    fn test_breakdown_on_singular_matrix() {
        // Row of zeros makes the system singular; the recurrence hits a
        // vanishing denominator instead of diverging silently.
        let a = CsrMatrix::from_dense(&[vec![1.0, 0.0], vec![0.0, 0.0]]);
        let b = [1.0, 1.0];
        let mut x = [0.0; 2];
        let mut criteria = RelativeResidual::new(1e-10, 100);
        let metadata = bicgstab(&a, &mut x, &b, &mut criteria, &Identity, false).unwrap();
        assert!(matches!(metadata.status, SolveStatus::Breakdown { .. }));
    }

    #[test]
    fn test_shape_mismatch() {
        let a = CsrMatrix::from_dense(&[vec![1.0, 0.0], vec![0.0, 1.0]]);
        let b = [1.0; 2];
        let mut x = [0.0; 3];
        let mut criteria = RelativeResidual::default();
        assert!(bicgstab(&a, &mut x, &b, &mut criteria, &Identity, false).is_err());
    }
}
