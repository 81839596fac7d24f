use log::{info, warn};

use sparla_core::{GpuDevice, GpuOperator, GpuVector, Result, SparlaCoreError};

use super::{BiCGStab, BiCGStabMetadata, SolveAlgorithm, SolveResult, SolveStatus};
use crate::preconditioner::GpuPreconditioner;
use crate::stopping::{RelativeResidual, StoppingCriteria};

/// Solves `A x = b` with BiCGstab on the GPU. `x` is updated in place and
/// is the initial guess on entry.
///
/// The loop submits two SpMVs and four reductions per iteration; only the
/// reductions synchronize with the host, everything else stays enqueued on
/// the device timeline.
pub async fn gpu_bicgstab<M, S>(
    device: &GpuDevice,
    a: &M,
    b: &GpuVector,
    x: &mut GpuVector,
    criteria: &mut S,
    preconditioner: &GpuPreconditioner,
    verbose: bool,
) -> Result<BiCGStabMetadata<f64>>
where
    M: GpuOperator,
    S: StoppingCriteria<f64>,
{
    let (rows, cols) = a.dims();
    if rows != cols {
        return Err(SparlaCoreError::ShapeMismatch(format!(
            "matrix must be square (dims: {}x{})",
            rows, cols
        )));
    }
    if b.size() != rows || x.size() != rows {
        return Err(SparlaCoreError::ShapeMismatch(format!(
            "matrix is {}x{} but x has size {} and b size {}",
            rows,
            cols,
            x.size(),
            b.size()
        )));
    }

    let n = rows;
    let mut y = device.create_empty_vector("y (A*x scratch)", n)?;
    let mut p = device.create_empty_vector("p (direction)", n)?;
    let mut r = device.create_empty_vector("r (residual)", n)?;
    let mut r_star = device.create_empty_vector("r* (shadow residual)", n)?;
    let mut s = device.create_empty_vector("s (intermediate residual)", n)?;
    let mut mp = device.create_empty_vector("M*p", n)?;
    let mut amp = device.create_empty_vector("A*M*p", n)?;
    let mut ms = device.create_empty_vector("M*s", n)?;
    let mut ams = device.create_empty_vector("A*M*s", n)?;

    criteria.initialize(device.nrm2(b).await?);

    // r = b - A*x
    a.spmv(x, &mut y).await?;
    device.axpby(1.0, b, -1.0, &y, &mut r).await?;

    p.clone_from(&r)?;
    r_star.clone_from(&r)?;

    let mut r_norm = device.nrm2(&r).await?;
    let mut r_r_star_old = device.dot(&r_star, &r).await?;

    if verbose {
        info!("[bicgstab] initial residual norm {}", r_norm);
    }

    let mut iteration = 0usize;
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
        preconditioner.apply(device, &p, &mut mp).await?;
        a.spmv(&mp, &mut amp).await?;

        // alpha = (r, r*) / (A*M*p, r*)
        let denominator = device.dot(&r_star, &amp).await?;
        if denominator.abs() < f64::EPSILON {
            warn!(
                "[bicgstab] breakdown at iteration {}: (r*, A*M*p) ({}) is near zero",
                iteration, denominator
            );
            return Ok(BiCGStabMetadata {
                iterations: iteration,
                residual_norm: r_norm,
                status: SolveStatus::Breakdown {
                    iteration,
                    quantity: "(r*, A*M*p)",
                    value: denominator,
                },
            });
        }
        let alpha = r_r_star_old / denominator;

        // s = r - alpha * AMp
        device.axpby(1.0, &r, -alpha, &amp, &mut s).await?;

        // An exact step leaves s at zero; finish without risking a spurious
        // breakdown in the omega recurrence.
        let s_norm = device.nrm2(&s).await?;
        if criteria.has_converged(s_norm) {
            device.axpy(alpha, &mp, x).await?;
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
        preconditioner.apply(device, &s, &mut ms).await?;
        a.spmv(&ms, &mut ams).await?;

        // omega = (AMs, s) / (AMs, AMs)
        let ams_ams = device.dot(&ams, &ams).await?;
        if ams_ams.abs() < f64::EPSILON {
            warn!(
                "[bicgstab] breakdown at iteration {}: (A*M*s, A*M*s) ({}) is near zero",
                iteration, ams_ams
            );
            return Ok(BiCGStabMetadata {
                iterations: iteration,
                residual_norm: r_norm,
                status: SolveStatus::Breakdown {
                    iteration,
                    quantity: "(A*M*s, A*M*s)",
                    value: ams_ams,
                },
            });
        }
        let omega = device.dot(&ams, &s).await? / ams_ams;
        if omega.abs() < f64::EPSILON {
            warn!(
                "[bicgstab] breakdown at iteration {}: omega ({}) is near zero",
                iteration, omega
            );
            return Ok(BiCGStabMetadata {
                iterations: iteration,
                residual_norm: r_norm,
                status: SolveStatus::Breakdown {
                    iteration,
                    quantity: "omega",
                    value: omega,
                },
            });
        }

        // x = x + alpha*M*p + omega*M*s
        device.axpbypcz(1.0, x, alpha, &mp, omega, &ms).await?;

        // r = s - omega * AMs
        device.axpby(1.0, &s, -omega, &ams, &mut r).await?;

        // beta = ((r, r*)_new / (r, r*)_old) * (alpha / omega)
        let r_r_star_new = device.dot(&r_star, &r).await?;
        let beta = (r_r_star_new / r_r_star_old) * (alpha / omega);
        r_r_star_old = r_r_star_new;

        // p = r + beta*(p - omega*AMp)
        device
            .axpbypcz(beta, &mut p, 1.0, &r, -beta * omega, &amp)
            .await?;

        r_norm = device.nrm2(&r).await?;
        iteration += 1;
        if verbose {
            info!("[bicgstab] iteration {}: residual norm {}", iteration, r_norm);
        }
    }
}

impl<M> SolveAlgorithm<GpuDevice, M> for BiCGStab
where
    M: GpuOperator,
{
    type Value = f64;
    type Metadata = BiCGStabMetadata<f64>;

    async fn solve(
        &self,
        device: &GpuDevice,
        a: &M,
        b: &[f64],
    ) -> Result<SolveResult<f64, Self::Metadata>> {
        self.validate_inputs(a, b)?;

        let b_gpu = device.create_vector("b", b)?;
        let mut x_gpu = device.create_empty_vector("x (solution)", b.len())?;
        let mut criteria = RelativeResidual::new(self.tolerance, self.max_iterations);

        let preconditioner = if self.use_preconditioner {
            match a.inverse_diagonal(device).await? {
                Some(inverse_diagonal) => GpuPreconditioner::Jacobi(inverse_diagonal),
                None => {
                    warn!("operator exposes no diagonal; continuing without preconditioning");
                    GpuPreconditioner::Identity
                }
            }
        } else {
            GpuPreconditioner::Identity
        };

        let metadata = gpu_bicgstab(
            device,
            a,
            &b_gpu,
            &mut x_gpu,
            &mut criteria,
            &preconditioner,
            self.verbose,
        )
        .await?;

        let x = x_gpu.read_contents().await?;
        Ok(SolveResult { x, metadata })
    }
}
