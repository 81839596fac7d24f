//! # sparla-lsolver
//!
//! Krylov-subspace solvers for `A x = b` over the sparla sparse-matrix
//! runtime. BiCGstab is provided in a host variant, generic over any
//! [`LinearOperator`], and a GPU variant over the device matrix types;
//! both share the pluggable stopping-criteria and preconditioner seams.

pub mod algorithms;
pub mod preconditioner;
pub mod stopping;

pub use algorithms::{BiCGStab, BiCGStabMetadata, SolveAlgorithm, SolveResult, SolveStatus};
pub use preconditioner::{GpuPreconditioner, Identity, Jacobi, Preconditioner};
pub use stopping::{RelativeResidual, StoppingCriteria};

// Re-export the core types callers need alongside the solvers.
pub use sparla_core::{
    ConversionPolicy, CooMatrix, CooMatrixGpu, CpuDevice, CsrKernel, CsrMatrix, CsrMatrixGpu,
    DiaMatrix, DiaMatrixGpu, EllMatrix, EllMatrixGpu, Format, GpuDevice, GpuOperator, GpuVector,
    HybMatrix, HybMatrixGpu, LinearOperator, Matrix, Result, SparlaCoreError, SparseMatrixAny,
    TransferStats, Vector,
};
