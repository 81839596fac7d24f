//! # sparla-core
//!
//! Sparse linear algebra on heterogeneous memory: compact sparse matrix
//! containers (COO, CSR, DIA, ELL, HYB), conversions between them, and
//! matrix-vector multiply kernels for both the host and a wgpu compute
//! device. The Krylov solvers built on these primitives live in the
//! `sparla-lsolver` crate.
//!
//! Host containers are generic over the value type; device containers hold
//! `f64` values and `u32` indices. Moving a matrix across the memory
//! boundary is one bulk transfer per component array, through the
//! [`GpuDevice`] `create_*` methods and the `download` methods on the
//! device containers.

pub mod array;
pub mod blas;
pub mod convert;
pub mod device;
pub mod error;
pub mod formats;
pub mod spmv;
pub mod traits;

mod context;
mod gpu_matrix;
mod ops;
mod vector;

pub use array::Array1d;
pub use convert::{convert, ConversionPolicy};
pub use device::{CpuDevice, Device, GpuDevice, TransferStats};
pub use error::{Result, SparlaCoreError};
pub use formats::{
    CooMatrix, CsrMatrix, DiaMatrix, EllMatrix, Format, HybMatrix, SparseMatrixAny, ELL_PAD,
};
pub use gpu_matrix::{
    CooMatrixGpu, CsrKernel, CsrMatrixGpu, DiaMatrixGpu, EllMatrixGpu, GpuOperator, HybMatrixGpu,
};
pub use traits::{LinearOperator, Matrix, Scalar, Vector};
pub use vector::GpuVector;
