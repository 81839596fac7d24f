use std::sync::Arc;

use crate::context::GpuContext;
use crate::error::{Result, SparlaCoreError};
use crate::formats::{CooMatrix, CsrMatrix, DiaMatrix, EllMatrix, HybMatrix, ELL_PAD};
use crate::gpu_matrix::{
    CooMatrixGpu, CsrMatrixGpu, DiaMatrixGpu, EllMatrixGpu, HybMatrixGpu, ELL_PAD_GPU,
};
use crate::ops;
use crate::vector::GpuVector;

/// Marker trait for execution devices.
pub trait Device: std::fmt::Debug {}

/// The host CPU; kernels run synchronously on the calling thread.
#[derive(Debug, Clone, Default)]
pub struct CpuDevice {}

impl Device for CpuDevice {}

/// A GPU execution device holding the WGPU context.
///
/// All device containers are created through this type; mixing containers
/// from two `GpuDevice` instances in one operation is a
/// `MemorySpaceMismatch` error.
#[derive(Debug, Clone)]
pub struct GpuDevice {
    pub(crate) context: Arc<GpuContext>,
}

const MATRIX_BUFFER_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_DST)
    .union(wgpu::BufferUsages::COPY_SRC);

fn index_as_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        SparlaCoreError::UnsupportedOperation(format!(
            "{} ({}) exceeds the device index range",
            what, value
        ))
    })
}

impl GpuDevice {
    /// Creates a new device, initializing the underlying WGPU context
    /// asynchronously. This is the entry point for the GPU memory space.
    pub async fn new() -> Result<Self> {
        let context = GpuContext::new().await?;
        log::info!("GpuDevice created");
        Ok(Self {
            context: Arc::new(context),
        })
    }

    // --- Resource creation ---

    /// Uploads a host slice into a new device vector.
    pub fn create_vector(&self, label: &str, data: &[f64]) -> Result<GpuVector> {
        if data.is_empty() {
            return Err(SparlaCoreError::ShapeMismatch(
                "cannot create a device vector from an empty slice".to_string(),
            ));
        }
        let buffer = self.context.create_gpu_buffer_with_data(
            label,
            bytemuck::cast_slice(data),
            MATRIX_BUFFER_USAGE,
        );
        Ok(GpuVector::new_internal(
            buffer,
            data.len(),
            String::from(label),
            Arc::clone(&self.context),
        ))
    }

    /// Creates a zero-initialized device vector of the given size.
    pub fn create_empty_vector(&self, label: &str, size: usize) -> Result<GpuVector> {
        if size == 0 {
            return Err(SparlaCoreError::ShapeMismatch(
                "cannot create a device vector of size 0".to_string(),
            ));
        }
        let byte_size = (size * std::mem::size_of::<f64>()) as u64;
        let buffer = self
            .context
            .create_empty_buffer(label, byte_size, MATRIX_BUFFER_USAGE);
        Ok(GpuVector::new_internal(
            buffer,
            size,
            String::from(label),
            Arc::clone(&self.context),
        ))
    }

    fn upload_indices(&self, label: &str, indices: &[usize], what: &str) -> Result<wgpu::Buffer> {
        let narrowed: Vec<u32> = indices
            .iter()
            .map(|&i| index_as_u32(i, what))
            .collect::<Result<_>>()?;
        Ok(self.context.create_gpu_buffer_with_data(
            label,
            bytemuck::cast_slice(&narrowed),
            MATRIX_BUFFER_USAGE,
        ))
    }

    fn upload_values(&self, label: &str, values: &[f64]) -> wgpu::Buffer {
        self.context
            .create_gpu_buffer_with_data(label, bytemuck::cast_slice(values), MATRIX_BUFFER_USAGE)
    }

    /// Uploads a host COO matrix.
    pub fn create_coo_matrix(&self, matrix: &CooMatrix<f64>) -> Result<CooMatrixGpu> {
        index_as_u32(matrix.num_rows(), "row count")?;
        index_as_u32(matrix.num_cols(), "column count")?;
        index_as_u32(matrix.num_entries(), "entry count")?;
        let row_indices =
            self.upload_indices("COO row indices", matrix.row_indices(), "row index")?;
        let column_indices =
            self.upload_indices("COO column indices", matrix.column_indices(), "column index")?;
        let values = self.upload_values("COO values", matrix.values());
        Ok(CooMatrixGpu::new_internal(
            matrix.num_rows(),
            matrix.num_cols(),
            matrix.num_entries(),
            row_indices,
            column_indices,
            values,
            Arc::clone(&self.context),
        ))
    }

    /// Uploads a host CSR matrix.
    pub fn create_csr_matrix(&self, matrix: &CsrMatrix<f64>) -> Result<CsrMatrixGpu> {
        index_as_u32(matrix.num_rows(), "row count")?;
        index_as_u32(matrix.num_cols(), "column count")?;
        index_as_u32(matrix.num_entries(), "entry count")?;
        let row_offsets =
            self.upload_indices("CSR row offsets", matrix.row_offsets(), "row offset")?;
        let column_indices =
            self.upload_indices("CSR column indices", matrix.column_indices(), "column index")?;
        let values = self.upload_values("CSR values", matrix.values());
        Ok(CsrMatrixGpu::new_internal(
            matrix.num_rows(),
            matrix.num_cols(),
            matrix.num_entries(),
            row_offsets,
            column_indices,
            values,
            Arc::clone(&self.context),
        ))
    }

    /// Uploads a host DIA matrix.
    pub fn create_dia_matrix(&self, matrix: &DiaMatrix<f64>) -> Result<DiaMatrixGpu> {
        index_as_u32(matrix.num_rows(), "row count")?;
        index_as_u32(matrix.num_cols(), "column count")?;
        index_as_u32(matrix.stride(), "stride")?;
        let offsets: Vec<i32> = matrix
            .diagonal_offsets()
            .iter()
            .map(|&o| {
                i32::try_from(o).map_err(|_| {
                    SparlaCoreError::UnsupportedOperation(format!(
                        "diagonal offset ({}) exceeds the device index range",
                        o
                    ))
                })
            })
            .collect::<Result<_>>()?;
        let offsets_buffer = self.context.create_gpu_buffer_with_data(
            "DIA diagonal offsets",
            bytemuck::cast_slice(&offsets),
            MATRIX_BUFFER_USAGE,
        );
        let values = self.upload_values("DIA values", matrix.values());
        Ok(DiaMatrixGpu::new_internal(
            matrix.num_rows(),
            matrix.num_cols(),
            matrix.num_entries(),
            matrix.num_diagonals(),
            matrix.stride(),
            offsets_buffer,
            values,
            Arc::clone(&self.context),
        ))
    }

    /// Uploads a host ELL matrix; the pad sentinel maps to the device's
    /// all-ones index.
    pub fn create_ell_matrix(&self, matrix: &EllMatrix<f64>) -> Result<EllMatrixGpu> {
        index_as_u32(matrix.num_rows(), "row count")?;
        index_as_u32(matrix.num_cols(), "column count")?;
        index_as_u32(matrix.stride(), "stride")?;
        let narrowed: Vec<u32> = matrix
            .column_indices()
            .iter()
            .map(|&c| {
                if c == ELL_PAD {
                    Ok(ELL_PAD_GPU)
                } else {
                    index_as_u32(c, "column index")
                }
            })
            .collect::<Result<_>>()?;
        let column_indices = self.context.create_gpu_buffer_with_data(
            "ELL column indices",
            bytemuck::cast_slice(&narrowed),
            MATRIX_BUFFER_USAGE,
        );
        let values = self.upload_values("ELL values", matrix.values());
        Ok(EllMatrixGpu::new_internal(
            matrix.num_rows(),
            matrix.num_cols(),
            matrix.num_entries(),
            matrix.cols_per_row(),
            matrix.stride(),
            column_indices,
            values,
            Arc::clone(&self.context),
        ))
    }

    /// Uploads a host HYB matrix as its two portions.
    pub fn create_hyb_matrix(&self, matrix: &HybMatrix<f64>) -> Result<HybMatrixGpu> {
        let ell = self.create_ell_matrix(matrix.ell())?;
        let coo = self.create_coo_matrix(matrix.coo())?;
        Ok(HybMatrixGpu::new_internal(ell, coo))
    }

    // --- BLAS-1 operations ---

    /// Sets every element of `v` to `value`.
    pub async fn fill(&self, v: &mut GpuVector, value: f64) -> Result<()> {
        ops::fill(&self.context, v, value)
    }

    /// `y = alpha * x + y`.
    pub async fn axpy(&self, alpha: f64, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        ops::axpy(&self.context, alpha, x, y)
    }

    /// `out = alpha * x + beta * y`; `out` must be a distinct vector.
    pub async fn axpby(
        &self,
        alpha: f64,
        x: &GpuVector,
        beta: f64,
        y: &GpuVector,
        out: &mut GpuVector,
    ) -> Result<()> {
        ops::axpby(&self.context, alpha, x, beta, y, out)
    }

    /// `out = a * out + b * y + c * z`, in place on `out`.
    pub async fn axpbypcz(
        &self,
        a: f64,
        out: &mut GpuVector,
        b: f64,
        y: &GpuVector,
        c: f64,
        z: &GpuVector,
    ) -> Result<()> {
        ops::axpbypcz(&self.context, a, out, b, y, c, z)
    }

    /// Inner product `x^T * y`, reduced on the device.
    pub async fn dot(&self, x: &GpuVector, y: &GpuVector) -> Result<f64> {
        ops::dot(&self.context, x, y).await
    }

    /// Euclidean norm of `x`.
    pub async fn nrm2(&self, x: &GpuVector) -> Result<f64> {
        Ok(ops::dot(&self.context, x, x).await?.sqrt())
    }

    /// `out = x * y` elementwise.
    pub async fn elementwise_mul(
        &self,
        x: &GpuVector,
        y: &GpuVector,
        out: &mut GpuVector,
    ) -> Result<()> {
        ops::elementwise_mul(&self.context, x, y, out)
    }

    /// `out = 1 / x` elementwise; near-zero inputs map to zero.
    pub async fn invert_elements(&self, x: &GpuVector, out: &mut GpuVector) -> Result<()> {
        ops::invert_elements(&self.context, x, out)
    }

    /// Writes the main diagonal of a CSR matrix into `out`.
    pub async fn extract_diagonal(
        &self,
        matrix: &CsrMatrixGpu,
        out: &mut GpuVector,
    ) -> Result<()> {
        if !Arc::ptr_eq(&self.context, &matrix.context) {
            return Err(SparlaCoreError::MemorySpaceMismatch(
                "matrix belongs to a different device".to_string(),
            ));
        }
        ops::extract_diagonal(matrix, out)
    }

    // --- Utility ---

    /// Returns the current transfer statistics.
    pub fn get_transfer_stats(&self) -> TransferStats {
        let (bytes_to_gpu, bytes_from_gpu) = self.context.get_transfer_stats();
        TransferStats {
            bytes_to_gpu,
            bytes_from_gpu,
        }
    }

    /// Resets the transfer statistics counters to zero.
    pub fn reset_transfer_stats(&self) {
        self.context.reset_transfer_stats();
    }
}

impl Device for GpuDevice {}

/// Bytes moved across the host/device boundary by the instrumented
/// helpers.
#[derive(Debug, Clone, Copy)]
pub struct TransferStats {
    pub bytes_to_gpu: u64,
    pub bytes_from_gpu: u64,
}
