//! Device-resident sparse matrix containers.
//!
//! Each host layout has a GPU counterpart holding `f64` values and `u32`
//! indices in wgpu buffers. Instances are created through the `GpuDevice`
//! `create_*` methods and can be read back with `download`.

use std::sync::Arc;

use crate::context::GpuContext;
use crate::device::GpuDevice;
use crate::error::Result;
use crate::formats::{CooMatrix, CsrMatrix, DiaMatrix, EllMatrix, HybMatrix, ELL_PAD};
use crate::ops;
use crate::traits::Matrix;
use crate::vector::GpuVector;

/// Device-side sentinel column for unused ELL slots.
pub(crate) const ELL_PAD_GPU: u32 = u32::MAX;

/// Selects the CSR multiply kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsrKernel {
    /// One thread per row; adequate when row lengths are regular.
    #[default]
    Scalar,
    /// One workgroup per row with an in-group reduction; better for wide
    /// rows, bounded by the device's per-dimension dispatch limit.
    Vector,
}

/// A matrix that can be applied to device vectors. The Krylov solvers are
/// generic over this seam.
pub trait GpuOperator: Matrix<Value = f64> + Sync {
    /// Computes `y = A * x` on the device.
    fn spmv<'a>(
        &'a self,
        x: &'a GpuVector,
        y: &'a mut GpuVector,
    ) -> impl std::future::Future<Output = Result<()>> + Send + 'a;

    /// Elementwise inverse of the main diagonal, for Jacobi
    /// preconditioning. Layouts without a cheap diagonal walk report
    /// `None`.
    fn inverse_diagonal<'a>(
        &'a self,
        device: &'a GpuDevice,
    ) -> impl std::future::Future<Output = Result<Option<GpuVector>>> + Send + 'a;
}

/// COO matrix in GPU memory.
#[derive(Debug)]
pub struct CooMatrixGpu {
    rows: usize,
    cols: usize,
    nnz: usize,
    row_indices_buffer: wgpu::Buffer,
    column_indices_buffer: wgpu::Buffer,
    values_buffer: wgpu::Buffer,
    pub(crate) context: Arc<GpuContext>,
}

impl CooMatrixGpu {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        rows: usize,
        cols: usize,
        nnz: usize,
        row_indices_buffer: wgpu::Buffer,
        column_indices_buffer: wgpu::Buffer,
        values_buffer: wgpu::Buffer,
        context: Arc<GpuContext>,
    ) -> Self {
        Self {
            rows,
            cols,
            nnz,
            row_indices_buffer,
            column_indices_buffer,
            values_buffer,
            context,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    pub(crate) fn row_indices_buffer(&self) -> &wgpu::Buffer {
        &self.row_indices_buffer
    }

    pub(crate) fn column_indices_buffer(&self) -> &wgpu::Buffer {
        &self.column_indices_buffer
    }

    pub(crate) fn values_buffer(&self) -> &wgpu::Buffer {
        &self.values_buffer
    }

    /// Computes `y = A * x` on the device.
    pub async fn spmv(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        ops::spmv_coo(self, x, y, false)
    }

    /// Reads the matrix back into a host container.
    pub async fn download(&self) -> Result<CooMatrix<f64>> {
        let row_indices: Vec<u32> = self
            .context
            .read_buffer_to_cpu(&self.row_indices_buffer, self.nnz)
            .await?;
        let column_indices: Vec<u32> = self
            .context
            .read_buffer_to_cpu(&self.column_indices_buffer, self.nnz)
            .await?;
        let values: Vec<f64> = self
            .context
            .read_buffer_to_cpu(&self.values_buffer, self.nnz)
            .await?;
        CooMatrix::from_parts(
            self.rows,
            self.cols,
            row_indices.into_iter().map(|i| i as usize).collect(),
            column_indices.into_iter().map(|i| i as usize).collect(),
            values,
        )
    }
}

impl Matrix for CooMatrixGpu {
    type Value = f64;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

impl GpuOperator for CooMatrixGpu {
    async fn spmv(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        ops::spmv_coo(self, x, y, false)
    }

    async fn inverse_diagonal(&self, _device: &GpuDevice) -> Result<Option<GpuVector>> {
        Ok(None)
    }
}

/// CSR matrix in GPU memory.
#[derive(Debug)]
pub struct CsrMatrixGpu {
    rows: usize,
    cols: usize,
    nnz: usize,
    row_offsets_buffer: wgpu::Buffer,
    column_indices_buffer: wgpu::Buffer,
    values_buffer: wgpu::Buffer,
    pub(crate) context: Arc<GpuContext>,
}

impl CsrMatrixGpu {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        rows: usize,
        cols: usize,
        nnz: usize,
        row_offsets_buffer: wgpu::Buffer,
        column_indices_buffer: wgpu::Buffer,
        values_buffer: wgpu::Buffer,
        context: Arc<GpuContext>,
    ) -> Self {
        Self {
            rows,
            cols,
            nnz,
            row_offsets_buffer,
            column_indices_buffer,
            values_buffer,
            context,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    pub(crate) fn row_offsets_buffer(&self) -> &wgpu::Buffer {
        &self.row_offsets_buffer
    }

    pub(crate) fn column_indices_buffer(&self) -> &wgpu::Buffer {
        &self.column_indices_buffer
    }

    pub(crate) fn values_buffer(&self) -> &wgpu::Buffer {
        &self.values_buffer
    }

    /// Computes `y = A * x` with the scalar kernel.
    pub async fn spmv(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        self.spmv_with(x, y, CsrKernel::Scalar).await
    }

    /// Computes `y = A * x` with an explicit kernel choice.
    pub async fn spmv_with(
        &self,
        x: &GpuVector,
        y: &mut GpuVector,
        kernel: CsrKernel,
    ) -> Result<()> {
        ops::spmv_csr(self, x, y, kernel == CsrKernel::Vector)
    }

    /// Reads the matrix back into a host container.
    pub async fn download(&self) -> Result<CsrMatrix<f64>> {
        let row_offsets: Vec<u32> = self
            .context
            .read_buffer_to_cpu(&self.row_offsets_buffer, self.rows + 1)
            .await?;
        let column_indices: Vec<u32> = self
            .context
            .read_buffer_to_cpu(&self.column_indices_buffer, self.nnz)
            .await?;
        let values: Vec<f64> = self
            .context
            .read_buffer_to_cpu(&self.values_buffer, self.nnz)
            .await?;
        CsrMatrix::from_parts(
            self.rows,
            self.cols,
            row_offsets.into_iter().map(|i| i as usize).collect(),
            column_indices.into_iter().map(|i| i as usize).collect(),
            values,
        )
    }
}

impl Matrix for CsrMatrixGpu {
    type Value = f64;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

impl GpuOperator for CsrMatrixGpu {
    async fn spmv(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        ops::spmv_csr(self, x, y, false)
    }

    async fn inverse_diagonal(&self, device: &GpuDevice) -> Result<Option<GpuVector>> {
        let mut diagonal = device.create_empty_vector("diagonal", self.rows)?;
        device.extract_diagonal(self, &mut diagonal).await?;
        let mut inverse = device.create_empty_vector("inverse diagonal", self.rows)?;
        device.invert_elements(&diagonal, &mut inverse).await?;
        Ok(Some(inverse))
    }
}

/// DIA matrix in GPU memory.
#[derive(Debug)]
pub struct DiaMatrixGpu {
    rows: usize,
    cols: usize,
    nnz: usize,
    num_diagonals: usize,
    stride: usize,
    diagonal_offsets_buffer: wgpu::Buffer,
    values_buffer: wgpu::Buffer,
    pub(crate) context: Arc<GpuContext>,
}

impl DiaMatrixGpu {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        rows: usize,
        cols: usize,
        nnz: usize,
        num_diagonals: usize,
        stride: usize,
        diagonal_offsets_buffer: wgpu::Buffer,
        values_buffer: wgpu::Buffer,
        context: Arc<GpuContext>,
    ) -> Self {
        Self {
            rows,
            cols,
            nnz,
            num_diagonals,
            stride,
            diagonal_offsets_buffer,
            values_buffer,
            context,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    pub fn num_diagonals(&self) -> usize {
        self.num_diagonals
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub(crate) fn diagonal_offsets_buffer(&self) -> &wgpu::Buffer {
        &self.diagonal_offsets_buffer
    }

    pub(crate) fn values_buffer(&self) -> &wgpu::Buffer {
        &self.values_buffer
    }

    /// Computes `y = A * x` on the device.
    pub async fn spmv(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        ops::spmv_dia(self, x, y)
    }

    /// Reads the matrix back into a host container.
    pub async fn download(&self) -> Result<DiaMatrix<f64>> {
        let offsets: Vec<i32> = self
            .context
            .read_buffer_to_cpu(&self.diagonal_offsets_buffer, self.num_diagonals)
            .await?;
        let values: Vec<f64> = self
            .context
            .read_buffer_to_cpu(&self.values_buffer, self.stride * self.num_diagonals)
            .await?;
        DiaMatrix::from_parts(
            self.rows,
            self.cols,
            self.nnz,
            self.stride,
            offsets.into_iter().map(|o| o as isize).collect(),
            values,
        )
    }
}

impl Matrix for DiaMatrixGpu {
    type Value = f64;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

impl GpuOperator for DiaMatrixGpu {
    async fn spmv(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        ops::spmv_dia(self, x, y)
    }

    async fn inverse_diagonal(&self, _device: &GpuDevice) -> Result<Option<GpuVector>> {
        Ok(None)
    }
}

/// ELL matrix in GPU memory.
#[derive(Debug)]
pub struct EllMatrixGpu {
    rows: usize,
    cols: usize,
    nnz: usize,
    cols_per_row: usize,
    stride: usize,
    column_indices_buffer: wgpu::Buffer,
    values_buffer: wgpu::Buffer,
    pub(crate) context: Arc<GpuContext>,
}

impl EllMatrixGpu {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        rows: usize,
        cols: usize,
        nnz: usize,
        cols_per_row: usize,
        stride: usize,
        column_indices_buffer: wgpu::Buffer,
        values_buffer: wgpu::Buffer,
        context: Arc<GpuContext>,
    ) -> Self {
        Self {
            rows,
            cols,
            nnz,
            cols_per_row,
            stride,
            column_indices_buffer,
            values_buffer,
            context,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    pub fn cols_per_row(&self) -> usize {
        self.cols_per_row
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub(crate) fn column_indices_buffer(&self) -> &wgpu::Buffer {
        &self.column_indices_buffer
    }

    pub(crate) fn values_buffer(&self) -> &wgpu::Buffer {
        &self.values_buffer
    }

    /// Computes `y = A * x` on the device.
    pub async fn spmv(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        ops::spmv_ell(self, x, y)
    }

    /// Reads the matrix back into a host container.
    pub async fn download(&self) -> Result<EllMatrix<f64>> {
        let column_indices: Vec<u32> = self
            .context
            .read_buffer_to_cpu(&self.column_indices_buffer, self.stride * self.cols_per_row)
            .await?;
        let values: Vec<f64> = self
            .context
            .read_buffer_to_cpu(&self.values_buffer, self.stride * self.cols_per_row)
            .await?;
        EllMatrix::from_parts(
            self.rows,
            self.cols,
            self.nnz,
            self.cols_per_row,
            self.stride,
            column_indices
                .into_iter()
                .map(|c| if c == ELL_PAD_GPU { ELL_PAD } else { c as usize })
                .collect(),
            values,
        )
    }
}

impl Matrix for EllMatrixGpu {
    type Value = f64;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

impl GpuOperator for EllMatrixGpu {
    async fn spmv(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        ops::spmv_ell(self, x, y)
    }

    async fn inverse_diagonal(&self, _device: &GpuDevice) -> Result<Option<GpuVector>> {
        Ok(None)
    }
}

/// HYB matrix in GPU memory: an ELL portion and a COO overflow tail.
#[derive(Debug)]
pub struct HybMatrixGpu {
    ell: EllMatrixGpu,
    coo: CooMatrixGpu,
}

impl HybMatrixGpu {
    pub(crate) fn new_internal(ell: EllMatrixGpu, coo: CooMatrixGpu) -> Self {
        Self { ell, coo }
    }

    pub fn rows(&self) -> usize {
        self.ell.rows()
    }

    pub fn cols(&self) -> usize {
        self.ell.cols()
    }

    pub fn nnz(&self) -> usize {
        self.ell.nnz() + self.coo.nnz()
    }

    pub fn ell(&self) -> &EllMatrixGpu {
        &self.ell
    }

    pub fn coo(&self) -> &CooMatrixGpu {
        &self.coo
    }

    /// Computes `y = A * x`: the ELL portion overwrites `y`, then the COO
    /// tail accumulates into it.
    pub async fn spmv(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        ops::spmv_ell(&self.ell, x, y)?;
        ops::spmv_coo(&self.coo, x, y, true)
    }

    /// Reads the matrix back into a host container.
    pub async fn download(&self) -> Result<HybMatrix<f64>> {
        let ell = self.ell.download().await?;
        let coo = self.coo.download().await?;
        HybMatrix::from_parts(ell, coo)
    }
}

impl Matrix for HybMatrixGpu {
    type Value = f64;

    fn dims(&self) -> (usize, usize) {
        self.ell.dims()
    }
}

impl GpuOperator for HybMatrixGpu {
    async fn spmv(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        ops::spmv_ell(&self.ell, x, y)?;
        ops::spmv_coo(&self.coo, x, y, true)
    }

    async fn inverse_diagonal(&self, _device: &GpuDevice) -> Result<Option<GpuVector>> {
        Ok(None)
    }
}
