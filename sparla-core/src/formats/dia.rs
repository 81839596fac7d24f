use serde::{Deserialize, Serialize};

use crate::array::Array1d;
use crate::error::{Result, SparlaCoreError};
use crate::traits::{cast_value, Matrix, Scalar};

/// Storage rows are padded up to a multiple of this so diagonals start on
/// aligned boundaries.
const STRIDE_ALIGNMENT: usize = 32;

pub(crate) fn aligned_stride(num_rows: usize) -> usize {
    num_rows.div_ceil(STRIDE_ALIGNMENT) * STRIDE_ALIGNMENT
}

/// Sparse matrix in diagonal (DIA) format.
///
/// `diagonal_offsets` holds the sorted, unique offsets of the occupied
/// diagonals (`column - row`); `values` is a dense `stride x D` matrix in
/// column-major order over the diagonals. Positions falling outside the
/// matrix carry an explicit zero and are skipped by the kernels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaMatrix<V = f64> {
    num_rows: usize,
    num_cols: usize,
    num_entries: usize,
    stride: usize,
    pub(crate) diagonal_offsets: Vec<isize>,
    pub(crate) values: Array1d<V>,
}

impl<V: Scalar> DiaMatrix<V> {
    /// Creates an empty matrix with all dimensions zero.
    pub fn new() -> Self {
        Self {
            num_rows: 0,
            num_cols: 0,
            num_entries: 0,
            stride: 0,
            diagonal_offsets: Vec::new(),
            values: Array1d::new(),
        }
    }

    /// Allocates storage for the given shape and diagonal count. The
    /// offsets and band values are zero-initialized for the caller to fill.
    pub fn with_shape(
        num_rows: usize,
        num_cols: usize,
        num_entries: usize,
        num_diagonals: usize,
    ) -> Self {
        let stride = aligned_stride(num_rows);
        Self {
            num_rows,
            num_cols,
            num_entries,
            stride,
            diagonal_offsets: vec![0; num_diagonals],
            values: Array1d::zeros(stride * num_diagonals),
        }
    }

    /// Builds a matrix from component arrays, validating offsets and sizes.
    pub fn from_parts(
        num_rows: usize,
        num_cols: usize,
        num_entries: usize,
        stride: usize,
        diagonal_offsets: Vec<isize>,
        values: Vec<V>,
    ) -> Result<Self> {
        if stride < num_rows {
            return Err(SparlaCoreError::InvalidStructure(format!(
                "stride ({}) must be at least num_rows ({})",
                stride, num_rows
            )));
        }
        if values.len() != stride * diagonal_offsets.len() {
            return Err(SparlaCoreError::InvalidStructure(format!(
                "values length ({}) must equal stride * num_diagonals ({})",
                values.len(),
                stride * diagonal_offsets.len()
            )));
        }
        for w in diagonal_offsets.windows(2) {
            if w[0] >= w[1] {
                return Err(SparlaCoreError::InvalidStructure(
                    "diagonal offsets must be sorted and unique".to_string(),
                ));
            }
        }
        Ok(Self {
            num_rows,
            num_cols,
            num_entries,
            stride,
            diagonal_offsets,
            values: Array1d::from_vec(values),
        })
    }

    /// Reallocates to the given shape. Prior content is discarded.
    pub fn resize(
        &mut self,
        num_rows: usize,
        num_cols: usize,
        num_entries: usize,
        num_diagonals: usize,
    ) {
        *self = Self::with_shape(num_rows, num_cols, num_entries, num_diagonals);
    }

    /// Exchanges the contents of two matrices in O(1).
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// True nonzero count carried over from the conversion source.
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    pub fn num_diagonals(&self) -> usize {
        self.diagonal_offsets.len()
    }

    /// Leading dimension of the column-major band storage.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn diagonal_offsets(&self) -> &[isize] {
        &self.diagonal_offsets
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [V] {
        &mut self.values
    }

    /// Looks up a value; zeros stored in the band are reported as absent.
    pub fn get(&self, row: usize, col: usize) -> Option<V> {
        if row >= self.num_rows || col >= self.num_cols {
            return None;
        }
        let offset = col as isize - row as isize;
        let k = self.diagonal_offsets.binary_search(&offset).ok()?;
        let v = self.values[k * self.stride + row];
        if v == V::zero() {
            None
        } else {
            Some(v)
        }
    }

    /// Deep copy into a possibly different value type.
    pub fn convert_values<W: Scalar>(&self) -> DiaMatrix<W> {
        DiaMatrix {
            num_rows: self.num_rows,
            num_cols: self.num_cols,
            num_entries: self.num_entries,
            stride: self.stride,
            diagonal_offsets: self.diagonal_offsets.clone(),
            values: self.values.iter().map(|&v| cast_value(v)).collect(),
        }
    }
}

impl<V: Scalar> Default for DiaMatrix<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Scalar> Matrix for DiaMatrix<V> {
    type Value = V;

    fn dims(&self) -> (usize, usize) {
        (self.num_rows, self.num_cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag_4x4() -> DiaMatrix<f64> {
        // diag(1, 2, 3, 4)
        let stride = aligned_stride(4);
        let mut values = vec![0.0; stride];
        values[..4].copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        DiaMatrix::from_parts(4, 4, 4, stride, vec![0], values).unwrap()
    }

    #[test]
    fn test_from_parts_valid() {
        let m = diag_4x4();
        assert_eq!(m.num_diagonals(), 1);
        assert_eq!(m.get(2, 2), Some(3.0));
        assert_eq!(m.get(0, 1), None);
    }

    #[test]
    fn test_from_parts_stride_too_small() {
        let m = DiaMatrix::from_parts(4, 4, 4, 2, vec![0], vec![0.0; 2]);
        assert!(matches!(m, Err(SparlaCoreError::InvalidStructure(_))));
    }

    #[test]
    fn test_from_parts_unsorted_offsets() {
        let stride = aligned_stride(2);
        let m = DiaMatrix::from_parts(2, 2, 3, stride, vec![1, -1], vec![0.0; 2 * stride]);
        assert!(m.is_err());
    }

    #[test]
    fn test_stride_alignment() {
        let m: DiaMatrix<f64> = DiaMatrix::with_shape(5, 5, 0, 2);
        assert_eq!(m.stride(), 32);
        assert!(m.stride() >= m.num_rows());
    }
}
