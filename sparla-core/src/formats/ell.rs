use serde::{Deserialize, Serialize};

use crate::array::Array1d;
use crate::error::{Result, SparlaCoreError};
use crate::formats::dia::aligned_stride;
use crate::traits::{cast_value, Matrix, Scalar};

/// Column index marking an unused ELL slot. Serializes as the all-ones bit
/// pattern, i.e. index -1 in the on-disk layout.
pub const ELL_PAD: usize = usize::MAX;

/// Sparse matrix in ELLPACK (ELL) format.
///
/// Every row stores exactly `cols_per_row` slots in a column-major
/// `stride x cols_per_row` layout; rows with fewer nonzeros are padded with
/// [`ELL_PAD`] columns and zero values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EllMatrix<V = f64> {
    num_rows: usize,
    num_cols: usize,
    num_entries: usize,
    cols_per_row: usize,
    stride: usize,
    pub(crate) column_indices: Vec<usize>,
    pub(crate) values: Array1d<V>,
}

impl<V: Scalar> EllMatrix<V> {
    /// Creates an empty matrix with all dimensions zero.
    pub fn new() -> Self {
        Self {
            num_rows: 0,
            num_cols: 0,
            num_entries: 0,
            cols_per_row: 0,
            stride: 0,
            column_indices: Vec::new(),
            values: Array1d::new(),
        }
    }

    /// Allocates storage for the given shape and row width. Every slot
    /// starts out padded.
    pub fn with_shape(
        num_rows: usize,
        num_cols: usize,
        num_entries: usize,
        cols_per_row: usize,
    ) -> Self {
        let stride = aligned_stride(num_rows);
        Self {
            num_rows,
            num_cols,
            num_entries,
            cols_per_row,
            stride,
            column_indices: vec![ELL_PAD; stride * cols_per_row],
            values: Array1d::zeros(stride * cols_per_row),
        }
    }

    /// Builds a matrix from component arrays, validating slot contents.
    pub fn from_parts(
        num_rows: usize,
        num_cols: usize,
        num_entries: usize,
        cols_per_row: usize,
        stride: usize,
        column_indices: Vec<usize>,
        values: Vec<V>,
    ) -> Result<Self> {
        if stride < num_rows {
            return Err(SparlaCoreError::InvalidStructure(format!(
                "stride ({}) must be at least num_rows ({})",
                stride, num_rows
            )));
        }
        if column_indices.len() != stride * cols_per_row || values.len() != stride * cols_per_row {
            return Err(SparlaCoreError::InvalidStructure(format!(
                "slot arrays must hold stride * cols_per_row ({}) entries",
                stride * cols_per_row
            )));
        }
        for (slot, &c) in column_indices.iter().enumerate() {
            if c == ELL_PAD {
                if values[slot] != V::zero() {
                    return Err(SparlaCoreError::InvalidStructure(format!(
                        "padded slot {} must carry a zero value",
                        slot
                    )));
                }
            } else if c >= num_cols {
                return Err(SparlaCoreError::InvalidStructure(format!(
                    "column index {} out of bounds at slot {}",
                    c, slot
                )));
            }
        }
        Ok(Self {
            num_rows,
            num_cols,
            num_entries,
            cols_per_row,
            stride,
            column_indices,
            values: Array1d::from_vec(values),
        })
    }

    /// Reallocates to the given shape. Prior content is discarded.
    pub fn resize(
        &mut self,
        num_rows: usize,
        num_cols: usize,
        num_entries: usize,
        cols_per_row: usize,
    ) {
        *self = Self::with_shape(num_rows, num_cols, num_entries, cols_per_row);
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

    /// True nonzero count (slots minus padding).
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// Maximum entries stored per row (`E`).
    pub fn cols_per_row(&self) -> usize {
        self.cols_per_row
    }

    /// Leading dimension of the column-major slot storage.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn column_indices(&self) -> &[usize] {
        &self.column_indices
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [V] {
        &mut self.values
    }

    /// Looks up a stored value by scanning the row's slots.
    pub fn get(&self, row: usize, col: usize) -> Option<V> {
        if row >= self.num_rows || col >= self.num_cols {
            return None;
        }
        for k in 0..self.cols_per_row {
            let slot = k * self.stride + row;
            if self.column_indices[slot] == col {
                return Some(self.values[slot]);
            }
        }
        None
    }

    /// Deep copy into a possibly different value type.
    pub fn convert_values<W: Scalar>(&self) -> EllMatrix<W> {
        EllMatrix {
            num_rows: self.num_rows,
            num_cols: self.num_cols,
            num_entries: self.num_entries,
            cols_per_row: self.cols_per_row,
            stride: self.stride,
            column_indices: self.column_indices.clone(),
            values: self.values.iter().map(|&v| cast_value(v)).collect(),
        }
    }
}

impl<V: Scalar> Default for EllMatrix<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Scalar> Matrix for EllMatrix<V> {
    type Value = V;

    fn dims(&self) -> (usize, usize) {
        (self.num_rows, self.num_cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_shape_is_padded() {
        let m: EllMatrix<f64> = EllMatrix::with_shape(3, 3, 0, 2);
        assert!(m.column_indices().iter().all(|&c| c == ELL_PAD));
        assert!(m.values().iter().all(|&v| v == 0.0));
        assert!(m.stride() >= m.num_rows());
    }

    #[test]
    fn test_from_parts_rejects_nonzero_pad() {
        let stride = aligned_stride(1);
        let mut cols = vec![ELL_PAD; stride];
        let mut vals = vec![0.0; stride];
        cols[0] = ELL_PAD;
        vals[0] = 1.0;
        let m = EllMatrix::from_parts(1, 1, 0, 1, stride, cols, vals);
        assert!(matches!(m, Err(SparlaCoreError::InvalidStructure(_))));
    }

    #[test]
    fn test_from_parts_rejects_out_of_bounds_column() {
        let stride = aligned_stride(1);
        let mut cols = vec![ELL_PAD; stride];
        cols[0] = 5;
        let m = EllMatrix::from_parts(1, 2, 1, 1, stride, cols, vec![0.0; stride]);
        assert!(m.is_err());
    }

    #[test]
    fn test_get() {
        let mut m: EllMatrix<f64> = EllMatrix::with_shape(2, 3, 2, 1);
        let stride = m.stride();
        m.column_indices[0] = 2;
        m.values[0] = 4.0;
        m.column_indices[stride] = 0;
        m.values[stride] = 5.0;
        assert_eq!(m.get(0, 2), Some(4.0));
        assert_eq!(m.get(1, 0), Some(5.0));
        assert_eq!(m.get(0, 0), None);
    }
}
