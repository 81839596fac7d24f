use serde::{Deserialize, Serialize};

use crate::array::Array1d;
use crate::error::{Result, SparlaCoreError};
use crate::traits::{cast_value, Matrix, Scalar};

/// Sparse matrix in compressed sparse row (CSR) format.
///
/// `row_offsets` has `num_rows + 1` entries, starts at zero, is monotone
/// non-decreasing and ends at `num_entries`; within each row the column
/// indices are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix<V = f64> {
    num_rows: usize,
    num_cols: usize,
    pub(crate) row_offsets: Vec<usize>,
    pub(crate) column_indices: Vec<usize>,
    pub(crate) values: Array1d<V>,
}

impl<V: Scalar> CsrMatrix<V> {
    /// Creates an empty matrix with all dimensions zero.
    pub fn new() -> Self {
        Self {
            num_rows: 0,
            num_cols: 0,
            row_offsets: vec![0],
            column_indices: Vec::new(),
            values: Array1d::new(),
        }
    }

    /// Allocates storage for a matrix of the given shape and entry count.
    ///
    /// `row_offsets` is zero-initialized; the caller populates the arrays
    /// through the mutable views before using the matrix.
    pub fn with_shape(num_rows: usize, num_cols: usize, num_entries: usize) -> Self {
        Self {
            num_rows,
            num_cols,
            row_offsets: vec![0; num_rows + 1],
            column_indices: vec![0; num_entries],
            values: Array1d::zeros(num_entries),
        }
    }

    /// Builds a matrix from component arrays, validating the CSR invariants.
    pub fn from_parts(
        num_rows: usize,
        num_cols: usize,
        row_offsets: Vec<usize>,
        column_indices: Vec<usize>,
        values: Vec<V>,
    ) -> Result<Self> {
        if row_offsets.len() != num_rows + 1 {
            return Err(SparlaCoreError::InvalidStructure(format!(
                "row_offsets length must be num_rows + 1 ({} != {})",
                row_offsets.len(),
                num_rows + 1
            )));
        }
        if column_indices.len() != values.len() {
            return Err(SparlaCoreError::InvalidStructure(format!(
                "column_indices and values must have the same length ({} != {})",
                column_indices.len(),
                values.len()
            )));
        }
        if row_offsets[0] != 0 {
            return Err(SparlaCoreError::InvalidStructure(
                "row_offsets must start at 0".to_string(),
            ));
        }
        if row_offsets[num_rows] != values.len() {
            return Err(SparlaCoreError::InvalidStructure(format!(
                "last row offset ({}) must equal the number of stored entries ({})",
                row_offsets[num_rows],
                values.len()
            )));
        }
        for i in 0..num_rows {
            if row_offsets[i] > row_offsets[i + 1] {
                return Err(SparlaCoreError::InvalidStructure(format!(
                    "row_offsets must be non-decreasing (row {})",
                    i
                )));
            }
            for k in row_offsets[i]..row_offsets[i + 1] {
                if column_indices[k] >= num_cols {
                    return Err(SparlaCoreError::InvalidStructure(format!(
                        "column index {} out of bounds in row {}",
                        column_indices[k], i
                    )));
                }
                if k > row_offsets[i] && column_indices[k - 1] >= column_indices[k] {
                    return Err(SparlaCoreError::InvalidStructure(format!(
                        "column indices must be strictly increasing within row {}",
                        i
                    )));
                }
            }
        }
        Ok(Self {
            num_rows,
            num_cols,
            row_offsets,
            column_indices,
            values: Array1d::from_vec(values),
        })
    }

    /// Builds a matrix from a dense row-major representation, dropping
    /// zeros. Intended for tests and small examples.
    pub fn from_dense(dense: &[Vec<V>]) -> Self {
        let num_rows = dense.len();
        let num_cols = dense.first().map_or(0, |row| row.len());
        let mut row_offsets = vec![0; num_rows + 1];
        let mut column_indices = Vec::new();
        let mut values = Vec::new();
        for (i, row) in dense.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                if v != V::zero() {
                    column_indices.push(j);
                    values.push(v);
                }
            }
            row_offsets[i + 1] = values.len();
        }
        Self {
            num_rows,
            num_cols,
            row_offsets,
            column_indices,
            values: Array1d::from_vec(values),
        }
    }

    /// Reallocates to the given shape and entry count. Prior content is
    /// discarded.
    pub fn resize(&mut self, num_rows: usize, num_cols: usize, num_entries: usize) {
        *self = Self::with_shape(num_rows, num_cols, num_entries);
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

    /// Number of stored entries.
    pub fn num_entries(&self) -> usize {
        self.values.len()
    }

    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
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

    /// Length of the longest row.
    pub fn max_row_length(&self) -> usize {
        (0..self.num_rows)
            .map(|i| self.row_offsets[i + 1] - self.row_offsets[i])
            .max()
            .unwrap_or(0)
    }

    /// Looks up a stored value by binary search within the row.
    pub fn get(&self, row: usize, col: usize) -> Option<V> {
        if row >= self.num_rows || col >= self.num_cols {
            return None;
        }
        let start = self.row_offsets[row];
        let end = self.row_offsets[row + 1];
        self.column_indices[start..end]
            .binary_search(&col)
            .ok()
            .map(|k| self.values[start + k])
    }

    /// Deep copy into a possibly different value type. Precision is lost
    /// only when `W` is narrower than `V`.
    pub fn convert_values<W: Scalar>(&self) -> CsrMatrix<W> {
        CsrMatrix {
            num_rows: self.num_rows,
            num_cols: self.num_cols,
            row_offsets: self.row_offsets.clone(),
            column_indices: self.column_indices.clone(),
            values: self.values.iter().map(|&v| cast_value(v)).collect(),
        }
    }
}

impl<V: Scalar> Default for CsrMatrix<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Scalar> Matrix for CsrMatrix<V> {
    type Value = V;

    fn dims(&self) -> (usize, usize) {
        (self.num_rows, self.num_cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_valid() {
        let m = CsrMatrix::from_parts(
            3,
            4,
            vec![0, 2, 4, 5],
            vec![0, 2, 1, 3, 2],
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
        )
        .unwrap();
        assert_eq!(m.dims(), (3, 4));
        assert_eq!(m.num_entries(), 5);
        assert_eq!(m.get(0, 2), Some(2.0));
        assert_eq!(m.get(2, 2), Some(5.0));
        assert_eq!(m.get(2, 0), None);
    }

    #[test]
    fn test_from_parts_bad_offsets_len() {
        let m = CsrMatrix::from_parts(3, 4, vec![0, 1], vec![0], vec![1.0]);
        assert!(matches!(m, Err(SparlaCoreError::InvalidStructure(_))));
    }

    #[test]
    fn test_from_parts_bad_last_offset() {
        let m = CsrMatrix::from_parts(2, 4, vec![0, 1, 1], vec![0, 1], vec![1.0, 2.0]);
        assert!(m.is_err());
    }

    #[test]
    fn test_from_parts_unsorted_columns() {
        let m = CsrMatrix::from_parts(1, 4, vec![0, 2], vec![2, 1], vec![1.0, 2.0]);
        assert!(m.is_err());
    }

    #[test]
    fn test_from_parts_column_out_of_bounds() {
        let m = CsrMatrix::from_parts(1, 2, vec![0, 1], vec![2], vec![1.0]);
        assert!(m.is_err());
    }

    #[test]
    fn test_from_dense() {
        let m = CsrMatrix::from_dense(&[
            vec![1.0, 0.0, 2.0],
            vec![0.0, 0.0, 0.0],
            vec![0.0, 3.0, 0.0],
        ]);
        assert_eq!(m.row_offsets(), &[0, 2, 2, 3]);
        assert_eq!(m.column_indices(), &[0, 2, 1]);
        assert_eq!(m.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_max_row_length() {
        let m = CsrMatrix::from_parts(2, 4, vec![0, 3, 4], vec![0, 1, 2, 3], vec![1.0; 4]).unwrap();
        assert_eq!(m.max_row_length(), 3);
    }
}
