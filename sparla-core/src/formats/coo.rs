use serde::{Deserialize, Serialize};

use crate::array::Array1d;
use crate::error::{Result, SparlaCoreError};
use crate::traits::{cast_value, Matrix, Scalar};

/// Sparse matrix in coordinate (COO) format.
///
/// Entries are kept sorted lexicographically by `(row, column)` with no
/// duplicate coordinates; the validated constructors enforce this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooMatrix<V = f64> {
    num_rows: usize,
    num_cols: usize,
    pub(crate) row_indices: Vec<usize>,
    pub(crate) column_indices: Vec<usize>,
    pub(crate) values: Array1d<V>,
}

impl<V: Scalar> CooMatrix<V> {
    /// Creates an empty matrix with all dimensions zero.
    pub fn new() -> Self {
        Self {
            num_rows: 0,
            num_cols: 0,
            row_indices: Vec::new(),
            column_indices: Vec::new(),
            values: Array1d::new(),
        }
    }

    /// Allocates storage for a matrix of the given shape and entry count.
    ///
    /// The index and value arrays are zero-initialized; the caller is
    /// expected to populate them (in sorted order) through the mutable
    /// views before using the matrix.
    pub fn with_shape(num_rows: usize, num_cols: usize, num_entries: usize) -> Self {
        Self {
            num_rows,
            num_cols,
            row_indices: vec![0; num_entries],
            column_indices: vec![0; num_entries],
            values: Array1d::zeros(num_entries),
        }
    }

    /// Builds a matrix from unordered `(row, col, value)` triplets.
    ///
    /// Triplets are sorted by `(row, col)`; duplicate coordinates are summed.
    pub fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        triplets: Vec<(usize, usize, V)>,
    ) -> Result<Self> {
        let mut triplets = triplets;
        for &(row, col, _) in &triplets {
            if row >= num_rows || col >= num_cols {
                return Err(SparlaCoreError::InvalidStructure(format!(
                    "entry ({}, {}) out of bounds for a {}x{} matrix",
                    row, col, num_rows, num_cols
                )));
            }
        }
        triplets.sort_unstable_by_key(|&(row, col, _)| (row, col));

        let mut row_indices = Vec::with_capacity(triplets.len());
        let mut column_indices = Vec::with_capacity(triplets.len());
        let mut values: Vec<V> = Vec::with_capacity(triplets.len());
        for (row, col, value) in triplets {
            if row_indices.last() == Some(&row) && column_indices.last() == Some(&col) {
                if let Some(last) = values.last_mut() {
                    *last = *last + value;
                }
            } else {
                row_indices.push(row);
                column_indices.push(col);
                values.push(value);
            }
        }

        Ok(Self {
            num_rows,
            num_cols,
            row_indices,
            column_indices,
            values: Array1d::from_vec(values),
        })
    }

    /// Builds a matrix from pre-sorted component arrays, validating the
    /// sortedness, uniqueness and bounds invariants.
    pub fn from_parts(
        num_rows: usize,
        num_cols: usize,
        row_indices: Vec<usize>,
        column_indices: Vec<usize>,
        values: Vec<V>,
    ) -> Result<Self> {
        if row_indices.len() != values.len() || column_indices.len() != values.len() {
            return Err(SparlaCoreError::InvalidStructure(format!(
                "component lengths disagree: rows={}, cols={}, values={}",
                row_indices.len(),
                column_indices.len(),
                values.len()
            )));
        }
        for k in 0..values.len() {
            if row_indices[k] >= num_rows || column_indices[k] >= num_cols {
                return Err(SparlaCoreError::InvalidStructure(format!(
                    "entry ({}, {}) out of bounds for a {}x{} matrix",
                    row_indices[k], column_indices[k], num_rows, num_cols
                )));
            }
            if k > 0 {
                let prev = (row_indices[k - 1], column_indices[k - 1]);
                let cur = (row_indices[k], column_indices[k]);
                if prev >= cur {
                    return Err(SparlaCoreError::InvalidStructure(format!(
                        "entries not strictly sorted by (row, column) at position {}",
                        k
                    )));
                }
            }
        }
        Ok(Self {
            num_rows,
            num_cols,
            row_indices,
            column_indices,
            values: Array1d::from_vec(values),
        })
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

    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
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

    /// Looks up a stored value by binary search over the sorted entries.
    pub fn get(&self, row: usize, col: usize) -> Option<V> {
        if row >= self.num_rows || col >= self.num_cols {
            return None;
        }
        let start = self.row_indices.partition_point(|&r| r < row);
        let end = self.row_indices.partition_point(|&r| r <= row);
        self.column_indices[start..end]
            .binary_search(&col)
            .ok()
            .map(|k| self.values[start + k])
    }

    /// Iterates over the stored `(row, col, value)` entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, V)> + '_ {
        (0..self.num_entries())
            .map(move |k| (self.row_indices[k], self.column_indices[k], self.values[k]))
    }

    /// Deep copy into a possibly different value type. Precision is lost
    /// only when `W` is narrower than `V`.
    pub fn convert_values<W: Scalar>(&self) -> CooMatrix<W> {
        CooMatrix {
            num_rows: self.num_rows,
            num_cols: self.num_cols,
            row_indices: self.row_indices.clone(),
            column_indices: self.column_indices.clone(),
            values: self.values.iter().map(|&v| cast_value(v)).collect(),
        }
    }
}

impl<V: Scalar> Default for CooMatrix<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Scalar> Matrix for CooMatrix<V> {
    type Value = V;

    fn dims(&self) -> (usize, usize) {
        (self.num_rows, self.num_cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_empty() {
        let m: CooMatrix<f64> = CooMatrix::new();
        assert_eq!(m.dims(), (0, 0));
        assert_eq!(m.num_entries(), 0);
    }

    #[test]
    fn test_from_triplets_sorts() {
        let m = CooMatrix::from_triplets(
            3,
            3,
            vec![(2, 0, 4.0), (0, 2, 2.0), (1, 2, 3.0), (0, 0, 1.0), (2, 1, 5.0)],
        )
        .unwrap();
        assert_eq!(m.row_indices(), &[0, 0, 1, 2, 2]);
        assert_eq!(m.column_indices(), &[0, 2, 2, 0, 1]);
        assert_eq!(m.values(), &[1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_from_triplets_sums_duplicates() {
        let m = CooMatrix::from_triplets(2, 2, vec![(0, 1, 1.5), (0, 1, 2.5)]).unwrap();
        assert_eq!(m.num_entries(), 1);
        assert_eq!(m.get(0, 1), Some(4.0));
    }

    #[test]
    fn test_from_triplets_out_of_bounds() {
        let m = CooMatrix::from_triplets(2, 2, vec![(2, 0, 1.0)]);
        assert!(matches!(m, Err(SparlaCoreError::InvalidStructure(_))));
    }

    #[test]
    fn test_from_parts_rejects_unsorted() {
        let m = CooMatrix::from_parts(2, 2, vec![1, 0], vec![0, 0], vec![1.0, 2.0]);
        assert!(m.is_err());
    }

    #[test]
    fn test_from_parts_rejects_duplicates() {
        let m = CooMatrix::from_parts(2, 2, vec![0, 0], vec![1, 1], vec![1.0, 2.0]);
        assert!(m.is_err());
    }

    #[test]
    fn test_get() {
        let m = CooMatrix::from_triplets(2, 3, vec![(0, 0, 1.0), (1, 2, 2.0)]).unwrap();
        assert_eq!(m.get(0, 0), Some(1.0));
        assert_eq!(m.get(1, 2), Some(2.0));
        assert_eq!(m.get(0, 1), None);
        assert_eq!(m.get(5, 0), None);
    }

    #[test]
    fn test_convert_values_narrowing() {
        let m = CooMatrix::from_triplets(1, 1, vec![(0, 0, 1.5f64)]).unwrap();
        let n: CooMatrix<f32> = m.convert_values();
        assert_eq!(n.get(0, 0), Some(1.5f32));
    }

    #[test]
    fn test_resize_discards() {
        let mut m = CooMatrix::from_triplets(2, 2, vec![(0, 0, 1.0)]).unwrap();
        m.resize(4, 5, 3);
        assert_eq!(m.dims(), (4, 5));
        assert_eq!(m.num_entries(), 3);
        assert_eq!(m.values(), &[0.0, 0.0, 0.0]);
    }
}
