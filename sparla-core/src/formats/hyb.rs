use serde::{Deserialize, Serialize};

use crate::error::{Result, SparlaCoreError};
use crate::formats::{CooMatrix, EllMatrix};
use crate::traits::{Matrix, Scalar};

/// Sparse matrix in hybrid (HYB) format: an ELL portion holding the first
/// `E` nonzeros of every row and a COO tail holding the overflow.
///
/// The two portions share no storage and together represent the matrix
/// exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybMatrix<V = f64> {
    pub(crate) ell: EllMatrix<V>,
    pub(crate) coo: CooMatrix<V>,
}

impl<V: Scalar> HybMatrix<V> {
    /// Creates an empty matrix with all dimensions zero.
    pub fn new() -> Self {
        Self {
            ell: EllMatrix::new(),
            coo: CooMatrix::new(),
        }
    }

    /// Allocates storage for the given shape: an ELL portion of
    /// `cols_per_row` slots and a COO tail of `num_coo_entries`.
    pub fn with_shape(
        num_rows: usize,
        num_cols: usize,
        num_ell_entries: usize,
        num_coo_entries: usize,
        cols_per_row: usize,
    ) -> Self {
        Self {
            ell: EllMatrix::with_shape(num_rows, num_cols, num_ell_entries, cols_per_row),
            coo: CooMatrix::with_shape(num_rows, num_cols, num_coo_entries),
        }
    }

    /// Assembles a matrix from an ELL portion and a COO tail of matching
    /// shape.
    pub fn from_parts(ell: EllMatrix<V>, coo: CooMatrix<V>) -> Result<Self> {
        if ell.dims() != coo.dims() {
            return Err(SparlaCoreError::ShapeMismatch(format!(
                "ELL portion is {:?} but COO tail is {:?}",
                ell.dims(),
                coo.dims()
            )));
        }
        Ok(Self { ell, coo })
    }

    /// Exchanges the contents of two matrices in O(1).
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    pub fn num_rows(&self) -> usize {
        self.ell.num_rows()
    }

    pub fn num_cols(&self) -> usize {
        self.ell.num_cols()
    }

    /// Stored entries across both portions.
    pub fn num_entries(&self) -> usize {
        self.ell.num_entries() + self.coo.num_entries()
    }

    pub fn ell(&self) -> &EllMatrix<V> {
        &self.ell
    }

    pub fn coo(&self) -> &CooMatrix<V> {
        &self.coo
    }

    /// Looks up a stored value in either portion.
    pub fn get(&self, row: usize, col: usize) -> Option<V> {
        self.ell.get(row, col).or_else(|| self.coo.get(row, col))
    }

    /// Deep copy into a possibly different value type.
    pub fn convert_values<W: Scalar>(&self) -> HybMatrix<W> {
        HybMatrix {
            ell: self.ell.convert_values(),
            coo: self.coo.convert_values(),
        }
    }
}

impl<V: Scalar> Default for HybMatrix<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Scalar> Matrix for HybMatrix<V> {
    type Value = V;

    fn dims(&self) -> (usize, usize) {
        self.ell.dims()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_shape_check() {
        let ell: EllMatrix<f64> = EllMatrix::with_shape(2, 2, 0, 1);
        let coo = CooMatrix::from_triplets(3, 2, vec![]).unwrap();
        assert!(matches!(
            HybMatrix::from_parts(ell, coo),
            Err(SparlaCoreError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_entry_count_spans_portions() {
        let ell: EllMatrix<f64> = EllMatrix::with_shape(2, 2, 0, 1);
        let coo = CooMatrix::from_triplets(2, 2, vec![(1, 1, 3.0)]).unwrap();
        let hyb = HybMatrix::from_parts(ell, coo).unwrap();
        assert_eq!(hyb.num_entries(), 1);
        assert_eq!(hyb.get(1, 1), Some(3.0));
    }
}
