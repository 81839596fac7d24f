//! Host sparse matrix-vector multiply kernels, one per layout.
//!
//! Every kernel computes `y = A * x`, fully overwriting `y`, and requires
//! `x.len() == num_cols`, `y.len() == num_rows`. Summation order within a
//! row is fixed by the storage order of each layout.

use crate::error::{Result, SparlaCoreError};
use crate::formats::{
    CooMatrix, CsrMatrix, DiaMatrix, EllMatrix, HybMatrix, SparseMatrixAny, ELL_PAD,
};
use crate::traits::{LinearOperator, Matrix, Scalar};

fn check_operands<V: Scalar, M: Matrix<Value = V>>(a: &M, x: &[V], y: &[V]) -> Result<()> {
    let (rows, cols) = a.dims();
    if x.len() != cols {
        return Err(SparlaCoreError::ShapeMismatch(format!(
            "matrix columns ({}) do not match x length ({})",
            cols,
            x.len()
        )));
    }
    if y.len() != rows {
        return Err(SparlaCoreError::ShapeMismatch(format!(
            "matrix rows ({}) do not match y length ({})",
            rows,
            y.len()
        )));
    }
    Ok(())
}

pub(crate) fn spmv_coo_into<V: Scalar>(
    a: &CooMatrix<V>,
    x: &[V],
    y: &mut [V],
    accumulate: bool,
) -> Result<()> {
    check_operands(a, x, y)?;
    if !accumulate {
        y.fill(V::zero());
    }
    for k in 0..a.num_entries() {
        y[a.row_indices[k]] = y[a.row_indices[k]] + a.values[k] * x[a.column_indices[k]];
    }
    Ok(())
}

/// `y = A * x` for a COO matrix: each entry scatters into its row sum.
pub fn spmv_coo<V: Scalar>(a: &CooMatrix<V>, x: &[V], y: &mut [V]) -> Result<()> {
    spmv_coo_into(a, x, y, false)
}

/// `y = A * x` for a CSR matrix: one pass over each row's entry range.
pub fn spmv_csr<V: Scalar>(a: &CsrMatrix<V>, x: &[V], y: &mut [V]) -> Result<()> {
    check_operands(a, x, y)?;
    for (i, yi) in y.iter_mut().enumerate() {
        let mut sum = V::zero();
        for k in a.row_offsets[i]..a.row_offsets[i + 1] {
            sum = sum + a.values[k] * x[a.column_indices[k]];
        }
        *yi = sum;
    }
    Ok(())
}

/// `y = A * x` for a DIA matrix: each row walks the occupied diagonals.
/// Off-matrix band positions hold explicit zeros, so no branch on the
/// stored value is needed, only a bounds check on the column.
pub fn spmv_dia<V: Scalar>(a: &DiaMatrix<V>, x: &[V], y: &mut [V]) -> Result<()> {
    check_operands(a, x, y)?;
    let stride = a.stride();
    let num_cols = a.num_cols() as isize;
    for (i, yi) in y.iter_mut().enumerate() {
        let mut sum = V::zero();
        for (d, &off) in a.diagonal_offsets.iter().enumerate() {
            let col = i as isize + off;
            if col >= 0 && col < num_cols {
                sum = sum + a.values[d * stride + i] * x[col as usize];
            }
        }
        *yi = sum;
    }
    Ok(())
}

/// `y = A * x` for an ELL matrix: each row walks its padded slots, skipping
/// the sentinel.
pub fn spmv_ell<V: Scalar>(a: &EllMatrix<V>, x: &[V], y: &mut [V]) -> Result<()> {
    check_operands(a, x, y)?;
    let stride = a.stride();
    for (i, yi) in y.iter_mut().enumerate() {
        let mut sum = V::zero();
        for k in 0..a.cols_per_row() {
            let slot = k * stride + i;
            let c = a.column_indices[slot];
            if c != ELL_PAD {
                sum = sum + a.values[slot] * x[c];
            }
        }
        *yi = sum;
    }
    Ok(())
}

/// `y = A * x` for a HYB matrix: the ELL portion overwrites `y`, then the
/// COO tail accumulates into it.
pub fn spmv_hyb<V: Scalar>(a: &HybMatrix<V>, x: &[V], y: &mut [V]) -> Result<()> {
    spmv_ell(a.ell(), x, y)?;
    spmv_coo_into(a.coo(), x, y, true)
}

impl<V: Scalar> LinearOperator for CooMatrix<V> {
    fn spmv(&self, x: &[V], y: &mut [V]) -> Result<()> {
        spmv_coo(self, x, y)
    }
}

impl<V: Scalar> LinearOperator for CsrMatrix<V> {
    fn spmv(&self, x: &[V], y: &mut [V]) -> Result<()> {
        spmv_csr(self, x, y)
    }

    fn diagonal(&self) -> Option<Vec<V>> {
        Some(
            (0..self.num_rows())
                .map(|i| self.get(i, i).unwrap_or_else(V::zero))
                .collect(),
        )
    }
}

impl<V: Scalar> LinearOperator for DiaMatrix<V> {
    fn spmv(&self, x: &[V], y: &mut [V]) -> Result<()> {
        spmv_dia(self, x, y)
    }
}

impl<V: Scalar> LinearOperator for EllMatrix<V> {
    fn spmv(&self, x: &[V], y: &mut [V]) -> Result<()> {
        spmv_ell(self, x, y)
    }
}

impl<V: Scalar> LinearOperator for HybMatrix<V> {
    fn spmv(&self, x: &[V], y: &mut [V]) -> Result<()> {
        spmv_hyb(self, x, y)
    }
}

impl<V: Scalar> LinearOperator for SparseMatrixAny<V> {
    fn spmv(&self, x: &[V], y: &mut [V]) -> Result<()> {
        match self {
            SparseMatrixAny::Coo(m) => spmv_coo(m, x, y),
            SparseMatrixAny::Csr(m) => spmv_csr(m, x, y),
            SparseMatrixAny::Dia(m) => spmv_dia(m, x, y),
            SparseMatrixAny::Ell(m) => spmv_ell(m, x, y),
            SparseMatrixAny::Hyb(m) => spmv_hyb(m, x, y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConversionPolicy;
    use crate::formats::Format;

    fn sample_coo() -> CooMatrix<f64> {
        // [10  0 20]
        // [ 0  0  0]
        // [ 0  0 30]
        // [40 50 60]
        CooMatrix::from_triplets(
            4,
            3,
            vec![
                (0, 0, 10.0),
                (0, 2, 20.0),
                (2, 2, 30.0),
                (3, 0, 40.0),
                (3, 1, 50.0),
                (3, 2, 60.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_spmv_coo() {
        let a = sample_coo();
        let x = [1.0, 1.0, 1.0];
        let mut y = [f64::NAN; 4];
        spmv_coo(&a, &x, &mut y).unwrap();
        assert_eq!(y, [30.0, 0.0, 30.0, 150.0]);
    }

    #[test]
    fn test_spmv_matches_across_formats() {
        let coo = sample_coo();
        let x = [1.0, 1.0, 1.0];
        let mut reference = [0.0; 4];
        spmv_coo(&coo, &x, &mut reference).unwrap();

        let any = SparseMatrixAny::Coo(coo);
        let policy = ConversionPolicy::default();
        for &format in &Format::ALL {
            let m = any.convert_to(format, &policy).unwrap();
            let mut y = [0.0; 4];
            m.spmv(&x, &mut y).unwrap();
            assert_eq!(y, reference, "format {}", format);
        }
    }

    #[test]
    fn test_spmv_dia_diagonal() {
        let coo = CooMatrix::from_triplets(
            4,
            4,
            vec![(0, 0, 1.0), (1, 1, 2.0), (2, 2, 3.0), (3, 3, 4.0)],
        )
        .unwrap();
        let dia = coo.to_dia(&ConversionPolicy::default()).unwrap();
        let x = [1.0; 4];
        let mut y = [0.0; 4];
        spmv_dia(&dia, &x, &mut y).unwrap();
        assert_eq!(y, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_spmv_ell_ignores_padding() {
        let coo = CooMatrix::from_triplets(3, 3, vec![(0, 0, 1.0), (0, 1, 2.0), (2, 2, 3.0)])
            .unwrap();
        let ell = coo.to_ell(&ConversionPolicy::default()).unwrap();
        let x = [1.0, 10.0, 100.0];
        let mut y = [0.0; 3];
        spmv_ell(&ell, &x, &mut y).unwrap();
        assert_eq!(y, [21.0, 0.0, 300.0]);
    }

    #[test]
    fn test_spmv_shape_mismatch() {
        let a = sample_coo();
        let x = [1.0; 4];
        let mut y = [0.0; 4];
        assert!(matches!(
            spmv_coo(&a, &x, &mut y),
            Err(SparlaCoreError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_spmv_linearity() {
        let any = SparseMatrixAny::Coo(sample_coo());
        let x = [1.0, -2.0, 0.5];
        let z = [0.25, 3.0, -1.0];
        let (alpha, beta) = (2.0, -0.5);

        let combined: Vec<f64> = x
            .iter()
            .zip(&z)
            .map(|(&xi, &zi)| alpha * xi + beta * zi)
            .collect();
        let mut lhs = [0.0; 4];
        any.spmv(&combined, &mut lhs).unwrap();

        let mut ax = [0.0; 4];
        let mut az = [0.0; 4];
        any.spmv(&x, &mut ax).unwrap();
        any.spmv(&z, &mut az).unwrap();
        for i in 0..4 {
            let rhs = alpha * ax[i] + beta * az[i];
            assert!((lhs[i] - rhs).abs() <= 1e-12 * rhs.abs().max(1.0));
        }
    }
}
