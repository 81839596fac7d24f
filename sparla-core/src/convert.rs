//! All-pairs conversion between the sparse layouts.
//!
//! COO and CSR act as hubs: every other layout is built from CSR and
//! decomposes to COO, so any pair is reachable in at most two hops. DIA and
//! ELL refuse matrices whose structure would explode their padded storage;
//! the refusal thresholds are tunable through [`ConversionPolicy`].

use crate::error::{Result, SparlaCoreError};
use crate::formats::{
    aligned_stride, CooMatrix, CsrMatrix, DiaMatrix, EllMatrix, Format, HybMatrix,
    SparseMatrixAny, ELL_PAD,
};
use crate::traits::Scalar;

/// Tunable thresholds for the structure-sensitive conversions.
#[derive(Debug, Clone)]
pub struct ConversionPolicy {
    /// DIA is refused when the occupied diagonal count exceeds
    /// `dia_fill * (num_rows + num_cols)`.
    pub dia_fill: f64,
    /// Diagonal counts at or below this floor are always accepted.
    pub min_diagonals: usize,
    /// ELL is refused when the longest row exceeds `ell_imbalance` times
    /// the mean row length.
    pub ell_imbalance: f64,
    /// Row widths at or below this floor are always accepted.
    pub min_ell_width: usize,
}

impl Default for ConversionPolicy {
    fn default() -> Self {
        Self {
            dia_fill: 0.10,
            min_diagonals: 32,
            ell_imbalance: 3.0,
            min_ell_width: 4,
        }
    }
}

impl ConversionPolicy {
    fn max_diagonals(&self, num_rows: usize, num_cols: usize) -> usize {
        let scaled = ((num_rows + num_cols) as f64 * self.dia_fill).ceil() as usize;
        scaled.max(self.min_diagonals)
    }

    fn max_ell_width(&self, num_rows: usize, num_entries: usize) -> usize {
        let mean = num_entries as f64 / num_rows.max(1) as f64;
        let scaled = (mean * self.ell_imbalance).ceil() as usize;
        scaled.max(self.min_ell_width)
    }
}

/// COO to CSR by prefix-summing the per-row entry counts. O(nnz).
pub fn coo_to_csr<V: Scalar>(src: &CooMatrix<V>) -> Result<CsrMatrix<V>> {
    let mut row_offsets = vec![0usize; src.num_rows() + 1];
    for &r in src.row_indices() {
        row_offsets[r + 1] += 1;
    }
    for i in 1..=src.num_rows() {
        row_offsets[i] += row_offsets[i - 1];
    }
    CsrMatrix::from_parts(
        src.num_rows(),
        src.num_cols(),
        row_offsets,
        src.column_indices().to_vec(),
        src.values().to_vec(),
    )
}

/// CSR to COO by expanding the row offsets. O(nnz).
pub fn csr_to_coo<V: Scalar>(src: &CsrMatrix<V>) -> Result<CooMatrix<V>> {
    let mut row_indices = Vec::with_capacity(src.num_entries());
    for i in 0..src.num_rows() {
        for _ in src.row_offsets()[i]..src.row_offsets()[i + 1] {
            row_indices.push(i);
        }
    }
    CooMatrix::from_parts(
        src.num_rows(),
        src.num_cols(),
        row_indices,
        src.column_indices().to_vec(),
        src.values().to_vec(),
    )
}

/// CSR to DIA. Fails when the matrix occupies more diagonals than the
/// policy allows.
pub fn csr_to_dia<V: Scalar>(src: &CsrMatrix<V>, policy: &ConversionPolicy) -> Result<DiaMatrix<V>> {
    let mut offsets: Vec<isize> = Vec::new();
    for i in 0..src.num_rows() {
        for k in src.row_offsets()[i]..src.row_offsets()[i + 1] {
            let off = src.column_indices()[k] as isize - i as isize;
            if let Err(pos) = offsets.binary_search(&off) {
                offsets.insert(pos, off);
            }
        }
    }

    let limit = policy.max_diagonals(src.num_rows(), src.num_cols());
    if offsets.len() > limit {
        return Err(SparlaCoreError::FormatConversion(format!(
            "matrix occupies {} diagonals, more than the {} allowed for a {}x{} DIA conversion",
            offsets.len(),
            limit,
            src.num_rows(),
            src.num_cols()
        )));
    }

    let stride = aligned_stride(src.num_rows());
    let mut values = vec![V::zero(); stride * offsets.len()];
    for i in 0..src.num_rows() {
        for k in src.row_offsets()[i]..src.row_offsets()[i + 1] {
            let off = src.column_indices()[k] as isize - i as isize;
            let d = offsets
                .binary_search(&off)
                .map_err(|_| SparlaCoreError::Internal("diagonal offset vanished".to_string()))?;
            values[d * stride + i] = src.values()[k];
        }
    }
    DiaMatrix::from_parts(
        src.num_rows(),
        src.num_cols(),
        src.num_entries(),
        stride,
        offsets,
        values,
    )
}

/// DIA to COO, skipping padding and explicit zeros. O(stride * D).
pub fn dia_to_coo<V: Scalar>(src: &DiaMatrix<V>) -> Result<CooMatrix<V>> {
    let mut triplets = Vec::with_capacity(src.num_entries());
    for i in 0..src.num_rows() {
        for (d, &off) in src.diagonal_offsets().iter().enumerate() {
            let col = i as isize + off;
            if col < 0 || col >= src.num_cols() as isize {
                continue;
            }
            let v = src.values()[d * src.stride() + i];
            if v != V::zero() {
                triplets.push((i, col as usize, v));
            }
        }
    }
    CooMatrix::from_triplets(src.num_rows(), src.num_cols(), triplets)
}

/// CSR to ELL. Fails when the longest row would force pathological padding.
pub fn csr_to_ell<V: Scalar>(src: &CsrMatrix<V>, policy: &ConversionPolicy) -> Result<EllMatrix<V>> {
    let widest = src.max_row_length();
    let limit = policy.max_ell_width(src.num_rows(), src.num_entries());
    if widest > limit {
        return Err(SparlaCoreError::FormatConversion(format!(
            "longest row holds {} entries, more than the {} allowed given a mean row length of {:.2}",
            widest,
            limit,
            src.num_entries() as f64 / src.num_rows().max(1) as f64
        )));
    }

    let mut ell = EllMatrix::with_shape(src.num_rows(), src.num_cols(), src.num_entries(), widest);
    let stride = ell.stride();
    for i in 0..src.num_rows() {
        for (slot, k) in (src.row_offsets()[i]..src.row_offsets()[i + 1]).enumerate() {
            ell.column_indices[slot * stride + i] = src.column_indices()[k];
            ell.values[slot * stride + i] = src.values()[k];
        }
    }
    Ok(ell)
}

/// ELL to COO, skipping the pad sentinel. O(stride * E).
pub fn ell_to_coo<V: Scalar>(src: &EllMatrix<V>) -> Result<CooMatrix<V>> {
    let mut triplets = Vec::with_capacity(src.num_entries());
    for i in 0..src.num_rows() {
        for k in 0..src.cols_per_row() {
            let slot = k * src.stride() + i;
            let c = src.column_indices()[slot];
            if c != ELL_PAD {
                triplets.push((i, c, src.values()[slot]));
            }
        }
    }
    CooMatrix::from_triplets(src.num_rows(), src.num_cols(), triplets)
}

/// CSR to HYB. The ELL width is the mean row length rounded up, so the ELL
/// portion covers the typical row and the COO tail holds the overflow.
pub fn csr_to_hyb<V: Scalar>(src: &CsrMatrix<V>, _policy: &ConversionPolicy) -> Result<HybMatrix<V>> {
    let width = if src.num_rows() == 0 || src.num_entries() == 0 {
        0
    } else {
        src.num_entries().div_ceil(src.num_rows())
    };

    let stride = aligned_stride(src.num_rows());
    let mut ell_entries = 0;
    let mut ell_cols = vec![ELL_PAD; stride * width];
    let mut ell_values = vec![V::zero(); stride * width];
    let mut tail_rows = Vec::new();
    let mut tail_cols = Vec::new();
    let mut tail_values = Vec::new();
    for i in 0..src.num_rows() {
        for (slot, k) in (src.row_offsets()[i]..src.row_offsets()[i + 1]).enumerate() {
            if slot < width {
                ell_cols[slot * stride + i] = src.column_indices()[k];
                ell_values[slot * stride + i] = src.values()[k];
                ell_entries += 1;
            } else {
                tail_rows.push(i);
                tail_cols.push(src.column_indices()[k]);
                tail_values.push(src.values()[k]);
            }
        }
    }
    let ell = EllMatrix::from_parts(
        src.num_rows(),
        src.num_cols(),
        ell_entries,
        width,
        stride,
        ell_cols,
        ell_values,
    )?;
    let coo = CooMatrix::from_parts(
        src.num_rows(),
        src.num_cols(),
        tail_rows,
        tail_cols,
        tail_values,
    )?;
    HybMatrix::from_parts(ell, coo)
}

/// HYB to COO by merging the two portions. O(nnz).
pub fn hyb_to_coo<V: Scalar>(src: &HybMatrix<V>) -> Result<CooMatrix<V>> {
    let mut triplets = Vec::with_capacity(src.num_entries());
    let ell = src.ell();
    for i in 0..ell.num_rows() {
        for k in 0..ell.cols_per_row() {
            let slot = k * ell.stride() + i;
            let c = ell.column_indices()[slot];
            if c != ELL_PAD {
                triplets.push((i, c, ell.values()[slot]));
            }
        }
    }
    triplets.extend(src.coo().iter());
    CooMatrix::from_triplets(src.num_rows(), src.num_cols(), triplets)
}

impl<V: Scalar> CooMatrix<V> {
    pub fn to_csr(&self) -> Result<CsrMatrix<V>> {
        coo_to_csr(self)
    }

    pub fn to_dia(&self, policy: &ConversionPolicy) -> Result<DiaMatrix<V>> {
        csr_to_dia(&self.to_csr()?, policy)
    }

    pub fn to_ell(&self, policy: &ConversionPolicy) -> Result<EllMatrix<V>> {
        csr_to_ell(&self.to_csr()?, policy)
    }

    pub fn to_hyb(&self, policy: &ConversionPolicy) -> Result<HybMatrix<V>> {
        csr_to_hyb(&self.to_csr()?, policy)
    }
}

impl<V: Scalar> CsrMatrix<V> {
    pub fn to_coo(&self) -> Result<CooMatrix<V>> {
        csr_to_coo(self)
    }

    pub fn to_dia(&self, policy: &ConversionPolicy) -> Result<DiaMatrix<V>> {
        csr_to_dia(self, policy)
    }

    pub fn to_ell(&self, policy: &ConversionPolicy) -> Result<EllMatrix<V>> {
        csr_to_ell(self, policy)
    }

    pub fn to_hyb(&self, policy: &ConversionPolicy) -> Result<HybMatrix<V>> {
        csr_to_hyb(self, policy)
    }
}

impl<V: Scalar> DiaMatrix<V> {
    pub fn to_coo(&self) -> Result<CooMatrix<V>> {
        dia_to_coo(self)
    }

    pub fn to_csr(&self) -> Result<CsrMatrix<V>> {
        coo_to_csr(&dia_to_coo(self)?)
    }
}

impl<V: Scalar> EllMatrix<V> {
    pub fn to_coo(&self) -> Result<CooMatrix<V>> {
        ell_to_coo(self)
    }

    pub fn to_csr(&self) -> Result<CsrMatrix<V>> {
        coo_to_csr(&ell_to_coo(self)?)
    }
}

impl<V: Scalar> HybMatrix<V> {
    pub fn to_coo(&self) -> Result<CooMatrix<V>> {
        hyb_to_coo(self)
    }

    pub fn to_csr(&self) -> Result<CsrMatrix<V>> {
        coo_to_csr(&hyb_to_coo(self)?)
    }
}

impl<V: Scalar> SparseMatrixAny<V> {
    fn to_csr_hub(&self) -> Result<CsrMatrix<V>> {
        match self {
            SparseMatrixAny::Coo(m) => m.to_csr(),
            SparseMatrixAny::Csr(m) => Ok(m.clone()),
            SparseMatrixAny::Dia(m) => m.to_csr(),
            SparseMatrixAny::Ell(m) => m.to_csr(),
            SparseMatrixAny::Hyb(m) => m.to_csr(),
        }
    }

    /// Converts into any supported layout, routing through the CSR hub.
    pub fn convert_to(&self, format: Format, policy: &ConversionPolicy) -> Result<Self> {
        if self.format() == format {
            return Ok(self.clone());
        }
        let csr = self.to_csr_hub()?;
        Ok(match format {
            Format::Coo => SparseMatrixAny::Coo(csr.to_coo()?),
            Format::Csr => SparseMatrixAny::Csr(csr),
            Format::Dia => SparseMatrixAny::Dia(csr.to_dia(policy)?),
            Format::Ell => SparseMatrixAny::Ell(csr.to_ell(policy)?),
            Format::Hyb => SparseMatrixAny::Hyb(csr.to_hyb(policy)?),
        })
    }
}

/// Populates a matrix of layout `dst_format` representing the same sparse
/// matrix as `src`.
pub fn convert<V: Scalar>(
    src: &SparseMatrixAny<V>,
    dst_format: Format,
    policy: &ConversionPolicy,
) -> Result<SparseMatrixAny<V>> {
    src.convert_to(dst_format, policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 4x3 matrix with 6 nonzeros:
    //   [10  0 20]
    //   [ 0  0  0]
    //   [ 0  0 30]
    //   [40 50 60]
    fn sample_coo() -> CooMatrix<f64> {
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
    fn test_coo_to_csr() {
        let csr = sample_coo().to_csr().unwrap();
        assert_eq!(csr.row_offsets(), &[0, 2, 2, 3, 6]);
        assert_eq!(csr.column_indices(), &[0, 2, 2, 0, 1, 2]);
        assert_eq!(csr.values(), &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
    }

    #[test]
    fn test_csr_round_trip() {
        let coo = sample_coo();
        let back = coo.to_csr().unwrap().to_coo().unwrap();
        assert_eq!(coo, back);
    }

    #[test]
    fn test_bidiagonal_to_dia() {
        // 5x5 with main diagonal and superdiagonal of ones.
        let mut triplets = Vec::new();
        for i in 0..5 {
            triplets.push((i, i, 2.0));
            if i + 1 < 5 {
                triplets.push((i, i + 1, 1.0));
            }
        }
        let coo = CooMatrix::from_triplets(5, 5, triplets).unwrap();
        let dia = coo.to_dia(&ConversionPolicy::default()).unwrap();
        assert_eq!(dia.num_diagonals(), 2);
        assert_eq!(dia.diagonal_offsets(), &[0, 1]);
        assert_eq!(coo, dia.to_coo().unwrap());

        let ell = coo.to_ell(&ConversionPolicy::default()).unwrap();
        assert_eq!(ell.cols_per_row(), 2);
        assert_eq!(coo, ell.to_coo().unwrap());
    }

    #[test]
    fn test_dia_refused_for_unbanded_matrix() {
        // A cross of a full first row and full first column occupies
        // 2n - 1 distinct diagonals.
        let n = 400;
        let mut triplets = Vec::new();
        for j in 0..n {
            triplets.push((0, j, 1.0));
        }
        for i in 1..n {
            triplets.push((i, 0, 1.0));
        }
        let coo = CooMatrix::from_triplets(n, n, triplets).unwrap();
        let err = coo.to_dia(&ConversionPolicy::default());
        assert!(matches!(err, Err(SparlaCoreError::FormatConversion(_))));
    }

    #[test]
    fn test_ell_refused_for_pathological_row() {
        // One row with 1000 entries while every other row has one.
        let n = 1000;
        let mut triplets = Vec::new();
        for j in 0..n {
            triplets.push((0, j, 1.0));
        }
        for i in 1..n {
            triplets.push((i, i, 1.0));
        }
        let coo = CooMatrix::from_triplets(n, n, triplets).unwrap();
        let err = coo.to_ell(&ConversionPolicy::default());
        assert!(matches!(err, Err(SparlaCoreError::FormatConversion(_))));
        // A permissive policy accepts the same matrix.
        let relaxed = ConversionPolicy {
            ell_imbalance: 1000.0,
            ..ConversionPolicy::default()
        };
        assert!(coo.to_ell(&relaxed).is_ok());
    }

    #[test]
    fn test_hyb_splits_overflow() {
        let hyb = sample_coo().to_hyb(&ConversionPolicy::default()).unwrap();
        // Mean row length is 6/4 rounded up to 2, so row 3 overflows by one.
        assert_eq!(hyb.ell().cols_per_row(), 2);
        assert_eq!(hyb.ell().num_entries(), 5);
        assert_eq!(hyb.coo().num_entries(), 1);
        assert_eq!(hyb.num_entries(), 6);
        assert_eq!(hyb.get(3, 2), Some(60.0));
    }

    #[test]
    fn test_all_pairs_round_trip() {
        let src = SparseMatrixAny::Coo(sample_coo());
        let policy = ConversionPolicy::default();
        for &a in &Format::ALL {
            let in_a = src.convert_to(a, &policy).unwrap();
            for &b in &Format::ALL {
                let in_b = in_a.convert_to(b, &policy).unwrap();
                let back = in_b.convert_to(a, &policy).unwrap();
                assert_eq!(in_a, back, "round trip {} -> {} -> {}", a, b, a);
            }
        }
    }
}
