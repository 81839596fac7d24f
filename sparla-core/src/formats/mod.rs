//! Host-resident sparse matrix containers.
//!
//! Five layouts are provided: coordinate ([`CooMatrix`]), compressed sparse
//! row ([`CsrMatrix`]), diagonal ([`DiaMatrix`]), ELLPACK ([`EllMatrix`])
//! and hybrid ELL + COO ([`HybMatrix`]). All are generic over the value
//! type; indices are `usize` on the host. Conversions between the layouts
//! live in [`crate::convert`], multiplication kernels in [`crate::spmv`].

mod coo;
mod csr;
mod dia;
mod ell;
mod hyb;

pub(crate) use dia::aligned_stride;

pub use coo::CooMatrix;
pub use csr::CsrMatrix;
pub use dia::DiaMatrix;
pub use ell::{EllMatrix, ELL_PAD};
pub use hyb::HybMatrix;

use serde::{Deserialize, Serialize};

use crate::traits::{Matrix, Scalar};

/// Sparse matrix storage layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    /// Coordinate: parallel (row, column, value) arrays sorted by (row, column).
    Coo,
    /// Compressed sparse row: row offsets + column indices + values.
    Csr,
    /// Diagonal: occupied diagonal offsets + a dense column-major band.
    Dia,
    /// ELLPACK: fixed entries-per-row, column-major, sentinel-padded.
    Ell,
    /// Hybrid: an ELL portion plus a COO overflow tail.
    Hyb,
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::Coo => "COO",
            Format::Csr => "CSR",
            Format::Dia => "DIA",
            Format::Ell => "ELL",
            Format::Hyb => "HYB",
        }
    }

    /// All supported layouts, useful for exhaustive conversion tests.
    pub const ALL: [Format; 5] = [
        Format::Coo,
        Format::Csr,
        Format::Dia,
        Format::Ell,
        Format::Hyb,
    ];
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A sparse matrix in any of the supported layouts.
///
/// This is the closed variant type behind the format-pair dispatch of
/// `convert` and `spmv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SparseMatrixAny<V = f64> {
    Coo(CooMatrix<V>),
    Csr(CsrMatrix<V>),
    Dia(DiaMatrix<V>),
    Ell(EllMatrix<V>),
    Hyb(HybMatrix<V>),
}

impl<V: Scalar> SparseMatrixAny<V> {
    pub fn format(&self) -> Format {
        match self {
            SparseMatrixAny::Coo(_) => Format::Coo,
            SparseMatrixAny::Csr(_) => Format::Csr,
            SparseMatrixAny::Dia(_) => Format::Dia,
            SparseMatrixAny::Ell(_) => Format::Ell,
            SparseMatrixAny::Hyb(_) => Format::Hyb,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.dims().0
    }

    pub fn num_cols(&self) -> usize {
        self.dims().1
    }

    /// Number of structurally stored entries (may exceed the true nonzero
    /// count for padded layouts).
    pub fn num_entries(&self) -> usize {
        match self {
            SparseMatrixAny::Coo(m) => m.num_entries(),
            SparseMatrixAny::Csr(m) => m.num_entries(),
            SparseMatrixAny::Dia(m) => m.num_entries(),
            SparseMatrixAny::Ell(m) => m.num_entries(),
            SparseMatrixAny::Hyb(m) => m.num_entries(),
        }
    }

    /// Looks up a stored value. Linear in the row population; intended for
    /// tests and debugging.
    pub fn get(&self, row: usize, col: usize) -> Option<V> {
        match self {
            SparseMatrixAny::Coo(m) => m.get(row, col),
            SparseMatrixAny::Csr(m) => m.get(row, col),
            SparseMatrixAny::Dia(m) => m.get(row, col),
            SparseMatrixAny::Ell(m) => m.get(row, col),
            SparseMatrixAny::Hyb(m) => m.get(row, col),
        }
    }
}

impl<V: Scalar> Matrix for SparseMatrixAny<V> {
    type Value = V;

    fn dims(&self) -> (usize, usize) {
        match self {
            SparseMatrixAny::Coo(m) => m.dims(),
            SparseMatrixAny::Csr(m) => m.dims(),
            SparseMatrixAny::Dia(m) => m.dims(),
            SparseMatrixAny::Ell(m) => m.dims(),
            SparseMatrixAny::Hyb(m) => m.dims(),
        }
    }
}

impl<V: Scalar> From<CooMatrix<V>> for SparseMatrixAny<V> {
    fn from(m: CooMatrix<V>) -> Self {
        SparseMatrixAny::Coo(m)
    }
}

impl<V: Scalar> From<CsrMatrix<V>> for SparseMatrixAny<V> {
    fn from(m: CsrMatrix<V>) -> Self {
        SparseMatrixAny::Csr(m)
    }
}

impl<V: Scalar> From<DiaMatrix<V>> for SparseMatrixAny<V> {
    fn from(m: DiaMatrix<V>) -> Self {
        SparseMatrixAny::Dia(m)
    }
}

impl<V: Scalar> From<EllMatrix<V>> for SparseMatrixAny<V> {
    fn from(m: EllMatrix<V>) -> Self {
        SparseMatrixAny::Ell(m)
    }
}

impl<V: Scalar> From<HybMatrix<V>> for SparseMatrixAny<V> {
    fn from(m: HybMatrix<V>) -> Self {
        SparseMatrixAny::Hyb(m)
    }
}
