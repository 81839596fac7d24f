use bytemuck::{Pod, Zeroable};
use num_traits::Float;
use std::fmt::{Debug, Display};

use crate::error::Result;

/// Numeric element type accepted by the containers and kernels.
///
/// Blanket-implemented for `f32` and `f64`. `Pod` is required so values can
/// be shipped to the GPU byte-for-byte.
pub trait Scalar:
    Float + Debug + Display + Default + Pod + Zeroable + Send + Sync + 'static
{
}

impl<T> Scalar for T where
    T: Float + Debug + Display + Default + Pod + Zeroable + Send + Sync + 'static
{
}

/// Widening or narrowing cast between scalar types.
///
/// Float-to-float casts always succeed; out-of-range magnitudes saturate to
/// infinity the way an `as` cast would.
pub(crate) fn cast_value<V: Scalar, W: Scalar>(v: V) -> W {
    W::from(v).unwrap_or_else(W::nan)
}

/// Generic trait representing a matrix, sparse or dense, host or device.
pub trait Matrix: Debug {
    /// The underlying numeric type of the matrix elements.
    type Value: Scalar;

    /// Returns the dimensions of the matrix as (rows, columns).
    fn dims(&self) -> (usize, usize);

    /// Returns the number of rows.
    fn rows(&self) -> usize {
        self.dims().0
    }

    /// Returns the number of columns.
    fn cols(&self) -> usize {
        self.dims().1
    }

    /// Checks if the matrix is square.
    fn is_square(&self) -> bool {
        let (rows, cols) = self.dims();
        rows == cols
    }
}

/// Generic trait representing a vector, host or device.
pub trait Vector: Debug {
    /// The underlying numeric type of the vector elements.
    type Value: Scalar;

    /// Returns the number of elements in the vector.
    fn len(&self) -> usize;

    /// Checks if the vector is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A matrix that can be applied to a host vector: `y <- A * x`.
///
/// Implemented by every host sparse format; the Krylov solvers are generic
/// over this seam.
pub trait LinearOperator: Matrix {
    /// Computes `y = A * x`, fully overwriting `y`.
    fn spmv(&self, x: &[Self::Value], y: &mut [Self::Value]) -> Result<()>;

    /// The main diagonal, for layouts that support a cheap row walk. Used
    /// by Jacobi preconditioning; absent entries are zero.
    fn diagonal(&self) -> Option<Vec<Self::Value>> {
        None
    }
}
