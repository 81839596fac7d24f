use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

use crate::traits::{Scalar, Vector};

/// A contiguous, resizable one-dimensional host array.
///
/// This is the host-side counterpart of [`crate::GpuVector`]; the BLAS-1
/// facade and the host SpMV kernels operate on slices of it. `resize`
/// preserves no content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Array1d<V> {
    data: Vec<V>,
}

impl<V: Scalar> Array1d<V> {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Creates an array of `len` zero elements.
    pub fn zeros(len: usize) -> Self {
        Self {
            data: vec![V::zero(); len],
        }
    }

    /// Wraps an existing vector without copying.
    pub fn from_vec(data: Vec<V>) -> Self {
        Self { data }
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Resizes the array to `len` elements. Prior content is discarded and
    /// every element is reset to zero; existing pointers are invalidated.
    pub fn resize(&mut self, len: usize) {
        self.data.clear();
        self.data.resize(len, V::zero());
    }

    /// Exchanges the contents of two arrays in O(1).
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.data, &mut other.data);
    }

    /// Sets every element to `value`.
    pub fn fill(&mut self, value: V) {
        self.data.fill(value);
    }

    pub fn as_slice(&self) -> &[V] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [V] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<V> {
        self.data
    }
}

impl<V: Scalar> Deref for Array1d<V> {
    type Target = [V];

    fn deref(&self) -> &[V] {
        &self.data
    }
}

impl<V: Scalar> DerefMut for Array1d<V> {
    fn deref_mut(&mut self) -> &mut [V] {
        &mut self.data
    }
}

impl<V: Scalar> FromIterator<V> for Array1d<V> {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

impl<V: Scalar> Vector for Array1d<V> {
    type Value = V;

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_and_resize() {
        let mut a: Array1d<f64> = Array1d::zeros(4);
        assert_eq!(a.len(), 4);
        a[2] = 7.0;
        a.resize(8);
        assert_eq!(a.len(), 8);
        assert!(a.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_swap() {
        let mut a = Array1d::from_vec(vec![1.0f64, 2.0]);
        let mut b = Array1d::from_vec(vec![3.0f64]);
        a.swap(&mut b);
        assert_eq!(a.as_slice(), &[3.0]);
        assert_eq!(b.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn test_from_iterator() {
        let a: Array1d<f32> = (0..3).map(|i| i as f32).collect();
        assert_eq!(a.as_slice(), &[0.0, 1.0, 2.0]);
    }
}
