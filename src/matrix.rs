//! Dense branch matrices.
//!
//! Incidence and constitutive matrices are small (nodes x branches), so they
//! are stored dense and row-major. Generic over the entry type so the same
//! builders produce numeric (`f64`) or symbolic (`String`) matrices.

use std::fmt;

use crate::ir::{format_real, Value};

/// A matrix entry: a float on the numeric path, a MATC string on the
/// symbolic path.
pub trait Entry: Clone + PartialEq + fmt::Debug {
    fn zero() -> Self;

    /// `+1` or `-1` (any other sign maps to zero).
    fn unit(sign: i8) -> Self;

    /// Converts a branch value. Returns `None` if the value cannot be
    /// represented, e.g. an expression on the numeric path.
    fn from_value(value: &Value) -> Option<Self>;

    /// `Some(1)`, `Some(-1)` or `Some(0)` for unit entries, `None` otherwise.
    fn sign(&self) -> Option<i8>;

    fn render(&self) -> String;

    fn is_zero(&self) -> bool {
        self.sign() == Some(0)
    }
}

impl Entry for f64 {
    fn zero() -> Self {
        0.0
    }

    fn unit(sign: i8) -> Self {
        match sign {
            1 => 1.0,
            -1 => -1.0,
            _ => 0.0,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }

    fn sign(&self) -> Option<i8> {
        if *self == 1.0 {
            Some(1)
        } else if *self == -1.0 {
            Some(-1)
        } else if *self == 0.0 {
            Some(0)
        } else {
            None
        }
    }

    fn render(&self) -> String {
        format_real(*self)
    }
}

impl Entry for String {
    fn zero() -> Self {
        "0".to_string()
    }

    fn unit(sign: i8) -> Self {
        match sign {
            1 => "1".to_string(),
            -1 => "-1".to_string(),
            _ => "0".to_string(),
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.to_string())
    }

    fn sign(&self) -> Option<i8> {
        match self.as_str() {
            "1" => Some(1),
            "-1" => Some(-1),
            "0" => Some(0),
            _ => None,
        }
    }

    fn render(&self) -> String {
        self.clone()
    }
}

/// Row-major dense matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix<T> {
    pub nrows: usize,
    pub ncols: usize,
    values: Vec<T>,
}

impl<T: Entry> DenseMatrix<T> {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            values: vec![T::zero(); nrows * ncols],
        }
    }

    /// Build from (row, col, value) triplets. A later triplet at the same
    /// position replaces the earlier one.
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: Vec<(usize, usize, T)>) -> Self {
        let mut m = Self::zeros(nrows, ncols);
        for (row, col, value) in triplets {
            m.set(row, col, value);
        }
        m
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        assert!(row < self.nrows && col < self.ncols, "matrix index out of bounds");
        self.values[row * self.ncols + col] = value;
    }

    pub fn get(&self, row: usize, col: usize) -> &T {
        &self.values[row * self.ncols + col]
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// Number of entries that are not unit zeros.
    pub fn nnz(&self) -> usize {
        self.values.iter().filter(|v| !v.is_zero()).count()
    }

    /// Nested rows.
    pub fn to_dense(&self) -> Vec<Vec<T>> {
        self.values.chunks(self.ncols.max(1)).take(self.nrows).map(<[T]>::to_vec).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let m: DenseMatrix<f64> = DenseMatrix::zeros(2, 3);
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.nnz(), 0);
        assert_eq!(m.to_dense(), vec![vec![0.0; 3], vec![0.0; 3]]);
    }

    #[test]
    fn test_from_triplets_later_entry_wins() {
        let m = DenseMatrix::from_triplets(2, 2, vec![(0, 0, 1.0), (0, 0, -1.0), (1, 1, 3.0)]);
        assert_eq!(m.to_dense(), vec![vec![-1.0, 0.0], vec![0.0, 3.0]]);
        assert_eq!(m.nnz(), 2);
    }

    #[test]
    fn test_string_entries() {
        let m = DenseMatrix::from_triplets(1, 3, vec![(0, 0, String::unit(1)), (0, 2, String::unit(-1))]);
        assert_eq!(m.to_dense(), vec![vec!["1".to_string(), "0".to_string(), "-1".to_string()]]);
        assert_eq!(m.get(0, 2).sign(), Some(-1));
    }

    #[test]
    fn test_entry_from_value() {
        let expr = Value::Symbolic("if(tx<1.0){1.0} else {2.0}".into());
        assert_eq!(f64::from_value(&expr), None);
        assert_eq!(String::from_value(&expr).as_deref(), Some("if(tx<1.0){1.0} else {2.0}"));
        assert_eq!(String::from_value(&Value::Numeric(10.0)).as_deref(), Some("10.0"));
        assert_eq!(f64::from_value(&Value::Numeric(10.0)), Some(10.0));
    }
}
