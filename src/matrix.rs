//! Dimension-checked matrices and linear maps
//!
//! The constraint pipeline moves three kinds of rectangular data around:
//! concrete rational matrices (guard systems, update maps), symbolic
//! matrices whose entries are [`crate::algebra::Expr`] trees (templates,
//! Farkas premises), and the `(A, b)` pairs that represent affine maps
//! `x ↦ Ax + b` and row-wise predicates `Ax ≤ b`.
//!
//! ## Invariants
//!
//! - Every [`Mat`] carries its shape; ill-dimensioned operations are
//!   rejected with [`MatrixError::Shape`] instead of producing garbage.
//! - A [`LinearMap`] is always square-with-offset: `a` is `n×n` and `b`
//!   is `n×1`, checked at construction.
//! - [`LinSys`] couples a coefficient matrix with a right-hand column of
//!   the same height; the reading is `A·x ≤ b` row-wise.
//!
//! Matrices here are dense and tiny (a handful of program variables), so
//! the representation is a flat row-major `Vec` with no cleverness.

#![forbid(unsafe_code)]

use std::ops::{Mul, Neg, Sub};

use num_traits::{One, Zero};

use crate::Q;

/// Errors surfaced by matrix construction and arithmetic.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("shape mismatch in {op}: left is {lhs_rows}x{lhs_cols}, right is {rhs_rows}x{rhs_cols}")]
    Shape {
        op: &'static str,
        lhs_rows: usize,
        lhs_cols: usize,
        rhs_rows: usize,
        rhs_cols: usize,
    },
    #[error("ragged row {row}: expected {expected} columns, got {got}")]
    Ragged { row: usize, expected: usize, got: usize },
    #[error("linear map must pair an n x n matrix with an n x 1 offset (a is {a_rows}x{a_cols}, b is {b_rows}x{b_cols})")]
    BadLinearMap {
        a_rows: usize,
        a_cols: usize,
        b_rows: usize,
        b_cols: usize,
    },
}

/// Dense row-major matrix with its shape carried alongside the data.
#[derive(Clone, Debug, PartialEq)]
pub struct Mat<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T> Mat<T> {
    /// Build a matrix from explicit rows; all rows must share one width.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Self, MatrixError> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n_cols {
                return Err(MatrixError::Ragged { row: i, expected: n_cols, got: row.len() });
            }
            data.extend(row);
        }
        Ok(Self { rows: n_rows, cols: n_cols, data })
    }

    /// Build an `rows x cols` matrix from an entry generator.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Self { rows, cols, data }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Shape as a `(rows, cols)` pair.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Borrow the entry at `(i, j)`.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[i * self.cols + j]
    }

    /// Borrow row `i` as a slice.
    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Iterate over rows as slices.
    pub fn row_iter(&self) -> impl Iterator<Item = &[T]> {
        (0..self.rows).map(move |i| self.row(i))
    }

    /// Apply `f` entrywise, producing a matrix of the same shape.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> Mat<U> {
        Mat {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|t| f(t)).collect(),
        }
    }

    fn shape_err(&self, op: &'static str, other: &Self) -> MatrixError {
        MatrixError::Shape {
            op,
            lhs_rows: self.rows,
            lhs_cols: self.cols,
            rhs_rows: other.rows,
            rhs_cols: other.cols,
        }
    }
}

impl<T: Clone> Mat<T> {
    /// Transpose.
    pub fn transpose(&self) -> Mat<T> {
        Mat::from_fn(self.cols, self.rows, |i, j| self.get(j, i).clone())
    }

    /// Stack `other` below `self` (both must share a width).
    ///
    /// A zero-row operand is the neutral element, which lets premise
    /// builders fold over possibly-empty constraint blocks.
    pub fn vstack(&self, other: &Self) -> Result<Mat<T>, MatrixError> {
        if self.rows == 0 {
            return Ok(other.clone());
        }
        if other.rows == 0 {
            return Ok(self.clone());
        }
        if self.cols != other.cols {
            return Err(self.shape_err("vstack", other));
        }
        let mut data = self.data.clone();
        data.extend(other.data.iter().cloned());
        Ok(Mat { rows: self.rows + other.rows, cols: self.cols, data })
    }
}

impl<T: Clone + Zero> Mat<T> {
    /// All-zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Mat::from_fn(rows, cols, |_, _| T::zero())
    }

    /// Entrywise sum.
    pub fn add(&self, other: &Self) -> Result<Mat<T>, MatrixError> {
        if self.shape() != other.shape() {
            return Err(self.shape_err("add", other));
        }
        Ok(Mat::from_fn(self.rows, self.cols, |i, j| {
            self.get(i, j).clone() + other.get(i, j).clone()
        }))
    }

    /// Matrix product `self · other`.
    pub fn matmul(&self, other: &Self) -> Result<Mat<T>, MatrixError>
    where
        T: Mul<Output = T>,
    {
        if self.cols != other.rows {
            return Err(self.shape_err("matmul", other));
        }
        Ok(Mat::from_fn(self.rows, other.cols, |i, j| {
            let mut acc = T::zero();
            for k in 0..self.cols {
                acc = acc + self.get(i, k).clone() * other.get(k, j).clone();
            }
            acc
        }))
    }

    /// Scale every entry by `k`.
    pub fn scale(&self, k: &T) -> Mat<T>
    where
        T: Mul<Output = T>,
    {
        self.map(|t| k.clone() * t.clone())
    }

    /// Dot product of a `1×n` row with an `n×1` column.
    pub fn dot(&self, col: &Self) -> Result<T, MatrixError>
    where
        T: Mul<Output = T>,
    {
        if self.rows != 1 || col.cols != 1 || self.cols != col.rows {
            return Err(self.shape_err("dot", col));
        }
        let mut acc = T::zero();
        for k in 0..self.cols {
            acc = acc + self.get(0, k).clone() * col.get(k, 0).clone();
        }
        Ok(acc)
    }
}

impl<T: Clone + Zero + Sub<Output = T>> Mat<T> {
    /// Entrywise difference.
    pub fn sub(&self, other: &Self) -> Result<Mat<T>, MatrixError> {
        if self.shape() != other.shape() {
            return Err(self.shape_err("sub", other));
        }
        Ok(Mat::from_fn(self.rows, self.cols, |i, j| {
            self.get(i, j).clone() - other.get(i, j).clone()
        }))
    }
}

impl<T: Clone + Neg<Output = T>> Mat<T> {
    /// Entrywise negation.
    pub fn neg(&self) -> Mat<T> {
        self.map(|t| -t.clone())
    }
}

impl<T: Clone + Zero + One> Mat<T> {
    /// `n×n` identity.
    pub fn identity(n: usize) -> Self {
        Mat::from_fn(n, n, |i, j| if i == j { T::one() } else { T::zero() })
    }
}

// ============================================================================
// Linear systems `A·x ≤ b`
// ============================================================================

/// A row-wise system of linear inequalities `A·x ≤ b`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinSys<T> {
    /// Coefficient matrix, one row per inequality.
    pub a: Mat<T>,
    /// Right-hand column, same height as `a`.
    pub b: Mat<T>,
}

impl<T: Clone> LinSys<T> {
    /// Couple a coefficient matrix with its right-hand column.
    pub fn new(a: Mat<T>, b: Mat<T>) -> Result<Self, MatrixError> {
        if b.cols() != 1 || a.rows() != b.rows() {
            return Err(MatrixError::Shape {
                op: "linsys",
                lhs_rows: a.rows(),
                lhs_cols: a.cols(),
                rhs_rows: b.rows(),
                rhs_cols: b.cols(),
            });
        }
        Ok(Self { a, b })
    }

    /// Empty system over `n` variables (trivially true).
    pub fn empty(n: usize) -> Self
    where
        T: Zero,
    {
        Self { a: Mat::from_fn(0, n, |_, _| T::zero()), b: Mat::from_fn(0, 1, |_, _| T::zero()) }
    }

    /// Number of inequalities.
    pub fn rows(&self) -> usize {
        self.a.rows()
    }

    /// Stack another system below this one.
    pub fn stack(&self, other: &Self) -> Result<LinSys<T>, MatrixError> {
        Ok(LinSys { a: self.a.vstack(&other.a)?, b: self.b.vstack(&other.b)? })
    }

    /// Convert entries with `f` (typically `Q → Expr` lifting).
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> LinSys<U> {
        LinSys { a: self.a.map(&mut f), b: self.b.map(&mut f) }
    }
}

// ============================================================================
// Affine update maps `x' = A·x + b`
// ============================================================================

/// A concrete affine map `x ↦ A·x + b` over the module's variable tuple.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearMap {
    a: Mat<Q>,
    b: Mat<Q>,
}

impl LinearMap {
    /// Couple the matrix and offset, rejecting non-square or mismatched
    /// shapes.
    pub fn new(a: Mat<Q>, b: Mat<Q>) -> Result<Self, MatrixError> {
        if a.rows() != a.cols() || b.rows() != a.rows() || b.cols() != 1 {
            return Err(MatrixError::BadLinearMap {
                a_rows: a.rows(),
                a_cols: a.cols(),
                b_rows: b.rows(),
                b_cols: b.cols(),
            });
        }
        Ok(Self { a, b })
    }

    /// Identity map on `n` variables.
    pub fn identity(n: usize) -> Self {
        Self { a: Mat::identity(n), b: Mat::zeros(n, 1) }
    }

    /// Constant map `x' = b` on `n = b.len()` variables.
    pub fn constant(b: Vec<Q>) -> Self {
        let n = b.len();
        Self {
            a: Mat::zeros(n, n),
            b: Mat::from_fn(n, 1, |i, _| b[i]),
        }
    }

    /// The coefficient matrix.
    pub fn a(&self) -> &Mat<Q> {
        &self.a
    }

    /// The offset column.
    pub fn b(&self) -> &Mat<Q> {
        &self.b
    }

    /// Dimension `n` of the underlying variable tuple.
    pub fn dim(&self) -> usize {
        self.a.rows()
    }

    /// Apply the map to a concrete state.
    pub fn apply(&self, state: &[Q]) -> Vec<Q> {
        let n = self.dim();
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let mut acc = *self.b.get(i, 0);
            for j in 0..n {
                acc += *self.a.get(i, j) * state[j];
            }
            out.push(acc);
        }
        out
    }

    /// If row `idx` of `A` is identically zero, the variable at `idx` is
    /// assigned the constant `b[idx]`; return it.
    pub fn const_row(&self, idx: usize) -> Option<Q> {
        for j in 0..self.a.cols() {
            if !self.a.get(idx, j).is_zero() {
                return None;
            }
        }
        Some(*self.b.get(idx, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: i64) -> Q {
        Q::new(n, 1)
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        let err = Mat::from_rows(vec![vec![q(1), q(2)], vec![q(3)]]).unwrap_err();
        assert!(matches!(err, MatrixError::Ragged { row: 1, expected: 2, got: 1 }));
    }

    #[test]
    fn matmul_shapes_are_enforced() {
        let a: Mat<Q> = Mat::zeros(2, 3);
        let b: Mat<Q> = Mat::zeros(2, 3);
        assert!(a.matmul(&b).is_err());
        assert_eq!(a.matmul(&b.transpose()).unwrap().shape(), (2, 2));
    }

    #[test]
    fn transpose_roundtrip() {
        let m = Mat::from_rows(vec![vec![q(1), q(2), q(3)], vec![q(4), q(5), q(6)]]).unwrap();
        assert_eq!(m.transpose().transpose(), m);
    }

    #[test]
    fn vstack_treats_empty_as_neutral() {
        let m = Mat::from_rows(vec![vec![q(1), q(2)]]).unwrap();
        let empty: Mat<Q> = Mat::from_fn(0, 5, |_, _| q(0));
        assert_eq!(m.vstack(&empty).unwrap(), m);
        assert_eq!(empty.vstack(&m).unwrap(), m);
    }

    #[test]
    fn linear_map_applies_affinely() {
        // x' = 2x + 1, c' = 0
        let m = LinearMap::new(
            Mat::from_rows(vec![vec![q(2), q(0)], vec![q(0), q(0)]]).unwrap(),
            Mat::from_rows(vec![vec![q(1)], vec![q(0)]]).unwrap(),
        )
        .unwrap();
        assert_eq!(m.apply(&[q(3), q(7)]), vec![q(7), q(0)]);
        assert_eq!(m.const_row(1), Some(q(0)));
        assert_eq!(m.const_row(0), None);
    }

    #[test]
    fn linear_map_rejects_non_square() {
        let err = LinearMap::new(Mat::zeros(2, 3), Mat::zeros(2, 1)).unwrap_err();
        assert!(matches!(err, MatrixError::BadLinearMap { .. }));
    }
}
