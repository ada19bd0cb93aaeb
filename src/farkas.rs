//! Farkas constraint generator
//!
//! The single lever that turns a universally-quantified linear implication
//! over the program variables into purely-existential constraints over
//! fresh nonnegative multipliers:
//!
//! ```text
//! ∀x. A·x ≤ b ⇒ c·x ≤ d      iff      ∃z ≥ 0. Aᵀz = c ∧ bᵀz ≤ d
//! ```
//!
//! The premise entries may be symbolic (invariant template rows), so the
//! emitted constraints are bilinear in template coefficients and
//! multipliers; Z3 handles them as nonlinear real arithmetic.
//!
//! ## Contract
//!
//! - The generator returns constraints; it never touches a solver.
//! - The `z ≥ 0` bounds are emitted here, exactly once per multiplier —
//!   callers must not duplicate them.
//! - Strict conclusions are the caller's business: strictness rides on
//!   the right-hand side through a positive slack (the per-command `ε`),
//!   and the generator stays non-strict.

#![forbid(unsafe_code)]

use z3::ast::Bool;

use crate::algebra::Expr;
use crate::matrix::{Mat, MatrixError};
use crate::smt::{SmtEnv, SymbolContext};

/// Errors surfaced by the generator.
#[derive(Debug, thiserror::Error)]
pub enum FarkasError {
    #[error("premise is {a_rows}x{a_cols} with rhs {b_rows}x1 but conclusion is {c_rows}x1")]
    Shape {
        a_rows: usize,
        a_cols: usize,
        b_rows: usize,
        c_rows: usize,
    },
    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// Emit the Farkas constraints for `∀x. A·x ≤ b ⇒ c·x ≤ d`.
///
/// `a` is `r×n`, `b` is `r×1`, `c` is `n×1` and `d` a scalar expression.
/// Returns the constraint set `{z ≥ 0} ∪ {Aᵀz = c per column} ∪ {bᵀz ≤ d}`
/// over a fresh multiplier column `z`.
pub fn farkas_constraints<'ctx>(
    symbols: &mut SymbolContext,
    env: &SmtEnv<'ctx>,
    a: &Mat<Expr>,
    b: &Mat<Expr>,
    c: &Mat<Expr>,
    d: &Expr,
) -> Result<Vec<Bool<'ctx>>, FarkasError> {
    let (rows, cols) = a.shape();
    if b.shape() != (rows, 1) || c.shape() != (cols, 1) {
        return Err(FarkasError::Shape {
            a_rows: rows,
            a_cols: cols,
            b_rows: b.rows(),
            c_rows: c.rows(),
        });
    }

    let z = symbols.fresh_col("z", rows);
    let mut out = Vec::with_capacity(rows + cols + 1);

    for i in 0..rows {
        out.push(env.ge0(z.get(i, 0)));
    }

    // Aᵀz = c, one equality per premise column.
    let atz = a.transpose().matmul(&z)?;
    for i in 0..cols {
        out.push(env.eq(atz.get(i, 0), c.get(i, 0)));
    }

    // bᵀz ≤ d.
    let btz = b.transpose().dot(&z)?;
    out.push(env.le(&btz, d));

    Ok(out)
}
