//! Symbolic algebra kernel
//!
//! Symbols, expression trees, relational atoms and boolean formulas, plus
//! the normalisation rules the rest of the pipeline relies on:
//!
//! - every relational atom is reduced to one or two `L ≤ 0` constraints
//!   (`=` splits in two, `≠` is rejected);
//! - boolean formulas are a tagged sum (`True | False | Atom | And | Or`)
//!   with an explicit [`Formula::to_dnf`] rather than structural
//!   recognition of opaque trees;
//! - a conjunction of linear atoms lowers to a stacked system `A·x ≤ b`
//!   via [`linear_eq_to_matrix`].
//!
//! Expressions may contain products of two unknowns (Farkas multipliers
//! times template coefficients produce exactly that), but atoms that feed
//! [`linear_eq_to_matrix`] must be linear over the given variable tuple;
//! anything else is [`AlgebraError::Nonlinear`].

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::Arc;

use num_traits::{One, Zero};

use crate::matrix::{LinSys, Mat, MatrixError};
use crate::Q;

/// Errors surfaced by the algebra kernel.
#[derive(Debug, thiserror::Error)]
pub enum AlgebraError {
    #[error("atom is not linear over the program variables: {0}")]
    Nonlinear(String),
    #[error("symbol `{0}` is not a program variable of this system")]
    UnknownSymbol(String),
    #[error("disequality atoms are not supported here")]
    Disequality,
    #[error("formula is not in disjunctive normal form: {0}")]
    NotDnf(String),
    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

// ============================================================================
// Symbols
// ============================================================================

/// An interned symbol name. Cloning is cheap; identity is by name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sym(Arc<str>);

impl Sym {
    /// Intern a name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Sym(Arc::from(name.as_ref()))
    }

    /// The underlying name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sym({})", self.0)
    }
}

impl From<&str> for Sym {
    fn from(s: &str) -> Self {
        Sym::new(s)
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// A symbolic arithmetic expression.
///
/// Construction through the `std::ops` impls keeps the tree shallow:
/// nested sums and products are flattened and constants folded where both
/// operands are already constant.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A rational literal.
    Const(Q),
    /// A symbol (program variable, template coefficient or multiplier).
    Var(Sym),
    /// A sum of at least two operands.
    Add(Vec<Expr>),
    /// A product of at least two operands.
    Mul(Vec<Expr>),
}

impl Expr {
    /// Literal constructor.
    pub fn constant(q: Q) -> Self {
        Expr::Const(q)
    }

    /// Integer literal convenience.
    pub fn int(n: i64) -> Self {
        Expr::Const(Q::new(n, 1))
    }

    /// Variable constructor.
    pub fn var(sym: impl Into<Sym>) -> Self {
        Expr::Var(sym.into())
    }

    /// The constant value, if this expression is a literal.
    pub fn as_const(&self) -> Option<Q> {
        match self {
            Expr::Const(q) => Some(*q),
            _ => None,
        }
    }

    /// Decompose into linear coefficients over `vars` plus a constant.
    ///
    /// Fails with [`AlgebraError::UnknownSymbol`] if a symbol outside
    /// `vars` occurs, and with [`AlgebraError::Nonlinear`] on products of
    /// two non-constant subterms.
    pub fn linear_coeffs(&self, vars: &[Sym]) -> Result<(Vec<Q>, Q), AlgebraError> {
        let mut coeffs = vec![Q::zero(); vars.len()];
        let mut konst = Q::zero();
        self.accumulate_linear(vars, Q::one(), &mut coeffs, &mut konst)?;
        Ok((coeffs, konst))
    }

    fn accumulate_linear(
        &self,
        vars: &[Sym],
        scale: Q,
        coeffs: &mut [Q],
        konst: &mut Q,
    ) -> Result<(), AlgebraError> {
        match self {
            Expr::Const(q) => {
                *konst += scale * *q;
                Ok(())
            }
            Expr::Var(sym) => match vars.iter().position(|v| v == sym) {
                Some(i) => {
                    coeffs[i] += scale;
                    Ok(())
                }
                None => Err(AlgebraError::UnknownSymbol(sym.as_str().to_owned())),
            },
            Expr::Add(terms) => {
                for t in terms {
                    t.accumulate_linear(vars, scale, coeffs, konst)?;
                }
                Ok(())
            }
            Expr::Mul(factors) => {
                // A linear product has at most one non-constant factor.
                let mut k = scale;
                let mut variable: Option<&Expr> = None;
                for f in factors {
                    match f.as_const() {
                        Some(q) => k *= q,
                        None if variable.is_none() => variable = Some(f),
                        None => return Err(AlgebraError::Nonlinear(self.to_string())),
                    }
                }
                match variable {
                    Some(v) => v.accumulate_linear(vars, k, coeffs, konst),
                    None => {
                        *konst += k;
                        Ok(())
                    }
                }
            }
        }
    }

    /// Evaluate under a concrete assignment of every symbol.
    pub fn eval(&self, env: &BTreeMap<Sym, Q>) -> Result<Q, AlgebraError> {
        match self {
            Expr::Const(q) => Ok(*q),
            Expr::Var(sym) => env
                .get(sym)
                .copied()
                .ok_or_else(|| AlgebraError::UnknownSymbol(sym.as_str().to_owned())),
            Expr::Add(terms) => {
                let mut acc = Q::zero();
                for t in terms {
                    acc += t.eval(env)?;
                }
                Ok(acc)
            }
            Expr::Mul(factors) => {
                let mut acc = Q::one();
                for f in factors {
                    acc *= f.eval(env)?;
                }
                Ok(acc)
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(q) => write!(f, "{q}"),
            Expr::Var(s) => write!(f, "{s}"),
            Expr::Add(ts) => {
                write!(f, "(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            Expr::Mul(ts) => {
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            }
        }
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        match (self, rhs) {
            (Expr::Const(a), Expr::Const(b)) => Expr::Const(a + b),
            (Expr::Const(a), x) if a.is_zero() => x,
            (x, Expr::Const(b)) if b.is_zero() => x,
            (Expr::Add(mut xs), Expr::Add(ys)) => {
                xs.extend(ys);
                Expr::Add(xs)
            }
            (Expr::Add(mut xs), y) => {
                xs.push(y);
                Expr::Add(xs)
            }
            (x, Expr::Add(mut ys)) => {
                ys.insert(0, x);
                Expr::Add(ys)
            }
            (x, y) => Expr::Add(vec![x, y]),
        }
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        self + (-rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        match (self, rhs) {
            (Expr::Const(a), Expr::Const(b)) => Expr::Const(a * b),
            (Expr::Const(a), _) | (_, Expr::Const(a)) if a.is_zero() => Expr::Const(Q::zero()),
            (Expr::Const(a), x) if a.is_one() => x,
            (x, Expr::Const(b)) if b.is_one() => x,
            (Expr::Mul(mut xs), Expr::Mul(ys)) => {
                xs.extend(ys);
                Expr::Mul(xs)
            }
            (Expr::Mul(mut xs), y) => {
                xs.push(y);
                Expr::Mul(xs)
            }
            (x, Expr::Mul(mut ys)) => {
                ys.insert(0, x);
                Expr::Mul(ys)
            }
            (x, y) => Expr::Mul(vec![x, y]),
        }
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Const(-Q::one()) * self
    }
}

impl Zero for Expr {
    fn zero() -> Self {
        Expr::Const(Q::zero())
    }

    fn is_zero(&self) -> bool {
        matches!(self, Expr::Const(q) if q.is_zero())
    }
}

impl One for Expr {
    fn one() -> Self {
        Expr::Const(Q::one())
    }
}

impl From<Q> for Expr {
    fn from(q: Q) -> Self {
        Expr::Const(q)
    }
}

// ============================================================================
// Relational atoms
// ============================================================================

/// Relational operator of an atom `L ⋈ 0`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rel {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Rel {
    /// Negation under the closed world of the six orderings.
    pub fn negated(self) -> Rel {
        match self {
            Rel::Lt => Rel::Ge,
            Rel::Le => Rel::Gt,
            Rel::Gt => Rel::Le,
            Rel::Ge => Rel::Lt,
            Rel::Eq => Rel::Ne,
            Rel::Ne => Rel::Eq,
        }
    }
}

impl fmt::Display for Rel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rel::Lt => "<",
            Rel::Le => "<=",
            Rel::Gt => ">",
            Rel::Ge => ">=",
            Rel::Eq => "=",
            Rel::Ne => "!=",
        };
        f.write_str(s)
    }
}

/// A relational atom `lhs ⋈ 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct Atom {
    /// Relational operator.
    pub rel: Rel,
    /// Left-hand side; the right-hand side is always `0`.
    pub lhs: Expr,
}

impl Atom {
    /// Build `lhs ⋈ rhs` as `lhs − rhs ⋈ 0`.
    pub fn new(lhs: Expr, rel: Rel, rhs: Expr) -> Self {
        let lhs = if rhs.is_zero() { lhs } else { lhs - rhs };
        Atom { rel, lhs }
    }

    /// The negated atom (`¬¬a ≡ a`).
    pub fn negate(&self) -> Atom {
        Atom { rel: self.rel.negated(), lhs: self.lhs.clone() }
    }

    /// Normalise to one or two `L ≤ 0` atoms.
    ///
    /// Strict orderings relax to their non-strict forms (strictness is
    /// reintroduced by the synthesiser's ε slack where it matters);
    /// equality splits into both sides; disequality is rejected.
    pub fn normalize(&self) -> Result<Vec<Atom>, AlgebraError> {
        let le = |lhs: Expr| Atom { rel: Rel::Le, lhs };
        match self.rel {
            Rel::Le | Rel::Lt => Ok(vec![le(self.lhs.clone())]),
            Rel::Ge | Rel::Gt => Ok(vec![le(-self.lhs.clone())]),
            Rel::Eq => Ok(vec![le(self.lhs.clone()), le(-self.lhs.clone())]),
            Rel::Ne => Err(AlgebraError::Disequality),
        }
    }

    /// Evaluate under a concrete assignment.
    pub fn eval(&self, env: &BTreeMap<Sym, Q>) -> Result<bool, AlgebraError> {
        let v = self.lhs.eval(env)?;
        Ok(match self.rel {
            Rel::Lt => v < Q::zero(),
            Rel::Le => v <= Q::zero(),
            Rel::Gt => v > Q::zero(),
            Rel::Ge => v >= Q::zero(),
            Rel::Eq => v.is_zero(),
            Rel::Ne => !v.is_zero(),
        })
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} 0", self.lhs, self.rel)
    }
}

// ============================================================================
// Formulas
// ============================================================================

/// A boolean combination of relational atoms.
#[derive(Clone, Debug, PartialEq)]
pub enum Formula {
    True,
    False,
    Atom(Atom),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    /// Atom constructor.
    pub fn atom(lhs: Expr, rel: Rel, rhs: Expr) -> Self {
        Formula::Atom(Atom::new(lhs, rel, rhs))
    }

    /// Conjunction with unit/absorbing folding.
    pub fn and(children: Vec<Formula>) -> Self {
        let mut out = Vec::new();
        for c in children {
            match c {
                Formula::True => {}
                Formula::False => return Formula::False,
                Formula::And(gs) => out.extend(gs),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Formula::True,
            1 => out.pop().unwrap_or(Formula::True),
            _ => Formula::And(out),
        }
    }

    /// Disjunction with unit/absorbing folding.
    pub fn or(children: Vec<Formula>) -> Self {
        let mut out = Vec::new();
        for c in children {
            match c {
                Formula::False => {}
                Formula::True => return Formula::True,
                Formula::Or(gs) => out.extend(gs),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Formula::False,
            1 => out.pop().unwrap_or(Formula::False),
            _ => Formula::Or(out),
        }
    }

    /// `var = value`.
    pub fn var_eq(var: impl Into<Sym>, value: Q) -> Self {
        Formula::atom(Expr::var(var), Rel::Eq, Expr::constant(value))
    }

    /// `var ≤ value`.
    pub fn var_le(var: impl Into<Sym>, value: Q) -> Self {
        Formula::atom(Expr::var(var), Rel::Le, Expr::constant(value))
    }

    /// `var < value`.
    pub fn var_lt(var: impl Into<Sym>, value: Q) -> Self {
        Formula::atom(Expr::var(var), Rel::Lt, Expr::constant(value))
    }

    /// `var ≥ value`.
    pub fn var_ge(var: impl Into<Sym>, value: Q) -> Self {
        Formula::atom(Expr::var(var), Rel::Ge, Expr::constant(value))
    }

    /// `var > value`.
    pub fn var_gt(var: impl Into<Sym>, value: Q) -> Self {
        Formula::atom(Expr::var(var), Rel::Gt, Expr::constant(value))
    }

    /// `var ≠ value`, expanded into the two-sided strict disjunction
    /// `var < value ∨ var > value` before any atom is formed.
    pub fn var_ne(var: impl Into<Sym>, value: Q) -> Self {
        let var = var.into();
        Formula::or(vec![
            Formula::var_lt(var.clone(), value),
            Formula::var_gt(var, value),
        ])
    }

    /// Top-level disjuncts; an atomic or conjunctive formula is its own
    /// singleton disjunct.
    pub fn disjuncts(&self) -> Vec<Formula> {
        match self {
            Formula::Or(ds) => ds.clone(),
            other => vec![other.clone()],
        }
    }

    /// Atoms of one conjunct; an atomic formula is its own singleton
    /// conjunct, `True` the empty one. Nested disjunctions mean the
    /// formula was not in DNF.
    pub fn conjunct_atoms(&self) -> Result<Vec<Atom>, AlgebraError> {
        match self {
            Formula::True => Ok(Vec::new()),
            Formula::Atom(a) => Ok(vec![a.clone()]),
            Formula::And(children) => {
                let mut atoms = Vec::with_capacity(children.len());
                for c in children {
                    match c {
                        Formula::Atom(a) => atoms.push(a.clone()),
                        Formula::True => {}
                        other => return Err(AlgebraError::NotDnf(other.to_string())),
                    }
                }
                Ok(atoms)
            }
            other => Err(AlgebraError::NotDnf(other.to_string())),
        }
    }

    /// Distribute conjunctions over disjunctions, yielding a DNF whose
    /// disjuncts satisfy the shape expected by [`Formula::conjunct_atoms`].
    pub fn to_dnf(&self) -> Formula {
        match self {
            Formula::True | Formula::False | Formula::Atom(_) => self.clone(),
            Formula::Or(children) => {
                Formula::or(children.iter().map(Formula::to_dnf).collect())
            }
            Formula::And(children) => {
                // Cross product of the children's disjunct lists.
                let mut disjuncts: Vec<Vec<Formula>> = vec![Vec::new()];
                for child in children {
                    let child_disjuncts = match child.to_dnf() {
                        Formula::False => return Formula::False,
                        Formula::True => continue,
                        dnf => dnf.disjuncts(),
                    };
                    let mut next = Vec::with_capacity(disjuncts.len() * child_disjuncts.len());
                    for prefix in &disjuncts {
                        for d in &child_disjuncts {
                            let mut conj = prefix.clone();
                            conj.push(d.clone());
                            next.push(conj);
                        }
                    }
                    disjuncts = next;
                }
                Formula::or(disjuncts.into_iter().map(Formula::and).collect())
            }
        }
    }

    /// De Morgan negation; the result is generally not in DNF.
    pub fn negate(&self) -> Formula {
        match self {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Atom(a) => Formula::Atom(a.negate()),
            Formula::And(children) => {
                Formula::or(children.iter().map(Formula::negate).collect())
            }
            Formula::Or(children) => {
                Formula::and(children.iter().map(Formula::negate).collect())
            }
        }
    }

    /// Evaluate under a concrete assignment.
    pub fn eval(&self, env: &BTreeMap<Sym, Q>) -> Result<bool, AlgebraError> {
        match self {
            Formula::True => Ok(true),
            Formula::False => Ok(false),
            Formula::Atom(a) => a.eval(env),
            Formula::And(children) => {
                for c in children {
                    if !c.eval(env)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Formula::Or(children) => {
                for c in children {
                    if c.eval(env)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => f.write_str("true"),
            Formula::False => f.write_str("false"),
            Formula::Atom(a) => write!(f, "{a}"),
            Formula::And(children) => {
                for (i, c) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" & ")?;
                    }
                    write!(f, "{c}")?;
                }
                Ok(())
            }
            Formula::Or(children) => {
                for (i, c) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "({c})")?;
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// DNF → linear system
// ============================================================================

/// Stack a list of atoms into a system `A·x ≤ b` over `vars`.
///
/// Each atom is normalised to `L ≤ 0` form first; a normalised row
/// `row·x + c ≤ 0` contributes `row` to `A` and `−c` to `b`.
pub fn linear_eq_to_matrix(atoms: &[Atom], vars: &[Sym]) -> Result<LinSys<Q>, AlgebraError> {
    let mut a_rows: Vec<Vec<Q>> = Vec::new();
    let mut b_rows: Vec<Vec<Q>> = Vec::new();
    for atom in atoms {
        for le in atom.normalize()? {
            let (coeffs, konst) = le.lhs.linear_coeffs(vars)?;
            a_rows.push(coeffs);
            b_rows.push(vec![-konst]);
        }
    }
    if a_rows.is_empty() {
        return Ok(LinSys::empty(vars.len()));
    }
    Ok(LinSys::new(Mat::from_rows(a_rows)?, Mat::from_rows(b_rows)?)?)
}

/// Linear system of one DNF conjunct over `vars`.
pub fn conjunct_to_system(conjunct: &Formula, vars: &[Sym]) -> Result<LinSys<Q>, AlgebraError> {
    linear_eq_to_matrix(&conjunct.conjunct_atoms()?, vars)
}

/// The two rows of `var = value` as a system `A·x ≤ b`.
pub fn var_eq_rows(var_idx: usize, value: Q, n: usize) -> LinSys<Q> {
    let a = Mat::from_fn(2, n, |i, j| {
        if j != var_idx {
            Q::zero()
        } else if i == 0 {
            Q::one()
        } else {
            -Q::one()
        }
    });
    let b = Mat::from_fn(2, 1, |i, _| if i == 0 { value } else { -value });
    LinSys { a, b }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: i64) -> Q {
        Q::new(n, 1)
    }

    fn x_minus(v: i64) -> Expr {
        Expr::var("x") - Expr::int(v)
    }

    #[test]
    fn normalization_is_idempotent() {
        let atom = Atom::new(x_minus(3), Rel::Le, Expr::int(0));
        let once = atom.normalize().unwrap();
        assert_eq!(once.len(), 1);
        let twice = once[0].normalize().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn equality_splits_into_both_sides() {
        let atom = Atom::new(x_minus(3), Rel::Eq, Expr::int(0));
        let rows = atom.normalize().unwrap();
        assert_eq!(rows.len(), 2);
        // Joint satisfiability pins x = 3 exactly.
        let mut env = BTreeMap::new();
        env.insert(Sym::new("x"), q(3));
        assert!(rows.iter().all(|r| r.eval(&env).unwrap()));
        env.insert(Sym::new("x"), q(4));
        assert!(!rows.iter().all(|r| r.eval(&env).unwrap()));
    }

    #[test]
    fn disequality_is_rejected() {
        let atom = Atom::new(x_minus(3), Rel::Ne, Expr::int(0));
        assert!(matches!(atom.normalize(), Err(AlgebraError::Disequality)));
    }

    #[test]
    fn negation_is_an_involution() {
        for rel in [Rel::Lt, Rel::Le, Rel::Gt, Rel::Ge, Rel::Eq, Rel::Ne] {
            let atom = Atom::new(x_minus(1), rel, Expr::int(0));
            assert_eq!(atom.negate().negate(), atom);
        }
    }

    #[test]
    fn dnf_flatten_preserves_meaning() {
        // (x ≤ 0 ∨ x ≥ 4) ∧ x = 4  →  DNF with the same truth table.
        let f = Formula::and(vec![
            Formula::or(vec![Formula::var_le("x", q(0)), Formula::var_ge("x", q(4))]),
            Formula::var_eq("x", q(4)),
        ]);
        let dnf = f.to_dnf();
        let rebuilt = Formula::or(dnf.disjuncts());
        for v in -2..6 {
            let mut env = BTreeMap::new();
            env.insert(Sym::new("x"), q(v));
            assert_eq!(f.eval(&env).unwrap(), rebuilt.eval(&env).unwrap(), "x = {v}");
            assert_eq!(f.eval(&env).unwrap(), dnf.eval(&env).unwrap(), "x = {v}");
        }
    }

    #[test]
    fn var_ne_expands_to_two_strict_sides() {
        let f = Formula::var_ne("x", q(2));
        let ds = f.disjuncts();
        assert_eq!(ds.len(), 2);
        let mut env = BTreeMap::new();
        env.insert(Sym::new("x"), q(2));
        assert!(!f.eval(&env).unwrap());
        env.insert(Sym::new("x"), q(5));
        assert!(f.eval(&env).unwrap());
    }

    #[test]
    fn linear_eq_to_matrix_uses_ax_le_b_convention() {
        // x − 3 ≤ 0 and −x ≤ 0 over (x, y).
        let vars = vec![Sym::new("x"), Sym::new("y")];
        let atoms = vec![
            Atom::new(x_minus(3), Rel::Le, Expr::int(0)),
            Atom::new(Expr::var("x"), Rel::Ge, Expr::int(0)),
        ];
        let sys = linear_eq_to_matrix(&atoms, &vars).unwrap();
        assert_eq!(sys.a.shape(), (2, 2));
        assert_eq!(*sys.a.get(0, 0), q(1));
        assert_eq!(*sys.b.get(0, 0), q(3));
        assert_eq!(*sys.a.get(1, 0), q(-1));
        assert_eq!(*sys.b.get(1, 0), q(0));
    }

    #[test]
    fn nonlinear_atom_is_fatal() {
        let vars = vec![Sym::new("x"), Sym::new("y")];
        let prod = Expr::var("x") * Expr::var("y");
        let atom = Atom::new(prod, Rel::Le, Expr::int(0));
        assert!(matches!(
            linear_eq_to_matrix(&[atom], &vars),
            Err(AlgebraError::Nonlinear(_))
        ));
    }
}
