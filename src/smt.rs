//! SMT bridge
//!
//! Lowers algebra-kernel terms into a Z3 linear-real-arithmetic
//! environment and decodes rational model values back out.
//!
//! ## Invariants
//!
//! - Symbol identity is scoped to one [`SmtEnv`]: every `Sym` maps to
//!   exactly one Z3 `Real` per environment, created lazily on first use.
//!   There is no process-global table; each synthesis call owns its
//!   context (and its [`SymbolContext`]) outright.
//! - Fresh-name generation is deterministic: names embed a monotone
//!   counter, so identical inputs produce identical constraint sets.
//! - DNF lowering preserves strictness and equality; atom *normalisation*
//!   (which relaxes strict orderings) is a premise-side concern and never
//!   happens here.
//! - Satisfiability probes always run on a fresh solver so they cannot
//!   leak assertions into the main constraint set.

#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use num_traits::Zero;
use z3::ast::{Ast, Bool, Real};
use z3::{Config, Context, Model, SatResult, Solver};

use crate::algebra::{Atom, Expr, Formula, Rel, Sym};
use crate::matrix::{LinSys, Mat};
use crate::Q;

/// Errors surfaced by lowering and model decoding.
#[derive(Debug, thiserror::Error)]
pub enum SmtError {
    #[error("solver returned no model")]
    MissingModel,
    #[error("model value for `{0}` is not numeric")]
    NonNumericModel(String),
}

// ============================================================================
// Fresh symbols
// ============================================================================

/// Deterministic fresh-symbol factory for one synthesis call.
///
/// Names look like `prefix_(k)` with `k` a counter that ticks once per
/// symbol; the full creation sequence is recorded so callers can compare
/// two runs for determinism.
#[derive(Debug, Default)]
pub struct SymbolContext {
    counter: u64,
    created: Vec<Sym>,
}

impl SymbolContext {
    /// Fresh context with the counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint one fresh symbol.
    pub fn fresh(&mut self, prefix: &str) -> Sym {
        self.counter += 1;
        let sym = Sym::new(format!("{prefix}_({})", self.counter));
        self.created.push(sym.clone());
        sym
    }

    /// Fresh `1×n` row of symbols.
    pub fn fresh_row(&mut self, prefix: &str, n: usize) -> Mat<Expr> {
        let mut entries = Vec::with_capacity(n);
        for j in 0..n {
            entries.push(Expr::Var(self.fresh(&format!("{prefix}_{j}"))));
        }
        Mat::from_fn(1, n, |_, j| entries[j].clone())
    }

    /// Fresh `n×1` column of symbols.
    pub fn fresh_col(&mut self, prefix: &str, n: usize) -> Mat<Expr> {
        let mut entries = Vec::with_capacity(n);
        for i in 0..n {
            entries.push(Expr::Var(self.fresh(&format!("{prefix}_{i}"))));
        }
        Mat::from_fn(n, 1, |i, _| entries[i].clone())
    }

    /// The creation sequence so far.
    pub fn created(&self) -> &[Sym] {
        &self.created
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Build a Z3 configuration, optionally carrying the synthesis deadline.
pub fn solver_config(timeout: Option<Duration>) -> Config {
    let mut cfg = Config::new();
    if let Some(t) = timeout {
        cfg.set_param_value("timeout", &t.as_millis().to_string());
    }
    cfg
}

/// Lowering environment tied to one Z3 context.
pub struct SmtEnv<'ctx> {
    ctx: &'ctx Context,
    vars: RefCell<HashMap<Sym, Real<'ctx>>>,
}

impl<'ctx> SmtEnv<'ctx> {
    /// Wrap a context with an empty symbol table.
    pub fn new(ctx: &'ctx Context) -> Self {
        Self { ctx, vars: RefCell::new(HashMap::new()) }
    }

    /// The underlying context.
    pub fn ctx(&self) -> &'ctx Context {
        self.ctx
    }

    /// The Z3 real for `sym`, declared on first use.
    pub fn real(&self, sym: &Sym) -> Real<'ctx> {
        let mut vars = self.vars.borrow_mut();
        if let Some(r) = vars.get(sym) {
            return r.clone();
        }
        let r = Real::new_const(self.ctx, sym.as_str());
        vars.insert(sym.clone(), r.clone());
        r
    }

    /// A rational literal.
    pub fn rational(&self, q: &Q) -> Real<'ctx> {
        let (n, d) = (*q.numer(), *q.denom());
        match (i32::try_from(n), i32::try_from(d)) {
            (Ok(ni), Ok(di)) => Real::from_real(self.ctx, ni, di),
            // Out of i32 range; the decimal strings always parse.
            _ => Real::from_real_str(self.ctx, &n.to_string(), &d.to_string())
                .expect("decimal rational literal"),
        }
    }

    /// Lower an expression, recursing through sums and products.
    pub fn lower_expr(&self, e: &Expr) -> Real<'ctx> {
        match e {
            Expr::Const(q) => self.rational(q),
            Expr::Var(sym) => self.real(sym),
            Expr::Add(terms) => {
                let lowered: Vec<Real<'ctx>> = terms.iter().map(|t| self.lower_expr(t)).collect();
                let refs: Vec<&Real<'ctx>> = lowered.iter().collect();
                Real::add(self.ctx, &refs)
            }
            Expr::Mul(factors) => {
                let lowered: Vec<Real<'ctx>> = factors.iter().map(|t| self.lower_expr(t)).collect();
                let refs: Vec<&Real<'ctx>> = lowered.iter().collect();
                Real::mul(self.ctx, &refs)
            }
        }
    }

    /// `e ≤ 0`.
    pub fn le0(&self, e: &Expr) -> Bool<'ctx> {
        self.lower_expr(e).le(&self.rational(&Q::zero()))
    }

    /// `lhs ≤ rhs` over expressions.
    pub fn le(&self, lhs: &Expr, rhs: &Expr) -> Bool<'ctx> {
        self.lower_expr(lhs).le(&self.lower_expr(rhs))
    }

    /// `lhs = rhs` over expressions.
    pub fn eq(&self, lhs: &Expr, rhs: &Expr) -> Bool<'ctx> {
        self.lower_expr(lhs)._eq(&self.lower_expr(rhs))
    }

    /// `e ≥ 0`.
    pub fn ge0(&self, e: &Expr) -> Bool<'ctx> {
        self.lower_expr(e).ge(&self.rational(&Q::zero()))
    }

    /// `e > 0`.
    pub fn gt0(&self, e: &Expr) -> Bool<'ctx> {
        self.lower_expr(e).gt(&self.rational(&Q::zero()))
    }

    /// Lower one relational atom, keeping strictness and equality intact.
    /// Disequality becomes the union of the two strict sides.
    pub fn lower_atom(&self, atom: &Atom) -> Bool<'ctx> {
        let lhs = self.lower_expr(&atom.lhs);
        let zero = self.rational(&Q::zero());
        match atom.rel {
            Rel::Lt => lhs.lt(&zero),
            Rel::Le => lhs.le(&zero),
            Rel::Gt => lhs.gt(&zero),
            Rel::Ge => lhs.ge(&zero),
            Rel::Eq => lhs._eq(&zero),
            Rel::Ne => {
                let lt = lhs.lt(&zero);
                let gt = lhs.gt(&zero);
                Bool::or(self.ctx, &[&lt, &gt])
            }
        }
    }

    /// Lower one DNF conjunct as a conjunction of its atoms.
    pub fn lower_conjunct(&self, conjunct: &Formula) -> Result<Bool<'ctx>, crate::algebra::AlgebraError> {
        match conjunct {
            Formula::True => Ok(Bool::from_bool(self.ctx, true)),
            Formula::False => Ok(Bool::from_bool(self.ctx, false)),
            _ => {
                let atoms = conjunct.conjunct_atoms()?;
                let lowered: Vec<Bool<'ctx>> = atoms.iter().map(|a| self.lower_atom(a)).collect();
                let refs: Vec<&Bool<'ctx>> = lowered.iter().collect();
                Ok(Bool::and(self.ctx, &refs))
            }
        }
    }

    /// Lower a DNF formula as a disjunction of lowered conjuncts.
    pub fn lower_dnf(&self, dnf: &Formula) -> Result<Bool<'ctx>, crate::algebra::AlgebraError> {
        match dnf {
            Formula::True => Ok(Bool::from_bool(self.ctx, true)),
            Formula::False => Ok(Bool::from_bool(self.ctx, false)),
            _ => {
                let lowered = dnf
                    .disjuncts()
                    .iter()
                    .map(|c| self.lower_conjunct(c))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&Bool<'ctx>> = lowered.iter().collect();
                Ok(Bool::or(self.ctx, &refs))
            }
        }
    }

    /// Lower a concrete system `A·x ≤ b` over `vars` as a conjunction.
    pub fn lower_system(&self, sys: &LinSys<Q>, vars: &[Sym]) -> Bool<'ctx> {
        let mut rows = Vec::with_capacity(sys.rows());
        for i in 0..sys.rows() {
            let mut lhs = Expr::constant(Q::zero());
            for (j, var) in vars.iter().enumerate() {
                lhs = lhs + Expr::constant(*sys.a.get(i, j)) * Expr::var(var.clone());
            }
            rows.push(self.le(&lhs, &Expr::constant(*sys.b.get(i, 0))));
        }
        let refs: Vec<&Bool<'ctx>> = rows.iter().collect();
        Bool::and(self.ctx, &refs)
    }

    /// Satisfiability of one formula on a fresh solver.
    pub fn is_sat(&self, assertion: &Bool<'ctx>) -> bool {
        let solver = Solver::new(self.ctx);
        solver.assert(assertion);
        solver.check() == SatResult::Sat
    }

    /// Satisfiability of a DNF guard on a fresh solver.
    pub fn formula_sat(&self, dnf: &Formula) -> Result<bool, crate::algebra::AlgebraError> {
        Ok(self.is_sat(&self.lower_dnf(dnf)?))
    }

    /// Satisfiability of a concrete premise system on a fresh solver.
    pub fn system_sat(&self, sys: &LinSys<Q>, vars: &[Sym]) -> bool {
        self.is_sat(&self.lower_system(sys, vars))
    }

    /// Decode the model value of `sym` as `num/den`.
    pub fn decode_f64(&self, model: &Model<'ctx>, sym: &Sym) -> Result<f64, SmtError> {
        let real = self.real(sym);
        let value = model
            .eval(&real, true)
            .ok_or_else(|| SmtError::NonNumericModel(sym.as_str().to_owned()))?;
        let (num, den) = value
            .as_real()
            .ok_or_else(|| SmtError::NonNumericModel(sym.as_str().to_owned()))?;
        Ok(num as f64 / den as f64)
    }

    /// Decode a symbolic expression that must be a plain symbol or
    /// literal (the shape template matrices have after construction).
    pub fn decode_entry(&self, model: &Model<'ctx>, e: &Expr) -> Result<f64, SmtError> {
        match e {
            Expr::Const(q) => Ok(*q.numer() as f64 / *q.denom() as f64),
            Expr::Var(sym) => self.decode_f64(model, sym),
            other => Err(SmtError::NonNumericModel(other.to_string())),
        }
    }
}
