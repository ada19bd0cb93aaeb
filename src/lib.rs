//! Crate root: public surface, core aliases, and engine-wide invariants
//!
//! This crate synthesises **parity supermartingales** (PSMs) for
//! probabilistic reactive modules: given a guarded-command program
//! composed with a deterministic parity automaton, it produces a
//! piecewise-linear inductive invariant and a lexicographic tuple of
//! linear functions certifying that the parity objective holds with
//! probability one under every scheduler.
//!
//! ## Invariants (engine-wide)
//!
//! - **Exact arithmetic.** All symbolic constants, probabilities and
//!   update coefficients are rationals (`Q`); probability sums are
//!   checked exactly, never with floating point.
//! - **Linear-only premises.** Atoms that reach the Farkas generator are
//!   linear over the program variables; the only nonlinearity in the
//!   final SMT problem is the bilinear product of Farkas multipliers
//!   with template coefficients.
//! - **Scoped symbol identity.** Every synthesis call owns its symbol
//!   context and its Z3 context; nothing is process-global. Fresh names
//!   carry a monotone counter, so identical inputs produce identical
//!   constraint sets.
//! - **Single blocking point.** The engine is single-threaded; the only
//!   suspension is the final solver call, bounded by
//!   [`SynthesisOptions::timeout`]. On failure no partial state is
//!   observable.
//!
//! Violated structural invariants surface as precise errors (one
//! thiserror enum per module), all fatal to the current call.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::time::Duration;

/// Symbolic algebra kernel: expressions, atoms, DNF formulas.
pub mod algebra;
/// Module composition: parallel, interleaving, parity product.
pub mod compose;
/// Farkas constraint generator.
pub mod farkas;
/// Legacy iterative ranking solver.
pub mod iterative;
/// Dimension-checked matrices, linear systems and affine maps.
pub mod matrix;
/// Reactive modules, guarded commands, parity automata.
pub mod module;
/// Decoded output types and pretty printers.
pub mod report;
/// SMT bridge: symbol context, lowering, model decoding.
pub mod smt;
/// PSM synthesiser (single-call invariant + lexicographic PSM).
pub mod synth;

// ============================================================================
// Canonical aliases and root-level re-exports
// ============================================================================

/// Exact rational scalar used across the crate.
pub type Q = num_rational::Rational64;

/// Options for one synthesis call.
#[derive(Clone, Debug, Default)]
pub struct SynthesisOptions {
    /// Deadline applied to the solver; `None` means no limit. On expiry
    /// the call fails with [`synth::SynthesisError::Timeout`] and the
    /// SMT context is released.
    pub timeout: Option<Duration>,
}

pub use crate::algebra::{Atom, Expr, Formula, Rel, Sym};
pub use crate::matrix::{LinSys, LinearMap, Mat};
pub use crate::module::{
    GuardedCommand, Ndsu, ParityAutomaton, ProbUpdate, ReactiveModule, State, Q_VAR,
};
pub use crate::report::{
    pretty_lex_psm, pretty_linear_fn, pretty_state_invariant, LexPsm, LinearFn, StateInvariant,
};
pub use crate::iterative::RankingState;
pub use crate::synth::{ObligationFamily, ParitySupermartingale, SynthesisError};
