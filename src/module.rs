//! Probabilistic reactive modules
//!
//! The data model the synthesiser consumes: a fixed ordered variable
//! tuple, a finite set of concrete initial states, and guarded commands
//! whose updates are an outer nondeterministic choice among discrete
//! probability distributions over affine maps.
//!
//! ## Invariants
//!
//! - Probabilities in every distribution are nonnegative rationals that
//!   sum to exactly `1` (checked with exact arithmetic, not floats).
//! - Every update map is dimensioned against the module's variable
//!   tuple.
//! - When the tuple contains the distinguished DPA-state variable `q`,
//!   every update's `q` row is zero and its offset an integer literal —
//!   the consecution check reads the successor DPA state straight from
//!   that offset.
//! - Initial states carry one value per variable.
//!
//! Violations are structural errors ([`ModuleError`]), fatal to the
//! construction; nothing is repaired silently.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::algebra::{AlgebraError, Formula, Sym};
use crate::matrix::{LinearMap, MatrixError};
use crate::Q;

/// Name of the distinguished DPA-state variable.
pub const Q_VAR: &str = "q";

/// A concrete program state, one rational per variable.
pub type State = Vec<Q>;

/// Errors surfaced by module construction and composition.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("probabilities sum to {got} instead of 1")]
    BadDistribution { got: Q },
    #[error("negative probability {0}")]
    NegativeProbability(Q),
    #[error("nondeterministic update must offer at least one distribution")]
    EmptyUpdate,
    #[error("state carries {got} values for {expected} variables")]
    BadStateArity { expected: usize, got: usize },
    #[error("update is {got}-dimensional but the module has {expected} variables")]
    BadUpdateDim { expected: usize, got: usize },
    #[error("update writes to `q` nonconstantly or with a non-integer target")]
    NonConstantQ,
    #[error("label `{0}` synchronises no feasible command pair")]
    IncompatibleSync(String),
    #[error("parity automaton must own exactly the variable `q`")]
    AutomatonShape,
    #[error("parity automaton commands must be deterministic")]
    AutomatonNondeterministic,
    #[error("parity automaton shares variables with the module")]
    AutomatonOverlap,
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error(transparent)]
    Algebra(#[from] AlgebraError),
}

// ============================================================================
// Updates
// ============================================================================

/// One probabilistic branch `(p, u)`.
pub type Branch = (Q, LinearMap);

/// A discrete probability distribution over affine updates.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbUpdate {
    branches: Vec<Branch>,
}

impl ProbUpdate {
    /// Validate nonnegativity and the exact sum-to-one invariant.
    pub fn new(branches: Vec<Branch>) -> Result<Self, ModuleError> {
        let mut total = Q::new(0, 1);
        for (p, _) in &branches {
            if *p < Q::new(0, 1) {
                return Err(ModuleError::NegativeProbability(*p));
            }
            total += *p;
        }
        if total != Q::new(1, 1) {
            return Err(ModuleError::BadDistribution { got: total });
        }
        Ok(Self { branches })
    }

    /// The Dirac distribution on a single update.
    pub fn dirac(update: LinearMap) -> Self {
        Self { branches: vec![(Q::new(1, 1), update)] }
    }

    /// The branches in order.
    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }
}

/// Nondeterministic stochastic update: the scheduler's choice among
/// distributions enabled at the same guard.
pub type Ndsu = Vec<ProbUpdate>;

// ============================================================================
// Commands and modules
// ============================================================================

/// A guarded command `labels: guard → NDSU`.
#[derive(Clone, Debug, PartialEq)]
pub struct GuardedCommand {
    /// Synchronisation labels; commands sharing a label fire together,
    /// a command with no labels fires alone.
    pub labels: Vec<String>,
    /// Enabling condition, kept in DNF.
    pub guard: Formula,
    /// The nondeterministic stochastic update.
    pub update: Ndsu,
}

impl GuardedCommand {
    /// Construct a command; the update list must be nonempty.
    pub fn new(labels: Vec<String>, guard: Formula, update: Ndsu) -> Result<Self, ModuleError> {
        if update.is_empty() {
            return Err(ModuleError::EmptyUpdate);
        }
        Ok(Self { labels, guard: guard.to_dnf(), update })
    }

    /// Unlabeled command.
    pub fn unlabeled(guard: Formula, update: Ndsu) -> Result<Self, ModuleError> {
        Self::new(Vec::new(), guard, update)
    }
}

/// A probabilistic reactive module.
#[derive(Clone, Debug, PartialEq)]
pub struct ReactiveModule {
    vars: Vec<Sym>,
    init: Vec<State>,
    commands: Vec<GuardedCommand>,
}

impl ReactiveModule {
    /// Validate and assemble a module.
    pub fn new(
        init: Vec<State>,
        vars: Vec<Sym>,
        commands: Vec<GuardedCommand>,
    ) -> Result<Self, ModuleError> {
        let n = vars.len();
        for state in &init {
            if state.len() != n {
                return Err(ModuleError::BadStateArity { expected: n, got: state.len() });
            }
        }
        let q_idx = vars.iter().position(|v| v.as_str() == Q_VAR);
        for command in &commands {
            for dist in &command.update {
                for (_, update) in dist.branches() {
                    if update.dim() != n {
                        return Err(ModuleError::BadUpdateDim { expected: n, got: update.dim() });
                    }
                    if let Some(qi) = q_idx {
                        match update.const_row(qi) {
                            Some(target) if target.is_integer() => {}
                            _ => return Err(ModuleError::NonConstantQ),
                        }
                    }
                }
            }
        }
        Ok(Self { vars, init, commands })
    }

    /// The ordered variable tuple.
    pub fn vars(&self) -> &[Sym] {
        &self.vars
    }

    /// The finite initial-state set.
    pub fn init(&self) -> &[State] {
        &self.init
    }

    /// All commands.
    pub fn commands(&self) -> &[GuardedCommand] {
        &self.commands
    }

    /// The guards, in command order.
    pub fn guards(&self) -> Vec<&Formula> {
        self.commands.iter().map(|c| &c.guard).collect()
    }

    /// Position of the DPA-state variable, if present.
    pub fn q_index(&self) -> Option<usize> {
        self.vars.iter().position(|v| v.as_str() == Q_VAR)
    }

    /// The `k`-th command's NDSU.
    pub fn command_updates(&self, k: usize) -> &Ndsu {
        &self.commands[k].update
    }

    /// Assignment environment for a concrete state.
    pub fn state_env(&self, state: &[Q]) -> BTreeMap<Sym, Q> {
        self.vars.iter().cloned().zip(state.iter().copied()).collect()
    }

    /// Indices of commands whose guard holds in `state`.
    pub fn enabled_commands(&self, state: &[Q]) -> Result<Vec<usize>, AlgebraError> {
        let env = self.state_env(state);
        let mut out = Vec::new();
        for (k, c) in self.commands.iter().enumerate() {
            if c.guard.eval(&env)? {
                out.push(k);
            }
        }
        Ok(out)
    }
}

// ============================================================================
// Parity automata
// ============================================================================

/// A deterministic parity automaton, packaged as a single-variable
/// reactive module over `q` plus a priority per automaton state.
#[derive(Clone, Debug)]
pub struct ParityAutomaton {
    module: ReactiveModule,
    priorities: BTreeMap<i64, usize>,
}

impl ParityAutomaton {
    /// Validate the automaton shape: exactly the variable `q`, and each
    /// command a Dirac assignment of a constant to `q`.
    pub fn new(
        module: ReactiveModule,
        priorities: BTreeMap<i64, usize>,
    ) -> Result<Self, ModuleError> {
        if module.vars().len() != 1 || module.q_index() != Some(0) {
            return Err(ModuleError::AutomatonShape);
        }
        for command in module.commands() {
            let dists = &command.update;
            let deterministic = dists.len() == 1
                && dists[0].branches().len() == 1
                && dists[0].branches()[0].0 == Q::new(1, 1);
            if !deterministic {
                return Err(ModuleError::AutomatonNondeterministic);
            }
        }
        Ok(Self { module, priorities })
    }

    /// The underlying single-variable module.
    pub fn module(&self) -> &ReactiveModule {
        &self.module
    }

    /// The automaton states, ascending.
    pub fn states(&self) -> Vec<i64> {
        self.priorities.keys().copied().collect()
    }

    /// Priority of one state.
    pub fn priority(&self, state: i64) -> Option<usize> {
        self.priorities.get(&state).copied()
    }

    /// The priority-ordered parity objectives `S_i`: for each priority
    /// level `i`, the disjunction of `q = c` over states `c` carrying
    /// priority `i` (`False` when the level is empty).
    pub fn objectives(&self) -> Vec<Formula> {
        let max = self.priorities.values().copied().max().unwrap_or(0);
        (0..=max)
            .map(|level| {
                Formula::or(
                    self.priorities
                        .iter()
                        .filter(|(_, p)| **p == level)
                        .map(|(state, _)| Formula::var_eq(Q_VAR, Q::new(*state, 1)))
                        .collect(),
                )
            })
            .collect()
    }
}
