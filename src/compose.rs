//! Module composition
//!
//! Parallel (lock-step) composition, interleaving, and the product with a
//! parity automaton. Composition works over the union variable tuple
//! `V₁ ⊕ (V₂ \ V₁)`; guards of one module may mention the other module's
//! variables (the DPA's guards do exactly that), which is why feasibility
//! of a pairing is decided by an SMT check on the conjoined guard rather
//! than syntactically.
//!
//! ## Semantics
//!
//! - **Lock-step (`parallel_composition`)**: every pair of commands whose
//!   guards are jointly satisfiable fires together; probabilities
//!   multiply. A shared variable written by both sides combines as
//!   offsets from its current value (`row₁ + row₂ − identity`), which
//!   degenerates to "the writer wins" whenever the other side keeps the
//!   identity.
//! - **Interleaving (`interleave`)**: commands with a label common to
//!   both modules always pair lock-step (same label ⇒ fire together) and
//!   never fire alone; a common label with no feasible pairing is
//!   [`ModuleError::IncompatibleSync`]. Local commands produce one
//!   combined command per jointly-enabled pair — the union of both
//!   sides' choices, each lifted with the identity on the other module's
//!   variables — plus solo commands restricted to the complement of the
//!   other module's enabled region. At most one module moves per step.
//! - **Parity product (`parity_product`)**: lock-step composition with
//!   the automaton's single-variable module; the automaton's guards
//!   partition the non-`q` state space, so exactly one automaton command
//!   pairs with each module command on each region.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use z3::{Config, Context};

use crate::algebra::{Formula, Sym};
use crate::matrix::{LinearMap, Mat};
use crate::module::{
    GuardedCommand, ModuleError, Ndsu, ParityAutomaton, ProbUpdate, ReactiveModule, State,
};
use crate::smt::SmtEnv;
use crate::Q;

// ============================================================================
// Variable layout of a composition
// ============================================================================

struct VarLayout {
    vars: Vec<Sym>,
    left_n: usize,
    /// Right variable index → composed index.
    right_pos: Vec<usize>,
    /// `(left index, right index)` of each shared variable.
    shared: Vec<(usize, usize)>,
    /// Right variable indices not shared, in right order.
    right_only: Vec<usize>,
}

fn layout(left: &ReactiveModule, right: &ReactiveModule) -> VarLayout {
    let mut vars = left.vars().to_vec();
    let left_n = vars.len();
    let mut right_pos = Vec::with_capacity(right.vars().len());
    let mut shared = Vec::new();
    let mut right_only = Vec::new();
    for (j, v) in right.vars().iter().enumerate() {
        if let Some(i) = left.vars().iter().position(|w| w == v) {
            right_pos.push(i);
            shared.push((i, j));
        } else {
            right_pos.push(vars.len());
            right_only.push(j);
            vars.push(v.clone());
        }
    }
    VarLayout { vars, left_n, right_pos, shared, right_only }
}

fn compose_init(lay: &VarLayout, left: &ReactiveModule, right: &ReactiveModule) -> Vec<State> {
    let mut out = Vec::new();
    for s1 in left.init() {
        for s2 in right.init() {
            if lay.shared.iter().all(|(i, j)| s1[*i] == s2[*j]) {
                let mut state = s1.clone();
                state.extend(lay.right_only.iter().map(|j| s2[*j]));
                out.push(state);
            }
        }
    }
    out
}

/// Lock-step lift of a pair of updates onto the composed tuple.
fn lift_lockstep(
    lay: &VarLayout,
    u1: &LinearMap,
    u2: &LinearMap,
) -> Result<LinearMap, ModuleError> {
    let n = lay.vars.len();
    let rn = lay.right_pos.len();
    let zero = Q::new(0, 1);
    let one = Q::new(1, 1);
    let mut a = vec![vec![zero; n]; n];
    let mut b = vec![zero; n];
    for i in 0..lay.left_n {
        for j in 0..lay.left_n {
            a[i][j] += *u1.a().get(i, j);
        }
        b[i] += *u1.b().get(i, 0);
    }
    for i in 0..rn {
        let ci = lay.right_pos[i];
        for j in 0..rn {
            a[ci][lay.right_pos[j]] += *u2.a().get(i, j);
        }
        b[ci] += *u2.b().get(i, 0);
    }
    // Shared rows received both equations; fold the doubled current-value
    // term back out so each side contributes its offset.
    for (i, _) in &lay.shared {
        a[*i][*i] -= one;
    }
    Ok(LinearMap::new(
        Mat::from_rows(a)?,
        Mat::from_rows(b.into_iter().map(|v| vec![v]).collect())?,
    )?)
}

/// Solo lift of a left update: right-only variables keep the identity.
fn lift_solo_left(lay: &VarLayout, u1: &LinearMap) -> Result<LinearMap, ModuleError> {
    let n = lay.vars.len();
    let zero = Q::new(0, 1);
    let one = Q::new(1, 1);
    let mut a = vec![vec![zero; n]; n];
    let mut b = vec![zero; n];
    for i in 0..lay.left_n {
        for j in 0..lay.left_n {
            a[i][j] = *u1.a().get(i, j);
        }
        b[i] = *u1.b().get(i, 0);
    }
    for cv in lay.left_n..n {
        a[cv][cv] = one;
    }
    Ok(LinearMap::new(
        Mat::from_rows(a)?,
        Mat::from_rows(b.into_iter().map(|v| vec![v]).collect())?,
    )?)
}

/// Solo lift of a right update: left-only variables keep the identity.
fn lift_solo_right(lay: &VarLayout, u2: &LinearMap) -> Result<LinearMap, ModuleError> {
    let n = lay.vars.len();
    let rn = lay.right_pos.len();
    let zero = Q::new(0, 1);
    let one = Q::new(1, 1);
    let mut a = vec![vec![zero; n]; n];
    let mut b = vec![zero; n];
    for i in 0..rn {
        let ci = lay.right_pos[i];
        for j in 0..rn {
            a[ci][lay.right_pos[j]] = *u2.a().get(i, j);
        }
        b[ci] = *u2.b().get(i, 0);
    }
    let shared_left: BTreeSet<usize> = lay.shared.iter().map(|(i, _)| *i).collect();
    for i in 0..lay.left_n {
        if !shared_left.contains(&i) {
            a[i][i] = one;
        }
    }
    Ok(LinearMap::new(
        Mat::from_rows(a)?,
        Mat::from_rows(b.into_iter().map(|v| vec![v]).collect())?,
    )?)
}

/// Drop unsatisfiable conjuncts of a DNF guard.
fn prune_dnf(env: &SmtEnv<'_>, formula: &Formula) -> Result<Formula, ModuleError> {
    let dnf = formula.to_dnf();
    match dnf {
        Formula::True | Formula::False => Ok(dnf),
        _ => {
            let mut keep = Vec::new();
            for conjunct in dnf.disjuncts() {
                if env.formula_sat(&conjunct)? {
                    keep.push(conjunct);
                }
            }
            Ok(Formula::or(keep))
        }
    }
}

fn lockstep_ndsu(
    lay: &VarLayout,
    c1: &GuardedCommand,
    c2: &GuardedCommand,
) -> Result<Ndsu, ModuleError> {
    let mut ndsu = Vec::with_capacity(c1.update.len() * c2.update.len());
    for d1 in &c1.update {
        for d2 in &c2.update {
            let mut branches = Vec::with_capacity(d1.branches().len() * d2.branches().len());
            for (p1, u1) in d1.branches() {
                for (p2, u2) in d2.branches() {
                    branches.push((*p1 * *p2, lift_lockstep(lay, u1, u2)?));
                }
            }
            ndsu.push(ProbUpdate::new(branches)?);
        }
    }
    Ok(ndsu)
}

fn solo_ndsu(
    lay: &VarLayout,
    update: &Ndsu,
    lift: impl Fn(&VarLayout, &LinearMap) -> Result<LinearMap, ModuleError>,
) -> Result<Ndsu, ModuleError> {
    let mut ndsu = Vec::with_capacity(update.len());
    for dist in update {
        let mut branches = Vec::with_capacity(dist.branches().len());
        for (p, u) in dist.branches() {
            branches.push((*p, lift(lay, u)?));
        }
        ndsu.push(ProbUpdate::new(branches)?);
    }
    Ok(ndsu)
}

fn union_labels(c1: &GuardedCommand, c2: &GuardedCommand) -> Vec<String> {
    let mut labels: Vec<String> = c1.labels.iter().chain(&c2.labels).cloned().collect();
    labels.sort();
    labels.dedup();
    labels
}

// ============================================================================
// Public composition operations
// ============================================================================

impl ReactiveModule {
    /// Lock-step parallel composition `self ∥ other`.
    pub fn parallel_composition(
        &self,
        other: &ReactiveModule,
    ) -> Result<ReactiveModule, ModuleError> {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let env = SmtEnv::new(&ctx);

        let lay = layout(self, other);
        let init = compose_init(&lay, self, other);
        let mut commands = Vec::new();
        for c1 in self.commands() {
            for c2 in other.commands() {
                let guard =
                    prune_dnf(&env, &Formula::and(vec![c1.guard.clone(), c2.guard.clone()]))?;
                if guard == Formula::False {
                    continue;
                }
                let ndsu = lockstep_ndsu(&lay, c1, c2)?;
                commands.push(GuardedCommand::new(union_labels(c1, c2), guard, ndsu)?);
            }
        }
        ReactiveModule::new(init, lay.vars, commands)
    }

    /// Interleaving composition: synchronised commands fire together,
    /// local commands move one module at a time.
    pub fn interleave(&self, other: &ReactiveModule) -> Result<ReactiveModule, ModuleError> {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let env = SmtEnv::new(&ctx);

        let lay = layout(self, other);
        let init = compose_init(&lay, self, other);
        let mut commands = Vec::new();

        let left_labels: BTreeSet<&String> =
            self.commands().iter().flat_map(|c| &c.labels).collect();
        let right_labels: BTreeSet<&String> =
            other.commands().iter().flat_map(|c| &c.labels).collect();
        let shared_labels: BTreeSet<String> = left_labels
            .intersection(&right_labels)
            .map(|l| (*l).clone())
            .collect();

        // Synchronised pairs, one batch per common label.
        for label in &shared_labels {
            let mut found = false;
            for c1 in self.commands().iter().filter(|c| c.labels.contains(label)) {
                for c2 in other.commands().iter().filter(|c| c.labels.contains(label)) {
                    let guard =
                        prune_dnf(&env, &Formula::and(vec![c1.guard.clone(), c2.guard.clone()]))?;
                    if guard == Formula::False {
                        continue;
                    }
                    let ndsu = lockstep_ndsu(&lay, c1, c2)?;
                    commands.push(GuardedCommand::new(union_labels(c1, c2), guard, ndsu)?);
                    found = true;
                }
            }
            if !found {
                return Err(ModuleError::IncompatibleSync(label.clone()));
            }
        }

        let is_local = |c: &&GuardedCommand, labels: &BTreeSet<String>| {
            c.labels.iter().all(|l| !labels.contains(l))
        };
        let local_left: Vec<&GuardedCommand> = self
            .commands()
            .iter()
            .filter(|c| is_local(c, &shared_labels))
            .collect();
        let local_right: Vec<&GuardedCommand> = other
            .commands()
            .iter()
            .filter(|c| is_local(c, &shared_labels))
            .collect();

        // Overlap region: both modules enabled, the scheduler picks the
        // mover. One command per pair, choices unioned.
        for c1 in &local_left {
            for c2 in &local_right {
                let guard =
                    prune_dnf(&env, &Formula::and(vec![c1.guard.clone(), c2.guard.clone()]))?;
                if guard == Formula::False {
                    continue;
                }
                let mut ndsu = solo_ndsu(&lay, &c1.update, lift_solo_left)?;
                ndsu.extend(solo_ndsu(&lay, &c2.update, lift_solo_right)?);
                commands.push(GuardedCommand::new(Vec::new(), guard, ndsu)?);
            }
        }

        // Solo commands on the complement of the other side's enabled
        // region.
        let left_enabled = Formula::or(self.commands().iter().map(|c| c.guard.clone()).collect());
        let right_enabled =
            Formula::or(other.commands().iter().map(|c| c.guard.clone()).collect());
        for c1 in &local_left {
            let guard = prune_dnf(
                &env,
                &Formula::and(vec![c1.guard.clone(), right_enabled.negate()]),
            )?;
            if guard == Formula::False {
                continue;
            }
            let ndsu = solo_ndsu(&lay, &c1.update, lift_solo_left)?;
            commands.push(GuardedCommand::new(Vec::new(), guard, ndsu)?);
        }
        for c2 in &local_right {
            let guard = prune_dnf(
                &env,
                &Formula::and(vec![c2.guard.clone(), left_enabled.negate()]),
            )?;
            if guard == Formula::False {
                continue;
            }
            let ndsu = solo_ndsu(&lay, &c2.update, lift_solo_right)?;
            commands.push(GuardedCommand::new(Vec::new(), guard, ndsu)?);
        }

        ReactiveModule::new(init, lay.vars, commands)
    }

    /// Product with a parity automaton: lock-step composition with the
    /// single-variable `q` module.
    pub fn parity_product(
        &self,
        automaton: &ParityAutomaton,
    ) -> Result<ReactiveModule, ModuleError> {
        if automaton
            .module()
            .vars()
            .iter()
            .any(|v| self.vars().contains(v))
        {
            return Err(ModuleError::AutomatonOverlap);
        }
        self.parallel_composition(automaton.module())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Q_VAR;
    use std::collections::BTreeMap;

    fn q(n: i64) -> Q {
        Q::new(n, 1)
    }

    fn sym(s: &str) -> Sym {
        Sym::new(s)
    }

    /// `target' = target + delta`, identity elsewhere, over `vars`.
    fn incr(vars: &[Sym], target: &str, delta: i64) -> LinearMap {
        let n = vars.len();
        let t = vars.iter().position(|v| v.as_str() == target).expect("target var");
        let a = Mat::identity(n);
        let b = Mat::from_fn(n, 1, |i, _| if i == t { q(delta) } else { q(0) });
        LinearMap::new(a, b).expect("square")
    }

    fn single_command_module(
        vars: Vec<Sym>,
        init: Vec<State>,
        guard: Formula,
        update: LinearMap,
    ) -> ReactiveModule {
        let cmd = GuardedCommand::unlabeled(guard, vec![ProbUpdate::dirac(update)]).expect("cmd");
        ReactiveModule::new(init, vars, vec![cmd]).expect("module")
    }

    // -- structural equivalence up to variable reorder ----------------------

    fn permutation(from: &[Sym], to: &[Sym]) -> Option<Vec<usize>> {
        from.iter()
            .map(|v| to.iter().position(|w| w == v))
            .collect()
    }

    fn permute_state(state: &[Q], perm: &[usize]) -> State {
        let mut out = vec![q(0); state.len()];
        for (i, p) in perm.iter().enumerate() {
            out[*p] = state[i];
        }
        out
    }

    fn permute_map(map: &LinearMap, perm: &[usize]) -> LinearMap {
        let n = map.dim();
        let a = Mat::from_fn(n, n, |i, j| {
            let si = perm.iter().position(|p| *p == i).expect("bijection");
            let sj = perm.iter().position(|p| *p == j).expect("bijection");
            *map.a().get(si, sj)
        });
        let b = Mat::from_fn(n, 1, |i, _| {
            let si = perm.iter().position(|p| *p == i).expect("bijection");
            *map.b().get(si, 0)
        });
        LinearMap::new(a, b).expect("square")
    }

    fn guards_equivalent(env: &SmtEnv<'_>, a: &Formula, b: &Formula) -> bool {
        let ba = env.lower_dnf(&a.to_dnf()).expect("dnf");
        let bb = env.lower_dnf(&b.to_dnf()).expect("dnf");
        !env.is_sat(&ba.xor(&bb))
    }

    fn ndsu_equivalent(a: &Ndsu, b: &Ndsu, perm: &[usize]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        let permuted: Vec<Vec<(Q, LinearMap)>> = b
            .iter()
            .map(|d| {
                d.branches()
                    .iter()
                    .map(|(p, u)| (*p, permute_map(u, perm)))
                    .collect()
            })
            .collect();
        let mut used = vec![false; permuted.len()];
        'outer: for dist in a {
            for (i, cand) in permuted.iter().enumerate() {
                if used[i] {
                    continue;
                }
                if dist.branches().len() == cand.len()
                    && dist.branches().iter().all(|br| cand.contains(br))
                {
                    used[i] = true;
                    continue 'outer;
                }
            }
            return false;
        }
        true
    }

    fn modules_equivalent(a: &ReactiveModule, b: &ReactiveModule) -> bool {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let env = SmtEnv::new(&ctx);

        let Some(perm) = permutation(b.vars(), a.vars()) else {
            return false;
        };
        if a.vars().len() != b.vars().len() {
            return false;
        }
        let mut init_a: Vec<State> = a.init().to_vec();
        let mut init_b: Vec<State> =
            b.init().iter().map(|s| permute_state(s, &perm)).collect();
        init_a.sort();
        init_b.sort();
        if init_a != init_b {
            return false;
        }
        if a.commands().len() != b.commands().len() {
            return false;
        }
        let mut used = vec![false; b.commands().len()];
        'outer: for ca in a.commands() {
            for (i, cb) in b.commands().iter().enumerate() {
                if used[i] || ca.labels != cb.labels {
                    continue;
                }
                if guards_equivalent(&env, &ca.guard, &cb.guard)
                    && ndsu_equivalent(&ca.update, &cb.update, &perm)
                {
                    used[i] = true;
                    continue 'outer;
                }
            }
            return false;
        }
        true
    }

    fn walker(name: &str, shared: &str) -> ReactiveModule {
        // Module over (shared, name): when shared ≥ 0, bump its own
        // counter and the shared one.
        let vars = vec![sym(shared), sym(name)];
        let up = incr(&vars, name, 1);
        single_command_module(
            vars.clone(),
            vec![vec![q(0), q(0)]],
            Formula::var_ge(shared, q(0)),
            up,
        )
    }

    #[test]
    fn parallel_composition_is_commutative_up_to_reorder() {
        let m1 = walker("a", "s");
        let m2 = walker("b", "s");
        let ab = m1.parallel_composition(&m2).expect("compose");
        let ba = m2.parallel_composition(&m1).expect("compose");
        assert!(modules_equivalent(&ab, &ba));
    }

    #[test]
    fn parallel_composition_is_associative_up_to_reorder() {
        let m1 = walker("a", "s");
        let m2 = walker("b", "s");
        let m3 = walker("c", "s");
        let left = m1
            .parallel_composition(&m2)
            .and_then(|m| m.parallel_composition(&m3))
            .expect("compose");
        let right = m2
            .parallel_composition(&m3)
            .and_then(|m| m1.parallel_composition(&m))
            .expect("compose");
        assert!(modules_equivalent(&left, &right));
    }

    #[test]
    fn identity_module_is_neutral_for_parallel_composition() {
        let m = walker("a", "s");
        let id = single_command_module(
            m.vars().to_vec(),
            m.init().to_vec(),
            Formula::True,
            LinearMap::identity(m.vars().len()),
        );
        let composed = m.parallel_composition(&id).expect("compose");
        assert!(modules_equivalent(&composed, &m));
    }

    #[test]
    fn lockstep_shared_writes_sum_their_offsets() {
        // Both modules decrement the shared counter; lock-step composes
        // to a double decrement.
        let vars1 = vec![sym("s"), sym("a")];
        let m1 = single_command_module(
            vars1.clone(),
            vec![vec![q(4), q(0)]],
            Formula::True,
            incr(&vars1, "s", -1),
        );
        let vars2 = vec![sym("s"), sym("b")];
        let m2 = single_command_module(
            vars2.clone(),
            vec![vec![q(4), q(0)]],
            Formula::True,
            incr(&vars2, "s", -1),
        );
        let composed = m1.parallel_composition(&m2).expect("compose");
        assert_eq!(composed.vars().len(), 3);
        let branches = composed.commands()[0].update[0].branches();
        assert_eq!(branches.len(), 1);
        let next = branches[0].1.apply(&[q(4), q(0), q(0)]);
        assert_eq!(next, vec![q(2), q(0), q(0)]);
    }

    #[test]
    fn infeasible_pairings_are_discarded() {
        let vars = vec![sym("x")];
        let lo = single_command_module(
            vars.clone(),
            vec![vec![q(0)]],
            Formula::var_le("x", q(0)),
            LinearMap::identity(1),
        );
        let hi = single_command_module(
            vars.clone(),
            vec![vec![q(0)]],
            Formula::var_gt("x", q(0)),
            LinearMap::identity(1),
        );
        let composed = lo.parallel_composition(&hi).expect("compose");
        assert!(composed.commands().is_empty());
    }

    #[test]
    fn interleave_emits_overlap_and_solo_commands() {
        // Left enabled on x ≥ 0, right on x ≤ 2; overlap is [0, 2].
        let vars = vec![sym("x"), sym("a")];
        let left = single_command_module(
            vars.clone(),
            vec![vec![q(0), q(0)]],
            Formula::var_ge("x", q(0)),
            incr(&vars, "a", 1),
        );
        let vars_r = vec![sym("x"), sym("b")];
        let right = single_command_module(
            vars_r.clone(),
            vec![vec![q(0), q(0)]],
            Formula::var_le("x", q(2)),
            incr(&vars_r, "b", 1),
        );
        let composed = left.interleave(&right).expect("interleave");
        // One overlap command (choice of mover) plus one solo per side.
        assert_eq!(composed.commands().len(), 3);
        let overlap = &composed.commands()[0];
        assert_eq!(overlap.update.len(), 2);
        // Solo moves keep the other side's counter fixed.
        let solo_left = &composed.commands()[1];
        let next = solo_left.update[0].branches()[0].1.apply(&[q(5), q(0), q(0)]);
        assert_eq!(next, vec![q(5), q(1), q(0)]);
    }

    #[test]
    fn common_label_synchronises_lockstep() {
        // Both modules step their own counter under the shared label;
        // the synchronised command moves both at once and never solo.
        let mk = |name: &str| {
            let vars = vec![sym("s"), sym(name)];
            let cmd = GuardedCommand::new(
                vec!["tick".to_owned()],
                Formula::var_ge("s", q(0)),
                vec![ProbUpdate::dirac(incr(&vars, name, 1))],
            )
            .expect("cmd");
            ReactiveModule::new(vec![vec![q(0), q(0)]], vars, vec![cmd]).expect("module")
        };
        let composed = mk("a").interleave(&mk("b")).expect("interleave");
        assert_eq!(composed.commands().len(), 1);
        let sync = &composed.commands()[0];
        assert_eq!(sync.labels, vec!["tick".to_owned()]);
        let next = sync.update[0].branches()[0].1.apply(&[q(0), q(0), q(0)]);
        assert_eq!(next, vec![q(0), q(1), q(1)]);
    }

    #[test]
    fn common_label_with_no_feasible_pair_is_an_error() {
        let vars = vec![sym("x")];
        let mk = |guard: Formula| {
            let cmd = GuardedCommand::new(
                vec!["tick".to_owned()],
                guard,
                vec![ProbUpdate::dirac(LinearMap::identity(1))],
            )
            .expect("cmd");
            ReactiveModule::new(vec![vec![q(0)]], vars.clone(), vec![cmd]).expect("module")
        };
        let lo = mk(Formula::var_le("x", q(0)));
        let hi = mk(Formula::var_gt("x", q(0)));
        let err = lo.interleave(&hi).unwrap_err();
        assert!(matches!(err, ModuleError::IncompatibleSync(label) if label == "tick"));
    }

    #[test]
    fn parity_product_tracks_the_automaton_state() {
        // Module over x: x' = x − 1 always. DPA: q = 1 iff x > 0.
        let vars = vec![sym("x")];
        let m = single_command_module(
            vars.clone(),
            vec![vec![q(3)]],
            Formula::True,
            incr(&vars, "x", -1),
        );
        let q_vars = vec![sym(Q_VAR)];
        let to = |target: i64| {
            ProbUpdate::dirac(LinearMap::constant(vec![q(target)]))
        };
        let dpa_cmds = vec![
            GuardedCommand::unlabeled(Formula::var_gt("x", q(0)), vec![to(1)]).expect("cmd"),
            GuardedCommand::unlabeled(Formula::var_le("x", q(0)), vec![to(0)]).expect("cmd"),
        ];
        let dpa_module =
            ReactiveModule::new(vec![vec![q(0)]], q_vars, dpa_cmds).expect("module");
        let dpa =
            ParityAutomaton::new(dpa_module, BTreeMap::from([(0, 1), (1, 0)])).expect("dpa");
        let product = m.parity_product(&dpa).expect("product");
        assert_eq!(product.vars().len(), 2);
        assert_eq!(product.commands().len(), 2);
        assert_eq!(product.q_index(), Some(1));
        // Every product update still writes q constantly.
        for c in product.commands() {
            for d in &c.update {
                for (_, u) in d.branches() {
                    assert!(u.const_row(1).is_some());
                }
            }
        }
    }
}
