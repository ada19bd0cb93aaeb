//! Legacy iterative ranking solver
//!
//! The older per-priority loop: for each DPA state `q`, walk the
//! components `i = 0, 1, …` and at each step build one `Optimize`
//! instance whose soft objective prefers as many strictly-positive ε as
//! possible. Guards whose ε came out positive are *ranked* and removed;
//! the loop ends when no guards remain or a step ranks nothing new.
//!
//! This variant does not co-synthesise an invariant and uses no `I^q`
//! premise row; both sides of the drift inequality use the same
//! component template. The state machine is explicit:
//!
//! ```text
//! Start → Ranking(0) → Ranking(1) → … → Done | Fail
//! ```
//!
//! `Ranking(i) → Ranking(i+1)` fires when at least one new guard was
//! ranked and unranked guards remain; `Done` when the guard set is
//! empty (or the priorities are exhausted, which is logged as a
//! warning); `Fail` when the optimisation is unsatisfiable or ranks
//! nothing new. When no premise at a component is satisfiable the
//! component degenerates to the zero function and the unranked guards
//! carry forward unchanged.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};
use z3::ast::Real;
use z3::{Context, Model, Optimize, SatResult};

use crate::algebra::{conjunct_to_system, Expr, Formula, Sym};
use crate::farkas::farkas_constraints;
use crate::matrix::Mat;
use crate::module::{ProbUpdate, Q_VAR};
use crate::report::{LexPsm, LinearFn};
use crate::smt::{solver_config, SmtEnv, SmtError};
use crate::synth::{ParitySupermartingale, SynthesisError, Template};
use crate::Q;

/// Phase of the iterative ranking loop for one DPA state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RankingState {
    Start,
    Ranking(usize),
    Done,
    Fail,
}

impl<'m> ParitySupermartingale<'m> {
    /// Synthesise a lexicographic PSM by iterative ranking, without an
    /// invariant.
    pub fn verification(
        &mut self,
        q_states: &[i64],
        objectives: &[Formula],
    ) -> Result<LexPsm, SynthesisError> {
        self.q_index()?;
        let m = objectives.len();
        let cfg = solver_config(self.options.timeout);
        let ctx = Context::new(&cfg);
        let env = SmtEnv::new(&ctx);

        let mut lex_psm: LexPsm = vec![BTreeMap::new(); m];
        for &q in q_states {
            let mut state = RankingState::Start;
            debug!(?state, q, "iterative ranking");

            // Guards conjoined with `q = q_state`, unsatisfiable ones
            // discarded.
            let mut guards: Vec<(usize, Formula)> = Vec::new();
            for (k, command) in self.system.commands().iter().enumerate() {
                let conjoined = Formula::and(vec![
                    command.guard.clone(),
                    Formula::var_eq(Q_VAR, Q::new(q, 1)),
                ])
                .to_dnf();
                if env.formula_sat(&conjoined)? {
                    guards.push((k, conjoined));
                }
            }

            for i in 0..m {
                state = RankingState::Ranking(i);
                debug!(?state, q, guards = guards.len(), "ranking step");
                let (alpha_i, remaining) = match self.alpha(&env, i, &guards, objectives, q) {
                    Ok(step) => step,
                    Err(err) => {
                        state = RankingState::Fail;
                        warn!(?state, q, component = i, "ranking failed");
                        return Err(err);
                    }
                };
                lex_psm[i].insert(q, alpha_i);
                guards = remaining;
                if guards.is_empty() {
                    break;
                }
            }
            if guards.is_empty() {
                state = RankingState::Done;
            } else {
                warn!(q, unranked = guards.len(), "not all guards have been ranked");
            }
            debug!(?state, q, "iterative ranking finished");
        }
        Ok(lex_psm)
    }

    /// One ranking step: synthesise component `i` at state `q` and split
    /// off the newly ranked guards.
    fn alpha(
        &mut self,
        env: &SmtEnv<'_>,
        i: usize,
        guards: &[(usize, Formula)],
        objectives: &[Formula],
        q: i64,
    ) -> Result<(LinearFn, Vec<(usize, Formula)>), SynthesisError> {
        let vars = self.system.vars().to_vec();
        let template = self.linear_template(&format!("alpha{i}_q{q}"));
        let lp = Optimize::new(env.ctx());

        // Non-negativity of the component template.
        lp.assert(&env.ge0(&self.template_expr(&template)));

        let mut epsilons: Vec<(Sym, usize)> = Vec::new();
        for (jj, objective) in objectives.iter().enumerate() {
            // Priority labels count from the current component.
            let j = i + jj;
            let s_dnf = objective.to_dnf();
            for (guard_idx, guard) in guards {
                for g_conjunct in guard.disjuncts() {
                    for (s_idx, s_conjunct) in s_dnf.disjuncts().iter().enumerate() {
                        if *s_conjunct == Formula::False {
                            continue;
                        }
                        let mut sys = conjunct_to_system(&g_conjunct, &vars)?;
                        sys = sys.stack(&conjunct_to_system(s_conjunct, &vars)?)?;
                        if !env.system_sat(&sys, &vars) {
                            debug!(q, guard = *guard_idx, "premise unsatisfiable, skipped");
                            continue;
                        }

                        let eps =
                            self.symbols.fresh(&format!("epsilon_v{i},g{guard_idx},s{j},{s_idx}"));
                        epsilons.push((eps.clone(), *guard_idx));
                        let eps_e = Expr::var(eps);
                        if j % 2 == 1 && j == i {
                            // Last chance for an odd priority: strict.
                            lp.assert(&env.gt0(&eps_e));
                        } else {
                            lp.assert(&env.ge0(&eps_e));
                        }
                        lp.assert(&env.le(&eps_e, &Expr::int(1)));

                        let a = sys.a.map(|v| Expr::constant(*v));
                        let b = sys.b.map(|v| Expr::constant(*v));
                        for action in self.system.command_updates(*guard_idx) {
                            let (c, d) =
                                self.legacy_drift_conclusion(&template, action, &eps_e)?;
                            for constraint in
                                farkas_constraints(&mut self.symbols, env, &a, &b, &c, &d)?
                            {
                                lp.assert(&constraint);
                            }
                        }
                    }
                }
            }
        }

        if epsilons.is_empty() {
            // No premise is satisfiable: this component is finished.
            // Return the zero function and carry the guards forward.
            warn!(q, component = i, "no satisfiable premise; zero component, guards carried");
            return Ok((LinearFn::zero(self.n()), guards.to_vec()));
        }

        // Soft objective: count strictly positive ε.
        let one = env.rational(&Q::new(1, 1));
        let zero = env.rational(&Q::new(0, 1));
        let indicators: Vec<Real<'_>> = epsilons
            .iter()
            .map(|(eps, _)| env.gt0(&Expr::var(eps.clone())).ite(&one, &zero))
            .collect();
        let refs: Vec<&Real<'_>> = indicators.iter().collect();
        lp.maximize(&Real::add(env.ctx(), &refs));

        match lp.check(&[]) {
            SatResult::Sat => {}
            SatResult::Unknown => return Err(SynthesisError::Timeout),
            SatResult::Unsat => {
                return Err(SynthesisError::RankingFailed { component: i, q });
            }
        }
        let model = lp.get_model().ok_or(SmtError::MissingModel)?;

        let ranked: BTreeSet<usize> = epsilons
            .iter()
            .filter(|(eps, _)| is_strictly_positive(env, &model, eps))
            .map(|(_, guard_idx)| *guard_idx)
            .collect();
        let remaining: Vec<(usize, Formula)> = guards
            .iter()
            .filter(|(guard_idx, _)| !ranked.contains(guard_idx))
            .cloned()
            .collect();
        if remaining.len() == guards.len() {
            // Nothing new was ranked: the loop cannot make progress.
            return Err(SynthesisError::RankingFailed { component: i, q });
        }
        debug!(q, component = i, ranked = ranked.len(), "guards ranked");
        let alpha = self.decode_template(env, &model, &template)?;
        Ok((alpha, remaining))
    }

    /// Drift conclusion with the same-state template on both sides:
    /// `c = (α·Σ p·A − α)ᵀ`, `d = −α·Σ p·b − ε`.
    fn legacy_drift_conclusion(
        &self,
        template: &Template,
        action: &ProbUpdate,
        eps: &Expr,
    ) -> Result<(Mat<Expr>, Expr), SynthesisError> {
        let n = self.n();
        let mut sum_a = Mat::<Expr>::zeros(n, n);
        let mut sum_b = Mat::<Expr>::zeros(n, 1);
        for (p, update) in action.branches() {
            let p_e = Expr::constant(*p);
            sum_a = sum_a.add(&update.a().map(|v| Expr::constant(*v)).scale(&p_e))?;
            sum_b = sum_b.add(&update.b().map(|v| Expr::constant(*v)).scale(&p_e))?;
        }
        let c = template.0.matmul(&sum_a)?.sub(&template.0)?.transpose();
        let d = -(template.0.matmul(&sum_b)?.get(0, 0).clone()) - eps.clone();
        Ok((c, d))
    }
}

fn is_strictly_positive(env: &SmtEnv<'_>, model: &Model<'_>, eps: &Sym) -> bool {
    let positive = env.gt0(&Expr::var(eps.clone()));
    model
        .eval(&positive, true)
        .and_then(|b| b.as_bool())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::LinearMap;
    use crate::module::{GuardedCommand, ReactiveModule};
    use crate::Sym;

    fn q(n: i64) -> Q {
        Q::new(n, 1)
    }

    /// One-command module over `(x, q)` with `x' = x + delta`, `q' = 0`.
    fn stepper(delta: i64) -> ReactiveModule {
        let vars = vec![Sym::new("x"), Sym::new(Q_VAR)];
        let update = LinearMap::new(
            Mat::from_rows(vec![vec![q(1), q(0)], vec![q(0), q(0)]]).expect("rows"),
            Mat::from_rows(vec![vec![q(delta)], vec![q(0)]]).expect("offset"),
        )
        .expect("square");
        let cmd = GuardedCommand::unlabeled(Formula::True, vec![ProbUpdate::dirac(update)])
            .expect("command");
        ReactiveModule::new(vec![vec![q(5), q(0)]], vars, vec![cmd]).expect("module")
    }

    #[test]
    fn decrementing_command_is_ranked_in_one_step() {
        let system = stepper(-1);
        let mut engine = crate::ParitySupermartingale::new(&system);
        let lex_psm = engine
            .verification(&[0], &[Formula::var_eq(Q_VAR, q(0))])
            .expect("a decrementing step must rank");
        assert_eq!(lex_psm.len(), 1);
        assert!(lex_psm[0].contains_key(&0), "component missing for q = 0");
    }

    #[test]
    fn stationary_command_fails_to_rank() {
        let system = stepper(0);
        let mut engine = crate::ParitySupermartingale::new(&system);
        let err = engine
            .verification(&[0], &[Formula::var_eq(Q_VAR, q(0))])
            .expect_err("a stationary step ranks nothing");
        assert!(matches!(
            err,
            SynthesisError::RankingFailed { component: 0, q: 0 }
        ));
    }

    #[test]
    fn ranking_state_transitions_are_ordered() {
        // The state machine type itself is tiny; pin its equality
        // semantics so log assertions elsewhere stay meaningful.
        assert_ne!(RankingState::Start, RankingState::Done);
        assert_eq!(RankingState::Ranking(1), RankingState::Ranking(1));
        assert_ne!(RankingState::Ranking(1), RankingState::Ranking(2));
        assert_ne!(RankingState::Done, RankingState::Fail);
    }
}
