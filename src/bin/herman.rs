//! Three-process Herman self-stabilisation driver
//!
//! Each process `i` holds one bit `x_i` and watches its left neighbour
//! (cyclically): when the bits agree it tosses a fair coin for its next
//! bit, otherwise it copies the neighbour. All three move synchronously,
//! so the system is the lock-step composition of three two-variable
//! modules.
//!
//! The DPA starts at `q = 1` and drops to the absorbing `q = 0` as soon
//! as the configuration is neither all-equal nor pairwise-distinct;
//! priorities make `q = 1` accepting (even) and `q = 0` odd, so the
//! objective holds iff the run keeps the symmetric configurations
//! forever — synthesis succeeds from all eight initial bit vectors with
//! a trivially-true invariant (the state space is finite and fully
//! covered).

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use anyhow::Context as _;
use psmsynth::{
    pretty_lex_psm, pretty_state_invariant, Expr, Formula, GuardedCommand, LinearMap, Mat,
    ParityAutomaton, ParitySupermartingale, ProbUpdate, ReactiveModule, Rel, Sym, Q, Q_VAR,
};

fn q(n: i64) -> Q {
    Q::new(n, 1)
}

/// `a = b` over two variables.
fn vars_eq(a: &str, b: &str) -> Formula {
    Formula::atom(Expr::var(a) - Expr::var(b), Rel::Eq, Expr::int(0))
}

/// `a ≠ b`, expanded into the two strict sides.
fn vars_ne(a: &str, b: &str) -> Formula {
    Formula::or(vec![
        Formula::atom(Expr::var(a) - Expr::var(b), Rel::Lt, Expr::int(0)),
        Formula::atom(Expr::var(a) - Expr::var(b), Rel::Gt, Expr::int(0)),
    ])
}

/// One Herman process over `(x_i, x_left)`: coin toss on agreement,
/// copy otherwise. The neighbour variable is read, never written.
fn process(own: &str, left: &str) -> anyhow::Result<ReactiveModule> {
    let vars = vec![Sym::new(own), Sym::new(left)];

    // Row layout: (own, left); the neighbour keeps the identity.
    let set = |bit: i64| {
        LinearMap::new(
            Mat::from_rows(vec![vec![q(0), q(0)], vec![q(0), q(1)]]).expect("rows"),
            Mat::from_rows(vec![vec![q(bit)], vec![q(0)]]).expect("offset"),
        )
        .expect("square map")
    };
    let copy = LinearMap::new(
        Mat::from_rows(vec![vec![q(0), q(1)], vec![q(0), q(1)]]).expect("rows"),
        Mat::from_rows(vec![vec![q(0)], vec![q(0)]]).expect("offset"),
    )
    .expect("square map");

    let toss = ProbUpdate::new(vec![(Q::new(1, 2), set(0)), (Q::new(1, 2), set(1))])?;
    let commands = vec![
        GuardedCommand::unlabeled(vars_eq(own, left), vec![toss])?,
        GuardedCommand::unlabeled(vars_ne(own, left), vec![ProbUpdate::dirac(copy)])?,
    ];

    // All four bit combinations of (own, left); agreement on shared
    // variables selects the consistent global states in composition.
    let init = (0..4)
        .map(|mask: i64| vec![q(mask & 1), q((mask >> 1) & 1)])
        .collect();
    Ok(ReactiveModule::new(init, vars, commands)?)
}

/// DPA: stay at `q = 1` on the symmetric configurations (all equal or
/// pairwise distinct), drop to the absorbing `q = 0` otherwise.
fn automaton() -> anyhow::Result<ParityAutomaton> {
    let vars = vec![Sym::new(Q_VAR)];
    let to = |target: i64| {
        ProbUpdate::dirac(LinearMap::constant(vec![q(target)]))
    };
    let at_one = Formula::var_eq(Q_VAR, q(1));

    let all_distinct = Formula::and(vec![
        vars_ne("x1", "x2"),
        vars_ne("x1", "x3"),
        vars_ne("x2", "x3"),
        at_one.clone(),
    ]);
    let all_equal = Formula::and(vec![
        vars_eq("x1", "x2"),
        vars_eq("x1", "x3"),
        at_one.clone(),
    ]);
    let break_12 = Formula::and(vec![
        vars_eq("x1", "x2"),
        vars_ne("x1", "x3"),
        at_one.clone(),
    ]);
    let break_23 = Formula::and(vec![
        vars_eq("x2", "x3"),
        vars_ne("x1", "x3"),
        at_one.clone(),
    ]);
    let break_13 = Formula::and(vec![
        vars_eq("x1", "x3"),
        vars_ne("x1", "x2"),
        at_one,
    ]);
    let absorbing = Formula::var_eq(Q_VAR, q(0));

    let commands = vec![
        GuardedCommand::unlabeled(all_distinct, vec![to(1)])?,
        GuardedCommand::unlabeled(all_equal, vec![to(1)])?,
        GuardedCommand::unlabeled(break_12, vec![to(0)])?,
        GuardedCommand::unlabeled(break_23, vec![to(0)])?,
        GuardedCommand::unlabeled(break_13, vec![to(0)])?,
        GuardedCommand::unlabeled(absorbing, vec![to(0)])?,
    ];
    let module = ReactiveModule::new(vec![vec![q(1)]], vars, commands)?;
    Ok(ParityAutomaton::new(
        module,
        BTreeMap::from([(0, 1), (1, 0)]),
    )?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let json = std::env::args().any(|a| a == "--json");

    let ring = process("x1", "x3")?
        .parallel_composition(&process("x2", "x1")?)
        .context("ring composition failed")?
        .parallel_composition(&process("x3", "x2")?)
        .context("ring composition failed")?;
    let dpa = automaton()?;
    let system = ring.parity_product(&dpa).context("parity product failed")?;

    let q_states = [0i64, 1];
    let objectives = dpa.objectives();

    let mut engine = ParitySupermartingale::new(&system);
    let (lex_psm, invariant) = engine
        .invariant_synthesis_and_verification(&q_states, &objectives)
        .context("synthesis failed")?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "lex_psm": lex_psm,
                "invariant": invariant,
            }))?
        );
    } else {
        println!("{}", pretty_lex_psm(system.vars(), &lex_psm));
        println!("{}", pretty_state_invariant(system.vars(), &invariant));
    }
    Ok(())
}
