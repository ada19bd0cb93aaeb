//! Biased random walk driver
//!
//! A walker `x` with a coin `c`: while the coin is up, each step either
//! doubles the position or stops the walk (probability ½ each); once the
//! coin is down, the position decreases by one per step. The DPA tracks
//! the region of `x` with three priorities:
//!
//! - `q = 0` for `x ≥ 10`,
//! - `q = 1` for `0 < x < 10` (odd: the middle band is transient),
//! - `q = 2` for `x ≤ 0`.

#![forbid(unsafe_code)]

use anyhow::Context as _;
use psmsynth::{
    pretty_lex_psm, pretty_state_invariant, Formula, GuardedCommand, LinearMap, Mat,
    ParitySupermartingale, ProbUpdate, ReactiveModule, Sym, Q, Q_VAR,
};

fn q(n: i64) -> Q {
    Q::new(n, 1)
}

fn mat3(rows: [[i64; 3]; 3], b: [i64; 3]) -> LinearMap {
    let a = Mat::from_rows(
        rows.iter()
            .map(|r| r.iter().map(|v| q(*v)).collect())
            .collect(),
    )
    .expect("rectangular rows");
    let b = Mat::from_rows(b.iter().map(|v| vec![q(*v)]).collect()).expect("offset column");
    LinearMap::new(a, b).expect("square map")
}

fn build_system() -> anyhow::Result<ReactiveModule> {
    // Variable order: (c, x, q).
    let vars = vec![Sym::new("c"), Sym::new("x"), Sym::new(Q_VAR)];

    let c_down = Formula::var_eq("c", q(0));
    let c_up = Formula::var_eq("c", q(1));
    let x_high = Formula::var_ge("x", q(10));
    let x_low = Formula::var_le("x", q(0));
    let x_mid = Formula::and(vec![Formula::var_gt("x", q(0)), Formula::var_lt("x", q(10))]);

    // Walking down: x' = x − 1, coin stays down, q tracks the region.
    let decr = |region: i64| mat3([[0, 0, 0], [0, 1, 0], [0, 0, 0]], [0, -1, region]);
    // Coin up: either keep going (x' = 2x, coin stays up) or stop.
    let double = |region: i64| mat3([[0, 0, 0], [0, 2, 0], [0, 0, 0]], [1, 0, region]);
    let stop = |region: i64| mat3([[0, 0, 0], [0, 0, 0], [0, 0, 0]], [0, 0, region]);

    let coin = |region: i64| -> anyhow::Result<ProbUpdate> {
        Ok(ProbUpdate::new(vec![
            (Q::new(1, 2), double(region)),
            (Q::new(1, 2), stop(region)),
        ])?)
    };

    let commands = vec![
        GuardedCommand::unlabeled(
            Formula::and(vec![c_down.clone(), x_high.clone()]),
            vec![ProbUpdate::dirac(decr(0))],
        )?,
        GuardedCommand::unlabeled(
            Formula::and(vec![c_down.clone(), x_mid.clone()]),
            vec![ProbUpdate::dirac(decr(1))],
        )?,
        GuardedCommand::unlabeled(
            Formula::and(vec![c_down, x_low.clone()]),
            vec![ProbUpdate::dirac(decr(2))],
        )?,
        GuardedCommand::unlabeled(
            Formula::and(vec![c_up.clone(), x_high]),
            vec![coin(0)?],
        )?,
        GuardedCommand::unlabeled(
            Formula::and(vec![c_up.clone(), x_mid]),
            vec![coin(1)?],
        )?,
        GuardedCommand::unlabeled(Formula::and(vec![c_up, x_low]), vec![coin(2)?])?,
    ];

    let init = vec![vec![q(1), q(1), q(0)]];
    Ok(ReactiveModule::new(init, vars, commands)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let json = std::env::args().any(|a| a == "--json");

    let system = build_system()?;
    let q_states = [0i64, 1, 2];
    let objectives = vec![
        Formula::var_eq(Q_VAR, q(0)),
        Formula::var_eq(Q_VAR, q(1)),
        Formula::var_eq(Q_VAR, q(2)),
    ];

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
