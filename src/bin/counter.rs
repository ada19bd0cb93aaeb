//! Nondeterministic stochastic counter driver
//!
//! ```text
//! module M
//!   p : [0..1] init 0;          // 0 = waiting, 1 = processing
//!   c : [0..65536] init 65536;
//!   [] p = 0 -> 0.5 : reset + 0.5 : start_processing;
//!   [] p = 1 & c > 0 -> 0.8 : decrement + 0.2 : reset;
//!   [] p = 1 & c = 0 -> 1 : reset;
//! endmodule
//! ```
//!
//! The DPA state `q` is 1 while processing and 0 otherwise; the parity
//! objectives are `S_0 : q = 1` (even) and `S_1 : q = 0` (odd), i.e. the
//! run must leave the waiting region infinitely often.
//!
//! Flags: `--json` prints the result as JSON, `--iterative` uses the
//! legacy ranking loop instead of the single-call synthesis.

#![forbid(unsafe_code)]

use anyhow::Context as _;
use psmsynth::{
    pretty_lex_psm, pretty_state_invariant, Formula, GuardedCommand, LinearMap, Mat,
    ParitySupermartingale, ProbUpdate, ReactiveModule, Sym, Q, Q_VAR,
};

const MAX_COUNTER: i64 = 65536;

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
    let vars = vec![Sym::new("p"), Sym::new("c"), Sym::new(Q_VAR)];

    // All three updates assign constants to p and q; c varies.
    let reset = mat3([[0, 0, 0], [0, 0, 0], [0, 0, 0]], [0, MAX_COUNTER, 0]);
    let to_proc = mat3([[0, 0, 0], [0, 0, 0], [0, 0, 0]], [1, MAX_COUNTER, 1]);
    let decrement = mat3([[0, 0, 0], [0, 1, 0], [0, 0, 0]], [1, -1, 1]);

    let waiting = Formula::var_eq("p", q(0));
    let processing_busy = Formula::and(vec![
        Formula::var_eq("p", q(1)),
        Formula::var_gt("c", q(0)),
    ]);
    let processing_done = Formula::and(vec![
        Formula::var_eq("p", q(1)),
        Formula::var_eq("c", q(0)),
    ]);

    let commands = vec![
        GuardedCommand::unlabeled(
            waiting,
            vec![ProbUpdate::new(vec![
                (Q::new(1, 2), reset.clone()),
                (Q::new(1, 2), to_proc),
            ])?],
        )?,
        GuardedCommand::unlabeled(
            processing_busy,
            vec![ProbUpdate::new(vec![
                (Q::new(4, 5), decrement),
                (Q::new(1, 5), reset.clone()),
            ])?],
        )?,
        GuardedCommand::unlabeled(processing_done, vec![ProbUpdate::dirac(reset)])?,
    ];

    let init = vec![vec![q(0), q(MAX_COUNTER), q(0)]];
    Ok(ReactiveModule::new(init, vars, commands)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let json = std::env::args().any(|a| a == "--json");
    let iterative = std::env::args().any(|a| a == "--iterative");

    let system = build_system()?;
    let q_states = [0i64, 1];
    let objectives = vec![
        Formula::var_eq(Q_VAR, q(1)),
        Formula::var_eq(Q_VAR, q(0)),
    ];

    let mut engine = ParitySupermartingale::new(&system);
    if iterative {
        let lex_psm = engine
            .verification(&q_states, &objectives)
            .context("iterative ranking failed")?;
        if json {
            println!("{}", serde_json::to_string_pretty(&lex_psm)?);
        } else {
            println!("{}", pretty_lex_psm(system.vars(), &lex_psm));
        }
        return Ok(());
    }

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
