//! Two-process shared-coin consensus driver (N = 2, K = 2)
//!
//! ```text
//! const int N = 2;  const int K = 2;
//! const int range = 2*(K+1)*N;            // 12
//! const int counter_init = (K+1)*N;       // 6
//! const int left = N;  const int right = 2*(K+1)*N - N;   // 2, 10
//!
//! global counter : [0..range] init counter_init;
//! module process1
//!   pc1 : [0..3];  coin1 : [0..1];
//!   [] pc1=0 -> 0.5 : (coin1'=0)&(pc1'=1) + 0.5 : (coin1'=1)&(pc1'=1);
//!   [] pc1=1 & coin1=0 & counter>0     -> (counter'=counter-1)&(pc1'=2)&(coin1'=0);
//!   [] pc1=1 & coin1=1 & counter<range -> (counter'=counter+1)&(pc1'=2)&(coin1'=0);
//!   [] pc1=2 & counter<=left  -> (pc1'=3)&(coin1'=0);
//!   [] pc1=2 & counter>=right -> (pc1'=3)&(coin1'=1);
//!   [] pc1=2 & counter>left & counter<right -> (pc1'=0);
//!   [] pc1=3 -> (pc1'=3);
//! endmodule
//! module process2 = process1[pc1=pc2, coin1=coin2] endmodule
//! ```
//!
//! The DPA sets `q = 1` once both processes are done and `q = 0` while
//! both are running; the objective pair `S_0 : q = 1`, `S_1 : q = 0`
//! asks for almost-sure termination of the coin protocol.

#![forbid(unsafe_code)]

use anyhow::Context as _;
use psmsynth::{
    pretty_lex_psm, pretty_state_invariant, Formula, GuardedCommand, LinearMap, Mat,
    ParitySupermartingale, ProbUpdate, ReactiveModule, Sym, Q, Q_VAR,
};

const RANGE: i64 = 12;
const COUNTER_INIT: i64 = 6;
const LEFT: i64 = 2;
const RIGHT: i64 = 10;

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

/// One consensus process over `(counter, pc_i, coin_i)`.
fn process(idx: usize) -> anyhow::Result<ReactiveModule> {
    let pc = format!("pc{idx}");
    let coin = format!("coin{idx}");
    let vars = vec![Sym::new("counter"), Sym::new(&pc), Sym::new(&coin)];

    // Row layout: counter, pc, coin. The counter column survives only
    // where the PRISM source keeps it.
    let keep_counter = [[1, 0, 0], [0, 0, 0], [0, 0, 0]];
    let flip_coin = ProbUpdate::new(vec![
        (Q::new(1, 2), mat3(keep_counter, [0, 1, 0])),
        (Q::new(1, 2), mat3(keep_counter, [0, 1, 1])),
    ])?;
    let decr = mat3(keep_counter, [-1, 2, 0]);
    let incr = mat3(keep_counter, [1, 2, 0]);
    let done_low = mat3(keep_counter, [0, 3, 0]);
    let done_high = mat3(keep_counter, [0, 3, 1]);
    let retry = mat3([[1, 0, 0], [0, 0, 0], [0, 0, 1]], [0, 0, 0]);
    let stay_done = mat3([[1, 0, 0], [0, 1, 0], [0, 0, 1]], [0, 0, 0]);

    let commands = vec![
        GuardedCommand::unlabeled(Formula::var_eq(pc.as_str(), q(0)), vec![flip_coin])?,
        GuardedCommand::unlabeled(
            Formula::and(vec![
                Formula::var_eq(pc.as_str(), q(1)),
                Formula::var_eq(coin.as_str(), q(0)),
                Formula::var_gt("counter", q(0)),
            ]),
            vec![ProbUpdate::dirac(decr)],
        )?,
        GuardedCommand::unlabeled(
            Formula::and(vec![
                Formula::var_eq(pc.as_str(), q(1)),
                Formula::var_eq(coin.as_str(), q(1)),
                Formula::var_lt("counter", q(RANGE)),
            ]),
            vec![ProbUpdate::dirac(incr)],
        )?,
        GuardedCommand::unlabeled(
            Formula::and(vec![
                Formula::var_eq(pc.as_str(), q(2)),
                Formula::var_le("counter", q(LEFT)),
            ]),
            vec![ProbUpdate::dirac(done_low)],
        )?,
        GuardedCommand::unlabeled(
            Formula::and(vec![
                Formula::var_eq(pc.as_str(), q(2)),
                Formula::var_ge("counter", q(RIGHT)),
            ]),
            vec![ProbUpdate::dirac(done_high)],
        )?,
        GuardedCommand::unlabeled(
            Formula::and(vec![
                Formula::var_eq(pc.as_str(), q(2)),
                Formula::var_gt("counter", q(LEFT)),
                Formula::var_lt("counter", q(RIGHT)),
            ]),
            vec![ProbUpdate::dirac(retry)],
        )?,
        GuardedCommand::unlabeled(
            Formula::var_eq(pc.as_str(), q(3)),
            vec![ProbUpdate::dirac(stay_done)],
        )?,
    ];

    let init = vec![vec![q(COUNTER_INIT), q(0), q(0)]];
    Ok(ReactiveModule::new(init, vars, commands)?)
}

/// DPA over `q`: 1 once both processes are done, 0 while both run.
fn automaton_module() -> anyhow::Result<ReactiveModule> {
    let vars = vec![Sym::new(Q_VAR)];
    let to = |target: i64| {
        let a = Mat::from_rows(vec![vec![q(0)]]).expect("1x1");
        let b = Mat::from_rows(vec![vec![q(target)]]).expect("1x1");
        ProbUpdate::dirac(LinearMap::new(a, b).expect("square map"))
    };
    let both_done = Formula::and(vec![
        Formula::var_eq("pc1", q(3)),
        Formula::var_eq("pc2", q(3)),
    ]);
    let both_running = Formula::and(vec![
        Formula::var_lt("pc1", q(3)),
        Formula::var_lt("pc2", q(3)),
    ]);
    let commands = vec![
        GuardedCommand::unlabeled(both_done, vec![to(1)])?,
        GuardedCommand::unlabeled(both_running, vec![to(0)])?,
    ];
    Ok(ReactiveModule::new(vec![vec![q(0)]], vars, commands)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let json = std::env::args().any(|a| a == "--json");

    let system = process(1)?
        .parallel_composition(&process(2)?)
        .context("process composition failed")?
        .parallel_composition(&automaton_module()?)
        .context("automaton composition failed")?;

    let q_states = [0i64, 1];
    let objectives = vec![
        Formula::var_eq(Q_VAR, q(1)),
        Formula::var_eq(Q_VAR, q(0)),
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
