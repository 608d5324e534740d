//! Integration tests for the stochastic engine
//!
//! These tests verify end-to-end behavior of whole simulation runs and the
//! statistical properties of the Gillespie selection step.

use bcsim_lib::eval::ParameterValues;
use bcsim_lib::syntax::{Block, BlockKind, InitialProcess, Program, ProcessDefinition, Token};
use bcsim_lib::system::System;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;

fn tok(text: &str) -> Token {
    Token::new(text, 1, 1)
}

fn expr(text: &str) -> Vec<Token> {
    text.split_whitespace().map(tok).collect()
}

fn action(name: &str, rate: &str, children: Vec<Arc<Block>>) -> Arc<Block> {
    Arc::new(Block::new(
        BlockKind::Action {
            name: name.to_string(),
            rate: expr(rate),
        },
        tok(name),
        children,
    ))
}

fn parallel(left: Arc<Block>, right: Arc<Block>) -> Arc<Block> {
    Arc::new(Block::new(BlockKind::Parallel, tok("|"), vec![left, right]))
}

fn program_of(defs: Vec<(&str, Arc<Block>)>) -> Program {
    let mut program = Program::default();
    for (name, tree) in &defs {
        program.definitions.insert(
            name.to_string(),
            ProcessDefinition {
                formals: vec![],
                tree: tree.clone(),
            },
        );
        program.initial.push(InitialProcess {
            name: name.to_string(),
            params: ParameterValues::default(),
        });
    }
    program.finalize();
    program
}

fn first_transition_name(program: &Program, seed: u64) -> String {
    let mut sys = System::new(program, 1, f64::INFINITY, StdRng::seed_from_u64(seed))
        .expect("setup failed");
    sys.simulate().expect("simulation failed");
    let line = sys.trace().lines().next().expect("no transition fired");
    line.split('\t').nth(1).expect("malformed line").to_string()
}

/// Two competing actions at rates 1 and 3: both fire exactly once, in some
/// order, and the system then deadlocks.
#[test]
fn test_competing_actions_both_fire() {
    let program = program_of(vec![(
        "Pair",
        parallel(action("a", "1.0", vec![]), action("b", "3.0", vec![])),
    )]);

    let mut sys = System::new(&program, 10, f64::INFINITY, StdRng::seed_from_u64(42))
        .expect("setup failed");
    sys.simulate().expect("simulation failed");

    let mut names: Vec<&str> = sys
        .trace()
        .lines()
        .map(|l| l.split('\t').nth(1).unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(sys.transitions_taken(), 2);
    assert_eq!(sys.candidates_left(), 0);
}

/// Selection frequencies follow the rate ratio: with rates 1 and 3, the
/// faster action wins the first transition 3/4 of the time. With 4000
/// replicates the standard error is under 0.007, so a 0.05 tolerance sits
/// beyond seven standard deviations.
#[test]
fn test_selection_follows_rate_ratio() {
    let program = program_of(vec![(
        "Pair",
        parallel(action("a", "1.0", vec![]), action("b", "3.0", vec![])),
    )]);

    let replicates = 4000;
    let mut b_first = 0usize;
    for seed in 0..replicates {
        if first_transition_name(&program, seed as u64) == "b" {
            b_first += 1;
        }
    }

    let fraction = b_first as f64 / replicates as f64;
    assert!(
        (fraction - 0.75).abs() < 0.05,
        "P(b first) = {:.3}, expected 0.75",
        fraction
    );
}

/// Waiting times are exponential at the total rate: a single action at
/// rate 2 has mean waiting time 0.5. With 2000 replicates the standard
/// error of the sample mean is about 0.011.
#[test]
fn test_waiting_times_are_exponential() {
    let program = program_of(vec![("P", action("a", "2.0", vec![]))]);

    let replicates = 2000;
    let mut total = 0.0;
    for seed in 0..replicates {
        let mut sys = System::new(&program, 1, f64::INFINITY, StdRng::seed_from_u64(seed as u64))
            .expect("setup failed");
        sys.simulate().expect("simulation failed");
        let line = sys.trace().lines().next().expect("no transition fired");
        total += line.split('\t').next().unwrap().parse::<f64>().unwrap();
    }

    let mean = total / replicates as f64;
    assert!(
        (mean - 0.5).abs() < 0.08,
        "mean waiting time = {:.3}, expected 0.5",
        mean
    );
}

/// Timestamps never decrease within a run.
#[test]
fn test_timestamps_are_monotonic() {
    let chain = action(
        "a",
        "1.0",
        vec![action("b", "2.0", vec![action("c", "3.0", vec![])])],
    );
    let program = program_of(vec![("Chain", chain)]);

    let mut sys = System::new(&program, 100, f64::INFINITY, StdRng::seed_from_u64(7))
        .expect("setup failed");
    sys.simulate().expect("simulation failed");

    let times: Vec<f64> = sys
        .trace()
        .lines()
        .map(|l| l.split('\t').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(times.len(), 3);
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}
