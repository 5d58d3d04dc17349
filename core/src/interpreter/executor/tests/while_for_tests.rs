//! While loops and three-clause for loops, including their safety ceilings

use super::helpers::*;
use crate::interpreter::{EvalError, LoopError};

#[test]
fn test_while_runs_until_condition_fails() {
    let s = run_ok("n = 0\nloop while n < 5\nn += 1\nendloop\n");
    assert_eq!(scalar(&s, "n"), 5.0);
}

#[test]
fn test_while_false_at_entry_runs_nothing() {
    let s = run_ok("n = 9\nloop while n < 5\nn += 1\nendloop\n");
    assert_eq!(scalar(&s, "n"), 9.0);
}

#[test]
fn test_while_ceiling() {
    let (s, err) = run_err("k = 0\nset loop_maxiter 10\nloop while 1\nk++\nendloop\n");
    match err.root() {
        LoopError::IterationLimit { limit, setting } => {
            assert_eq!(*limit, 10);
            assert_eq!(*setting, "loop_maxiter");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(scalar(&s, "k"), 10.0);
    assert!(err.to_string().contains("loop_maxiter"));
}

#[test]
fn test_while_may_end_exactly_at_the_ceiling() {
    let s = run_ok("n = 0\nset loop_maxiter 5\nloop while n < 5\nn++\nendloop\n");
    assert_eq!(scalar(&s, "n"), 5.0);
}

#[test]
fn test_while_na_condition_is_an_error() {
    let (_, err) = run_err("x = NA\nloop while x > 0\nendloop\n");
    assert!(matches!(err.root(), LoopError::Eval(EvalError::Missing(_))));
}

#[test]
fn test_for_loop_clauses() {
    let s = run_ok("s = 0\nloop for (j=1; j<=4; j+=1)\ns += j\nendloop\n");
    assert_eq!(scalar(&s, "s"), 10.0);
    assert_eq!(scalar(&s, "j"), 5.0);
}

#[test]
fn test_for_loop_with_empty_clauses() {
    let s = run_ok("j = 0\nloop for (; j < 3; )\nj++\nendloop\n");
    assert_eq!(scalar(&s, "j"), 3.0);
}

#[test]
fn test_for_loop_delta_runs_after_first_pass() {
    let s = run_ok("loop for (j=0; j<3; j=j+1)\nprint j\nendloop\n");
    assert_eq!(lines(&s), vec!["j = 0", "j = 1", "j = 2"]);
}

#[test]
fn test_for_ceiling_is_separate() {
    let mut config = test_config();
    config.loops.max_for_iterations = 5;
    let mut s = session_with(config);
    let err = s
        .run_script("loop for (k=0; k<100; k+=1)\nendloop\n")
        .unwrap_err();
    assert!(matches!(err.root(), LoopError::IterationLimit { limit: 5, .. }));

    // while loops keep their own ceiling
    let mut s = session_with({
        let mut c = test_config();
        c.loops.max_for_iterations = 5;
        c
    });
    s.run_script("n = 0\nloop while n < 50\nn++\nendloop\n").unwrap();
}
