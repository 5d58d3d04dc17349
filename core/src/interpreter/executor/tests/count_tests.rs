//! Count loops: `loop N`

use super::helpers::*;
use crate::interpreter::{EvalError, LoopError};

#[test]
fn test_prints_literal_three_times() {
    let s = run_ok("loop 3\nprint \"x\"\nendloop\n");
    assert_eq!(lines(&s), vec!["x", "x", "x"]);
}

#[test]
fn test_body_runs_exactly_n_times() {
    for n in [0, 1, 2, 17] {
        let s = run_ok(&format!("k = 0\nloop {}\nk += 1\nendloop\n", n));
        assert_eq!(scalar(&s, "k"), n as f64, "loop {}", n);
    }
}

#[test]
fn test_zero_count_runs_nothing() {
    let s = run_ok("loop 0\nprint \"never\"\nendloop\nprint \"after\"\n");
    assert_eq!(lines(&s), vec!["after"]);
}

#[test]
fn test_count_from_scalar_and_expression() {
    let s = run_ok("n = 4\nk = 0\nloop n\nk++\nendloop\n");
    assert_eq!(scalar(&s, "k"), 4.0);

    let s = run_ok("a = 2\nk = 0\nloop (a * 3)\nk++\nendloop\n");
    assert_eq!(scalar(&s, "k"), 6.0);
}

#[test]
fn test_count_is_evaluated_once() {
    let s = run_ok("n = 3\nk = 0\nloop n\nn = 10\nk++\nendloop\n");
    assert_eq!(scalar(&s, "k"), 3.0);
}

#[test]
fn test_fractional_count_is_truncated() {
    let s = run_ok("k = 0\nloop 2.7\nk++\nendloop\n");
    assert_eq!(scalar(&s, "k"), 2.0);
}

#[test]
fn test_negative_count_is_an_error() {
    let (_, err) = run_err("loop -2\nendloop\n");
    assert!(matches!(err.root(), LoopError::Eval(EvalError::Data(_))));
    assert_eq!(err.lineno(), Some(1));
}

#[test]
fn test_missing_count_is_an_error() {
    let (_, err) = run_err("n = NA\nloop n\nendloop\n");
    assert!(matches!(err.root(), LoopError::Eval(EvalError::Missing(_))));
}

#[test]
fn test_rerun_gives_identical_output() {
    let script = "loop 3\nprint \"tick\"\nendloop\n";
    let mut s = session_with(test_config());
    s.run_script(script).unwrap();
    let first = s.take_output();
    s.run_script(script).unwrap();
    assert_eq!(first, s.take_output());
    assert_eq!(first, "tick\ntick\ntick\n");
}
