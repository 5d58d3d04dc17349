//! Loops kept inside function bodies run again on every call; cached
//! fragments must behave exactly like re-parsing the text

use super::helpers::*;
use crate::interpreter::{EvalError, LoopError};

#[test]
fn test_function_loop_runs_on_every_call() {
    let s = run_ok("function f\nloop i=1..3\nk++\nendloop\nend function\nk = 0\nf()\nf()\n");
    assert_eq!(scalar(&s, "k"), 6.0);
}

#[test]
fn test_bound_expressions_are_reevaluated_on_reentry() {
    let s = run_ok(
        "function f\nloop (n + 1)\nk++\nendloop\nend function\nk = 0\nn = 1\nf()\nn = 4\nf()\n",
    );
    assert_eq!(scalar(&s, "k"), 7.0);
}

#[test]
fn test_cached_body_statements_see_current_values() {
    let s = run_ok(
        "function f\nloop 2\ntotal = total + step\nendloop\nend function\ntotal = 0\nstep = 1\nf()\nstep = 10\nf()\n",
    );
    assert_eq!(scalar(&s, "total"), 22.0);
}

#[test]
fn test_renaming_loop_recompiles_each_entry() {
    let s = run_ok(
        "nulldata 2\na = index\nfunction f\nloop 2\nrename a b\nc = b * 2\nrename b a\nendloop\nend function\nf()\nf()\n",
    );
    assert!(s.workspace().get("a").is_some());
    assert!(s.workspace().get("b").is_none());
    assert!(s.workspace().get("c").is_some());
}

#[test]
fn test_index_in_use_across_a_call_is_rejected() {
    let (_, err) = run_err("function f\nloop i=1..2\nendloop\nend function\nloop i=1..2\nf()\nendloop\n");
    assert!(matches!(err.root(), LoopError::Eval(EvalError::Data(m)) if m.contains("already in use")));
}

#[test]
fn test_recursion_is_rejected() {
    let (_, err) = run_err("function f\nf()\nend function\nf()\n");
    assert!(matches!(err.root(), LoopError::Eval(EvalError::Function { .. })));
}

#[test]
fn test_model_from_final_pass_becomes_last_model() {
    let data = "nulldata 6\nx = index\ny = 3 * x\n";
    let s = run_ok(&format!("{}loop i=1..3\nols y const x --quiet\nendloop\n", data));
    assert!(s.workspace().last_model().is_some());

    // estimated on early passes only: discarded
    let s = run_ok(&format!("{}loop i=1..3\nif i < 3\nols y const x --quiet\nendif\nendloop\n", data));
    assert!(s.workspace().last_model().is_none());
}

#[test]
fn test_quiet_loop_option_suppresses_model_output() {
    let data = "nulldata 6\nx = index\ny = 3 * x + 1\n";
    let s = run_ok(&format!("{}loop 2\nols y const x\nendloop\n", data));
    assert_eq!(s.output().matches("Model:").count(), 2);

    let s = run_ok(&format!("{}loop 2 --quiet\nols y const x\nendloop\n", data));
    assert!(!s.output().contains("Model:"));
}

#[test]
fn test_verbose_echoes_statements() {
    let s = run_ok("loop i=1..2 --verbose\nk = i\nendloop\n");
    assert_eq!(lines(&s), vec!["loop: i = 1", "? k = i", "loop: i = 2", "? k = i"]);
}
