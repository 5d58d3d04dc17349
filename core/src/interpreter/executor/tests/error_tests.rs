//! Error propagation, statement locations and catch

use super::helpers::*;
use crate::interpreter::errors::{E_NONE, E_UNKNOWN_VAR};
use crate::interpreter::{EvalError, LoopError, ParseError};

#[test]
fn test_uncaught_error_reports_failing_line() {
    let (s, err) = run_err("k = 0\nloop 3\nk++\nbogus_cmd\nendloop\n");
    assert_eq!(err.lineno(), Some(4));
    assert!(matches!(err.root(), LoopError::Eval(EvalError::UnknownCommand(_))));
    // work done before the failure is kept
    assert_eq!(scalar(&s, "k"), 1.0);
}

#[test]
fn test_nested_error_keeps_innermost_line() {
    let (_, err) = run_err("loop 2\nloop 2\nx = 1\ny = nope + 1\nendloop\nendloop\n");
    assert_eq!(err.lineno(), Some(4));
    assert!(matches!(err.root(), LoopError::Eval(EvalError::Undefined(n)) if n == "nope"));
    assert!(err.to_string().starts_with("line 4: y = nope + 1"));
}

#[test]
fn test_catch_records_error_and_continues() {
    let s = run_ok("k = 0\nloop 3\ncatch x = undefined_thing + 1\nk++\nendloop\nerr = $error\nagain = $error\n");
    assert_eq!(scalar(&s, "k"), 3.0);
    assert_eq!(scalar(&s, "err"), E_UNKNOWN_VAR as f64);
    // reading $error resets it
    assert_eq!(scalar(&s, "again"), E_NONE as f64);
}

#[test]
fn test_catch_outside_loops() {
    let s = run_ok("catch print nothing_here\nerr = $error\n");
    assert_eq!(scalar(&s, "err"), E_UNKNOWN_VAR as f64);
}

#[test]
fn test_malformed_header_discards_the_tree() {
    let (s, err) = run_err("loop i=1..3 --bogus\nx = 1\nendloop\n");
    assert!(matches!(err.root(), LoopError::Parse(_)));
    assert!(!s.is_compiling());
    assert!(s.workspace().get("x").is_none());
}

#[test]
fn test_unbalanced_conditionals_in_body() {
    let (_, err) = run_err("loop 2\nif 1\nendloop\n");
    assert!(matches!(err.root(), LoopError::Parse(ParseError::Nesting { line: 3, .. })));

    let (_, err) = run_err("loop 2\nelse\nendloop\n");
    assert!(matches!(err.root(), LoopError::Parse(ParseError::Nesting { .. })));
}

#[test]
fn test_unterminated_loop_at_end_of_input() {
    let (s, err) = run_err("loop 2\nx = 1\n");
    assert!(matches!(err.root(), LoopError::Parse(ParseError::Nesting { .. })));
    assert!(!s.is_compiling());
}

#[test]
fn test_endloop_without_loop() {
    let (_, err) = run_err("endloop\n");
    assert!(err.to_string().contains("only valid inside a loop"));
}

#[test]
fn test_non_scalar_bound_is_an_error() {
    let (_, err) = run_err("nulldata 3\nloop index\nendloop\n");
    assert!(matches!(err.root(), LoopError::Eval(EvalError::NotScalar(_))));
}
