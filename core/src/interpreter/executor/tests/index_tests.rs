//! Index and dated loops: `loop i=a..b`, `loop t=1990:1..1990:4`

use super::helpers::*;
use crate::interpreter::{EvalError, LoopError};

#[test]
fn test_ascending_range() {
    let s = run_ok("loop i=1..5\nprint i\nendloop\n");
    assert_eq!(lines(&s), vec!["i = 1", "i = 2", "i = 3", "i = 4", "i = 5"]);
    // the index keeps its last value
    assert_eq!(scalar(&s, "i"), 5.0);
}

#[test]
fn test_iteration_count_is_span() {
    for (a, b) in [(1, 1), (-2, 3), (10, 14)] {
        let s = run_ok(&format!("k = 0\nloop i={}..{}\nk++\nendloop\n", a, b));
        assert_eq!(scalar(&s, "k"), (b - a + 1) as f64);
    }
}

#[test]
fn test_reversed_bounds_run_nothing() {
    let s = run_ok("k = 0\nloop i=5..1\nk++\nendloop\n");
    assert_eq!(scalar(&s, "k"), 0.0);
}

#[test]
fn test_decrement_counts_down() {
    let s = run_ok("loop i=5..3 --decr\nprint i\nendloop\n");
    assert_eq!(lines(&s), vec!["i = 5", "i = 4", "i = 3"]);
}

#[test]
fn test_bounds_from_scalars() {
    let s = run_ok("lo = 2\nhi = 4\nk = 0\nloop i=lo..hi\nk += i\nendloop\n");
    assert_eq!(scalar(&s, "k"), 9.0);

    let s = run_ok("n = 3\nk = 0\nloop i=-n..0\nk++\nendloop\n");
    assert_eq!(scalar(&s, "k"), 4.0);
}

#[test]
fn test_fractional_bounds_are_rejected() {
    let (_, err) = run_err("loop i=1..2.5\nendloop\n");
    assert!(matches!(err.root(), LoopError::Eval(EvalError::Data(_))));
}

#[test]
fn test_marker_builds_names() {
    let s = run_ok("nulldata 3\nloop i=1..3\nseries x$i = index * $i\nendloop\n");
    let names = s.workspace().series_names();
    assert_eq!(names, &["x1".to_string(), "x2".to_string(), "x3".to_string()]);
}

#[test]
fn test_index_variable_is_read_only_in_the_body() {
    let (s, err) = run_err("loop i=1..3\ni = 7\nendloop\n");
    assert!(matches!(err.root(), LoopError::Eval(EvalError::IndexLocked(n)) if n == "i"));
    assert_eq!(err.lineno(), Some(2));
    // released once the loop is gone
    assert!(!s.workspace().is_locked("i"));

    let (_, err) = run_err("loop i=1..3\ndelete i\nendloop\n");
    assert!(matches!(err.root(), LoopError::Eval(EvalError::IndexLocked(_))));
}

#[test]
fn test_dated_loop_uses_calendar() {
    let s = run_ok("nulldata 8\nsetobs 4 1990:1\nloop t=1990:2..1990:4\nprint \"$t\"\nprint t\nendloop\n");
    assert_eq!(
        lines(&s),
        vec!["1990:2", "t = 2", "1990:3", "t = 3", "1990:4", "t = 4"]
    );
}

#[test]
fn test_dated_bound_outside_sample_is_an_error() {
    let (_, err) = run_err("nulldata 4\nsetobs 4 1990:1\nloop t=1990:2..1995:1\nendloop\n");
    assert!(matches!(err.root(), LoopError::Eval(EvalError::Data(_))));
}

#[test]
fn test_huge_span_is_an_error_not_an_overflow() {
    let (_, err) = run_err("loop i=-1..1e19\nbreak\nendloop\n");
    assert!(matches!(err.root(), LoopError::Eval(EvalError::Data(_))));

    let (_, err) = run_err("loop i=-9e18..9e18\nbreak\nendloop\n");
    assert!(matches!(err.root(), LoopError::Eval(EvalError::Data(m)) if m.contains("too large")));

    let (_, err) = run_err("loop i=9e18..-9e18 --decr\nbreak\nendloop\n");
    assert!(matches!(err.root(), LoopError::Eval(EvalError::Data(m)) if m.contains("too large")));
}

#[test]
fn test_wide_span_within_range_still_runs() {
    let s = run_ok("k = 0\nloop i=-4e18..4e18\nk++\nif k == 2\nbreak\nendif\nendloop\n");
    assert_eq!(scalar(&s, "k"), 2.0);
}
