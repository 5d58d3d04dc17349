//! Cooperative cancellation at statement boundaries

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::helpers::*;
use crate::interpreter::executor::CancelFn;
use crate::interpreter::{LoopError, Session};

/// Session that reports a stop request from the `stop_at`-th poll onward
fn session_stopping_at(stop_at: usize, poll_interval: usize) -> (Session, Arc<AtomicUsize>) {
    let polls = Arc::new(AtomicUsize::new(0));
    let seen = polls.clone();
    let mut config = test_config();
    config.loops.cancel_poll_interval = poll_interval;
    let session = Session::builder()
        .config(config)
        .capture_output()
        .cancel_with(CancelFn(move || seen.fetch_add(1, Ordering::SeqCst) + 1 >= stop_at))
        .build();
    (session, polls)
}

#[test]
fn test_stop_between_passes() {
    let (mut s, _) = session_stopping_at(4, 1);
    let err = s.run_script("k = 0\nloop 10\nk++\nendloop\nprint \"after\"\n").unwrap_err();
    assert!(err.is_cancelled());
    assert!(matches!(err, LoopError::Cancelled));
    // polls 1-3 allowed three passes; nothing ran after the request
    assert_eq!(scalar(&s, "k"), 3.0);
    assert!(!s.output().contains("after"));
}

#[test]
fn test_stop_propagates_through_two_levels() {
    let (mut s, polls) = session_stopping_at(3, 1);
    let err = s
        .run_script("k = 0\nloop i=1..5\nloop j=1..3\nk++\nendloop\nendloop\n")
        .unwrap_err();
    assert!(err.is_cancelled());
    // poll 1: outer pass 1, poll 2: inner pass 1, poll 3: stop before inner pass 2
    assert_eq!(scalar(&s, "k"), 1.0);
    assert_eq!(polls.load(Ordering::SeqCst), 3);
    assert!(!s.workspace().is_locked("i"));
    assert!(!s.workspace().is_locked("j"));
}

#[test]
fn test_default_cadence_polls_every_tenth_pass() {
    let (mut s, _) = session_stopping_at(2, 10);
    let err = s.run_script("k = 0\nloop 100\nk++\nendloop\n").unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(scalar(&s, "k"), 10.0);
}

#[test]
fn test_cancel_is_not_caught() {
    let flag = Arc::new(AtomicBool::new(true));
    let mut s = Session::builder()
        .config(test_config())
        .capture_output()
        .cancel_with(flag.clone())
        .build();
    let err = s.run_script("loop 3\ncatch x = 1\nendloop\n").unwrap_err();
    assert!(err.is_cancelled());
    assert!(s.workspace().get("x").is_none());
}

#[test]
fn test_cancellation_token_source() {
    let token = CancellationToken::new();
    let mut s = Session::builder()
        .config(test_config())
        .capture_output()
        .cancel_with(token.clone())
        .build();
    s.run_script("k = 0\nloop 3\nk++\nendloop\n").unwrap();
    assert_eq!(scalar(&s, "k"), 3.0);

    token.cancel();
    let err = s.run_script("loop 3\nk++\nendloop\n").unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(scalar(&s, "k"), 3.0);
    // the session is usable for plain statements afterwards
    assert!(!s.is_compiling());
}
