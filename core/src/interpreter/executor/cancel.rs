//! Cooperative cancellation
//!
//! The engine polls a host-supplied signal every few iterations, always at a
//! statement boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub trait CancelPoll: Send {
    fn should_stop(&self) -> bool;
}

impl CancelPoll for CancellationToken {
    fn should_stop(&self) -> bool {
        self.is_cancelled()
    }
}

impl CancelPoll for Arc<AtomicBool> {
    fn should_stop(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Adapter for a plain closure
pub struct CancelFn<F>(pub F);

impl<F: Fn() -> bool + Send> CancelPoll for CancelFn<F> {
    fn should_stop(&self) -> bool {
        (self.0)()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NeverCancel;

impl CancelPoll for NeverCancel {
    fn should_stop(&self) -> bool {
        false
    }
}
