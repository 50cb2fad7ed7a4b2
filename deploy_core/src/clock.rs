//! Clock & Context.
//!
//! Everything here is synchronous (no `tokio`, no `async`): cooperative
//! cancellation via a propagated context is modelled the way a
//! synchronous, thread-based Rust program would — a `Ctx` that carries an
//! absolute deadline and a shared cancellation flag, checked at every
//! suspension point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Real wall/monotonic clock vs. a fake one tests can fast-forward.
///
/// The wave executor and readiness prober only ever go through this trait,
/// never `Instant::now`/`std::thread::sleep` directly, so a test can run
/// the retry/backoff and health-gate timing logic without actually waiting.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);
}

#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum CtxError {
    Cancelled,
    DeadlineExceeded,
}

impl std::fmt::Display for CtxError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CtxError::Cancelled => write!(f, "context cancelled"),
            CtxError::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

struct Inner {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

/// A propagated cancellation/deadline context, cloned (cheaply, via `Arc`)
/// down through every phase and chart deploy. Cancelling a parent cancels
/// every context derived from it: every `Ctx` in one cancellation tree
/// shares the same `cancelled` flag, only the deadline narrows per `with_timeout`.
#[derive(Clone)]
pub struct Ctx {
    inner: Arc<Inner>,
    clock: Arc<dyn Clock>,
}

impl Ctx {
    pub fn background(clock: Arc<dyn Clock>) -> Self {
        Ctx {
            inner: Arc::new(Inner { cancelled: Arc::new(AtomicBool::new(false)), deadline: None }),
            clock,
        }
    }

    /// Derives a child context bounded by `d` from now, clamped to the
    /// parent's own deadline if the parent already has a tighter one
    /// (a phase never gets *more* time than its caller granted it).
    /// Shares the parent's `cancelled` flag, so cancelling any ancestor
    /// cancels this child too.
    pub fn with_timeout(&self, d: Duration) -> Ctx {
        let candidate = self.clock.now() + d;
        let deadline = match self.inner.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Ctx {
            inner: Arc::new(Inner { cancelled: self.inner.cancelled.clone(), deadline: Some(deadline) }),
            clock: self.clock.clone(),
        }
    }

    /// A handle the caller can use to cancel this context (and everything
    /// derived from it, past or future) from another thread — e.g. a
    /// ctrl-c handler.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle { cancelled: self.inner.cancelled.clone() }
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        matches!(self.inner.deadline, Some(d) if self.clock.now() >= d)
    }

    /// Returns an error if the context is already done; otherwise `Ok(())`.
    /// Called at the top of every loop body in the prober, executor and
    /// retry classifier.
    pub fn check(&self) -> Result<(), CtxError> {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return Err(CtxError::Cancelled);
        }
        if let Some(d) = self.inner.deadline {
            if self.clock.now() >= d {
                return Err(CtxError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Sleeps for `d`, or less if the context is cancelled/expires first.
    /// This is the one suspension primitive every component uses instead
    /// of a raw `thread::sleep`, so cancellation is honored at every
    /// suspension point.
    pub fn sleep(&self, d: Duration) {
        let deadline = self.clock.now() + d;
        let step = Duration::from_millis(50);
        loop {
            if self.is_cancelled() {
                return;
            }
            let now = self.clock.now();
            if now >= deadline {
                return;
            }
            let remaining = deadline - now;
            self.clock.sleep(std::cmp::min(step, remaining));
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.inner.deadline.map(|d| d.saturating_duration_since(self.clock.now()))
    }
}

/// A detached handle used to cancel a `Ctx` (and its descendants) from a
/// different thread than the one driving the deployment.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeClock {
        now: std::sync::Mutex<Instant>,
    }

    impl FakeClock {
        fn new() -> Arc<Self> {
            Arc::new(FakeClock { now: std::sync::Mutex::new(Instant::now()) })
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }

        fn sleep(&self, d: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += d;
        }
    }

    #[test]
    fn with_timeout_clamps_to_parent_deadline() {
        let clock = FakeClock::new();
        let parent = Ctx::background(clock.clone()).with_timeout(Duration::from_secs(5));
        let child = parent.with_timeout(Duration::from_secs(50));
        assert_eq!(parent.remaining(), child.remaining());
    }

    #[test]
    fn sleep_wakes_early_on_cancellation() {
        let clock = FakeClock::new();
        let ctx = Ctx::background(clock.clone());
        let handle = ctx.cancel_handle();
        handle.cancel();
        // Should return immediately rather than advancing the fake clock.
        ctx.sleep(Duration::from_secs(3600));
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn cancelling_a_parent_cancels_contexts_derived_before_and_after() {
        let clock = FakeClock::new();
        let parent = Ctx::background(clock.clone());
        let before = parent.with_timeout(Duration::from_secs(60));
        let handle = parent.cancel_handle();

        handle.cancel();

        let after = parent.with_timeout(Duration::from_secs(60));
        assert!(parent.is_cancelled());
        assert!(before.is_cancelled());
        assert!(after.is_cancelled());
    }

    #[test]
    fn check_reports_deadline_exceeded() {
        let clock = FakeClock::new();
        let ctx = Ctx::background(clock.clone()).with_timeout(Duration::from_secs(1));
        clock.sleep(Duration::from_secs(2));
        assert_eq!(ctx.check(), Err(CtxError::DeadlineExceeded));
    }
}
