//! Bounded worker pool for intra-layer parallel chart deployment. Message
//! passing, not shared mutable state: one job channel in, one result
//! channel out, indexed so ordering survives out-of-order completion.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use threadpool::ThreadPool;

use crate::clock::Ctx;

/// A worker pool's graceful shutdown waits up to 30s for in-flight
/// workers before forcing closure of its channels.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Default bounded worker pool size.
pub const DEFAULT_POOL_SIZE: usize = 3;

pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        WorkerPool { pool: ThreadPool::new(capacity.max(1)) }
    }

    /// Runs every job to completion, bounded by the wave boundary: the
    /// caller doesn't get the results back until every job in `jobs` has
    /// resolved or the context cancels and the grace period expires. A
    /// `None` slot means that job never reported a result — caller maps
    /// it to a cancellation failure, "results for unstarted
    /// charts in an aborted wave are Failed with the cancellation cause".
    pub fn run<T, F>(&self, ctx: &Ctx, jobs: Vec<F>) -> Vec<Option<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let total = jobs.len();
        let (tx, rx) = mpsc::channel::<(usize, T)>();

        for (index, job) in jobs.into_iter().enumerate() {
            let tx = tx.clone();
            self.pool.execute(move || {
                let result = job();
                // The receiver may already be gone past the grace period;
                // closure here is idempotent, so a dropped send is fine.
                let _ = tx.send((index, result));
            });
        }
        drop(tx);

        let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut received = 0;
        let mut grace_deadline: Option<Instant> = None;

        loop {
            if received == total {
                break;
            }
            match rx.recv_timeout(Duration::from_millis(200)) {
                Ok((index, result)) => {
                    slots[index] = Some(result);
                    received += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if ctx.is_cancelled() {
                        let deadline = *grace_deadline.get_or_insert_with(|| Instant::now() + SHUTDOWN_GRACE_PERIOD);
                        if Instant::now() >= deadline {
                            warn!("worker pool grace period expired with {} of {} jobs outstanding", total - received, total);
                            break;
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use std::sync::Arc;

    #[test]
    fn runs_every_job_and_preserves_index_order() {
        let pool = WorkerPool::new(2);
        let ctx = Ctx::background(Arc::new(SystemClock));
        let jobs: Vec<Box<dyn FnOnce() -> i32 + Send>> =
            (0..5).map(|i| Box::new(move || i * 10) as Box<dyn FnOnce() -> i32 + Send>).collect();
        let results = pool.run(&ctx, jobs);
        let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40]);
    }

    #[test]
    fn missing_job_slots_surface_as_none() {
        let pool = WorkerPool::new(2);
        let ctx = Ctx::background(Arc::new(SystemClock));
        let jobs: Vec<Box<dyn FnOnce() -> i32 + Send>> = vec![Box::new(|| 1), Box::new(|| panic!("boom"))];
        let results = pool.run(&ctx, jobs);
        assert_eq!(results[0], Some(1));
        assert_eq!(results[1], None);
    }
}
