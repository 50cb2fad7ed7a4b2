//! Operation Lock Registry.
//!
//! The external package manager serialises its own operations on the
//! cluster side but surfaces contention as a cryptic conflict error; a
//! local lock per `(namespace, release)` avoids racing our own callers and
//! collapses that class of error into a predictable `ConcurrentOperation`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use deploy_definitions::{DeployErrorKind, ReleaseKey};

/// How long an active record may sit before a fresh `execute` is allowed to
/// treat it as abandoned.
pub const STALE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

struct Record {
    operation: String,
    start_time: Instant,
}

/// Per-deployment — never process-wide. The coordinator owns one instance
/// and threads it through the wave executor.
#[derive(Clone)]
pub struct LockRegistry {
    active: Arc<Mutex<HashMap<ReleaseKey, Record>>>,
    stale_timeout: Duration,
}

impl Default for LockRegistry {
    fn default() -> Self {
        LockRegistry::new()
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        LockRegistry { active: Arc::new(Mutex::new(HashMap::new())), stale_timeout: STALE_TIMEOUT }
    }

    #[cfg(test)]
    pub fn with_stale_timeout(stale_timeout: Duration) -> Self {
        LockRegistry { active: Arc::new(Mutex::new(HashMap::new())), stale_timeout }
    }

    /// Runs `f` under mutual exclusion for `key`. On entry, if an active
    /// record exists and is not stale, fails with `ConcurrentOperation`. The
    /// mutex is never held across `f` — acquirers mutate the map, release,
    /// run, then reacquire to release the record, so `f` can itself be slow
    /// (it shells out to the package manager).
    pub fn execute<T>(
        &self, key: &ReleaseKey, operation: &str, f: impl FnOnce() -> Result<T, failure::Error>,
    ) -> Result<T, failure::Error> {
        {
            let mut guard = self.active.lock().unwrap();
            if let Some(existing) = guard.get(key) {
                if existing.start_time.elapsed() < self.stale_timeout {
                    return Err(DeployErrorKind::ConcurrentOperation(key.namespace.clone(), key.name.clone()).into());
                }
                debug!(
                    "purging stale operation lock for {}/{} (held {:?}, operation '{}')",
                    key.namespace,
                    key.name,
                    existing.start_time.elapsed(),
                    existing.operation
                );
                guard.remove(key);
            }
            guard.insert(
                key.clone(),
                Record { operation: operation.to_string(), start_time: Instant::now() },
            );
        }

        let result = f();

        self.active.lock().unwrap().remove(key);
        result
    }

    pub fn is_active(&self, key: &ReleaseKey) -> bool {
        let guard = self.active.lock().unwrap();
        match guard.get(key) {
            Some(r) => r.start_time.elapsed() < self.stale_timeout,
            None => false,
        }
    }

    /// Purges stale entries and returns how many were removed. Called
    /// explicitly by the coordinator between phases rather than run on a
    /// background thread, keeping the registry free of hidden global state.
    pub fn gc(&self) -> usize {
        let mut guard = self.active.lock().unwrap();
        let stale_timeout = self.stale_timeout;
        let before = guard.len();
        guard.retain(|_, record| record.start_time.elapsed() < stale_timeout);
        before - guard.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn denies_concurrent_execute_for_same_key() {
        let registry = LockRegistry::new();
        let key = ReleaseKey::new("alt-apps", "webapp");
        let barrier = Arc::new(Barrier::new(2));

        let r1 = registry.clone();
        let k1 = key.clone();
        let b1 = barrier.clone();
        let handle = thread::spawn(move || {
            r1.execute(&k1, "upgrade", || {
                b1.wait();
                thread::sleep(Duration::from_millis(100));
                Ok::<_, failure::Error>(())
            })
        });

        barrier.wait();
        thread::sleep(Duration::from_millis(20));
        let second = registry.execute(&key, "upgrade", || Ok::<_, failure::Error>(()));
        assert!(second.is_err());

        handle.join().unwrap().unwrap();
    }

    #[test]
    fn stale_record_does_not_block_fresh_execute() {
        let registry = LockRegistry::with_stale_timeout(Duration::from_millis(10));
        let key = ReleaseKey::new("alt-database", "postgres");

        // Simulate a crashed holder: insert directly without releasing.
        registry.active.lock().unwrap().insert(
            key.clone(),
            Record { operation: "upgrade".to_string(), start_time: Instant::now() - Duration::from_millis(50) },
        );

        let result = registry.execute(&key, "upgrade", || Ok::<_, failure::Error>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn lock_is_released_after_success_and_failure() {
        let registry = LockRegistry::new();
        let key = ReleaseKey::new("alt-apps", "webapp");

        let _ = registry.execute(&key, "upgrade", || Ok::<_, failure::Error>(()));
        assert!(!registry.is_active(&key));

        let _ = registry.execute(&key, "upgrade", || Err::<(), _>(format_err!("boom")));
        assert!(!registry.is_active(&key));
    }
}
