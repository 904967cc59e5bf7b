//! Retries for transient storage failures with capped, jittered exponential
//! backoff. Every attempt reruns the whole body from a fresh load.

use crate::config::RetryPolicy;
use crate::JobError;
use persistence::{Database, FailureClass};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, warn};

pub struct RetryCoordinator {
    policy: RetryPolicy,
    rng: Mutex<ChaCha8Rng>,
}

impl RetryCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            rng: Mutex::new(ChaCha8Rng::from_entropy()),
        }
    }

    /// Deterministic jitter, for tests.
    pub fn with_seed(policy: RetryPolicy, seed: u64) -> Self {
        Self {
            policy,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Delay before retry number `retry` (0-based): `min(max, base * 2^retry)`
    /// plus up to half of that again.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self
            .policy
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        let capped = base.min(self.policy.max_delay_ms);
        let jitter = if capped == 0 {
            0
        } else {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            rng.gen_range(0..=capped / 2)
        };
        Duration::from_millis(capped + jitter)
    }

    /// Run `attempt` until it succeeds, fails fatally, or runs out of retries.
    /// Connection-class failures rebuild the pool before the next attempt.
    pub async fn run<T, F, Fut>(&self, db: &Database, label: &str, mut attempt: F) -> Result<T, JobError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, JobError>>,
    {
        let mut retries = 0u32;
        loop {
            let err = match attempt(retries).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let class = err.class();
            if class == FailureClass::Fatal {
                error!(label, error = %err, "fatal failure, not retrying");
                return Err(err);
            }
            if retries >= self.policy.max_retries {
                error!(label, attempts = retries + 1, error = %err, "retries exhausted");
                return Err(JobError::RetriesExhausted {
                    job: label.to_string(),
                    attempts: retries + 1,
                    source: Box::new(err),
                });
            }
            if class == FailureClass::Connection {
                if let Err(reset) = db.reset().await {
                    warn!(label, error = %reset, "pool reset failed");
                }
            }
            let delay = self.delay_for(retries);
            warn!(label, retry = retries + 1, ?delay, ?class, error = %err, "transient failure, retrying");
            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 4,
        }
    }

    async fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("retry.db").display());
        (Database::connect(&url, 1).await.unwrap(), dir)
    }

    fn deadlock() -> JobError {
        JobError::Store(StoreError::Conflict("simulated deadlock".into()))
    }

    #[test]
    fn delays_grow_and_cap() {
        let retry = RetryCoordinator::with_seed(
            RetryPolicy {
                max_retries: 5,
                base_delay_ms: 100,
                max_delay_ms: 1_000,
            },
            7,
        );
        for (n, floor) in [(0, 100), (1, 200), (2, 400), (3, 800), (4, 1_000), (40, 1_000)] {
            let d = retry.delay_for(n).as_millis() as u64;
            assert!(d >= floor && d <= floor + floor / 2, "retry {n}: {d}ms");
        }
    }

    #[tokio::test]
    async fn always_failing_body_runs_max_retries_plus_one_times() {
        let (db, _dir) = temp_db().await;
        let retry = RetryCoordinator::with_seed(policy(3), 1);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry
            .run(&db, "test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(deadlock()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(
            result,
            Err(JobError::RetriesExhausted { attempts: 4, .. })
        ));
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let (db, _dir) = temp_db().await;
        let retry = RetryCoordinator::with_seed(policy(3), 1);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry
            .run(&db, "test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(JobError::Store(StoreError::Invalid("bad row".into()))) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(JobError::Store(StoreError::Invalid(_)))));
    }

    #[tokio::test]
    async fn connection_failures_reset_the_pool_then_succeed() {
        let (db, _dir) = temp_db().await;
        let retry = RetryCoordinator::with_seed(policy(2), 1);
        let value = retry
            .run(&db, "test", |n| async move {
                if n == 0 {
                    Err(JobError::Store(StoreError::Sqlx(sqlx::Error::PoolClosed)))
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(db.generation(), 1);
    }
}
