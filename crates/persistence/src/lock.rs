//! Table-backed, non-blocking job locks.
//!
//! A lock is a row in `job_locks`. Acquiring inserts the row and succeeds only
//! if the insert took effect; a row older than the staleness window belongs to
//! a crashed holder and is taken over.

use crate::error::StoreError;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{debug, warn};

/// Proof of holding a job lock. Release it through [`LockCoordinator::release`];
/// dropping it unreleased leaves the row for staleness takeover.
#[derive(Debug)]
pub struct JobLock {
    job: String,
    holder: String,
    released: bool,
}

impl JobLock {
    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        if !self.released {
            warn!(job = %self.job, holder = %self.holder, "job lock dropped without release");
        }
    }
}

/// Acquires and releases job locks on a pool, outside any tick transaction.
#[derive(Clone, Debug)]
pub struct LockCoordinator {
    holder: String,
    stale_after: Duration,
}

impl LockCoordinator {
    pub fn new(holder: impl Into<String>, stale_after: Duration) -> Self {
        Self {
            holder: holder.into(),
            stale_after,
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Try once to take the lock for `job`. `Ok(None)` means someone else holds it.
    pub async fn try_acquire(
        &self,
        pool: &SqlitePool,
        job: &str,
        now_ms: i64,
    ) -> Result<Option<JobLock>, StoreError> {
        let stale_before = now_ms - self.stale_after.as_millis() as i64;
        let taken_over = sqlx::query("DELETE FROM job_locks WHERE job = ? AND acquired_at_ms < ?")
            .bind(job)
            .bind(stale_before)
            .execute(pool)
            .await?
            .rows_affected();
        if taken_over > 0 {
            warn!(job, "taking over stale job lock");
        }

        let inserted = sqlx::query(
            "INSERT INTO job_locks (job, holder, acquired_at_ms) VALUES (?, ?, ?) \
             ON CONFLICT (job) DO NOTHING",
        )
        .bind(job)
        .bind(&self.holder)
        .bind(now_ms)
        .execute(pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            debug!(job, holder = %self.holder, "job lock acquired");
            Ok(Some(JobLock {
                job: job.to_string(),
                holder: self.holder.clone(),
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Release a held lock. Only deletes the row if this holder still owns it.
    pub async fn release(&self, pool: &SqlitePool, mut lock: JobLock) -> Result<(), StoreError> {
        lock.released = true;
        let deleted = sqlx::query("DELETE FROM job_locks WHERE job = ? AND holder = ?")
            .bind(&lock.job)
            .bind(&lock.holder)
            .execute(pool)
            .await?
            .rows_affected();
        if deleted == 0 {
            warn!(job = %lock.job, "job lock was already gone at release");
        }
        Ok(())
    }
}
