//! Per-job run bookkeeping: the compare-and-set run window and the last
//! outcome of every job.

use crate::error::StoreError;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;

/// Outcome recorded after a job finishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `task_runs`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskRun {
    pub task_name: String,
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
    pub last_error: Option<String>,
}

fn from_ms(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

/// Claim the run window for `task`: succeeds at most once per `min_interval_ms`
/// no matter how many schedulers race for it.
pub async fn claim_run(
    pool: &SqlitePool,
    task: &str,
    now_ms: i64,
    min_interval_ms: i64,
) -> Result<bool, StoreError> {
    sqlx::query("INSERT INTO task_runs (task_name) VALUES (?) ON CONFLICT (task_name) DO NOTHING")
        .bind(task)
        .execute(pool)
        .await?;
    let claimed = sqlx::query(
        "UPDATE task_runs SET last_run_ms = ? \
         WHERE task_name = ? AND (last_run_ms IS NULL OR last_run_ms <= ?)",
    )
    .bind(now_ms)
    .bind(task)
    .bind(now_ms - min_interval_ms)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(claimed == 1)
}

/// Record how a claimed run ended.
pub async fn record_outcome(
    pool: &SqlitePool,
    task: &str,
    now_ms: i64,
    status: RunStatus,
    error: Option<&str>,
) -> Result<(), StoreError> {
    let success_ms = (status == RunStatus::Success).then_some(now_ms);
    sqlx::query(
        "UPDATE task_runs SET last_status = ?, last_error = ?, \
         last_success_ms = COALESCE(?, last_success_ms) WHERE task_name = ?",
    )
    .bind(status.as_str())
    .bind(error)
    .bind(success_ms)
    .bind(task)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn last_run(pool: &SqlitePool, task: &str) -> Result<Option<TaskRun>, StoreError> {
    Ok(all_runs(pool).await?.into_iter().find(|r| r.task_name == task))
}

pub async fn all_runs(pool: &SqlitePool) -> Result<Vec<TaskRun>, StoreError> {
    let rows: Vec<(String, Option<i64>, Option<i64>, Option<String>, Option<String>)> =
        sqlx::query_as(
            "SELECT task_name, last_run_ms, last_success_ms, last_status, last_error \
             FROM task_runs ORDER BY task_name",
        )
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(task_name, run, success, status, error)| TaskRun {
            task_name,
            last_run: from_ms(run),
            last_success: from_ms(success),
            last_status: status,
            last_error: error,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::temp_db;

    const HOUR: i64 = 3_600_000;

    #[tokio::test]
    async fn window_is_claimed_once_per_interval() {
        let (db, _dir) = temp_db().await;
        let pool = db.pool();
        assert!(claim_run(&pool, "tax_income", 10 * HOUR, HOUR).await.unwrap());
        assert!(!claim_run(&pool, "tax_income", 10 * HOUR + 5, HOUR).await.unwrap());
        assert!(claim_run(&pool, "population_growth", 10 * HOUR + 5, HOUR).await.unwrap());
        assert!(claim_run(&pool, "tax_income", 11 * HOUR, HOUR).await.unwrap());
    }

    #[tokio::test]
    async fn racing_claims_admit_exactly_one() {
        let (db, _dir) = temp_db().await;
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = db.pool();
                tokio::spawn(async move {
                    claim_run(&pool, "generate_province_revenue", HOUR, HOUR).await
                })
            })
            .collect();
        let mut won = 0;
        for h in handles {
            if h.await.unwrap().unwrap() {
                won += 1;
            }
        }
        assert_eq!(won, 1);
    }

    #[tokio::test]
    async fn outcomes_keep_the_last_success() {
        let (db, _dir) = temp_db().await;
        let pool = db.pool();
        claim_run(&pool, "tax_income", HOUR, HOUR).await.unwrap();
        record_outcome(&pool, "tax_income", HOUR + 10, RunStatus::Success, None)
            .await
            .unwrap();
        claim_run(&pool, "tax_income", 2 * HOUR, HOUR).await.unwrap();
        record_outcome(&pool, "tax_income", 2 * HOUR + 10, RunStatus::Failed, Some("boom"))
            .await
            .unwrap();

        let run = last_run(&pool, "tax_income").await.unwrap().unwrap();
        assert_eq!(run.last_status.as_deref(), Some("failed"));
        assert_eq!(run.last_error.as_deref(), Some("boom"));
        assert_eq!(run.last_success.map(|t| t.timestamp_millis()), Some(HOUR + 10));
        assert_eq!(run.last_run.map(|t| t.timestamp_millis()), Some(2 * HOUR));
    }
}
