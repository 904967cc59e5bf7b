//! Staleness check over the per-job task records.

use crate::jobs::JobKind;
use crate::JobError;
use chrono::{DateTime, Utc};
use persistence::task_runs::{self, TaskRun};
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobHealth {
    pub job: String,
    pub last_success: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
    pub last_error: Option<String>,
    /// Seconds since the last success.
    pub age_secs: Option<i64>,
    /// Never succeeded, or last success older than the threshold.
    pub stale: bool,
}

pub fn evaluate(
    job: JobKind,
    run: Option<&TaskRun>,
    threshold: Duration,
    now: DateTime<Utc>,
) -> JobHealth {
    let last_success = run.and_then(|r| r.last_success);
    let age_secs = last_success.map(|t| (now - t).num_seconds());
    let stale = match age_secs {
        Some(age) => age > threshold.as_secs() as i64,
        None => true,
    };
    JobHealth {
        job: job.name().to_string(),
        last_success,
        last_status: run.and_then(|r| r.last_status.clone()),
        last_error: run.and_then(|r| r.last_error.clone()),
        age_secs,
        stale,
    }
}

/// Health of every scheduled job.
pub async fn job_health(
    pool: &SqlitePool,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<JobHealth>, JobError> {
    let runs = task_runs::all_runs(pool).await?;
    Ok(JobKind::ALL
        .iter()
        .map(|job| {
            let run = runs.iter().find(|r| r.task_name == job.name());
            evaluate(*job, run, threshold, now)
        })
        .collect())
}

pub fn all_healthy(report: &[JobHealth]) -> bool {
    report.iter().all(|h| !h.stale)
}
