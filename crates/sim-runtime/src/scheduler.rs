//! In-process hourly scheduler. Owned by the process bootstrap: `init` spawns
//! one task per job, `shutdown` stops them and waits.

use crate::jobs::{JobKind, JobOutcome, JobRunner};
use crate::JobError;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

const HOUR_MS: i64 = 3_600_000;

/// The next instant strictly after `now` at `minute` past an hour.
pub fn next_fire(now: DateTime<Utc>, minute: u32) -> DateTime<Utc> {
    let ms = now.timestamp_millis();
    let mut at = ms - ms.rem_euclid(HOUR_MS) + i64::from(minute) * 60_000;
    if at <= ms {
        at += HOUR_MS;
    }
    Utc.timestamp_millis_opt(at).single().unwrap_or(now)
}

struct Running {
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct SchedulerClient {
    runner: Arc<JobRunner>,
    running: Option<Running>,
}

impl SchedulerClient {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self {
            runner,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start one timer task per job at its configured minute.
    pub fn init(&mut self) -> Result<(), JobError> {
        if self.running.is_some() {
            return Err(JobError::AlreadyRunning);
        }
        self.runner.config().validate()?;
        let (stop, watch_rx) = watch::channel(false);
        let jobs = &self.runner.config().jobs;
        let mut tasks = Vec::new();
        for (job, schedule) in [
            (JobKind::TaxIncome, jobs.tax_income),
            (JobKind::ProvinceRevenue, jobs.province_revenue),
            (JobKind::PopulationGrowth, jobs.population_growth),
        ] {
            let runner = Arc::clone(&self.runner);
            let mut stopped = watch_rx.clone();
            info!(job = job.name(), minute = schedule.minute, "scheduling job");
            tasks.push(tokio::spawn(async move {
                loop {
                    let at = next_fire(Utc::now(), schedule.minute);
                    let wait = (at - Utc::now()).to_std().unwrap_or_default();
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = stopped.changed() => break,
                    }
                    match runner.run(job).await {
                        Ok(JobOutcome::Completed { .. }) => {}
                        Ok(outcome) => info!(job = job.name(), ?outcome, "tick skipped"),
                        Err(err) => error!(job = job.name(), error = %err, "tick failed"),
                    }
                }
            }));
        }
        self.running = Some(Running { stop, tasks });
        Ok(())
    }

    /// Run a job now, outside the timer, with the same guard and lock.
    pub async fn trigger(&self, job: JobKind) -> Result<JobOutcome, JobError> {
        self.runner.run(job).await
    }

    /// Stop the timers. A tick already in progress finishes first.
    pub async fn shutdown(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.stop.send(true);
        for task in running.tasks {
            if let Err(err) = task.await {
                error!(error = %err, "scheduler task ended abnormally");
            }
        }
        info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn fires_later_this_hour_or_next() {
        assert_eq!(next_fire(at(10, 10, 0), 25), at(10, 25, 0));
        assert_eq!(next_fire(at(10, 25, 0), 25), at(11, 25, 0));
        assert_eq!(next_fire(at(10, 50, 30), 45), at(11, 45, 0));
        assert_eq!(next_fire(at(23, 59, 59), 0), Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
    }
}
