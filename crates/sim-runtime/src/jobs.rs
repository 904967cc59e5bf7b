//! The three scheduled jobs and the runner that drives one tick:
//! run window → lock → retry(load → compute → persist → commit) → release.

use crate::config::EngineConfig;
use crate::retry::RetryCoordinator;
use crate::JobError;
use persistence::task_runs::{self, RunStatus};
use persistence::{BulkStateLoader, Database, LockCoordinator, Scope, StoreError, WritePlan};
use serde::Serialize;
use sim_core::{Catalog, NationId, TickState};
use sim_econ::{GrowthReport, RevenueReport, TaxReport};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// A scheduled job kind. Each has its own lock, run window, and task record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum JobKind {
    TaxIncome,
    ProvinceRevenue,
    PopulationGrowth,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        JobKind::TaxIncome,
        JobKind::ProvinceRevenue,
        JobKind::PopulationGrowth,
    ];

    /// Name used for the lock, the task record, and logs.
    pub fn name(self) -> &'static str {
        match self {
            JobKind::TaxIncome => "tax_income",
            JobKind::ProvinceRevenue => "generate_province_revenue",
            JobKind::PopulationGrowth => "population_growth",
        }
    }

    /// Only the heavy batch computations are retried.
    pub fn retries(self) -> bool {
        !matches!(self, JobKind::TaxIncome)
    }

    pub fn write_plan(self) -> WritePlan {
        match self {
            JobKind::TaxIncome => WritePlan::TAX_INCOME,
            JobKind::ProvinceRevenue => WritePlan::PROVINCE_REVENUE,
            JobKind::PopulationGrowth => WritePlan::POPULATION_GROWTH,
        }
    }

    /// Apply one tick of this job to an in-memory state.
    pub fn compute(self, catalog: &Catalog, state: &mut TickState) -> JobReport {
        match self {
            JobKind::TaxIncome => JobReport::Tax(sim_econ::run_tax_income(catalog, state)),
            JobKind::ProvinceRevenue => {
                JobReport::Revenue(sim_econ::run_province_revenue(catalog, state))
            }
            JobKind::PopulationGrowth => {
                JobReport::Population(sim_econ::run_population_growth(catalog, state))
            }
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JobKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tax_income" | "tax" => Ok(JobKind::TaxIncome),
            "generate_province_revenue" | "province_revenue" | "revenue" => {
                Ok(JobKind::ProvinceRevenue)
            }
            "population_growth" | "population" => Ok(JobKind::PopulationGrowth),
            other => Err(JobError::UnknownJob(other.to_string())),
        }
    }
}

/// What a completed tick did.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobReport {
    Tax(TaxReport),
    Revenue(RevenueReport),
    Population(GrowthReport),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed { report: JobReport },
    /// Another run was accepted within the minimum interval.
    SkippedRecentRun,
    /// Another worker holds the job lock.
    SkippedLocked,
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}

/// Runs ticks against one database with shared loader, locks, and retries.
pub struct JobRunner {
    config: EngineConfig,
    db: Arc<Database>,
    loader: Arc<BulkStateLoader>,
    locks: LockCoordinator,
    retry: RetryCoordinator,
}

impl JobRunner {
    pub fn new(config: EngineConfig, db: Arc<Database>, catalog: Arc<Catalog>) -> Self {
        let loader = Arc::new(BulkStateLoader::new(
            catalog,
            Duration::from_secs(config.snapshot_ttl_secs),
        ));
        let locks = LockCoordinator::new(
            config.lock_holder(),
            Duration::from_secs(config.lock.stale_after_secs),
        );
        let retry = RetryCoordinator::new(config.retry);
        Self {
            config,
            db,
            loader,
            locks,
            retry,
        }
    }

    /// Swap the retry coordinator, e.g. for a seeded one.
    pub fn with_retry(mut self, retry: RetryCoordinator) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn loader(&self) -> &Arc<BulkStateLoader> {
        &self.loader
    }

    fn schedule(&self, job: JobKind) -> crate::config::JobSchedule {
        match job {
            JobKind::TaxIncome => self.config.jobs.tax_income,
            JobKind::ProvinceRevenue => self.config.jobs.province_revenue,
            JobKind::PopulationGrowth => self.config.jobs.population_growth,
        }
    }

    /// Run one tick of `job` if its window has elapsed and its lock is free.
    pub async fn run(&self, job: JobKind) -> Result<JobOutcome, JobError> {
        let pool = self.db.pool();
        let now = persistence::now_ms();
        let interval_ms = self.schedule(job).min_interval().as_millis() as i64;

        if !task_runs::claim_run(&pool, job.name(), now, interval_ms).await? {
            info!(job = job.name(), "skipping: ran within the minimum interval");
            return Ok(JobOutcome::SkippedRecentRun);
        }
        let Some(lock) = self.locks.try_acquire(&pool, job.name(), now).await? else {
            info!(job = job.name(), "skipping: lock held elsewhere");
            return Ok(JobOutcome::SkippedLocked);
        };

        let result = if job.retries() {
            self.retry.run(&self.db, job.name(), |_| self.tick(job)).await
        } else {
            self.tick(job).await
        };

        // Release on every path, using whatever pool is current after retries.
        if let Err(err) = self.locks.release(&self.db.pool(), lock).await {
            warn!(job = job.name(), error = %err, "failed to release job lock");
        }

        let finished = persistence::now_ms();
        let pool = self.db.pool();
        match result {
            Ok((report, touched)) => {
                for nation in touched {
                    self.loader.invalidate_nation(nation);
                }
                task_runs::record_outcome(&pool, job.name(), finished, RunStatus::Success, None)
                    .await?;
                info!(job = job.name(), elapsed_ms = finished - now, "tick committed");
                Ok(JobOutcome::Completed { report })
            }
            Err(err) => {
                error!(job = job.name(), error = %err, "tick failed and rolled back");
                let message = err.to_string();
                if let Err(record) = task_runs::record_outcome(
                    &pool,
                    job.name(),
                    finished,
                    RunStatus::Failed,
                    Some(&message),
                )
                .await
                {
                    warn!(job = job.name(), error = %record, "failed to record outcome");
                }
                Err(err)
            }
        }
    }

    /// One attempt: load, compute, validate, persist, commit.
    async fn tick(&self, job: JobKind) -> Result<(JobReport, Vec<NationId>), JobError> {
        let pool = self.db.pool();
        let mut tx = pool.begin().await.map_err(StoreError::from)?;
        let baseline = self.loader.load(&mut tx, &Scope::All).await?;
        let mut state = baseline.clone();
        let report = job.compute(self.loader.catalog(), &mut state);
        state.check_invariants()?;
        let summary = persistence::persist(&mut tx, &baseline, &state, &job.write_plan()).await?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok((report, summary.touched))
    }
}
