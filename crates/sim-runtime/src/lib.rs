//! Job orchestration for the province economy.
//!
//! A [`JobRunner`] executes one tick of a scheduled job against the shared
//! database: run-window claim, job lock, then load → compute → persist →
//! commit inside one transaction, retried on contention for the batch jobs.
//! [`SchedulerClient`] fires the three jobs hourly at their configured minute;
//! [`Projections`] serves read-only views for the UI layer.

pub mod config;
pub mod health;
pub mod jobs;
pub mod projections;
pub mod retry;
pub mod scheduler;

pub use config::{EngineConfig, JobSchedule, RetryPolicy};
pub use health::{all_healthy, job_health, JobHealth};
pub use jobs::{JobKind, JobOutcome, JobReport, JobRunner};
pub use projections::{ProvinceEffects, Projections};
pub use retry::RetryCoordinator;
pub use scheduler::{next_fire, SchedulerClient};

use persistence::{Database, FailureClass, StoreError};
use sim_core::{Catalog, CatalogError, ValidationError};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown job: {0}")]
    UnknownJob(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("tick produced invalid state: {0}")]
    Invalid(#[from] ValidationError),
    #[error("{job} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        job: String,
        attempts: u32,
        #[source]
        source: Box<JobError>,
    },
    #[error("scheduler already running")]
    AlreadyRunning,
}

impl JobError {
    /// Only storage failures can be transient.
    pub fn class(&self) -> FailureClass {
        match self {
            JobError::Store(err) => err.class(),
            _ => FailureClass::Fatal,
        }
    }
}

/// The configured catalog file, or the embedded standard catalog.
pub fn open_catalog(config: &EngineConfig) -> Result<Catalog, JobError> {
    Ok(match &config.catalog_path {
        Some(path) => Catalog::from_path(path)?,
        None => Catalog::standard()?,
    })
}

/// Connect, migrate, and build a runner from one config.
pub async fn bootstrap(config: EngineConfig) -> Result<JobRunner, JobError> {
    let catalog = Arc::new(open_catalog(&config)?);
    let db = Database::connect(&config.database.url, config.database.max_connections).await?;
    db.migrate().await?;
    info!(url = db.url(), "database ready");
    Ok(JobRunner::new(config, Arc::new(db), catalog))
}
