//! Engine configuration. Every field has a default, so an empty file (or no
//! file) is a valid configuration.

use crate::JobError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: persistence::default_sqlite_url().to_string(),
            max_connections: 4,
        }
    }
}

/// Backoff for transient storage failures. `max_retries` counts retries after
/// the first attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Locks older than this belong to a crashed worker and may be taken over.
    pub stale_after_secs: u64,
    /// Lock holder name; defaults to host and process id.
    pub holder: Option<String>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 3_600,
            holder: None,
        }
    }
}

/// When a job fires and how close together two accepted runs may be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSchedule {
    /// Minute past each hour.
    pub minute: u32,
    pub min_interval_secs: u64,
}

impl JobSchedule {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub tax_income: JobSchedule,
    pub province_revenue: JobSchedule,
    pub population_growth: JobSchedule,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            tax_income: JobSchedule {
                minute: 0,
                min_interval_secs: 60,
            },
            province_revenue: JobSchedule {
                minute: 25,
                min_interval_secs: 60,
            },
            population_growth: JobSchedule {
                minute: 45,
                min_interval_secs: 60,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// A job whose last success is older than this is stale.
    pub stale_after_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 2 * 3_600,
        }
    }
}

/// Top-level configuration for workers and the CLI.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    /// Catalog file; the embedded standard catalog when absent.
    pub catalog_path: Option<PathBuf>,
    pub retry: RetryPolicy,
    pub lock: LockConfig,
    pub jobs: JobsConfig,
    pub health: HealthConfig,
    /// Lifetime of cached per-nation snapshots used by read projections.
    pub snapshot_ttl_secs: u64,
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, JobError> {
        let config: EngineConfig = serde_yaml::from_str(text)
            .map_err(|e| JobError::Config(format!("parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, JobError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| JobError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    /// Load from `path` (or defaults) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, JobError> {
        let config = match path {
            Some(p) => Self::from_path(p)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides(std::env::var("DATABASE_URL").ok()))
    }

    pub fn with_env_overrides(mut self, database_url: Option<String>) -> Self {
        if let Some(url) = database_url.filter(|u| !u.is_empty()) {
            self.database.url = url;
        }
        self
    }

    pub fn validate(&self) -> Result<(), JobError> {
        for (name, s) in [
            ("tax_income", self.jobs.tax_income),
            ("province_revenue", self.jobs.province_revenue),
            ("population_growth", self.jobs.population_growth),
        ] {
            if s.minute >= 60 {
                return Err(JobError::Config(format!("{name}: minute must be < 60")));
            }
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(JobError::Config("retry: base delay exceeds max delay".into()));
        }
        Ok(())
    }

    pub fn lock_holder(&self) -> String {
        self.lock.holder.clone().unwrap_or_else(|| {
            let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
            format!("{host}:{}", std::process::id())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_is_all_defaults() {
        let config = EngineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.jobs.province_revenue.minute, 25);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let config = EngineConfig::from_yaml_str(
            "retry:\n  max_retries: 7\njobs:\n  tax_income: { minute: 5, min_interval_secs: 30 }\n",
        )
        .unwrap();
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(config.jobs.tax_income.minute, 5);
        assert_eq!(config.jobs.population_growth.minute, 45);
    }

    #[test]
    fn database_url_override_wins() {
        let config = EngineConfig::default().with_env_overrides(Some("sqlite://x.db".into()));
        assert_eq!(config.database.url, "sqlite://x.db");
        let config = EngineConfig::default().with_env_overrides(Some(String::new()));
        assert_eq!(config.database.url, persistence::default_sqlite_url());
    }

    #[test]
    fn out_of_range_minute_is_rejected() {
        let err = EngineConfig::from_yaml_str(
            "jobs:\n  population_growth: { minute: 61, min_interval_secs: 30 }\n",
        );
        assert!(matches!(err, Err(JobError::Config(_))));
    }
}
