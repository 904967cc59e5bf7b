//! Persistence layer: SQLite schema, bulk loads and writes for the tick jobs,
//! job locks, and run bookkeeping.

pub mod cache;
pub mod error;
pub mod loader;
pub mod lock;
pub mod persister;
pub mod seed;
pub mod task_runs;

pub use error::{FailureClass, StoreError};
pub use loader::{BulkStateLoader, Scope};
pub use lock::{JobLock, LockCoordinator};
pub use persister::{persist, PersistSummary, ProvinceColumn, WritePlan};
pub use task_runs::{RunStatus, TaskRun};

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{info, warn};

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Returns the default SQLite URL used for local saves.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/economy.db"
}

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn open_pool(url: &str, max_connections: u32) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Open a pool and bring the schema up to date.
pub async fn init_db(url: &str) -> Result<SqlitePool, StoreError> {
    let pool = open_pool(url, 4).await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

/// A connection pool that can be rebuilt after a connection-class failure.
pub struct Database {
    url: String,
    max_connections: u32,
    pool: RwLock<SqlitePool>,
    generation: AtomicU64,
}

impl Database {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = open_pool(url, max_connections).await?;
        Ok(Self {
            url: url.to_string(),
            max_connections,
            pool: RwLock::new(pool),
            generation: AtomicU64::new(0),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// A handle to the current pool.
    pub fn pool(&self) -> SqlitePool {
        match self.pool.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of times the pool has been rebuilt.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool()).await?;
        Ok(())
    }

    /// Replace the pool with a fresh one and close the old.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let fresh = open_pool(&self.url, self.max_connections).await?;
        let old = match self.pool.write() {
            Ok(mut guard) => std::mem::replace(&mut *guard, fresh),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), fresh),
        };
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(generation, "database pool reset");
        old.close().await;
        info!(generation, "previous pool closed");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use tempfile::TempDir;

    /// A migrated database in a throwaway directory.
    pub async fn temp_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        let db = Database::connect(&url, 4).await.unwrap();
        db.migrate().await.unwrap();
        (db, dir)
    }
}
