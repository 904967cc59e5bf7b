//! Storage errors and how the job runner should treat them.

use thiserror::Error;

/// Errors raised by the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    /// A concurrent writer moved a value the tick wrote as a delta.
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("invalid stored data: {0}")]
    Invalid(String),
}

/// How a failed attempt should be handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Lock timeouts, deadlocks, serialization failures, write conflicts.
    Contention,
    /// Lost or unusable connections; the pool is rebuilt before retrying.
    Connection,
    Fatal,
}

// SQLite primary and extended result codes (BUSY, LOCKED and their variants)
// plus Postgres deadlock, serialization and lock-not-available codes.
const CONTENTION_CODES: &[&str] = &[
    "5", "6", "261", "262", "517", "773", "40P01", "40001", "55P03",
];

/// SQLite codes for a failed constraint: primary and the CHECK extended code.
pub(crate) const SQLITE_CONSTRAINT: &str = "19";
pub(crate) const SQLITE_CONSTRAINT_CHECK: &str = "275";

impl StoreError {
    pub fn class(&self) -> FailureClass {
        match self {
            StoreError::Conflict(_) => FailureClass::Contention,
            StoreError::Sqlx(err) => classify_sqlx(err),
            StoreError::Migrate(_) | StoreError::Invalid(_) => FailureClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() != FailureClass::Fatal
    }
}

fn classify_sqlx(err: &sqlx::Error) -> FailureClass {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Protocol(_) => FailureClass::Connection,
        sqlx::Error::Database(db) => match db.code() {
            Some(code) if CONTENTION_CODES.contains(&code.as_ref()) => FailureClass::Contention,
            _ => FailureClass::Fatal,
        },
        _ => FailureClass::Fatal,
    }
}

/// The database code of an error, if it carries one.
pub(crate) fn db_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failures_are_retryable() {
        let err = StoreError::Sqlx(sqlx::Error::PoolTimedOut);
        assert_eq!(err.class(), FailureClass::Connection);
        assert!(err.is_retryable());
    }

    #[test]
    fn conflicts_count_as_contention() {
        let err = StoreError::Conflict("nation 3 money".into());
        assert_eq!(err.class(), FailureClass::Contention);
    }

    #[test]
    fn everything_else_is_fatal() {
        assert_eq!(
            StoreError::Sqlx(sqlx::Error::RowNotFound).class(),
            FailureClass::Fatal
        );
        assert!(!StoreError::Invalid("bad".into()).is_retryable());
    }
}
