//! Error types for the processed-data crate.
//!
//! Repositories return `RepositoryError` directly; the store reports failures
//! as `rootcause::Report<ProcessedDataError>`.

use std::fmt;

/// Errors from a processed-data repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The row's key is already present.
    UniqueViolation,
    /// The backend does not implement the operation.
    Unsupported { operation: &'static str },
    /// Any other backend failure.
    Backend { reason: String },
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UniqueViolation => write!(f, "row already exists"),
            Self::Unsupported { operation } => {
                write!(f, "operation not supported by this backend: {operation}")
            }
            Self::Backend { reason } => write!(f, "backend error: {reason}"),
        }
    }
}

impl std::error::Error for RepositoryError {}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::UniqueViolation,
            _ => Self::Backend {
                reason: error.to_string(),
            },
        }
    }
}

impl From<sqlx::migrate::MigrateError> for RepositoryError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::Backend {
            reason: format!("migration failed: {error}"),
        }
    }
}
