//! Error types for the database layer

use thiserror::Error;

/// Error returned by every repository operation
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Database timeout: {0}")]
    Timeout(String),

    #[error("Database query error: {0}")]
    QueryError(String),

    #[error("Database migration error: {0}")]
    MigrationError(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid identifier `{value}` for {field}")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Transaction failed while {step}: {message}")]
    Transaction {
        step: &'static str,
        message: String,
        retryable: bool,
    },

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DatabaseError {
    /// Whether retrying the same call may succeed.
    ///
    /// Only connection-level failures and timeouts qualify; constraint
    /// violations and bad input fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            DatabaseError::ConnectionError(_) | DatabaseError::Timeout(_) => true,
            DatabaseError::Transaction { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    /// Wrap a failure that happened inside a transaction, keeping its retry class.
    pub fn in_transaction(step: &'static str, source: DatabaseError) -> Self {
        match source {
            already @ DatabaseError::Transaction { .. } => already,
            other => DatabaseError::Transaction {
                step,
                retryable: other.is_retryable(),
                message: other.to_string(),
            },
        }
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut => {
                DatabaseError::Timeout("timed out acquiring a pooled connection".to_string())
            }
            sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                DatabaseError::ConnectionError(error.to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                DatabaseError::ConnectionError(error.to_string())
            }
            sqlx::Error::Database(db_error) => {
                let message = db_error.message().to_string();
                if db_error.is_unique_violation() {
                    DatabaseError::Duplicate(message)
                } else if db_error.is_foreign_key_violation() || db_error.is_check_violation() {
                    DatabaseError::ConstraintViolation(message)
                } else if is_busy_code(db_error.code().as_deref()) {
                    DatabaseError::Timeout(message)
                } else {
                    DatabaseError::QueryError(message)
                }
            }
            sqlx::Error::Migrate(migrate_error) => {
                DatabaseError::MigrationError(migrate_error.to_string())
            }
            other => DatabaseError::QueryError(other.to_string()),
        }
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes.
fn is_busy_code(code: Option<&str>) -> bool {
    code.and_then(|value| value.parse::<i32>().ok())
        .map(|value| matches!(value & 0xff, 5 | 6))
        .unwrap_or(false)
}
