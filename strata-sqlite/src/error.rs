//! Error types for SQLite operations.

use strata_migrate::MigrationError;
use thiserror::Error;

/// Result type for SQLite operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Error type for SQLite operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite driver error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation SQLite cannot perform.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl SqliteError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an unsupported operation error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Extended SQLite result code, if the driver reported one.
    pub fn extended_code(&self) -> Option<i32> {
        self.failure().map(|e| e.extended_code)
    }

    /// Check if the database was busy or locked by another connection.
    pub fn is_busy(&self) -> bool {
        self.failure().is_some_and(|e| {
            matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
        })
    }

    fn failure(&self) -> Option<&rusqlite::ffi::Error> {
        match self {
            Self::Sqlite(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))) => {
                Some(e)
            }
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for SqliteError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(tokio_rusqlite::Error::Rusqlite(err))
    }
}

impl From<SqliteError> for MigrationError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Config(msg) => MigrationError::configuration(msg),
            SqliteError::Unsupported(msg) => MigrationError::database(msg),
            SqliteError::Sqlite(_) => {
                let message = err.to_string();
                let code = err.extended_code().map(|c| c.to_string());
                let transient = err.is_busy();
                MigrationError::database_with_source(message, code, transient, err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: i32) -> SqliteError {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None).into()
    }

    #[test]
    fn test_busy_errors_are_transient() {
        let err: MigrationError = failure(rusqlite::ffi::SQLITE_BUSY).into();
        assert!(err.is_transient());

        let err: MigrationError = failure(rusqlite::ffi::SQLITE_LOCKED).into();
        assert!(err.is_transient());

        let err: MigrationError = failure(rusqlite::ffi::SQLITE_CONSTRAINT).into();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_config_errors_map_to_configuration() {
        let err: MigrationError = SqliteError::config("bad path").into();
        assert!(matches!(err, MigrationError::Configuration(_)));
        assert!(err.to_string().contains("bad path"));
    }
}
