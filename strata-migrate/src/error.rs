//! Error types for the migration engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for migration operations.
pub type StrataResult<T> = Result<T, MigrationError>;

/// Boxed error used to preserve low-level causes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable, machine-readable error codes.
///
/// Codes are carried by fatal errors and by validation violations so that
/// callers can react without matching on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Configuration,
    TargetNotFound,
    InvalidVersion,
    InvalidChecksum,
    SchemaHistoryCorrupted,
    DbError,
    UnableToCreateHistory,
    UnableToInsertRow,
    NonEmptySchemaWithoutHistory,
    FailedMigration,
    ValidateError,
    DuplicateMigration,
    InvalidMigrationName,
    BaselineConflict,
    LockFailed,
    Callback,
    Io,
    // Validation violations
    ChecksumMismatch,
    DescriptionMismatch,
    TypeMismatch,
    FailedVersionedMigration,
    FailedRepeatableMigration,
    AppliedVersionedMigrationNotResolved,
    AppliedRepeatableMigrationNotResolved,
    ResolvedVersionedMigrationNotApplied,
    ResolvedRepeatableMigrationNotApplied,
    OutdatedRepeatableMigration,
    FutureMigration,
    Other,
}

impl ErrorCode {
    /// Get the code as it appears in serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "CONFIGURATION",
            Self::TargetNotFound => "TARGET_NOT_FOUND",
            Self::InvalidVersion => "INVALID_VERSION",
            Self::InvalidChecksum => "INVALID_CHECKSUM",
            Self::SchemaHistoryCorrupted => "SCHEMA_HISTORY_CORRUPTED",
            Self::DbError => "DB_ERROR",
            Self::UnableToCreateHistory => "UNABLE_TO_CREATE_HISTORY",
            Self::UnableToInsertRow => "UNABLE_TO_INSERT_ROW",
            Self::NonEmptySchemaWithoutHistory => "NON_EMPTY_SCHEMA_WITHOUT_HISTORY",
            Self::FailedMigration => "FAILED_MIGRATION",
            Self::ValidateError => "VALIDATE_ERROR",
            Self::DuplicateMigration => "DUPLICATE_MIGRATION",
            Self::InvalidMigrationName => "INVALID_MIGRATION_NAME",
            Self::BaselineConflict => "BASELINE_CONFLICT",
            Self::LockFailed => "LOCK_FAILED",
            Self::Callback => "CALLBACK",
            Self::Io => "IO",
            Self::ChecksumMismatch => "CHECKSUM_MISMATCH",
            Self::DescriptionMismatch => "DESCRIPTION_MISMATCH",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::FailedVersionedMigration => "FAILED_VERSIONED_MIGRATION",
            Self::FailedRepeatableMigration => "FAILED_REPEATABLE_MIGRATION",
            Self::AppliedVersionedMigrationNotResolved => {
                "APPLIED_VERSIONED_MIGRATION_NOT_RESOLVED"
            }
            Self::AppliedRepeatableMigrationNotResolved => {
                "APPLIED_REPEATABLE_MIGRATION_NOT_RESOLVED"
            }
            Self::ResolvedVersionedMigrationNotApplied => {
                "RESOLVED_VERSIONED_MIGRATION_NOT_APPLIED"
            }
            Self::ResolvedRepeatableMigrationNotApplied => {
                "RESOLVED_REPEATABLE_MIGRATION_NOT_APPLIED"
            }
            Self::OutdatedRepeatableMigration => "OUTDATED_REPEATABLE_MIGRATION",
            Self::FutureMigration => "FUTURE_MIGRATION",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error code paired with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Stable code.
    pub error_code: ErrorCode,
    /// Message describing the problem.
    pub error_message: String,
}

impl ErrorDetails {
    /// Create new error details.
    pub fn new(error_code: ErrorCode, error_message: impl Into<String>) -> Self {
        Self {
            error_code,
            error_message: error_message.into(),
        }
    }
}

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or conflicting configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The configured target version does not exist.
    #[error("No migration with a target version {0} could be found. Ensure target is specified correctly and the migration exists.")]
    TargetNotFound(String),

    /// A version string could not be parsed.
    #[error("Invalid version '{0}': versions must consist of numeric parts separated by '.' or '_'")]
    InvalidVersion(String),

    /// A checksum string could not be parsed.
    #[error("Invalid checksum '{0}'")]
    InvalidChecksum(String),

    /// The schema history contains contradictory rows.
    #[error("Schema history table corrupted: {0}")]
    Corrupted(String),

    /// Database operation error.
    #[error("Database error: {message}")]
    Database {
        /// Description of the failure.
        message: String,
        /// Vendor error code, if any.
        code: Option<String>,
        /// Whether retrying the statement may succeed.
        transient: bool,
        /// Underlying driver error.
        #[source]
        source: Option<BoxError>,
    },

    /// The schema history table could not be created.
    #[error("Unable to create schema history table {table}")]
    UnableToCreateHistory {
        /// Qualified table name.
        table: String,
        /// Last error observed.
        #[source]
        source: Box<MigrationError>,
    },

    /// A row could not be appended to the schema history table.
    #[error("Unable to insert row for version '{version}' in schema history table {table}")]
    UnableToInsertRow {
        /// Qualified table name.
        table: String,
        /// Version of the row, or an empty string for repeatables.
        version: String,
        /// Underlying error.
        #[source]
        source: Box<MigrationError>,
    },

    /// The target schemas contain objects but no history table exists.
    #[error("Found non-empty schema(s) {0} but no schema history table. Use baseline() or set baseline_on_migrate to true to initialize the schema history table.")]
    NonEmptySchemaWithoutHistory(String),

    /// A failed migration blocks further progress.
    #[error("Schema contains a failed migration to version {version}! Run repair() to remove the failed entry")]
    FailedMigrationPresent {
        /// Version (or description for repeatables) of the failed migration.
        version: String,
    },

    /// A migration failed while executing.
    #[error("Migration {migration} failed")]
    MigrationFailed {
        /// Script or label of the migration.
        migration: String,
        /// Underlying error.
        #[source]
        source: Box<MigrationError>,
    },

    /// Validation reported violations.
    #[error("Validate failed: Migrations have failed validation\n{0}")]
    Validate(String),

    /// Two resolved migrations share a version or description.
    #[error("Found more than one migration with {0}")]
    DuplicateMigration(String),

    /// A migration file name does not follow the naming convention.
    #[error("Invalid migration name: {0}")]
    InvalidMigrationName(String),

    /// Baseline cannot be applied to the current history.
    #[error("Baseline conflict: {0}")]
    BaselineConflict(String),

    /// Lock acquisition failed.
    #[error("Failed to acquire schema history lock on {table}: {source}")]
    LockFailed {
        /// Qualified table name.
        table: String,
        /// Underlying error.
        #[source]
        source: Box<MigrationError>,
    },

    /// A callback failed.
    #[error("Callback for event '{event}' failed: {source}")]
    Callback {
        /// Event identifier.
        event: String,
        /// Error raised by the callback.
        #[source]
        source: Box<MigrationError>,
    },

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

impl MigrationError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a history corruption error.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database {
            message: msg.into(),
            code: None,
            transient: false,
            source: None,
        }
    }

    /// Create a database error that may succeed when retried.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Database {
            message: msg.into(),
            code: None,
            transient: true,
            source: None,
        }
    }

    /// Wrap a driver error, keeping it as the source.
    pub fn database_with_source(
        msg: impl Into<String>,
        code: Option<String>,
        transient: bool,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Database {
            message: msg.into(),
            code,
            transient,
            source: Some(source.into()),
        }
    }

    /// Wrap an error raised while taking the history lock.
    pub fn lock_failed(table: impl Into<String>, source: MigrationError) -> Self {
        Self::LockFailed {
            table: table.into(),
            source: Box::new(source),
        }
    }

    /// Create a baseline conflict error.
    pub fn baseline_conflict(msg: impl Into<String>) -> Self {
        Self::BaselineConflict(msg.into())
    }

    /// Wrap an error raised by a callback.
    pub fn callback(event: impl Into<String>, source: MigrationError) -> Self {
        Self::Callback {
            event: event.into(),
            source: Box::new(source),
        }
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Get the stable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io(_) => ErrorCode::Io,
            Self::Configuration(_) => ErrorCode::Configuration,
            Self::TargetNotFound(_) => ErrorCode::TargetNotFound,
            Self::InvalidVersion(_) => ErrorCode::InvalidVersion,
            Self::InvalidChecksum(_) => ErrorCode::InvalidChecksum,
            Self::Corrupted(_) => ErrorCode::SchemaHistoryCorrupted,
            Self::Database { .. } => ErrorCode::DbError,
            Self::UnableToCreateHistory { .. } => ErrorCode::UnableToCreateHistory,
            Self::UnableToInsertRow { .. } => ErrorCode::UnableToInsertRow,
            Self::NonEmptySchemaWithoutHistory(_) => ErrorCode::NonEmptySchemaWithoutHistory,
            Self::FailedMigrationPresent { .. } | Self::MigrationFailed { .. } => {
                ErrorCode::FailedMigration
            }
            Self::Validate(_) => ErrorCode::ValidateError,
            Self::DuplicateMigration(_) => ErrorCode::DuplicateMigration,
            Self::InvalidMigrationName(_) => ErrorCode::InvalidMigrationName,
            Self::BaselineConflict(_) => ErrorCode::BaselineConflict,
            Self::LockFailed { .. } => ErrorCode::LockFailed,
            Self::Callback { .. } => ErrorCode::Callback,
            Self::Other(_) => ErrorCode::Other,
        }
    }

    /// Check if retrying the failed statement may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database { transient, .. } => *transient,
            Self::LockFailed { source, .. } | Self::Callback { source, .. } => {
                source.is_transient()
            }
            _ => false,
        }
    }

    /// Check if this is a recoverable error.
    pub fn is_recoverable(&self) -> bool {
        self.is_transient() || matches!(self, Self::LockFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::TargetNotFound("4.2".to_string());
        assert!(err.to_string().contains("4.2"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            MigrationError::corrupted("two schema markers").code(),
            ErrorCode::SchemaHistoryCorrupted
        );
        assert_eq!(
            MigrationError::FailedMigrationPresent {
                version: "2".to_string()
            }
            .code(),
            ErrorCode::FailedMigration
        );
        assert_eq!(ErrorCode::ChecksumMismatch.to_string(), "CHECKSUM_MISMATCH");
    }

    #[test]
    fn test_is_recoverable() {
        assert!(MigrationError::transient("database is locked").is_recoverable());
        assert!(
            MigrationError::lock_failed("h", MigrationError::database("timeout")).is_recoverable()
        );
        assert!(!MigrationError::database("syntax error").is_recoverable());
    }

    #[test]
    fn test_source_is_preserved() {
        use std::error::Error;

        let io = std::io::Error::other("disk full");
        let err = MigrationError::database_with_source("write failed", None, false, io);
        assert_eq!(err.source().map(|s| s.to_string()), Some("disk full".to_string()));

        let wrapped = MigrationError::UnableToInsertRow {
            table: "\"strata_schema_history\"".to_string(),
            version: "1".to_string(),
            source: Box::new(err),
        };
        assert!(wrapped.source().is_some());
        assert_eq!(wrapped.code(), ErrorCode::UnableToInsertRow);
    }

    #[test]
    fn test_wrapped_errors_keep_cause() {
        use std::error::Error;

        let busy = MigrationError::database_with_source(
            "database is locked",
            Some("5".to_string()),
            true,
            std::io::Error::other("SQLITE_BUSY"),
        );
        let err = MigrationError::lock_failed("main.strata_schema_history", busy);
        assert!(err.is_transient());
        assert_eq!(err.code(), ErrorCode::LockFailed);
        let cause = err.source().unwrap();
        assert_eq!(cause.to_string(), "Database error: database is locked");
        assert_eq!(
            cause.source().map(|s| s.to_string()),
            Some("SQLITE_BUSY".to_string())
        );

        let err = MigrationError::callback("afterMigrate", MigrationError::database("no such table"));
        assert!(!err.is_transient());
        assert_eq!(err.code(), ErrorCode::Callback);
        assert!(err.to_string().contains("no such table"));
        match err.source().and_then(|s| s.downcast_ref::<MigrationError>()) {
            Some(MigrationError::Database { code, .. }) => assert_eq!(*code, None),
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_error_code_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::AppliedVersionedMigrationNotResolved).unwrap();
        assert_eq!(json, "\"APPLIED_VERSIONED_MIGRATION_NOT_RESOLVED\"");
    }
}
