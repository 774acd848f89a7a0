//! Serializable operation results.

use serde::{Deserialize, Serialize};

use crate::error::ErrorDetails;
use crate::info::{MigrationInfo, MigrationInfoService};
use crate::validation::InvalidMigration;

/// Engine version recorded in results.
pub const STRATA_VERSION: &str = env!("CARGO_PKG_VERSION");

fn category(info: &MigrationInfo) -> String {
    if info.is_repeatable() {
        "Repeatable".to_string()
    } else {
        "Versioned".to_string()
    }
}

fn version_text(info: &MigrationInfo) -> String {
    info.version().map(|v| v.to_string()).unwrap_or_default()
}

/// One applied migration in a [`MigrateResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateOutput {
    pub category: String,
    pub version: String,
    pub description: String,
    #[serde(rename = "type")]
    pub migration_type: String,
    pub file_path: String,
    pub execution_time: i32,
}

impl MigrateOutput {
    pub(crate) fn from_info(info: &MigrationInfo, execution_time: i32) -> Self {
        Self {
            category: category(info),
            version: version_text(info),
            description: info.description().to_string(),
            migration_type: info.migration_type().to_string(),
            file_path: info.physical_location().to_string(),
            execution_time,
        }
    }
}

/// Result of `migrate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateResult {
    pub strata_version: String,
    pub database: String,
    pub operation: String,
    pub warnings: Vec<String>,
    pub initial_schema_version: Option<String>,
    pub target_schema_version: Option<String>,
    pub schema_name: Option<String>,
    pub migrations: Vec<MigrateOutput>,
    pub migrations_executed: usize,
    pub success: bool,
}

impl MigrateResult {
    pub(crate) fn new(database: impl Into<String>, schema_name: Option<String>) -> Self {
        Self {
            strata_version: STRATA_VERSION.to_string(),
            database: database.into(),
            operation: "migrate".to_string(),
            warnings: Vec::new(),
            initial_schema_version: None,
            target_schema_version: None,
            schema_name,
            migrations: Vec::new(),
            migrations_executed: 0,
            success: true,
        }
    }

    /// Total execution time of the applied migrations, in milliseconds.
    pub fn total_execution_time(&self) -> i64 {
        self.migrations.iter().map(|m| m.execution_time as i64).sum()
    }
}

/// Result of `validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResult {
    pub strata_version: String,
    pub database: String,
    pub operation: String,
    pub warnings: Vec<String>,
    pub error_details: Option<ErrorDetails>,
    pub invalid_migrations: Vec<InvalidMigration>,
    pub validation_successful: bool,
    pub validate_count: usize,
}

impl ValidateResult {
    pub(crate) fn new(
        database: impl Into<String>,
        invalid_migrations: Vec<InvalidMigration>,
        validate_count: usize,
        warnings: Vec<String>,
    ) -> Self {
        let validation_successful = invalid_migrations.is_empty();
        let error_details = if validation_successful {
            None
        } else {
            Some(ErrorDetails::new(
                crate::error::ErrorCode::ValidateError,
                "Migrations have failed validation",
            ))
        };
        Self {
            strata_version: STRATA_VERSION.to_string(),
            database: database.into(),
            operation: "validate".to_string(),
            warnings,
            error_details,
            invalid_migrations,
            validation_successful,
            validate_count,
        }
    }

    /// All violations joined into one message.
    pub fn error_message(&self) -> String {
        let mut message = String::new();
        for invalid in &self.invalid_migrations {
            message.push_str(&invalid.error_details.error_message);
            message.push('\n');
        }
        message
    }
}

/// Result of `baseline`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineResult {
    pub strata_version: String,
    pub database: String,
    pub operation: String,
    pub warnings: Vec<String>,
    pub successfully_baselined: bool,
    pub baseline_version: Option<String>,
}

impl BaselineResult {
    pub(crate) fn new(database: impl Into<String>) -> Self {
        Self {
            strata_version: STRATA_VERSION.to_string(),
            database: database.into(),
            operation: "baseline".to_string(),
            warnings: Vec::new(),
            successfully_baselined: false,
            baseline_version: None,
        }
    }
}

/// One affected migration in a [`RepairResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairOutput {
    pub version: String,
    pub description: String,
    pub file_path: String,
}

impl RepairOutput {
    pub(crate) fn from_info(info: &MigrationInfo) -> Self {
        Self {
            version: version_text(info),
            description: info.description().to_string(),
            file_path: info.physical_location().to_string(),
        }
    }
}

/// Result of `repair`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairResult {
    pub strata_version: String,
    pub database: String,
    pub operation: String,
    pub warnings: Vec<String>,
    pub repair_actions: Vec<String>,
    pub migrations_removed: Vec<RepairOutput>,
    pub migrations_deleted: Vec<RepairOutput>,
    pub migrations_aligned: Vec<RepairOutput>,
}

impl RepairResult {
    /// Create an empty result.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            strata_version: STRATA_VERSION.to_string(),
            database: database.into(),
            operation: "repair".to_string(),
            warnings: Vec::new(),
            repair_actions: Vec::new(),
            migrations_removed: Vec::new(),
            migrations_deleted: Vec::new(),
            migrations_aligned: Vec::new(),
        }
    }

    /// Record a repair action once.
    pub(crate) fn add_action(&mut self, action: &str) {
        if !self.repair_actions.iter().any(|a| a == action) {
            self.repair_actions.push(action.to_string());
        }
    }
}

/// One entry in an [`InfoResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoOutput {
    pub category: String,
    pub version: String,
    pub description: String,
    #[serde(rename = "type")]
    pub migration_type: String,
    pub installed_on: Option<String>,
    pub installed_by: Option<String>,
    pub state: String,
    pub file_path: String,
    pub installed_rank: Option<i32>,
    pub execution_time: Option<i32>,
}

/// Result of `info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResult {
    pub strata_version: String,
    pub database: String,
    pub operation: String,
    pub warnings: Vec<String>,
    pub schema_version: Option<String>,
    pub schema_name: Option<String>,
    pub migrations: Vec<InfoOutput>,
}

impl InfoResult {
    /// Summarize an info service.
    pub fn from_service(
        service: &MigrationInfoService,
        database: impl Into<String>,
        schema_name: Option<String>,
    ) -> Self {
        let migrations = service
            .all()
            .iter()
            .map(|info| InfoOutput {
                category: category(info),
                version: version_text(info),
                description: info.description().to_string(),
                migration_type: info.migration_type().to_string(),
                installed_on: info.installed_on().map(|t| t.to_rfc3339()),
                installed_by: info.installed_by().map(str::to_string),
                state: info.state().display_name().to_string(),
                file_path: info.physical_location().to_string(),
                installed_rank: info.installed_rank(),
                execution_time: info.execution_time(),
            })
            .collect();
        Self {
            strata_version: STRATA_VERSION.to_string(),
            database: database.into(),
            operation: "info".to_string(),
            warnings: Vec::new(),
            schema_version: service
                .current()
                .and_then(|c| c.version())
                .map(|v| v.to_string()),
            schema_name,
            migrations,
        }
    }
}

/// Result handed to operation-finish callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OperationResult {
    Migrate(MigrateResult),
    Validate(ValidateResult),
    Baseline(BaselineResult),
    Repair(RepairResult),
    Info(InfoResult),
}

impl OperationResult {
    /// Operation name.
    pub fn operation(&self) -> &str {
        match self {
            Self::Migrate(r) => &r.operation,
            Self::Validate(r) => &r.operation,
            Self::Baseline(r) => &r.operation,
            Self::Repair(r) => &r.operation,
            Self::Info(r) => &r.operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::info::InfoSettings;
    use crate::navigable::tests::{applied, resolved};

    #[test]
    fn test_info_result_summary() {
        let resolved = vec![resolved(Some("1"), "init"), resolved(Some("2"), "users")];
        let applied = vec![applied(1, Some("1"), "init", true)];
        let service = MigrationInfoService::new(&resolved, &applied, &InfoSettings::default()).unwrap();

        let result = InfoResult::from_service(&service, "sqlite", Some("main".to_string()));
        assert_eq!(result.schema_version.as_deref(), Some("1"));
        assert_eq!(result.migrations.len(), 2);
        assert_eq!(result.migrations[0].state, "Success");
        assert_eq!(result.migrations[1].state, "Pending");
        assert_eq!(result.migrations[1].migration_type, "SQL");
        assert!(result.migrations[1].installed_on.is_none());
    }

    #[test]
    fn test_validate_result_message() {
        let ok = ValidateResult::new("sqlite", Vec::new(), 3, Vec::new());
        assert!(ok.validation_successful);
        assert!(ok.error_details.is_none());

        let invalid = InvalidMigration {
            version: Some("1".to_string()),
            description: "init".to_string(),
            file_path: "db/migration/V1__init.sql".to_string(),
            error_details: ErrorDetails::new(crate::error::ErrorCode::ChecksumMismatch, "checksum differs"),
        };
        let failed = ValidateResult::new("sqlite", vec![invalid], 3, Vec::new());
        assert!(!failed.validation_successful);
        assert_eq!(failed.error_message(), "checksum differs\n");
    }

    #[test]
    fn test_serialized_shape() {
        let mut result = RepairResult::new("sqlite");
        result.add_action("REMOVED_FAILED_MIGRATIONS");
        result.add_action("REMOVED_FAILED_MIGRATIONS");
        let json = serde_json::to_value(OperationResult::Repair(result)).unwrap();
        assert_eq!(json["kind"], "repair");
        assert_eq!(json["repairActions"].as_array().map(Vec::len), Some(1));
    }
}
