//! Migration descriptors: resolved migrations found in sources and applied
//! migrations recorded in the schema history.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::config::Configuration;
use crate::connection::Connection;
use crate::error::{MigrationError, StrataResult};
use crate::version::MigrationVersion;

/// The kind of a migration or history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationType {
    /// Marker recording the schemas created by the engine.
    #[serde(rename = "SCHEMA")]
    Schema,
    /// Marker recording a baseline.
    #[serde(rename = "BASELINE")]
    Baseline,
    /// Marker recording that a migration was logically removed.
    #[serde(rename = "DELETE", alias = "DELETED")]
    Deleted,
    /// SQL script migration.
    #[serde(rename = "SQL")]
    Sql,
    /// SQL script that represents everything up to its version.
    #[serde(rename = "SQL_BASELINE")]
    SqlBaseline,
    /// Migration implemented in Rust.
    #[serde(rename = "JDBC", alias = "CODE")]
    Code,
    /// Rust migration that represents everything up to its version.
    #[serde(rename = "JDBC_BASELINE", alias = "CODE_BASELINE")]
    CodeBaseline,
}

impl MigrationType {
    /// Name persisted in the history table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "SCHEMA",
            Self::Baseline => "BASELINE",
            Self::Deleted => "DELETE",
            Self::Sql => "SQL",
            Self::SqlBaseline => "SQL_BASELINE",
            Self::Code => "JDBC",
            Self::CodeBaseline => "JDBC_BASELINE",
        }
    }

    /// Synthetic types only ever appear in the history table; resolvers never
    /// produce them.
    pub fn is_exclusive_to_applied_migrations(&self) -> bool {
        matches!(self, Self::Schema | Self::Baseline | Self::Deleted)
    }

    /// Baseline migrations stand in for every version up to their own.
    pub fn is_baseline_migration(&self) -> bool {
        matches!(self, Self::SqlBaseline | Self::CodeBaseline)
    }
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationType {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SCHEMA" => Ok(Self::Schema),
            "BASELINE" => Ok(Self::Baseline),
            "DELETE" | "DELETED" => Ok(Self::Deleted),
            "SQL" => Ok(Self::Sql),
            "SQL_BASELINE" => Ok(Self::SqlBaseline),
            "JDBC" | "CODE" => Ok(Self::Code),
            "JDBC_BASELINE" | "CODE_BASELINE" => Ok(Self::CodeBaseline),
            other => Err(MigrationError::other(format!(
                "Unknown migration type: {}",
                other
            ))),
        }
    }
}

/// Executes a resolved migration against a connection.
#[async_trait::async_trait]
pub trait MigrationExecutor: Send + Sync {
    /// Run the migration.
    async fn execute(
        &self,
        connection: &dyn Connection,
        configuration: &Configuration,
    ) -> StrataResult<()>;

    /// Whether the migration may run inside a transaction.
    fn can_execute_in_transaction(&self) -> bool {
        true
    }
}

/// A migration discovered in the configured sources.
#[derive(Clone)]
pub struct ResolvedMigration {
    /// Version, or `None` for repeatable migrations.
    pub version: Option<MigrationVersion>,
    /// Human-readable description.
    pub description: String,
    /// Script name recorded in the history table.
    pub script: String,
    /// Checksum of the content.
    pub checksum: Option<Checksum>,
    /// Migration type.
    pub migration_type: MigrationType,
    /// Where the migration was found (file path or code identifier).
    pub physical_location: String,
    /// Executor that applies the migration.
    pub executor: Arc<dyn MigrationExecutor>,
}

impl ResolvedMigration {
    /// Check if this migration is repeatable.
    pub fn is_repeatable(&self) -> bool {
        self.version.is_none()
    }

    /// Check if the checksum matches an applied checksum.
    pub fn checksum_matches(&self, other: Option<&Checksum>) -> bool {
        self.checksum.as_ref() == other
    }

    /// Whether the executor allows a transaction around this migration.
    pub fn can_execute_in_transaction(&self) -> bool {
        self.executor.can_execute_in_transaction()
    }
}

impl fmt::Debug for ResolvedMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedMigration")
            .field("version", &self.version)
            .field("description", &self.description)
            .field("script", &self.script)
            .field("checksum", &self.checksum)
            .field("migration_type", &self.migration_type)
            .field("physical_location", &self.physical_location)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ResolvedMigration {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.description == other.description
            && self.script == other.script
            && self.checksum == other.checksum
            && self.migration_type == other.migration_type
            && self.physical_location == other.physical_location
    }
}

/// A row in the schema history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMigration {
    /// Execution order; strictly increasing.
    pub installed_rank: i32,
    /// Version, or `None` for repeatable migrations.
    pub version: Option<MigrationVersion>,
    /// Description at the time of execution.
    pub description: String,
    /// Type of the row.
    #[serde(rename = "type")]
    pub migration_type: MigrationType,
    /// Script name.
    pub script: String,
    /// Checksum at the time of execution.
    pub checksum: Option<Checksum>,
    /// When the row was inserted.
    pub installed_on: DateTime<Utc>,
    /// Database user that ran the migration.
    pub installed_by: String,
    /// Execution time in milliseconds.
    pub execution_time: i32,
    /// Whether the migration succeeded.
    pub success: bool,
}

impl AppliedMigration {
    /// Check if this row belongs to a repeatable migration.
    pub fn is_repeatable(&self) -> bool {
        self.version.is_none()
    }

    /// Check if this row is a synthetic marker.
    pub fn is_synthetic(&self) -> bool {
        self.migration_type.is_exclusive_to_applied_migrations()
    }
}

/// The values needed to append a row to the schema history table.
///
/// The installed rank, timestamp and user are assigned by the history store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppliedMigration {
    /// Version, or `None` for repeatable migrations.
    pub version: Option<MigrationVersion>,
    /// Description.
    pub description: String,
    /// Row type.
    pub migration_type: MigrationType,
    /// Script name.
    pub script: String,
    /// Checksum.
    pub checksum: Option<Checksum>,
    /// Execution time in milliseconds.
    pub execution_time: i32,
    /// Whether the migration succeeded.
    pub success: bool,
}

impl NewAppliedMigration {
    /// Row recording the execution of a resolved migration.
    pub fn executed(resolved: &ResolvedMigration, execution_time: i32, success: bool) -> Self {
        Self {
            version: resolved.version.clone(),
            description: resolved.description.clone(),
            migration_type: resolved.migration_type,
            script: resolved.script.clone(),
            checksum: resolved.checksum,
            execution_time,
            success,
        }
    }

    /// Marker row that logically removes an applied migration.
    pub fn deletion_of(applied: &AppliedMigration) -> Self {
        Self {
            version: applied.version.clone(),
            description: applied.description.clone(),
            migration_type: MigrationType::Deleted,
            script: applied.script.clone(),
            checksum: applied.checksum,
            execution_time: 0,
            success: applied.success,
        }
    }
}
