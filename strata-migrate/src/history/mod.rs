//! The schema history store.

mod table;

use std::time::Duration;

pub use table::TableSchemaHistory;

use crate::dialect::HistoryTable;
use crate::error::StrataResult;
use crate::migration::{AppliedMigration, MigrationType, NewAppliedMigration, ResolvedMigration};
use crate::results::RepairResult;
use crate::validation::MigrationPattern;
use crate::version::MigrationVersion;

/// Description of the schema creation marker.
pub const SCHEMA_MARKER_DESCRIPTION: &str = "<< Strata Schema Creation >>";

/// Description stored when the dialect rejects empty descriptions.
pub const EMPTY_DESCRIPTION: &str = "<< no description >>";

/// Version and description of a baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineMarker {
    pub version: MigrationVersion,
    pub description: String,
}

impl BaselineMarker {
    /// Create a baseline marker.
    pub fn new(version: MigrationVersion, description: impl Into<String>) -> Self {
        Self {
            version,
            description: description.into(),
        }
    }

    /// Check if a history row records this baseline.
    pub fn matches(&self, applied: &AppliedMigration) -> bool {
        applied.version.as_ref() == Some(&self.version) && applied.description == self.description
    }
}

/// Retry policy for creating the history table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Create a retry policy with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of attempts.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the delay between attempts.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Persistent, ordered log of applied migrations.
#[async_trait::async_trait]
pub trait SchemaHistory: Send + Sync {
    /// Display name of the history table.
    fn table_name(&self) -> String;

    /// Check if the history table exists. Never cached.
    async fn exists(&self) -> StrataResult<bool>;

    /// Create the history table, optionally with a baseline row.
    ///
    /// Does nothing when the table already exists.
    async fn create(&self, baseline: Option<&BaselineMarker>) -> StrataResult<()>;

    /// Create the table with a copy of every row of `legacy`, keeping ranks
    /// and audit columns, and return the number of rows copied.
    ///
    /// Either both happen or neither does. Does nothing when the table
    /// already exists.
    async fn create_from_legacy(&self, legacy: &HistoryTable) -> StrataResult<u64>;

    /// Take the history lock. Reentrant within one store.
    async fn lock(&self) -> StrataResult<()>;

    /// Release the history lock.
    async fn unlock(&self) -> StrataResult<()>;

    /// All rows, ordered by installed rank.
    async fn all_applied_migrations(&self) -> StrataResult<Vec<AppliedMigration>>;

    /// Append a row with the next installed rank.
    async fn add_applied_migration(&self, migration: NewAppliedMigration) -> StrataResult<()>;

    /// Delete failed rows, restricted to `filter` when non-empty.
    ///
    /// Returns `false` when there was nothing to remove.
    async fn remove_failed_migrations(
        &self,
        result: &mut RepairResult,
        filter: &[MigrationPattern],
    ) -> StrataResult<bool>;

    /// Realign description, type and checksum of a row with its resolved
    /// migration.
    async fn update(
        &self,
        applied: &AppliedMigration,
        resolved: &ResolvedMigration,
    ) -> StrataResult<()>;

    /// Mark a row as logically deleted by appending a `DELETE` marker.
    async fn delete(&self, applied: &AppliedMigration) -> StrataResult<()>;

    /// Drop cached rows.
    fn clear_cache(&self);

    /// Check if any row other than a marker exists.
    async fn has_non_synthetic_applied_migrations(&self) -> StrataResult<bool> {
        Ok(self
            .all_applied_migrations()
            .await?
            .iter()
            .any(|am| !am.is_synthetic()))
    }

    /// Check if a schema creation marker exists.
    async fn has_schema_marker(&self) -> StrataResult<bool> {
        Ok(self
            .all_applied_migrations()
            .await?
            .iter()
            .any(|am| am.migration_type == MigrationType::Schema))
    }

    /// The baseline row, if any.
    async fn baseline_marker(&self) -> StrataResult<Option<AppliedMigration>> {
        Ok(self
            .all_applied_migrations()
            .await?
            .into_iter()
            .find(|am| am.migration_type == MigrationType::Baseline))
    }

    /// Check if a baseline row exists.
    async fn has_baseline_marker(&self) -> StrataResult<bool> {
        Ok(self.baseline_marker().await?.is_some())
    }

    /// Append a baseline row.
    async fn add_baseline_marker(&self, marker: &BaselineMarker) -> StrataResult<()> {
        self.add_applied_migration(NewAppliedMigration {
            version: Some(marker.version.clone()),
            description: marker.description.clone(),
            migration_type: MigrationType::Baseline,
            script: marker.description.clone(),
            checksum: None,
            execution_time: 0,
            success: true,
        })
        .await
    }

    /// Append a schema creation marker listing the created schemas.
    async fn add_schema_marker(&self, quoted_schemas: &str) -> StrataResult<()> {
        self.add_applied_migration(NewAppliedMigration {
            version: Some(MigrationVersion::parse("0")?),
            description: SCHEMA_MARKER_DESCRIPTION.to_string(),
            migration_type: MigrationType::Schema,
            script: quoted_schemas.to_string(),
            checksum: None,
            execution_time: 0,
            success: true,
        })
        .await
    }
}
