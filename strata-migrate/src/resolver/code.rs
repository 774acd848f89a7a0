//! Migrations implemented in Rust.

use std::sync::Arc;

use super::{MigrationKind, MigrationName, MigrationResolver, collect_resolved};
use crate::checksum::Checksum;
use crate::config::Configuration;
use crate::connection::Connection;
use crate::error::{MigrationError, StrataResult};
use crate::migration::{MigrationExecutor, MigrationType, ResolvedMigration};

/// A migration written in Rust.
///
/// The name follows the SQL naming convention without a suffix, e.g.
/// `V3__Seed_reference_data` or `R__Refresh_caches`.
///
/// ```rust,ignore
/// struct SeedCountries;
///
/// #[async_trait::async_trait]
/// impl CodeMigration for SeedCountries {
///     fn name(&self) -> &str {
///         "V3__Seed_countries"
///     }
///
///     async fn migrate(&self, connection: &dyn Connection) -> StrataResult<()> {
///         connection
///             .execute("INSERT INTO countries (code) VALUES (?)", &["NL".into()])
///             .await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait CodeMigration: Send + Sync {
    /// Migration name.
    fn name(&self) -> &str;

    /// Checksum recorded in the history, if any.
    fn checksum(&self) -> Option<Checksum> {
        None
    }

    /// Whether the migration may run inside a transaction.
    fn can_execute_in_transaction(&self) -> bool {
        true
    }

    /// Apply the migration.
    async fn migrate(&self, connection: &dyn Connection) -> StrataResult<()>;
}

/// Supplies code migrations.
pub trait CodeMigrationProvider: Send + Sync {
    /// All code migrations.
    fn migrations(&self) -> Vec<Arc<dyn CodeMigration>>;
}

/// A fixed list of code migrations.
#[derive(Clone, Default)]
pub struct StaticCodeMigrationProvider {
    migrations: Vec<Arc<dyn CodeMigration>>,
}

impl StaticCodeMigrationProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a migration.
    pub fn with(mut self, migration: Arc<dyn CodeMigration>) -> Self {
        self.migrations.push(migration);
        self
    }
}

impl CodeMigrationProvider for StaticCodeMigrationProvider {
    fn migrations(&self) -> Vec<Arc<dyn CodeMigration>> {
        self.migrations.clone()
    }
}

struct CodeMigrationExecutor {
    migration: Arc<dyn CodeMigration>,
}

#[async_trait::async_trait]
impl MigrationExecutor for CodeMigrationExecutor {
    async fn execute(&self, connection: &dyn Connection, _: &Configuration) -> StrataResult<()> {
        self.migration.migrate(connection).await
    }

    fn can_execute_in_transaction(&self) -> bool {
        self.migration.can_execute_in_transaction()
    }
}

/// Resolves code migrations from a provider.
#[derive(Clone)]
pub struct CodeMigrationResolver {
    provider: Arc<dyn CodeMigrationProvider>,
}

impl CodeMigrationResolver {
    /// Create a resolver over a provider.
    pub fn new(provider: Arc<dyn CodeMigrationProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl MigrationResolver for CodeMigrationResolver {
    async fn resolve(&self, configuration: &Configuration) -> StrataResult<Vec<ResolvedMigration>> {
        let mut migrations = Vec::new();
        for migration in self.provider.migrations() {
            let name = MigrationName::parse(migration.name(), configuration, &[])?.ok_or_else(|| {
                MigrationError::InvalidMigrationName(format!(
                    "{}: code migration names must start with a migration prefix",
                    migration.name()
                ))
            })?;
            let migration_type = match name.kind {
                MigrationKind::Baseline => MigrationType::CodeBaseline,
                MigrationKind::Versioned | MigrationKind::Repeatable => MigrationType::Code,
            };
            migrations.push(ResolvedMigration {
                version: name.version,
                description: name.description,
                script: migration.name().to_string(),
                checksum: migration.checksum(),
                migration_type,
                physical_location: format!("code:{}", migration.name()),
                executor: Arc::new(CodeMigrationExecutor {
                    migration: Arc::clone(&migration),
                }),
            });
        }
        collect_resolved(migrations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait::async_trait]
    impl CodeMigration for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn can_execute_in_transaction(&self) -> bool {
            !self.0.contains("Concurrent")
        }

        async fn migrate(&self, _: &dyn Connection) -> StrataResult<()> {
            Ok(())
        }
    }

    fn resolver(names: &[&'static str]) -> CodeMigrationResolver {
        let provider = names
            .iter()
            .fold(StaticCodeMigrationProvider::new(), |p, n| p.with(Arc::new(Named(*n))));
        CodeMigrationResolver::new(Arc::new(provider))
    }

    #[tokio::test]
    async fn test_resolves_code_migrations() {
        let migrations = resolver(&["V2__Seed_data", "B1__Snapshot", "R__Warm_cache", "V3__Concurrent_index"])
            .resolve(&Configuration::default())
            .await
            .unwrap();
        assert_eq!(migrations.len(), 4);
        assert_eq!(migrations[0].migration_type, MigrationType::CodeBaseline);
        assert_eq!(migrations[1].description, "Seed data");
        assert_eq!(migrations[1].physical_location, "code:V2__Seed_data");
        assert!(!migrations[2].can_execute_in_transaction());
        assert!(migrations[3].is_repeatable());
    }

    #[tokio::test]
    async fn test_rejects_unprefixed_names() {
        let err = resolver(&["SeedData"])
            .resolve(&Configuration::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidMigrationName(_)));
    }
}
