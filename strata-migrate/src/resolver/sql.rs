//! SQL script migrations.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{MigrationKind, MigrationName, MigrationResolver, ResourceProvider, collect_resolved};
use crate::callback::Event;
use crate::checksum::Checksum;
use crate::config::Configuration;
use crate::connection::Connection;
use crate::error::{MigrationError, StrataResult};
use crate::migration::{MigrationExecutor, MigrationType, ResolvedMigration};

/// Leading comment that disables the transaction around a script.
const NO_TRANSACTION_DIRECTIVE: &str = "-- strata:no-transaction";

/// Replace `${name}` placeholders.
///
/// Built-in placeholders: `strata:table`, `strata:defaultSchema`.
pub fn replace_placeholders(sql: &str, configuration: &Configuration) -> StrataResult<String> {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| MigrationError::other(e.to_string()))?;

    let mut output = String::with_capacity(sql.len());
    let mut last = 0;
    for cap in re.captures_iter(sql) {
        let (Some(full), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let key = name.as_str();
        let value = match key {
            "strata:table" => configuration.table.clone(),
            "strata:defaultSchema" => configuration
                .effective_default_schema()
                .unwrap_or_default()
                .to_string(),
            _ => configuration.placeholders.get(key).cloned().ok_or_else(|| {
                MigrationError::configuration(format!(
                    "No value provided for placeholder: ${{{}}}. Check the placeholders configuration.",
                    key
                ))
            })?,
        };
        output.push_str(&sql[last..full.start()]);
        output.push_str(&value);
        last = full.end();
    }
    output.push_str(&sql[last..]);
    Ok(output)
}

fn runs_in_transaction(sql: &str) -> bool {
    let first = sql.lines().map(str::trim).find(|l| !l.is_empty());
    !matches!(first, Some(line) if line.eq_ignore_ascii_case(NO_TRANSACTION_DIRECTIVE))
}

/// Runs a SQL script.
#[derive(Debug, Clone)]
struct SqlMigrationExecutor {
    sql: String,
    transactional: bool,
}

#[async_trait::async_trait]
impl MigrationExecutor for SqlMigrationExecutor {
    async fn execute(
        &self,
        connection: &dyn Connection,
        configuration: &Configuration,
    ) -> StrataResult<()> {
        let sql = if configuration.placeholder_replacement {
            replace_placeholders(&self.sql, configuration)?
        } else {
            self.sql.clone()
        };
        connection.execute_script(&sql).await
    }

    fn can_execute_in_transaction(&self) -> bool {
        self.transactional
    }
}

/// Resolves SQL scripts from a resource provider.
#[derive(Clone)]
pub struct SqlMigrationResolver {
    provider: Arc<dyn ResourceProvider>,
}

impl SqlMigrationResolver {
    /// Create a resolver over a resource provider.
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl MigrationResolver for SqlMigrationResolver {
    async fn resolve(&self, configuration: &Configuration) -> StrataResult<Vec<ResolvedMigration>> {
        let suffixes = &configuration.sql_migration_suffixes;
        let resources = self.provider.resources("", suffixes).await?;

        let mut migrations = Vec::new();
        let mut invalid_names = Vec::new();
        for resource in resources {
            let is_callback = suffixes
                .iter()
                .find_map(|s| resource.filename.strip_suffix(s.as_str()))
                .and_then(Event::from_file_stem)
                .is_some();
            if is_callback {
                continue;
            }

            let name = match MigrationName::parse(&resource.filename, configuration, suffixes) {
                Ok(Some(name)) => name,
                Ok(None) => {
                    debug!(file = %resource.physical_location, "Skipping non-migration file");
                    continue;
                }
                Err(e) => {
                    if configuration.validate_migration_naming {
                        invalid_names.push(e.to_string());
                    } else {
                        warn!(file = %resource.physical_location, error = %e, "Skipping file with invalid migration name");
                    }
                    continue;
                }
            };

            let migration_type = match name.kind {
                MigrationKind::Baseline => MigrationType::SqlBaseline,
                MigrationKind::Versioned | MigrationKind::Repeatable => MigrationType::Sql,
            };
            migrations.push(ResolvedMigration {
                version: name.version,
                description: name.description,
                checksum: Some(Checksum::of_lines(&resource.content)),
                migration_type,
                physical_location: resource.physical_location,
                executor: Arc::new(SqlMigrationExecutor {
                    transactional: runs_in_transaction(&resource.content),
                    sql: resource.content,
                }),
                script: resource.filename,
            });
        }

        if !invalid_names.is_empty() {
            return Err(MigrationError::InvalidMigrationName(invalid_names.join("\n")));
        }
        collect_resolved(migrations)
    }
}
