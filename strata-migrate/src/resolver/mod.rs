//! Migration resolution.
//!
//! Resolvers turn migration sources into [`ResolvedMigration`]s:
//!
//! - [`SqlMigrationResolver`] reads `V1__init.sql`, `B5__snapshot.sql` and
//!   `R__views.sql` style scripts from a [`ResourceProvider`].
//! - [`CodeMigrationResolver`] wraps Rust implementations of [`CodeMigration`].
//! - [`CompositeMigrationResolver`] merges them into one sorted,
//!   duplicate-free list.

mod code;
mod resource;
mod sql;

use std::sync::Arc;

pub use code::{CodeMigration, CodeMigrationProvider, CodeMigrationResolver, StaticCodeMigrationProvider};
pub use resource::{FileSystemResourceProvider, Resource, ResourceProvider, StaticResourceProvider};
pub use sql::{SqlMigrationResolver, replace_placeholders};

use crate::config::Configuration;
use crate::error::{MigrationError, StrataResult};
use crate::migration::ResolvedMigration;
use crate::version::MigrationVersion;

/// Produces resolved migrations from a source.
#[async_trait::async_trait]
pub trait MigrationResolver: Send + Sync {
    /// Resolve every migration of this source.
    async fn resolve(&self, configuration: &Configuration) -> StrataResult<Vec<ResolvedMigration>>;
}

/// Kind of migration encoded in a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationKind {
    Versioned,
    Baseline,
    Repeatable,
}

/// A migration name split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationName {
    pub kind: MigrationKind,
    pub version: Option<MigrationVersion>,
    pub description: String,
}

impl MigrationName {
    /// Parse `{prefix}{version}{separator}{description}{suffix}`.
    ///
    /// Returns `Ok(None)` when the name carries none of the configured
    /// prefixes or suffixes, and an error when it carries a prefix but is
    /// otherwise malformed. With an empty `suffixes` list no suffix is
    /// expected.
    pub fn parse(
        name: &str,
        configuration: &Configuration,
        suffixes: &[String],
    ) -> StrataResult<Option<Self>> {
        let stem = if suffixes.is_empty() {
            name
        } else {
            match suffixes.iter().find_map(|s| name.strip_suffix(s.as_str())) {
                Some(stem) => stem,
                None => return Ok(None),
            }
        };

        let mut prefixes = [
            (&configuration.repeatable_sql_migration_prefix, MigrationKind::Repeatable),
            (&configuration.sql_migration_prefix, MigrationKind::Versioned),
            (&configuration.baseline_migration_prefix, MigrationKind::Baseline),
        ];
        // Longest prefix wins when prefixes share a start.
        prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        let Some((rest, kind)) = prefixes
            .iter()
            .find_map(|(prefix, kind)| stem.strip_prefix(prefix.as_str()).map(|rest| (rest, *kind)))
        else {
            return Ok(None);
        };

        let invalid = |reason: &str| {
            MigrationError::InvalidMigrationName(format!("{}: {}", name, reason))
        };
        let separator = configuration.sql_migration_separator.as_str();
        let (version, description) = rest
            .split_once(separator)
            .ok_or_else(|| invalid(&format!("missing separator '{}'", separator)))?;
        let description = description.replace('_', " ").trim().to_string();

        let version = match kind {
            MigrationKind::Repeatable => {
                if !version.is_empty() {
                    return Err(invalid("repeatable migrations must not have a version"));
                }
                None
            }
            MigrationKind::Versioned | MigrationKind::Baseline => {
                if version.is_empty() {
                    return Err(invalid("missing version"));
                }
                Some(
                    MigrationVersion::parse(version)
                        .map_err(|_| invalid(&format!("invalid version '{}'", version)))?,
                )
            }
        };

        Ok(Some(Self {
            kind,
            version,
            description,
        }))
    }
}

/// Merges several resolvers.
#[derive(Clone, Default)]
pub struct CompositeMigrationResolver {
    resolvers: Vec<Arc<dyn MigrationResolver>>,
}

impl CompositeMigrationResolver {
    /// Create an empty composite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resolver.
    pub fn with(mut self, resolver: Arc<dyn MigrationResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }
}

/// Sort resolved migrations and reject duplicates.
///
/// Versioned migrations come first in ascending order, then repeatables by
/// description. A baseline and an incremental migration may share a version.
pub fn collect_resolved(mut migrations: Vec<ResolvedMigration>) -> StrataResult<Vec<ResolvedMigration>> {
    migrations.sort_by(|a, b| match (&a.version, &b.version) {
        (Some(va), Some(vb)) => va
            .cmp(vb)
            .then_with(|| a.migration_type.is_baseline_migration().cmp(&b.migration_type.is_baseline_migration())),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.description.cmp(&b.description),
    });

    for pair in migrations.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let duplicate = match (&a.version, &b.version) {
            (Some(va), Some(vb)) => {
                va == vb
                    && a.migration_type.is_baseline_migration()
                        == b.migration_type.is_baseline_migration()
            }
            (None, None) => a.description == b.description,
            _ => false,
        };
        if duplicate {
            let what = match &a.version {
                Some(v) => format!("version {}", v),
                None => format!("the description '{}'", a.description),
            };
            return Err(MigrationError::DuplicateMigration(format!(
                "{}\nOffenders:\n-> {} ({})\n-> {} ({})",
                what, a.physical_location, a.migration_type, b.physical_location, b.migration_type
            )));
        }
    }
    Ok(migrations)
}

#[async_trait::async_trait]
impl MigrationResolver for CompositeMigrationResolver {
    async fn resolve(&self, configuration: &Configuration) -> StrataResult<Vec<ResolvedMigration>> {
        let mut migrations = Vec::new();
        for resolver in &self.resolvers {
            migrations.extend(resolver.resolve(configuration).await?);
        }
        collect_resolved(migrations)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::migration::MigrationType;
    use crate::navigable::tests::{resolved, resolved_baseline, version};

    fn parse(name: &str) -> StrataResult<Option<MigrationName>> {
        MigrationName::parse(name, &Configuration::default(), &[".sql".to_string()])
    }

    #[test]
    fn test_parse_versioned_names() {
        let name = parse("V1_1__Add_users_table.sql").unwrap().unwrap();
        assert_eq!(name.kind, MigrationKind::Versioned);
        assert_eq!(name.version, Some(version("1.1")));
        assert_eq!(name.description, "Add users table");

        let name = parse("B5__snapshot.sql").unwrap().unwrap();
        assert_eq!(name.kind, MigrationKind::Baseline);

        let name = parse("R__Refresh_views.sql").unwrap().unwrap();
        assert_eq!(name.kind, MigrationKind::Repeatable);
        assert_eq!(name.version, None);
        assert_eq!(name.description, "Refresh views");
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        assert!(parse("V1_init.sql").is_err());
        assert!(parse("V__init.sql").is_err());
        assert!(parse("Vx__init.sql").is_err());
        assert!(parse("R1__views.sql").is_err());
        assert_eq!(parse("afterMigrate.sql").unwrap(), None);
        assert_eq!(parse("V1__init.txt").unwrap(), None);
    }

    #[test]
    fn test_parse_custom_naming() {
        let config = Configuration {
            sql_migration_prefix: "M".to_string(),
            sql_migration_separator: "-".to_string(),
            ..Configuration::default()
        };
        let name = MigrationName::parse("M20240101-create", &config, &[]).unwrap().unwrap();
        assert_eq!(name.version, Some(version("20240101")));
        assert_eq!(name.description, "create");
    }

    #[test]
    fn test_collect_sorts_and_keeps_baselines() {
        let merged = collect_resolved(vec![
            resolved(None, "views"),
            resolved(Some("2"), "two"),
            resolved_baseline("2", "snapshot"),
            resolved(Some("1"), "one"),
        ])
        .unwrap();
        let order: Vec<(Option<String>, MigrationType)> = merged
            .iter()
            .map(|m| (m.version.as_ref().map(|v| v.to_string()), m.migration_type))
            .collect();
        assert_eq!(
            order,
            vec![
                (Some("1".to_string()), MigrationType::Sql),
                (Some("2".to_string()), MigrationType::Sql),
                (Some("2".to_string()), MigrationType::SqlBaseline),
                (None, MigrationType::Sql),
            ]
        );
    }

    #[test]
    fn test_collect_rejects_duplicates() {
        let err = collect_resolved(vec![resolved(Some("1"), "one"), resolved(Some("1.0"), "uno")])
            .unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateMigration(_)));

        let err = collect_resolved(vec![resolved(None, "views"), resolved(None, "views")]).unwrap_err();
        assert!(err.to_string().contains("views"));
    }
}
