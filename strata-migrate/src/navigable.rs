//! Merging resolved and applied migrations into one timeline.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{MigrationError, StrataResult};
use crate::migration::{AppliedMigration, MigrationType, ResolvedMigration};
use crate::version::MigrationVersion;

/// Everything known about one migration version.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedMigrationEntry {
    /// The version.
    pub version: MigrationVersion,
    /// Regular migration resolved at this version.
    pub resolved_incremental: Option<ResolvedMigration>,
    /// Baseline migration resolved at this version.
    pub resolved_baseline: Option<ResolvedMigration>,
    /// History row for this version.
    pub applied: Option<AppliedMigration>,
    /// A deletion marker exists for this version.
    pub deleted: bool,
    /// Applied after a higher version.
    pub out_of_order: bool,
}

impl VersionedMigrationEntry {
    fn new(version: MigrationVersion) -> Self {
        Self {
            version,
            resolved_incremental: None,
            resolved_baseline: None,
            applied: None,
            deleted: false,
            out_of_order: false,
        }
    }

    /// The resolution that corresponds to the applied row, preferring the
    /// baseline resolution only when the row was a baseline migration.
    pub fn resolved_for_applied(&self) -> Option<&ResolvedMigration> {
        match &self.applied {
            Some(applied) if applied.migration_type.is_baseline_migration() => self
                .resolved_baseline
                .as_ref()
                .or(self.resolved_incremental.as_ref()),
            _ => self
                .resolved_incremental
                .as_ref()
                .or(self.resolved_baseline.as_ref()),
        }
    }

    /// Check if anything at this version is resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolved_incremental.is_some() || self.resolved_baseline.is_some()
    }
}

/// Everything known about one repeatable migration description.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatableMigrationEntry {
    /// The description.
    pub description: String,
    /// Resolved migration with this description.
    pub resolved: Option<ResolvedMigration>,
    /// Most recent run.
    pub latest_applied: Option<AppliedMigration>,
    /// Earlier runs, by installed rank.
    pub superseded_runs: Vec<AppliedMigration>,
    /// A deletion marker newer than the latest run exists.
    pub deleted: bool,
}

/// Resolved and applied migrations merged by version and description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigableMigrations {
    /// The schema creation marker, if any.
    pub schema_marker: Option<AppliedMigration>,
    /// Versioned entries in ascending version order.
    pub versioned: BTreeMap<MigrationVersion, VersionedMigrationEntry>,
    /// Repeatable entries keyed by description.
    pub repeatable: BTreeMap<String, RepeatableMigrationEntry>,
}

impl NavigableMigrations {
    /// Merge resolved and applied migrations.
    ///
    /// Fails when the history holds more than one schema marker or more than
    /// one row for a version.
    pub fn build(
        resolved: &[ResolvedMigration],
        applied: &[AppliedMigration],
    ) -> StrataResult<Self> {
        let mut execution_order: Vec<&AppliedMigration> = applied.iter().collect();
        execution_order.sort_by_key(|a| a.installed_rank);

        let mut schema_marker = None;
        let mut versioned_runs: BTreeMap<MigrationVersion, &AppliedMigration> = BTreeMap::new();
        let mut repeatable_runs: HashMap<&str, Vec<&AppliedMigration>> = HashMap::new();
        let mut deleted_versions: BTreeSet<MigrationVersion> = BTreeSet::new();
        let mut deleted_repeatables: HashMap<&str, i32> = HashMap::new();
        let mut out_of_order: BTreeSet<MigrationVersion> = BTreeSet::new();
        let mut highest: Option<&MigrationVersion> = None;

        for am in execution_order {
            match am.migration_type {
                MigrationType::Schema => {
                    if schema_marker.is_some() {
                        return Err(MigrationError::corrupted(
                            "more than one schema creation marker found",
                        ));
                    }
                    schema_marker = Some(am.clone());
                    continue;
                }
                MigrationType::Deleted => {
                    match &am.version {
                        Some(v) => {
                            deleted_versions.insert(v.clone());
                        }
                        None => {
                            let rank = deleted_repeatables
                                .entry(am.description.as_str())
                                .or_insert(am.installed_rank);
                            *rank = (*rank).max(am.installed_rank);
                        }
                    }
                    continue;
                }
                _ => {}
            }

            match &am.version {
                Some(version) => {
                    match highest {
                        Some(h) if version <= h => {
                            out_of_order.insert(version.clone());
                        }
                        _ => highest = Some(version),
                    }
                    if versioned_runs.insert(version.clone(), am).is_some() {
                        return Err(MigrationError::corrupted(format!(
                            "more than one applied migration found for version {}",
                            version
                        )));
                    }
                }
                None => repeatable_runs
                    .entry(am.description.as_str())
                    .or_default()
                    .push(am),
            }
        }

        let mut incremental: BTreeMap<&MigrationVersion, &ResolvedMigration> = BTreeMap::new();
        let mut baseline: BTreeMap<&MigrationVersion, &ResolvedMigration> = BTreeMap::new();
        let mut repeatable_resolved: HashMap<&str, &ResolvedMigration> = HashMap::new();
        for rm in resolved {
            match &rm.version {
                None => {
                    repeatable_resolved.insert(rm.description.as_str(), rm);
                }
                Some(v) if rm.migration_type.is_baseline_migration() => {
                    baseline.insert(v, rm);
                }
                Some(v) => {
                    incremental.insert(v, rm);
                }
            }
        }

        let mut versioned: BTreeMap<MigrationVersion, VersionedMigrationEntry> = BTreeMap::new();
        let keys: BTreeSet<&MigrationVersion> = versioned_runs
            .keys()
            .chain(incremental.keys().copied())
            .chain(baseline.keys().copied())
            .collect();
        for version in keys {
            let mut entry = VersionedMigrationEntry::new(version.clone());
            entry.resolved_incremental = incremental.get(version).map(|rm| (*rm).clone());
            entry.resolved_baseline = baseline.get(version).map(|rm| (*rm).clone());
            entry.applied = versioned_runs.get(version).map(|am| (*am).clone());
            entry.deleted = deleted_versions.contains(version);
            entry.out_of_order = out_of_order.contains(version);
            versioned.insert(version.clone(), entry);
        }

        let mut repeatable: BTreeMap<String, RepeatableMigrationEntry> = BTreeMap::new();
        let descriptions: BTreeSet<&str> = repeatable_runs
            .keys()
            .chain(repeatable_resolved.keys())
            .copied()
            .collect();
        for description in descriptions {
            let mut runs: Vec<AppliedMigration> = repeatable_runs
                .get(description)
                .map(|runs| runs.iter().map(|am| (*am).clone()).collect())
                .unwrap_or_default();
            let latest_applied = runs.pop();
            let deleted = match (&latest_applied, deleted_repeatables.get(description)) {
                (Some(latest), Some(marker_rank)) => *marker_rank > latest.installed_rank,
                _ => false,
            };
            repeatable.insert(
                description.to_string(),
                RepeatableMigrationEntry {
                    description: description.to_string(),
                    resolved: repeatable_resolved.get(description).map(|rm| (*rm).clone()),
                    latest_applied,
                    superseded_runs: runs,
                    deleted,
                },
            );
        }

        Ok(Self {
            schema_marker,
            versioned,
            repeatable,
        })
    }

    /// Get the entry for a version.
    pub fn versioned_entry(&self, version: &MigrationVersion) -> Option<&VersionedMigrationEntry> {
        self.versioned.get(version)
    }

    /// Get the entry for a repeatable description.
    pub fn repeatable_entry(&self, description: &str) -> Option<&RepeatableMigrationEntry> {
        self.repeatable.get(description)
    }

    /// Highest version with a resolved migration.
    pub fn latest_resolved_version(&self) -> Option<&MigrationVersion> {
        self.versioned
            .values()
            .rev()
            .find(|e| e.is_resolved())
            .map(|e| &e.version)
    }

    /// Highest version with a history row that is not logically deleted.
    pub fn latest_applied_version(&self) -> Option<&MigrationVersion> {
        self.versioned
            .values()
            .rev()
            .find(|e| e.applied.is_some() && !e.deleted)
            .map(|e| &e.version)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::checksum::Checksum;
    use crate::config::Configuration;
    use crate::connection::Connection;
    use crate::migration::MigrationExecutor;

    struct NoopExecutor;

    #[async_trait::async_trait]
    impl MigrationExecutor for NoopExecutor {
        async fn execute(&self, _: &dyn Connection, _: &Configuration) -> StrataResult<()> {
            Ok(())
        }
    }

    pub(crate) fn version(s: &str) -> MigrationVersion {
        MigrationVersion::parse(s).unwrap()
    }

    pub(crate) fn resolved(v: Option<&str>, description: &str) -> ResolvedMigration {
        let script = match v {
            Some(v) => format!("V{}__{}.sql", v, description.replace(' ', "_")),
            None => format!("R__{}.sql", description.replace(' ', "_")),
        };
        ResolvedMigration {
            version: v.map(version),
            description: description.to_string(),
            checksum: Some(Checksum::of_lines(&script)),
            physical_location: format!("db/migration/{}", script),
            script,
            migration_type: MigrationType::Sql,
            executor: Arc::new(NoopExecutor),
        }
    }

    pub(crate) fn resolved_baseline(v: &str, description: &str) -> ResolvedMigration {
        let mut rm = resolved(Some(v), description);
        rm.migration_type = MigrationType::SqlBaseline;
        rm.script = format!("B{}__{}.sql", v, description.replace(' ', "_"));
        rm
    }

    pub(crate) fn applied(rank: i32, v: Option<&str>, description: &str, success: bool) -> AppliedMigration {
        let rm = resolved(v, description);
        AppliedMigration {
            installed_rank: rank,
            version: rm.version,
            description: rm.description,
            migration_type: MigrationType::Sql,
            script: rm.script,
            checksum: rm.checksum,
            installed_on: Utc::now(),
            installed_by: "tester".to_string(),
            execution_time: 5,
            success,
        }
    }

    pub(crate) fn marker(rank: i32, v: Option<&str>, t: MigrationType) -> AppliedMigration {
        let mut am = applied(rank, v, "<< marker >>", true);
        am.migration_type = t;
        am.checksum = None;
        am
    }

    #[test]
    fn test_build_is_deterministic() {
        let resolved = vec![resolved(Some("1"), "init"), resolved(None, "views")];
        let applied = vec![applied(1, Some("1"), "init", true)];
        let first = NavigableMigrations::build(&resolved, &applied).unwrap();
        let second = NavigableMigrations::build(&resolved, &applied).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_versions_iterate_ascending() {
        let resolved = vec![
            resolved(Some("10"), "ten"),
            resolved(Some("2"), "two"),
            resolved(Some("1.1"), "one one"),
        ];
        let nav = NavigableMigrations::build(&resolved, &[]).unwrap();
        let order: Vec<String> = nav.versioned.keys().map(|v| v.to_string()).collect();
        assert_eq!(order, vec!["1.1", "2", "10"]);
    }

    #[test]
    fn test_out_of_order_detection() {
        let applied = vec![
            applied(1, Some("1.0"), "a", true),
            applied(2, Some("2.0"), "b", true),
            applied(3, Some("1.5"), "c", true),
        ];
        let nav = NavigableMigrations::build(&[], &applied).unwrap();
        assert!(!nav.versioned[&version("1.0")].out_of_order);
        assert!(!nav.versioned[&version("2.0")].out_of_order);
        assert!(nav.versioned[&version("1.5")].out_of_order);
    }

    #[test]
    fn test_out_of_order_uses_execution_order_not_input_order() {
        let applied = vec![
            applied(2, Some("1"), "late", true),
            applied(1, Some("2"), "early", true),
        ];
        let nav = NavigableMigrations::build(&[], &applied).unwrap();
        assert!(nav.versioned[&version("1")].out_of_order);
        assert!(!nav.versioned[&version("2")].out_of_order);
    }

    #[test]
    fn test_markers_do_not_count_as_versions() {
        let applied = vec![
            marker(1, Some("0"), MigrationType::Schema),
            applied(2, Some("1"), "init", true),
            marker(3, Some("1"), MigrationType::Deleted),
        ];
        let nav = NavigableMigrations::build(&[], &applied).unwrap();
        assert!(nav.schema_marker.is_some());
        assert_eq!(nav.versioned.len(), 1);
        let entry = &nav.versioned[&version("1")];
        assert!(entry.deleted);
        assert!(!entry.out_of_order);
        assert_eq!(nav.latest_applied_version(), None);
    }

    #[test]
    fn test_duplicate_schema_marker_is_corruption() {
        let applied = vec![
            marker(1, Some("0"), MigrationType::Schema),
            marker(2, Some("0"), MigrationType::Schema),
        ];
        let err = NavigableMigrations::build(&[], &applied).unwrap_err();
        assert!(matches!(err, MigrationError::Corrupted(_)));
    }

    #[test]
    fn test_duplicate_version_is_corruption() {
        let applied = vec![
            applied(1, Some("1"), "init", false),
            applied(2, Some("1.0"), "init", true),
        ];
        let err = NavigableMigrations::build(&[], &applied).unwrap_err();
        assert!(matches!(err, MigrationError::Corrupted(_)));
    }

    #[test]
    fn test_repeatable_runs_and_deletion() {
        let mut applied = vec![
            applied(1, None, "views", true),
            applied(2, None, "views", true),
            marker(3, None, MigrationType::Deleted),
            applied(4, None, "functions", true),
        ];
        applied[2].description = "views".to_string();

        let resolved = vec![resolved(None, "functions"), resolved(None, "grants")];
        let nav = NavigableMigrations::build(&resolved, &applied).unwrap();

        let views = &nav.repeatable["views"];
        assert_eq!(views.latest_applied.as_ref().map(|a| a.installed_rank), Some(2));
        assert_eq!(views.superseded_runs.len(), 1);
        assert!(views.deleted);
        assert!(views.resolved.is_none());

        let functions = &nav.repeatable["functions"];
        assert!(!functions.deleted);
        assert!(functions.resolved.is_some());

        let grants = &nav.repeatable["grants"];
        assert!(grants.latest_applied.is_none());
        assert!(grants.superseded_runs.is_empty());
    }

    #[test]
    fn test_rerun_after_deletion_clears_flag() {
        let mut delete = marker(2, None, MigrationType::Deleted);
        delete.description = "views".to_string();
        let applied = vec![
            applied(1, None, "views", true),
            delete,
            applied(3, None, "views", true),
        ];
        let nav = NavigableMigrations::build(&[], &applied).unwrap();
        assert!(!nav.repeatable["views"].deleted);
    }

    #[test]
    fn test_baseline_and_incremental_share_version() {
        let resolved = vec![resolved(Some("3"), "three"), resolved_baseline("3", "everything")];
        let nav = NavigableMigrations::build(&resolved, &[]).unwrap();
        let entry = &nav.versioned[&version("3")];
        assert!(entry.resolved_incremental.is_some());
        assert!(entry.resolved_baseline.is_some());
        assert_eq!(nav.latest_resolved_version(), Some(&version("3")));
    }
}
