//! Migration states and categorized views over the merged timeline.

use chrono::{DateTime, Utc};

use crate::checksum::Checksum;
use crate::error::{ErrorCode, ErrorDetails, MigrationError, StrataResult};
use crate::migration::{AppliedMigration, MigrationType, ResolvedMigration};
use crate::navigable::{NavigableMigrations, RepeatableMigrationEntry, VersionedMigrationEntry};
use crate::state::{MigrationState, StateCategory};
use crate::validation::{
    InvalidMigration, MigrationPattern, PatternState, ValidationContext, is_cherry_picked,
};
use crate::version::{MigrationVersion, TargetVersion};

/// Policy used when computing migration states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoSettings {
    /// Version to stop at.
    pub target: TargetVersion,
    /// Explicit allow-list of migrations.
    pub cherry_pick: Vec<MigrationPattern>,
    /// Whether versions lower than the latest applied may still be applied.
    pub out_of_order: bool,
    /// Fail when a specific target version does not exist.
    pub fail_on_missing_target: bool,
}

impl Default for InfoSettings {
    fn default() -> Self {
        Self {
            target: TargetVersion::Latest,
            cherry_pick: Vec::new(),
            out_of_order: false,
            fail_on_missing_target: true,
        }
    }
}

/// One entry of the migration timeline with its computed state.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationInfo {
    resolved: Option<ResolvedMigration>,
    applied: Option<AppliedMigration>,
    state: MigrationState,
}

impl MigrationInfo {
    fn new(
        resolved: Option<ResolvedMigration>,
        applied: Option<AppliedMigration>,
        state: MigrationState,
    ) -> Self {
        Self {
            resolved,
            applied,
            state,
        }
    }

    /// Computed state.
    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Resolved migration, if any.
    pub fn resolved(&self) -> Option<&ResolvedMigration> {
        self.resolved.as_ref()
    }

    /// History row, if any.
    pub fn applied(&self) -> Option<&AppliedMigration> {
        self.applied.as_ref()
    }

    /// Version, or `None` for repeatables.
    pub fn version(&self) -> Option<&MigrationVersion> {
        match &self.applied {
            Some(am) => am.version.as_ref(),
            None => self.resolved.as_ref().and_then(|rm| rm.version.as_ref()),
        }
    }

    /// Check if this entry is a repeatable migration.
    pub fn is_repeatable(&self) -> bool {
        self.version().is_none()
    }

    /// Description.
    pub fn description(&self) -> &str {
        match (&self.applied, &self.resolved) {
            (Some(am), _) => &am.description,
            (None, Some(rm)) => &rm.description,
            (None, None) => "",
        }
    }

    /// Migration type.
    pub fn migration_type(&self) -> MigrationType {
        match (&self.applied, &self.resolved) {
            (Some(am), _) => am.migration_type,
            (None, Some(rm)) => rm.migration_type,
            (None, None) => MigrationType::Sql,
        }
    }

    /// Script name.
    pub fn script(&self) -> &str {
        match (&self.applied, &self.resolved) {
            (Some(am), _) => &am.script,
            (None, Some(rm)) => &rm.script,
            (None, None) => "",
        }
    }

    /// Checksum, from history when applied.
    pub fn checksum(&self) -> Option<&Checksum> {
        match (&self.applied, &self.resolved) {
            (Some(am), _) => am.checksum.as_ref(),
            (None, Some(rm)) => rm.checksum.as_ref(),
            (None, None) => None,
        }
    }

    /// Where the resolved migration was found.
    pub fn physical_location(&self) -> &str {
        self.resolved
            .as_ref()
            .map(|rm| rm.physical_location.as_str())
            .unwrap_or("")
    }

    /// Installed rank, if applied.
    pub fn installed_rank(&self) -> Option<i32> {
        self.applied.as_ref().map(|am| am.installed_rank)
    }

    /// Installation timestamp, if applied.
    pub fn installed_on(&self) -> Option<DateTime<Utc>> {
        self.applied.as_ref().map(|am| am.installed_on)
    }

    /// Installing user, if applied.
    pub fn installed_by(&self) -> Option<&str> {
        self.applied.as_ref().map(|am| am.installed_by.as_str())
    }

    /// Execution time in milliseconds, if applied.
    pub fn execution_time(&self) -> Option<i32> {
        self.applied.as_ref().map(|am| am.execution_time)
    }

    /// Label used in logs and errors.
    pub fn label(&self) -> String {
        match self.version() {
            Some(v) => format!("{} - {}", v, self.description()),
            None => self.description().to_string(),
        }
    }

    /// Validate this entry against a policy.
    ///
    /// Returns `None` when the state is acceptable.
    pub fn validate(&self, context: &ValidationContext) -> Option<InvalidMigration> {
        let repeatable = self.is_repeatable();
        let ignored = |state: PatternState| context.is_ignored(state, repeatable);
        let version = self
            .version()
            .map(|v| v.to_string())
            .unwrap_or_else(|| self.description().to_string());

        let (code, message) = match self.state {
            MigrationState::Failed | MigrationState::MissingFailed => {
                if ignored(PatternState::Failed) {
                    return None;
                }
                let code = if repeatable {
                    ErrorCode::FailedRepeatableMigration
                } else {
                    ErrorCode::FailedVersionedMigration
                };
                (
                    code,
                    format!(
                        "Detected failed migration to version {} ({}). Please remove any half-completed changes then run repair to fix the schema history.",
                        version,
                        self.description()
                    ),
                )
            }
            MigrationState::FutureFailed => {
                if ignored(PatternState::Future) || ignored(PatternState::Failed) {
                    return None;
                }
                (
                    ErrorCode::FailedVersionedMigration,
                    format!(
                        "Detected failed migration to version {} ({}) newer than any resolved migration.",
                        version,
                        self.description()
                    ),
                )
            }
            MigrationState::MissingSuccess => {
                if ignored(PatternState::Missing) {
                    return None;
                }
                let code = if repeatable {
                    ErrorCode::AppliedRepeatableMigrationNotResolved
                } else {
                    ErrorCode::AppliedVersionedMigrationNotResolved
                };
                (
                    code,
                    format!(
                        "Detected applied migration not resolved locally: {}. If you removed this migration intentionally, run repair to mark the migration as deleted.",
                        version
                    ),
                )
            }
            MigrationState::FutureSuccess => {
                if ignored(PatternState::Future) {
                    return None;
                }
                (
                    ErrorCode::FutureMigration,
                    format!(
                        "Detected applied migration not resolved locally: {}. It is newer than any resolved migration.",
                        version
                    ),
                )
            }
            MigrationState::Ignored => {
                if ignored(PatternState::Ignored) {
                    return None;
                }
                (
                    ErrorCode::ResolvedVersionedMigrationNotApplied,
                    format!(
                        "Detected resolved migration not applied to database: {}. To ignore this migration, add '*:ignored' to ignore_migration_patterns. To allow executing this migration, set out_of_order to true.",
                        version
                    ),
                )
            }
            MigrationState::Pending => {
                if context.allow_pending || ignored(PatternState::Pending) {
                    return None;
                }
                let code = if repeatable {
                    ErrorCode::ResolvedRepeatableMigrationNotApplied
                } else {
                    ErrorCode::ResolvedVersionedMigrationNotApplied
                };
                (
                    code,
                    format!(
                        "Detected resolved migration not applied to database: {}.",
                        version
                    ),
                )
            }
            MigrationState::Outdated => {
                if context.allow_pending || ignored(PatternState::Pending) {
                    return None;
                }
                (
                    ErrorCode::OutdatedRepeatableMigration,
                    format!(
                        "Detected outdated resolved repeatable migration that should be re-applied to database: {}",
                        self.description()
                    ),
                )
            }
            MigrationState::Success | MigrationState::OutOfOrder => {
                self.validate_against_resolution()?
            }
            _ => return None,
        };

        Some(InvalidMigration {
            version: self.version().map(|v| v.to_string()),
            description: self.description().to_string(),
            file_path: self.physical_location().to_string(),
            error_details: ErrorDetails::new(code, message),
        })
    }

    fn validate_against_resolution(&self) -> Option<(ErrorCode, String)> {
        let (Some(rm), Some(am)) = (&self.resolved, &self.applied) else {
            return None;
        };
        let version = am.version.as_ref()?;
        if am.is_synthetic() {
            return None;
        }

        if rm.migration_type != am.migration_type {
            return Some((
                ErrorCode::TypeMismatch,
                format!(
                    "Migration type mismatch for migration version {}\n-> Applied to database : {}\n-> Resolved locally    : {}. Either revert the changes to the migration, or run repair to update the schema history.",
                    version, am.migration_type, rm.migration_type
                ),
            ));
        }
        if !rm.checksum_matches(am.checksum.as_ref()) {
            return Some((
                ErrorCode::ChecksumMismatch,
                format!(
                    "Migration checksum mismatch for migration version {}\n-> Applied to database : {}\n-> Resolved locally    : {}. Either revert the changes to the migration, or run repair to update the schema history.",
                    version,
                    display_checksum(am.checksum.as_ref()),
                    display_checksum(rm.checksum.as_ref())
                ),
            ));
        }
        if rm.description != am.description {
            return Some((
                ErrorCode::DescriptionMismatch,
                format!(
                    "Migration description mismatch for migration version {}\n-> Applied to database : {}\n-> Resolved locally    : {}. Either revert the changes to the migration, or run repair to update the schema history.",
                    version, am.description, rm.description
                ),
            ));
        }
        None
    }
}

fn display_checksum(checksum: Option<&Checksum>) -> String {
    checksum
        .map(|c| c.to_string())
        .unwrap_or_else(|| "null".to_string())
}

struct StateContext<'a> {
    settings: &'a InfoSettings,
    target: Option<MigrationVersion>,
    latest_resolved: Option<MigrationVersion>,
    latest_applied: Option<MigrationVersion>,
    baseline_cutoff: Option<MigrationVersion>,
    selected_baseline: Option<MigrationVersion>,
}

impl StateContext<'_> {
    fn above_target(&self, version: &MigrationVersion) -> bool {
        self.target.as_ref().is_some_and(|t| version > t)
    }

    fn below_baseline(&self, version: &MigrationVersion) -> bool {
        self.baseline_cutoff.as_ref().is_some_and(|c| version <= c)
            || self.selected_baseline.as_ref().is_some_and(|b| version < b)
    }

    fn cherry_picked(&self, version: Option<&MigrationVersion>, description: &str) -> bool {
        is_cherry_picked(&self.settings.cherry_pick, version, description)
    }

    fn pending_or_ignored(&self, rm: &ResolvedMigration) -> MigrationState {
        if !self.cherry_picked(rm.version.as_ref(), &rm.description) {
            return MigrationState::Ignored;
        }
        match &rm.version {
            Some(v)
                if !self.settings.out_of_order
                    && self.latest_applied.as_ref().is_some_and(|l| v < l) =>
            {
                MigrationState::Ignored
            }
            _ => MigrationState::Pending,
        }
    }

    fn versioned_info(&self, entry: &VersionedMigrationEntry) -> Option<MigrationInfo> {
        let version = &entry.version;
        let Some(am) = &entry.applied else {
            if self.selected_baseline.as_ref() == Some(version) {
                let rm = entry.resolved_baseline.clone()?;
                let state = self.pending_or_ignored(&rm);
                return Some(MigrationInfo::new(Some(rm), None, state));
            }

            // Baseline migrations that were not selected are not listed.
            let rm = entry.resolved_incremental.clone()?;
            let state = if self.above_target(version) {
                MigrationState::AboveTarget
            } else if self.below_baseline(version) {
                MigrationState::BelowBaseline
            } else {
                self.pending_or_ignored(&rm)
            };
            return Some(MigrationInfo::new(Some(rm), None, state));
        };

        let rm = entry.resolved_for_applied().cloned();
        let state = if am.migration_type == MigrationType::Baseline {
            MigrationState::Baseline
        } else if entry.deleted {
            MigrationState::Deleted
        } else if rm.is_none() {
            let missing = self.latest_resolved.as_ref().is_some_and(|lr| version < lr);
            match (missing, am.success) {
                (true, true) => MigrationState::MissingSuccess,
                (true, false) => MigrationState::MissingFailed,
                (false, true) => MigrationState::FutureSuccess,
                (false, false) => MigrationState::FutureFailed,
            }
        } else if !am.success {
            MigrationState::Failed
        } else if entry.out_of_order {
            MigrationState::OutOfOrder
        } else {
            MigrationState::Success
        };
        Some(MigrationInfo::new(rm, Some(am.clone()), state))
    }

    fn repeatable_infos(&self, entry: &RepeatableMigrationEntry) -> Vec<MigrationInfo> {
        let mut infos: Vec<MigrationInfo> = entry
            .superseded_runs
            .iter()
            .map(|run| {
                MigrationInfo::new(
                    entry.resolved.clone(),
                    Some(run.clone()),
                    MigrationState::Superseded,
                )
            })
            .collect();

        let latest = match (&entry.latest_applied, &entry.resolved) {
            (Some(am), rm) if entry.deleted => {
                MigrationInfo::new(rm.clone(), Some(am.clone()), MigrationState::Deleted)
            }
            (Some(am), None) => {
                let state = if am.success {
                    MigrationState::MissingSuccess
                } else {
                    MigrationState::MissingFailed
                };
                MigrationInfo::new(None, Some(am.clone()), state)
            }
            (Some(am), Some(rm)) => {
                let state = if !am.success {
                    MigrationState::Failed
                } else if !rm.checksum_matches(am.checksum.as_ref())
                    || rm.description != am.description
                {
                    MigrationState::Outdated
                } else {
                    MigrationState::Success
                };
                MigrationInfo::new(Some(rm.clone()), Some(am.clone()), state)
            }
            (None, Some(rm)) => {
                let state = self.pending_or_ignored(rm);
                MigrationInfo::new(Some(rm.clone()), None, state)
            }
            (None, None) => return infos,
        };
        infos.push(latest);
        infos
    }

    fn infos(&self, navigable: &NavigableMigrations) -> Vec<MigrationInfo> {
        let mut infos = Vec::new();
        if let Some(marker) = &navigable.schema_marker {
            infos.push(MigrationInfo::new(
                None,
                Some(marker.clone()),
                MigrationState::Success,
            ));
        }
        infos.extend(
            navigable
                .versioned
                .values()
                .filter_map(|entry| self.versioned_info(entry)),
        );

        let mut repeatables: Vec<MigrationInfo> = navigable
            .repeatable
            .values()
            .flat_map(|entry| self.repeatable_infos(entry))
            .collect();
        repeatables.sort_by(|a, b| {
            let rank = |i: &MigrationInfo| i.installed_rank().unwrap_or(i32::MAX);
            rank(a)
                .cmp(&rank(b))
                .then_with(|| a.description().cmp(b.description()))
        });
        infos.extend(repeatables);
        infos
    }
}

/// State-tagged view over resolved and applied migrations.
#[derive(Debug, Clone)]
pub struct MigrationInfoService {
    infos: Vec<MigrationInfo>,
}

impl MigrationInfoService {
    /// Compute migration states.
    ///
    /// Fails when the history is corrupted, or when a specific target version
    /// is configured, `fail_on_missing_target` is set and no migration has
    /// that version.
    pub fn new(
        resolved: &[ResolvedMigration],
        applied: &[AppliedMigration],
        settings: &InfoSettings,
    ) -> StrataResult<Self> {
        let navigable = NavigableMigrations::build(resolved, applied)?;
        Self::from_navigable(&navigable, settings)
    }

    /// Compute migration states from an already merged timeline.
    pub fn from_navigable(
        navigable: &NavigableMigrations,
        settings: &InfoSettings,
    ) -> StrataResult<Self> {
        let latest_applied = navigable.latest_applied_version().cloned();
        let baseline_cutoff = navigable
            .versioned
            .values()
            .rev()
            .filter_map(|e| e.applied.as_ref())
            .find(|am| {
                am.migration_type == MigrationType::Baseline
                    || am.migration_type.is_baseline_migration()
            })
            .and_then(|am| am.version.clone());

        let mut context = StateContext {
            settings,
            target: None,
            latest_resolved: navigable.latest_resolved_version().cloned(),
            latest_applied: latest_applied.clone(),
            baseline_cutoff,
            selected_baseline: None,
        };

        context.target = match &settings.target {
            TargetVersion::Latest => None,
            TargetVersion::Version(v) => Some(v.clone()),
            TargetVersion::Current => Some(latest_applied.unwrap_or_else(MigrationVersion::empty)),
            TargetVersion::Next => {
                let first_pending = Self::first_pending_version(&context, navigable);
                Some(first_pending.unwrap_or_else(|| {
                    context
                        .latest_applied
                        .clone()
                        .unwrap_or_else(MigrationVersion::empty)
                }))
            }
        };

        let fresh = navigable.versioned.values().all(|e| e.applied.is_none());
        if fresh {
            context.selected_baseline = navigable
                .versioned
                .values()
                .rev()
                .filter(|e| e.resolved_baseline.is_some())
                .map(|e| &e.version)
                .find(|v| !context.above_target(v))
                .cloned();
        }

        if let TargetVersion::Version(target) = &settings.target {
            let exists = navigable.versioned.contains_key(target);
            if settings.fail_on_missing_target && !exists {
                return Err(MigrationError::TargetNotFound(target.to_string()));
            }
        }

        Ok(Self {
            infos: context.infos(navigable),
        })
    }

    fn first_pending_version(
        context: &StateContext<'_>,
        navigable: &NavigableMigrations,
    ) -> Option<MigrationVersion> {
        context
            .infos(navigable)
            .into_iter()
            .find(|i| i.state() == MigrationState::Pending && !i.is_repeatable())
            .and_then(|i| i.version().cloned())
    }

    /// All entries in display order.
    pub fn all(&self) -> &[MigrationInfo] {
        &self.infos
    }

    /// The most recently applied migration, by version.
    ///
    /// Falls back to the most recent repeatable run when no versioned
    /// migration is applied.
    pub fn current(&self) -> Option<&MigrationInfo> {
        let versioned = self
            .infos
            .iter()
            .filter(|i| {
                i.state().is_applied()
                    && i.state() != MigrationState::Deleted
                    && i.migration_type() != MigrationType::Schema
                    && i.version().is_some()
            })
            .max_by(|a, b| a.version().cmp(&b.version()));
        if versioned.is_some() {
            return versioned;
        }

        self.infos
            .iter()
            .filter(|i| {
                i.is_repeatable()
                    && i.state().is_applied()
                    && !matches!(
                        i.state(),
                        MigrationState::Deleted | MigrationState::Superseded
                    )
            })
            .max_by_key(|i| i.installed_rank())
    }

    /// The next migration to apply.
    pub fn next(&self) -> Option<&MigrationInfo> {
        self.infos
            .iter()
            .find(|i| i.state() == MigrationState::Pending)
            .or_else(|| {
                self.infos
                    .iter()
                    .find(|i| i.state() == MigrationState::Outdated)
            })
    }

    fn with_state(&self, state: MigrationState) -> Vec<&MigrationInfo> {
        self.infos.iter().filter(|i| i.state() == state).collect()
    }

    fn with_category(&self, category: StateCategory) -> Vec<&MigrationInfo> {
        self.infos.iter().filter(|i| i.state().is(category)).collect()
    }

    /// Migrations waiting to be applied.
    pub fn pending(&self) -> Vec<&MigrationInfo> {
        self.with_state(MigrationState::Pending)
    }

    /// Migrations with a history row.
    pub fn applied(&self) -> Vec<&MigrationInfo> {
        self.with_category(StateCategory::Applied)
    }

    /// Failed migrations.
    pub fn failed(&self) -> Vec<&MigrationInfo> {
        self.with_category(StateCategory::Failed)
    }

    /// Applied migrations newer than anything resolved.
    pub fn future(&self) -> Vec<&MigrationInfo> {
        self.with_category(StateCategory::Future)
    }

    /// Migrations applied after a higher version.
    pub fn out_of_order(&self) -> Vec<&MigrationInfo> {
        self.with_state(MigrationState::OutOfOrder)
    }

    /// Repeatables whose content changed since they were applied.
    pub fn outdated(&self) -> Vec<&MigrationInfo> {
        self.with_state(MigrationState::Outdated)
    }

    /// Validate every entry. An empty result means the timeline is valid.
    pub fn validate(&self, context: &ValidationContext) -> Vec<InvalidMigration> {
        self.infos
            .iter()
            .filter_map(|i| i.validate(context))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::navigable::tests::{applied, marker, resolved, resolved_baseline, version};

    fn service(resolved: &[ResolvedMigration], applied: &[AppliedMigration]) -> MigrationInfoService {
        MigrationInfoService::new(resolved, applied, &InfoSettings::default()).unwrap()
    }

    fn states(service: &MigrationInfoService) -> Vec<(String, MigrationState)> {
        service
            .all()
            .iter()
            .map(|i| (i.label(), i.state()))
            .collect()
    }

    fn versions(infos: &[&MigrationInfo]) -> Vec<String> {
        infos
            .iter()
            .map(|i| i.version().map(|v| v.to_string()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_fresh_database_everything_pending() {
        let resolved = vec![resolved(Some("1.0"), "init"), resolved(Some("2.0"), "add col")];
        let info = service(&resolved, &[]);
        assert_eq!(versions(&info.pending()), vec!["1.0", "2.0"]);
        assert!(info.current().is_none());
        assert_eq!(info.next().and_then(|i| i.version()), Some(&version("1")));
    }

    #[test]
    fn test_partially_applied() {
        let resolved = vec![resolved(Some("1.0"), "init"), resolved(Some("2.0"), "add col")];
        let applied = vec![applied(1, Some("1.0"), "init", true)];
        let info = service(&resolved, &applied);
        assert_eq!(info.current().and_then(|i| i.version()), Some(&version("1.0")));
        assert_eq!(versions(&info.pending()), vec!["2.0"]);
    }

    #[test]
    fn test_missing_migration_fails_validation() {
        let resolved = vec![resolved(Some("2.0"), "add col")];
        let applied = vec![applied(1, Some("1.0"), "init", true)];
        let info = service(&resolved, &applied);
        assert_eq!(info.all()[0].state(), MigrationState::MissingSuccess);

        let strict = ValidationContext::default().allow_pending(true);
        let errors = info.validate(&strict);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].error_details.error_code,
            ErrorCode::AppliedVersionedMigrationNotResolved
        );

        let lenient = strict.ignore("*:missing".parse().unwrap());
        assert!(info.validate(&lenient).is_empty());
    }

    #[test]
    fn test_out_of_order_state() {
        let resolved = vec![resolved(Some("1.0"), "one"), resolved(Some("2.0"), "two")];
        let applied = vec![applied(1, Some("2.0"), "two", true), applied(2, Some("1.0"), "one", true)];
        let info = service(&resolved, &applied);
        assert_eq!(
            states(&info),
            vec![
                ("1.0 - one".to_string(), MigrationState::OutOfOrder),
                ("2.0 - two".to_string(), MigrationState::Success),
            ]
        );
        assert_eq!(versions(&info.out_of_order()), vec!["1.0"]);
    }

    #[test]
    fn test_future_migrations() {
        let resolved = vec![resolved(Some("1"), "one")];
        let applied = vec![
            applied(1, Some("1"), "one", true),
            applied(2, Some("2"), "two", true),
            applied(3, Some("3"), "three", false),
        ];
        let info = service(&resolved, &applied);
        assert_eq!(info.all()[1].state(), MigrationState::FutureSuccess);
        assert_eq!(info.all()[2].state(), MigrationState::FutureFailed);
        assert_eq!(versions(&info.future()), vec!["2", "3"]);

        let default_policy = ValidationContext::new(vec!["*:future".parse().unwrap()]);
        assert!(info.validate(&default_policy).is_empty());
        assert_eq!(info.validate(&ValidationContext::default()).len(), 2);
    }

    #[test]
    fn test_late_lower_version_is_ignored_unless_out_of_order() {
        let resolved = vec![
            resolved(Some("1"), "one"),
            resolved(Some("1.5"), "late"),
            resolved(Some("2"), "two"),
        ];
        let applied = vec![applied(1, Some("1"), "one", true), applied(2, Some("2"), "two", true)];

        let info = service(&resolved, &applied);
        assert_eq!(info.all()[1].state(), MigrationState::Ignored);
        assert!(info.pending().is_empty());

        let settings = InfoSettings {
            out_of_order: true,
            ..InfoSettings::default()
        };
        let info = MigrationInfoService::new(&resolved, &applied, &settings).unwrap();
        assert_eq!(info.all()[1].state(), MigrationState::Pending);
    }

    #[test]
    fn test_target_version() {
        let resolved = vec![
            resolved(Some("1"), "one"),
            resolved(Some("2"), "two"),
            resolved(Some("3"), "three"),
        ];
        let settings = InfoSettings {
            target: TargetVersion::Version(version("2")),
            ..InfoSettings::default()
        };
        let info = MigrationInfoService::new(&resolved, &[], &settings).unwrap();
        assert_eq!(versions(&info.pending()), vec!["1", "2"]);
        assert_eq!(info.all()[2].state(), MigrationState::AboveTarget);
    }

    #[test]
    fn test_missing_target_is_fatal() {
        let resolved = vec![resolved(Some("1"), "one")];
        let settings = InfoSettings {
            target: TargetVersion::Version(version("5")),
            ..InfoSettings::default()
        };
        let err = MigrationInfoService::new(&resolved, &[], &settings).unwrap_err();
        assert!(matches!(err, MigrationError::TargetNotFound(_)));

        let lenient = InfoSettings {
            fail_on_missing_target: false,
            ..settings
        };
        assert!(MigrationInfoService::new(&resolved, &[], &lenient).is_ok());
    }

    #[test]
    fn test_symbolic_targets() {
        let resolved = vec![
            resolved(Some("1"), "one"),
            resolved(Some("2"), "two"),
            resolved(Some("3"), "three"),
        ];
        let applied = vec![applied(1, Some("1"), "one", true)];

        let next = InfoSettings {
            target: TargetVersion::Next,
            ..InfoSettings::default()
        };
        let info = MigrationInfoService::new(&resolved, &applied, &next).unwrap();
        assert_eq!(versions(&info.pending()), vec!["2"]);

        let current = InfoSettings {
            target: TargetVersion::Current,
            ..InfoSettings::default()
        };
        let info = MigrationInfoService::new(&resolved, &applied, &current).unwrap();
        assert!(info.pending().is_empty());
    }

    #[test]
    fn test_cherry_pick_and_target_precedence() {
        let resolved = vec![
            resolved(Some("1"), "one"),
            resolved(Some("2"), "two"),
            resolved(Some("3"), "three"),
        ];
        let settings = InfoSettings {
            target: TargetVersion::Version(version("2")),
            cherry_pick: vec![MigrationPattern::new("2"), MigrationPattern::new("3")],
            ..InfoSettings::default()
        };
        let info = MigrationInfoService::new(&resolved, &[], &settings).unwrap();
        assert_eq!(
            info.all().iter().map(|i| i.state()).collect::<Vec<_>>(),
            vec![
                MigrationState::Ignored,
                MigrationState::Pending,
                MigrationState::AboveTarget,
            ]
        );
    }

    #[test]
    fn test_baseline_marker_and_below_baseline() {
        let resolved = vec![
            resolved(Some("1"), "one"),
            resolved(Some("2"), "two"),
            resolved(Some("3"), "three"),
        ];
        let applied = vec![marker(1, Some("2"), MigrationType::Baseline)];
        let info = service(&resolved, &applied);
        assert_eq!(
            info.all().iter().map(|i| i.state()).collect::<Vec<_>>(),
            vec![
                MigrationState::BelowBaseline,
                MigrationState::Baseline,
                MigrationState::Pending,
            ]
        );
        assert_eq!(info.current().and_then(|i| i.version()), Some(&version("2")));
    }

    #[test]
    fn test_baseline_migration_selected_on_fresh_database() {
        let resolved = vec![
            resolved(Some("1"), "one"),
            resolved(Some("2"), "two"),
            resolved_baseline("2", "snapshot"),
            resolved(Some("3"), "three"),
        ];
        let info = service(&resolved, &[]);
        let summary: Vec<(String, MigrationType, MigrationState)> = info
            .all()
            .iter()
            .map(|i| (i.label(), i.migration_type(), i.state()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("1 - one".to_string(), MigrationType::Sql, MigrationState::BelowBaseline),
                ("2 - snapshot".to_string(), MigrationType::SqlBaseline, MigrationState::Pending),
                ("3 - three".to_string(), MigrationType::Sql, MigrationState::Pending),
            ]
        );
    }

    #[test]
    fn test_baseline_migration_ignored_once_history_exists() {
        let resolved = vec![
            resolved(Some("1"), "one"),
            resolved_baseline("2", "snapshot"),
            resolved(Some("2"), "two"),
        ];
        let applied = vec![applied(1, Some("1"), "one", true)];
        let info = service(&resolved, &applied);
        assert_eq!(
            states(&info),
            vec![
                ("1 - one".to_string(), MigrationState::Success),
                ("2 - two".to_string(), MigrationState::Pending),
            ]
        );
    }

    #[test]
    fn test_failed_migration() {
        let resolved = vec![resolved(Some("1"), "one")];
        let applied = vec![applied(1, Some("1"), "one", false)];
        let info = service(&resolved, &applied);
        assert_eq!(info.all()[0].state(), MigrationState::Failed);
        assert_eq!(info.failed().len(), 1);
        let errors = info.validate(&ValidationContext::default());
        assert_eq!(errors[0].error_details.error_code, ErrorCode::FailedVersionedMigration);
    }

    #[test]
    fn test_checksum_and_description_mismatch() {
        let resolved = vec![resolved(Some("1"), "one"), resolved(Some("2"), "two")];
        let mut first = applied(1, Some("1"), "one", true);
        first.checksum = Some(Checksum::of_lines("edited"));
        let mut second = applied(2, Some("2"), "second", true);
        second.checksum = resolved[1].checksum;

        let info = service(&resolved, &[first, second]);
        let codes: Vec<ErrorCode> = info
            .validate(&ValidationContext::default())
            .into_iter()
            .map(|e| e.error_details.error_code)
            .collect();
        assert_eq!(codes, vec![ErrorCode::ChecksumMismatch, ErrorCode::DescriptionMismatch]);
    }

    #[test]
    fn test_repeatable_states() {
        let mut changed = resolved(None, "views");
        changed.checksum = Some(Checksum::of_lines("CREATE VIEW v2"));
        let resolved = vec![changed, resolved(None, "grants"), resolved(None, "functions")];
        let applied = vec![
            applied(1, None, "views", true),
            applied(2, None, "views", true),
            applied(3, None, "functions", true),
            applied(4, None, "dropped", true),
        ];
        let info = service(&resolved, &applied);
        assert_eq!(
            states(&info),
            vec![
                ("views".to_string(), MigrationState::Superseded),
                ("views".to_string(), MigrationState::Outdated),
                ("functions".to_string(), MigrationState::Success),
                ("dropped".to_string(), MigrationState::MissingSuccess),
                ("grants".to_string(), MigrationState::Pending),
            ]
        );
        assert_eq!(info.next().map(|i| i.description()), Some("grants"));
        assert_eq!(info.outdated().len(), 1);
        assert_eq!(info.current().and_then(|i| i.installed_rank()), Some(4));
    }

    #[test]
    fn test_next_falls_back_to_outdated() {
        let mut changed = resolved(None, "views");
        changed.checksum = Some(Checksum::of_lines("CREATE VIEW v2"));
        let applied = vec![applied(1, None, "views", true)];
        let info = service(&[changed], &applied);
        assert_eq!(info.next().map(|i| i.state()), Some(MigrationState::Outdated));
    }

    #[test]
    fn test_deleted_takes_precedence_over_missing() {
        let resolved = vec![resolved(Some("2"), "two")];
        let applied = vec![
            applied(1, Some("1"), "one", true),
            marker(2, Some("1"), MigrationType::Deleted),
        ];
        let info = service(&resolved, &applied);
        assert_eq!(info.all()[0].state(), MigrationState::Deleted);
        assert!(info.validate(&ValidationContext::default().allow_pending(true)).is_empty());
        assert!(info.current().is_none());
    }

    #[test]
    fn test_schema_marker_listed_first() {
        let resolved = vec![resolved(Some("1"), "one")];
        let applied = vec![marker(1, Some("0"), MigrationType::Schema)];
        let info = service(&resolved, &applied);
        assert_eq!(info.all()[0].migration_type(), MigrationType::Schema);
        assert_eq!(info.all()[1].state(), MigrationState::Pending);
        assert!(info.current().is_none());
    }
}
