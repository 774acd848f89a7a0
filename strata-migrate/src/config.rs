//! Engine configuration, loaded from `strata.toml`.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, StrataResult};
use crate::history::RetryPolicy;
use crate::info::InfoSettings;
use crate::validation::{
    MigrationPattern, PatternKind, PatternState, ValidatePattern, ValidationContext,
};
use crate::version::{MigrationVersion, TargetVersion};

/// Configuration for every migration operation.
///
/// ```toml
/// url = "sqlite://app.db"
/// locations = ["db/migration"]
/// baseline_on_migrate = true
/// target = "latest"
/// ignore_migration_patterns = ["*:future", "repeatable:missing"]
///
/// [placeholders]
/// owner = "${APP_OWNER}"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    /// Connection URL (supports `${ENV_VAR}` interpolation).
    pub url: Option<String>,

    /// Directories scanned for SQL migrations.
    pub locations: Vec<String>,

    /// Name of the schema history table.
    pub table: String,

    /// Schemas managed by the engine. The first is the default schema
    /// unless `default_schema` is set.
    pub schemas: Vec<String>,

    /// Schema holding the history table.
    pub default_schema: Option<String>,

    /// Create missing schemas before creating the history table.
    pub create_schemas: bool,

    /// File prefix of versioned SQL migrations.
    pub sql_migration_prefix: String,

    /// File prefix of baseline SQL migrations.
    pub baseline_migration_prefix: String,

    /// File prefix of repeatable SQL migrations.
    pub repeatable_sql_migration_prefix: String,

    /// Separator between version and description.
    pub sql_migration_separator: String,

    /// Accepted SQL migration file suffixes.
    pub sql_migration_suffixes: Vec<String>,

    /// Version recorded by `baseline`.
    pub baseline_version: String,

    /// Description recorded by `baseline`.
    pub baseline_description: String,

    /// Baseline a non-empty schema without history during `migrate`.
    pub baseline_on_migrate: bool,

    /// Version to migrate up to.
    pub target: TargetVersion,

    /// Fail when `target` names a version that does not exist.
    pub fail_on_missing_target: bool,

    /// Only consider these migrations (versions or repeatable descriptions).
    pub cherry_pick: Vec<MigrationPattern>,

    /// Allow applying versions lower than the latest applied one.
    pub out_of_order: bool,

    /// Validate before migrating.
    pub validate_on_migrate: bool,

    /// Validation errors to suppress.
    pub ignore_migration_patterns: Vec<ValidatePattern>,

    /// Fail on SQL files that do not follow the naming convention.
    pub validate_migration_naming: bool,

    /// Record migrations without executing them.
    pub skip_executing_migrations: bool,

    /// User recorded in the history table. Defaults to the connection user.
    pub installed_by: Option<String>,

    /// Legacy history table imported on first migrate.
    pub legacy_table: Option<String>,

    /// Values substituted for `${name}` in SQL migrations.
    pub placeholders: IndexMap<String, String>,

    /// Whether placeholders are replaced.
    pub placeholder_replacement: bool,

    /// Attempts at creating the history table.
    pub create_retries: u32,

    /// Delay between creation attempts, in milliseconds.
    pub create_retry_delay_ms: u64,

    /// Do not load SQL callbacks from the migration locations.
    pub skip_default_callbacks: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            url: None,
            locations: vec!["db/migration".to_string()],
            table: "strata_schema_history".to_string(),
            schemas: Vec::new(),
            default_schema: None,
            create_schemas: true,
            sql_migration_prefix: "V".to_string(),
            baseline_migration_prefix: "B".to_string(),
            repeatable_sql_migration_prefix: "R".to_string(),
            sql_migration_separator: "__".to_string(),
            sql_migration_suffixes: vec![".sql".to_string()],
            baseline_version: "1".to_string(),
            baseline_description: "<< Strata Baseline >>".to_string(),
            baseline_on_migrate: false,
            target: TargetVersion::Latest,
            fail_on_missing_target: true,
            cherry_pick: Vec::new(),
            out_of_order: false,
            validate_on_migrate: true,
            ignore_migration_patterns: vec![ValidatePattern {
                kind: PatternKind::Any,
                state: PatternState::Future,
            }],
            validate_migration_naming: false,
            skip_executing_migrations: false,
            installed_by: None,
            legacy_table: None,
            placeholders: IndexMap::new(),
            placeholder_replacement: true,
            create_retries: 10,
            create_retry_delay_ms: 1000,
            skip_default_callbacks: false,
        }
    }
}

impl Configuration {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> StrataResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrationError::configuration(format!(
                "failed to read configuration file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> StrataResult<Self> {
        let expanded = expand_env_vars(content);

        let config: Self = toml::from_str(&expanded)
            .map_err(|e| MigrationError::configuration(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the connection URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the migration locations.
    pub fn locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locations = locations.into_iter().map(Into::into).collect();
        self
    }

    /// Set the history table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the managed schemas.
    pub fn schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemas = schemas.into_iter().map(Into::into).collect();
        self
    }

    /// Set the schema holding the history table.
    pub fn default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// Set whether missing schemas are created.
    pub fn create_schemas(mut self, create: bool) -> Self {
        self.create_schemas = create;
        self
    }

    /// Set the baseline version and description.
    pub fn baseline(mut self, version: impl Into<String>, description: impl Into<String>) -> Self {
        self.baseline_version = version.into();
        self.baseline_description = description.into();
        self
    }

    /// Baseline a non-empty schema during `migrate`.
    pub fn baseline_on_migrate(mut self, enabled: bool) -> Self {
        self.baseline_on_migrate = enabled;
        self
    }

    /// Set the target version.
    pub fn target(mut self, target: TargetVersion) -> Self {
        self.target = target;
        self
    }

    /// Set whether a missing target is an error.
    pub fn fail_on_missing_target(mut self, fail: bool) -> Self {
        self.fail_on_missing_target = fail;
        self
    }

    /// Restrict operations to the given migrations.
    pub fn cherry_pick<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cherry_pick = patterns.into_iter().map(MigrationPattern::new).collect();
        self
    }

    /// Allow out-of-order migrations.
    pub fn out_of_order(mut self, enabled: bool) -> Self {
        self.out_of_order = enabled;
        self
    }

    /// Validate before migrating.
    pub fn validate_on_migrate(mut self, enabled: bool) -> Self {
        self.validate_on_migrate = enabled;
        self
    }

    /// Replace the validation ignore patterns.
    pub fn ignore_migration_patterns(mut self, patterns: Vec<ValidatePattern>) -> Self {
        self.ignore_migration_patterns = patterns;
        self
    }

    /// Fail on invalid SQL migration file names.
    pub fn validate_migration_naming(mut self, enabled: bool) -> Self {
        self.validate_migration_naming = enabled;
        self
    }

    /// Record migrations without executing them.
    pub fn skip_executing_migrations(mut self, enabled: bool) -> Self {
        self.skip_executing_migrations = enabled;
        self
    }

    /// Set the user recorded in the history table.
    pub fn installed_by(mut self, user: impl Into<String>) -> Self {
        self.installed_by = Some(user.into());
        self
    }

    /// Import a legacy history table on first migrate.
    pub fn legacy_table(mut self, table: impl Into<String>) -> Self {
        self.legacy_table = Some(table.into());
        self
    }

    /// Add a placeholder value.
    pub fn placeholder(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.placeholders.insert(name.into(), value.into());
        self
    }

    /// Set the history creation retry policy.
    pub fn create_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.create_retries = attempts;
        self.create_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Skip SQL callbacks found in the migration locations.
    pub fn skip_default_callbacks(mut self, skip: bool) -> Self {
        self.skip_default_callbacks = skip;
        self
    }

    /// Check the configuration for contradictions.
    pub fn validate(&self) -> StrataResult<()> {
        if self.table.trim().is_empty() {
            return Err(MigrationError::configuration("table must not be empty"));
        }
        for (name, prefix) in [
            ("sql_migration_prefix", &self.sql_migration_prefix),
            ("baseline_migration_prefix", &self.baseline_migration_prefix),
            (
                "repeatable_sql_migration_prefix",
                &self.repeatable_sql_migration_prefix,
            ),
            ("sql_migration_separator", &self.sql_migration_separator),
        ] {
            if prefix.is_empty() {
                return Err(MigrationError::configuration(format!(
                    "{} must not be empty",
                    name
                )));
            }
        }
        if self.sql_migration_suffixes.is_empty()
            || self.sql_migration_suffixes.iter().any(|s| s.is_empty())
        {
            return Err(MigrationError::configuration(
                "sql_migration_suffixes must contain at least one non-empty suffix",
            ));
        }
        if self.legacy_table.as_deref() == Some(self.table.as_str()) {
            return Err(MigrationError::configuration(format!(
                "legacy_table must differ from table '{}'",
                self.table
            )));
        }
        if let Some(default_schema) = &self.default_schema {
            if !self.schemas.is_empty() && !self.schemas.contains(default_schema) {
                return Err(MigrationError::configuration(format!(
                    "default_schema '{}' is not listed in schemas",
                    default_schema
                )));
            }
        }
        self.baseline_version()?;
        if self.create_retries == 0 {
            return Err(MigrationError::configuration(
                "create_retries must be at least 1",
            ));
        }
        Ok(())
    }

    /// Parsed baseline version.
    pub fn baseline_version(&self) -> StrataResult<MigrationVersion> {
        MigrationVersion::parse(&self.baseline_version).map_err(|_| {
            MigrationError::configuration(format!(
                "invalid baseline_version '{}'",
                self.baseline_version
            ))
        })
    }

    /// Schema that holds the history table, if any.
    pub fn effective_default_schema(&self) -> Option<&str> {
        self.default_schema
            .as_deref()
            .or_else(|| self.schemas.first().map(String::as_str))
    }

    /// Retry policy for creating the history table.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .max_attempts(self.create_retries)
            .delay(Duration::from_millis(self.create_retry_delay_ms))
    }

    /// Validation policy derived from the ignore patterns.
    pub fn validation_context(&self, allow_pending: bool) -> ValidationContext {
        ValidationContext::new(self.ignore_migration_patterns.clone()).allow_pending(allow_pending)
    }

    /// State computation policy.
    pub fn info_settings(&self) -> InfoSettings {
        InfoSettings {
            target: self.target.clone(),
            cherry_pick: self.cherry_pick.clone(),
            out_of_order: self.out_of_order,
            fail_on_missing_target: self.fail_on_missing_target,
        }
    }
}

impl FromStr for Configuration {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_toml(s)
    }
}

/// Expand environment variables in the format `${VAR_NAME}`.
///
/// Unset variables are left untouched so that SQL placeholders with the
/// same syntax survive.
fn expand_env_vars(content: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };

    let mut result = content.to_string();
    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        let full_match = &cap[0];

        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(full_match, &value);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Configuration::default();
        assert_eq!(config.table, "strata_schema_history");
        assert_eq!(config.locations, vec!["db/migration"]);
        assert_eq!(config.ignore_migration_patterns[0].to_string(), "*:future");
        assert!(config.validate().is_ok());
        assert_eq!(config.retry_policy().max_attempts, 10);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
            url = "sqlite::memory:"
            locations = ["sql/schema", "sql/data"]
            schemas = ["app"]
            target = "2.1"
            cherry_pick = ["1", "Refresh_views"]
            ignore_migration_patterns = ["*:future", "repeatable:missing"]

            [placeholders]
            owner = "admin"
        "#;

        let config = Configuration::from_toml(toml).unwrap();
        assert_eq!(config.url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(config.locations.len(), 2);
        assert_eq!(
            config.target,
            TargetVersion::Version(MigrationVersion::parse("2.1").unwrap())
        );
        assert_eq!(config.cherry_pick.len(), 2);
        assert_eq!(config.ignore_migration_patterns.len(), 2);
        assert_eq!(config.placeholders.get("owner").map(String::as_str), Some("admin"));
        assert_eq!(config.effective_default_schema(), Some("app"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Configuration::from_toml("tabel = \"oops\"").unwrap_err();
        assert!(matches!(err, MigrationError::Configuration(_)));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let config = Configuration::default().legacy_table("strata_schema_history");
        assert!(config.validate().is_err());

        let config = Configuration::default()
            .schemas(["app"])
            .default_schema("other");
        assert!(config.validate().is_err());

        let config = Configuration::default().baseline("one", "nope");
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.sql_migration_separator.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_var_expansion() {
        // SAFETY: This test runs single-threaded and we clean up after
        unsafe {
            std::env::set_var("STRATA_TEST_DB_URL", "sqlite://test.db");
        }
        let expanded = expand_env_vars("url = \"${STRATA_TEST_DB_URL}\"");
        assert_eq!(expanded, "url = \"sqlite://test.db\"");
        unsafe {
            std::env::remove_var("STRATA_TEST_DB_URL");
        }

        let untouched = expand_env_vars("sql = \"${strata_unset_placeholder}\"");
        assert_eq!(untouched, "sql = \"${strata_unset_placeholder}\"");
    }

    #[test]
    fn test_derived_settings() {
        let config = Configuration::default()
            .target(TargetVersion::Current)
            .out_of_order(true)
            .cherry_pick(["3"]);
        let settings = config.info_settings();
        assert_eq!(settings.target, TargetVersion::Current);
        assert!(settings.out_of_order);
        assert_eq!(settings.cherry_pick, vec![MigrationPattern::new("3")]);

        let ctx = config.validation_context(true);
        assert!(ctx.allow_pending);
        assert_eq!(ctx.ignore_patterns.len(), 1);
    }
}
