//! Integration tests for configuration parsing and handling.
//!
//! These tests verify that `strata.toml` files load into a working engine.

use pretty_assertions::assert_eq;
use strata::migrate::validation::{PatternKind, PatternState};
use strata::migrate::{Connection, MigrationPattern, MigrationVersion, TargetVersion, ValidatePattern};
use strata::{Configuration, MigrationError};

/// Test minimal configuration
#[test]
fn test_config_minimal() {
    let config = Configuration::from_toml(r#"url = "sqlite::memory:""#).unwrap();

    assert_eq!(config.url.as_deref(), Some("sqlite::memory:"));
    assert_eq!(config.locations, vec!["db/migration".to_string()]);
    assert_eq!(config.table, "strata_schema_history");
    assert_eq!(config.target, TargetVersion::Latest);
    assert!(config.validate_on_migrate);
}

/// Test full configuration with all options
#[test]
fn test_config_full() {
    let config_str = r#"
        url = "sqlite://app.db"
        locations = ["db/migration", "db/seed"]
        table = "schema_history"
        schemas = ["main"]
        create_schemas = false
        sql_migration_prefix = "M"
        repeatable_sql_migration_prefix = "A"
        sql_migration_separator = "-"
        sql_migration_suffixes = [".sql", ".ddl"]
        baseline_version = "1.5"
        baseline_description = "initial import"
        baseline_on_migrate = true
        target = "2.1"
        fail_on_missing_target = false
        cherry_pick = ["2", "views"]
        out_of_order = true
        ignore_migration_patterns = ["*:future", "repeatable:missing"]
        validate_migration_naming = true
        installed_by = "deployer"
        legacy_table = "schema_version"
        create_retries = 3
        create_retry_delay_ms = 50

        [placeholders]
        owner = "app"
        tablespace = "fast"
    "#;

    let config = Configuration::from_toml(config_str).unwrap();

    assert_eq!(config.locations.len(), 2);
    assert_eq!(config.table, "schema_history");
    assert_eq!(config.effective_default_schema(), Some("main"));
    assert_eq!(config.sql_migration_suffixes, vec![".sql", ".ddl"]);
    assert_eq!(
        config.baseline_version().unwrap(),
        MigrationVersion::parse("1.5").unwrap()
    );
    assert_eq!(
        config.target,
        TargetVersion::Version(MigrationVersion::parse("2.1").unwrap())
    );
    assert_eq!(
        config.cherry_pick,
        vec![MigrationPattern::new("2"), MigrationPattern::new("views")]
    );
    assert_eq!(
        config.ignore_migration_patterns,
        vec![
            ValidatePattern {
                kind: PatternKind::Any,
                state: PatternState::Future,
            },
            ValidatePattern {
                kind: PatternKind::Repeatable,
                state: PatternState::Missing,
            },
        ]
    );
    assert_eq!(
        config.placeholders.keys().collect::<Vec<_>>(),
        vec!["owner", "tablespace"]
    );
    assert_eq!(config.retry_policy().max_attempts, 3);

    let settings = config.info_settings();
    assert!(settings.out_of_order);
    assert!(!settings.fail_on_missing_target);
}

/// Test loading configuration from a file
#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strata.toml");
    std::fs::write(&path, "url = \"sqlite::memory:\"\ntarget = \"next\"\n").unwrap();

    let config = Configuration::from_file(&path).unwrap();
    assert_eq!(config.target, TargetVersion::Next);

    let missing = Configuration::from_file(dir.path().join("absent.toml"));
    assert!(matches!(missing, Err(MigrationError::Configuration(_))));
}

/// Test environment variable interpolation
#[test]
fn test_config_env_var_interpolation() {
    // SAFETY: the variable name is unique to this test.
    unsafe {
        std::env::set_var("STRATA_IT_DATABASE_PATH", "/var/lib/app.db");
    }

    let config = Configuration::from_toml(
        r#"
        url = "sqlite://${STRATA_IT_DATABASE_PATH}"

        [placeholders]
        unresolved = "${STRATA_IT_NOT_SET}"
        "#,
    )
    .unwrap();

    assert_eq!(config.url.as_deref(), Some("sqlite:///var/lib/app.db"));
    assert_eq!(config.placeholders["unresolved"], "${STRATA_IT_NOT_SET}");
}

/// Test that malformed configuration is rejected
#[test]
fn test_config_rejects_invalid_values() {
    let cases = [
        "unknown_option = true",
        "target = \"one.two\"",
        "ignore_migration_patterns = [\"everything\"]",
        "ignore_migration_patterns = [\"versioned:broken\"]",
        "baseline_version = \"x\"",
        "table = \"\"",
        "sql_migration_suffixes = []",
        "legacy_table = \"strata_schema_history\"",
        "schemas = [\"a\"]\ndefault_schema = \"b\"",
        "create_retries = 0",
    ];

    for case in cases {
        let result = Configuration::from_toml(case);
        assert!(
            matches!(result, Err(MigrationError::Configuration(_))),
            "expected a configuration error for {:?}, got {:?}",
            case,
            result
        );
    }
}

/// Test that the engine requires a URL
#[test]
fn test_sqlite_engine_requires_url() {
    let result = strata::sqlite_engine(Configuration::new());
    assert!(matches!(result, Err(MigrationError::Configuration(_))));

    let result = strata::sqlite_engine(Configuration::new().url("postgres://localhost/app"));
    assert!(result.is_err());
}

/// Test placeholders reaching executed SQL
#[tokio::test]
async fn test_config_placeholders_reach_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let migrations = dir.path().join("migrations");
    std::fs::create_dir_all(&migrations).unwrap();
    std::fs::write(
        migrations.join("V1__create.sql"),
        "CREATE TABLE ${prefix}_users (id INTEGER PRIMARY KEY);",
    )
    .unwrap();

    let db = dir.path().join("app.db");
    let config_str = format!(
        r#"
        url = "sqlite://{}"
        locations = ["{}"]

        [placeholders]
        prefix = "crm"
        "#,
        db.display(),
        migrations.display()
    );
    let config = Configuration::from_toml(&config_str).unwrap();
    let engine = strata::sqlite_engine(config).unwrap();

    let result = engine.migrate().await.unwrap();
    assert_eq!(result.migrations_executed, 1);

    let info = engine.info_service().await.unwrap();
    assert!(info.all()[0].physical_location().ends_with("V1__create.sql"));

    let conn = strata::sqlite::SqliteConnection::open(
        &strata::sqlite::SqliteConfig::file(&db),
    )
    .await
    .unwrap();
    assert!(conn.table_exists(None, "crm_users").await.unwrap());
}
