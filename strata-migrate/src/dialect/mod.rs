//! Database dialects.
//!
//! A [`Dialect`] is the narrow capability interface the engine needs from a
//! vendor: identifier quoting, boolean literals, bind placeholders, the
//! statements that create, read and append to the schema history table, and
//! a few behavioral flags. Everything else goes through
//! [`Connection`](crate::connection::Connection).

mod cockroach;
mod postgres;
mod sqlite;

use std::fmt;
use std::sync::Arc;

pub use cockroach::CockroachDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::error::{MigrationError, StrataResult};
use crate::history::BaselineMarker;

/// Columns of the schema history table, in select order.
pub const HISTORY_COLUMNS: [&str; 10] = [
    "installed_rank",
    "version",
    "description",
    "type",
    "script",
    "checksum",
    "installed_on",
    "installed_by",
    "execution_time",
    "success",
];

/// Location of the schema history table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTable {
    schema: Option<String>,
    name: String,
}

impl HistoryTable {
    /// Create a table reference.
    pub fn new(schema: Option<impl Into<String>>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.map(Into::into),
            name: name.into(),
        }
    }

    /// Schema, if qualified.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Unqualified table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quoted, schema-qualified name.
    pub fn qualified<D: Dialect + ?Sized>(&self, dialect: &D) -> String {
        match &self.schema {
            Some(schema) => dialect.quote(&[schema.as_str(), self.name.as_str()]),
            None => dialect.quote(&[self.name.as_str()]),
        }
    }
}

impl fmt::Display for HistoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Statements that take and release the history lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatements {
    pub lock: String,
    pub unlock: String,
}

/// Vendor capabilities used by the engine.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Dialect name.
    fn name(&self) -> &'static str;

    /// Higher priority dialects win when several match.
    fn priority(&self) -> i32 {
        0
    }

    /// Check if this dialect handles a connection URL.
    fn handles_url(&self, url: &str) -> bool;

    /// Check if this dialect handles a database product name.
    fn handles_product(&self, product: &str) -> bool;

    /// Quote a single identifier.
    fn quote_identifier(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    /// Quote and join identifier parts, e.g. `"schema"."table"`.
    fn quote(&self, parts: &[&str]) -> String {
        parts
            .iter()
            .map(|p| self.quote_identifier(p))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quote a string literal.
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Literal for `true`.
    fn boolean_true(&self) -> &'static str {
        "TRUE"
    }

    /// Literal for `false`.
    fn boolean_false(&self) -> &'static str {
        "FALSE"
    }

    /// Bind placeholder for the 1-based parameter `index`.
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Whether DDL participates in transactions.
    fn supports_ddl_transactions(&self) -> bool {
        true
    }

    /// Whether an empty string may be stored as a description.
    fn supports_empty_migration_description(&self) -> bool {
        true
    }

    /// Attempts for statements failing with a transient error.
    fn statement_retry_limit(&self) -> u32 {
        1
    }

    /// Statements guarding the history table, if the database supports them.
    fn lock_statements(&self, _table: &HistoryTable) -> Option<LockStatements> {
        None
    }

    /// Column definition of `installed_on`.
    fn installed_on_column(&self) -> &'static str {
        "TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP"
    }

    /// Index on the `success` column.
    fn create_index_statement(&self, table: &HistoryTable) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.quote_identifier(&format!("{}_s_idx", table.name())),
            table.qualified(self),
            self.quote_identifier("success")
        )
    }

    /// Script creating the history table, optionally with a baseline row.
    fn raw_create_script(
        &self,
        table: &HistoryTable,
        baseline: Option<&BaselineMarker>,
        installed_by: &str,
    ) -> String {
        let q = |c: &str| self.quote_identifier(c);
        let mut script = format!(
            "CREATE TABLE {table} (\n    {} INT NOT NULL,\n    {} VARCHAR(50),\n    {} VARCHAR(200) NOT NULL,\n    {} VARCHAR(20) NOT NULL,\n    {} VARCHAR(1000) NOT NULL,\n    {} VARCHAR(64),\n    {} VARCHAR(100) NOT NULL,\n    {} {},\n    {} INTEGER NOT NULL,\n    {} BOOLEAN NOT NULL,\n    CONSTRAINT {} PRIMARY KEY ({})\n);\n",
            q("installed_rank"),
            q("version"),
            q("description"),
            q("type"),
            q("script"),
            q("checksum"),
            q("installed_by"),
            q("installed_on"),
            self.installed_on_column(),
            q("execution_time"),
            q("success"),
            q(&format!("{}_pk", table.name())),
            q("installed_rank"),
            table = table.qualified(self),
        );
        script.push_str(&self.create_index_statement(table));
        script.push_str(";\n");
        if let Some(marker) = baseline {
            script.push_str(&self.baseline_statement(table, marker, installed_by));
            script.push_str(";\n");
        }
        script
    }

    /// Parameterized insert of one history row.
    ///
    /// Parameters: rank, version, description, type, script, checksum,
    /// installed_by, execution_time, success.
    fn insert_statement(&self, table: &HistoryTable) -> String {
        let columns = [
            "installed_rank",
            "version",
            "description",
            "type",
            "script",
            "checksum",
            "installed_by",
            "execution_time",
            "success",
        ];
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| self.placeholder(i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.qualified(self),
            columns
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders.join(", ")
        )
    }

    /// Query for rows ranked above the single parameter, in rank order.
    fn select_statement(&self, table: &HistoryTable) -> String {
        format!(
            "SELECT {} FROM {} WHERE {} > {} ORDER BY {}",
            HISTORY_COLUMNS
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", "),
            table.qualified(self),
            self.quote_identifier("installed_rank"),
            self.placeholder(1),
            self.quote_identifier("installed_rank")
        )
    }

    /// Copy every row of `from` into `to`, keeping ranks and audit columns.
    fn copy_statement(&self, from: &HistoryTable, to: &HistoryTable) -> String {
        let columns = HISTORY_COLUMNS
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({columns}) SELECT {columns} FROM {} ORDER BY {}",
            to.qualified(self),
            from.qualified(self),
            self.quote_identifier("installed_rank")
        )
    }

    /// Literal insert of the baseline row at rank 1.
    fn baseline_statement(
        &self,
        table: &HistoryTable,
        marker: &BaselineMarker,
        installed_by: &str,
    ) -> String {
        format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}) VALUES (1, {}, {}, 'BASELINE', {}, {}, 0, {})",
            table.qualified(self),
            self.quote_identifier("installed_rank"),
            self.quote_identifier("version"),
            self.quote_identifier("description"),
            self.quote_identifier("type"),
            self.quote_identifier("script"),
            self.quote_identifier("installed_by"),
            self.quote_identifier("execution_time"),
            self.quote_identifier("success"),
            self.quote_literal(&marker.version.to_string()),
            self.quote_literal(&marker.description),
            self.quote_literal(&marker.description),
            self.quote_literal(installed_by),
            self.boolean_true()
        )
    }
}

/// Picks the dialect for a connection.
#[derive(Debug, Clone)]
pub struct DialectRegistry {
    dialects: Vec<Arc<dyn Dialect>>,
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::empty()
            .register(Arc::new(PostgresDialect))
            .register(Arc::new(CockroachDialect))
            .register(Arc::new(SqliteDialect))
    }
}

impl DialectRegistry {
    /// Create a registry with the built-in dialects.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry without any dialect.
    pub fn empty() -> Self {
        Self {
            dialects: Vec::new(),
        }
    }

    /// Register a dialect.
    pub fn register(mut self, dialect: Arc<dyn Dialect>) -> Self {
        self.dialects.push(dialect);
        self.dialects.sort_by(|a, b| b.priority().cmp(&a.priority()));
        self
    }

    /// Registered dialects, highest priority first.
    pub fn dialects(&self) -> &[Arc<dyn Dialect>] {
        &self.dialects
    }

    /// Find the dialect for a product name.
    pub fn for_product(&self, product: &str) -> Option<Arc<dyn Dialect>> {
        self.dialects
            .iter()
            .find(|d| d.handles_product(product))
            .cloned()
    }

    /// Find the dialect for a connection URL.
    pub fn for_url(&self, url: &str) -> Option<Arc<dyn Dialect>> {
        self.dialects.iter().find(|d| d.handles_url(url)).cloned()
    }

    /// Find the dialect by product name, falling back to the URL.
    pub fn resolve(&self, product: &str, url: &str) -> StrataResult<Arc<dyn Dialect>> {
        self.for_product(product)
            .or_else(|| self.for_url(url))
            .ok_or_else(|| {
                MigrationError::configuration(format!(
                    "No dialect supports database '{}' ({})",
                    product, url
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::MigrationVersion;

    #[test]
    fn test_registry_resolution() {
        let registry = DialectRegistry::default();
        assert_eq!(registry.dialects()[0].name(), "cockroachdb");

        let d = registry.resolve("PostgreSQL", "postgres://localhost/app").unwrap();
        assert_eq!(d.name(), "postgresql");

        let d = registry.resolve("unknown", "sqlite::memory:").unwrap();
        assert_eq!(d.name(), "sqlite");

        let d = registry.resolve("CockroachDB CCL v23.1", "postgres://crdb").unwrap();
        assert_eq!(d.name(), "cockroachdb");

        assert!(registry.resolve("Oracle", "oracle://db").is_err());
        assert!(DialectRegistry::empty().resolve("PostgreSQL", "").is_err());
    }

    #[test]
    fn test_history_table_names() {
        let d = PostgresDialect;
        let table = HistoryTable::new(Some("app"), "strata_schema_history");
        assert_eq!(table.qualified(&d), "\"app\".\"strata_schema_history\"");
        assert_eq!(table.to_string(), "app.strata_schema_history");

        let bare = HistoryTable::new(None::<String>, "hist\"ory");
        assert_eq!(bare.qualified(&d), "\"hist\"\"ory\"");
    }

    #[test]
    fn test_create_script_with_baseline() {
        let d = SqliteDialect;
        let table = HistoryTable::new(None::<String>, "strata_schema_history");
        let marker = BaselineMarker::new(MigrationVersion::parse("3").unwrap(), "Legacy's schema");
        let script = d.raw_create_script(&table, Some(&marker), "admin");
        assert!(script.contains("CREATE TABLE \"strata_schema_history\""));
        assert!(script.contains("\"strata_schema_history_pk\""));
        assert!(script.contains("'Legacy''s schema'"));
        assert!(script.contains("'BASELINE'"));
        assert!(script.trim_end().ends_with(";"));
    }

    #[test]
    fn test_select_and_insert_statements() {
        let table = HistoryTable::new(None::<String>, "h");
        let pg = PostgresDialect;
        assert_eq!(
            pg.select_statement(&table),
            "SELECT \"installed_rank\", \"version\", \"description\", \"type\", \"script\", \"checksum\", \"installed_on\", \"installed_by\", \"execution_time\", \"success\" FROM \"h\" WHERE \"installed_rank\" > $1 ORDER BY \"installed_rank\""
        );
        assert!(pg.insert_statement(&table).ends_with("VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"));
        assert!(SqliteDialect.insert_statement(&table).ends_with("VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"));
    }

    #[test]
    fn test_copy_statement_keeps_audit_columns() {
        let legacy = HistoryTable::new(Some("public"), "schema_version");
        let table = HistoryTable::new(Some("public"), "strata_schema_history");
        let sql = PostgresDialect.copy_statement(&legacy, &table);
        assert!(sql.starts_with("INSERT INTO \"public\".\"strata_schema_history\" (\"installed_rank\""));
        assert!(sql.contains("\"installed_on\", \"installed_by\""));
        assert!(sql.contains("FROM \"public\".\"schema_version\" ORDER BY \"installed_rank\""));
    }
}
