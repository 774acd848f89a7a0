//! SQLite dialect.

use super::{Dialect, HistoryTable, LockStatements};

/// SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn handles_url(&self, url: &str) -> bool {
        url.starts_with("sqlite:") || url.starts_with("file:") || url.ends_with(".db")
    }

    fn handles_product(&self, product: &str) -> bool {
        product.to_lowercase().contains("sqlite")
    }

    fn boolean_true(&self) -> &'static str {
        "1"
    }

    fn boolean_false(&self) -> &'static str {
        "0"
    }

    // The write transaction is held until unlock; transactions opened while it
    // is held run as savepoints.
    fn lock_statements(&self, _table: &HistoryTable) -> Option<LockStatements> {
        Some(LockStatements {
            lock: "BEGIN IMMEDIATE".to_string(),
            unlock: "COMMIT".to_string(),
        })
    }

    fn installed_on_column(&self) -> &'static str {
        "TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f','now'))"
    }

    // Index names carry the schema; the table name must stay unqualified.
    fn create_index_statement(&self, table: &HistoryTable) -> String {
        let index = format!("{}_s_idx", table.name());
        let index = match table.schema() {
            Some(schema) => self.quote(&[schema, index.as_str()]),
            None => self.quote_identifier(&index),
        };
        format!(
            "CREATE INDEX {} ON {} ({})",
            index,
            self.quote_identifier(table.name()),
            self.quote_identifier("success")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_uses_schema_on_index_name() {
        let table = HistoryTable::new(Some("main"), "history");
        assert_eq!(
            SqliteDialect.create_index_statement(&table),
            "CREATE INDEX \"main\".\"history_s_idx\" ON \"history\" (\"success\")"
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(SqliteDialect.boolean_true(), "1");
        assert_eq!(SqliteDialect.quote_literal("it's"), "'it''s'");
        assert!(SqliteDialect.handles_url("sqlite::memory:"));
    }

    #[test]
    fn test_lock_takes_write_transaction() {
        let statements = SqliteDialect
            .lock_statements(&HistoryTable::new(Some("main"), "history"))
            .unwrap();
        assert_eq!(statements.lock, "BEGIN IMMEDIATE");
        assert_eq!(statements.unlock, "COMMIT");
    }
}
