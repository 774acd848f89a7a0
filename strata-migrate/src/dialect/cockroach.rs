//! CockroachDB dialect.

use super::{Dialect, HistoryTable, LockStatements};

/// CockroachDB.
///
/// Speaks the PostgreSQL wire protocol, so it outranks [`PostgresDialect`]
/// when both match.
///
/// [`PostgresDialect`]: super::PostgresDialect
#[derive(Debug, Clone, Copy, Default)]
pub struct CockroachDialect;

impl Dialect for CockroachDialect {
    fn name(&self) -> &'static str {
        "cockroachdb"
    }

    fn priority(&self) -> i32 {
        1
    }

    fn handles_url(&self, url: &str) -> bool {
        url.starts_with("cockroach://") || url.starts_with("cockroachdb://")
    }

    fn handles_product(&self, product: &str) -> bool {
        product.to_lowercase().contains("cockroach")
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn supports_ddl_transactions(&self) -> bool {
        false
    }

    // Serializable transactions surface contention as retryable errors.
    fn statement_retry_limit(&self) -> u32 {
        50
    }

    fn installed_on_column(&self) -> &'static str {
        "TIMESTAMP NOT NULL DEFAULT now()"
    }

    // Advisory locks are accepted but are no-ops.
    fn lock_statements(&self, _table: &HistoryTable) -> Option<LockStatements> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        let d = CockroachDialect;
        assert!(!d.supports_ddl_transactions());
        assert_eq!(d.statement_retry_limit(), 50);
        assert!(d.handles_product("CockroachDB CCL v23.1.0"));
        assert!(!d.handles_product("PostgreSQL"));
        assert!(d.lock_statements(&HistoryTable::new(None::<String>, "h")).is_none());
    }
}
