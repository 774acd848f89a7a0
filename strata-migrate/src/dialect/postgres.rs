//! PostgreSQL dialect.

use super::{Dialect, HistoryTable, LockStatements};

/// Base key of the history advisory lock.
const LOCK_KEY_BASE: i64 = 42424242;

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Advisory lock key for a history table.
    ///
    /// Stable across processes so that every engine guarding the same table
    /// contends on the same lock.
    pub fn lock_key(table: &HistoryTable) -> i64 {
        // FNV-1a over the qualified name.
        let mut hash: u32 = 0x811c_9dc5;
        for byte in table.to_string().bytes() {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(0x0100_0193);
        }
        LOCK_KEY_BASE + hash as i64
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn handles_url(&self, url: &str) -> bool {
        url.starts_with("postgres://") || url.starts_with("postgresql://")
    }

    fn handles_product(&self, product: &str) -> bool {
        product.to_lowercase().contains("postgres")
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn installed_on_column(&self) -> &'static str {
        "TIMESTAMP NOT NULL DEFAULT now()"
    }

    fn lock_statements(&self, table: &HistoryTable) -> Option<LockStatements> {
        let key = Self::lock_key(table);
        Some(LockStatements {
            lock: format!("SELECT pg_advisory_lock({})", key),
            unlock: format!("SELECT pg_advisory_unlock({})", key),
        })
    }
}
