//! Schema history stored in a database table.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::{BaselineMarker, EMPTY_DESCRIPTION, RetryPolicy, SchemaHistory};
use crate::checksum::Checksum;
use crate::connection::{Connection, Row, SqlValue, in_transaction};
use crate::dialect::{Dialect, HistoryTable};
use crate::error::{MigrationError, StrataResult};
use crate::migration::{AppliedMigration, NewAppliedMigration, ResolvedMigration};
use crate::results::{RepairOutput, RepairResult};
use crate::validation::{MigrationPattern, is_cherry_picked};
use crate::version::MigrationVersion;

/// Rows read so far. Replaced as a whole on refresh.
#[derive(Debug, Default)]
struct CacheSnapshot {
    last_rank: i32,
    migrations: Arc<Vec<AppliedMigration>>,
}

/// Schema history kept in a table of the target database.
pub struct TableSchemaHistory {
    connection: Arc<dyn Connection>,
    dialect: Arc<dyn Dialect>,
    table: HistoryTable,
    installed_by: String,
    retry: RetryPolicy,
    cache: RwLock<Arc<CacheSnapshot>>,
    lock_depth: AtomicUsize,
}

impl TableSchemaHistory {
    /// Create a store for `table`.
    pub fn new(
        connection: Arc<dyn Connection>,
        dialect: Arc<dyn Dialect>,
        table: HistoryTable,
        installed_by: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            dialect,
            table,
            installed_by: installed_by.into(),
            retry: RetryPolicy::default(),
            cache: RwLock::new(Arc::new(CacheSnapshot::default())),
            lock_depth: AtomicUsize::new(0),
        }
    }

    /// Set the retry policy for creating the table.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The table this store writes to.
    pub fn table(&self) -> &HistoryTable {
        &self.table
    }

    fn qualified(&self) -> String {
        self.table.qualified(self.dialect.as_ref())
    }

    /// Run a statement, retrying transient failures up to the dialect limit.
    async fn with_retries<T, F, Fut>(&self, mut op: F) -> StrataResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StrataResult<T>>,
    {
        let limit = self.dialect.statement_retry_limit().max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < limit => {
                    debug!(attempt, error = %e, "Retrying statement after transient error");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> StrataResult<u64> {
        debug!(sql = %sql, "Executing history statement");
        self.with_retries(|| self.connection.execute(sql, params))
            .await
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> StrataResult<Vec<Row>> {
        debug!(sql = %sql, "Querying history");
        self.with_retries(|| self.connection.query(sql, params)).await
    }

    async fn try_create(&self, baseline: Option<&BaselineMarker>) -> StrataResult<()> {
        self.lock().await?;
        let result = self.create_unlocked(baseline).await;
        let unlocked = self.unlock().await;
        result?;
        unlocked
    }

    async fn create_unlocked(&self, baseline: Option<&BaselineMarker>) -> StrataResult<()> {
        if self.exists().await? {
            debug!(table = %self.table, "Schema history table already exists");
            return Ok(());
        }

        info!(table = %self.table, "Creating schema history table");
        let script = self
            .dialect
            .raw_create_script(&self.table, baseline, &self.installed_by);
        let connection = self.connection.as_ref();
        if self.dialect.supports_ddl_transactions() {
            in_transaction(connection, connection.execute_script(&script)).await?;
        } else {
            connection.execute_script(&script).await?;
        }
        self.clear_cache();

        if let Some(marker) = baseline {
            info!(version = %marker.version, "Created schema history table with baseline");
        }
        Ok(())
    }

    async fn copy_unlocked(&self, legacy: &HistoryTable) -> StrataResult<u64> {
        if self.exists().await? {
            debug!(table = %self.table, "Schema history table already exists");
            return Ok(0);
        }

        let script = self
            .dialect
            .raw_create_script(&self.table, None, &self.installed_by);
        let copy = self.dialect.copy_statement(legacy, &self.table);
        let connection = self.connection.as_ref();
        self.clear_cache();
        if self.dialect.supports_ddl_transactions() {
            return in_transaction(connection, async {
                connection.execute_script(&script).await?;
                connection.execute(&copy, &[]).await
            })
            .await;
        }

        connection.execute_script(&script).await?;
        match connection.execute(&copy, &[]).await {
            Ok(copied) => Ok(copied),
            Err(e) => {
                let drop = format!("DROP TABLE {}", self.qualified());
                if let Err(drop_err) = connection.execute_script(&drop).await {
                    warn!(error = %drop_err, "Failed to drop partially copied schema history table");
                }
                Err(e)
            }
        }
    }

    async fn insert_row(&self, migration: &NewAppliedMigration) -> StrataResult<()> {
        let rows = self
            .query(
                &format!(
                    "SELECT MAX({}) AS max_rank FROM {}",
                    self.dialect.quote_identifier("installed_rank"),
                    self.qualified()
                ),
                &[],
            )
            .await?;
        let max_rank = match rows.first().and_then(|r| r.get("max_rank")) {
            None | Some(SqlValue::Null) => 0,
            Some(_) => rows[0].get_i32("max_rank")?,
        };

        let description = if migration.description.is_empty()
            && !self.dialect.supports_empty_migration_description()
        {
            EMPTY_DESCRIPTION.to_string()
        } else {
            migration.description.clone()
        };

        let params = [
            SqlValue::Integer(max_rank as i64 + 1),
            SqlValue::from(migration.version.as_ref().map(|v| v.to_string())),
            SqlValue::Text(description),
            SqlValue::from(migration.migration_type.as_str()),
            SqlValue::Text(migration.script.clone()),
            SqlValue::from(migration.checksum.map(|c| c.to_string())),
            SqlValue::Text(self.installed_by.clone()),
            SqlValue::Integer(migration.execution_time as i64),
            SqlValue::Bool(migration.success),
        ];
        self.execute(&self.dialect.insert_statement(&self.table), &params)
            .await?;
        debug!(
            rank = max_rank + 1,
            migration_type = %migration.migration_type,
            success = migration.success,
            "Appended schema history row"
        );
        Ok(())
    }
}

/// Map a history row.
fn applied_from_row(row: &Row) -> StrataResult<AppliedMigration> {
    let version = match row.get_opt_string("version")? {
        Some(v) if !v.trim().is_empty() => Some(MigrationVersion::parse(&v)?),
        _ => None,
    };
    let checksum = match row.get_opt_string("checksum")? {
        Some(c) if !c.trim().is_empty() => Some(Checksum::parse(&c)?),
        _ => None,
    };
    let mut description = row.get_string("description")?;
    if description == EMPTY_DESCRIPTION {
        description.clear();
    }
    Ok(AppliedMigration {
        installed_rank: row.get_i32("installed_rank")?,
        version,
        description,
        migration_type: row.get_string("type")?.parse().map_err(|_| {
            MigrationError::corrupted(format!(
                "unknown migration type in row {}",
                row.get_i64("installed_rank").unwrap_or_default()
            ))
        })?,
        script: row.get_string("script")?,
        checksum,
        installed_on: row.get_timestamp("installed_on")?,
        installed_by: row.get_string("installed_by")?,
        execution_time: row.get_i32("execution_time")?,
        success: row.get_bool("success")?,
    })
}

#[async_trait::async_trait]
impl SchemaHistory for TableSchemaHistory {
    fn table_name(&self) -> String {
        self.table.to_string()
    }

    async fn exists(&self) -> StrataResult<bool> {
        self.connection
            .table_exists(self.table.schema(), self.table.name())
            .await
    }

    async fn create(&self, baseline: Option<&BaselineMarker>) -> StrataResult<()> {
        self.connection.restore_original_state().await?;

        let mut attempt = 1;
        loop {
            match self.try_create(baseline).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retry.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "Schema history table creation failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => {
                    return Err(MigrationError::UnableToCreateHistory {
                        table: self.table.to_string(),
                        source: Box::new(e),
                    });
                }
            }
        }
    }

    async fn create_from_legacy(&self, legacy: &HistoryTable) -> StrataResult<u64> {
        self.connection.restore_original_state().await?;
        self.lock().await?;
        let result = self.copy_unlocked(legacy).await;
        let unlocked = self.unlock().await;
        let copied = result?;
        unlocked?;
        Ok(copied)
    }

    async fn lock(&self) -> StrataResult<()> {
        if self.lock_depth.fetch_add(1, Ordering::SeqCst) > 0 {
            return Ok(());
        }
        let Some(statements) = self.dialect.lock_statements(&self.table) else {
            return Ok(());
        };

        debug!(table = %self.table, "Locking schema history");
        let mut attempt = 1;
        loop {
            match self.query(&statements.lock, &[]).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    info!(
                        attempt,
                        table = %self.table,
                        "Schema history is locked by another session, waiting"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => {
                    self.lock_depth.fetch_sub(1, Ordering::SeqCst);
                    return Err(MigrationError::lock_failed(self.table.to_string(), e));
                }
            }
        }
    }

    async fn unlock(&self) -> StrataResult<()> {
        let released = self
            .lock_depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
                depth.checked_sub(1)
            });
        match released {
            Ok(1) => {}
            _ => return Ok(()),
        }
        if let Some(statements) = self.dialect.lock_statements(&self.table) {
            debug!(table = %self.table, "Unlocking schema history");
            self.query(&statements.unlock, &[]).await?;
        }
        Ok(())
    }

    async fn all_applied_migrations(&self) -> StrataResult<Vec<AppliedMigration>> {
        if !self.exists().await? {
            return Ok(Vec::new());
        }

        let snapshot = Arc::clone(&self.cache.read());
        let rows = self
            .query(
                &self.dialect.select_statement(&self.table),
                &[SqlValue::Integer(snapshot.last_rank as i64)],
            )
            .await?;
        if rows.is_empty() {
            return Ok(snapshot.migrations.as_ref().clone());
        }

        let mut migrations = snapshot.migrations.as_ref().clone();
        for row in &rows {
            migrations.push(applied_from_row(row)?);
        }
        let last_rank = migrations
            .last()
            .map(|am| am.installed_rank)
            .unwrap_or(snapshot.last_rank);
        *self.cache.write() = Arc::new(CacheSnapshot {
            last_rank,
            migrations: Arc::new(migrations.clone()),
        });
        Ok(migrations)
    }

    async fn add_applied_migration(&self, migration: NewAppliedMigration) -> StrataResult<()> {
        let wrap = |e: MigrationError| MigrationError::UnableToInsertRow {
            table: self.table.to_string(),
            version: migration
                .version
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| migration.description.clone()),
            source: Box::new(e),
        };

        self.connection.restore_original_state().await.map_err(wrap)?;

        let explicit_lock = !self.dialect.supports_ddl_transactions();
        if explicit_lock {
            self.lock().await.map_err(wrap)?;
        }
        let result = self.insert_row(&migration).await;
        if explicit_lock {
            if let Err(e) = self.unlock().await {
                warn!(error = %e, "Failed to release schema history lock");
            }
        }
        result.map_err(wrap)
    }

    async fn remove_failed_migrations(
        &self,
        result: &mut RepairResult,
        filter: &[MigrationPattern],
    ) -> StrataResult<bool> {
        if !self.exists().await? {
            info!(table = %self.table, "Repair of failed migration skipped: schema history table does not exist");
            return Ok(false);
        }

        let failed: Vec<AppliedMigration> = self
            .all_applied_migrations()
            .await?
            .into_iter()
            .filter(|am| !am.success)
            .collect();
        if failed.is_empty() {
            info!("Repair of failed migration skipped: no failed migration found");
            return Ok(false);
        }

        self.clear_cache();
        let removed: Vec<&AppliedMigration> = if filter.is_empty() {
            self.execute(
                &format!(
                    "DELETE FROM {} WHERE {} = {}",
                    self.qualified(),
                    self.dialect.quote_identifier("success"),
                    self.dialect.boolean_false()
                ),
                &[],
            )
            .await?;
            failed.iter().collect()
        } else {
            let sql = format!(
                "DELETE FROM {} WHERE {} = {}",
                self.qualified(),
                self.dialect.quote_identifier("installed_rank"),
                self.dialect.placeholder(1)
            );
            let mut removed = Vec::new();
            for am in &failed {
                if is_cherry_picked(filter, am.version.as_ref(), &am.description) {
                    self.execute(&sql, &[SqlValue::from(am.installed_rank)])
                        .await?;
                    removed.push(am);
                }
            }
            removed
        };

        for am in &removed {
            info!(
                version = %am.version.as_ref().map(|v| v.to_string()).unwrap_or_default(),
                description = %am.description,
                "Removed failed migration from schema history"
            );
            result.migrations_removed.push(RepairOutput {
                version: am.version.as_ref().map(|v| v.to_string()).unwrap_or_default(),
                description: am.description.clone(),
                file_path: am.script.clone(),
            });
        }
        if !removed.is_empty() {
            result.add_action("REMOVED_FAILED_MIGRATIONS");
        }
        Ok(!removed.is_empty())
    }

    async fn update(
        &self,
        applied: &AppliedMigration,
        resolved: &ResolvedMigration,
    ) -> StrataResult<()> {
        self.clear_cache();
        info!(
            version = %applied.version.as_ref().map(|v| v.to_string()).unwrap_or_default(),
            description = %resolved.description,
            "Repairing schema history entry"
        );
        let sql = format!(
            "UPDATE {} SET {} = {}, {} = {}, {} = {} WHERE {} = {}",
            self.qualified(),
            self.dialect.quote_identifier("description"),
            self.dialect.placeholder(1),
            self.dialect.quote_identifier("type"),
            self.dialect.placeholder(2),
            self.dialect.quote_identifier("checksum"),
            self.dialect.placeholder(3),
            self.dialect.quote_identifier("installed_rank"),
            self.dialect.placeholder(4)
        );
        self.execute(
            &sql,
            &[
                SqlValue::Text(resolved.description.clone()),
                SqlValue::from(resolved.migration_type.as_str()),
                SqlValue::from(resolved.checksum.map(|c| c.to_string())),
                SqlValue::from(applied.installed_rank),
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, applied: &AppliedMigration) -> StrataResult<()> {
        self.clear_cache();
        self.add_applied_migration(NewAppliedMigration::deletion_of(applied))
            .await
    }

    fn clear_cache(&self) {
        *self.cache.write() = Arc::new(CacheSnapshot::default());
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::dialect::{CockroachDialect, PostgresDialect};
    use crate::migration::MigrationType;

    #[derive(Default)]
    struct RecordingConnection {
        statements: Mutex<Vec<String>>,
        transient_failures: Mutex<u32>,
        table_missing: Mutex<bool>,
        scripts_fail: Mutex<bool>,
    }

    impl RecordingConnection {
        fn statements(&self) -> Vec<String> {
            self.statements.lock().clone()
        }

        fn record(&self, sql: &str) -> StrataResult<()> {
            self.statements.lock().push(sql.to_string());
            let mut failures = self.transient_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(MigrationError::transient("restart transaction"));
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl Connection for RecordingConnection {
        fn product_name(&self) -> &str {
            "PostgreSQL"
        }

        async fn execute(&self, sql: &str, _: &[SqlValue]) -> StrataResult<u64> {
            self.record(sql).map(|_| 1)
        }

        async fn query(&self, sql: &str, _: &[SqlValue]) -> StrataResult<Vec<Row>> {
            self.record(sql).map(|_| Vec::new())
        }

        async fn execute_script(&self, sql: &str) -> StrataResult<()> {
            self.record(sql)?;
            if *self.scripts_fail.lock() {
                return Err(MigrationError::database("permission denied for schema public"));
            }
            Ok(())
        }

        async fn begin(&self) -> StrataResult<()> {
            Ok(())
        }

        async fn commit(&self) -> StrataResult<()> {
            Ok(())
        }

        async fn rollback(&self) -> StrataResult<()> {
            Ok(())
        }

        async fn current_user(&self) -> StrataResult<String> {
            Ok("tester".to_string())
        }

        async fn current_schema(&self) -> StrataResult<Option<String>> {
            Ok(Some("public".to_string()))
        }

        async fn table_exists(&self, _: Option<&str>, _: &str) -> StrataResult<bool> {
            Ok(!*self.table_missing.lock())
        }

        async fn schema_exists(&self, _: &str) -> StrataResult<bool> {
            Ok(true)
        }

        async fn schema_is_empty(&self, _: Option<&str>) -> StrataResult<bool> {
            Ok(true)
        }

        async fn create_schema(&self, _: &str) -> StrataResult<()> {
            Ok(())
        }
    }

    fn history(connection: Arc<RecordingConnection>, dialect: Arc<dyn Dialect>) -> TableSchemaHistory {
        TableSchemaHistory::new(
            connection,
            dialect,
            HistoryTable::new(Some("public"), "strata_schema_history"),
            "tester",
        )
    }

    #[tokio::test]
    async fn test_lock_is_reentrant() {
        let conn = Arc::new(RecordingConnection::default());
        let store = history(conn.clone(), Arc::new(PostgresDialect));

        store.lock().await.unwrap();
        store.lock().await.unwrap();
        store.unlock().await.unwrap();
        store.unlock().await.unwrap();
        store.unlock().await.unwrap();

        let statements = conn.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("pg_advisory_lock"));
        assert!(statements[1].contains("pg_advisory_unlock"));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let conn = Arc::new(RecordingConnection::default());
        *conn.transient_failures.lock() = 2;
        let store = history(conn.clone(), Arc::new(CockroachDialect));

        store.execute("UPDATE t SET x = 1", &[]).await.unwrap();
        assert_eq!(conn.statements().len(), 3);
    }

    #[tokio::test]
    async fn test_transient_errors_exhaust_without_retry_budget() {
        let conn = Arc::new(RecordingConnection::default());
        *conn.transient_failures.lock() = 1;
        let store = history(conn.clone(), Arc::new(PostgresDialect));

        let err = store.execute("UPDATE t SET x = 1", &[]).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_create_skips_existing_table() {
        let conn = Arc::new(RecordingConnection::default());
        let store = history(conn.clone(), Arc::new(PostgresDialect));
        store.create(None).await.unwrap();
        assert!(conn.statements().iter().all(|s| !s.starts_with("CREATE TABLE")));
    }

    #[tokio::test]
    async fn test_create_retries_then_gives_up() {
        let conn = Arc::new(RecordingConnection::default());
        *conn.table_missing.lock() = true;
        *conn.scripts_fail.lock() = true;
        let store = history(conn.clone(), Arc::new(PostgresDialect)).retry_policy(
            RetryPolicy::new()
                .max_attempts(3)
                .delay(std::time::Duration::from_millis(1)),
        );

        let err = store.create(None).await.unwrap_err();
        match &err {
            MigrationError::UnableToCreateHistory { table, source } => {
                assert_eq!(table, "public.strata_schema_history");
                assert!(source.to_string().contains("permission denied"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let statements = conn.statements();
        let creates = statements.iter().filter(|s| s.contains("CREATE TABLE")).count();
        assert_eq!(creates, 3);
        let unlocks = statements.iter().filter(|s| s.contains("pg_advisory_unlock")).count();
        assert_eq!(unlocks, 3);
    }

    #[tokio::test]
    async fn test_lock_waits_out_transient_contention() {
        let conn = Arc::new(RecordingConnection::default());
        *conn.transient_failures.lock() = 2;
        let store = history(conn.clone(), Arc::new(PostgresDialect)).retry_policy(
            RetryPolicy::new()
                .max_attempts(3)
                .delay(std::time::Duration::from_millis(1)),
        );

        store.lock().await.unwrap();
        store.unlock().await.unwrap();
        let statements = conn.statements();
        assert_eq!(statements.len(), 4);
        assert!(statements[..3].iter().all(|s| s.contains("pg_advisory_lock")));
    }

    #[tokio::test]
    async fn test_lock_failure_keeps_cause() {
        let conn = Arc::new(RecordingConnection::default());
        *conn.transient_failures.lock() = 5;
        let store = history(conn.clone(), Arc::new(PostgresDialect)).retry_policy(
            RetryPolicy::new()
                .max_attempts(2)
                .delay(std::time::Duration::from_millis(1)),
        );

        let err = store.lock().await.unwrap_err();
        assert!(matches!(err, MigrationError::LockFailed { .. }));
        assert!(err.is_transient());
        assert_eq!(
            std::error::Error::source(&err).map(|s| s.to_string()),
            Some("Database error: restart transaction".to_string())
        );

        // The failed attempt does not count as holding the lock.
        *conn.transient_failures.lock() = 0;
        store.lock().await.unwrap();
        assert_eq!(conn.statements().len(), 3);
    }

    #[tokio::test]
    async fn test_legacy_copy_creates_then_copies() {
        let conn = Arc::new(RecordingConnection::default());
        *conn.table_missing.lock() = true;
        let store = history(conn.clone(), Arc::new(PostgresDialect));
        let legacy = HistoryTable::new(Some("public"), "schema_version");

        store.create_from_legacy(&legacy).await.unwrap();
        let statements = conn.statements();
        assert!(statements[1].contains("CREATE TABLE"));
        assert!(statements[2].starts_with("INSERT INTO \"public\".\"strata_schema_history\""));
        assert!(statements[2].contains("FROM \"public\".\"schema_version\""));

        *conn.table_missing.lock() = false;
        assert_eq!(store.create_from_legacy(&legacy).await.unwrap(), 0);
    }

    #[test]
    fn test_empty_description_marker_reads_back_empty() {
        let row = Row::new(
            crate::dialect::HISTORY_COLUMNS.iter().map(|c| c.to_string()).collect(),
            vec![
                SqlValue::Integer(1),
                SqlValue::Text("1".to_string()),
                SqlValue::Text(EMPTY_DESCRIPTION.to_string()),
                SqlValue::Text("SQL".to_string()),
                SqlValue::Text("V1.sql".to_string()),
                SqlValue::Null,
                SqlValue::Text("2024-01-02 03:04:05".to_string()),
                SqlValue::Text("admin".to_string()),
                SqlValue::Integer(1),
                SqlValue::Integer(1),
            ],
        );
        assert_eq!(applied_from_row(&row).unwrap().description, "");
    }

    #[test]
    fn test_row_mapping() {
        let checksum = Checksum::of_lines("CREATE TABLE t (id INT);");
        let row = Row::new(
            crate::dialect::HISTORY_COLUMNS.iter().map(|c| c.to_string()).collect(),
            vec![
                SqlValue::Integer(2),
                SqlValue::Text("1.1".to_string()),
                SqlValue::Text("add table".to_string()),
                SqlValue::Text("SQL".to_string()),
                SqlValue::Text("V1_1__add_table.sql".to_string()),
                SqlValue::Text(checksum.to_string()),
                SqlValue::Text("2024-01-02 03:04:05".to_string()),
                SqlValue::Text("admin".to_string()),
                SqlValue::Integer(12),
                SqlValue::Integer(1),
            ],
        );
        let am = applied_from_row(&row).unwrap();
        assert_eq!(am.installed_rank, 2);
        assert_eq!(am.version, Some(MigrationVersion::parse("1.1").unwrap()));
        assert_eq!(am.migration_type, MigrationType::Sql);
        assert_eq!(am.checksum, Some(checksum));
        assert!(am.success);
    }
}
