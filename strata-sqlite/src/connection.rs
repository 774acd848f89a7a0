//! SQLite implementation of the engine's connection contract.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rusqlite::types::{Value, ValueRef};
use strata_migrate::{Connection, ConnectionFactory, Row, SqlValue, StrataResult};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::config::{DatabasePath, SqliteConfig};
use crate::error::{SqliteError, SqliteResult};

/// Product name reported to dialect resolution.
pub const PRODUCT_NAME: &str = "SQLite";

/// The only schema of a plain SQLite database.
const MAIN_SCHEMA: &str = "main";

fn to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Integer(*v),
        SqlValue::Real(v) => Value::Real(*v),
        SqlValue::Text(v) => Value::Text(v.clone()),
        SqlValue::Bool(v) => Value::Integer(i64::from(*v)),
        SqlValue::Timestamp(v) => Value::Text(v.format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(v) | ValueRef::Blob(v) => {
            SqlValue::Text(String::from_utf8_lossy(v).into_owned())
        }
    }
}

fn savepoint(depth: usize) -> String {
    format!("strata_savepoint_{}", depth)
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

async fn open(config: &SqliteConfig) -> SqliteResult<tokio_rusqlite::Connection> {
    let conn = match &config.path {
        DatabasePath::Memory => tokio_rusqlite::Connection::open_in_memory().await?,
        DatabasePath::File(path) => tokio_rusqlite::Connection::open(path).await?,
    };
    let init = config.init_sql();
    conn.call(move |c| Ok(c.execute_batch(&init)?)).await?;
    debug!(path = ?config.path, "Opened SQLite connection");
    Ok(conn)
}

/// A SQLite session.
pub struct SqliteConnection {
    conn: tokio_rusqlite::Connection,
    /// Whether `close` really closes the database. False for the shared
    /// in-memory connection, whose data lives only as long as it does.
    owned: bool,
    /// Savepoints opened inside an enclosing transaction.
    savepoints: AtomicUsize,
}

impl SqliteConnection {
    /// Open a connection for `config`.
    pub async fn open(config: &SqliteConfig) -> SqliteResult<Self> {
        Ok(Self {
            conn: open(config).await?,
            owned: true,
            savepoints: AtomicUsize::new(0),
        })
    }

    fn shared(conn: tokio_rusqlite::Connection) -> Self {
        Self {
            conn,
            owned: false,
            savepoints: AtomicUsize::new(0),
        }
    }

    async fn count(&self, sql: String, params: Vec<Value>) -> SqliteResult<i64> {
        trace!(sql = %sql, "Counting");
        let count = self
            .conn
            .call(move |c| {
                let count: i64 =
                    c.query_row(&sql, rusqlite::params_from_iter(params.iter()), |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    async fn run_execute(&self, sql: &str, params: &[SqlValue]) -> SqliteResult<u64> {
        let sql = sql.to_string();
        let params: Vec<Value> = params.iter().map(to_sqlite).collect();
        debug!(sql = %sql, "Executing statement");
        let affected = self
            .conn
            .call(move |c| Ok(c.execute(&sql, rusqlite::params_from_iter(params.iter()))?))
            .await?;
        Ok(affected as u64)
    }

    async fn run_query(&self, sql: &str, params: &[SqlValue]) -> SqliteResult<Vec<Row>> {
        let sql = sql.to_string();
        let params: Vec<Value> = params.iter().map(to_sqlite).collect();
        debug!(sql = %sql, "Executing query");
        let rows = self
            .conn
            .call(move |c| {
                let mut stmt = c.prepare(&sql)?;
                let columns: Vec<String> =
                    stmt.column_names().iter().map(|s| s.to_string()).collect();
                let width = columns.len();
                let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let mut values = Vec::with_capacity(width);
                    for i in 0..width {
                        values.push(from_sqlite(row.get_ref(i)?));
                    }
                    out.push(Row::new(columns.clone(), values));
                }
                Ok(out)
            })
            .await?;
        Ok(rows)
    }

    async fn run_batch(&self, sql: &str) -> SqliteResult<()> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing batch");
        self.conn.call(move |c| Ok(c.execute_batch(&sql)?)).await?;
        Ok(())
    }

    /// Begin a transaction, or a savepoint when one is already open.
    async fn open_transaction(&self) -> SqliteResult<()> {
        let name = savepoint(self.savepoints.load(Ordering::SeqCst) + 1);
        let nested = self
            .conn
            .call(move |c| {
                if c.is_autocommit() {
                    c.execute_batch("BEGIN")?;
                    Ok(false)
                } else {
                    c.execute_batch(&format!("SAVEPOINT {}", name))?;
                    Ok(true)
                }
            })
            .await?;
        if nested {
            let depth = self.savepoints.fetch_add(1, Ordering::SeqCst) + 1;
            trace!(depth, "Opened savepoint");
        }
        Ok(())
    }

    async fn close_transaction(&self, commit: bool) -> SqliteResult<()> {
        let depth = self.savepoints.load(Ordering::SeqCst);
        if depth == 0 {
            return self.run_batch(if commit { "COMMIT" } else { "ROLLBACK" }).await;
        }
        self.savepoints.store(depth - 1, Ordering::SeqCst);
        let name = savepoint(depth);
        if commit {
            self.run_batch(&format!("RELEASE SAVEPOINT {}", name)).await
        } else {
            self.run_batch(&format!(
                "ROLLBACK TO SAVEPOINT {name};\nRELEASE SAVEPOINT {name};"
            ))
            .await
        }
    }

    async fn attached_schemas(&self) -> SqliteResult<Vec<String>> {
        let schemas = self
            .conn
            .call(|c| {
                let mut stmt = c.prepare("PRAGMA database_list")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(1))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await?;
        Ok(schemas)
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn product_name(&self) -> &str {
        PRODUCT_NAME
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> StrataResult<u64> {
        Ok(self.run_execute(sql, params).await?)
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> StrataResult<Vec<Row>> {
        Ok(self.run_query(sql, params).await?)
    }

    async fn execute_script(&self, sql: &str) -> StrataResult<()> {
        Ok(self.run_batch(sql).await?)
    }

    async fn begin(&self) -> StrataResult<()> {
        Ok(self.open_transaction().await?)
    }

    async fn commit(&self) -> StrataResult<()> {
        Ok(self.close_transaction(true).await?)
    }

    async fn rollback(&self) -> StrataResult<()> {
        Ok(self.close_transaction(false).await?)
    }

    async fn current_user(&self) -> StrataResult<String> {
        Ok(std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default())
    }

    async fn current_schema(&self) -> StrataResult<Option<String>> {
        Ok(Some(MAIN_SCHEMA.to_string()))
    }

    async fn table_exists(&self, schema: Option<&str>, table: &str) -> StrataResult<bool> {
        let sql = format!(
            "SELECT count(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
            quote(schema.unwrap_or(MAIN_SCHEMA))
        );
        Ok(self.count(sql, vec![Value::Text(table.to_string())]).await? > 0)
    }

    async fn schema_exists(&self, schema: &str) -> StrataResult<bool> {
        Ok(self
            .attached_schemas()
            .await?
            .iter()
            .any(|s| s.eq_ignore_ascii_case(schema)))
    }

    async fn schema_is_empty(&self, schema: Option<&str>) -> StrataResult<bool> {
        let sql = format!(
            "SELECT count(*) FROM {}.sqlite_master WHERE name NOT LIKE 'sqlite_%'",
            quote(schema.unwrap_or(MAIN_SCHEMA))
        );
        Ok(self.count(sql, Vec::new()).await? == 0)
    }

    async fn create_schema(&self, schema: &str) -> StrataResult<()> {
        Err(SqliteError::unsupported(format!(
            "SQLite cannot create schema '{}'; attach the database instead",
            schema
        ))
        .into())
    }

    async fn close(&self) -> StrataResult<()> {
        if self.owned {
            self.conn.clone().close().await.map_err(SqliteError::from)?;
        }
        Ok(())
    }
}

/// Opens SQLite connections for the engine.
///
/// Every in-memory connection of one factory shares a single database, so
/// that consecutive operations see each other's changes.
pub struct SqliteConnectionFactory {
    url: String,
    config: SqliteConfig,
    shared: OnceCell<tokio_rusqlite::Connection>,
}

impl SqliteConnectionFactory {
    /// Create a factory from a SQLite URL.
    pub fn new(url: impl Into<String>) -> SqliteResult<Self> {
        let url = url.into();
        let config = SqliteConfig::from_url(&url)?;
        Ok(Self::with_config(url, config))
    }

    /// Create a factory from an explicit configuration.
    pub fn with_config(url: impl Into<String>, config: SqliteConfig) -> Self {
        Self {
            url: url.into(),
            config,
            shared: OnceCell::new(),
        }
    }

    /// Create a shareable factory from a SQLite URL.
    pub fn shared(url: impl Into<String>) -> SqliteResult<Arc<Self>> {
        Self::new(url).map(Arc::new)
    }

    /// The connection settings.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }
}

#[async_trait]
impl ConnectionFactory for SqliteConnectionFactory {
    async fn connect(&self) -> StrataResult<Arc<dyn Connection>> {
        if self.config.path.is_memory() {
            let conn = self
                .shared
                .get_or_try_init(|| open(&self.config))
                .await?
                .clone();
            return Ok(Arc::new(SqliteConnection::shared(conn)));
        }
        Ok(Arc::new(SqliteConnection::open(&self.config).await?))
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory() -> Arc<dyn Connection> {
        SqliteConnectionFactory::new("sqlite::memory:")
            .unwrap()
            .connect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_and_query() {
        let conn = memory().await;
        conn.execute_script("CREATE TABLE t (id INTEGER, name TEXT, ok INTEGER);")
            .await
            .unwrap();
        let affected = conn
            .execute(
                "INSERT INTO t (id, name, ok) VALUES (?, ?, ?)",
                &[SqlValue::Integer(1), "one".into(), SqlValue::Bool(true)],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let rows = conn.query("SELECT id, name, ok FROM t", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("ID").unwrap(), 1);
        assert_eq!(rows[0].get_string("name").unwrap(), "one");
        assert!(rows[0].get_bool("ok").unwrap());
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let conn = memory().await;
        conn.execute_script("CREATE TABLE t (id INTEGER);").await.unwrap();
        conn.begin().await.unwrap();
        conn.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
        conn.rollback().await.unwrap();
        let rows = conn.query("SELECT count(*) AS n FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].get_i64("n").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_nested_transactions_use_savepoints() {
        let conn = memory().await;
        conn.execute_script("CREATE TABLE t (id INTEGER);").await.unwrap();

        conn.begin().await.unwrap();
        conn.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
        conn.begin().await.unwrap();
        conn.execute("INSERT INTO t VALUES (2)", &[]).await.unwrap();
        conn.rollback().await.unwrap();
        conn.begin().await.unwrap();
        conn.execute("INSERT INTO t VALUES (3)", &[]).await.unwrap();
        conn.commit().await.unwrap();
        conn.commit().await.unwrap();

        let rows = conn.query("SELECT id FROM t ORDER BY id", &[]).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.get_i64("id").unwrap()).collect();
        assert_eq!(ids, vec![1, 3]);

        // Back to autocommit: a plain transaction again.
        conn.begin().await.unwrap();
        conn.execute("INSERT INTO t VALUES (4)", &[]).await.unwrap();
        conn.rollback().await.unwrap();
        let rows = conn.query("SELECT count(*) AS n FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].get_i64("n").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_write_transaction_blocks_other_writers() {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteConfig::file(dir.path().join("lock.db")).busy_timeout(50);
        let first = SqliteConnection::open(&config).await.unwrap();
        let second = SqliteConnection::open(&config).await.unwrap();

        first.query("BEGIN IMMEDIATE", &[]).await.unwrap();
        let err = second.query("BEGIN IMMEDIATE", &[]).await.unwrap_err();
        assert!(err.is_transient());

        first.query("COMMIT", &[]).await.unwrap();
        second.query("BEGIN IMMEDIATE", &[]).await.unwrap();
        second.query("COMMIT", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_schema_introspection() {
        let conn = memory().await;
        assert!(conn.schema_exists("main").await.unwrap());
        assert!(!conn.schema_exists("other").await.unwrap());
        assert!(conn.schema_is_empty(Some("main")).await.unwrap());
        assert!(!conn.table_exists(None, "users").await.unwrap());

        conn.execute_script("CREATE TABLE users (id INTEGER);").await.unwrap();
        assert!(conn.table_exists(Some("main"), "users").await.unwrap());
        assert!(!conn.schema_is_empty(None).await.unwrap());
        assert!(conn.create_schema("other").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_connections_share_data() {
        let factory = SqliteConnectionFactory::new("sqlite::memory:").unwrap();
        let first = factory.connect().await.unwrap();
        first.execute_script("CREATE TABLE t (id INTEGER);").await.unwrap();
        first.close().await.unwrap();

        let second = factory.connect().await.unwrap();
        assert!(second.table_exists(None, "t").await.unwrap());
    }
}
