//! The narrow database contract used by the engine.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use crate::error::{MigrationError, StrataResult};

/// A value bound to, or read from, a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// Check if the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Real(v) => write!(f, "{}", v),
            Self::Text(v) => f.write_str(v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

/// A result row. Column lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row from column names and values.
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get a value by column name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    fn require(&self, column: &str) -> StrataResult<&SqlValue> {
        self.get(column)
            .ok_or_else(|| MigrationError::database(format!("column '{}' not found", column)))
    }

    fn mismatch(column: &str, expected: &str, value: &SqlValue) -> MigrationError {
        MigrationError::database(format!(
            "column '{}': expected {}, found {:?}",
            column, expected, value
        ))
    }

    /// Get an integer column.
    pub fn get_i64(&self, column: &str) -> StrataResult<i64> {
        match self.require(column)? {
            SqlValue::Integer(v) => Ok(*v),
            SqlValue::Bool(v) => Ok(*v as i64),
            SqlValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| Self::mismatch(column, "integer", &SqlValue::Text(s.clone()))),
            other => Err(Self::mismatch(column, "integer", other)),
        }
    }

    /// Get a 32-bit integer column.
    pub fn get_i32(&self, column: &str) -> StrataResult<i32> {
        let v = self.get_i64(column)?;
        i32::try_from(v).map_err(|_| Self::mismatch(column, "32-bit integer", &SqlValue::Integer(v)))
    }

    /// Get a non-null text column.
    pub fn get_string(&self, column: &str) -> StrataResult<String> {
        match self.get_opt_string(column)? {
            Some(s) => Ok(s),
            None => Err(Self::mismatch(column, "text", &SqlValue::Null)),
        }
    }

    /// Get a nullable text column.
    pub fn get_opt_string(&self, column: &str) -> StrataResult<Option<String>> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            SqlValue::Integer(v) => Ok(Some(v.to_string())),
            SqlValue::Real(v) => Ok(Some(v.to_string())),
            other => Err(Self::mismatch(column, "text", other)),
        }
    }

    /// Get a boolean column. Accepts integers and `t`/`true` text.
    pub fn get_bool(&self, column: &str) -> StrataResult<bool> {
        match self.require(column)? {
            SqlValue::Bool(v) => Ok(*v),
            SqlValue::Integer(v) => Ok(*v != 0),
            SqlValue::Text(s) => match s.trim().to_lowercase().as_str() {
                "t" | "true" | "1" => Ok(true),
                "f" | "false" | "0" => Ok(false),
                _ => Err(Self::mismatch(column, "boolean", &SqlValue::Text(s.clone()))),
            },
            other => Err(Self::mismatch(column, "boolean", other)),
        }
    }

    /// Get a timestamp column. Text values are parsed in the common SQL
    /// formats and in RFC 3339.
    pub fn get_timestamp(&self, column: &str) -> StrataResult<DateTime<Utc>> {
        match self.require(column)? {
            SqlValue::Timestamp(v) => Ok(*v),
            SqlValue::Integer(secs) => DateTime::from_timestamp(*secs, 0)
                .ok_or_else(|| Self::mismatch(column, "timestamp", &SqlValue::Integer(*secs))),
            SqlValue::Text(s) => parse_timestamp(s)
                .ok_or_else(|| Self::mismatch(column, "timestamp", &SqlValue::Text(s.clone()))),
            other => Err(Self::mismatch(column, "timestamp", other)),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    .map(|naive| naive.and_utc())
}

/// A database session.
///
/// Implementations are expected to be used by one operation at a time;
/// transaction state lives on the connection.
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    /// Product name reported by the database, used to pick a dialect.
    fn product_name(&self) -> &str;

    /// Execute a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> StrataResult<u64>;

    /// Run a query and collect its rows.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> StrataResult<Vec<Row>>;

    /// Execute a script of one or more statements.
    async fn execute_script(&self, sql: &str) -> StrataResult<()>;

    /// Begin a transaction.
    async fn begin(&self) -> StrataResult<()>;

    /// Commit the current transaction.
    async fn commit(&self) -> StrataResult<()>;

    /// Roll back the current transaction.
    async fn rollback(&self) -> StrataResult<()>;

    /// The database user of this session.
    async fn current_user(&self) -> StrataResult<String>;

    /// The schema used for unqualified names.
    async fn current_schema(&self) -> StrataResult<Option<String>>;

    /// Check if a table exists.
    async fn table_exists(&self, schema: Option<&str>, table: &str) -> StrataResult<bool>;

    /// Check if a schema exists.
    async fn schema_exists(&self, schema: &str) -> StrataResult<bool>;

    /// Check if a schema contains no objects.
    async fn schema_is_empty(&self, schema: Option<&str>) -> StrataResult<bool>;

    /// Create a schema.
    async fn create_schema(&self, schema: &str) -> StrataResult<()>;

    /// Reset session state changed by migrations.
    async fn restore_original_state(&self) -> StrataResult<()> {
        Ok(())
    }

    /// Close the session.
    async fn close(&self) -> StrataResult<()> {
        Ok(())
    }
}

/// Opens connections for operations.
#[async_trait::async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a new connection.
    async fn connect(&self) -> StrataResult<Arc<dyn Connection>>;

    /// The URL this factory connects to.
    fn url(&self) -> &str;
}

/// Run `work` inside a transaction.
///
/// Commits on success. On failure the transaction is rolled back and the
/// original error is returned; a rollback failure is only logged.
pub async fn in_transaction<T, F>(connection: &dyn Connection, work: F) -> StrataResult<T>
where
    T: Send,
    F: Future<Output = StrataResult<T>> + Send,
{
    connection.begin().await?;
    match work.await {
        Ok(value) => {
            connection.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = connection.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
