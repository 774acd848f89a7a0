//! Per-operation wiring.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::callback::CallbackExecutor;
use crate::config::Configuration;
use crate::connection::{Connection, ConnectionFactory};
use crate::dialect::{Dialect, DialectRegistry, HistoryTable};
use crate::error::StrataResult;
use crate::history::{SchemaHistory, TableSchemaHistory};
use crate::info::MigrationInfoService;
use crate::migration::ResolvedMigration;
use crate::resolver::MigrationResolver;

/// Everything one operation needs. Built fresh for every operation and
/// closed when it completes.
pub struct OperationContext {
    pub configuration: Arc<Configuration>,
    pub connection: Arc<dyn Connection>,
    pub dialect: Arc<dyn Dialect>,
    pub schema_history: Arc<dyn SchemaHistory>,
    pub callbacks: CallbackExecutor,
    pub resolver: Arc<dyn MigrationResolver>,
    /// Managed schemas; the first one holds the history table.
    pub schemas: Vec<String>,
    resolved: OnceCell<Vec<ResolvedMigration>>,
}

impl OperationContext {
    /// Assemble a context from its parts.
    pub fn new(
        configuration: Arc<Configuration>,
        connection: Arc<dyn Connection>,
        dialect: Arc<dyn Dialect>,
        schema_history: Arc<dyn SchemaHistory>,
        callbacks: CallbackExecutor,
        resolver: Arc<dyn MigrationResolver>,
        schemas: Vec<String>,
    ) -> Self {
        Self {
            configuration,
            connection,
            dialect,
            schema_history,
            callbacks,
            resolver,
            schemas,
            resolved: OnceCell::new(),
        }
    }

    /// Connect and build a context with a table-backed history.
    pub async fn open(
        configuration: Arc<Configuration>,
        factory: &dyn ConnectionFactory,
        dialects: &DialectRegistry,
        resolver: Arc<dyn MigrationResolver>,
        callbacks: CallbackExecutor,
    ) -> StrataResult<Self> {
        let connection = factory.connect().await?;
        let wired = Self::wire(
            configuration,
            connection.clone(),
            factory.url(),
            dialects,
            resolver,
            callbacks,
        )
        .await;
        match wired {
            Ok(context) => Ok(context),
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    warn!(error = %close_err, "Failed to close connection");
                }
                Err(e)
            }
        }
    }

    async fn wire(
        configuration: Arc<Configuration>,
        connection: Arc<dyn Connection>,
        url: &str,
        dialects: &DialectRegistry,
        resolver: Arc<dyn MigrationResolver>,
        callbacks: CallbackExecutor,
    ) -> StrataResult<Self> {
        let dialect = dialects.resolve(connection.product_name(), url)?;
        debug!(dialect = dialect.name(), "Selected database dialect");

        let mut schemas = configuration.schemas.clone();
        let default_schema = match configuration.effective_default_schema() {
            Some(schema) => Some(schema.to_string()),
            None => connection.current_schema().await?,
        };
        if let Some(schema) = &default_schema {
            if !schemas.contains(schema) {
                schemas.insert(0, schema.clone());
            }
        }

        let installed_by = match &configuration.installed_by {
            Some(user) => user.clone(),
            None => connection.current_user().await?,
        };

        let table = HistoryTable::new(default_schema, configuration.table.clone());
        let history = TableSchemaHistory::new(
            connection.clone(),
            dialect.clone(),
            table,
            installed_by,
        )
        .retry_policy(configuration.retry_policy());

        Ok(Self::new(
            configuration,
            connection,
            dialect,
            Arc::new(history),
            callbacks,
            resolver,
            schemas,
        ))
    }

    /// Schema holding the history table.
    pub fn default_schema(&self) -> Option<&str> {
        self.schemas.first().map(String::as_str)
    }

    /// Name of the database dialect.
    pub fn database(&self) -> &str {
        self.dialect.name()
    }

    /// Resolved migrations, computed once per operation.
    pub async fn resolved_migrations(&self) -> StrataResult<&[ResolvedMigration]> {
        let resolved = self
            .resolved
            .get_or_try_init(|| self.resolver.resolve(&self.configuration))
            .await?;
        Ok(resolved.as_slice())
    }

    /// Current migration states.
    pub async fn info(&self) -> StrataResult<MigrationInfoService> {
        let resolved = self.resolved_migrations().await?;
        let applied = self.schema_history.all_applied_migrations().await?;
        MigrationInfoService::new(resolved, &applied, &self.configuration.info_settings())
    }

    /// Close the connection. Failures are logged.
    pub async fn close(&self) {
        if let Err(e) = self.connection.close().await {
            warn!(error = %e, "Failed to close connection");
        }
    }
}
