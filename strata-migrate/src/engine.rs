//! The public entry point.
//!
//! ```rust,ignore
//! use strata_migrate::{Configuration, MigrationEngine};
//!
//! let config = Configuration::from_file("strata.toml")?;
//! let engine = MigrationEngine::builder(config, factory).build()?;
//!
//! let result = engine.migrate().await?;
//! println!("Applied {} migration(s)", result.migrations_executed);
//! ```

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

use crate::callback::{Callback, CallbackExecutor, SqlCallback};
use crate::commands;
use crate::config::Configuration;
use crate::connection::ConnectionFactory;
use crate::context::OperationContext;
use crate::dialect::{Dialect, DialectRegistry};
use crate::error::{MigrationError, StrataResult};
use crate::info::MigrationInfoService;
use crate::resolver::{
    CodeMigrationProvider, CodeMigrationResolver, CompositeMigrationResolver,
    FileSystemResourceProvider, MigrationResolver, ResourceProvider, SqlMigrationResolver,
};
use crate::results::{BaselineResult, InfoResult, MigrateResult, RepairResult, ValidateResult};

/// Builder for [`MigrationEngine`].
pub struct MigrationEngineBuilder {
    configuration: Configuration,
    factory: Arc<dyn ConnectionFactory>,
    dialects: DialectRegistry,
    resources: Option<Arc<dyn ResourceProvider>>,
    code_migrations: Option<Arc<dyn CodeMigrationProvider>>,
    callbacks: Vec<Arc<dyn Callback>>,
}

impl MigrationEngineBuilder {
    /// Register an additional dialect.
    pub fn dialect(mut self, dialect: Arc<dyn Dialect>) -> Self {
        self.dialects = self.dialects.register(dialect);
        self
    }

    /// Replace the dialect registry.
    pub fn dialects(mut self, dialects: DialectRegistry) -> Self {
        self.dialects = dialects;
        self
    }

    /// Read SQL migrations and callbacks from a custom provider instead of
    /// the configured locations.
    pub fn resource_provider(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.resources = Some(provider);
        self
    }

    /// Add code migrations.
    pub fn code_migrations(mut self, provider: Arc<dyn CodeMigrationProvider>) -> Self {
        self.code_migrations = Some(provider);
        self
    }

    /// Register a callback.
    pub fn callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Validate the configuration and build the engine.
    pub fn build(self) -> StrataResult<MigrationEngine> {
        self.configuration.validate()?;

        let resources = self.resources.unwrap_or_else(|| {
            Arc::new(FileSystemResourceProvider::new(
                self.configuration.locations.iter(),
            ))
        });

        let mut resolver = CompositeMigrationResolver::new()
            .with(Arc::new(SqlMigrationResolver::new(resources.clone())));
        if let Some(provider) = self.code_migrations {
            resolver = resolver.with(Arc::new(CodeMigrationResolver::new(provider)));
        }

        Ok(MigrationEngine {
            configuration: Arc::new(self.configuration),
            factory: self.factory,
            dialects: self.dialects,
            resources,
            resolver: Arc::new(resolver),
            callbacks: self.callbacks,
        })
    }
}

/// Runs migration commands against one database.
///
/// Every operation opens its own connection, so an engine can be reused and
/// shared.
pub struct MigrationEngine {
    configuration: Arc<Configuration>,
    factory: Arc<dyn ConnectionFactory>,
    dialects: DialectRegistry,
    resources: Arc<dyn ResourceProvider>,
    resolver: Arc<dyn MigrationResolver>,
    callbacks: Vec<Arc<dyn Callback>>,
}

impl MigrationEngine {
    /// Start building an engine.
    pub fn builder(
        configuration: Configuration,
        factory: Arc<dyn ConnectionFactory>,
    ) -> MigrationEngineBuilder {
        MigrationEngineBuilder {
            configuration,
            factory,
            dialects: DialectRegistry::default(),
            resources: None,
            code_migrations: None,
            callbacks: Vec::new(),
        }
    }

    /// The engine configuration.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    async fn callback_executor(&self) -> StrataResult<CallbackExecutor> {
        let mut executor = self
            .callbacks
            .iter()
            .cloned()
            .fold(CallbackExecutor::new(), CallbackExecutor::register);
        if !self.configuration.skip_default_callbacks {
            let sql_callbacks = SqlCallback::load_all(
                self.resources.as_ref(),
                &self.configuration.sql_migration_suffixes,
            )
            .await?;
            for callback in sql_callbacks {
                executor = executor.register(Arc::new(callback));
            }
        }
        debug!(callbacks = executor.len(), "Loaded callbacks");
        Ok(executor)
    }

    async fn open(&self) -> StrataResult<OperationContext> {
        let callbacks = self.callback_executor().await?;
        OperationContext::open(
            self.configuration.clone(),
            self.factory.as_ref(),
            &self.dialects,
            self.resolver.clone(),
            callbacks,
        )
        .await
    }

    /// Run `operation` on a fresh context and always close it.
    async fn run<T, F, Fut>(&self, operation: F) -> StrataResult<T>
    where
        F: FnOnce(Arc<OperationContext>) -> Fut,
        Fut: Future<Output = StrataResult<T>>,
    {
        let ctx = Arc::new(self.open().await?);
        let outcome = operation(ctx.clone()).await;
        ctx.close().await;
        outcome
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> StrataResult<MigrateResult> {
        info!(url = %self.factory.url(), "Starting migrate");
        self.run(|ctx| async move { commands::migrate::run(&ctx).await })
            .await
    }

    /// Validate and fail with [`MigrationError::Validate`] on violations.
    pub async fn validate(&self) -> StrataResult<()> {
        let result = self.validate_with_result().await?;
        if result.validation_successful {
            Ok(())
        } else {
            Err(MigrationError::Validate(result.error_message()))
        }
    }

    /// Validate and report violations in the result.
    pub async fn validate_with_result(&self) -> StrataResult<ValidateResult> {
        self.run(|ctx| async move { commands::validate::run(&ctx).await })
            .await
    }

    /// Mark the configured baseline version.
    pub async fn baseline(&self) -> StrataResult<BaselineResult> {
        self.run(|ctx| async move { commands::baseline::run(&ctx).await })
            .await
    }

    /// Repair the schema history.
    pub async fn repair(&self) -> StrataResult<RepairResult> {
        self.run(|ctx| async move { commands::repair::run(&ctx).await })
            .await
    }

    /// Report migration states.
    pub async fn info(&self) -> StrataResult<InfoResult> {
        self.run(|ctx| async move {
            commands::info::run(&ctx)
                .await
                .map(|(_, result)| result)
        })
        .await
    }

    /// Compute migration states for programmatic inspection.
    pub async fn info_service(&self) -> StrataResult<MigrationInfoService> {
        self.run(|ctx| async move {
            commands::info::run(&ctx)
                .await
                .map(|(service, _)| service)
        })
        .await
    }
}
