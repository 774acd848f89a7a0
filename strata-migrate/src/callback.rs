//! Lifecycle callbacks.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::Configuration;
use crate::connection::Connection;
use crate::error::{MigrationError, StrataResult};
use crate::info::MigrationInfo;
use crate::resolver::{Resource, ResourceProvider};
use crate::results::OperationResult;

/// A point in the lifecycle of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    BeforeMigrate,
    BeforeEachMigrate,
    AfterEachMigrate,
    AfterEachMigrateError,
    AfterMigrate,
    AfterMigrateApplied,
    AfterMigrateError,
    AfterMigrateOperationFinish,
    BeforeValidate,
    AfterValidate,
    AfterValidateError,
    AfterValidateOperationFinish,
    BeforeBaseline,
    AfterBaseline,
    AfterBaselineError,
    AfterBaselineOperationFinish,
    BeforeRepair,
    AfterRepair,
    AfterRepairError,
    AfterRepairOperationFinish,
    BeforeInfo,
    AfterInfo,
    AfterInfoError,
    AfterInfoOperationFinish,
    CreateSchema,
}

impl Event {
    /// Every event, in declaration order.
    pub const ALL: [Event; 25] = [
        Self::BeforeMigrate,
        Self::BeforeEachMigrate,
        Self::AfterEachMigrate,
        Self::AfterEachMigrateError,
        Self::AfterMigrate,
        Self::AfterMigrateApplied,
        Self::AfterMigrateError,
        Self::AfterMigrateOperationFinish,
        Self::BeforeValidate,
        Self::AfterValidate,
        Self::AfterValidateError,
        Self::AfterValidateOperationFinish,
        Self::BeforeBaseline,
        Self::AfterBaseline,
        Self::AfterBaselineError,
        Self::AfterBaselineOperationFinish,
        Self::BeforeRepair,
        Self::AfterRepair,
        Self::AfterRepairError,
        Self::AfterRepairOperationFinish,
        Self::BeforeInfo,
        Self::AfterInfo,
        Self::AfterInfoError,
        Self::AfterInfoOperationFinish,
        Self::CreateSchema,
    ];

    /// Stable identifier, also used as the SQL callback file name.
    pub fn id(&self) -> &'static str {
        match self {
            Self::BeforeMigrate => "beforeMigrate",
            Self::BeforeEachMigrate => "beforeEachMigrate",
            Self::AfterEachMigrate => "afterEachMigrate",
            Self::AfterEachMigrateError => "afterEachMigrateError",
            Self::AfterMigrate => "afterMigrate",
            Self::AfterMigrateApplied => "afterMigrateApplied",
            Self::AfterMigrateError => "afterMigrateError",
            Self::AfterMigrateOperationFinish => "afterMigrateOperationFinish",
            Self::BeforeValidate => "beforeValidate",
            Self::AfterValidate => "afterValidate",
            Self::AfterValidateError => "afterValidateError",
            Self::AfterValidateOperationFinish => "afterValidateOperationFinish",
            Self::BeforeBaseline => "beforeBaseline",
            Self::AfterBaseline => "afterBaseline",
            Self::AfterBaselineError => "afterBaselineError",
            Self::AfterBaselineOperationFinish => "afterBaselineOperationFinish",
            Self::BeforeRepair => "beforeRepair",
            Self::AfterRepair => "afterRepair",
            Self::AfterRepairError => "afterRepairError",
            Self::AfterRepairOperationFinish => "afterRepairOperationFinish",
            Self::BeforeInfo => "beforeInfo",
            Self::AfterInfo => "afterInfo",
            Self::AfterInfoError => "afterInfoError",
            Self::AfterInfoOperationFinish => "afterInfoOperationFinish",
            Self::CreateSchema => "createSchema",
        }
    }

    /// Look up an event by identifier.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.id() == id)
    }

    /// Event for a callback file stem: `<eventId>` or `<eventId>__<description>`.
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        let id = stem.split_once("__").map(|(id, _)| id).unwrap_or(stem);
        Self::from_id(id)
    }

    /// Check if this event fires around a single migration.
    pub fn is_per_migration(&self) -> bool {
        matches!(
            self,
            Self::BeforeEachMigrate | Self::AfterEachMigrate | Self::AfterEachMigrateError
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// What a callback gets to see.
pub struct CallbackContext<'a> {
    pub event: Event,
    pub connection: &'a dyn Connection,
    pub configuration: &'a Configuration,
    /// The migration, for per-migration events.
    pub migration: Option<&'a MigrationInfo>,
    /// The operation result, for operation-finish events.
    pub result: Option<&'a OperationResult>,
}

/// A hook invoked at lifecycle events.
#[async_trait::async_trait]
pub trait Callback: Send + Sync {
    /// Check if this callback handles an event.
    fn supports(&self, event: Event) -> bool;

    /// Handle an event.
    async fn handle(&self, context: &CallbackContext<'_>) -> StrataResult<()>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// A SQL script run at an event.
#[derive(Debug, Clone)]
pub struct SqlCallback {
    event: Event,
    name: String,
    sql: String,
}

impl SqlCallback {
    /// Create a SQL callback.
    pub fn new(event: Event, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            event,
            name: name.into(),
            sql: sql.into(),
        }
    }

    /// Build a callback from a resource named after an event.
    ///
    /// Returns `None` when the file name is not a callback name.
    pub fn from_resource(resource: &Resource, suffixes: &[String]) -> Option<Self> {
        let stem = suffixes
            .iter()
            .find_map(|s| resource.filename.strip_suffix(s.as_str()))?;
        let event = Event::from_file_stem(stem)?;
        Some(Self::new(event, &resource.filename, &resource.content))
    }

    /// Load every SQL callback exposed by a resource provider, sorted by
    /// file name.
    pub async fn load_all(
        provider: &dyn ResourceProvider,
        suffixes: &[String],
    ) -> StrataResult<Vec<Self>> {
        let mut callbacks: Vec<Self> = provider
            .resources("", suffixes)
            .await?
            .iter()
            .filter_map(|r| Self::from_resource(r, suffixes))
            .collect();
        callbacks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(callbacks)
    }
}

#[async_trait::async_trait]
impl Callback for SqlCallback {
    fn supports(&self, event: Event) -> bool {
        self.event == event
    }

    async fn handle(&self, context: &CallbackContext<'_>) -> StrataResult<()> {
        let sql = if context.configuration.placeholder_replacement {
            crate::resolver::replace_placeholders(&self.sql, context.configuration)?
        } else {
            self.sql.clone()
        };
        context.connection.execute_script(&sql).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Dispatches events to registered callbacks.
#[derive(Clone, Default)]
pub struct CallbackExecutor {
    callbacks: Vec<Arc<dyn Callback>>,
}

impl fmt::Debug for CallbackExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackExecutor")
            .field(
                "callbacks",
                &self.callbacks.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl CallbackExecutor {
    /// Create an executor with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback.
    pub fn register(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Check if no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    async fn dispatch(&self, context: CallbackContext<'_>) -> StrataResult<()> {
        for callback in self.callbacks.iter().filter(|c| c.supports(context.event)) {
            debug!(event = %context.event, callback = callback.name(), "Executing callback");
            if let Err(e) = callback.handle(&context).await {
                error!(event = %context.event, callback = callback.name(), error = %e, "Callback failed");
                return Err(MigrationError::callback(context.event.id(), e));
            }
            info!(event = %context.event, callback = callback.name(), "Executed callback");
        }
        Ok(())
    }

    /// Fire an operation-level event.
    pub async fn on_event(
        &self,
        event: Event,
        connection: &dyn Connection,
        configuration: &Configuration,
    ) -> StrataResult<()> {
        self.dispatch(CallbackContext {
            event,
            connection,
            configuration,
            migration: None,
            result: None,
        })
        .await
    }

    /// Fire a per-migration event.
    pub async fn on_migrate_event(
        &self,
        event: Event,
        connection: &dyn Connection,
        configuration: &Configuration,
        migration: &MigrationInfo,
    ) -> StrataResult<()> {
        self.dispatch(CallbackContext {
            event,
            connection,
            configuration,
            migration: Some(migration),
            result: None,
        })
        .await
    }

    /// Fire an operation-finish event with the operation result.
    pub async fn on_operation_finish_event(
        &self,
        event: Event,
        connection: &dyn Connection,
        configuration: &Configuration,
        result: &OperationResult,
    ) -> StrataResult<()> {
        self.dispatch(CallbackContext {
            event,
            connection,
            configuration,
            migration: None,
            result: Some(result),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_round_trip() {
        for event in Event::ALL {
            assert_eq!(Event::from_id(event.id()), Some(event));
        }
        assert_eq!(Event::from_id("beforeLunch"), None);
    }

    #[test]
    fn test_callback_file_names() {
        let suffixes = vec![".sql".to_string()];
        let resource = Resource::new("afterMigrate__refresh_views.sql", "db/afterMigrate__refresh_views.sql", "SELECT 1;");
        let callback = SqlCallback::from_resource(&resource, &suffixes).unwrap();
        assert!(callback.supports(Event::AfterMigrate));
        assert!(!callback.supports(Event::BeforeMigrate));

        let migration = Resource::new("V1__init.sql", "db/V1__init.sql", "SELECT 1;");
        assert!(SqlCallback::from_resource(&migration, &suffixes).is_none());

        assert_eq!(Event::from_file_stem("beforeEachMigrate"), Some(Event::BeforeEachMigrate));
        assert!(Event::AfterEachMigrateError.is_per_migration());
    }
}
