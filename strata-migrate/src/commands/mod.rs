//! Command orchestrators.
//!
//! Each command runs against a fresh [`OperationContext`], fires its
//! lifecycle callbacks and returns a serializable result.

pub mod baseline;
pub mod info;
pub mod migrate;
pub mod repair;
pub mod validate;

use tracing::{info, warn};

use crate::callback::Event;
use crate::context::OperationContext;
use crate::error::{MigrationError, StrataResult};
use crate::results::OperationResult;

/// Fire an event whose failure must not mask an earlier error.
pub(crate) async fn fire_quietly(ctx: &OperationContext, event: Event) {
    if let Err(e) = ctx
        .callbacks
        .on_event(event, ctx.connection.as_ref(), &ctx.configuration)
        .await
    {
        warn!(event = %event, error = %e, "Ignoring callback failure");
    }
}

/// Fire an operation-finish event. Failures are logged.
pub(crate) async fn fire_finish(ctx: &OperationContext, event: Event, result: OperationResult) {
    if let Err(e) = ctx
        .callbacks
        .on_operation_finish_event(event, ctx.connection.as_ref(), &ctx.configuration, &result)
        .await
    {
        warn!(event = %event, error = %e, "Ignoring callback failure");
    }
}

/// Create managed schemas that do not exist yet.
///
/// Returns the schemas that were created.
pub(crate) async fn ensure_schemas(ctx: &OperationContext) -> StrataResult<Vec<String>> {
    let connection = ctx.connection.as_ref();
    let mut missing = Vec::new();
    for schema in &ctx.schemas {
        if !connection.schema_exists(schema).await? {
            missing.push(schema.clone());
        }
    }
    if missing.is_empty() {
        return Ok(missing);
    }
    if !ctx.configuration.create_schemas {
        return Err(MigrationError::configuration(format!(
            "Schema(s) {} do not exist and create_schemas is disabled",
            missing.join(", ")
        )));
    }

    ctx.callbacks
        .on_event(Event::CreateSchema, connection, &ctx.configuration)
        .await?;
    for schema in &missing {
        info!(schema = %schema, "Creating schema");
        connection.create_schema(schema).await?;
    }
    Ok(missing)
}
