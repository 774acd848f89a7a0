//! The `baseline` command.

use tracing::info;

use super::{ensure_schemas, fire_finish, fire_quietly};
use crate::callback::Event;
use crate::context::OperationContext;
use crate::error::{MigrationError, StrataResult};
use crate::history::BaselineMarker;
use crate::results::{BaselineResult, OperationResult};
use crate::version::MigrationVersion;

/// Mark the configured baseline version in the history.
///
/// Used by the `baseline` command and by `migrate` when
/// `baseline_on_migrate` finds a non-empty schema.
pub(crate) async fn baseline_history(
    ctx: &OperationContext,
    result: &mut BaselineResult,
) -> StrataResult<()> {
    let config = &ctx.configuration;
    let history = ctx.schema_history.as_ref();
    let marker = BaselineMarker::new(config.baseline_version()?, &config.baseline_description);

    if !history.exists().await? {
        ensure_schemas(ctx).await?;
        history.create(Some(&marker)).await?;
        info!(
            version = %marker.version,
            "Successfully baselined schema with version: {}", marker.version
        );
        result.successfully_baselined = true;
        result.baseline_version = Some(marker.version.to_string());
        return Ok(());
    }

    history.lock().await?;
    let outcome = baseline_existing(ctx, &marker, result).await;
    let unlocked = history.unlock().await;
    outcome?;
    unlocked
}

async fn baseline_existing(
    ctx: &OperationContext,
    marker: &BaselineMarker,
    result: &mut BaselineResult,
) -> StrataResult<()> {
    let history = ctx.schema_history.as_ref();

    if let Some(existing) = history.baseline_marker().await? {
        if marker.matches(&existing) {
            info!(
                table = %history.table_name(),
                "Schema history table already initialized with baseline version {}",
                marker.version
            );
            result.successfully_baselined = true;
            result.baseline_version = Some(marker.version.to_string());
            return Ok(());
        }
        let existing_version = existing
            .version
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        return Err(MigrationError::baseline_conflict(format!(
            "Unable to baseline schema history table {} with ({},{}) as it has already been baselined with ({},{})",
            history.table_name(),
            marker.version,
            marker.description,
            existing_version,
            existing.description
        )));
    }

    if history.has_schema_marker().await? && marker.version == MigrationVersion::parse("0")? {
        return Err(MigrationError::baseline_conflict(format!(
            "Unable to baseline schema history table {} with version 0 as this version was used for schema creation",
            history.table_name()
        )));
    }

    if history.has_non_synthetic_applied_migrations().await? {
        return Err(MigrationError::baseline_conflict(format!(
            "Unable to baseline schema history table {} as it already contains migrations",
            history.table_name()
        )));
    }

    history.add_baseline_marker(marker).await?;
    info!(
        version = %marker.version,
        "Successfully baselined schema with version: {}", marker.version
    );
    result.successfully_baselined = true;
    result.baseline_version = Some(marker.version.to_string());
    Ok(())
}

/// Run `baseline` with its callbacks.
pub async fn run(ctx: &OperationContext) -> StrataResult<BaselineResult> {
    ctx.callbacks
        .on_event(
            Event::BeforeBaseline,
            ctx.connection.as_ref(),
            &ctx.configuration,
        )
        .await?;

    let mut result = BaselineResult::new(ctx.database());
    match baseline_history(ctx, &mut result).await {
        Ok(()) => {
            ctx.callbacks
                .on_event(
                    Event::AfterBaseline,
                    ctx.connection.as_ref(),
                    &ctx.configuration,
                )
                .await?;
            fire_finish(
                ctx,
                Event::AfterBaselineOperationFinish,
                OperationResult::Baseline(result.clone()),
            )
            .await;
            Ok(result)
        }
        Err(e) => {
            fire_quietly(ctx, Event::AfterBaselineError).await;
            Err(e)
        }
    }
}
