//! The `migrate` command.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::baseline::baseline_history;
use super::validate::validate_with_result;
use super::{ensure_schemas, fire_finish, fire_quietly};
use crate::callback::Event;
use crate::connection::in_transaction;
use crate::context::OperationContext;
use crate::dialect::HistoryTable;
use crate::error::{MigrationError, StrataResult};
use crate::info::{MigrationInfo, MigrationInfoService};
use crate::migration::NewAppliedMigration;
use crate::results::{BaselineResult, MigrateOutput, MigrateResult, OperationResult};
use crate::state::MigrationState;
use crate::validation::{PatternState, is_cherry_picked};

fn elapsed_millis(start: Instant) -> i32 {
    i32::try_from(start.elapsed().as_millis()).unwrap_or(i32::MAX)
}

/// Copy the rows of a legacy history table into a new history table.
async fn liberate_legacy_table(ctx: &OperationContext) -> StrataResult<()> {
    let Some(legacy) = &ctx.configuration.legacy_table else {
        return Ok(());
    };
    let history = ctx.schema_history.as_ref();
    if history.exists().await? {
        return Ok(());
    }

    let legacy_table = HistoryTable::new(ctx.default_schema(), legacy.clone());
    if !ctx
        .connection
        .table_exists(legacy_table.schema(), legacy_table.name())
        .await?
    {
        return Ok(());
    }

    info!(
        legacy = %legacy_table,
        table = %history.table_name(),
        "Copying legacy schema history table"
    );
    let copied = history.create_from_legacy(&legacy_table).await?;
    info!(rows = copied, "Copied legacy schema history rows");
    Ok(())
}

/// Make sure the history table exists before applying migrations.
async fn prepare_history(ctx: &OperationContext) -> StrataResult<()> {
    let history = ctx.schema_history.as_ref();
    if history.exists().await? {
        return Ok(());
    }

    let connection = ctx.connection.as_ref();
    let mut non_empty = Vec::new();
    if ctx.schemas.is_empty() {
        if !connection.schema_is_empty(None).await? {
            non_empty.push("<current>".to_string());
        }
    } else {
        for schema in &ctx.schemas {
            if connection.schema_exists(schema).await?
                && !connection.schema_is_empty(Some(schema)).await?
            {
                non_empty.push(schema.clone());
            }
        }
    }

    if !non_empty.is_empty() {
        if !ctx.configuration.baseline_on_migrate {
            return Err(MigrationError::NonEmptySchemaWithoutHistory(
                non_empty.join(", "),
            ));
        }
        let mut baseline = BaselineResult::new(ctx.database());
        return baseline_history(ctx, &mut baseline).await;
    }

    let created = ensure_schemas(ctx).await?;
    history.create(None).await?;
    if !created.is_empty() {
        let quoted: Vec<String> = created
            .iter()
            .map(|s| ctx.dialect.quote_identifier(s))
            .collect();
        history.add_schema_marker(&quoted.join(",")).await?;
    }
    Ok(())
}

/// A failed migration that blocks `migrate`, if any.
fn blocking_failure<'a>(
    ctx: &OperationContext,
    service: &'a MigrationInfoService,
) -> Option<&'a MigrationInfo> {
    let context = ctx.configuration.validation_context(true);
    service.failed().into_iter().find(|info| {
        let repeatable = info.is_repeatable();
        if info.state() == MigrationState::FutureFailed
            && context.is_ignored(PatternState::Future, repeatable)
        {
            warn!(
                migration = %info.label(),
                "Schema contains a failed future migration"
            );
            return false;
        }
        !context.is_ignored(PatternState::Failed, repeatable)
    })
}

/// Next migration to apply, skipping repeatables already run this pass.
fn next_migration<'a>(
    ctx: &OperationContext,
    service: &'a MigrationInfoService,
    executed_repeatables: &HashSet<String>,
) -> Option<&'a MigrationInfo> {
    let cherry_pick = &ctx.configuration.cherry_pick;
    service.all().iter().find(|info| {
        matches!(
            info.state(),
            MigrationState::Pending | MigrationState::Outdated
        ) && info.resolved().is_some()
            && !(info.is_repeatable() && executed_repeatables.contains(info.description()))
            && is_cherry_picked(cherry_pick, info.version(), info.description())
    })
}

async fn apply_migration(
    ctx: &OperationContext,
    info: &MigrationInfo,
    result: &mut MigrateResult,
) -> StrataResult<()> {
    let Some(resolved) = info.resolved() else {
        return Ok(());
    };
    let config = &ctx.configuration;
    let connection = ctx.connection.as_ref();
    let history = ctx.schema_history.as_ref();

    ctx.callbacks
        .on_migrate_event(Event::BeforeEachMigrate, connection, config, info)
        .await?;

    match info.version() {
        Some(version) => info!(
            version = %version,
            "Migrating schema to version \"{} - {}\"",
            version,
            info.description()
        ),
        None => info!(
            "Migrating schema with repeatable migration \"{}\"",
            info.description()
        ),
    }
    if config.skip_executing_migrations {
        debug!(migration = %info.label(), "Recording migration without executing it");
    }

    let start = Instant::now();
    let run = async {
        if !config.skip_executing_migrations {
            resolved.executor.execute(connection, config).await?;
        }
        let elapsed = elapsed_millis(start);
        history
            .add_applied_migration(NewAppliedMigration::executed(resolved, elapsed, true))
            .await?;
        Ok::<_, MigrationError>(elapsed)
    };
    let transactional =
        resolved.can_execute_in_transaction() && ctx.dialect.supports_ddl_transactions();
    let outcome = if transactional {
        in_transaction(connection, run).await
    } else {
        run.await
    };

    match outcome {
        Ok(elapsed) => {
            ctx.callbacks
                .on_migrate_event(Event::AfterEachMigrate, connection, config, info)
                .await?;
            result.migrations.push(MigrateOutput::from_info(info, elapsed));
            result.migrations_executed += 1;
            Ok(())
        }
        Err(e) => {
            let elapsed = elapsed_millis(start);
            error!(migration = %info.label(), error = %e, "Migration failed");
            if let Err(record_err) = history
                .add_applied_migration(NewAppliedMigration::executed(resolved, elapsed, false))
                .await
            {
                warn!(error = %record_err, "Unable to record failed migration");
            }
            if let Err(callback_err) = ctx
                .callbacks
                .on_migrate_event(Event::AfterEachMigrateError, connection, config, info)
                .await
            {
                warn!(error = %callback_err, "Ignoring callback failure");
            }
            result.success = false;
            Err(MigrationError::MigrationFailed {
                migration: resolved.script.clone(),
                source: Box::new(e),
            })
        }
    }
}

/// Apply pending migrations one at a time. Must run under the history lock.
async fn apply_pending(ctx: &OperationContext, result: &mut MigrateResult) -> StrataResult<()> {
    let mut executed_repeatables = HashSet::new();
    let mut first = true;
    loop {
        let service = ctx.info().await?;
        if first {
            result.initial_schema_version = service
                .current()
                .and_then(|c| c.version())
                .map(|v| v.to_string());
            first = false;
        }

        if let Some(failed) = blocking_failure(ctx, &service) {
            return Err(MigrationError::FailedMigrationPresent {
                version: failed
                    .version()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| failed.description().to_string()),
            });
        }

        let Some(next) = next_migration(ctx, &service, &executed_repeatables) else {
            result.target_schema_version = service
                .current()
                .and_then(|c| c.version())
                .map(|v| v.to_string());
            break;
        };
        apply_migration(ctx, next, result).await?;
        if next.is_repeatable() {
            executed_repeatables.insert(next.description().to_string());
        }
    }

    if result.migrations_executed == 0 {
        info!(
            version = ?result.target_schema_version,
            "Schema is up to date. No migration necessary."
        );
    } else {
        info!(
            count = result.migrations_executed,
            millis = result.total_execution_time(),
            "Successfully applied {} migration(s)",
            result.migrations_executed
        );
    }
    Ok(())
}

async fn migrate_locked(ctx: &OperationContext, result: &mut MigrateResult) -> StrataResult<()> {
    liberate_legacy_table(ctx).await?;

    if ctx.configuration.validate_on_migrate {
        let validation = validate_with_result(ctx, true).await?;
        if !validation.validation_successful {
            return Err(MigrationError::Validate(validation.error_message()));
        }
    }

    prepare_history(ctx).await?;
    apply_pending(ctx, result).await
}

/// Every read that decides what to apply happens under the history lock, so
/// a session that waited for it sees the work of the one that held it.
async fn migrate(ctx: &OperationContext, result: &mut MigrateResult) -> StrataResult<()> {
    let history = ctx.schema_history.as_ref();
    history.lock().await?;
    let outcome = migrate_locked(ctx, result).await;
    let unlocked = history.unlock().await;
    outcome?;
    unlocked
}

/// Run `migrate` with its callbacks.
pub async fn run(ctx: &OperationContext) -> StrataResult<MigrateResult> {
    let connection = ctx.connection.as_ref();
    let config = &ctx.configuration;
    ctx.callbacks
        .on_event(Event::BeforeMigrate, connection, config)
        .await?;

    let mut result = MigrateResult::new(ctx.database(), ctx.default_schema().map(str::to_string));
    match migrate(ctx, &mut result).await {
        Ok(()) => {
            ctx.callbacks
                .on_event(Event::AfterMigrate, connection, config)
                .await?;
            if result.migrations_executed > 0 {
                ctx.callbacks
                    .on_event(Event::AfterMigrateApplied, connection, config)
                    .await?;
            }
            fire_finish(
                ctx,
                Event::AfterMigrateOperationFinish,
                OperationResult::Migrate(result.clone()),
            )
            .await;
            Ok(result)
        }
        Err(e) => {
            result.success = false;
            fire_quietly(ctx, Event::AfterMigrateError).await;
            fire_finish(
                ctx,
                Event::AfterMigrateOperationFinish,
                OperationResult::Migrate(result),
            )
            .await;
            Err(e)
        }
    }
}
