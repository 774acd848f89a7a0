//! The `repair` command.

use tracing::info;

use super::{fire_finish, fire_quietly};
use crate::callback::Event;
use crate::context::OperationContext;
use crate::error::StrataResult;
use crate::info::MigrationInfo;
use crate::results::{OperationResult, RepairOutput, RepairResult};
use crate::state::MigrationState;
use crate::validation::is_cherry_picked;

const DELETED_MISSING_MIGRATIONS: &str = "DELETED_MISSING_MIGRATIONS";
const ALIGNED_APPLIED_MIGRATION_CHECKSUMS: &str = "ALIGNED_APPLIED_MIGRATION_CHECKSUMS";

fn needs_alignment(info: &MigrationInfo) -> bool {
    let (Some(resolved), Some(applied)) = (info.resolved(), info.applied()) else {
        return false;
    };
    if applied.is_synthetic() || applied.version.is_none() {
        return false;
    }
    if !matches!(
        info.state(),
        MigrationState::Success | MigrationState::OutOfOrder
    ) {
        return false;
    }
    !resolved.checksum_matches(applied.checksum.as_ref())
        || resolved.description != applied.description
        || resolved.migration_type != applied.migration_type
}

async fn repair(ctx: &OperationContext) -> StrataResult<RepairResult> {
    let config = &ctx.configuration;
    let history = ctx.schema_history.as_ref();
    let mut result = RepairResult::new(ctx.database());

    history
        .remove_failed_migrations(&mut result, &config.cherry_pick)
        .await?;

    let service = ctx.info().await?;
    for info in service.all() {
        if !is_cherry_picked(&config.cherry_pick, info.version(), info.description()) {
            continue;
        }
        match info.state() {
            MigrationState::MissingSuccess | MigrationState::MissingFailed => {
                if let Some(applied) = info.applied() {
                    history.delete(applied).await?;
                    result.migrations_deleted.push(RepairOutput::from_info(info));
                    result.add_action(DELETED_MISSING_MIGRATIONS);
                }
            }
            _ if needs_alignment(info) => {
                if let (Some(resolved), Some(applied)) = (info.resolved(), info.applied()) {
                    history.update(applied, resolved).await?;
                    result.migrations_aligned.push(RepairOutput::from_info(info));
                    result.add_action(ALIGNED_APPLIED_MIGRATION_CHECKSUMS);
                }
            }
            _ => {}
        }
    }

    if result.repair_actions.is_empty() {
        info!(table = %history.table_name(), "Repair of schema history table not necessary");
    } else {
        info!(
            table = %history.table_name(),
            removed = result.migrations_removed.len(),
            deleted = result.migrations_deleted.len(),
            aligned = result.migrations_aligned.len(),
            "Successfully repaired schema history table"
        );
    }
    Ok(result)
}

/// Run `repair` under the history lock with its callbacks.
///
/// Does nothing when the history table does not exist.
pub async fn run(ctx: &OperationContext) -> StrataResult<RepairResult> {
    ctx.callbacks
        .on_event(Event::BeforeRepair, ctx.connection.as_ref(), &ctx.configuration)
        .await?;

    let outcome = if ctx.schema_history.exists().await? {
        let history = ctx.schema_history.as_ref();
        history.lock().await?;
        let outcome = repair(ctx).await;
        let unlocked = history.unlock().await;
        outcome.and_then(|result| unlocked.map(|_| result))
    } else {
        info!("Schema history table does not exist. Nothing to repair");
        Ok(RepairResult::new(ctx.database()))
    };

    match outcome {
        Ok(result) => {
            ctx.callbacks
                .on_event(Event::AfterRepair, ctx.connection.as_ref(), &ctx.configuration)
                .await?;
            fire_finish(
                ctx,
                Event::AfterRepairOperationFinish,
                OperationResult::Repair(result.clone()),
            )
            .await;
            Ok(result)
        }
        Err(e) => {
            fire_quietly(ctx, Event::AfterRepairError).await;
            Err(e)
        }
    }
}
