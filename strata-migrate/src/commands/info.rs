//! The `info` command.

use super::{fire_finish, fire_quietly};
use crate::callback::Event;
use crate::context::OperationContext;
use crate::error::StrataResult;
use crate::info::MigrationInfoService;
use crate::results::{InfoResult, OperationResult};

/// Compute migration states with their callbacks.
pub async fn run(ctx: &OperationContext) -> StrataResult<(MigrationInfoService, InfoResult)> {
    ctx.callbacks
        .on_event(Event::BeforeInfo, ctx.connection.as_ref(), &ctx.configuration)
        .await?;

    match ctx.info().await {
        Ok(service) => {
            ctx.callbacks
                .on_event(Event::AfterInfo, ctx.connection.as_ref(), &ctx.configuration)
                .await?;
            let result = InfoResult::from_service(
                &service,
                ctx.database(),
                ctx.default_schema().map(str::to_string),
            );
            fire_finish(
                ctx,
                Event::AfterInfoOperationFinish,
                OperationResult::Info(result.clone()),
            )
            .await;
            Ok((service, result))
        }
        Err(e) => {
            fire_quietly(ctx, Event::AfterInfoError).await;
            Err(e)
        }
    }
}
