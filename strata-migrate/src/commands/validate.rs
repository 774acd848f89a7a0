//! The `validate` command.

use tracing::{debug, info, warn};

use super::{fire_finish, fire_quietly};
use crate::callback::Event;
use crate::context::OperationContext;
use crate::error::StrataResult;
use crate::results::{OperationResult, ValidateResult};
use crate::state::MigrationState;
use crate::validation::is_cherry_picked;

/// Compare resolved migrations against the history without firing callbacks.
///
/// With `allow_pending`, pending and outdated migrations are acceptable.
pub async fn validate_with_result(
    ctx: &OperationContext,
    allow_pending: bool,
) -> StrataResult<ValidateResult> {
    let service = ctx.info().await?;

    let context = ctx.configuration.validation_context(allow_pending);
    let cherry_pick = &ctx.configuration.cherry_pick;
    // Migrations left out of the cherry-pick are expected to stay unapplied.
    let invalid: Vec<_> = service
        .all()
        .iter()
        .filter(|i| {
            i.state() != MigrationState::Ignored
                || is_cherry_picked(cherry_pick, i.version(), i.description())
        })
        .filter_map(|i| i.validate(&context))
        .collect();
    let validate_count = service
        .all()
        .iter()
        .filter(|i| i.resolved().is_some())
        .count();

    let mut warnings = Vec::new();
    if validate_count == 0 {
        let applied = service
            .all()
            .iter()
            .any(|i| i.applied().is_some_and(|am| !am.is_synthetic()));
        if !applied {
            let warning = format!(
                "No migrations found. Are your locations set up correctly? ({})",
                ctx.configuration.locations.join(", ")
            );
            warn!("{}", warning);
            warnings.push(warning);
        }
    }

    if invalid.is_empty() {
        info!(
            count = validate_count,
            "Successfully validated {} migration(s)", validate_count
        );
    } else {
        for violation in &invalid {
            debug!(
                version = ?violation.version,
                description = %violation.description,
                code = %violation.error_details.error_code,
                "Invalid migration"
            );
        }
    }

    Ok(ValidateResult::new(
        ctx.database(),
        invalid,
        validate_count,
        warnings,
    ))
}

/// Run `validate` with its callbacks. Pending migrations are violations.
pub async fn run(ctx: &OperationContext) -> StrataResult<ValidateResult> {
    ctx.callbacks
        .on_event(
            Event::BeforeValidate,
            ctx.connection.as_ref(),
            &ctx.configuration,
        )
        .await?;

    match validate_with_result(ctx, false).await {
        Ok(result) => {
            if result.validation_successful {
                ctx.callbacks
                    .on_event(
                        Event::AfterValidate,
                        ctx.connection.as_ref(),
                        &ctx.configuration,
                    )
                    .await?;
            } else {
                fire_quietly(ctx, Event::AfterValidateError).await;
            }
            fire_finish(
                ctx,
                Event::AfterValidateOperationFinish,
                OperationResult::Validate(result.clone()),
            )
            .await;
            Ok(result)
        }
        Err(e) => {
            fire_quietly(ctx, Event::AfterValidateError).await;
            Err(e)
        }
    }
}
