//! Instance review workflow.
//!
//! `start` claims an instance for review. `stop` either validates the review
//! (sets `review_stop`) or, with `cancel`, hands it back: an unvalidated review
//! is cleared entirely, a validated one is reopened.

use super::helpers::{fetch_instance, readable_instance, visible_instance};
use super::{CmdMessage, CmdResult, Ctx};
use crate::access::Permissions;
use crate::error::{CatalogError, Result};
use crate::model::{now_millis, Id, ProjectInstance};
use crate::store::{bind, Executor};
use tracing::info;

pub fn start_review<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    id: Id,
) -> Result<CmdResult<ProjectInstance>> {
    let instance = readable_instance(exec, ctx, id)?;
    ctx.check_write(instance.container())?;

    let now = now_millis();
    exec.execute(
        "UPDATE project_instance SET review_start = :now, review_user_id = :user, updated = :now WHERE id = :id",
        &bind([
            ("now", now.into()),
            ("user", ctx.caller.id.into()),
            ("id", id.into()),
        ]),
    )?;
    info!(instance = id, user = ctx.caller.id, "review started");
    Ok(CmdResult::new(visible_instance(ctx, fetch_instance(exec, id)?))
        .with_message(CmdMessage::success(format!("Started review of instance {}", id))))
}

pub fn stop_review<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    id: Id,
    cancel: bool,
) -> Result<CmdResult<ProjectInstance>> {
    let instance = readable_instance(exec, ctx, id)?;
    ctx.check_write(instance.container())?;

    let reviewer = match (instance.review_start, instance.review_user_id) {
        (Some(_), Some(user)) => user,
        _ => {
            return Err(CatalogError::InvalidArgument(format!(
                "instance {} is not in review mode",
                id
            )))
        }
    };
    if reviewer != ctx.caller.id {
        return Err(CatalogError::InvalidArgument(format!(
            "instance {} is reviewed by user {}",
            id, reviewer
        )));
    }

    let now = now_millis();
    let message = if cancel {
        if instance.review_stop.is_none() {
            exec.execute(
                "UPDATE project_instance SET review_start = NULL, review_user_id = NULL, \
                 review_stop = NULL, updated = :now WHERE id = :id",
                &bind([("now", now.into()), ("id", id.into())]),
            )?;
        } else {
            exec.execute(
                "UPDATE project_instance SET review_stop = NULL, updated = :now WHERE id = :id",
                &bind([("now", now.into()), ("id", id.into())]),
            )?;
        }
        format!("Cancelled review of instance {}", id)
    } else {
        exec.execute(
            "UPDATE project_instance SET review_stop = :now, updated = :now WHERE id = :id",
            &bind([("now", now.into()), ("id", id.into())]),
        )?;
        format!("Validated review of instance {}", id)
    };
    info!(instance = id, cancel, "review stopped");
    Ok(CmdResult::new(visible_instance(ctx, fetch_instance(exec, id)?))
        .with_message(CmdMessage::success(message)))
}
